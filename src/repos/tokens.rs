use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    accounts::{
        domain::tokens::VerificationToken,
        models::tokens::{NewToken, Token},
    },
    database::PostgresConnection,
};

#[derive(Debug, Error)]
pub enum TokenPersistenceError {
    #[error("a token with the same key already exists")]
    DuplicateKey,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DynTokenRepo = Arc<dyn TokenRepo + Send + Sync>;

#[async_trait]
pub trait TokenRepo {
    /// Persist a newly issued token.
    ///
    /// The write commits on its own. It is never held open across the
    /// delivery of the email containing the token.
    async fn insert_token(&self, token: &NewToken) -> Result<(), TokenPersistenceError>;

    /// Look up a token by its key, regardless of whether it has expired.
    async fn find_token(&self, key: &str) -> anyhow::Result<Option<VerificationToken>>;

    /// Delete every token that expired at or before `now`.
    ///
    /// # Returns
    ///
    /// The number of deleted tokens.
    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;
}

#[async_trait]
impl TokenRepo for PostgresConnection {
    async fn insert_token(&self, token: &NewToken) -> Result<(), TokenPersistenceError> {
        token.save(&**self).await
    }

    async fn find_token(&self, key: &str) -> anyhow::Result<Option<VerificationToken>> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            SELECT key, user_id, purpose, expires_at, created_at
            FROM account_token
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&**self)
        .await?;

        token.map(VerificationToken::try_from).transpose()
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM account_token WHERE expires_at <= $1")
            .bind(now)
            .execute(&**self)
            .await?;

        Ok(result.rows_affected())
    }
}
