use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, Postgres};

use crate::{
    accounts::domain::tokens::{TokenPurpose, VerificationToken},
    repos::TokenPersistenceError,
};

/// A token row as stored in the `account_token` table.
#[derive(Debug, FromRow)]
pub struct Token {
    pub key: String,
    pub user_id: i64,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<Token> for VerificationToken {
    type Error = anyhow::Error;

    fn try_from(token: Token) -> Result<Self, Self::Error> {
        Ok(VerificationToken::from_parts(
            token.key,
            token.user_id,
            token.purpose.parse()?,
            token.created_at,
            token.expires_at,
        ))
    }
}

#[derive(Clone, Debug)]
pub struct NewToken {
    key: String,
    user_id: i64,
    purpose: TokenPurpose,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl NewToken {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn purpose(&self) -> TokenPurpose {
        self.purpose
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn save<'c, E>(&self, executor: E) -> Result<(), TokenPersistenceError>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO account_token (key, user_id, purpose, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&self.key)
        .bind(self.user_id)
        .bind(self.purpose.as_str())
        .bind(self.expires_at)
        .bind(self.created_at)
        .execute(executor)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().unwrap_or_default() == "23505" => {
                Err(TokenPersistenceError::DuplicateKey)
            }
            Err(err) => Err(anyhow::Error::from(err).into()),
        }
    }
}

impl From<&VerificationToken> for NewToken {
    fn from(token: &VerificationToken) -> Self {
        Self {
            key: token.key().to_owned(),
            user_id: token.user_id(),
            purpose: token.purpose(),
            expires_at: token.expires_at(),
            created_at: token.created_at(),
        }
    }
}
