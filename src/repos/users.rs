use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{postgres::PgQueryResult, Postgres, Transaction};
use thiserror::Error;

use crate::{
    accounts::{
        domain::{tokens::VerificationToken, users::User},
        models::users::{NewUserModel, User as UserModel},
    },
    database::PostgresConnection,
};

#[derive(Debug, Error)]
pub enum UserPersistenceError {
    #[error("duplicate email address: {0}")]
    DuplicateEmail(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DynUserRepo = Arc<dyn UserRepo + Send + Sync>;

#[async_trait]
pub trait UserRepo {
    /// Persist a new, inactive user.
    async fn persist_new_user(&self, user: &NewUserModel) -> Result<User, UserPersistenceError>;

    /// Look up a user by email address, ignoring case.
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Consume an activation token and mark its owner as active.
    ///
    /// Both changes commit together. If the token has already been consumed,
    /// nothing is changed and `None` is returned.
    async fn redeem_activation_token(
        &self,
        token: &VerificationToken,
    ) -> anyhow::Result<Option<User>>;

    /// Consume a password reset token and replace its owner's password hash.
    ///
    /// Both changes commit together. Returns `false` if the token has already
    /// been consumed.
    async fn redeem_password_reset_token(
        &self,
        token: &VerificationToken,
        password_hash: &str,
    ) -> anyhow::Result<bool>;
}

async fn delete_token(
    tx: &mut Transaction<'_, Postgres>,
    token: &VerificationToken,
) -> sqlx::Result<PgQueryResult> {
    sqlx::query("DELETE FROM account_token WHERE key = $1 AND user_id = $2 AND purpose = $3")
        .bind(token.key())
        .bind(token.user_id())
        .bind(token.purpose().as_str())
        .execute(tx)
        .await
}

#[async_trait]
impl UserRepo for PostgresConnection {
    async fn persist_new_user(&self, user: &NewUserModel) -> Result<User, UserPersistenceError> {
        let result = sqlx::query_as::<_, UserModel>(
            r#"
            INSERT INTO account_user (email, password)
            VALUES ($1, $2)
            RETURNING id, email, is_active
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&**self)
        .await;

        match result {
            Ok(model) => Ok(model.into()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().unwrap_or_default() == "23505" => {
                Err(UserPersistenceError::DuplicateEmail(user.email.clone()))
            }
            Err(err) => Err(anyhow::Error::from(err).into()),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, UserModel>(
            r#"
            SELECT id, email, is_active
            FROM account_user
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&**self)
        .await?;

        Ok(user.map(User::from))
    }

    async fn redeem_activation_token(
        &self,
        token: &VerificationToken,
    ) -> anyhow::Result<Option<User>> {
        let mut tx = self.begin().await?;

        let deleted = delete_token(&mut tx, token).await?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        let user = sqlx::query_as::<_, UserModel>(
            r#"
            UPDATE account_user
            SET is_active = TRUE
            WHERE id = $1
            RETURNING id, email, is_active
            "#,
        )
        .bind(token.user_id())
        .fetch_one(&mut tx)
        .await?;

        tx.commit().await?;

        Ok(Some(user.into()))
    }

    async fn redeem_password_reset_token(
        &self,
        token: &VerificationToken,
        password_hash: &str,
    ) -> anyhow::Result<bool> {
        let mut tx = self.begin().await?;

        let deleted = delete_token(&mut tx, token).await?;

        if deleted.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE account_user SET password = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(token.user_id())
            .execute(&mut tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use sqlx::PgPool;

    use crate::{
        accounts::{domain::tokens::TokenPurpose, models::tokens::NewToken},
        repos::TokenRepo,
    };

    use super::*;

    fn new_user(email: &str) -> NewUserModel {
        NewUserModel {
            email: email.to_owned(),
            password_hash: "old-hash".to_owned(),
        }
    }

    async fn issue(
        connection: &PostgresConnection,
        user: &User,
        purpose: TokenPurpose,
    ) -> VerificationToken {
        let token = VerificationToken::generate(user.id, purpose, None);
        connection.insert_token(&NewToken::from(&token)).await.unwrap();

        token
    }

    async fn password_hash(pool: &PgPool, user_id: i64) -> String {
        sqlx::query_scalar("SELECT password FROM account_user WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations-sqlx")]
    #[ignore = "requires a Postgres database at DATABASE_URL"]
    async fn persist_new_user_rejects_email_differing_in_case(pool: PgPool) {
        let connection = PostgresConnection::new(pool);
        connection
            .persist_new_user(&new_user("Ada@school.edu"))
            .await
            .unwrap();

        let error = connection
            .persist_new_user(&new_user("ada@school.edu"))
            .await
            .expect_err("email is taken");

        assert!(matches!(error, UserPersistenceError::DuplicateEmail(_)));

        let found = connection
            .find_user_by_email("ADA@SCHOOL.EDU")
            .await
            .unwrap()
            .expect("lookup should ignore case");
        assert_eq!("Ada@school.edu", found.email);
    }

    #[sqlx::test(migrations = "./migrations-sqlx")]
    #[ignore = "requires a Postgres database at DATABASE_URL"]
    async fn redeem_activation_token_is_single_use(pool: PgPool) {
        let connection = PostgresConnection::new(pool);
        let user = connection
            .persist_new_user(&new_user("a@x.com"))
            .await
            .unwrap();
        let token = issue(&connection, &user, TokenPurpose::Activation).await;

        let activated = connection
            .redeem_activation_token(&token)
            .await
            .unwrap()
            .expect("token should be redeemed");

        assert!(activated.is_active);
        assert!(connection.find_token(token.key()).await.unwrap().is_none());
        assert_eq!(None, connection.redeem_activation_token(&token).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations-sqlx")]
    #[ignore = "requires a Postgres database at DATABASE_URL"]
    async fn redeem_password_reset_token_is_single_use(pool: PgPool) {
        let connection = PostgresConnection::new(pool.clone());
        let user = connection
            .persist_new_user(&new_user("a@x.com"))
            .await
            .unwrap();
        let token = issue(&connection, &user, TokenPurpose::PasswordReset).await;

        assert!(connection
            .redeem_password_reset_token(&token, "new-hash")
            .await
            .unwrap());
        assert_eq!("new-hash", password_hash(&pool, user.id).await);

        assert!(!connection
            .redeem_password_reset_token(&token, "newer-hash")
            .await
            .unwrap());
        assert_eq!("new-hash", password_hash(&pool, user.id).await);
    }

    #[sqlx::test(migrations = "./migrations-sqlx")]
    #[ignore = "requires a Postgres database at DATABASE_URL"]
    async fn redeem_rejects_token_issued_for_other_flow(pool: PgPool) {
        let connection = PostgresConnection::new(pool.clone());
        let user = connection
            .persist_new_user(&new_user("a@x.com"))
            .await
            .unwrap();
        let token = issue(&connection, &user, TokenPurpose::Activation).await;
        let as_reset_token = VerificationToken::from_parts(
            token.key().to_owned(),
            token.user_id(),
            TokenPurpose::PasswordReset,
            token.created_at(),
            token.expires_at(),
        );

        assert!(!connection
            .redeem_password_reset_token(&as_reset_token, "new-hash")
            .await
            .unwrap());
        assert!(connection.find_token(token.key()).await.unwrap().is_some());
        assert_eq!("old-hash", password_hash(&pool, user.id).await);
    }
}
