//! In-memory repositories for exercising services without a database.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::accounts::{
    domain::{tokens::VerificationToken, users::User},
    models::{tokens::NewToken, users::NewUserModel},
};

use super::{TokenPersistenceError, TokenRepo, UserPersistenceError, UserRepo};

#[derive(Default)]
struct Store {
    users: Vec<(User, String)>,
    tokens: Vec<VerificationToken>,
    reject_token_writes: bool,
}

#[derive(Clone, Default)]
pub struct MemoryRepo {
    store: Arc<Mutex<Store>>,
}

impl MemoryRepo {
    pub fn add_user(&self, email: &str, is_active: bool) -> User {
        let mut store = self.store.lock().unwrap();
        let user = User {
            id: store.users.len() as i64 + 1,
            email: email.to_owned(),
            is_active,
        };
        store.users.push((user.clone(), String::new()));

        user
    }

    pub fn add_token(&self, token: VerificationToken) {
        self.store.lock().unwrap().tokens.push(token);
    }

    pub fn reject_token_writes(&self) {
        self.store.lock().unwrap().reject_token_writes = true;
    }

    pub fn tokens(&self) -> Vec<VerificationToken> {
        self.store.lock().unwrap().tokens.clone()
    }

    pub fn user(&self, id: i64) -> Option<User> {
        self.store
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|(user, _)| user.id == id)
            .map(|(user, _)| user.clone())
    }

    pub fn password_hash(&self, id: i64) -> Option<String> {
        self.store
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|(user, _)| user.id == id)
            .map(|(_, hash)| hash.clone())
    }

    fn remove_token(store: &mut Store, token: &VerificationToken) -> bool {
        let before = store.tokens.len();
        store.tokens.retain(|t| {
            t.key() != token.key() || t.user_id() != token.user_id() || t.purpose() != token.purpose()
        });

        store.tokens.len() != before
    }
}

#[async_trait]
impl TokenRepo for MemoryRepo {
    async fn insert_token(&self, token: &NewToken) -> Result<(), TokenPersistenceError> {
        let mut store = self.store.lock().unwrap();

        if store.reject_token_writes {
            return Err(anyhow::anyhow!("token writes are rejected").into());
        }

        if store.tokens.iter().any(|t| t.key() == token.key()) {
            return Err(TokenPersistenceError::DuplicateKey);
        }

        store.tokens.push(VerificationToken::from_parts(
            token.key().to_owned(),
            token.user_id(),
            token.purpose(),
            token.created_at(),
            token.expires_at(),
        ));

        Ok(())
    }

    async fn find_token(&self, key: &str) -> anyhow::Result<Option<VerificationToken>> {
        let store = self.store.lock().unwrap();

        Ok(store.tokens.iter().find(|t| t.key() == key).cloned())
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut store = self.store.lock().unwrap();
        let before = store.tokens.len();
        store.tokens.retain(|t| t.is_valid_at(now));

        Ok((before - store.tokens.len()) as u64)
    }
}

#[async_trait]
impl UserRepo for MemoryRepo {
    async fn persist_new_user(&self, user: &NewUserModel) -> Result<User, UserPersistenceError> {
        let mut store = self.store.lock().unwrap();

        if store
            .users
            .iter()
            .any(|(u, _)| u.email.to_lowercase() == user.email.to_lowercase())
        {
            return Err(UserPersistenceError::DuplicateEmail(user.email.clone()));
        }

        let persisted = User {
            id: store.users.len() as i64 + 1,
            email: user.email.clone(),
            is_active: false,
        };
        store
            .users
            .push((persisted.clone(), user.password_hash.clone()));

        Ok(persisted)
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let store = self.store.lock().unwrap();

        Ok(store
            .users
            .iter()
            .find(|(user, _)| user.email.to_lowercase() == email.to_lowercase())
            .map(|(user, _)| user.clone()))
    }

    async fn redeem_activation_token(
        &self,
        token: &VerificationToken,
    ) -> anyhow::Result<Option<User>> {
        let mut store = self.store.lock().unwrap();

        if !Self::remove_token(&mut store, token) {
            return Ok(None);
        }

        let user = store
            .users
            .iter_mut()
            .find(|(user, _)| user.id == token.user_id())
            .map(|(user, _)| user)
            .ok_or_else(|| anyhow::anyhow!("token owner does not exist"))?;
        user.is_active = true;

        Ok(Some(user.clone()))
    }

    async fn redeem_password_reset_token(
        &self,
        token: &VerificationToken,
        password_hash: &str,
    ) -> anyhow::Result<bool> {
        let mut store = self.store.lock().unwrap();

        if !Self::remove_token(&mut store, token) {
            return Ok(false);
        }

        let hash = store
            .users
            .iter_mut()
            .find(|(user, _)| user.id == token.user_id())
            .map(|(_, hash)| hash)
            .ok_or_else(|| anyhow::anyhow!("token owner does not exist"))?;
        *hash = password_hash.to_owned();

        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone};

    use crate::accounts::domain::tokens::TokenPurpose;

    use super::*;

    #[tokio::test]
    async fn delete_expired_tokens_includes_boundary() {
        let repo = MemoryRepo::default();
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        for (key, expires_at) in [
            ("past", now - Duration::seconds(1)),
            ("boundary", now),
            ("future", now + Duration::seconds(1)),
        ] {
            repo.add_token(VerificationToken::from_parts(
                key.to_owned(),
                1,
                TokenPurpose::Activation,
                expires_at - Duration::minutes(15),
                expires_at,
            ));
        }

        assert_eq!(2, repo.delete_expired_tokens(now).await.unwrap());

        let remaining = repo.tokens();
        assert_eq!(1, remaining.len());
        assert_eq!("future", remaining[0].key());
    }
}
