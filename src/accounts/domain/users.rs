use anyhow::Result;
use semval::prelude::*;
use serde::Serialize;

use crate::passwords::{self, Password, PasswordInvalidity};

use super::email::{self, Email, EmailInvalidity};

/// A persisted account, as seen by the notification flows.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_active: bool,
}

/// A user that has not been persisted yet.
#[derive(Debug)]
pub struct NewUser {
    email: Email,
    password: Password,
}

impl NewUser {
    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn password_hash(&self) -> Result<passwords::Hash> {
        passwords::Hash::new(&self.password)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NewUserInvalidity {
    Email(EmailInvalidity),
    Password(PasswordInvalidity),
}

impl Validate for NewUser {
    type Invalidity = NewUserInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        ValidationContext::new()
            .validate_with(&self.email, NewUserInvalidity::Email)
            .validate_with(&self.password, NewUserInvalidity::Password)
            .into()
    }
}

#[derive(Clone, Debug)]
pub struct NewUserData {
    pub email: String,
    pub password: String,
}

impl ValidatedFrom<NewUserData> for NewUser {
    fn validated_from(from: NewUserData) -> ValidatedResult<Self> {
        let into = NewUser {
            email: Email::unvalidated(email::normalize(&from.email)),
            password: Password::unvalidated(from.password),
        };

        match into.validate() {
            Ok(()) => Ok(into),
            Err(context) => Err((into, context)),
        }
    }
}
