use sqlx::FromRow;

use crate::accounts::domain::users::{NewUser, User as DomainUser};

#[derive(Debug, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_active: bool,
}

impl From<User> for DomainUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            is_active: user.is_active,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewUserModel {
    pub email: String,
    pub password_hash: String,
}

impl TryFrom<&NewUser> for NewUserModel {
    type Error = anyhow::Error;

    fn try_from(user: &NewUser) -> Result<Self, Self::Error> {
        Ok(Self {
            email: user.email().address().to_owned(),
            password_hash: user.password_hash()?.value().to_owned(),
        })
    }
}
