use semval::context::Context as ValidationContext;
use serde::{Deserialize, Serialize};

use crate::{
    accounts::domain::{
        email::EmailInvalidity,
        users::{self, NewUserInvalidity},
    },
    passwords::PasswordInvalidity,
};

#[derive(Deserialize)]
pub struct NewUserRequest {
    email: String,
    password: String,
}

impl From<NewUserRequest> for users::NewUserData {
    fn from(rep: NewUserRequest) -> Self {
        Self {
            email: rep.email,
            password: rep.password,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UserResponse {
    pub email: String,
    pub is_active: bool,
}

impl From<users::User> for UserResponse {
    fn from(user: users::User) -> Self {
        Self {
            email: user.email,
            is_active: user.is_active,
        }
    }
}

fn email_message(invalidity: EmailInvalidity) -> String {
    match invalidity {
        EmailInvalidity::MissingDomain => "Email is missing a domain.".to_owned(),
        EmailInvalidity::MissingSeparator => "Email is missing an '@' symbol.".to_owned(),
    }
}

fn password_message(invalidity: PasswordInvalidity) -> String {
    match invalidity {
        PasswordInvalidity::MaxLength(max) => format!(
            "Passwords may not contain more than {} characters.",
            max
        ),
        PasswordInvalidity::MinLength(min) => {
            format!("Passwords must contain at least {} characters.", min)
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NewUserValidationError {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub password: Vec<String>,
}

impl From<ValidationContext<NewUserInvalidity>> for NewUserValidationError {
    fn from(validation: ValidationContext<NewUserInvalidity>) -> Self {
        let mut response = NewUserValidationError::default();

        for invalidity in validation.into_iter() {
            match invalidity {
                NewUserInvalidity::Email(email_invalidity) => {
                    response.email.push(email_message(email_invalidity))
                }
                NewUserInvalidity::Password(password_invalidity) => {
                    response.password.push(password_message(password_invalidity))
                }
            }
        }

        response
    }
}

/// Body of the requests that ask for an account email to be (re)sent.
#[derive(Deserialize, Serialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ActivationQuery {
    pub uid: String,
    pub token: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordQuery {
    pub token: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PasswordValidationError {
    pub password: Vec<String>,
}

impl From<ValidationContext<PasswordInvalidity>> for PasswordValidationError {
    fn from(validation: ValidationContext<PasswordInvalidity>) -> Self {
        Self {
            password: validation.into_iter().map(password_message).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use semval::ValidatedFrom;

    use crate::accounts::domain::users::{NewUser, NewUserData};

    use super::*;

    #[test]
    fn new_user_validation_error_messages() {
        let (_, context) = NewUser::validated_from(NewUserData {
            email: "nope".to_owned(),
            password: "short".to_owned(),
        })
        .expect_err("user should be invalid");

        let rep = NewUserValidationError::from(context);

        assert_eq!(
            vec![
                "Email is missing an '@' symbol.".to_owned(),
                "Email is missing a domain.".to_owned()
            ],
            rep.email
        );
        assert_eq!(
            vec!["Passwords must contain at least 8 characters.".to_owned()],
            rep.password
        );
    }

    #[test]
    fn new_user_validation_error_omits_valid_fields() {
        let rep = NewUserValidationError {
            email: vec![],
            password: vec!["Too short.".to_owned()],
        };

        let json = serde_json::to_value(&rep).unwrap();

        assert_eq!(serde_json::json!({ "password": ["Too short."] }), json);
    }
}
