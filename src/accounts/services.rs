use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Duration, Utc};
use semval::ValidatedFrom;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    passwords::{self, Password, PasswordInvalidity},
    rate_limit::{RateLimitError, RateLimiter},
    repos::{DynTokenRepo, DynUserRepo, UserPersistenceError},
};

use super::{
    domain::{
        email,
        tokens::{self, TokenPurpose, VerificationToken},
        uid::{self, UidDecodeError},
        users::{NewUser, NewUserData, NewUserInvalidity, User},
    },
    models::{tokens::NewToken, users::NewUserModel},
    notifications::{NotificationError, Notifier},
};

pub const ACTIVATION_TEMPLATE: &str = "emails/email_confirmation.html";
pub const ACTIVATION_SUBJECT: &str = "Activate Your Codegradr Account";
pub const PASSWORD_RESET_TEMPLATE: &str = "emails/password_reset.html";
pub const PASSWORD_RESET_SUBJECT: &str = "Reset your Codegradr password";

/// Issues tokens and emails them to their owners.
///
/// Each token is committed before the email carrying it is sent, and the
/// send happens outside of any database transaction. If delivery fails the
/// token remains stored but unused until it expires and is purged.
#[derive(Clone)]
pub struct VerificationService {
    notifier: Notifier,
    token_repo: DynTokenRepo,
}

impl VerificationService {
    pub fn new(notifier: Notifier, token_repo: DynTokenRepo) -> Self {
        Self {
            notifier,
            token_repo,
        }
    }

    /// Generate and persist a token for a user.
    ///
    /// # Arguments
    ///
    /// * `user` - The owner of the new token.
    /// * `purpose` - The flow that may redeem the token.
    /// * `expiry` - How long the token is valid. Defaults to 15 minutes.
    ///
    /// # Returns
    ///
    /// The persisted token. Its key is returned in plaintext so it can be
    /// embedded in a URL.
    pub async fn issue_token(
        &self,
        user: &User,
        purpose: TokenPurpose,
        expiry: Option<Duration>,
    ) -> Result<VerificationToken, NotificationError> {
        let token = VerificationToken::generate(user.id, purpose, expiry);

        self.token_repo
            .insert_token(&NewToken::from(&token))
            .await
            .map_err(|error| {
                error!(user_id = user.id, ?error, "Token generation failed.");

                error
            })?;

        debug!(user_id = user.id, %purpose, expires_at = %token.expires_at(), "Issued token.");

        Ok(token)
    }

    /// Email a user a link that activates their account.
    pub async fn send_activation_email(&self, user: &User) -> Result<(), NotificationError> {
        self.dispatch_activation(user).await.map_err(|error| {
            error!(user_id = user.id, flow = "activation", ?error, "Activation email failed.");

            error
        })
    }

    /// Email a user a link that lets them choose a new password.
    pub async fn send_password_reset_email(&self, user: &User) -> Result<(), NotificationError> {
        self.dispatch_password_reset(user).await.map_err(|error| {
            error!(user_id = user.id, flow = "password_reset", ?error, "Password reset email failed.");

            error
        })
    }

    async fn dispatch_activation(&self, user: &User) -> Result<(), NotificationError> {
        let uid = uid::encode_uid(user.id);
        let token = self
            .issue_token(user, TokenPurpose::Activation, None)
            .await?;
        let confirmation_url = self.notifier.config().activation_url(&uid, token.key());

        let mut context = tera::Context::new();
        context.insert("user", user);
        context.insert("confirmation_url", &confirmation_url);
        context.insert("year", &Utc::now().year());

        self.notifier
            .send_email(ACTIVATION_TEMPLATE, &context, ACTIVATION_SUBJECT, &user.email)
            .await?;

        debug!(user_id = user.id, %confirmation_url, "Sent activation email.");

        Ok(())
    }

    async fn dispatch_password_reset(&self, user: &User) -> Result<(), NotificationError> {
        let token = self
            .issue_token(
                user,
                TokenPurpose::PasswordReset,
                Some(tokens::password_reset_expiry()),
            )
            .await?;
        let password_reset_url = self.notifier.config().password_reset_url(token.key());

        let mut context = tera::Context::new();
        context.insert("user", user);
        context.insert("password_reset_url", &password_reset_url);
        context.insert("year", &Utc::now().year());

        self.notifier
            .send_email(
                PASSWORD_RESET_TEMPLATE,
                &context,
                PASSWORD_RESET_SUBJECT,
                &user.email,
            )
            .await?;

        debug!(user_id = user.id, %password_reset_url, "Sent password reset email.");

        Ok(())
    }
}

pub type DynRateLimiter = Arc<dyn RateLimiter>;

/// Account operations invoked by the HTTP handlers.
#[derive(Clone)]
pub struct AccountService {
    rate_limiter: DynRateLimiter,
    token_repo: DynTokenRepo,
    user_repo: DynUserRepo,
    verification: VerificationService,
}

#[derive(Debug, Error)]
pub enum RegisterError {
    /// The operation is rate limited for the provided client.
    #[error("operation is rate limited")]
    RateLimited(#[from] RateLimitError),

    /// The provided user data is invalid.
    #[error("invalid user data: {0:?}")]
    InvalidUser(semval::context::Context<NewUserInvalidity>),

    #[error("an account already exists for {0}")]
    DuplicateEmail(String),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum TokenRedemptionError {
    #[error("malformed uid")]
    InvalidUid(#[from] UidDecodeError),

    /// The token does not exist, belongs to another user or flow, or was
    /// already used.
    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    Expired,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ResetPasswordError {
    #[error("invalid password: {0:?}")]
    InvalidPassword(semval::context::Context<PasswordInvalidity>),

    #[error(transparent)]
    Token(#[from] TokenRedemptionError),
}

#[derive(Debug, Error)]
pub enum EmailRequestError {
    /// The operation is rate limited for the provided client.
    #[error("operation is rate limited")]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

const EMAIL_REQUESTS_PER_MINUTE: u64 = 10;
const REGISTRATIONS_PER_MINUTE: u64 = 10;

impl AccountService {
    /// Create a new account service.
    ///
    /// # Arguments
    ///
    /// * `rate_limiter` - The rate limiter to use for rate limited operations.
    /// * `token_repo` - The repository used to look up issued tokens.
    /// * `user_repo` - The repository used to persist and query users.
    /// * `verification` - The service used to issue and email tokens.
    pub fn new(
        rate_limiter: DynRateLimiter,
        token_repo: DynTokenRepo,
        user_repo: DynUserRepo,
        verification: VerificationService,
    ) -> Self {
        Self {
            rate_limiter,
            token_repo,
            user_repo,
            verification,
        }
    }

    /// Register a new, inactive user and email them an activation link.
    ///
    /// The user is committed before the email is sent. If sending fails the
    /// account stays inactive and the user can ask for a new link through
    /// [`AccountService::request_activation`].
    ///
    /// # Arguments
    ///
    /// * `client_identifier` - A unique identifier for the client performing
    ///   the operation. This is used for rate limiting.
    /// * `data` - The unvalidated email and password of the new user.
    pub async fn register(
        &self,
        client_identifier: &str,
        data: NewUserData,
    ) -> Result<User, RegisterError> {
        let rate_limit_key = format!("/account/register_post_{}", client_identifier);
        self.rate_limiter
            .record_operation(&rate_limit_key, REGISTRATIONS_PER_MINUTE)?;

        let new_user = NewUser::validated_from(data)
            .map_err(|(_, context)| RegisterError::InvalidUser(context))?;

        let user_model = NewUserModel::try_from(&new_user)
            .context("Failed to convert from domain to model.")?;

        let user = self
            .user_repo
            .persist_new_user(&user_model)
            .await
            .map_err(|error| match error {
                UserPersistenceError::DuplicateEmail(email) => RegisterError::DuplicateEmail(email),
                UserPersistenceError::Other(error) => {
                    error!(?error, "Failed to persist new user.");

                    RegisterError::Other(error)
                }
            })?;

        info!(user_id = user.id, "Registered new user.");

        self.verification.send_activation_email(&user).await?;

        Ok(user)
    }

    /// Send a fresh activation link to an inactive account.
    ///
    /// Succeeds without sending anything if no inactive account uses the
    /// address, so callers learn nothing about which accounts exist.
    ///
    /// # Arguments
    ///
    /// * `client_identifier` - A unique identifier for the client performing
    ///   the operation. This is used for rate limiting.
    /// * `email` - The address the account was registered with.
    pub async fn request_activation(
        &self,
        client_identifier: &str,
        email: &str,
    ) -> Result<(), EmailRequestError> {
        let rate_limit_key = format!("/account/resend_activation_post_{}", client_identifier);
        self.rate_limiter
            .record_operation(&rate_limit_key, EMAIL_REQUESTS_PER_MINUTE)?;

        match self.user_repo.find_user_by_email(&email::normalize(email)).await? {
            Some(user) if !user.is_active => {
                self.verification.send_activation_email(&user).await?;
            }
            Some(user) => {
                info!(user_id = user.id, "Ignored activation request for active user.");
            }
            None => {
                info!("Ignored activation request for unknown email.");
            }
        }

        Ok(())
    }

    /// Activate the account referenced by an emailed link.
    ///
    /// # Arguments
    ///
    /// * `encoded_uid` - The user ID as encoded in the activation URL.
    /// * `key` - The token from the activation URL.
    pub async fn activate(&self, encoded_uid: &str, key: &str) -> Result<User, TokenRedemptionError> {
        let user_id = uid::decode_uid(encoded_uid)?;
        let token = self.redeemable_token(key, TokenPurpose::Activation).await?;

        if token.user_id() != user_id {
            return Err(TokenRedemptionError::InvalidToken);
        }

        let user = self
            .user_repo
            .redeem_activation_token(&token)
            .await?
            .ok_or(TokenRedemptionError::InvalidToken)?;

        info!(user_id = user.id, "Activated user.");

        Ok(user)
    }

    /// Email a password reset link to the owner of an address.
    ///
    /// Succeeds without sending anything if no account uses the address.
    pub async fn request_password_reset(
        &self,
        client_identifier: &str,
        email: &str,
    ) -> Result<(), EmailRequestError> {
        let rate_limit_key = format!("/account/forgot_password_post_{}", client_identifier);
        self.rate_limiter
            .record_operation(&rate_limit_key, EMAIL_REQUESTS_PER_MINUTE)?;

        match self.user_repo.find_user_by_email(&email::normalize(email)).await? {
            Some(user) => self.verification.send_password_reset_email(&user).await?,
            None => info!("Ignored password reset request for unknown email."),
        }

        Ok(())
    }

    /// Replace a user's password using an emailed reset token.
    pub async fn reset_password(&self, key: &str, password: &str) -> Result<(), ResetPasswordError> {
        let password = Password::validated_from(password)
            .map_err(|(_, context)| ResetPasswordError::InvalidPassword(context))?;
        let token = self
            .redeemable_token(key, TokenPurpose::PasswordReset)
            .await?;

        let hash = passwords::Hash::new(&password).map_err(TokenRedemptionError::Other)?;

        let redeemed = self
            .user_repo
            .redeem_password_reset_token(&token, hash.value())
            .await
            .map_err(TokenRedemptionError::Other)?;

        if !redeemed {
            return Err(TokenRedemptionError::InvalidToken.into());
        }

        info!(user_id = token.user_id(), "Reset user's password.");

        Ok(())
    }

    async fn redeemable_token(
        &self,
        key: &str,
        purpose: TokenPurpose,
    ) -> Result<VerificationToken, TokenRedemptionError> {
        let token = self
            .token_repo
            .find_token(key)
            .await?
            .ok_or(TokenRedemptionError::InvalidToken)?;

        if token.purpose() != purpose {
            debug!(
                user_id = token.user_id(),
                issued_for = %token.purpose(),
                redeemed_for = %purpose,
                "Rejected token issued for another flow."
            );

            return Err(TokenRedemptionError::InvalidToken);
        }

        if !token.is_valid_at(Utc::now()) {
            debug!(user_id = token.user_id(), "Rejected expired token.");

            return Err(TokenRedemptionError::Expired);
        }

        Ok(token)
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use tera::Tera;

    use crate::{
        accounts::notifications::{NotificationConfig, Notifier},
        email::testing::RecordingMailer,
        rate_limit::testing::CountingRateLimiter,
        repos::memory::MemoryRepo,
    };

    use super::{AccountService, VerificationService};

    pub fn templates() -> Tera {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (
                super::ACTIVATION_TEMPLATE,
                "<a href=\"{{ confirmation_url | safe }}\">Activate {{ user.email }}</a> {{ year }}",
            ),
            (
                super::PASSWORD_RESET_TEMPLATE,
                "<a href=\"{{ password_reset_url | safe }}\">Reset {{ user.email }}</a> {{ year }}",
            ),
        ])
        .expect("templates should parse");

        tera
    }

    pub struct Harness {
        pub mailer: Arc<RecordingMailer>,
        pub rate_limiter: Arc<CountingRateLimiter>,
        pub repo: MemoryRepo,
        pub verification: VerificationService,
        pub accounts: AccountService,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_mailer(RecordingMailer::default())
        }

        pub fn with_mailer(mailer: RecordingMailer) -> Self {
            let mailer = Arc::new(mailer);
            let rate_limiter = Arc::new(CountingRateLimiter::default());
            let repo = MemoryRepo::default();

            let notifier = Notifier::new(
                NotificationConfig::new("https://app.test", "noreply@codegradr.test"),
                mailer.clone(),
                templates(),
            );
            let verification = VerificationService::new(notifier, Arc::new(repo.clone()));
            let accounts = AccountService::new(
                rate_limiter.clone(),
                Arc::new(repo.clone()),
                Arc::new(repo.clone()),
                verification.clone(),
            );

            Self {
                mailer,
                rate_limiter,
                repo,
                verification,
                accounts,
            }
        }
    }
}
