use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub const TOKEN_LENGTH: usize = 64;

/// Lifetime of a token when the caller does not ask for a specific one.
pub fn default_expiry() -> Duration {
    Duration::minutes(15)
}

/// Lifetime of password reset tokens.
pub fn password_reset_expiry() -> Duration {
    Duration::hours(1)
}

/// The flow a token was issued for. A token is only redeemable by that flow.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenPurpose {
    Activation,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenPurpose {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activation" => Ok(Self::Activation),
            "password_reset" => Ok(Self::PasswordReset),
            other => Err(anyhow::anyhow!("unknown token purpose: {}", other)),
        }
    }
}

/// An opaque token binding a one-time action to a user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerificationToken {
    key: String,
    user_id: i64,
    purpose: TokenPurpose,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl VerificationToken {
    /// Generate a new token for a user.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The ID of the user who owns the token.
    /// * `purpose` - The flow allowed to redeem the token.
    /// * `expiry` - How long the token remains valid. Falls back to
    ///   [`default_expiry`] if not provided.
    ///
    /// # Returns
    ///
    /// A token with a random key drawn from a cryptographically secure
    /// generator, expiring `expiry` after its creation time.
    pub fn generate(user_id: i64, purpose: TokenPurpose, expiry: Option<Duration>) -> Self {
        let key: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        let created_at = Utc::now();

        Self {
            key,
            user_id,
            purpose,
            created_at,
            expires_at: created_at + expiry.unwrap_or_else(default_expiry),
        }
    }

    /// Rebuild a token from persisted values.
    pub fn from_parts(
        key: String,
        user_id: i64,
        purpose: TokenPurpose,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            user_id,
            purpose,
            created_at,
            expires_at,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn purpose(&self) -> TokenPurpose {
        self.purpose
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// A token may only be redeemed strictly before its expiration time.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
