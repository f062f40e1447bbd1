use semval::prelude::*;

/// Trim an address and lowercase its domain.
///
/// Only the domain of an address is case insensitive, so the local part is
/// kept as provided. The last "@" delimits the domain since local parts may
/// contain the symbol too.
pub fn normalize(raw_address: &str) -> String {
    let trimmed = raw_address.trim();

    match trimmed.rsplit_once('@') {
        Some((local_part, domain)) => format!("{}@{}", local_part, domain.to_lowercase()),
        None => trimmed.to_owned(),
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Email(String);

impl Email {
    /// Create an unvalidated email.
    ///
    /// This can be useful when constructing an object that contains an email
    /// but has not been validated yet.
    ///
    /// # Arguments
    ///
    /// * `address` - The email's address.
    pub fn unvalidated(address: String) -> Self {
        Self(address)
    }

    pub fn address(&self) -> &str {
        &self.0
    }

    fn has_domain(&self) -> bool {
        match self.0.rfind('@') {
            Some(index) => index < self.0.len() - 1,
            None => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EmailInvalidity {
    /// The address does not have a domain portion.
    MissingDomain,

    /// The address is missing the `@` symbol separating the local and domain
    /// parts.
    MissingSeparator,
}

impl Validate for Email {
    type Invalidity = EmailInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        ValidationContext::new()
            .invalidate_if(!self.0.contains('@'), EmailInvalidity::MissingSeparator)
            .invalidate_if(!self.has_domain(), EmailInvalidity::MissingDomain)
            .into()
    }
}

impl ValidatedFrom<&str> for Email {
    fn validated_from(from: &str) -> ValidatedResult<Self> {
        let into = Self(normalize(from));

        match into.validate() {
            Ok(()) => Ok(into),
            Err(context) => Err((into, context)),
        }
    }
}
