use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt::{self, Formatter},
    str::FromStr,
};
use thiserror::Error;

/// a mail address: `user@domain`
///
/// the address is also used as a file name component (in the outbox and
/// in the contact store) so path separators are refused at parsing time.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress {
    user: String,
    domain: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")]
    Empty,
    #[error("address has no domain: {0}")]
    MissingDomain(String),
    #[error("address has no user: {0}")]
    MissingUser(String),
    #[error("address contains invalid character {1:?}: {0}")]
    InvalidCharacter(String, char),
}

impl EmailAddress {
    pub fn new(user: impl Into<String>, domain: impl Into<String>) -> Result<Self, AddressError> {
        let user = user.into();
        let domain = domain.into();
        format!("{}@{}", user, domain).parse()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// check the address lives on the anonymous network rather than on
    /// the clearnet
    ///
    /// ```
    /// # use dropmail_lib::EmailAddress;
    /// let alice: EmailAddress = "alice@example.dropmail".parse().unwrap();
    /// assert!(alice.is_native("dropmail"));
    /// assert!(!alice.is_native("freemail"));
    /// ```
    pub fn is_native(&self, native_domain: &str) -> bool {
        let domain = self.domain.to_ascii_lowercase();
        let native = native_domain.trim_start_matches('.').to_ascii_lowercase();

        domain == native || domain.ends_with(&format!(".{}", native))
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.domain)
    }
}

impl fmt::Debug for EmailAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EmailAddress").field(&self.to_string()).finish()
    }
}

impl FromStr for EmailAddress {
    type Err = AddressError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut s = s.trim();

        // accept `Name <user@domain>` as well
        if let (Some(start), true) = (s.rfind('<'), s.ends_with('>')) {
            s = &s[start + 1..s.len() - 1];
        }

        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        for c in s.chars() {
            if c.is_whitespace() || c.is_control() || c == '/' || c == '\\' {
                return Err(AddressError::InvalidCharacter(s.to_owned(), c));
            }
        }

        let (user, domain) = match s.rfind('@') {
            Some(index) => (&s[..index], &s[index + 1..]),
            None => return Err(AddressError::MissingDomain(s.to_owned())),
        };

        if domain.is_empty() {
            return Err(AddressError::MissingDomain(s.to_owned()));
        }
        if user.is_empty() {
            return Err(AddressError::MissingUser(s.to_owned()));
        }

        Ok(Self {
            user: user.to_owned(),
            domain: domain.to_owned(),
        })
    }
}

impl From<EmailAddress> for String {
    fn from(address: EmailAddress) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = AddressError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl<'a> TryFrom<&'a str> for EmailAddress {
    type Error = AddressError;
    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        value.parse()
    }
}
