use std::{
    fmt::{self, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;

/// name of an entry in the outbox
///
/// The name carries the whole state of the entry so that updating
/// the number of attempts is a single atomic rename:
///
/// ```text
/// {disambiguator}_{attempts}_{recipient}
/// ```
///
/// the `disambiguator` is only there to avoid name collisions when the same
/// message is queued more than once for the same recipient.
///
/// ```
/// # use dropmail_lib::EntryName;
/// let name: EntryName = "1_9_alice@example.freemail".parse().unwrap();
/// assert_eq!(name.attempts(), 9);
/// assert_eq!(name.recipient(), "alice@example.freemail");
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EntryName {
    disambiguator: u32,
    attempts: u32,
    recipient: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryNameError {
    #[error("expecting `{{disambiguator}}_{{attempts}}_{{recipient}}`, got {0:?}")]
    Layout(String),
    #[error("invalid disambiguator in {0:?}")]
    Disambiguator(String, #[source] ParseIntError),
    #[error("invalid attempt counter in {0:?}")]
    Attempts(String, #[source] ParseIntError),
}

impl EntryName {
    pub const SEPARATOR: char = '_';

    pub fn new(disambiguator: u32, attempts: u32, recipient: impl Into<String>) -> Self {
        Self {
            disambiguator,
            attempts,
            recipient: recipient.into(),
        }
    }

    pub fn disambiguator(&self) -> u32 {
        self.disambiguator
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// same entry with a different disambiguator
    pub fn with_disambiguator(&self, disambiguator: u32) -> Self {
        Self {
            disambiguator,
            ..self.clone()
        }
    }

    /// same entry with a different number of attempts
    pub fn with_attempts(&self, attempts: u32) -> Self {
        Self {
            attempts,
            ..self.clone()
        }
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.disambiguator,
            self.attempts,
            self.recipient,
            sep = Self::SEPARATOR
        )
    }
}

impl FromStr for EntryName {
    type Err = EntryNameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, Self::SEPARATOR);

        let (disambiguator, attempts, recipient) = match (parts.next(), parts.next(), parts.next())
        {
            (Some(d), Some(a), Some(r)) if !r.is_empty() => (d, a, r),
            _ => return Err(EntryNameError::Layout(s.to_owned())),
        };

        let disambiguator = disambiguator
            .parse()
            .map_err(|error| EntryNameError::Disambiguator(s.to_owned(), error))?;
        let attempts = attempts
            .parse()
            .map_err(|error| EntryNameError::Attempts(s.to_owned(), error))?;

        Ok(Self::new(disambiguator, attempts, recipient))
    }
}
