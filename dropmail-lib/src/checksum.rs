use cryptoxide::{blake2b::Blake2b, digest::Digest as _};
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt::{self, Formatter},
    str::FromStr,
};

const SIZE: usize = 32;

/// checksum of a committed message
///
/// this is a Blake2b (256 bits) digest over the exact bytes committed
/// into the message bank.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum([u8; SIZE]);

/// incremental computation of a [`Checksum`]
pub struct ChecksumHasher(Blake2b);

impl Checksum {
    pub const SIZE: usize = SIZE;

    pub fn compute(bytes: impl AsRef<[u8]>) -> Self {
        let mut hasher = Self::hasher();
        hasher.update(bytes.as_ref());
        hasher.finalize()
    }

    pub fn hasher() -> ChecksumHasher {
        ChecksumHasher(Blake2b::new(Self::SIZE))
    }
}

impl ChecksumHasher {
    pub fn update(&mut self, bytes: &[u8]) {
        self.0.input(bytes);
    }

    pub fn finalize(mut self) -> Checksum {
        let mut checksum = Checksum([0; Checksum::SIZE]);
        self.0.result(&mut checksum.0);
        checksum
    }
}

impl AsRef<[u8]> for Checksum {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Checksum")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl FromStr for Checksum {
    type Err = hex::FromHexError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut checksum = Self([0; Self::SIZE]);
        hex::decode_to_slice(s, &mut checksum.0)?;
        Ok(checksum)
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.to_string()
    }
}

impl TryFrom<String> for Checksum {
    type Error = hex::FromHexError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_oneshot() {
        let mut hasher = Checksum::hasher();
        hasher.update(b"Subject: hello\r\n");
        hasher.update(b"\r\n");
        hasher.update(b"body");

        assert_eq!(
            hasher.finalize(),
            Checksum::compute(b"Subject: hello\r\n\r\nbody")
        );
    }

    #[test]
    fn different_content_different_checksum() {
        assert_ne!(Checksum::compute(b"a"), Checksum::compute(b"b"));
    }
}
