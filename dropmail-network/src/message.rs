use bytes::Bytes;
use std::{
    fmt,
    fs::File,
    io::{self, Cursor, Read},
    path::{Path, PathBuf},
    str::FromStr,
};
use tempfile::TempPath;

/// type tag of a [`SessionMessage`]
///
/// The node replies with a closed set of terminal tags that end the
/// lifecycle of a request (see [`MessageType::is_terminal`]); everything
/// else is a progress update. Tags this crate does not know about are kept
/// in [`MessageType::Other`] and are treated as progress.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MessageType {
    ClientHello,
    NodeHello,
    ClientGet,
    ClientPut,
    GenerateSsk,

    PutFailed,
    PutSuccessful,
    AllData,
    GetFailed,
    ProtocolError,
    SskKeypair,
    IdentifierCollision,

    /// never sent by the node: synthesized locally when the connection
    /// drops while requests are still pending
    ConnectionClosed,

    Other(String),
}

const KNOWN_TYPES: &[(MessageType, &str)] = &[
    (MessageType::ClientHello, "ClientHello"),
    (MessageType::NodeHello, "NodeHello"),
    (MessageType::ClientGet, "ClientGet"),
    (MessageType::ClientPut, "ClientPut"),
    (MessageType::GenerateSsk, "GenerateSSK"),
    (MessageType::PutFailed, "PutFailed"),
    (MessageType::PutSuccessful, "PutSuccessful"),
    (MessageType::AllData, "AllData"),
    (MessageType::GetFailed, "GetFailed"),
    (MessageType::ProtocolError, "ProtocolError"),
    (MessageType::SskKeypair, "SSKKeypair"),
    (MessageType::IdentifierCollision, "IdentifierCollision"),
    (MessageType::ConnectionClosed, "ConnectionClosed"),
];

impl MessageType {
    pub fn as_str(&self) -> &str {
        if let Self::Other(tag) = self {
            return tag.as_str();
        }

        KNOWN_TYPES
            .iter()
            .find(|(t, _)| t == self)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    /// does this message end the lifecycle of its request
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PutFailed
                | Self::PutSuccessful
                | Self::AllData
                | Self::GetFailed
                | Self::ProtocolError
                | Self::SskKeypair
                | Self::IdentifierCollision
                | Self::ConnectionClosed
        )
    }
}

impl<'a> From<&'a str> for MessageType {
    fn from(tag: &'a str) -> Self {
        KNOWN_TYPES
            .iter()
            .find(|(_, s)| s.eq_ignore_ascii_case(tag))
            .map(|(t, _)| t.clone())
            .unwrap_or_else(|| Self::Other(tag.to_owned()))
    }
}

impl FromStr for MessageType {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// headers of a [`SessionMessage`]
///
/// names are compared case-insensitively, the order is not significant.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// set the value of the header, returning the previous value if any
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();

        if let Some(entry) = self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(std::mem::replace(&mut entry.1, value))
        } else {
            self.0.push((name, value));
            None
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.0.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.0.swap_remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// binary content attached to a [`SessionMessage`]
///
/// payloads received from the node are staged in a temporary file which
/// is deleted as soon as the payload is dropped.
pub struct Payload {
    source: Source,
}

enum Source {
    Staged(TempPath),
    File(PathBuf),
    Bytes(Bytes),
}

/// reader over the content of a [`Payload`]
pub enum PayloadReader {
    File(File),
    Bytes(Cursor<Bytes>),
}

impl Payload {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Bytes(bytes.into()),
        }
    }

    /// payload read from an existing file at encoding time
    ///
    /// the file is not deleted when the payload is dropped.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File(path.into()),
        }
    }

    pub(crate) fn staged(path: TempPath) -> Self {
        Self {
            source: Source::Staged(path),
        }
    }

    /// number of bytes available in the payload
    pub fn len(&self) -> io::Result<u64> {
        match &self.source {
            Source::Bytes(bytes) => Ok(bytes.len() as u64),
            Source::Staged(path) => std::fs::metadata(path).map(|m| m.len()),
            Source::File(path) => std::fs::metadata(path).map(|m| m.len()),
        }
    }

    /// path of the file backing this payload, if any
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::Bytes(_) => None,
            Source::Staged(path) => Some(&**path),
            Source::File(path) => Some(&**path),
        }
    }

    pub fn reader(&self) -> io::Result<PayloadReader> {
        match &self.source {
            Source::Bytes(bytes) => Ok(PayloadReader::Bytes(Cursor::new(bytes.clone()))),
            Source::Staged(path) => File::open(path).map(PayloadReader::File),
            Source::File(path) => File::open(path).map(PayloadReader::File),
        }
    }

    /// read the whole payload in memory
    pub fn to_vec(&self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.reader()?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Read for PayloadReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::File(file) => file.read(buf),
            Self::Bytes(cursor) => cursor.read(buf),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Bytes(bytes) => f.debug_tuple("Payload").field(&bytes.len()).finish(),
            Source::Staged(path) => f.debug_tuple("Payload").field(&path.display()).finish(),
            Source::File(path) => f.debug_tuple("Payload").field(&path.display()).finish(),
        }
    }
}

/// one message of the session protocol
///
/// ```text
/// <TypeTag>
/// Identifier=<id>
/// [Name=Value]*
/// EndMessage
/// ```
#[derive(Debug)]
pub struct SessionMessage {
    message_type: MessageType,
    identifier: Option<String>,
    headers: Headers,
    payload: Option<Payload>,
}

impl SessionMessage {
    pub fn new(message_type: MessageType, identifier: impl Into<String>) -> Self {
        Self {
            message_type,
            identifier: Some(identifier.into()),
            headers: Headers::default(),
            payload: None,
        }
    }

    pub(crate) fn anonymous(message_type: MessageType) -> Self {
        Self {
            message_type,
            identifier: None,
            headers: Headers::default(),
            payload: None,
        }
    }

    /// the synthetic terminal reply delivered to pending requests when
    /// the connection with the node is lost
    pub fn connection_closed(identifier: impl Into<String>) -> Self {
        Self::new(MessageType::ConnectionClosed, identifier)
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn is_terminal(&self) -> bool {
        self.message_type.is_terminal()
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// set a header
    ///
    /// the `Identifier` header is not a generic header: it sets the
    /// identifier of the message.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if name.eq_ignore_ascii_case("Identifier") {
            self.identifier = Some(value.into());
        } else {
            self.headers.insert(name, value);
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn take_payload(&mut self) -> Option<Payload> {
        self.payload.take()
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = Some(payload);
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.set_payload(payload);
        self
    }

    pub(crate) fn into_parts(self) -> (MessageType, Option<String>, Headers, Option<Payload>) {
        (
            self.message_type,
            self.identifier,
            self.headers,
            self.payload,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_tags() {
        for tag in &[
            "PutFailed",
            "PutSuccessful",
            "AllData",
            "GetFailed",
            "ProtocolError",
            "SSKKeypair",
            "IdentifierCollision",
        ] {
            assert!(MessageType::from(*tag).is_terminal(), "{} is terminal", tag);
        }

        assert!(MessageType::ConnectionClosed.is_terminal());

        for tag in &["NodeHello", "DataFound", "SimpleProgress", "URIGenerated"] {
            assert!(!MessageType::from(*tag).is_terminal(), "{} is progress", tag);
        }
    }

    #[test]
    fn tags_are_case_insensitive() {
        assert_eq!(MessageType::from("alldata"), MessageType::AllData);
        assert_eq!(MessageType::from("sskkeypair"), MessageType::SskKeypair);
        assert_eq!(MessageType::SskKeypair.as_str(), "SSKKeypair");
        assert_eq!(
            MessageType::from("SimpleProgress"),
            MessageType::Other("SimpleProgress".to_owned())
        );
        assert_eq!(MessageType::from("SimpleProgress").as_str(), "SimpleProgress");
    }

    #[test]
    fn headers_are_case_insensitive() {
        let mut headers = Headers::default();
        assert_eq!(headers.insert("DataLength", "12"), None);
        assert_eq!(headers.get("datalength"), Some("12"));
        assert_eq!(headers.insert("DATALENGTH", "13"), Some("12".to_owned()));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.remove("dataLength"), Some("13".to_owned()));
        assert!(headers.is_empty());
    }

    #[test]
    fn identifier_header_sets_the_identifier() {
        let message = SessionMessage::anonymous(MessageType::NodeHello)
            .with_header("identifier", "42")
            .with_header("Version", "2.0");

        assert_eq!(message.identifier(), Some("42"));
        assert_eq!(message.header("Identifier"), None);
        assert_eq!(message.header("version"), Some("2.0"));
    }

    #[test]
    fn payload_from_bytes() {
        let payload = Payload::from_bytes(&b"hello"[..]);
        assert_eq!(payload.len().unwrap(), 5);
        assert_eq!(payload.to_vec().unwrap(), b"hello");
        assert!(payload.path().is_none());
    }
}
