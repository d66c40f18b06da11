/*!
# session protocol encoder/decoder

the session protocol is line oriented: a type tag, `Name=Value` headers
and a terminating `EndMessage` line. A message may carry a binary payload,
in which case the header block ends with a `Data` line and exactly
`DataLength` raw bytes follow.

Received payloads are not kept in memory: they are streamed into a
temporary file as they arrive.
*/

mod decode;
mod encode;

use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// default limit of the length of a line (excluding the line terminator)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 200;

/// name the client advertises during the handshake
pub const CLIENT_NAME: &str = "dropmail";

/// version of the session protocol the client expects
pub const EXPECTED_VERSION: &str = "2.0";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error on the session stream")]
    Io(#[from] io::Error),

    #[error("Cannot determine the length of the payload")]
    PayloadLength(#[source] io::Error),

    #[error("Cannot read the payload")]
    PayloadRead(#[source] io::Error),

    #[error("Line is longer than the {0} bytes limit")]
    LineTooLong(usize),
}

/**
# codec of the session protocol

the same codec is used for both halves of the connection: the decoder
side stages received payloads in `temp_dir`.
*/
pub struct SessionCodec {
    temp_dir: PathBuf,
    max_line: usize,
    state: decode::State,
}

impl SessionCodec {
    pub fn new(temp_dir: impl AsRef<Path>) -> Self {
        Self {
            temp_dir: temp_dir.as_ref().to_path_buf(),
            max_line: DEFAULT_MAX_LINE_LENGTH,
            state: decode::State::default(),
        }
    }

    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageType, Payload, SessionMessage};
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder as _, Encoder as _};

    fn codec(dir: &Path) -> SessionCodec {
        SessionCodec::new(dir)
    }

    fn encode(message: SessionMessage) -> String {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = BytesMut::new();
        codec(dir.path()).encode(message, &mut bytes).unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn decode_headers() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(dir.path());
        let mut src = BytesMut::from(
            &b"\r\nGetFailed\r\nIdentifier=12\r\nCode=28\r\nnot a header\r\na=b=c\r\nEndMessage\r\n"[..],
        );

        let message = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(message.message_type(), &MessageType::GetFailed);
        assert_eq!(message.identifier(), Some("12"));
        assert_eq!(message.header("code"), Some("28"));
        assert_eq!(message.headers().len(), 1);
        assert!(message.payload().is_none());
        assert!(src.is_empty());
    }

    #[test]
    fn decode_accepts_bare_line_feed() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(dir.path());
        let mut src = BytesMut::from(&b"NodeHello\nVersion=2.0\nEndMessage\n"[..]);

        let message = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(message.message_type(), &MessageType::NodeHello);
        assert_eq!(message.header("Version"), Some("2.0"));
    }

    #[test]
    fn decode_payload_in_pieces() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(dir.path());
        let mut src = BytesMut::from(&b"AllData\r\nIdentifier=1\r\nDataLength=11\r\nData\r\nhello"[..]);

        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(b" world");
        src.extend_from_slice(b"NodeHello\r\nEnd\r\n");

        let mut message = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(message.message_type(), &MessageType::AllData);
        let payload = message.take_payload().unwrap();
        assert_eq!(payload.to_vec().unwrap(), b"hello world");

        let path = payload.path().unwrap().to_path_buf();
        assert!(path.starts_with(dir.path()));
        std::mem::drop(payload);
        assert!(!path.exists(), "staged payload is deleted on drop");

        let next = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(next.message_type(), &MessageType::NodeHello);
    }

    #[test]
    fn decode_invalid_data_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(dir.path());
        let mut src = BytesMut::from(&b"AllData\r\nIdentifier=1\r\nDataLength=many\r\nData\r\n"[..]);

        let message = codec.decode(&mut src).unwrap().unwrap();
        assert!(message.payload().is_none());
    }

    #[test]
    fn decode_discards_payload_that_cannot_be_staged() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(&dir.path().join("missing"));
        let mut src =
            BytesMut::from(&b"AllData\r\nIdentifier=1\r\nDataLength=3\r\nData\r\nabcGetFailed\r\nEnd\r\n"[..]);

        let message = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(message.message_type(), &MessageType::AllData);
        assert!(message.payload().is_none());

        let next = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(next.message_type(), &MessageType::GetFailed);
    }

    #[test]
    fn decode_line_too_long() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(dir.path()).with_max_line(8);

        let mut src = BytesMut::from(&b"NodeHello\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(CodecError::LineTooLong(8))
        ));

        let mut codec = SessionCodec::new(dir.path()).with_max_line(8);
        let mut src = BytesMut::from(&b"NodeHelloWithoutEnd"[..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(CodecError::LineTooLong(8))
        ));
    }

    #[test]
    fn encode_hello() {
        let encoded = encode(SessionMessage::anonymous(MessageType::ClientHello).with_header("Name", "other"));
        assert_eq!(
            encoded,
            "ClientHello\r\nName=dropmail\r\nExpectedVersion=2.0\r\nEndMessage\r\n"
        );
    }

    #[test]
    fn encode_with_payload() {
        let message = SessionMessage::new(MessageType::ClientPut, "7")
            .with_header("URI", "KSK@test")
            .with_header("DataLength", "1000")
            .with_payload(Payload::from_bytes(&b"body"[..]));

        assert_eq!(
            encode(message),
            "ClientPut\r\nIdentifier=7\r\nURI=KSK@test\r\nUploadFrom=direct\r\nDataLength=4\r\nData\r\nbody"
        );
    }

    #[test]
    fn encode_unreadable_payload() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(dir.path());
        let mut dst = BytesMut::new();
        let message = SessionMessage::new(MessageType::ClientPut, "7")
            .with_payload(Payload::from_file(dir.path().join("missing")));

        assert!(matches!(
            codec.encode(message, &mut dst),
            Err(CodecError::PayloadLength(_))
        ));
        assert!(dst.is_empty());
    }

    #[test]
    fn encode_then_decode() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = codec(dir.path());
        let mut buffer = BytesMut::new();
        let message = SessionMessage::new(MessageType::PutSuccessful, "3")
            .with_header("URI", "SSK@key/2021-03-04-1")
            .with_payload(Payload::from_bytes(&b"\r\nEndMessage\r\n"[..]));

        codec.encode(message, &mut buffer).unwrap();
        let mut decoded = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(decoded.identifier(), Some("3"));
        assert_eq!(decoded.header("URI"), Some("SSK@key/2021-03-04-1"));
        assert_eq!(
            decoded.take_payload().unwrap().to_vec().unwrap(),
            b"\r\nEndMessage\r\n"
        );
    }
}
