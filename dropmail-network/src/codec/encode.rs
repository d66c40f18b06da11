use super::{CodecError, SessionCodec, CLIENT_NAME, EXPECTED_VERSION};
use crate::message::{MessageType, SessionMessage};
use bytes::{BufMut as _, BytesMut};
use std::io::{self, Read as _};
use tokio_util::codec::Encoder;

/// headers the encoder writes itself
const RESERVED: &[&str] = &["Identifier", "UploadFrom", "DataLength"];
const HELLO: &[&str] = &["Name", "ExpectedVersion"];

fn put_line(dst: &mut BytesMut, line: &str) {
    dst.extend_from_slice(line.as_bytes());
    dst.extend_from_slice(b"\r\n");
}

fn put_header(dst: &mut BytesMut, name: &str, value: &str) {
    dst.reserve(name.len() + value.len() + 3);
    dst.extend_from_slice(name.as_bytes());
    dst.put_u8(b'=');
    put_line(dst, value);
}

fn is_reserved(message_type: &MessageType, name: &str) -> bool {
    let reserved = |list: &[&str]| list.iter().any(|r| r.eq_ignore_ascii_case(name));
    reserved(RESERVED) || (message_type == &MessageType::ClientHello && reserved(HELLO))
}

impl Encoder<SessionMessage> for SessionCodec {
    type Error = CodecError;

    /// the message is fully encoded before anything is appended to `dst`:
    /// a failure to read the payload leaves `dst` untouched
    fn encode(&mut self, item: SessionMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (message_type, identifier, headers, payload) = item.into_parts();
        let mut buffer = BytesMut::new();

        put_line(&mut buffer, message_type.as_str());
        if message_type == MessageType::ClientHello {
            put_header(&mut buffer, "Name", CLIENT_NAME);
            put_header(&mut buffer, "ExpectedVersion", EXPECTED_VERSION);
        }
        if let Some(identifier) = identifier.as_deref() {
            put_header(&mut buffer, "Identifier", identifier);
        }
        for (name, value) in headers.iter() {
            if !is_reserved(&message_type, name) {
                put_header(&mut buffer, name, value);
            }
        }

        if let Some(payload) = payload {
            let length = payload.len().map_err(CodecError::PayloadLength)?;

            put_header(&mut buffer, "UploadFrom", "direct");
            put_header(&mut buffer, "DataLength", &length.to_string());
            put_line(&mut buffer, "Data");

            let reader = payload.reader().map_err(CodecError::PayloadRead)?;
            let mut writer = buffer.writer();
            let copied = io::copy(&mut reader.take(length), &mut writer)
                .map_err(CodecError::PayloadRead)?;
            buffer = writer.into_inner();

            if copied != length {
                return Err(CodecError::PayloadRead(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "payload is shorter than its announced length",
                )));
            }
        } else {
            put_line(&mut buffer, "EndMessage");
        }

        dst.extend_from_slice(&buffer);
        Ok(())
    }
}
