use super::{CodecError, SessionCodec};
use crate::message::{Payload, SessionMessage};
use bytes::BytesMut;
use std::io::Write as _;
use tempfile::NamedTempFile;
use tokio_util::codec::Decoder;

const PAYLOAD_CHUNK: usize = 8 * 1024;

/// state of the data being read
///
/// initially we are parsing lines: the type tag then the headers. When a
/// `Data` line is found the state switches to [`State::Payload`] until
/// all the announced bytes have been consumed.
pub(super) enum State {
    Lines(Option<SessionMessage>),
    Payload {
        message: SessionMessage,
        remaining: u64,
        sink: Option<NamedTempFile>,
    },
}

impl Default for State {
    fn default() -> Self {
        Self::Lines(None)
    }
}

impl SessionCodec {
    fn next_line(&self, src: &mut BytesMut) -> Result<Option<String>, CodecError> {
        let end = match src.iter().position(|b| *b == b'\n') {
            Some(end) => end,
            // leave room for a pending `\r`
            None if src.len() > self.max_line + 1 => {
                return Err(CodecError::LineTooLong(self.max_line))
            }
            None => return Ok(None),
        };

        let mut line = src.split_to(end + 1);
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }

        if line.len() > self.max_line {
            return Err(CodecError::LineTooLong(self.max_line));
        }

        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// prepare to receive the payload of the given message
    ///
    /// if the announced length is not usable the message is returned as is
    fn start_payload(&self, message: SessionMessage) -> Result<State, SessionMessage> {
        let remaining = match message
            .header("DataLength")
            .and_then(|length| length.trim().parse::<u64>().ok())
        {
            Some(remaining) => remaining,
            None => {
                tracing::warn!(
                    message_type = %message.message_type(),
                    "invalid or missing DataLength, delivering message without payload"
                );
                return Err(message);
            }
        };

        let sink = match tempfile::Builder::new()
            .prefix("payload-")
            .tempfile_in(&self.temp_dir)
        {
            Ok(sink) => Some(sink),
            Err(error) => {
                tracing::warn!(
                    %error,
                    temp_dir = %self.temp_dir.display(),
                    "cannot stage payload, it will be discarded"
                );
                None
            }
        };

        Ok(State::Payload {
            message,
            remaining,
            sink,
        })
    }
}

fn parse_header(message: &mut SessionMessage, line: &str) {
    let mut parts = line.split('=');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(value), None) if !name.trim().is_empty() => {
            message.set_header(name.trim(), value)
        }
        _ => tracing::trace!(line, "discarding malformed header line"),
    }
}

impl Decoder for SessionCodec {
    type Item = SessionMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match std::mem::take(&mut self.state) {
                State::Lines(current) => {
                    let line = match self.next_line(src) {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            self.state = State::Lines(current);
                            return Ok(None);
                        }
                        Err(error) => {
                            self.state = State::Lines(current);
                            return Err(error);
                        }
                    };

                    match current {
                        None => {
                            let tag = line.trim();
                            if !tag.is_empty() {
                                self.state =
                                    State::Lines(Some(SessionMessage::anonymous(tag.into())));
                            }
                        }
                        Some(message) if line.starts_with("End") => return Ok(Some(message)),
                        Some(message) if line == "Data" => match self.start_payload(message) {
                            Ok(state) => self.state = state,
                            Err(message) => return Ok(Some(message)),
                        },
                        Some(mut message) => {
                            parse_header(&mut message, &line);
                            self.state = State::Lines(Some(message));
                        }
                    }
                }
                State::Payload {
                    mut message,
                    mut remaining,
                    mut sink,
                } => {
                    if remaining > 0 {
                        if src.is_empty() {
                            self.state = State::Payload {
                                message,
                                remaining,
                                sink,
                            };
                            return Ok(None);
                        }

                        let n = std::cmp::min(remaining, src.len() as u64) as usize;
                        let chunk = src.split_to(n);
                        remaining -= n as u64;

                        if let Some(file) = sink.as_mut() {
                            if let Err(error) = file.write_all(&chunk) {
                                tracing::warn!(%error, "cannot stage payload, it will be discarded");
                                sink = None;
                            }
                        }

                        if remaining > 0 {
                            src.reserve(std::cmp::min(remaining, PAYLOAD_CHUNK as u64) as usize);
                            self.state = State::Payload {
                                message,
                                remaining,
                                sink,
                            };
                            return Ok(None);
                        }
                    }

                    if let Some(mut file) = sink {
                        match file.flush() {
                            Ok(()) => message.set_payload(Payload::staged(file.into_temp_path())),
                            Err(error) => {
                                tracing::warn!(%error, "cannot stage payload, it will be discarded")
                            }
                        }
                    }

                    return Ok(Some(message));
                }
            }
        }
    }
}
