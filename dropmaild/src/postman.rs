use anyhow::{Context as _, Result};
use chrono::Utc;
use dropmail_storage::{CommittedMessage, MessageBank};
use std::{
    fs::File,
    io::{BufRead as _, BufReader, Write as _},
    path::Path,
};

const FROM: &str = "postmaster";
const SUBJECT: &str = "Undeliverable Dropmail";

/// notify the sender that a message could not be delivered
///
/// the notice, quoting the original message, is committed into the
/// sender's own message bank.
pub fn bounce(bank: &MessageBank, original: &Path, reason: &str) -> Result<CommittedMessage> {
    let source = File::open(original)
        .with_context(|| format!("Cannot open {}", original.display()))?;
    let mut source = BufReader::new(source);

    let mut message = bank.create_message()?;
    message.add_header("From", FROM)?;
    message.add_header("Subject", SUBJECT)?;
    message.add_header("Date", &Utc::now().to_rfc2822())?;
    message.add_header("Content-Type", "text/plain; charset=UTF-8")?;

    write!(
        message,
        "\r\nYour message could not be delivered.\r\n\r\n{}\r\n\r\nThe original message follows:\r\n\r\n",
        reason
    )?;

    let mut line = Vec::new();
    loop {
        line.clear();
        let read = source
            .read_until(b'\n', &mut line)
            .with_context(|| format!("Cannot read {}", original.display()))?;
        if read == 0 {
            break;
        }
        while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
            line.pop();
        }

        message.write_all(b"> ")?;
        message.write_all(&line)?;
        message.write_all(b"\r\n")?;
    }

    message.commit()
}
