use crate::fs;
use anyhow::{Context as _, Result};
use dropmail_lib::{Checksum, ChecksumHasher};
use std::{
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

const EXTENSION: &str = "msg";

/// the received messages of an account
///
/// messages are numbered in the order they are committed: `<n>.msg`
#[derive(Debug, Clone)]
pub struct MessageBank {
    dir: PathBuf,
}

/// a message being written into the [`MessageBank`]
///
/// nothing is visible in the bank until [`NewMessage::commit`] is called,
/// dropping the `NewMessage` discards it.
pub struct NewMessage {
    dir: PathBuf,
    file: BufWriter<NamedTempFile>,
    hasher: ChecksumHasher,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedMessage {
    pub path: PathBuf,
    /// checksum of the committed bytes
    pub checksum: Checksum,
}

fn message_number(file_name: &str) -> Option<u64> {
    let (number, extension) = file_name.split_at(file_name.rfind('.')?);
    if &extension[1..] == EXTENSION {
        number.parse().ok()
    } else {
        None
    }
}

impl MessageBank {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn create_message(&self) -> Result<NewMessage> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create the message bank {}", self.dir.display()))?;
        let file = tempfile::Builder::new()
            .prefix(".incoming-")
            .tempfile_in(&self.dir)
            .with_context(|| format!("Cannot create a new message in {}", self.dir.display()))?;

        Ok(NewMessage {
            dir: self.dir.clone(),
            file: BufWriter::new(file),
            hasher: Checksum::hasher(),
        })
    }

    /// the committed messages, in the order they were committed
    pub fn messages(&self) -> Result<Vec<PathBuf>> {
        let mut messages: Vec<(u64, PathBuf)> = fs::list_files(&self.dir)?
            .into_iter()
            .filter_map(|(name, path)| Some((message_number(&name)?, path)))
            .collect();
        messages.sort();
        Ok(messages.into_iter().map(|(_, path)| path).collect())
    }

    fn next_number(&self) -> Result<u64> {
        Ok(fs::list_files(&self.dir)?
            .iter()
            .filter_map(|(name, _)| message_number(name))
            .max()
            .map_or(1, |n| n + 1))
    }
}

impl NewMessage {
    pub fn add_header(&mut self, name: &str, value: &str) -> io::Result<()> {
        write!(self, "{}: {}\r\n", name, value)
    }

    /// add an already formatted header line, the line terminator excluded
    pub fn add_raw_header_line(&mut self, line: &str) -> io::Result<()> {
        self.write_all(line.as_bytes())?;
        self.write_all(b"\r\n")
    }

    /// make the message visible in the bank
    pub fn commit(self) -> Result<CommittedMessage> {
        let Self { dir, file, hasher } = self;
        let file = file
            .into_inner()
            .map_err(|error| error.into_error())
            .context("Cannot write the message")?;
        file.as_file()
            .sync_all()
            .context("Cannot write the message")?;

        let bank = MessageBank::new(dir);
        let mut number = bank.next_number()?;
        loop {
            let path = bank.dir.join(format!("{}.{}", number, EXTENSION));
            if fs::link_no_clobber(file.path(), &path)? {
                let checksum = hasher.finalize();
                tracing::debug!(path = %path.display(), %checksum, "message committed");
                return Ok(CommittedMessage { path, checksum });
            }
            number += 1;
        }
    }
}

impl Write for NewMessage {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
