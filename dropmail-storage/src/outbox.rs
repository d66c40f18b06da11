use crate::fs;
use anyhow::{Context as _, Result};
use dropmail_lib::{EntryName, EntryNameError};
use std::{
    io,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

/// queue of the messages waiting to be delivered
///
/// every entry is a file whose name carries the delivery state (see
/// [`EntryName`]). Updating the state of an entry is a rename, so the
/// queue is always consistent on disk.
#[derive(Debug, Clone)]
pub struct Outbox {
    dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    path: PathBuf,
    file_name: String,
}

impl OutboxEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn name(&self) -> Result<EntryName, EntryNameError> {
        self.file_name.parse()
    }
}

impl Outbox {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create the outbox {}", self.dir.display()))
    }

    /// a hidden file in the outbox directory to prepare a new entry
    ///
    /// the file is deleted if it is dropped before being enqueued
    pub fn staging(&self) -> Result<NamedTempFile> {
        self.ensure()?;
        tempfile::Builder::new()
            .prefix(".staging-")
            .tempfile_in(&self.dir)
            .with_context(|| format!("Cannot create staging file in {}", self.dir.display()))
    }

    /// the entries of the outbox, hidden files excluded
    pub fn entries(&self) -> Result<Vec<OutboxEntry>> {
        Ok(fs::list_files(&self.dir)?
            .into_iter()
            .map(|(file_name, path)| OutboxEntry { path, file_name })
            .collect())
    }

    /// move the staged message into the outbox
    ///
    /// the entry is committed under the first free name of the form
    /// `<disambiguator>_<attempts>_<recipient>`
    pub fn enqueue(
        &self,
        staged: NamedTempFile,
        attempts: u32,
        recipient: &str,
    ) -> Result<OutboxEntry> {
        let name = EntryName::new(1, attempts, recipient);
        let mut staged = staged;
        let mut disambiguator = name.disambiguator();

        loop {
            let file_name = name.with_disambiguator(disambiguator).to_string();
            let path = self.dir.join(&file_name);

            match staged.persist_noclobber(&path) {
                Ok(_) => {
                    tracing::debug!(entry = %file_name, "message enqueued");
                    return Ok(OutboxEntry { path, file_name });
                }
                Err(error) if error.error.kind() == io::ErrorKind::AlreadyExists => {
                    staged = error.file;
                }
                Err(error) => {
                    return Err(error.error)
                        .with_context(|| format!("Cannot enqueue {}", path.display()))
                }
            }

            disambiguator = next_disambiguator(disambiguator)?;
        }
    }

    /// rename the entry to record the new number of attempts
    ///
    /// the rename is the commit point: the entry is never visible under
    /// both names. Only the delivery worker renames entries, new entries
    /// are enqueued with no attempts.
    pub fn requeue(&self, entry: &OutboxEntry, attempts: u32) -> Result<OutboxEntry> {
        let name = entry
            .name()
            .with_context(|| format!("Invalid outbox entry {}", entry.file_name))?
            .with_attempts(attempts);
        let mut disambiguator = name.disambiguator().max(1);

        loop {
            let file_name = name.with_disambiguator(disambiguator).to_string();
            let path = self.dir.join(&file_name);

            if fs::rename_no_clobber(&entry.path, &path)? {
                return Ok(OutboxEntry { path, file_name });
            }

            disambiguator = next_disambiguator(disambiguator)?;
        }
    }

    pub fn remove(&self, entry: &OutboxEntry) -> Result<()> {
        std::fs::remove_file(&entry.path)
            .with_context(|| format!("Cannot remove outbox entry {}", entry.path.display()))
    }
}

fn next_disambiguator(disambiguator: u32) -> Result<u32> {
    disambiguator
        .checked_add(1)
        .context("No free name left in the outbox")
}
