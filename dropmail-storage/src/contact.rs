use crate::{day_log::DayLog, fs};
use anyhow::{ensure, Context as _, Result};
use dropmail_lib::{DayKey, EmailAddress};
use std::path::{Path, PathBuf};

const KEY: &str = "key";
const LOGS: &str = "logs";
const SLOTS: &str = "slots";

/// a contact we receive messages from
///
/// the contact's key is the prefix of the dead-drop slots the contact
/// inserts messages at.
#[derive(Debug, Clone)]
pub struct InboundContact {
    name: String,
    dir: PathBuf,
}

/// a contact we send messages to
#[derive(Debug, Clone)]
pub struct OutboundContact {
    address: EmailAddress,
    dir: PathBuf,
}

impl InboundContact {
    pub(crate) fn new(name: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            dir,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// the key to poll for messages from this contact
    pub fn key(&self) -> Result<String> {
        let path = self.dir.join(KEY);
        let key = fs::read_optional(&path)?
            .with_context(|| format!("No key for contact {}", self.name))?;
        let key = key.trim();
        ensure!(!key.is_empty(), "Empty key for contact {}", self.name);
        Ok(key.to_owned())
    }

    pub fn set_key(&self, key: &str) -> Result<()> {
        fs::write_atomically(&self.dir.join(KEY), key.as_bytes())
    }

    fn log_path(&self, day: DayKey) -> PathBuf {
        self.dir.join(LOGS).join(day.to_string())
    }

    /// load the log of the given day, a default log if none was stored yet
    pub fn log(&self, day: DayKey) -> Result<DayLog> {
        let path = self.log_path(day);
        match fs::read_optional(&path)? {
            None => Ok(DayLog::default()),
            Some(content) => serde_json::from_str(&content)
                .with_context(|| format!("Invalid day log {}", path.display())),
        }
    }

    pub fn update_log(&self, day: DayKey, log: &DayLog) -> Result<()> {
        let content = serde_json::to_vec(log).context("Cannot serialize the day log")?;
        fs::write_atomically(&self.log_path(day), &content)
    }

    /// days with a stored log, oldest first
    pub fn log_days(&self) -> Result<Vec<DayKey>> {
        let mut days: Vec<DayKey> = fs::list_files(&self.dir.join(LOGS))?
            .into_iter()
            .filter_map(|(name, _)| name.parse().ok())
            .collect();
        days.sort();
        Ok(days)
    }

    /// delete every log strictly older than `before`
    ///
    /// returns the number of deleted logs
    pub fn prune_logs(&self, before: DayKey) -> Result<usize> {
        let mut pruned = 0;
        let mut failure = None;

        for day in self.log_days()?.into_iter().filter(|day| *day < before) {
            let path = self.log_path(day);
            match std::fs::remove_file(&path) {
                Ok(()) => pruned += 1,
                Err(error) => {
                    tracing::warn!(%error, path = %path.display(), "cannot prune day log");
                    failure.get_or_insert(error);
                }
            }
        }

        if let Some(error) = failure {
            return Err(error).context("Cannot prune all the expired day logs");
        }

        Ok(pruned)
    }
}

impl OutboundContact {
    pub(crate) fn new(address: EmailAddress, dir: PathBuf) -> Self {
        Self { address, dir }
    }

    pub fn address(&self) -> &EmailAddress {
        &self.address
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// the key prefix to insert messages for this contact at
    ///
    /// `None` if the key is not known yet
    pub fn insert_key(&self) -> Result<Option<String>> {
        Ok(fs::read_optional(&self.dir.join(KEY))?.map(|key| key.trim().to_owned()))
    }

    pub fn set_insert_key(&self, key: &str) -> Result<()> {
        fs::write_atomically(&self.dir.join(KEY), key.as_bytes())
    }

    fn slot_path(&self, day: DayKey) -> PathBuf {
        self.dir.join(SLOTS).join(day.to_string())
    }

    /// the first slot of the given day not known to be used
    ///
    /// slots start at 1. Reading the slot does not reserve it: call
    /// [`OutboundContact::slot_used`] once something was inserted there.
    pub fn next_slot(&self, day: DayKey) -> Result<u64> {
        let path = self.slot_path(day);
        match fs::read_optional(&path)? {
            None => Ok(1),
            Some(content) => content
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid slot counter {}", path.display())),
        }
    }

    /// record that `slot` of the given day is taken
    ///
    /// the counter never goes backward
    pub fn slot_used(&self, day: DayKey, slot: u64) -> Result<()> {
        let next = slot.saturating_add(1);
        if next > self.next_slot(day)? {
            fs::write_atomically(&self.slot_path(day), next.to_string().as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> DayKey {
        s.parse().unwrap()
    }

    #[test]
    fn inbound_key() {
        let dir = tempfile::tempdir().unwrap();
        let contact = InboundContact::new("bob", dir.path().join("bob"));

        assert!(contact.key().is_err());
        contact.set_key("  \n").unwrap();
        assert!(contact.key().is_err());
        contact.set_key("SSK@bob,key/mail-\n").unwrap();
        assert_eq!(contact.key().unwrap(), "SSK@bob,key/mail-");
    }

    #[test]
    fn logs() {
        let dir = tempfile::tempdir().unwrap();
        let contact = InboundContact::new("bob", dir.path().join("bob"));
        let today = day("2024-03-10");

        assert_eq!(contact.log(today).unwrap(), DayLog::default());

        let mut log = DayLog::default();
        log.record(1, dropmail_lib::Checksum::compute(b"hi"));
        contact.update_log(today, &log).unwrap();
        assert_eq!(contact.log(today).unwrap(), log);

        for d in &["2024-02-01", "2024-02-09", "2024-02-10", "2024-03-01"] {
            contact.update_log(day(d), &DayLog::default()).unwrap();
        }

        assert_eq!(contact.prune_logs(day("2024-02-10")).unwrap(), 2);
        assert_eq!(
            contact.log_days().unwrap(),
            vec![day("2024-02-10"), day("2024-03-01"), today]
        );
    }

    #[test]
    fn slots() {
        let dir = tempfile::tempdir().unwrap();
        let address: EmailAddress = "alice@example.dropmail".parse().unwrap();
        let contact = OutboundContact::new(address, dir.path().join("alice"));

        assert_eq!(contact.insert_key().unwrap(), None);
        contact.set_insert_key("SSK@alice,insert/mail-").unwrap();
        assert_eq!(
            contact.insert_key().unwrap().as_deref(),
            Some("SSK@alice,insert/mail-")
        );

        let today = day("2024-03-10");
        assert_eq!(contact.next_slot(today).unwrap(), 1);
        // reading does not reserve
        assert_eq!(contact.next_slot(today).unwrap(), 1);

        contact.slot_used(today, 1).unwrap();
        assert_eq!(contact.next_slot(today).unwrap(), 2);
        contact.slot_used(today, 4).unwrap();
        assert_eq!(contact.next_slot(today).unwrap(), 5);
        contact.slot_used(today, 2).unwrap();
        assert_eq!(contact.next_slot(today).unwrap(), 5);

        assert_eq!(contact.next_slot(day("2024-03-11")).unwrap(), 1);
    }
}
