use crate::{
    contact::{InboundContact, OutboundContact},
    fs,
    message_bank::MessageBank,
    outbox::Outbox,
};
use anyhow::{ensure, Context as _, Result};
use dropmail_lib::EmailAddress;
use std::path::{Path, PathBuf};

const ADDRESS: &str = "address";
const OUTBOX: &str = "outbox";
const INBOX: &str = "inbox";
const INBOUND: &str = "contacts/inbound";
const OUTBOUND: &str = "contacts/outbound";

#[derive(Debug, Clone)]
pub struct Account {
    name: String,
    dir: PathBuf,
}

impl Account {
    pub(crate) fn new(name: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            dir,
        }
    }

    pub(crate) fn create(&self) -> Result<()> {
        for sub in &[OUTBOX, INBOX, INBOUND, OUTBOUND] {
            let dir = self.dir.join(sub);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// the address of the account
    ///
    /// unless an explicit address is stored with the account, this is
    /// `<account name>@<native_domain>`
    pub fn address(&self, native_domain: &str) -> Result<EmailAddress> {
        let path = self.dir.join(ADDRESS);
        match fs::read_optional(&path)? {
            Some(address) => address
                .trim()
                .parse()
                .with_context(|| format!("Invalid address in {}", path.display())),
            None => EmailAddress::new(self.name.as_str(), native_domain)
                .with_context(|| format!("Invalid address for account {}", self.name)),
        }
    }

    pub fn set_address(&self, address: &EmailAddress) -> Result<()> {
        fs::write_atomically(&self.dir.join(ADDRESS), address.to_string().as_bytes())
    }

    pub fn outbox(&self) -> Outbox {
        Outbox::new(self.dir.join(OUTBOX))
    }

    pub fn message_bank(&self) -> MessageBank {
        MessageBank::new(self.dir.join(INBOX))
    }

    pub fn inbound_contacts(&self) -> Result<Vec<InboundContact>> {
        let dir = self.dir.join(INBOUND);
        Ok(fs::list_dirs(&dir)?
            .into_iter()
            .map(|name| {
                let path = dir.join(&name);
                InboundContact::new(name, path)
            })
            .collect())
    }

    pub fn inbound_contact(&self, name: &str) -> Result<InboundContact> {
        ensure!(fs::is_valid_name(name), "Invalid contact name {:?}", name);
        Ok(InboundContact::new(name, self.dir.join(INBOUND).join(name)))
    }

    pub fn outbound_contact(&self, address: &EmailAddress) -> Result<OutboundContact> {
        let name = address.to_string().to_lowercase();
        ensure!(fs::is_valid_name(&name), "Invalid contact address {}", address);
        Ok(OutboundContact::new(
            address.clone(),
            self.dir.join(OUTBOUND).join(name),
        ))
    }
}
