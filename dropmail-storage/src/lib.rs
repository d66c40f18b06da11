/*!
# dropmail persistent storage

everything is kept on the filesystem, one directory per account:

```text
<data_dir>/<account>/address
<data_dir>/<account>/outbox/<disambiguator>_<attempts>_<recipient>
<data_dir>/<account>/inbox/<n>.msg
<data_dir>/<account>/contacts/inbound/<name>/key
<data_dir>/<account>/contacts/inbound/<name>/logs/<YYYY-MM-DD>
<data_dir>/<account>/contacts/outbound/<address>/key
<data_dir>/<account>/contacts/outbound/<address>/slots/<YYYY-MM-DD>
```

Updates are committed atomically: files are first written in a hidden
temporary file in the destination directory, then renamed or hard linked
into place.
*/

mod account;
mod contact;
mod day_log;
mod fs;
mod message_bank;
mod outbox;

pub use self::{
    account::Account,
    contact::{InboundContact, OutboundContact},
    day_log::DayLog,
    message_bank::{CommittedMessage, MessageBank, NewMessage},
    outbox::{Outbox, OutboxEntry},
};
use anyhow::{ensure, Context as _, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
    temp_dir: PathBuf,
}

impl Storage {
    /// open the storage, creating the directories if needed
    pub fn open(data_dir: impl AsRef<Path>, temp_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let temp_dir = temp_dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&data_dir).with_context(|| {
            format!("Cannot create the data directory {}", data_dir.display())
        })?;
        std::fs::create_dir_all(&temp_dir).with_context(|| {
            format!(
                "Cannot create the temporary directory {}",
                temp_dir.display()
            )
        })?;

        Ok(Self { data_dir, temp_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// directory where in-flight payloads are staged
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// list all the accounts, ordered by name
    pub fn accounts(&self) -> Result<Vec<Account>> {
        fs::list_dirs(&self.data_dir)?
            .into_iter()
            .map(|name| self.account(&name))
            .collect()
    }

    /// get the account of the given name, it may not exist yet
    pub fn account(&self, name: &str) -> Result<Account> {
        ensure!(fs::is_valid_name(name), "Invalid account name {:?}", name);
        Ok(Account::new(name, self.data_dir.join(name)))
    }

    pub fn create_account(&self, name: &str) -> Result<Account> {
        let account = self.account(name)?;
        account.create()?;
        Ok(account)
    }
}
