mod config;
pub mod poller;
pub mod postman;
pub mod resolver;
pub mod sender;
pub mod session;
pub mod storage;
mod task;

pub use self::{config::Config, task::Task};
use self::{poller::Poller, resolver::DeadDropResolver, sender::Sender};
use anyhow::{Context as _, Result};
use dropmail_network::{NodeClient, SessionConnection};
use dropmail_storage::Storage;
use std::sync::Arc;

/// how a sweep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// the connection with the node is lost, the rest of the sweep is
    /// postponed to the next one
    Disconnected,
}

/// all the engines of the daemon, sharing one connection with the node
pub struct Daemon {
    storage: Storage,
    connection: SessionConnection,
    message_sender: sender::MessageSender,
    poller: Task,
    sender: Task,
}

impl Daemon {
    /// open the storage, connect to the node and start the engines
    ///
    /// must be called from within the tokio runtime
    pub fn new(config: Config) -> Result<Self> {
        let storage = config.storage.open()?;

        let connection = config.session.connection(storage.temp_dir());
        connection.start();
        let client: Arc<dyn NodeClient> = Arc::new(connection.clone());

        let poller = Poller::new(storage.clone(), Arc::clone(&client), config.poller).spawn();

        let resolver = Arc::new(DeadDropResolver::new(client));
        let sender = Sender::new(storage.clone(), resolver, config.sender);
        let message_sender = sender.message_sender();
        let sender = sender.spawn();

        tracing::info!(
            data_dir = %storage.data_dir().display(),
            node = %connection.settings().address,
            "daemon started"
        );

        Ok(Self {
            storage,
            connection,
            message_sender,
            poller,
            sender,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn message_sender(&self) -> sender::MessageSender {
        self.message_sender.clone()
    }

    pub async fn shutdown(self) -> Result<()> {
        let poller = self
            .poller
            .shutdown()
            .await
            .context("Cannot shutdown the poller");
        let sender = self
            .sender
            .shutdown()
            .await
            .context("Cannot shutdown the sender");

        // the engines are stopped, no more requests will be submitted
        self.connection.shutdown().await;

        poller.and(sender)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use dropmail_network::{InsertOutcome, NodeClient, Payload, SessionError};
    use dropmail_storage::{Account, InboundContact, Storage};
    use std::{
        collections::HashMap,
        path::PathBuf,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Mutex,
        },
    };

    /// storage under a temporary directory
    pub struct Fixture {
        pub dir: tempfile::TempDir,
        pub storage: Storage,
        messages: AtomicUsize,
    }

    impl Fixture {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let storage = Storage::open(dir.path().join("data"), dir.path().join("temp")).unwrap();
            Self {
                dir,
                storage,
                messages: AtomicUsize::new(0),
            }
        }

        pub fn account(&self, name: &str) -> Account {
            self.storage.create_account(name).unwrap()
        }

        pub fn inbound_contact(&self, account: &str, name: &str, key: &str) -> InboundContact {
            let contact = self.account(account).inbound_contact(name).unwrap();
            contact.set_key(key).unwrap();
            contact
        }

        /// write a message outside of the storage
        pub fn message(&self, content: &[u8]) -> PathBuf {
            let n = self.messages.fetch_add(1, Ordering::SeqCst);
            let path = self.dir.path().join(format!("message-{}", n));
            std::fs::write(&path, content).unwrap();
            path
        }

        /// write an outbox entry directly
        pub fn entry(&self, account: &Account, name: &str, content: &[u8]) {
            account.outbox().ensure().unwrap();
            std::fs::write(account.outbox().dir().join(name), content).unwrap();
        }
    }

    /// in memory storage network
    #[derive(Default)]
    pub struct FakeNode {
        slots: Mutex<HashMap<String, Vec<u8>>>,
        requests: Mutex<Vec<String>>,
        inserted: Mutex<Vec<(String, Vec<u8>)>>,
        insert_requests: AtomicUsize,
        disconnected: AtomicBool,
        reject_inserts: AtomicBool,
    }

    impl FakeNode {
        pub fn put(&self, key: &str, content: &[u8]) {
            self.slots
                .lock()
                .unwrap()
                .insert(key.to_owned(), content.to_vec());
        }

        /// keys of all the fetch requests
        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        /// successful inserts
        pub fn inserted(&self) -> Vec<(String, Vec<u8>)> {
            self.inserted.lock().unwrap().clone()
        }

        pub fn insert_requests(&self) -> usize {
            self.insert_requests.load(Ordering::SeqCst)
        }

        pub fn disconnect(&self) {
            self.disconnected.store(true, Ordering::SeqCst);
        }

        pub fn reconnect(&self) {
            self.disconnected.store(false, Ordering::SeqCst);
        }

        pub fn reject_inserts(&self) {
            self.reject_inserts.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl NodeClient for FakeNode {
        async fn fetch(&self, key: &str) -> Result<Option<Payload>, SessionError> {
            self.requests.lock().unwrap().push(key.to_owned());
            if self.disconnected.load(Ordering::SeqCst) {
                return Err(SessionError::NoConnection);
            }

            Ok(self
                .slots
                .lock()
                .unwrap()
                .get(key)
                .map(|content| Payload::from_bytes(content.clone())))
        }

        async fn insert(&self, key: &str, payload: Payload) -> Result<InsertOutcome, SessionError> {
            self.insert_requests.fetch_add(1, Ordering::SeqCst);
            if self.disconnected.load(Ordering::SeqCst) {
                return Err(SessionError::NoConnection);
            }

            let content = payload.to_vec().unwrap();
            let mut slots = self.slots.lock().unwrap();
            if self.reject_inserts.load(Ordering::SeqCst) {
                return Ok(InsertOutcome::Failed {
                    code: Some("5".to_owned()),
                    description: Some("Route not found".to_owned()),
                });
            }
            if slots.contains_key(key) {
                return Ok(InsertOutcome::Failed {
                    code: Some("9".to_owned()),
                    description: Some("Collision".to_owned()),
                });
            }

            slots.insert(key.to_owned(), content.clone());
            self.inserted
                .lock()
                .unwrap()
                .push((key.to_owned(), content));
            Ok(InsertOutcome::Inserted {
                uri: key.to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn daemon_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.storage.temp_dir = dir.path().join("temp");
        // nothing listens there
        config.session.address = "127.0.0.1:1".to_owned();

        let daemon = crate::Daemon::new(config).unwrap();
        assert!(daemon.storage().data_dir().is_dir());
        let _sender = daemon.message_sender();

        daemon.shutdown().await.unwrap();
    }
}
