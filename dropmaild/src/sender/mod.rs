mod config;

pub use self::config::Config;
use crate::{
    postman,
    resolver::{ContactResolver, ResolveError},
    task::Task,
    Flow,
};
use anyhow::{Context as _, Result};
use dropmail_lib::{DayKey, EmailAddress, EntryName};
use dropmail_storage::{Account, OutboxEntry, Storage};
use std::{
    fs::File,
    io::{self, Write as _},
    path::Path,
    sync::Arc,
};
use tokio::{sync::Notify, time::Instant};

/// enqueue messages in the outboxes
///
/// cheap to clone, every enqueued message wakes up the [`Sender`]
#[derive(Clone)]
pub struct MessageSender {
    config: Arc<Config>,
    notify: Arc<Notify>,
}

/**
# outbox engine

sweeps the outbox of every account and tries to deliver every entry.
The number of attempts is kept in the name of the entry: a failed
delivery renames the entry with one more attempt, until `max_attempts`
is exceeded and the message is bounced back to its sender.
*/
pub struct Sender {
    storage: Storage,
    resolver: Arc<dyn ContactResolver>,
    config: Arc<Config>,
    notify: Arc<Notify>,
}

impl MessageSender {
    /// queue the message at `message` for every recipient
    ///
    /// the message file is copied, it can be removed once this returns
    pub fn send_message(
        &self,
        account: &Account,
        recipients: &[EmailAddress],
        message: &Path,
    ) -> Result<()> {
        let outbox = account.outbox();
        let from = account.address(&self.config.native_domain)?;

        for recipient in recipients {
            let mut staged = outbox.staging()?;

            let destination = match &self.config.gateway {
                Some(gateway) if !recipient.is_native(&self.config.native_domain) => {
                    write!(
                        staged,
                        "X-Gateway-To: {}\r\nX-Gateway-From: {}\r\n",
                        recipient, from
                    )
                    .context("Cannot write the gateway headers")?;
                    gateway
                }
                _ => recipient,
            };

            let mut source = File::open(message)
                .with_context(|| format!("Cannot open {}", message.display()))?;
            io::copy(&mut source, &mut staged)
                .with_context(|| format!("Cannot copy {}", message.display()))?;

            let entry = outbox.enqueue(staged, 0, &destination.to_string())?;
            tracing::info!(
                account = account.name(),
                recipient = %recipient,
                entry = entry.file_name(),
                "message queued"
            );
        }

        self.notify.notify_one();
        Ok(())
    }
}

impl Sender {
    pub fn new(storage: Storage, resolver: Arc<dyn ContactResolver>, config: Config) -> Self {
        Self {
            storage,
            resolver,
            config: Arc::new(config),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn message_sender(&self) -> MessageSender {
        MessageSender {
            config: Arc::clone(&self.config),
            notify: Arc::clone(&self.notify),
        }
    }

    /// run the sweeps on a dedicated task until shutdown
    ///
    /// sweeps start at most every `min_cycle`, or as soon as a message
    /// is enqueued
    pub fn spawn(self) -> Task {
        Task::spawn("sender", move |cancel| async move {
            loop {
                let started = Instant::now();

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = self.sweep(DayKey::today()) => match result {
                        Ok(Flow::Continue) => tracing::debug!("sweep completed"),
                        Ok(Flow::Disconnected) => tracing::info!("sweep interrupted, no connection with the node"),
                        Err(error) => tracing::error!(error = %format!("{:#}", error), "sweep failed"),
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.notify.notified() => tracing::debug!("new message queued"),
                    _ = tokio::time::sleep_until(started + self.config.min_cycle) => {}
                }
            }
            tracing::debug!("sender stopped");
        })
    }

    /// one sweep of the outboxes of all the accounts
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, today: DayKey) -> Result<Flow> {
        for account in self.storage.accounts()? {
            for entry in account.outbox().entries()? {
                let flow = self
                    .send_single(&account, &entry, today)
                    .await
                    .with_context(|| format!("Cannot process outbox entry {}", entry.file_name()));

                match flow {
                    Ok(Flow::Continue) => (),
                    Ok(Flow::Disconnected) => return Ok(Flow::Disconnected),
                    Err(error) => tracing::warn!(
                        account = account.name(),
                        error = %format!("{:#}", error),
                        "delivery failed"
                    ),
                }
            }
        }

        Ok(Flow::Continue)
    }

    async fn send_single(&self, account: &Account, entry: &OutboxEntry, today: DayKey) -> Result<Flow> {
        let outbox = account.outbox();

        let name = match entry.name() {
            Ok(name) => name,
            Err(error) => {
                tracing::warn!(entry = entry.file_name(), %error, "removing invalid outbox entry");
                outbox.remove(entry)?;
                return Ok(Flow::Continue);
            }
        };

        let recipient: EmailAddress = match name.recipient().parse() {
            Ok(recipient) => recipient,
            Err(error) => {
                let reason = format!("Invalid recipient address: {}", error);
                self.bounce_and_remove(account, entry, &reason)?;
                return Ok(Flow::Continue);
            }
        };

        let outbound = match self.resolver.resolve(account, &recipient).await {
            Ok(outbound) => outbound,
            Err(ResolveError::Fatal(reason)) => {
                let reason = format!("Cannot deliver to {}: {}", recipient, reason);
                self.bounce_and_remove(account, entry, &reason)?;
                return Ok(Flow::Continue);
            }
            Err(ResolveError::Transient(reason)) => {
                tracing::debug!(recipient = %recipient, reason = %reason, "recipient not reachable yet");
                return self.retry(account, entry, &name, &reason);
            }
        };

        match outbound.deliver(entry.path(), today).await {
            Ok(true) => {
                outbox.remove(entry)?;
                tracing::info!(account = account.name(), recipient = %recipient, "message delivered");
                Ok(Flow::Continue)
            }
            Ok(false) => self.retry(account, entry, &name, "the node refused the message"),
            Err(error) if error.is_disconnected() => Ok(Flow::Disconnected),
            Err(error) => self.retry(account, entry, &name, &error.to_string()),
        }
    }

    fn retry(&self, account: &Account, entry: &OutboxEntry, name: &EntryName, reason: &str) -> Result<Flow> {
        let attempts = name.attempts().saturating_add(1);

        if attempts > self.config.max_attempts {
            let reason = format!(
                "Delivery to {} failed after {} attempts: {}",
                name.recipient(),
                name.attempts(),
                reason
            );
            self.bounce_and_remove(account, entry, &reason)?;
        } else {
            let requeued = account.outbox().requeue(entry, attempts)?;
            tracing::debug!(entry = requeued.file_name(), "delivery will be retried");
        }

        Ok(Flow::Continue)
    }

    /// the entry is kept if the bounce cannot be committed
    fn bounce_and_remove(&self, account: &Account, entry: &OutboxEntry, reason: &str) -> Result<()> {
        match postman::bounce(&account.message_bank(), entry.path(), reason) {
            Ok(_) => {
                tracing::info!(account = account.name(), entry = entry.file_name(), reason, "message bounced");
                account.outbox().remove(entry)
            }
            Err(error) => {
                tracing::warn!(
                    account = account.name(),
                    entry = entry.file_name(),
                    error = %format!("{:#}", error),
                    "cannot bounce message"
                );
                Ok(())
            }
        }
    }
}
