mod config;

pub use self::config::Config;
use crate::{task::Task, Flow};
use anyhow::{Context as _, Result};
use chrono::Utc;
use dropmail_lib::{slot_key, DayKey};
use dropmail_network::{NodeClient, Payload};
use dropmail_storage::{CommittedMessage, DayLog, InboundContact, MessageBank, Storage};
use futures::future::join_all;
use std::{io, sync::Arc};
use tokio::time::Instant;

/**
# polling engine

for every inbound contact of every account, fetch the dead-drop slots of
the days of the lookback window and store the messages found in the
account's message bank.

Each contact inserts its messages at `<contact key><day>-<sequence>`,
sequences starting at 1 every day. The [`DayLog`] of a contact remembers,
for a given day, where to resume polling and how many sweeps of that day
have been completed.

[`DayLog`]: dropmail_storage::DayLog
*/
pub struct Poller {
    storage: Storage,
    client: Arc<dyn NodeClient>,
    config: Config,
}

impl Poller {
    pub fn new(storage: Storage, client: Arc<dyn NodeClient>, config: Config) -> Self {
        Self {
            storage,
            client,
            config,
        }
    }

    /// run the sweeps on a dedicated task until shutdown
    pub fn spawn(self) -> Task {
        Task::spawn("poller", move |cancel| async move {
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
                    _ = tokio::time::sleep_until(started + self.config.interval) => {}
                }
            }
            tracing::debug!("poller stopped");
        })
    }

    /// one sweep of all the contacts of all the accounts
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, today: DayKey) -> Result<Flow> {
        for account in self.storage.accounts()? {
            let bank = account.message_bank();

            for contact in account.inbound_contacts()? {
                let flow = self
                    .poll_contact(&bank, &contact, today)
                    .await
                    .with_context(|| {
                        format!(
                            "Cannot poll contact {} of account {}",
                            contact.name(),
                            account.name()
                        )
                    });

                match flow {
                    Ok(Flow::Continue) => (),
                    Ok(Flow::Disconnected) => return Ok(Flow::Disconnected),
                    Err(error) => tracing::warn!(error = %format!("{:#}", error), "polling failed"),
                }
            }
        }

        Ok(Flow::Continue)
    }

    async fn poll_contact(
        &self,
        bank: &MessageBank,
        contact: &InboundContact,
        today: DayKey,
    ) -> Result<Flow> {
        let key = match contact.key() {
            Ok(key) => key,
            Err(error) => {
                tracing::debug!(contact = contact.name(), %error, "skipping contact");
                return Ok(Flow::Continue);
            }
        };

        for day in today.window(self.config.lookback_days) {
            let mut log = match contact.log(day) {
                Ok(log) => log,
                Err(error) => {
                    tracing::warn!(
                        contact = contact.name(),
                        day = %day,
                        error = %format!("{:#}", error),
                        "unreadable day log, polling the day from the start"
                    );
                    DayLog::default()
                }
            };
            if log.passes() >= self.config.passes_per_day {
                continue;
            }

            let first = log.next_id();
            let mut fetches = Vec::new();
            for sequence in first..first.saturating_add(self.config.poll_ahead) {
                let slot = slot_key(&key, day, sequence);
                let client = Arc::clone(&self.client);
                fetches.push(async move {
                    let fetched = client.fetch(&slot).await;
                    (sequence, fetched)
                });
            }

            let mut disconnected = false;
            for (sequence, fetched) in join_all(fetches).await {
                match fetched {
                    Ok(Some(payload)) => match store(bank, &payload) {
                        Ok(committed) => {
                            tracing::info!(
                                contact = contact.name(),
                                day = %day,
                                sequence,
                                path = %committed.path.display(),
                                "message received"
                            );
                            log.record(sequence, committed.checksum);
                        }
                        Err(error) => tracing::warn!(
                            contact = contact.name(),
                            day = %day,
                            sequence,
                            error = %format!("{:#}", error),
                            "cannot store received message"
                        ),
                    },
                    Ok(None) => (),
                    Err(error) if error.is_disconnected() => disconnected = true,
                    Err(error) => tracing::warn!(
                        contact = contact.name(),
                        day = %day,
                        sequence,
                        %error,
                        "cannot fetch slot"
                    ),
                }
            }

            if disconnected {
                // keep what was committed, but the pass does not count
                contact.update_log(day, &log)?;
                return Ok(Flow::Disconnected);
            }

            if day != today {
                log.complete_pass();
            }
            contact.update_log(day, &log)?;
        }

        let pruned = contact.prune_logs(today.window_start(self.config.lookback_days))?;
        if pruned > 0 {
            tracing::debug!(contact = contact.name(), pruned, "expired day logs deleted");
        }

        Ok(Flow::Continue)
    }
}

/// store the fetched message in the message bank
///
/// the message is stored as sent, after a `Received` header
fn store(bank: &MessageBank, payload: &Payload) -> Result<CommittedMessage> {
    let mut message = bank.create_message()?;
    message
        .add_header(
            "Received",
            &format!("(dropmail); {}", Utc::now().to_rfc2822()),
        )
        .context("Cannot write the message")?;

    let mut reader = payload.reader().context("Cannot read the fetched message")?;
    io::copy(&mut reader, &mut message).context("Cannot write the message")?;

    message.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{FakeNode, Fixture};

    fn day(s: &str) -> DayKey {
        s.parse().unwrap()
    }

    fn poller(fixture: &Fixture, node: &Arc<FakeNode>) -> Poller {
        Poller::new(
            fixture.storage.clone(),
            Arc::clone(node) as Arc<dyn NodeClient>,
            Config::default(),
        )
    }

    #[tokio::test]
    async fn fetches_ahead_of_next_id() {
        let fixture = Fixture::new();
        let node = Arc::new(FakeNode::default());
        let contact = fixture.inbound_contact("alice", "bob", "SSK@bob/");
        let today = day("2024-03-10");
        let past = day("2024-03-08");

        let mut log = DayLog::default();
        log.record(3, dropmail_lib::Checksum::compute(b"three"));
        assert_eq!(log.next_id(), 4);
        contact.update_log(past, &log).unwrap();

        node.put("SSK@bob/2024-03-08-5", b"Subject: hi\r\n\r\nhello bob\r\n");

        let flow = poller(&fixture, &node).sweep(today).await.unwrap();
        assert_eq!(flow, Flow::Continue);

        let requests = node.requests();
        for sequence in 4..=6 {
            let slot = format!("SSK@bob/2024-03-08-{}", sequence);
            assert!(requests.contains(&slot), "{} fetched", slot);
        }
        assert!(!requests.contains(&"SSK@bob/2024-03-08-3".to_owned()));
        assert!(!requests.contains(&"SSK@bob/2024-03-08-7".to_owned()));

        let messages = fixture.account("alice").message_bank().messages().unwrap();
        assert_eq!(messages.len(), 1);
        let content = std::fs::read(&messages[0]).unwrap();
        let text = String::from_utf8(content.clone()).unwrap();
        assert!(text.starts_with("Received: (dropmail); "));
        assert!(text.ends_with("\r\nSubject: hi\r\n\r\nhello bob\r\n"));

        let log = contact.log(past).unwrap();
        assert_eq!(log.passes(), 1);
        assert_eq!(log.next_id(), 6);
        assert_eq!(
            log.messages().get(&5),
            Some(&dropmail_lib::Checksum::compute(&content))
        );
    }

    #[tokio::test]
    async fn today_is_always_polled() {
        let fixture = Fixture::new();
        let node = Arc::new(FakeNode::default());
        let contact = fixture.inbound_contact("alice", "bob", "KEY-");
        let today = day("2024-03-10");
        let poller = poller(&fixture, &node);

        for _ in 0..5 {
            poller.sweep(today).await.unwrap();
        }

        assert_eq!(contact.log(today).unwrap().passes(), 0);
        assert_eq!(contact.log(day("2024-03-09")).unwrap().passes(), 3);

        // past days are not polled after their last pass
        let requests = node.requests();
        let yesterday = requests
            .iter()
            .filter(|slot| slot.starts_with("KEY-2024-03-09-"))
            .count();
        assert_eq!(yesterday, 9);
        let today = requests
            .iter()
            .filter(|slot| slot.starts_with("KEY-2024-03-10-"))
            .count();
        assert_eq!(today, 15);
    }

    #[tokio::test]
    async fn window_and_pruning() {
        let fixture = Fixture::new();
        let node = Arc::new(FakeNode::default());
        let contact = fixture.inbound_contact("alice", "bob", "KEY-");
        let today = day("2024-03-31");

        contact.update_log(day("2024-03-01"), &DayLog::default()).unwrap();
        contact.update_log(day("2024-03-02"), &DayLog::default()).unwrap();

        poller(&fixture, &node).sweep(today).await.unwrap();

        let requests = node.requests();
        assert!(requests.contains(&"KEY-2024-03-02-1".to_owned()));
        assert!(!requests.iter().any(|slot| slot.starts_with("KEY-2024-03-01-")));

        let days = contact.log_days().unwrap();
        assert_eq!(days.len(), 30);
        assert_eq!(days[0], day("2024-03-02"));
    }

    #[tokio::test]
    async fn disconnection_aborts_without_consuming_passes() {
        let fixture = Fixture::new();
        let node = Arc::new(FakeNode::default());
        let contact = fixture.inbound_contact("alice", "bob", "KEY-");
        let today = day("2024-03-10");
        node.disconnect();

        let flow = poller(&fixture, &node).sweep(today).await.unwrap();
        assert_eq!(flow, Flow::Disconnected);

        for day in today.window(30) {
            assert_eq!(contact.log(day).unwrap().passes(), 0);
        }
        // aborted on the first day of the window
        assert_eq!(node.requests().len(), 3);
    }

    #[tokio::test]
    async fn contact_without_key_is_skipped() {
        let fixture = Fixture::new();
        let node = Arc::new(FakeNode::default());
        let account = fixture.account("alice");
        let contact = account.inbound_contact("nokey").unwrap();
        std::fs::create_dir_all(contact.dir()).unwrap();
        let today = day("2024-03-10");

        poller(&fixture, &node).sweep(today).await.unwrap();

        assert!(node.requests().is_empty());
        assert!(contact.log_days().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_log_does_not_stall_the_contact() {
        let fixture = Fixture::new();
        let node = Arc::new(FakeNode::default());
        let contact = fixture.inbound_contact("alice", "bob", "KEY-");
        let today = day("2024-03-10");

        contact.update_log(day("2024-03-01"), &DayLog::default()).unwrap();
        std::fs::write(contact.dir().join("logs").join("2024-03-01"), b"{not json").unwrap();
        contact.update_log(day("2024-01-01"), &DayLog::default()).unwrap();
        node.put("KEY-2024-03-10-1", b"hello");

        let flow = poller(&fixture, &node).sweep(today).await.unwrap();
        assert_eq!(flow, Flow::Continue);

        let messages = fixture.account("alice").message_bank().messages().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(node.requests().contains(&"KEY-2024-03-01-1".to_owned()));

        // the broken log is replaced, the expired one is pruned
        assert_eq!(contact.log(day("2024-03-01")).unwrap().passes(), 1);
        assert!(!contact.log_days().unwrap().contains(&day("2024-01-01")));
    }

    #[tokio::test]
    async fn next_id_near_the_end_of_the_sequence() {
        let fixture = Fixture::new();
        let node = Arc::new(FakeNode::default());
        let contact = fixture.inbound_contact("alice", "bob", "KEY-");
        let today = day("2024-03-10");
        let past = day("2024-03-09");

        let mut log = DayLog::default();
        log.record(u64::MAX - 2, dropmail_lib::Checksum::compute(b"last"));
        contact.update_log(past, &log).unwrap();

        let flow = poller(&fixture, &node).sweep(today).await.unwrap();
        assert_eq!(flow, Flow::Continue);

        let requests = node.requests();
        let past_requests: Vec<_> = requests
            .iter()
            .filter(|slot| slot.starts_with("KEY-2024-03-09-"))
            .collect();
        assert_eq!(past_requests, vec![&format!("KEY-2024-03-09-{}", u64::MAX - 1)]);
        assert_eq!(contact.log(past).unwrap().passes(), 1);
    }
}
