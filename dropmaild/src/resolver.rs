use async_trait::async_trait;
use dropmail_lib::{slot_key, DayKey, EmailAddress};
use dropmail_network::{InsertOutcome, NodeClient, Payload, SessionError};
use dropmail_storage::{Account, OutboundContact};
use std::{path::Path, sync::Arc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// the recipient may become reachable later
    #[error("recipient not reachable yet: {0}")]
    Transient(String),

    /// the recipient will never be reachable
    #[error("recipient not reachable: {0}")]
    Fatal(String),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl DeliveryError {
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Session(error) if error.is_disconnected())
    }
}

/// find how to reach the recipient of a message
#[async_trait]
pub trait ContactResolver: Send + Sync {
    async fn resolve(
        &self,
        account: &Account,
        recipient: &EmailAddress,
    ) -> Result<Box<dyn Outbound>, ResolveError>;
}

/// a resolved recipient
#[async_trait]
pub trait Outbound: Send + Sync {
    /// try to deliver the message, `false` if the delivery failed but
    /// may be retried
    async fn deliver(&self, message: &Path, day: DayKey) -> Result<bool, DeliveryError>;
}

/// slots tried in a single delivery before giving up until the next attempt
const MAX_COLLISIONS: usize = 16;

/// resolve recipients to the dead-drop slots of the outbound contacts
///
/// the insert key of a contact is known once the handshake with that
/// contact completed. Messages are inserted at
/// `<insert key><day>-<slot>`, the slot being reserved from the contact's
/// per day counter.
pub struct DeadDropResolver {
    client: Arc<dyn NodeClient>,
}

struct DeadDrop {
    client: Arc<dyn NodeClient>,
    contact: OutboundContact,
    key: String,
}

impl DeadDropResolver {
    pub fn new(client: Arc<dyn NodeClient>) -> Self {
        Self { client }
    }
}

fn is_usable(key: &str) -> bool {
    !key.is_empty() && key.contains('@') && !key.contains(char::is_whitespace)
}

#[async_trait]
impl ContactResolver for DeadDropResolver {
    async fn resolve(
        &self,
        account: &Account,
        recipient: &EmailAddress,
    ) -> Result<Box<dyn Outbound>, ResolveError> {
        let contact = account
            .outbound_contact(recipient)
            .map_err(|error| ResolveError::Fatal(format!("{:#}", error)))?;

        let key = contact
            .insert_key()
            .map_err(|error| ResolveError::Transient(format!("{:#}", error)))?
            .ok_or_else(|| ResolveError::Transient(format!("no key for {} yet", recipient)))?;

        if !is_usable(&key) {
            return Err(ResolveError::Fatal(format!(
                "unusable key for {}: {:?}",
                recipient, key
            )));
        }

        Ok(Box::new(DeadDrop {
            client: Arc::clone(&self.client),
            contact,
            key,
        }))
    }
}

#[async_trait]
impl Outbound for DeadDrop {
    /// the slot counter only moves past slots holding content: a failed
    /// insert is retried at the same slot on the next attempt
    async fn deliver(&self, message: &Path, day: DayKey) -> Result<bool, DeliveryError> {
        let mut slot = self.contact.next_slot(day)?;

        for _ in 0..MAX_COLLISIONS {
            let key = slot_key(&self.key, day, slot);
            let outcome = self.client.insert(&key, Payload::from_file(message)).await?;

            match outcome {
                InsertOutcome::Inserted { uri } => {
                    self.contact.slot_used(day, slot)?;
                    tracing::info!(recipient = %self.contact.address(), %uri, "message inserted");
                    return Ok(true);
                }
                outcome if outcome.is_collision() => {
                    tracing::debug!(recipient = %self.contact.address(), key = %key, "slot already used");
                    self.contact.slot_used(day, slot)?;
                    slot = slot.saturating_add(1);
                }
                InsertOutcome::Failed { code, description } => {
                    tracing::warn!(
                        recipient = %self.contact.address(),
                        key = %key,
                        code = code.as_deref().unwrap_or("none"),
                        description = description.as_deref().unwrap_or(""),
                        "insert failed"
                    );
                    return Ok(false);
                }
            }
        }

        tracing::warn!(recipient = %self.contact.address(), day = %day, "too many used slots in a row");
        Ok(false)
    }
}
