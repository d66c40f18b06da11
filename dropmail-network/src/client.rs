use crate::{
    connection::SessionConnection,
    error::SessionError,
    message::{MessageType, Payload, SessionMessage},
};
use async_trait::async_trait;

/// result of inserting content into the storage network
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted {
        uri: String,
    },
    /// the node refused or failed the insert. Inserting at a key that
    /// is already in use fails too.
    Failed {
        code: Option<String>,
        description: Option<String>,
    },
}

/// `PutFailed` code of an insert at a key already holding other content
const COLLISION_CODE: &str = "9";

impl InsertOutcome {
    /// the insert failed because the key is already in use
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::Failed { code: Some(code), .. } if code == COLLISION_CODE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub insert_uri: String,
    pub request_uri: String,
}

/// get/put operations over the storage network
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// retrieve the content at the given key, `None` if it cannot be found
    async fn fetch(&self, key: &str) -> Result<Option<Payload>, SessionError>;

    async fn insert(&self, key: &str, payload: Payload) -> Result<InsertOutcome, SessionError>;
}

fn closed_or(message: &SessionMessage) -> Result<(), SessionError> {
    if message.message_type() == &MessageType::ConnectionClosed {
        Err(SessionError::Closed)
    } else {
        Ok(())
    }
}

#[async_trait]
impl NodeClient for SessionConnection {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn fetch(&self, key: &str) -> Result<Option<Payload>, SessionError> {
        let request = self
            .message(MessageType::ClientGet)
            .with_header("URI", key)
            .with_header("ReturnType", "direct")
            .with_header("Persistence", "connection");

        let mut reply = self.submit(request).await?.completion().await;
        closed_or(&reply)?;

        match reply.message_type() {
            MessageType::AllData => {
                let payload = reply.take_payload();
                if payload.is_none() {
                    tracing::debug!("content found without payload");
                }
                Ok(payload)
            }
            MessageType::GetFailed => {
                tracing::trace!(
                    code = reply.header("Code").unwrap_or_default(),
                    "content not found"
                );
                Ok(None)
            }
            other => {
                tracing::debug!(message_type = %other, "unexpected reply to a fetch");
                Ok(None)
            }
        }
    }

    #[tracing::instrument(skip(self, payload), level = "debug")]
    async fn insert(&self, key: &str, payload: Payload) -> Result<InsertOutcome, SessionError> {
        let request = self
            .message(MessageType::ClientPut)
            .with_header("URI", key)
            .with_header("Persistence", "connection")
            .with_payload(payload);

        let reply = self.submit(request).await?.completion().await;
        closed_or(&reply)?;

        if reply.message_type() == &MessageType::PutSuccessful {
            let uri = reply.header("URI").unwrap_or(key).to_owned();
            Ok(InsertOutcome::Inserted { uri })
        } else {
            Ok(InsertOutcome::Failed {
                code: reply.header("Code").map(ToOwned::to_owned),
                description: reply
                    .header("CodeDescription")
                    .or_else(|| reply.header("ExtraDescription"))
                    .map(ToOwned::to_owned),
            })
        }
    }
}

impl SessionConnection {
    /// ask the node to generate a fresh signed subspace key pair
    pub async fn generate_keypair(&self) -> Result<KeyPair, SessionError> {
        let request = self.message(MessageType::GenerateSsk);
        let reply = self.submit(request).await?.completion().await;
        closed_or(&reply)?;

        match (
            reply.message_type(),
            reply.header("InsertURI"),
            reply.header("RequestURI"),
        ) {
            (MessageType::SskKeypair, Some(insert_uri), Some(request_uri)) => Ok(KeyPair {
                insert_uri: insert_uri.to_owned(),
                request_uri: request_uri.to_owned(),
            }),
            (message_type, _, _) => Err(SessionError::UnexpectedReply(
                message_type.as_str().to_owned(),
            )),
        }
    }
}
