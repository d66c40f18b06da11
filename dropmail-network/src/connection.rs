use crate::{
    codec::{CodecError, SessionCodec},
    error::SessionError,
    message::{MessageType, SessionMessage},
};
use anyhow::{bail, Context as _, Result};
use futures::{SinkExt as _, StreamExt as _};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex as StdMutex, MutexGuard,
    },
    time::Duration,
};
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(200);

type Reader = FramedRead<OwnedReadHalf, SessionCodec>;
type Writer = FramedWrite<OwnedWriteHalf, SessionCodec>;

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// address of the node's session interface
    pub address: String,
    /// time to wait before trying to reconnect after a failure
    pub reconnect_backoff: Duration,
    /// maximum time to wait for the node's hello
    pub handshake_timeout: Duration,
    /// where received payloads are staged
    pub temp_dir: PathBuf,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9481".to_owned(),
            reconnect_backoff: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(30),
            temp_dir: std::env::temp_dir(),
        }
    }
}

/// a reply received for a submitted request
#[derive(Debug)]
pub enum Reply {
    Progress(SessionMessage),
    Complete(SessionMessage),
}

impl Reply {
    pub fn message(&self) -> &SessionMessage {
        match self {
            Self::Progress(message) | Self::Complete(message) => message,
        }
    }

    pub fn into_message(self) -> SessionMessage {
        match self {
            Self::Progress(message) | Self::Complete(message) => message,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// replies of a submitted request
///
/// zero or more [`Reply::Progress`] are received strictly before exactly
/// one [`Reply::Complete`]. Dropping the `PendingReply` simply discards
/// the replies still to come.
#[derive(Debug)]
pub struct PendingReply {
    identifier: String,
    receiver: mpsc::UnboundedReceiver<Reply>,
}

impl PendingReply {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// next reply, `None` once the completion has been received
    pub async fn next(&mut self) -> Option<Reply> {
        self.receiver.recv().await
    }

    /// skip the progress updates and wait for the completion
    pub async fn completion(mut self) -> SessionMessage {
        while let Some(reply) = self.receiver.recv().await {
            if let Reply::Complete(message) = reply {
                return message;
            }
        }

        SessionMessage::connection_closed(self.identifier)
    }
}

/**
# connection with the node

the connection is shared between all the components of the daemon (it is
cheap to clone). Once [`started`], a background task maintains the
connection with the node, reconnecting after the configured backoff, and
dispatches the replies to the pending requests.

Whenever the connection is lost every pending request is completed with
a synthetic [`MessageType::ConnectionClosed`].

[`started`]: SessionConnection::start
*/
#[derive(Clone)]
pub struct SessionConnection {
    inner: Arc<Inner>,
}

struct Inner {
    settings: ConnectionSettings,
    next_id: AtomicU64,
    /// held while registering a request and writing it, as well as while
    /// tearing down the connection
    writer: Mutex<Option<Writer>>,
    clients: StdMutex<HashMap<String, mpsc::UnboundedSender<Reply>>>,
    connected: watch::Sender<bool>,
    cancel: CancellationToken,
    task: StdMutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionConnection {
    pub fn new(settings: ConnectionSettings) -> Self {
        let (connected, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                settings,
                next_id: AtomicU64::new(1),
                writer: Mutex::new(None),
                clients: StdMutex::new(HashMap::new()),
                connected,
                cancel: CancellationToken::new(),
                task: StdMutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    /// spawn the background task maintaining the connection
    ///
    /// calling `start` more than once has no effect. A connection that
    /// has been shut down cannot be restarted.
    pub fn start(&self) {
        let mut task = lock(&self.inner.task);
        if task.is_none() {
            let inner = Arc::clone(&self.inner);
            *task = Some(tokio::spawn(async move { inner.run().await }));
        }
    }

    /// stop the background task and complete every pending request
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let task = lock(&self.inner.task).take();
        if let Some(mut task) = task {
            tokio::select! {
                result = &mut task => {
                    if let Err(error) = result {
                        tracing::error!(%error, "session task failed");
                    }
                }
                _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
                    tracing::warn!("session task shutdown timedout, aborting instead...");
                    task.abort();
                }
            }
        }

        // a submitter may be stuck writing to a node that stopped reading
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.inner.teardown())
            .await
            .is_err()
        {
            tracing::warn!("connection teardown timedout, closing pending requests");
            self.inner.close_pending();
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// wait until the connection with the node is established
    pub async fn wait_connected(&self) {
        let mut connected = self.inner.connected.subscribe();
        while !*connected.borrow() {
            if connected.changed().await.is_err() {
                return;
            }
        }
    }

    /// create a new message with a fresh identifier
    ///
    /// identifiers are never reused, not even across reconnections
    pub fn message(&self, message_type: MessageType) -> SessionMessage {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        SessionMessage::new(message_type, id.to_string())
    }

    /// send the message to the node and return the handle to its replies
    pub async fn submit(&self, message: SessionMessage) -> Result<PendingReply, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NoConnection);
        }

        let identifier = message
            .identifier()
            .ok_or(SessionError::MissingIdentifier)?
            .to_owned();

        let mut writer = self.inner.writer.lock().await;
        let writer = writer.as_mut().ok_or(SessionError::NoConnection)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut clients = lock(&self.inner.clients);
            if clients.contains_key(&identifier) {
                return Err(SessionError::DuplicateIdentifier(identifier));
            }
            clients.insert(identifier.clone(), sender);
        }

        if let Err(error) = writer.send(message).await {
            lock(&self.inner.clients).remove(&identifier);

            return match error {
                CodecError::Io(error) => {
                    tracing::warn!(%error, identifier = %identifier, "cannot send request to the node");
                    Err(SessionError::NoConnection)
                }
                error => Err(SessionError::Encode(error)),
            };
        }

        tracing::trace!(identifier = %identifier, "request submitted");

        Ok(PendingReply {
            identifier,
            receiver,
        })
    }
}

impl Inner {
    #[tracing::instrument(skip(self), fields(address = %self.settings.address))]
    async fn run(&self) {
        while !self.cancel.is_cancelled() {
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                connected = self.connect() => connected,
            };

            match connected {
                Ok(reader) => match self.read(reader).await {
                    Ok(()) => tracing::info!("connection with the node closed"),
                    Err(error) => tracing::warn!(%error, "connection with the node lost"),
                },
                Err(error) => tracing::warn!(error = %format!("{:#}", error), "cannot connect to the node"),
            }

            self.teardown().await;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.reconnect_backoff) => {}
            }
        }

        self.teardown().await;
        tracing::debug!("session task stopped");
    }

    async fn connect(&self) -> Result<Reader> {
        let stream = TcpStream::connect(&self.settings.address)
            .await
            .with_context(|| format!("Cannot connect to {}", self.settings.address))?;
        let (read, write) = stream.into_split();
        let mut reader = FramedRead::new(read, SessionCodec::new(&self.settings.temp_dir));
        let mut writer = FramedWrite::new(write, SessionCodec::new(&self.settings.temp_dir));

        writer
            .send(SessionMessage::anonymous(MessageType::ClientHello))
            .await
            .context("Cannot send the hello message")?;

        let hello = tokio::time::timeout(self.settings.handshake_timeout, reader.next())
            .await
            .context("Timed out waiting for the node's hello")?;

        match hello {
            Some(Ok(hello)) if hello.message_type() == &MessageType::NodeHello => {
                tracing::info!(
                    version = hello.header("Version").unwrap_or("unknown"),
                    "connected to the node"
                );
            }
            Some(Ok(hello)) => {
                tracing::warn!(
                    message_type = %hello.message_type(),
                    "unexpected reply to the hello message"
                );
            }
            Some(Err(error)) => return Err(error).context("Cannot read the node's hello"),
            None => bail!("Connection closed during the handshake"),
        }

        *self.writer.lock().await = Some(writer);
        self.connected.send_replace(true);

        Ok(reader)
    }

    async fn read(&self, mut reader: Reader) -> Result<(), CodecError> {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                message = reader.next() => message,
            };

            match message {
                None => return Ok(()),
                Some(message) => self.dispatch(message?),
            }
        }
    }

    fn dispatch(&self, message: SessionMessage) {
        let identifier = match message.identifier() {
            Some(identifier) => identifier.to_owned(),
            None => {
                tracing::debug!(message_type = %message.message_type(), "discarding message without identifier");
                return;
            }
        };

        let mut clients = lock(&self.clients);
        if message.is_terminal() {
            match clients.remove(&identifier) {
                Some(client) => {
                    // the client may have lost interest in the reply
                    let _ = client.send(Reply::Complete(message));
                }
                None => {
                    tracing::debug!(identifier = %identifier, message_type = %message.message_type(), "discarding reply to unknown request")
                }
            }
        } else if let Some(client) = clients.get(&identifier) {
            let _ = client.send(Reply::Progress(message));
        } else {
            tracing::debug!(identifier = %identifier, message_type = %message.message_type(), "discarding reply to unknown request")
        }
    }

    async fn teardown(&self) {
        self.connected.send_replace(false);

        let mut writer = self.writer.lock().await;
        *writer = None;

        self.close_pending();
    }

    /// complete every pending request with a synthetic `ConnectionClosed`
    fn close_pending(&self) {
        let clients = std::mem::take(&mut *lock(&self.clients));
        for (identifier, client) in clients {
            let _ = client.send(Reply::Complete(SessionMessage::connection_closed(
                identifier,
            )));
        }
    }
}
