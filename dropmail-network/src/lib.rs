/*!
# dropmail session protocol

this crate implements the client side of the line oriented session
protocol spoken with the local storage node:

1. the client connects and sends a `ClientHello`, the node answers with
   a `NodeHello`;
2. every request carries a unique `Identifier`. The node may answer with
   any number of progress messages followed by exactly one terminal
   message (see [`MessageType::is_terminal`]);
3. many requests can be in flight at the same time on the same connection,
   the replies are dispatched to their request by identifier.

The [`SessionConnection`] keeps the connection with the node alive and
[`NodeClient`] exposes the two operations the mail engines need: fetching
and inserting content at a given key.
*/

mod client;
pub mod codec;
mod connection;
mod error;
mod message;

pub use self::{
    client::{InsertOutcome, KeyPair, NodeClient},
    connection::{ConnectionSettings, PendingReply, Reply, SessionConnection},
    error::SessionError,
    message::{Headers, MessageType, Payload, PayloadReader, SessionMessage},
};
