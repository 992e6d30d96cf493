//! Wire protocol between a client session and the server
//!
//! Messages are JSON objects tagged by a `type` field. Changesets travel in
//! their packed string form next to the (minimal) attribute pool their codes
//! refer to.

mod message;

pub use message::{decode_message, encode_message, BaseDocument, Message, RemoteChanges, UserChanges};
