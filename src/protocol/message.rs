//! Message types and their JSON encoding

use crate::changeset::{AText, Changeset};
use crate::error::Result;
use crate::pool::AttributePool;
use crate::tracker::PreparedChangeset;
use serde::{Deserialize, Serialize};

/// Full document sent on (re)connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseDocument {
    pub atext: AText,
    /// Pool the attribution of `atext` refers to
    pub apool: AttributePool,
}

/// Local edits submitted to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserChanges {
    pub changeset: Changeset,
    /// Minimal pool holding exactly the attributes `changeset` uses
    pub apool: AttributePool,
}

impl UserChanges {
    /// Wrap a prepared changeset, if there was anything to send
    pub fn from_prepared(prepared: PreparedChangeset) -> Option<Self> {
        let changeset = prepared.changeset?;
        Some(Self {
            changeset,
            apool: prepared.apool.unwrap_or_default(),
        })
    }
}

/// Someone else's edit, relayed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChanges {
    pub changeset: Changeset,
    #[serde(default)]
    pub author: Option<String>,
    pub apool: AttributePool,
}

/// Everything exchanged between a session and the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// server -> client: the document to start from
    ClientVars(BaseDocument),
    /// client -> server
    UserChanges(UserChanges),
    /// server -> client: the last submission was applied
    AcceptCommit,
    /// server -> client
    NewChanges(RemoteChanges),
}

impl Message {
    /// Message type as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ClientVars(_) => "CLIENT_VARS",
            Message::UserChanges(_) => "USER_CHANGES",
            Message::AcceptCommit => "ACCEPT_COMMIT",
            Message::NewChanges(_) => "NEW_CHANGES",
        }
    }
}

/// Encode a message as JSON
pub fn encode_message(message: &Message) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a JSON message
///
/// Changesets and pools are validated while decoding, so a message that
/// decodes is internally consistent.
pub fn decode_message(json: &str) -> Result<Message> {
    Ok(serde_json::from_str(json)?)
}
