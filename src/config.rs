//! Session configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Settings for one editing session
///
/// Every field has a default, so a partial (or empty) JSON object is a valid
/// configuration.
///
/// ```
/// use textsync_core::SessionConfig;
///
/// let config = SessionConfig::from_json_str(r#"{"authorId": "a.x7Kp"}"#).unwrap();
/// assert_eq!(config.author_id.as_deref(), Some("a.x7Kp"));
/// assert_eq!(config.non_undoable_events, vec!["clearauthorship".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Author recorded on text this client submits
    pub author_id: Option<String>,

    /// Event types the undo stack never records
    pub non_undoable_events: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            author_id: None,
            non_undoable_events: vec!["clearauthorship".to_string()],
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }
}
