//! Typing-indicator models

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Local typing state pushed to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingState {
    Begin,
    Pause,
    Finished,
}

/// Remote typing event: everyone currently typing in the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub user_ids: BTreeSet<String>,
}

impl TypingIndicator {
    pub fn new<I, S>(user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_ids: user_ids.into_iter().map(Into::into).collect(),
        }
    }

    /// True if anyone besides `local_user_id` is typing.
    pub fn has_others(&self, local_user_id: &str) -> bool {
        self.user_ids.iter().any(|id| id != local_user_id)
    }
}
