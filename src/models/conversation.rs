//! Conversation model

use serde::{Deserialize, Serialize};

use super::Participant;

/// Conversation entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub participant_ids: Vec<String>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, participant_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            participant_ids,
        }
    }

    /// Comma-separated display names of everyone except `current_user_id`.
    ///
    /// Participants without a display name are skipped. Returns `None` when
    /// nothing is left to show.
    pub fn name_list<'a>(
        &self,
        participants: impl IntoIterator<Item = &'a Participant>,
        current_user_id: &str,
    ) -> Option<String> {
        let mut names: Vec<&str> = participants
            .into_iter()
            .filter(|p| p.id != current_user_id)
            .filter_map(|p| p.display_name.as_deref())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return None;
        }
        names.sort_unstable();
        Some(names.join(", "))
    }
}
