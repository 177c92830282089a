//! Participant-related models

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;

/// Where a participant's avatar image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AvatarSource {
    Url { url: String },
    Asset { name: String, url: String },
}

impl AvatarSource {
    /// Key under which the downloaded bytes are cached.
    pub fn cache_key(&self) -> CacheKey {
        match self {
            Self::Url { url } => CacheKey::Url(url.clone()),
            Self::Asset { name, .. } => CacheKey::Asset(name.clone()),
        }
    }
}

/// Conversation participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub display_name: Option<String>,
    pub avatar: Option<AvatarSource>,
}

impl Participant {
    pub fn new(id: impl Into<String>, display_name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.map(String::from),
            avatar: None,
        }
    }
}
