use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attachment::FileAttachment;

/// A user's profile document.
///
/// `is_pro` is a denormalized copy of the subscription verdict kept for
/// cheap reads by other clients. It may lag behind the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub is_pro: bool,
    #[serde(default)]
    pub attachments: Vec<FileAttachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// The profile created for a user who has none yet.
    #[must_use]
    pub fn new_default(now: DateTime<Utc>) -> Self {
        Self {
            display_name: "User".to_owned(),
            photo_url: None,
            is_pro: false,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
