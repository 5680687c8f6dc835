//! Records persisted in the message store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Where a message is addressed. A message has exactly one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageTarget {
    /// Direct message to one recipient.
    Direct(String),
    /// Message posted to a group.
    Group(String),
}

/// A message about to be written. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub sender_id: String,
    pub target: MessageTarget,
    pub content: String,
    pub content_lang: String,
    pub reply_to: Option<String>,
    pub reply_text: Option<String>,
    pub reply_sender: Option<String>,
    pub files: Vec<String>,
}

/// A persisted message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub target: MessageTarget,
    pub content: String,
    pub content_lang: String,
    pub reply_to: Option<String>,
    pub reply_text: Option<String>,
    pub reply_sender: Option<String>,
    pub files: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// `Some` for direct messages only.
    pub delivered: Option<bool>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn recipient_id(&self) -> Option<&str> {
        match &self.target {
            MessageTarget::Direct(recipient) => Some(recipient),
            MessageTarget::Group(_) => None,
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        match &self.target {
            MessageTarget::Group(group) => Some(group),
            MessageTarget::Direct(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A group about to be created. The creator is added to `members` by the
/// store if absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDraft {
    pub name: String,
    pub created_by: String,
    pub members: Vec<String>,
}

/// A persisted group with its full membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    /// Member user ids in join order.
    pub members: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Profile fields the hub reads to present reply senders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Display name, else name. Blank values count as absent.
    pub fn presentable_name(&self) -> Option<&str> {
        [self.display_name.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}
