use serde::{Deserialize, Serialize};

use crate::constants::{GROUP_CREATED_TEXT, JOINED_GROUP_TEXT};
use crate::error::{ErrorCode, ProtocolError};
use crate::types::{ChatKind, GroupId, UserId};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A client frame as it arrives on the wire.
///
/// Every field is optional at the JSON level; which ones are required
/// depends on `type` and is checked by [`InboundEnvelope::into_command`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InboundEnvelope {
    /// `send_message` | `create_group` | `join_group`
    #[serde(rename = "type")]
    pub kind: String,
    /// `dm` | `group`, only for `send_message`
    pub chat_type: String,
    pub to_user: String,
    pub group_id: String,
    pub conversation_id: String,
    pub text: String,
    pub files: Vec<String>,
    pub members: Vec<String>,
    pub name: String,
    pub source_lang: String,
    pub reply_to: String,
    pub reply_text: String,
    pub reply_sender: String,
}

/// Optional quote of an earlier message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_sender: Option<String>,
}

/// The payload shared by DM and group sends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBody {
    pub text: String,
    pub files: Vec<String>,
    /// Declared language of `text`, if the client sent one.
    pub source_lang: Option<String>,
    pub reply: ReplyMeta,
}

impl MessageBody {
    /// Declared source language, else the sender's preferred one.
    pub fn source_lang_or<'a>(&'a self, preferred: &'a str) -> &'a str {
        self.source_lang.as_deref().unwrap_or(preferred)
    }
}

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SendDirect {
        to_user: UserId,
        conversation_id: String,
        body: MessageBody,
    },
    SendGroup {
        group_id: GroupId,
        body: MessageBody,
    },
    CreateGroup {
        name: String,
        members: Vec<UserId>,
    },
    JoinGroup {
        group_id: GroupId,
    },
}

impl InboundEnvelope {
    /// Decode a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Check the fields required by the declared kind and build a [`Command`].
    pub fn into_command(self) -> Result<Command, ProtocolError> {
        match self.kind.trim() {
            "send_message" => self.into_send(),
            "create_group" => {
                let name = self.name.trim();
                if name.is_empty() {
                    return Err(missing("name", ErrorCode::GroupNameRequired));
                }
                let mut members: Vec<UserId> = Vec::with_capacity(self.members.len());
                for member in &self.members {
                    let member = member.trim();
                    if member.is_empty() || members.iter().any(|m| m.as_str() == member) {
                        continue;
                    }
                    members.push(UserId::from(member));
                }
                Ok(Command::CreateGroup {
                    name: name.to_string(),
                    members,
                })
            }
            "join_group" => {
                let group_id = self.group_id.trim();
                if group_id.is_empty() {
                    return Err(missing("group_id", ErrorCode::GroupIdRequiredToJoin));
                }
                Ok(Command::JoinGroup {
                    group_id: GroupId::from(group_id),
                })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }

    fn into_send(self) -> Result<Command, ProtocolError> {
        let chat_type = self.chat_type.trim().to_string();
        let to_user = self.to_user.trim().to_string();
        let group_id = self.group_id.trim().to_string();
        let conversation_id = self.conversation_id.trim().to_string();

        let body = MessageBody {
            text: self.text,
            files: self.files,
            source_lang: non_empty(self.source_lang),
            reply: ReplyMeta {
                reply_to: non_empty(self.reply_to),
                reply_text: non_empty(self.reply_text),
                reply_sender: non_empty(self.reply_sender),
            },
        };

        match chat_type.as_str() {
            "dm" => {
                if to_user.is_empty() {
                    return Err(missing("to_user", ErrorCode::ToUserRequiredForDm));
                }
                if conversation_id.is_empty() {
                    return Err(missing(
                        "conversation_id",
                        ErrorCode::ConversationIdRequired,
                    ));
                }
                Ok(Command::SendDirect {
                    to_user: UserId(to_user),
                    conversation_id,
                    body,
                })
            }
            "group" => {
                if group_id.is_empty() {
                    return Err(missing(
                        "group_id",
                        ErrorCode::GroupIdRequiredForGroupMessage,
                    ));
                }
                Ok(Command::SendGroup {
                    group_id: GroupId(group_id),
                    body,
                })
            }
            _ => Err(ProtocolError::UnknownChatType(chat_type)),
        }
    }
}

fn missing(field: &'static str, code: ErrorCode) -> ProtocolError {
    ProtocolError::MissingField { field, code }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    Message,
    GroupCreated,
    JoinedGroup,
    Error,
}

/// A frame produced for exactly one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub kind: OutboundKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<ChatKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(flatten)]
    pub reply: ReplyMeta,
    /// The recipient's language.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

impl OutboundEnvelope {
    fn bare(kind: OutboundKind, lang: &str) -> Self {
        Self {
            kind,
            chat_type: None,
            from_user: None,
            group_id: None,
            text: String::new(),
            files: Vec::new(),
            reply: ReplyMeta::default(),
            lang: lang.to_string(),
            error: None,
        }
    }

    /// A delivered chat message, already translated into `lang`.
    pub fn message(chat: ChatKind, from_user: UserId, text: String, lang: &str) -> Self {
        Self {
            chat_type: Some(chat),
            from_user: Some(from_user),
            text,
            ..Self::bare(OutboundKind::Message, lang)
        }
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn with_reply(mut self, reply: ReplyMeta) -> Self {
        self.reply = reply;
        self
    }

    pub fn group_created(group_id: GroupId, lang: &str) -> Self {
        Self {
            group_id: Some(group_id),
            text: GROUP_CREATED_TEXT.to_string(),
            ..Self::bare(OutboundKind::GroupCreated, lang)
        }
    }

    pub fn joined_group(group_id: GroupId, lang: &str) -> Self {
        Self {
            group_id: Some(group_id),
            text: JOINED_GROUP_TEXT.to_string(),
            ..Self::bare(OutboundKind::JoinedGroup, lang)
        }
    }

    pub fn error(code: ErrorCode, lang: &str) -> Self {
        Self {
            error: Some(code),
            ..Self::bare(OutboundKind::Error, lang)
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(raw: &str) -> Result<Command, ProtocolError> {
        InboundEnvelope::parse(raw)?.into_command()
    }

    #[test]
    fn test_dm_requires_target_and_conversation() {
        let err = command(r#"{"type":"send_message","chat_type":"dm","conversation_id":"c1"}"#)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ToUserRequiredForDm);

        let err = command(r#"{"type":"send_message","chat_type":"dm","to_user":"bob"}"#)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConversationIdRequired);
    }

    #[test]
    fn test_dm_with_reply_metadata() {
        let cmd = command(
            r#"{"type":" send_message ","chat_type":"dm","to_user":" bob ","conversation_id":"c1",
                "text":"hello","files":["/uploads/a.png"],"source_lang":"en",
                "reply_to":"m1","reply_text":"earlier","reply_sender":"alice"}"#,
        )
        .unwrap();

        match cmd {
            Command::SendDirect {
                to_user,
                conversation_id,
                body,
            } => {
                assert_eq!(to_user, UserId::from("bob"));
                assert_eq!(conversation_id, "c1");
                assert_eq!(body.text, "hello");
                assert_eq!(body.files, vec!["/uploads/a.png".to_string()]);
                assert_eq!(body.source_lang_or("fr"), "en");
                assert_eq!(body.reply.reply_to.as_deref(), Some("m1"));
                assert_eq!(body.reply.reply_sender.as_deref(), Some("alice"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_source_lang_falls_back_to_preferred() {
        let body = MessageBody::default();
        assert_eq!(body.source_lang_or("hi"), "hi");
    }

    #[test]
    fn test_group_send_requires_group_id() {
        let err = command(r#"{"type":"send_message","chat_type":"group"}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GroupIdRequiredForGroupMessage);
    }

    #[test]
    fn test_unknown_kinds() {
        let err = command(r#"{"type":"send_message","chat_type":"broadcast"}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownChatType);

        let err = command(r#"{"type":"typing"}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownType);

        let err = command("{not json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidJson);
    }

    #[test]
    fn test_create_group_dedupes_members() {
        let cmd = command(r#"{"type":"create_group","name":" team ","members":["a","b","a",""]}"#)
            .unwrap();
        assert_eq!(
            cmd,
            Command::CreateGroup {
                name: "team".to_string(),
                members: vec![UserId::from("a"), UserId::from("b")],
            }
        );

        let err = command(r#"{"type":"create_group","name":"   "}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GroupNameRequired);
    }

    #[test]
    fn test_join_group_requires_group_id() {
        let err = command(r#"{"type":"join_group"}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GroupIdRequiredToJoin);
    }

    #[test]
    fn test_outbound_omits_empty_fields() {
        let json = OutboundEnvelope::error(ErrorCode::UnknownType, "en")
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"], "unknown_type");
        assert_eq!(value["lang"], "en");
        assert!(value.get("files").is_none());
        assert!(value.get("reply_to").is_none());
    }

    #[test]
    fn test_outbound_message_flattens_reply() {
        let envelope = OutboundEnvelope::message(
            ChatKind::Group,
            UserId::from("carol"),
            "hi".to_string(),
            "fr",
        )
        .with_group(GroupId::from("g1"))
        .with_reply(ReplyMeta {
            reply_to: Some("m9".to_string()),
            reply_text: None,
            reply_sender: Some("Alice".to_string()),
        });

        let value: serde_json::Value =
            serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["chat_type"], "group");
        assert_eq!(value["from_user"], "carol");
        assert_eq!(value["group_id"], "g1");
        assert_eq!(value["reply_to"], "m9");
        assert_eq!(value["reply_sender"], "Alice");

        let back: OutboundEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_acks_carry_text() {
        let ack = OutboundEnvelope::group_created(GroupId::from("g1"), "en");
        assert_eq!(ack.kind, OutboundKind::GroupCreated);
        assert_eq!(ack.text, GROUP_CREATED_TEXT);

        let ack = OutboundEnvelope::joined_group(GroupId::from("g1"), "en");
        assert_eq!(ack.text, JOINED_GROUP_TEXT);
    }
}
