use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes carried in the `error` field of an outbound error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidJson,
    UnknownType,
    UnknownChatType,
    ToUserRequiredForDm,
    ConversationIdRequired,
    GroupIdRequiredForGroupMessage,
    GroupNameRequired,
    GroupIdRequiredToJoin,
    GroupNotFound,
    DbErrorGroupMessage,
    DbErrorCreatingGroup,
    DbErrorJoinGroup,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidJson => "invalid_json",
            ErrorCode::UnknownType => "unknown_type",
            ErrorCode::UnknownChatType => "unknown_chat_type",
            ErrorCode::ToUserRequiredForDm => "to_user_required_for_dm",
            ErrorCode::ConversationIdRequired => "conversation_id_required",
            ErrorCode::GroupIdRequiredForGroupMessage => "group_id_required_for_group_message",
            ErrorCode::GroupNameRequired => "group_name_required",
            ErrorCode::GroupIdRequiredToJoin => "group_id_required_to_join",
            ErrorCode::GroupNotFound => "group_not_found",
            ErrorCode::DbErrorGroupMessage => "db_error_group_message",
            ErrorCode::DbErrorCreatingGroup => "db_error_creating_group",
            ErrorCode::DbErrorJoinGroup => "db_error_join_group",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons an inbound frame cannot be turned into a [`crate::Command`].
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown envelope type: {0:?}")]
    UnknownType(String),

    #[error("Unknown chat type: {0:?}")]
    UnknownChatType(String),

    #[error("Missing required field `{field}`")]
    MissingField { field: &'static str, code: ErrorCode },
}

impl ProtocolError {
    /// The code reported back to the sender.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::Json(_) => ErrorCode::InvalidJson,
            ProtocolError::UnknownType(_) => ErrorCode::UnknownType,
            ProtocolError::UnknownChatType(_) => ErrorCode::UnknownChatType,
            ProtocolError::MissingField { code, .. } => *code,
        }
    }
}
