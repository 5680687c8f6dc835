//! CRUD operations for [`Message`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, MessageDraft, MessageTarget};

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, group_id, content, content_lang,
     reply_to, reply_text, reply_sender, files, created_at, delivered, delivered_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Persist a new message. Direct messages start undelivered; group
    /// messages carry no delivery state.
    pub fn insert_message(&self, draft: MessageDraft) -> Result<Message> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let (recipient_id, group_id, delivered) = match &draft.target {
            MessageTarget::Direct(recipient) => (Some(recipient.as_str()), None, Some(false)),
            MessageTarget::Group(group) => (None, Some(group.as_str()), None),
        };

        self.conn().execute(
            "INSERT INTO messages (id, sender_id, recipient_id, group_id, content, content_lang,
                                   reply_to, reply_text, reply_sender, files, created_at, delivered)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id.to_string(),
                draft.sender_id,
                recipient_id,
                group_id,
                draft.content,
                draft.content_lang,
                draft.reply_to,
                draft.reply_text,
                draft.reply_sender,
                serde_json::to_string(&draft.files)?,
                created_at.to_rfc3339(),
                delivered,
            ],
        )?;

        Ok(Message {
            id,
            sender_id: draft.sender_id,
            target: draft.target,
            content: draft.content,
            content_lang: draft.content_lang,
            reply_to: draft.reply_to,
            reply_text: draft.reply_text,
            reply_sender: draft.reply_sender,
            files: draft.files,
            created_at,
            delivered,
            delivered_at: None,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Direct messages addressed to `recipient_id` that were never handed
    /// to a connection, in store order.
    pub fn undelivered_for(&self, recipient_id: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE recipient_id = ?1 AND delivered = 0
             ORDER BY seq ASC"
        ))?;

        let rows = stmt.query_map(params![recipient_id], row_to_message)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Flag a batch of direct messages as delivered in one transaction.
    ///
    /// Returns the number of rows changed. Group messages and unknown ids
    /// are ignored.
    pub fn mark_delivered(&mut self, ids: &[Uuid], at: DateTime<Utc>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let tx = self.conn_mut().transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE messages SET delivered = 1, delivered_at = ?2
                 WHERE id = ?1 AND recipient_id IS NOT NULL",
            )?;
            let at = at.to_rfc3339();
            for id in ids {
                changed += stmt.execute(params![id.to_string(), at])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let recipient_id: Option<String> = row.get(2)?;
    let group_id: Option<String> = row.get(3)?;
    let files_json: String = row.get(9)?;
    let created_str: String = row.get(10)?;
    let delivered: Option<bool> = row.get(11)?;
    let delivered_str: Option<String> = row.get(12)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let target = match (recipient_id, group_id) {
        (Some(recipient), None) => MessageTarget::Direct(recipient),
        (None, Some(group)) => MessageTarget::Group(group),
        _ => {
            return Err(rusqlite::Error::InvalidColumnType(
                2,
                "recipient_id/group_id".to_string(),
                rusqlite::types::Type::Null,
            ))
        }
    };

    let files: Vec<String> = serde_json::from_str(&files_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at = parse_timestamp(10, &created_str)?;
    let delivered_at = delivered_str
        .as_deref()
        .map(|s| parse_timestamp(12, s))
        .transpose()?;

    Ok(Message {
        id,
        sender_id: row.get(1)?,
        target,
        content: row.get(4)?,
        content_lang: row.get(5)?,
        reply_to: row.get(6)?,
        reply_text: row.get(7)?,
        reply_sender: row.get(8)?,
        files,
        created_at,
        delivered,
        delivered_at,
    })
}

pub(crate) fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
