//! CRUD operations for [`GroupRecord`] records and their membership.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::messages::parse_timestamp;
use crate::models::{GroupDraft, GroupRecord};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a group and its initial membership atomically.
    ///
    /// The creator is always a member, listed first.
    pub fn create_group(&mut self, draft: GroupDraft) -> Result<GroupRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let mut members = vec![draft.created_by.clone()];
        for member in draft.members {
            if !members.contains(&member) {
                members.push(member);
            }
        }

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO groups (id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, draft.name, draft.created_by, created_at.to_rfc3339()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
            )?;
            for member in &members {
                stmt.execute(params![id, member])?;
            }
        }
        tx.commit()?;

        Ok(GroupRecord {
            id,
            name: draft.name,
            members,
            created_by: draft.created_by,
            created_at,
        })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Idempotently add `user_id` to a group and return the group as stored
    /// afterwards. Fails with [`StoreError::NotFound`] for unknown groups.
    pub fn add_group_member(&mut self, group_id: &str, user_id: &str) -> Result<GroupRecord> {
        let tx = self.conn_mut().transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM groups WHERE id = ?1",
                params![group_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }
        tx.execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
            params![group_id, user_id],
        )?;
        tx.commit()?;

        self.get_group(group_id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_group(&self, group_id: &str) -> Result<GroupRecord> {
        let mut group = self
            .conn()
            .query_row(
                "SELECT id, name, created_by, created_at FROM groups WHERE id = ?1",
                params![group_id],
                row_to_group,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;
        group.members = self.group_members(group_id)?;
        Ok(group)
    }

    /// Every group with its membership, oldest first.
    pub fn list_groups(&self) -> Result<Vec<GroupRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, created_by, created_at FROM groups ORDER BY created_at ASC",
        )?;
        let mut groups = stmt
            .query_map([], row_to_group)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for group in &mut groups {
            group.members = self.group_members(&group.id)?;
        }
        Ok(groups)
    }

    fn group_members(&self, group_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id FROM group_members WHERE group_id = ?1 ORDER BY seq ASC")?;
        let rows = stmt.query_map(params![group_id], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRecord> {
    let created_str: String = row.get(3)?;
    Ok(GroupRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        members: Vec::new(),
        created_by: row.get(2)?,
        created_at: parse_timestamp(3, &created_str)?,
    })
}
