//! Read/write helpers for the `users` collection.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::messages::parse_timestamp;
use crate::models::UserProfile;

impl Database {
    /// Insert or refresh a user's naming fields. `created_at` is kept on update.
    pub fn upsert_user(
        &self,
        id: &str,
        name: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, name, display_name, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                                           display_name = excluded.display_name",
            params![id, name, display_name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserProfile>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, name, display_name, created_at FROM users WHERE id = ?1",
                params![id],
                |row| {
                    let created_str: String = row.get(3)?;
                    Ok(UserProfile {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        display_name: row.get(2)?,
                        created_at: parse_timestamp(3, &created_str)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentable_name_prefers_display_name() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user("u1", Some("Alice A."), Some("alice")).unwrap();
        db.upsert_user("u2", Some("Bob"), Some("  ")).unwrap();
        db.upsert_user("u3", None, None).unwrap();

        let name = |id| db.get_user(id).unwrap().unwrap().presentable_name().map(String::from);
        assert_eq!(name("u1").as_deref(), Some("alice"));
        assert_eq!(name("u2").as_deref(), Some("Bob"));
        assert_eq!(name("u3"), None);
        assert!(db.get_user("nobody").unwrap().is_none());
    }

    #[test]
    fn test_upsert_updates_names() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user("u1", Some("old"), None).unwrap();
        db.upsert_user("u1", Some("new"), None).unwrap();
        assert_eq!(
            db.get_user("u1").unwrap().unwrap().name.as_deref(),
            Some("new")
        );
    }
}
