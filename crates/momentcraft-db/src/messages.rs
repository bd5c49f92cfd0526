use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::Database;
use crate::models::MessageRow;

/// `strftime('%Y-%m-%dT%H:%M:%fZ')` as chrono renders it.
const STORED_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

impl Database {
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        recipient_id: &str,
        content: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, content)
                 VALUES (?1, ?2, ?3, ?4)",
                (id, sender_id, recipient_id, content),
            )?;
            Ok(())
        })
    }

    /// Messages exchanged between two users in either direction, newest first.
    /// `before` is the `created_at` of the oldest message of the previous page.
    pub fn get_conversation(
        &self,
        user_a: &str,
        user_b: &str,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageRow>> {
        // Same layout as the column default, so text comparison orders correctly.
        let before = before.map(|t| t.format(STORED_TIMESTAMP).to_string());
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, recipient_id, content, created_at
                 FROM messages
                 WHERE ((sender_id = ?1 AND recipient_id = ?2)
                        OR (sender_id = ?2 AND recipient_id = ?1))
                   AND (?3 IS NULL OR created_at < ?3)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?4",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_a, user_b, before, limit], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        recipient_id: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}
