use anyhow::Result;
use rusqlite::{Row, named_params};

use crate::memories::{MEMORY_COLUMNS, memory_from_row};
use crate::models::{MemoryRow, TimelineRow};
use crate::{Database, OptionalExt, VISIBLE_TO_VIEWER};

const TIMELINE_COLUMNS: &str =
    "t.id, t.user_id, COALESCE(u.username, 'unknown'), t.name, t.description, t.created_at";

impl Database {
    pub fn insert_timeline(
        &self,
        id: &str,
        user_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO timelines (id, user_id, name, description) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, user_id, name, description],
            )?;
            Ok(())
        })
    }

    pub fn get_timeline(&self, id: &str) -> Result<Option<TimelineRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TIMELINE_COLUMNS} FROM timelines t
                 LEFT JOIN users u ON u.id = t.user_id
                 WHERE t.id = ?1"
            ))?;
            let row = stmt.query_row([id], timeline_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn timelines_for_user(&self, user_id: &str) -> Result<Vec<TimelineRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TIMELINE_COLUMNS} FROM timelines t
                 LEFT JOIN users u ON u.id = t.user_id
                 WHERE t.user_id = ?1
                 ORDER BY t.created_at, t.rowid"
            ))?;
            let rows = stmt
                .query_map([user_id], timeline_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_timeline(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM timelines WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    // -- Membership --

    /// Member ids in display order, ignoring visibility.
    pub fn timeline_memory_ids(&self, timeline_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT memory_id FROM timeline_memories WHERE timeline_id = ?1 ORDER BY position",
            )?;
            let ids = stmt
                .query_map([timeline_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    /// Members in display order, restricted to what `viewer` may read.
    pub fn timeline_memories(
        &self,
        timeline_id: &str,
        viewer: Option<&str>,
    ) -> Result<Vec<MemoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM timeline_memories tm
                 JOIN memories m ON m.id = tm.memory_id
                 LEFT JOIN users u ON u.id = m.user_id
                 WHERE tm.timeline_id = :timeline AND {VISIBLE_TO_VIEWER}
                 ORDER BY tm.position"
            ))?;
            let rows = stmt
                .query_map(
                    named_params! { ":timeline": timeline_id, ":viewer": viewer },
                    memory_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Appends the memory at the end of the timeline. Returns false when it
    /// was already a member.
    pub fn add_memory_to_timeline(&self, timeline_id: &str, memory_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let added = conn.execute(
                "INSERT OR IGNORE INTO timeline_memories (timeline_id, memory_id, position)
                 SELECT ?1, ?2, COALESCE(MAX(position) + 1, 0)
                 FROM timeline_memories WHERE timeline_id = ?1",
                (timeline_id, memory_id),
            )?;
            Ok(added > 0)
        })
    }

    pub fn remove_memory_from_timeline(&self, timeline_id: &str, memory_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM timeline_memories WHERE timeline_id = ?1 AND memory_id = ?2",
                (timeline_id, memory_id),
            )?;
            Ok(removed > 0)
        })
    }

    /// Replaces the membership with `memory_ids`, in that order.
    pub fn set_timeline_order(&self, timeline_id: &str, memory_ids: &[String]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM timeline_memories WHERE timeline_id = ?1", [timeline_id])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO timeline_memories (timeline_id, memory_id, position)
                     VALUES (?1, ?2, ?3)",
                )?;
                for (position, memory_id) in memory_ids.iter().enumerate() {
                    stmt.execute(rusqlite::params![timeline_id, memory_id, position as i64])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    // -- Sharing --

    /// Grants each user read access to the timeline. Already-shared pairs are
    /// left untouched.
    pub fn share_timeline(&self, timeline_id: &str, user_ids: &[String]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO shared_timelines (user_id, timeline_id) VALUES (?1, ?2)",
                )?;
                for user_id in user_ids {
                    stmt.execute((user_id.as_str(), timeline_id))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn is_timeline_shared_with(&self, timeline_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM shared_timelines WHERE timeline_id = ?1 AND user_id = ?2",
                    (timeline_id, user_id),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn shared_timelines_for(&self, user_id: &str) -> Result<Vec<TimelineRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TIMELINE_COLUMNS} FROM shared_timelines s
                 JOIN timelines t ON t.id = s.timeline_id
                 LEFT JOIN users u ON u.id = t.user_id
                 WHERE s.user_id = ?1
                 ORDER BY s.created_at"
            ))?;
            let rows = stmt
                .query_map([user_id], timeline_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn timeline_from_row(row: &Row<'_>) -> rusqlite::Result<TimelineRow> {
    Ok(TimelineRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
    })
}
