use anyhow::Result;
use rusqlite::{Row, named_params};

use crate::models::{MemoryRow, NewMemory};
use crate::{Database, OptionalExt, VISIBLE_TO_VIEWER};

pub(crate) const MEMORY_COLUMNS: &str = "m.id, m.user_id, COALESCE(u.username, 'unknown'), m.title,
    m.description, m.media_url, m.media_public_id, m.is_video, m.caption, m.summary, m.visibility,
    m.lat, m.lng, m.model_url, m.created_at";

impl Database {
    pub fn insert_memory(&self, memory: &NewMemory<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO memories (id, user_id, title, description, media_url, media_public_id,
                     is_video, caption, summary, visibility, lat, lng, model_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    memory.id,
                    memory.user_id,
                    memory.title,
                    memory.description,
                    memory.media_url,
                    memory.media_public_id,
                    memory.is_video,
                    memory.caption,
                    memory.summary,
                    memory.visibility,
                    memory.lat,
                    memory.lng,
                    memory.model_url,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_memory(&self, id: &str) -> Result<Option<MemoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories m
                 LEFT JOIN users u ON u.id = m.user_id
                 WHERE m.id = ?1"
            ))?;
            let row = stmt.query_row([id], memory_from_row).optional()?;
            Ok(row)
        })
    }

    /// Persists every mutable field of an existing memory.
    /// Returns false when the memory no longer exists.
    pub fn update_memory(&self, memory: &MemoryRow) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE memories SET title = ?2, description = ?3, media_url = ?4,
                     media_public_id = ?5, is_video = ?6, caption = ?7, summary = ?8,
                     visibility = ?9, lat = ?10, lng = ?11, model_url = ?12
                 WHERE id = ?1",
                rusqlite::params![
                    memory.id,
                    memory.title,
                    memory.description,
                    memory.media_url,
                    memory.media_public_id,
                    memory.is_video,
                    memory.caption,
                    memory.summary,
                    memory.visibility,
                    memory.lat,
                    memory.lng,
                    memory.model_url,
                ],
            )?;
            Ok(updated > 0)
        })
    }

    /// Deletes the memory; timeline membership goes with it (ON DELETE CASCADE).
    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM memories WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    /// Every memory `viewer` may read, newest first. `None` means an
    /// anonymous caller, who only sees public memories.
    pub fn memories_visible_to(&self, viewer: Option<&str>) -> Result<Vec<MemoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories m
                 LEFT JOIN users u ON u.id = m.user_id
                 WHERE {VISIBLE_TO_VIEWER}
                 ORDER BY m.created_at DESC, m.rowid DESC"
            ))?;
            let rows = stmt
                .query_map(named_params! { ":viewer": viewer }, memory_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn memory_visible_to(&self, memory_id: &str, viewer: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &format!("SELECT 1 FROM memories m WHERE m.id = :id AND {VISIBLE_TO_VIEWER}"),
                    named_params! { ":id": memory_id, ":viewer": viewer },
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn count_memories_by_user(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

pub(crate) fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryRow> {
    Ok(MemoryRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        media_url: row.get(5)?,
        media_public_id: row.get(6)?,
        is_video: row.get(7)?,
        caption: row.get(8)?,
        summary: row.get(9)?,
        visibility: row.get(10)?,
        lat: row.get(11)?,
        lng: row.get(12)?,
        model_url: row.get(13)?,
        created_at: row.get(14)?,
    })
}
