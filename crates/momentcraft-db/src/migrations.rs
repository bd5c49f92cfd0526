use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            -- Directed: friend_id is in user_id's friends set.
            CREATE TABLE friendships (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                friend_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (user_id, friend_id)
            );

            CREATE TABLE friend_requests (
                from_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                to_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (from_id, to_id)
            );

            CREATE INDEX idx_friend_requests_to ON friend_requests(to_id);

            CREATE TABLE memories (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title            TEXT NOT NULL,
                description      TEXT,
                media_url        TEXT NOT NULL,
                media_public_id  TEXT NOT NULL,
                is_video         INTEGER NOT NULL DEFAULT 0,
                caption          TEXT,
                summary          TEXT,
                visibility       TEXT NOT NULL DEFAULT 'private'
                                 CHECK (visibility IN ('private', 'friends', 'public')),
                lat              REAL,
                lng              REAL,
                model_url        TEXT,
                created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_memories_user ON memories(user_id, created_at);
            CREATE INDEX idx_memories_visibility ON memories(visibility, created_at);

            CREATE TABLE timelines (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name         TEXT NOT NULL,
                description  TEXT,
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE timeline_memories (
                timeline_id  TEXT NOT NULL REFERENCES timelines(id) ON DELETE CASCADE,
                memory_id    TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
                position     INTEGER NOT NULL,
                PRIMARY KEY (timeline_id, memory_id)
            );

            CREATE TABLE shared_timelines (
                user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                timeline_id  TEXT NOT NULL REFERENCES timelines(id) ON DELETE CASCADE,
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (user_id, timeline_id)
            );

            CREATE TABLE messages (
                id            TEXT PRIMARY KEY,
                sender_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipient_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content       TEXT NOT NULL,
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_messages_pair ON messages(sender_id, recipient_id, created_at);

            CREATE TABLE push_subscriptions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                endpoint    TEXT NOT NULL,
                p256dh      TEXT NOT NULL,
                auth        TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE (user_id, endpoint)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
