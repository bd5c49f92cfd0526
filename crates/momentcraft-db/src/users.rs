use anyhow::Result;
use rusqlite::{Connection, Params, Row};

use crate::models::{FriendRequestOutcome, UserRow};
use crate::{Database, OptionalExt};

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password, u.created_at";

impl Database {
    // -- Users --

    /// Returns false when the username or email is already taken.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users (id, username, email, password)
                 VALUES (?1, ?2, ?3, ?4)",
                (id, username, email, password_hash),
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.id = ?1", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.username = ?1", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.email = ?1", email))
    }

    /// Users the caller could send a request to: everyone except the caller,
    /// their friends, and anyone with a request pending in either direction.
    pub fn discoverable_users(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                &format!(
                    "SELECT {USER_COLUMNS} FROM users u
                     WHERE u.id != ?1
                       AND u.id NOT IN (SELECT friend_id FROM friendships WHERE user_id = ?1)
                       AND u.id NOT IN (SELECT from_id FROM friend_requests WHERE to_id = ?1)
                       AND u.id NOT IN (SELECT to_id FROM friend_requests WHERE from_id = ?1)
                     ORDER BY u.username"
                ),
                [user_id],
            )
        })
    }

    // -- Friends --

    pub fn friends_of(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                &format!(
                    "SELECT {USER_COLUMNS} FROM friendships f
                     JOIN users u ON u.id = f.friend_id
                     WHERE f.user_id = ?1
                     ORDER BY u.username"
                ),
                [user_id],
            )
        })
    }

    pub fn friend_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT friend_id FROM friendships WHERE user_id = ?1 ORDER BY created_at",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    /// True when `friend_id` is in `user_id`'s friends set.
    pub fn is_friend(&self, user_id: &str, friend_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
                    (user_id, friend_id),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Adds `friend_id` to `user_id`'s friends set. No-op when already present.
    pub fn add_friend(&self, user_id: &str, friend_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2)",
                (user_id, friend_id),
            )?;
            Ok(())
        })
    }

    /// Removes the friendship in both directions.
    pub fn remove_friend(&self, user_id: &str, friend_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                (user_id, friend_id),
            )?;
            Ok(())
        })
    }

    // -- Friend requests --

    /// Checks and records a request from `from_id` to `to_id` in one
    /// transaction.
    pub fn send_friend_request(&self, from_id: &str, to_id: &str) -> Result<FriendRequestOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let request = "SELECT 1 FROM friend_requests WHERE from_id = ?1 AND to_id = ?2";

            let outcome = if !exists(&tx, "SELECT 1 FROM users WHERE id = ?1", [to_id])? {
                FriendRequestOutcome::UnknownUser
            } else if exists(
                &tx,
                "SELECT 1 FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                (from_id, to_id),
            )? {
                FriendRequestOutcome::AlreadyFriends
            } else if exists(&tx, request, (from_id, to_id))? {
                FriendRequestOutcome::AlreadySent
            } else if exists(&tx, request, (to_id, from_id))? {
                FriendRequestOutcome::AlreadyPending
            } else {
                tx.execute(
                    "INSERT INTO friend_requests (from_id, to_id) VALUES (?1, ?2)",
                    (from_id, to_id),
                )?;
                FriendRequestOutcome::Sent
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Consumes the request from `requester_id` to `recipient_id` and makes
    /// the two users mutual friends. Returns false when no such request exists.
    pub fn accept_friend_request(&self, requester_id: &str, recipient_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
                (requester_id, recipient_id),
            )?;
            if removed == 0 {
                return Ok(false);
            }
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2), (?2, ?1)",
                (requester_id, recipient_id),
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Drops the request without creating a friendship.
    pub fn decline_friend_request(&self, requester_id: &str, recipient_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
                (requester_id, recipient_id),
            )?;
            Ok(removed > 0)
        })
    }

    /// Users who asked `user_id` to be friends.
    pub fn pending_requests(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                &format!(
                    "SELECT {USER_COLUMNS} FROM friend_requests r
                     JOIN users u ON u.id = r.from_id
                     WHERE r.to_id = ?1
                     ORDER BY r.created_at"
                ),
                [user_id],
            )
        })
    }

    /// Users `user_id` has asked to be friends.
    pub fn sent_requests(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                &format!(
                    "SELECT {USER_COLUMNS} FROM friend_requests r
                     JOIN users u ON u.id = r.to_id
                     WHERE r.from_id = ?1
                     ORDER BY r.created_at"
                ),
                [user_id],
            )
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn exists<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<bool> {
    Ok(conn.query_row(sql, params, |_| Ok(())).optional()?.is_some())
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users u WHERE {predicate}"))?;
    stmt.query_row([value], user_from_row).optional()
}

fn query_users<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
