use anyhow::Result;

use crate::Database;
use crate::models::SubscriptionRow;

impl Database {
    /// Inserts or refreshes the keys of a (user, endpoint) subscription.
    pub fn upsert_subscription(
        &self,
        id: &str,
        user_id: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (user_id, endpoint)
                 DO UPDATE SET p256dh = excluded.p256dh, auth = excluded.auth",
                (id, user_id, endpoint, p256dh, auth),
            )?;
            Ok(())
        })
    }

    pub fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<SubscriptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, endpoint, p256dh, auth, created_at
                 FROM push_subscriptions WHERE user_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(SubscriptionRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        endpoint: row.get(2)?,
                        p256dh: row.get(3)?,
                        auth: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_subscription(&self, user_id: &str, endpoint: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM push_subscriptions WHERE user_id = ?1 AND endpoint = ?2",
                (user_id, endpoint),
            )?;
            Ok(removed > 0)
        })
    }

    pub fn delete_subscription_by_id(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM push_subscriptions WHERE id = ?1", [id])?;
            Ok(())
        })
    }
}
