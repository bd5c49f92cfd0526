/// Database row types. These map directly to SQLite rows.
/// Distinct from momentcraft-types API models to keep the DB layer independent.

/// What happened to a friend request, decided under a single lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendRequestOutcome {
    Sent,
    UnknownUser,
    AlreadyFriends,
    AlreadySent,
    /// The target has already asked the sender.
    AlreadyPending,
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MemoryRow {
    pub id: String,
    pub user_id: String,
    /// Owner's username, joined from `users`.
    pub username: String,
    pub title: String,
    pub description: Option<String>,
    pub media_url: String,
    pub media_public_id: String,
    pub is_video: bool,
    pub caption: Option<String>,
    pub summary: Option<String>,
    pub visibility: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub model_url: Option<String>,
    pub created_at: String,
}

/// Insert payload for a new memory.
pub struct NewMemory<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub media_url: &'a str,
    pub media_public_id: &'a str,
    pub is_video: bool,
    pub caption: Option<&'a str>,
    pub summary: Option<&'a str>,
    pub visibility: &'a str,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub model_url: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct TimelineRow {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct SubscriptionRow {
    pub id: String,
    pub user_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: String,
}
