use async_trait::async_trait;
use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::db::models::{GroupId, UserId};
use crate::state::DbPool;
use crate::store::StoreError;

/// The signed-in user behind a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
}

/// Identity and membership lookups for the current viewer.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Start a session for a user. Returns the session token.
    async fn start_session(&self, user_id: &UserId) -> Result<String, StoreError>;

    async fn end_session(&self, token: &str) -> Result<(), StoreError>;

    /// `None` when the token is unknown or expired.
    async fn current_identity(&self, token: &str) -> Result<Option<Identity>, StoreError>;

    /// Ids of every group the user currently belongs to.
    async fn group_memberships(&self, user_id: &UserId) -> Result<Vec<GroupId>, StoreError>;
}

pub struct SqliteSessionProvider {
    pool: DbPool,
    session_hours: u64,
}

impl SqliteSessionProvider {
    pub fn new(pool: DbPool, session_hours: u64) -> Self {
        Self {
            pool,
            session_hours,
        }
    }
}

#[async_trait]
impl SessionProvider for SqliteSessionProvider {
    async fn start_session(&self, user_id: &UserId) -> Result<String, StoreError> {
        let conn = self.pool.get()?;

        let token = generate_token();
        let id = uuid::Uuid::now_v7().to_string();

        conn.execute(
            "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
            params![id, user_id.as_str(), token, format!("+{} hours", self.session_hours)],
        )?;

        Ok(token)
    }

    async fn end_session(&self, token: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    async fn current_identity(&self, token: &str) -> Result<Option<Identity>, StoreError> {
        let conn = self.pool.get()?;
        let identity = conn
            .query_row(
                "SELECT u.id, u.username, u.display_name FROM sessions s \
                 JOIN users u ON u.id = s.user_id \
                 WHERE s.token = ?1 AND s.expires_at > datetime('now')",
                params![token],
                |row| {
                    Ok(Identity {
                        user_id: UserId(row.get(0)?),
                        username: row.get(1)?,
                        display_name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(identity)
    }

    async fn group_memberships(&self, user_id: &UserId) -> Result<Vec<GroupId>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT group_id FROM group_members WHERE user_id = ?1 ORDER BY group_id")?;
        let groups = stmt
            .query_map(params![user_id.as_str()], |row| Ok(GroupId(row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
