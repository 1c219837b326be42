// Document store abstraction; callers only hold an `Arc<dyn DocumentStore>`
pub mod query;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{
    AuthorSummary, Bookmark, Comment, CommentId, Group, GroupId, GroupMembership, NewComment,
    NewPost, NewUser, Post, PostId, PostPatch, User, UserId,
};

pub use query::{Field, Filter, PostQuery};
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown cursor: {0}")]
    InvalidCursor(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Collections and the operations the service needs on them.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // --- Users ---

    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError>;

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    // --- Posts ---

    /// Filtered posts, newest first, honoring `limit` and the `after` cursor.
    async fn list_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError>;

    async fn get_post(&self, id: &PostId) -> Result<Post, StoreError>;

    async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError>;

    async fn update_post(&self, id: &PostId, patch: &PostPatch) -> Result<Post, StoreError>;

    /// Removes the post with its comments and bookmarks.
    async fn delete_post(&self, id: &PostId) -> Result<(), StoreError>;

    /// Authors ranked by number of published public posts.
    async fn popular_authors(&self, limit: u32) -> Result<Vec<AuthorSummary>, StoreError>;

    // --- Comments ---

    async fn list_comments(&self, post_id: &PostId) -> Result<Vec<Comment>, StoreError>;

    async fn get_comment(&self, id: &CommentId) -> Result<Comment, StoreError>;

    async fn create_comment(&self, comment: &NewComment) -> Result<Comment, StoreError>;

    async fn delete_comment(&self, id: &CommentId) -> Result<(), StoreError>;

    // --- Groups ---

    /// Creates the group and enrolls its admin as the first member.
    async fn create_group(&self, name: &str, admin: &UserId) -> Result<Group, StoreError>;

    async fn get_group(&self, id: &GroupId) -> Result<Group, StoreError>;

    async fn add_member(
        &self,
        group: &GroupId,
        user: &UserId,
    ) -> Result<GroupMembership, StoreError>;

    /// Returns false when the user was not a member.
    async fn remove_member(&self, group: &GroupId, user: &UserId) -> Result<bool, StoreError>;

    async fn list_members(&self, group: &GroupId) -> Result<Vec<GroupMembership>, StoreError>;

    async fn groups_for_user(&self, user: &UserId) -> Result<Vec<Group>, StoreError>;

    // --- Bookmarks ---

    /// Idempotent.
    async fn add_bookmark(&self, user: &UserId, post: &PostId) -> Result<Bookmark, StoreError>;

    async fn remove_bookmark(&self, user: &UserId, post: &PostId) -> Result<bool, StoreError>;

    /// Bookmarked posts, most recently bookmarked first.
    async fn bookmarked_posts(&self, user: &UserId) -> Result<Vec<Post>, StoreError>;
}
