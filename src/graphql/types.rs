use async_graphql::*;
use chrono::{DateTime, Utc};

use crate::db::models;
use crate::visibility::PostPage;

#[derive(Clone, Copy, Debug, Enum, Eq, PartialEq)]
#[graphql(remote = "crate::db::models::Visibility")]
pub enum Visibility {
    Public,
    Private,
    Groups,
}

#[derive(Clone, Copy, Debug, Enum, Eq, PartialEq)]
#[graphql(remote = "crate::db::models::PostStatus")]
pub enum PostStatus {
    Published,
    Draft,
}

#[derive(Clone, Copy, Debug, Enum, Eq, PartialEq)]
#[graphql(remote = "crate::db::models::PostCategory")]
pub enum PostCategory {
    Standard,
    Blog,
}

/// A post the current viewer is allowed to read
#[derive(Clone, Debug, SimpleObject)]
pub struct PostObject {
    pub id: String,

    /// Author's user id
    pub user_id: String,

    /// Author's display name at the time of writing
    pub user_name: String,

    pub title: String,

    /// Editor document, passed through untouched
    pub content: Json<serde_json::Value>,

    pub visibility: Visibility,

    /// Groups the post is shared with (only for group visibility)
    pub group_ids: Vec<String>,

    pub status: PostStatus,

    pub category: PostCategory,

    pub label: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl From<models::Post> for PostObject {
    fn from(post: models::Post) -> Self {
        Self {
            id: post.id.0,
            user_id: post.user_id.0,
            user_name: post.user_name,
            title: post.title,
            content: Json(post.content),
            visibility: post.visibility.into(),
            group_ids: post.group_ids.into_iter().map(|g| g.0).collect(),
            status: post.status.into(),
            category: post.category.into(),
            label: post.label,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

/// One page of posts
#[derive(SimpleObject)]
pub struct PostPageObject {
    pub posts: Vec<PostObject>,

    /// Pass as `after` to fetch the next page; null on the last page
    pub next_cursor: Option<String>,
}

impl From<PostPage> for PostPageObject {
    fn from(page: PostPage) -> Self {
        Self {
            posts: page.posts.into_iter().map(PostObject::from).collect(),
            next_cursor: page.next_cursor.map(|c| c.0),
        }
    }
}

#[derive(SimpleObject)]
pub struct AuthorObject {
    pub user_id: String,
    pub username: String,
    pub display_name: String,

    /// Published public posts
    pub post_count: i64,
}

impl From<models::AuthorSummary> for AuthorObject {
    fn from(author: models::AuthorSummary) -> Self {
        Self {
            user_id: author.user_id.0,
            username: author.username,
            display_name: author.display_name,
            post_count: author.post_count,
        }
    }
}
