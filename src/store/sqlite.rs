// SQLite document store - every query the service runs lives here
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::HashMap;

use super::{DocumentStore, PostQuery, StoreError};
use crate::db::models::*;
use crate::state::DbPool;

const POST_COLUMNS: &str = "p.id, p.user_id, p.user_name, p.title, p.content, p.visibility, \
     p.status, p.category, p.label, p.created_at, p.updated_at";

pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    decode_timestamp(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp {raw}")))
}

fn enum_at<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, format!("unexpected value {raw}")))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Maps a `POST_COLUMNS` row; group ids are attached separately.
fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let content: String = row.get(4)?;
    let content = serde_json::from_str(&content).map_err(|e| conversion_error(4, e.to_string()))?;

    Ok(Post {
        id: PostId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        user_name: row.get(2)?,
        title: row.get(3)?,
        content,
        visibility: enum_at(row, 5, Visibility::from_db)?,
        group_ids: Vec::new(),
        status: enum_at(row, 6, PostStatus::from_db)?,
        category: enum_at(row, 7, PostCategory::from_db)?,
        label: row.get(8)?,
        created_at: timestamp_at(row, 9)?,
        updated_at: timestamp_at(row, 10)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        display_name: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: timestamp_at(row, 4)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: CommentId(row.get(0)?),
        post_id: PostId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        user_name: row.get(3)?,
        body: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: GroupId(row.get(0)?),
        name: row.get(1)?,
        admin_id: UserId(row.get(2)?),
        created_at: timestamp_at(row, 3)?,
    })
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<GroupMembership> {
    Ok(GroupMembership {
        group_id: GroupId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        joined_at: timestamp_at(row, 2)?,
    })
}

/// Fills in `group_ids` for every post in one round trip.
fn attach_groups(conn: &Connection, posts: &mut [Post]) -> Result<(), StoreError> {
    if posts.is_empty() {
        return Ok(());
    }

    let placeholders = vec!["?"; posts.len()].join(", ");
    let sql = format!(
        "SELECT post_id, group_id FROM post_groups WHERE post_id IN ({placeholders}) \
         ORDER BY post_id, group_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(posts.iter().map(|p| p.id.as_str())), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut by_post: HashMap<String, Vec<GroupId>> = HashMap::new();
    for row in rows {
        let (post_id, group_id) = row?;
        by_post.entry(post_id).or_default().push(GroupId(group_id));
    }

    for post in posts.iter_mut() {
        post.group_ids = by_post.remove(post.id.as_str()).unwrap_or_default();
    }
    Ok(())
}

fn load_post(conn: &Connection, id: &PostId) -> Result<Post, StoreError> {
    let post = conn
        .query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
            params![id.as_str()],
            post_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("post {id}")))?;

    let mut posts = [post];
    attach_groups(conn, &mut posts)?;
    let [post] = posts;
    Ok(post)
}

fn write_groups(conn: &Connection, post: &PostId, groups: &[GroupId]) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM post_groups WHERE post_id = ?1",
        params![post.as_str()],
    )?;
    for group in groups {
        conn.execute(
            "INSERT OR IGNORE INTO post_groups (post_id, group_id) VALUES (?1, ?2)",
            params![post.as_str(), group.as_str()],
        )?;
    }
    Ok(())
}

fn ensure_exists(conn: &Connection, table: &str, id: &str, what: &str) -> Result<(), StoreError> {
    let found: bool = conn.query_row(
        &format!("SELECT COUNT(*) > 0 FROM {table} WHERE id = ?1"),
        params![id],
        |row| row.get(0),
    )?;
    if found {
        Ok(())
    } else {
        Err(StoreError::NotFound(format!("{what} {id}")))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let conn = self.pool.get()?;
        let id = UserId::generate();
        let created_at = now();

        conn.execute(
            "INSERT INTO users (id, username, display_name, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                user.username,
                user.display_name,
                user.password_hash,
                encode_timestamp(&created_at)
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::Conflict(format!("username {} is taken", user.username))
            } else {
                e.into()
            }
        })?;

        Ok(User {
            id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            password_hash: user.password_hash.clone(),
            created_at,
        })
    }

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, username, display_name, password_hash, created_at FROM users WHERE id = ?1",
            params![id.as_str()],
            user_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                "SELECT id, username, display_name, password_hash, created_at
                 FROM users WHERE username = ?1",
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn list_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError> {
        let conn = self.pool.get()?;

        let mut sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE ");
        let mut bind: Vec<String> = Vec::new();
        query.filter.to_sql(&mut sql, &mut bind);

        if let Some(after) = &query.after {
            let created_at: String = conn
                .query_row(
                    "SELECT created_at FROM posts WHERE id = ?1",
                    params![after.as_str()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::InvalidCursor(after.to_string()))?;

            sql.push_str(" AND (p.created_at < ? OR (p.created_at = ? AND p.id < ?))");
            bind.push(created_at.clone());
            bind.push(created_at);
            bind.push(after.to_string());
        }

        sql.push_str(&format!(
            " ORDER BY p.created_at DESC, p.id DESC LIMIT {}",
            query.limit
        ));

        let mut stmt = conn.prepare(&sql)?;
        let mut posts = stmt
            .query_map(params_from_iter(bind.iter()), post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        attach_groups(&conn, &mut posts)?;
        Ok(posts)
    }

    async fn get_post(&self, id: &PostId) -> Result<Post, StoreError> {
        let conn = self.pool.get()?;
        load_post(&conn, id)
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        let mut conn = self.pool.get()?;
        let id = PostId::generate();
        let created_at = now();
        let stamp = encode_timestamp(&created_at);
        let content = serde_json::to_string(&post.content)?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO posts (id, user_id, user_name, title, content, visibility, status,
                                category, label, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id.as_str(),
                post.user_id.as_str(),
                post.user_name,
                post.title,
                content,
                post.visibility.as_db(),
                post.status.as_db(),
                post.category.as_db(),
                post.label,
                stamp
            ],
        )?;
        write_groups(&tx, &id, &post.group_ids)?;
        let created = load_post(&tx, &id)?;
        tx.commit()?;

        Ok(created)
    }

    async fn update_post(&self, id: &PostId, patch: &PostPatch) -> Result<Post, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let mut post = load_post(&tx, id)?;
        if let Some(title) = &patch.title {
            post.title = title.clone();
        }
        if let Some(content) = &patch.content {
            post.content = content.clone();
        }
        if let Some(visibility) = patch.visibility {
            post.visibility = visibility;
        }
        if let Some(status) = patch.status {
            post.status = status;
        }
        if let Some(category) = patch.category {
            post.category = category;
        }
        if let Some(label) = &patch.label {
            post.label = label.clone();
        }

        tx.execute(
            "UPDATE posts SET title = ?2, content = ?3, visibility = ?4, status = ?5,
                              category = ?6, label = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id.as_str(),
                post.title,
                serde_json::to_string(&post.content)?,
                post.visibility.as_db(),
                post.status.as_db(),
                post.category.as_db(),
                post.label,
                encode_timestamp(&now())
            ],
        )?;
        if let Some(groups) = &patch.group_ids {
            write_groups(&tx, id, groups)?;
        }

        let updated = load_post(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    }

    async fn delete_post(&self, id: &PostId) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id.as_str()])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("post {id}")));
        }
        Ok(())
    }

    async fn popular_authors(&self, limit: u32) -> Result<Vec<AuthorSummary>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username, u.display_name, COUNT(p.id) AS post_count
             FROM users u
             JOIN posts p ON p.user_id = u.id
             WHERE p.status = 'published' AND p.visibility = 'public'
             GROUP BY u.id
             ORDER BY post_count DESC, u.username ASC
             LIMIT ?1",
        )?;

        let authors = stmt
            .query_map(params![limit], |row| {
                Ok(AuthorSummary {
                    user_id: UserId(row.get(0)?),
                    username: row.get(1)?,
                    display_name: row.get(2)?,
                    post_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(authors)
    }

    async fn list_comments(&self, post_id: &PostId) -> Result<Vec<Comment>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, post_id, user_id, user_name, body, created_at
             FROM comments WHERE post_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let comments = stmt
            .query_map(params![post_id.as_str()], comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    async fn get_comment(&self, id: &CommentId) -> Result<Comment, StoreError> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, post_id, user_id, user_name, body, created_at FROM comments WHERE id = ?1",
            params![id.as_str()],
            comment_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("comment {id}")))
    }

    async fn create_comment(&self, comment: &NewComment) -> Result<Comment, StoreError> {
        let conn = self.pool.get()?;
        ensure_exists(&conn, "posts", comment.post_id.as_str(), "post")?;

        let id = CommentId::generate();
        let created_at = now();
        conn.execute(
            "INSERT INTO comments (id, post_id, user_id, user_name, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_str(),
                comment.post_id.as_str(),
                comment.user_id.as_str(),
                comment.user_name,
                comment.body,
                encode_timestamp(&created_at)
            ],
        )?;

        Ok(Comment {
            id,
            post_id: comment.post_id.clone(),
            user_id: comment.user_id.clone(),
            user_name: comment.user_name.clone(),
            body: comment.body.clone(),
            created_at,
        })
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![id.as_str()])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("comment {id}")));
        }
        Ok(())
    }

    async fn create_group(&self, name: &str, admin: &UserId) -> Result<Group, StoreError> {
        let mut conn = self.pool.get()?;
        let id = GroupId::generate();
        let created_at = now();
        let stamp = encode_timestamp(&created_at);

        let tx = conn.transaction()?;
        ensure_exists(&tx, "users", admin.as_str(), "user")?;
        tx.execute(
            "INSERT INTO user_groups (id, name, admin_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.as_str(), name, admin.as_str(), stamp],
        )?;
        tx.execute(
            "INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![id.as_str(), admin.as_str(), stamp],
        )?;
        tx.commit()?;

        Ok(Group {
            id,
            name: name.to_string(),
            admin_id: admin.clone(),
            created_at,
        })
    }

    async fn get_group(&self, id: &GroupId) -> Result<Group, StoreError> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, name, admin_id, created_at FROM user_groups WHERE id = ?1",
            params![id.as_str()],
            group_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("group {id}")))
    }

    async fn add_member(
        &self,
        group: &GroupId,
        user: &UserId,
    ) -> Result<GroupMembership, StoreError> {
        let conn = self.pool.get()?;
        ensure_exists(&conn, "user_groups", group.as_str(), "group")?;
        ensure_exists(&conn, "users", user.as_str(), "user")?;

        let joined_at = now();
        conn.execute(
            "INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![group.as_str(), user.as_str(), encode_timestamp(&joined_at)],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::Conflict(format!("{user} is already a member of {group}"))
            } else {
                e.into()
            }
        })?;

        Ok(GroupMembership {
            group_id: group.clone(),
            user_id: user.clone(),
            joined_at,
        })
    }

    async fn remove_member(&self, group: &GroupId, user: &UserId) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group.as_str(), user.as_str()],
        )?;
        Ok(rows > 0)
    }

    async fn list_members(&self, group: &GroupId) -> Result<Vec<GroupMembership>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT group_id, user_id, joined_at FROM group_members
             WHERE group_id = ?1 ORDER BY joined_at ASC, user_id ASC",
        )?;

        let members = stmt
            .query_map(params![group.as_str()], membership_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    async fn groups_for_user(&self, user: &UserId) -> Result<Vec<Group>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT g.id, g.name, g.admin_id, g.created_at
             FROM user_groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.user_id = ?1
             ORDER BY g.name ASC",
        )?;

        let groups = stmt
            .query_map(params![user.as_str()], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    async fn add_bookmark(&self, user: &UserId, post: &PostId) -> Result<Bookmark, StoreError> {
        let conn = self.pool.get()?;
        ensure_exists(&conn, "posts", post.as_str(), "post")?;

        conn.execute(
            "INSERT OR IGNORE INTO bookmarks (user_id, post_id, created_at) VALUES (?1, ?2, ?3)",
            params![user.as_str(), post.as_str(), encode_timestamp(&now())],
        )?;

        let created_at = conn.query_row(
            "SELECT created_at FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
            params![user.as_str(), post.as_str()],
            |row| timestamp_at(row, 0),
        )?;

        Ok(Bookmark {
            user_id: user.clone(),
            post_id: post.clone(),
            created_at,
        })
    }

    async fn remove_bookmark(&self, user: &UserId, post: &PostId) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
            params![user.as_str(), post.as_str()],
        )?;
        Ok(rows > 0)
    }

    async fn bookmarked_posts(&self, user: &UserId) -> Result<Vec<Post>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM bookmarks b
             JOIN posts p ON p.id = b.post_id
             WHERE b.user_id = ?1
             ORDER BY b.created_at DESC, p.id DESC"
        ))?;

        let mut posts = stmt
            .query_map(params![user.as_str()], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        attach_groups(&conn, &mut posts)?;
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::{Field, Filter};

    fn test_store() -> SqliteStore {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        SqliteStore::new(pool)
    }

    async fn user(store: &SqliteStore, name: &str) -> User {
        store
            .create_user(&NewUser {
                username: name.to_string(),
                display_name: name.to_uppercase(),
                password_hash: "x".to_string(),
            })
            .await
            .unwrap()
    }

    fn draft(owner: &User, title: &str) -> NewPost {
        NewPost {
            user_id: owner.id.clone(),
            user_name: owner.display_name.clone(),
            title: title.to_string(),
            content: serde_json::json!({"type": "doc", "content": []}),
            visibility: Visibility::Groups,
            group_ids: vec![GroupId::new("g1"), GroupId::new("g2"), GroupId::new("g1")],
            status: PostStatus::Draft,
            category: PostCategory::Blog,
            label: Some("travel".to_string()),
        }
    }

    #[tokio::test]
    async fn created_post_reads_back_with_groups() {
        let store = test_store();
        let alice = user(&store, "alice").await;

        let created = store.create_post(&draft(&alice, "Lisbon")).await.unwrap();
        let fetched = store.get_post(&created.id).await.unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.group_ids, vec![GroupId::new("g1"), GroupId::new("g2")]);
        assert_eq!(fetched.content["type"], "doc");
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let store = test_store();
        user(&store, "alice").await;

        let err = store
            .create_user(&NewUser {
                username: "alice".into(),
                display_name: "Other".into(),
                password_hash: "y".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_filters_on_group_overlap() {
        let store = test_store();
        let alice = user(&store, "alice").await;
        let shared = store.create_post(&draft(&alice, "shared")).await.unwrap();
        let mut other = draft(&alice, "other");
        other.group_ids = vec![GroupId::new("g9")];
        store.create_post(&other).await.unwrap();

        let posts = store
            .list_posts(&PostQuery {
                filter: Filter::In(Field::GroupIds, vec!["g2".into(), "g3".into()]),
                limit: 10,
                after: None,
            })
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, shared.id);
    }

    #[tokio::test]
    async fn unknown_cursor_is_rejected() {
        let store = test_store();
        let err = store
            .list_posts(&PostQuery {
                filter: Filter::All,
                limit: 10,
                after: Some(PostId::new("missing")),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidCursor(_)));
    }

    #[tokio::test]
    async fn patch_updates_only_given_fields() {
        let store = test_store();
        let alice = user(&store, "alice").await;
        let post = store.create_post(&draft(&alice, "before")).await.unwrap();

        let updated = store
            .update_post(
                &post.id,
                &PostPatch {
                    status: Some(PostStatus::Published),
                    group_ids: Some(vec![]),
                    label: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "before");
        assert_eq!(updated.status, PostStatus::Published);
        assert!(updated.group_ids.is_empty());
        assert_eq!(updated.label, None);
        assert_eq!(updated.created_at, post.created_at);
    }

    #[tokio::test]
    async fn deleting_a_post_removes_comments_and_bookmarks() {
        let store = test_store();
        let alice = user(&store, "alice").await;
        let post = store.create_post(&draft(&alice, "doomed")).await.unwrap();
        store
            .create_comment(&NewComment {
                post_id: post.id.clone(),
                user_id: alice.id.clone(),
                user_name: alice.display_name.clone(),
                body: "first".into(),
            })
            .await
            .unwrap();
        store.add_bookmark(&alice.id, &post.id).await.unwrap();

        store.delete_post(&post.id).await.unwrap();

        assert!(store.list_comments(&post.id).await.unwrap().is_empty());
        assert!(store.bookmarked_posts(&alice.id).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_post(&post.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn group_admin_is_first_member_and_duplicates_conflict() {
        let store = test_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;

        let group = store.create_group("climbers", &alice.id).await.unwrap();
        store.add_member(&group.id, &bob.id).await.unwrap();

        let members = store.list_members(&group.id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().any(|m| m.user_id == alice.id));

        let again = store.add_member(&group.id, &bob.id).await.unwrap_err();
        assert!(matches!(again, StoreError::Conflict(_)));

        assert!(store.remove_member(&group.id, &bob.id).await.unwrap());
        assert!(!store.remove_member(&group.id, &bob.id).await.unwrap());
        assert!(store.groups_for_user(&bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bookmarking_is_idempotent() {
        let store = test_store();
        let alice = user(&store, "alice").await;
        let post = store.create_post(&draft(&alice, "keep")).await.unwrap();

        let first = store.add_bookmark(&alice.id, &post.id).await.unwrap();
        let second = store.add_bookmark(&alice.id, &post.id).await.unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.bookmarked_posts(&alice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn popular_authors_count_only_published_public_posts() {
        let store = test_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;

        for (owner, visibility, status) in [
            (&alice, Visibility::Public, PostStatus::Published),
            (&bob, Visibility::Public, PostStatus::Published),
            (&bob, Visibility::Public, PostStatus::Published),
            (&alice, Visibility::Private, PostStatus::Published),
            (&alice, Visibility::Public, PostStatus::Draft),
        ] {
            let mut post = draft(owner, "p");
            post.visibility = visibility;
            post.status = status;
            store.create_post(&post).await.unwrap();
        }

        let authors = store.popular_authors(5).await.unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[0].username, "bob");
        assert_eq!(authors[0].post_count, 2);
        assert_eq!(authors[1].post_count, 1);
    }
}
