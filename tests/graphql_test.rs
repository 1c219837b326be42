use std::sync::Arc;

use tempfile::TempDir;

use zuckonit::auth::SqliteSessionProvider;
use zuckonit::config::FeedConfig;
use zuckonit::db;
use zuckonit::db::models::{NewPost, NewUser, PostCategory, PostStatus, User, Visibility};
use zuckonit::graphql::{build_schema, FeedSchema};
use zuckonit::store::{DocumentStore, SqliteStore};
use zuckonit::visibility::{Viewer, VisibilityResolver};

async fn setup() -> (TempDir, Arc<SqliteStore>, FeedSchema) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db_pool = db::create_pool(&db_path).expect("Failed to create test database");
    db::run_migrations(&db_pool).expect("Failed to run migrations");

    let store = Arc::new(SqliteStore::new(db_pool.clone()));
    let sessions = Arc::new(SqliteSessionProvider::new(db_pool, 24));
    let resolver = VisibilityResolver::new(store.clone(), sessions);
    let schema = build_schema(resolver, store.clone(), FeedConfig::default());

    (temp_dir, store, schema)
}

async fn author(store: &SqliteStore, username: &str) -> User {
    store
        .create_user(&NewUser {
            username: username.to_string(),
            display_name: username.to_uppercase(),
            password_hash: "x".to_string(),
        })
        .await
        .unwrap()
}

async fn publish(store: &SqliteStore, user: &User, title: &str, visibility: Visibility) {
    store
        .create_post(&NewPost {
            user_id: user.id.clone(),
            user_name: user.display_name.clone(),
            title: title.to_string(),
            content: serde_json::json!({ "type": "doc", "content": [] }),
            visibility,
            group_ids: Vec::new(),
            status: PostStatus::Published,
            category: PostCategory::Standard,
            label: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_visible_posts_pages_with_cursor() {
    let (_dir, store, schema) = setup().await;
    let alice = author(&store, "alice").await;
    for i in 0..3 {
        publish(&store, &alice, &format!("post {i}"), Visibility::Public).await;
    }

    let result = schema
        .execute("{ visiblePosts(first: 2) { posts { title content visibility } nextCursor } }")
        .await;
    assert!(
        result.errors.is_empty(),
        "Expected no errors, got: {:?}",
        result.errors
    );

    let data = result.data.into_json().unwrap();
    let page = &data["visiblePosts"];
    assert_eq!(page["posts"].as_array().unwrap().len(), 2);
    assert_eq!(page["posts"][0]["title"], "post 2");
    assert_eq!(page["posts"][0]["visibility"], "PUBLIC");
    assert_eq!(page["posts"][0]["content"]["type"], "doc");

    let cursor = page["nextCursor"].as_str().expect("More posts should follow");
    let query = format!(
        r#"{{ visiblePosts(first: 2, after: "{}") {{ posts {{ title }} nextCursor }} }}"#,
        cursor
    );
    let data = schema.execute(query).await.data.into_json().unwrap();
    assert_eq!(data["visiblePosts"]["posts"][0]["title"], "post 0");
    assert!(data["visiblePosts"]["nextCursor"].is_null());
}

#[tokio::test]
async fn test_private_post_is_null_for_other_viewers() {
    let (_dir, store, schema) = setup().await;
    let alice = author(&store, "alice").await;
    let bob = author(&store, "bob").await;
    publish(&store, &alice, "diary", Visibility::Private).await;

    let posts = store
        .list_posts(&zuckonit::store::PostQuery {
            filter: zuckonit::store::Filter::owner(&alice.id),
            limit: 1,
            after: None,
        })
        .await
        .unwrap();
    let query = format!(r#"{{ post(id: "{}") {{ title }} }}"#, posts[0].id);

    let request = async_graphql::Request::new(query.clone()).data(Viewer::User(bob.id.clone()));
    let data = schema.execute(request).await.data.into_json().unwrap();
    assert!(data["post"].is_null());

    let request = async_graphql::Request::new(query).data(Viewer::User(alice.id.clone()));
    let data = schema.execute(request).await.data.into_json().unwrap();
    assert_eq!(data["post"]["title"], "diary");
}

#[tokio::test]
async fn test_private_profile_tab_errors_for_strangers() {
    let (_dir, store, schema) = setup().await;
    let alice = author(&store, "alice").await;
    let bob = author(&store, "bob").await;

    let query = format!(
        r#"{{ ownerPosts(ownerId: "{}", view: PRIVATE) {{ posts {{ title }} }} }}"#,
        alice.id
    );
    let request = async_graphql::Request::new(query).data(Viewer::User(bob.id));
    let result = schema.execute(request).await;
    assert_eq!(result.errors.len(), 1);
}

#[tokio::test]
async fn test_popular_authors_counts_public_posts() {
    let (_dir, store, schema) = setup().await;
    let alice = author(&store, "alice").await;
    let bob = author(&store, "bob").await;
    publish(&store, &alice, "a1", Visibility::Public).await;
    publish(&store, &alice, "a2", Visibility::Public).await;
    publish(&store, &bob, "b1", Visibility::Public).await;
    publish(&store, &bob, "b2", Visibility::Private).await;

    let data = schema
        .execute("{ popularAuthors { username displayName postCount } }")
        .await
        .data
        .into_json()
        .unwrap();

    let authors = data["popularAuthors"].as_array().unwrap();
    assert_eq!(authors.len(), 2);
    assert_eq!(authors[0]["username"], "alice");
    assert_eq!(authors[0]["postCount"], 2);
    assert_eq!(authors[1]["displayName"], "BOB");
    assert_eq!(authors[1]["postCount"], 1);
}

#[tokio::test]
async fn test_empty_after_starts_from_the_top() {
    let (_dir, store, schema) = setup().await;
    let alice = author(&store, "alice").await;
    publish(&store, &alice, "only post", Visibility::Public).await;

    let result = schema
        .execute(r#"{ visiblePosts(after: "") { posts { title } nextCursor } }"#)
        .await;
    assert!(
        result.errors.is_empty(),
        "Expected no errors, got: {:?}",
        result.errors
    );

    let data = result.data.into_json().unwrap();
    assert_eq!(data["visiblePosts"]["posts"][0]["title"], "only post");
}
