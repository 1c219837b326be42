// Which posts a viewer may read
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::session::{Identity, SessionProvider};
use crate::db::models::{GroupId, Post, PostCategory, PostId, PostStatus, UserId, Visibility};
use crate::error::{AppError, AppResult};
use crate::store::{DocumentStore, Field, Filter, PostQuery};

/// The reader a query is evaluated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(UserId),
}

impl Viewer {
    pub fn from_identity(identity: Option<&Identity>) -> Self {
        match identity {
            Some(identity) => Viewer::User(identity.user_id.clone()),
            None => Viewer::Anonymous,
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(id),
        }
    }

    pub fn owns(&self, post: &Post) -> bool {
        self.user_id() == Some(&post.user_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccessRule {
    PublicPublished,
    /// Published group posts sharing one of these groups.
    SharedWithGroups(Vec<GroupId>),
    OwnedBy(UserId),
}

impl AccessRule {
    pub fn filter(&self) -> Filter {
        match self {
            AccessRule::PublicPublished => Filter::status(PostStatus::Published)
                .and(Filter::visibility(Visibility::Public)),
            AccessRule::SharedWithGroups(groups) => Filter::status(PostStatus::Published)
                .and(Filter::visibility(Visibility::Groups))
                .and(Filter::In(
                    Field::GroupIds,
                    groups.iter().map(|g| g.0.clone()).collect(),
                )),
            AccessRule::OwnedBy(user) => Filter::owner(user),
        }
    }

    pub fn permits(&self, post: &Post) -> bool {
        match self {
            AccessRule::PublicPublished => {
                post.is_published() && post.visibility == Visibility::Public
            }
            AccessRule::SharedWithGroups(groups) => {
                post.is_published()
                    && post.visibility == Visibility::Groups
                    && post.group_ids.iter().any(|g| groups.contains(g))
            }
            AccessRule::OwnedBy(user) => &post.user_id == user,
        }
    }
}

/// Disjunction of the rules that apply to one viewer.
///
/// Anonymous viewers only get the public rule. The group rule depends on a
/// membership lookup; when that lookup fails it is dropped for the request
/// and the remaining rules still apply. Each rule has a store [`Filter`]
/// form for listing and an in-memory form for single posts, and the two
/// must agree.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    pub fn filter(&self) -> Filter {
        Filter::Or(self.rules.iter().map(AccessRule::filter).collect())
    }

    pub fn permits(&self, post: &Post) -> bool {
        self.rules.iter().any(|rule| rule.permits(post))
    }

    fn shared_groups(&self) -> Option<&[GroupId]> {
        self.rules.iter().find_map(|rule| match rule {
            AccessRule::SharedWithGroups(groups) => Some(groups.as_slice()),
            _ => None,
        })
    }
}

/// Profile tabs: each is a single visibility class of one owner's posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, async_graphql::Enum)]
#[serde(rename_all = "lowercase")]
pub enum OwnerView {
    /// Public posts of the standard category.
    Public,
    Private,
    Groups,
    /// Blog-category posts of any visibility.
    Blog,
}

impl OwnerView {
    fn filter(&self, owner: &UserId) -> Filter {
        let base = Filter::owner(owner);
        match self {
            OwnerView::Public => base
                .and(Filter::visibility(Visibility::Public))
                .and(Filter::category(PostCategory::Standard)),
            OwnerView::Private => base.and(Filter::visibility(Visibility::Private)),
            OwnerView::Groups => base.and(Filter::visibility(Visibility::Groups)),
            OwnerView::Blog => base.and(Filter::category(PostCategory::Blog)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub page_size: u32,
    /// Id of the last post of the previous page.
    pub cursor: Option<PostId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    /// Present only when more posts follow.
    pub next_cursor: Option<PostId>,
}

/// Builds and runs access-scoped post queries.
#[derive(Clone)]
pub struct VisibilityResolver {
    store: Arc<dyn DocumentStore>,
    sessions: Arc<dyn SessionProvider>,
}

impl VisibilityResolver {
    pub fn new(store: Arc<dyn DocumentStore>, sessions: Arc<dyn SessionProvider>) -> Self {
        Self { store, sessions }
    }

    pub async fn access_policy(&self, viewer: &Viewer) -> AccessPolicy {
        let user = match viewer {
            Viewer::Anonymous => {
                return AccessPolicy {
                    rules: vec![AccessRule::PublicPublished],
                }
            }
            Viewer::User(user) => user,
        };

        let mut rules = vec![AccessRule::PublicPublished];
        match self.sessions.group_memberships(user).await {
            Ok(groups) if !groups.is_empty() => rules.push(AccessRule::SharedWithGroups(groups)),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    user = %user,
                    error = %e,
                    "Membership lookup failed; group-shared posts omitted for this request"
                );
            }
        }
        rules.push(AccessRule::OwnedBy(user.clone()));

        AccessPolicy { rules }
    }

    /// Every post the viewer may read, newest first.
    pub async fn list_visible_posts(
        &self,
        viewer: &Viewer,
        page: &PageRequest,
    ) -> AppResult<PostPage> {
        check_page_size(page)?;
        let policy = self.access_policy(viewer).await;
        self.fetch_page(policy.filter(), page).await
    }

    /// One owner's posts of a single class, as shown on their profile.
    ///
    /// The owner sees drafts too. Anyone else only gets published posts
    /// they could read anyway, and may not open the private tab.
    pub async fn list_owner_posts(
        &self,
        viewer: &Viewer,
        owner: &UserId,
        view: OwnerView,
        page: &PageRequest,
    ) -> AppResult<PostPage> {
        check_page_size(page)?;
        let class = view.filter(owner);

        if viewer.user_id() == Some(owner) {
            return self.fetch_page(class, page).await;
        }

        let published = class.and(Filter::status(PostStatus::Published));
        let filter = match (viewer, view) {
            (Viewer::Anonymous, OwnerView::Private | OwnerView::Groups) => {
                return Err(AppError::Unauthorized)
            }
            (_, OwnerView::Private) => return Err(AppError::Forbidden),
            (_, OwnerView::Groups) => {
                let policy = self.access_policy(viewer).await;
                let shared = policy
                    .shared_groups()
                    .map(|groups| groups.iter().map(|g| g.0.clone()).collect())
                    .unwrap_or_default();
                published.and(Filter::In(Field::GroupIds, shared))
            }
            (_, OwnerView::Public | OwnerView::Blog) => {
                published.and(Filter::visibility(Visibility::Public))
            }
        };

        self.fetch_page(filter, page).await
    }

    /// A single post, reported as missing when the viewer may not read it.
    pub async fn get_post(&self, viewer: &Viewer, id: &PostId) -> AppResult<Post> {
        let post = self.store.get_post(id).await?;
        if viewer.owns(&post) {
            return Ok(post);
        }

        let policy = self.access_policy(viewer).await;
        if policy.permits(&post) {
            Ok(post)
        } else {
            Err(AppError::NotFound)
        }
    }

    /// Drops the posts the viewer may no longer read, keeping order.
    pub async fn retain_readable(&self, viewer: &Viewer, posts: Vec<Post>) -> Vec<Post> {
        let policy = self.access_policy(viewer).await;
        posts.into_iter().filter(|p| policy.permits(p)).collect()
    }

    async fn fetch_page(&self, filter: Filter, page: &PageRequest) -> AppResult<PostPage> {
        let page_size = page.page_size as usize;

        // One extra row tells us whether another page exists.
        let mut posts = self
            .store
            .list_posts(&PostQuery {
                filter,
                limit: page.page_size.saturating_add(1),
                after: page.cursor.clone(),
            })
            .await?;

        let next_cursor = if posts.len() > page_size {
            posts.truncate(page_size);
            posts.last().map(|p| p.id.clone())
        } else {
            None
        };

        Ok(PostPage { posts, next_cursor })
    }
}

fn check_page_size(page: &PageRequest) -> AppResult<()> {
    if page.page_size == 0 {
        return Err(AppError::BadRequest("Page size must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use chrono::Utc;

    fn post(owner: &str, visibility: Visibility, status: PostStatus, groups: &[&str]) -> Post {
        Post {
            id: PostId::generate(),
            user_id: UserId::new(owner),
            user_name: owner.to_string(),
            title: "t".into(),
            content: serde_json::Value::Null,
            visibility,
            group_ids: groups.iter().map(|g| GroupId::new(*g)).collect(),
            status,
            category: PostCategory::Standard,
            label: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct Memberships(Result<Vec<GroupId>, ()>);

    #[async_trait]
    impl SessionProvider for Memberships {
        async fn start_session(&self, _: &UserId) -> Result<String, StoreError> {
            unimplemented!()
        }

        async fn end_session(&self, _: &str) -> Result<(), StoreError> {
            unimplemented!()
        }

        async fn current_identity(&self, _: &str) -> Result<Option<Identity>, StoreError> {
            Ok(None)
        }

        async fn group_memberships(&self, _: &UserId) -> Result<Vec<GroupId>, StoreError> {
            self.0
                .clone()
                .map_err(|_| StoreError::Unavailable("membership service down".into()))
        }
    }

    fn resolver(memberships: Result<Vec<GroupId>, ()>) -> VisibilityResolver {
        let pool = crate::db::memory_pool().unwrap();
        VisibilityResolver::new(
            Arc::new(crate::store::SqliteStore::new(pool)),
            Arc::new(Memberships(memberships)),
        )
    }

    #[test]
    fn public_rule_ignores_drafts() {
        let rule = AccessRule::PublicPublished;
        assert!(rule.permits(&post("a", Visibility::Public, PostStatus::Published, &[])));
        assert!(!rule.permits(&post("a", Visibility::Public, PostStatus::Draft, &[])));
        assert!(!rule.permits(&post("a", Visibility::Private, PostStatus::Published, &[])));
    }

    #[test]
    fn group_rule_needs_overlap_and_publication() {
        let rule = AccessRule::SharedWithGroups(vec![GroupId::new("g1")]);
        assert!(rule.permits(&post("a", Visibility::Groups, PostStatus::Published, &["g2", "g1"])));
        assert!(!rule.permits(&post("a", Visibility::Groups, PostStatus::Published, &["g2"])));
        assert!(!rule.permits(&post("a", Visibility::Groups, PostStatus::Published, &[])));
        assert!(!rule.permits(&post("a", Visibility::Groups, PostStatus::Draft, &["g1"])));
        // Group ids only count on group-restricted posts.
        assert!(!rule.permits(&post("a", Visibility::Private, PostStatus::Published, &["g1"])));
    }

    #[test]
    fn owner_rule_covers_drafts_and_private_posts() {
        let rule = AccessRule::OwnedBy(UserId::new("a"));
        assert!(rule.permits(&post("a", Visibility::Private, PostStatus::Draft, &[])));
        assert!(!rule.permits(&post("b", Visibility::Private, PostStatus::Draft, &[])));
    }

    #[tokio::test]
    async fn anonymous_policy_is_public_only() {
        let policy = resolver(Ok(vec![GroupId::new("g1")]))
            .access_policy(&Viewer::Anonymous)
            .await;
        assert_eq!(policy.rules(), &[AccessRule::PublicPublished]);
    }

    #[tokio::test]
    async fn member_policy_has_all_three_rules() {
        let policy = resolver(Ok(vec![GroupId::new("g1")]))
            .access_policy(&Viewer::User(UserId::new("u1")))
            .await;
        assert_eq!(
            policy.rules(),
            &[
                AccessRule::PublicPublished,
                AccessRule::SharedWithGroups(vec![GroupId::new("g1")]),
                AccessRule::OwnedBy(UserId::new("u1")),
            ]
        );
    }

    #[tokio::test]
    async fn viewer_without_groups_skips_group_rule() {
        let policy = resolver(Ok(vec![]))
            .access_policy(&Viewer::User(UserId::new("u1")))
            .await;
        assert_eq!(policy.rules().len(), 2);
        assert!(policy.shared_groups().is_none());
    }

    #[tokio::test]
    async fn failed_membership_lookup_drops_only_group_rule() {
        let policy = resolver(Err(()))
            .access_policy(&Viewer::User(UserId::new("u1")))
            .await;
        assert_eq!(
            policy.rules(),
            &[
                AccessRule::PublicPublished,
                AccessRule::OwnedBy(UserId::new("u1")),
            ]
        );
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let err = resolver(Ok(vec![]))
            .list_visible_posts(&Viewer::Anonymous, &PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn private_profile_tab_is_closed_to_others() {
        let resolver = resolver(Ok(vec![]));
        let page = PageRequest {
            page_size: 5,
            cursor: None,
        };
        let owner = UserId::new("owner");

        let anonymous = resolver
            .list_owner_posts(&Viewer::Anonymous, &owner, OwnerView::Private, &page)
            .await
            .unwrap_err();
        assert!(matches!(anonymous, AppError::Unauthorized));

        let stranger = resolver
            .list_owner_posts(&Viewer::User(UserId::new("x")), &owner, OwnerView::Private, &page)
            .await
            .unwrap_err();
        assert!(matches!(stranger, AppError::Forbidden));
    }
}
