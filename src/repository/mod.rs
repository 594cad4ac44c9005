use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    error::AppError,
    forms::CleanPost,
    models::{Comment, Group, GroupForm, Post, PostView, User},
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// PostScope
///
/// Which posts a listing covers. Every scope is ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostScope {
    /// The index page: every post.
    All,
    /// Posts tagged to one group.
    Group(i64),
    /// Posts written by one author (profile page).
    Author(i64),
    /// Posts by every author the given user follows (the feed).
    FollowedBy(i64),
    /// Case-insensitive substring match on the text (admin search).
    Search(String),
}

/// NewUser
///
/// A validated registration, with the password already hashed.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: String,
}

/// Repository Trait
///
/// The persistence contract used by handlers and the auth extractor. The relational
/// invariants live behind it: unique usernames and slugs, unique non-self follows,
/// group deletion nulling post groups, and cascading comment deletion.
///
/// Constraint violations surface as `AppError::Conflict`; a missing referenced row
/// surfaces as `AppError::NotFound`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), AppError>;
    async fn set_role(&self, id: i64, role: &str) -> Result<bool, AppError>;

    // --- Groups ---
    async fn get_groups(&self) -> Result<Vec<Group>, AppError>;
    async fn get_group(&self, id: i64) -> Result<Option<Group>, AppError>;
    async fn get_group_by_slug(&self, slug: &str) -> Result<Option<Group>, AppError>;
    async fn create_group(&self, form: GroupForm) -> Result<Group, AppError>;
    async fn update_group(&self, slug: &str, form: GroupForm) -> Result<Option<Group>, AppError>;
    /// Posts of the deleted group keep existing with no group.
    async fn delete_group(&self, slug: &str) -> Result<bool, AppError>;

    // --- Posts ---
    async fn count_posts(&self, scope: &PostScope) -> Result<u64, AppError>;
    async fn get_posts(
        &self,
        scope: &PostScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostView>, AppError>;
    async fn get_post(&self, id: i64) -> Result<Option<PostView>, AppError>;
    async fn create_post(&self, author_id: i64, post: CleanPost) -> Result<Post, AppError>;
    /// Owner-only: returns `None` unless `author_id` wrote the post. A `None` image keeps the stored one unless `clear_image` is set.
    async fn update_post(
        &self,
        id: i64,
        author_id: i64,
        post: CleanPost,
    ) -> Result<Option<Post>, AppError>;
    async fn set_post_group(&self, id: i64, group_id: Option<i64>)
    -> Result<Option<Post>, AppError>;
    /// Deletes the post and its comments.
    async fn delete_post(&self, id: i64) -> Result<bool, AppError>;

    // --- Comments ---
    async fn get_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError>;
    async fn add_comment(
        &self,
        post_id: i64,
        author_id: i64,
        text: String,
    ) -> Result<Comment, AppError>;
    async fn count_comments(&self, search: Option<&str>) -> Result<u64, AppError>;
    async fn search_comments(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Comment>, AppError>;
    async fn delete_comment(&self, id: i64) -> Result<bool, AppError>;

    // --- Follows ---
    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, AppError>;
    /// Idempotent: returns true only when a new follow row was created.
    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, AppError>;
    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, AppError>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer held in the application state.
pub type RepositoryState = Arc<dyn Repository>;
