use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Application Schemas (Mapped to Database) ---

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

/// User
///
/// A registered account from the `users` table. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    #[schema(ignore)]
    pub password_hash: String,
    // RBAC field: 'user' or 'admin'.
    pub role: String,
    #[ts(type = "string")]
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Author
///
/// Public view of a user as shown on profile pages and next to posts.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct Author {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for Author {
    fn from(user: &User) -> Self {
        Author {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

/// Group
///
/// A community posts can be tagged to. Managed by admins only.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Group {
    pub id: i64,
    pub title: String,
    // Unique at the storage layer.
    pub slug: String,
    pub description: String,
}

/// Post
///
/// Raw row of the `posts` table. `image` is an object key, empty when no image is attached.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Post {
    pub id: i64,
    pub text: String,
    #[ts(type = "string")]
    pub created: DateTime<Utc>,
    pub image: String,
    pub author_id: i64,
    // Nulled when the group is deleted.
    pub group_id: Option<i64>,
}

/// PostView
///
/// A post joined with its author's username and its group's slug/title. This is what
/// every listing and detail endpoint returns.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct PostView {
    pub id: i64,
    pub text: String,
    #[ts(type = "string")]
    pub created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Time-limited read URL for `image`, filled in by the handlers.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[sqlx(default)]
    pub image_url: Option<String>,
    pub author_id: i64,
    pub author: String,
    pub group_id: Option<i64>,
    pub group_slug: Option<String>,
    pub group_title: Option<String>,
}

impl PostView {
    /// Short representation used by admin listings and logs: the first 15 characters.
    pub fn short_text(&self) -> String {
        short_text(&self.text)
    }
}

pub fn short_text(text: &str) -> String {
    text.chars().take(15).collect()
}

/// Comment
///
/// A comment joined with its author's username.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author: String,
    pub text: String,
    #[ts(type = "string")]
    pub created: DateTime<Utc>,
}

/// Follow
///
/// One row of the follower relation: `user_id` follows `author_id`.
/// The pair is unique and the two ids always differ.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Follow {
    pub id: i64,
    pub user_id: i64,
    pub author_id: i64,
}

// --- Request Payloads (Input Schemas) ---

/// PostForm
///
/// Payload for creating (POST /create) and editing (PUT /posts/{id}/edit) a post.
/// `image` is the key returned by POST /upload/presigned; `clear_image` detaches the
/// current image on edit.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub group: Option<i64>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub clear_image: bool,
}

/// CommentForm
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

/// GroupForm
///
/// Admin payload for creating or replacing a group.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct GroupForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

/// AssignGroupRequest
///
/// Admin payload for re-assigning a post to a group; `null` clears it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignGroupRequest {
    pub group: Option<i64>,
}

/// SignupForm
///
/// Payload for POST /auth/signup. The password is hashed immediately and never stored or logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SignupForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// PasswordChangeForm
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PasswordChangeForm {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub new_password_confirm: String,
}

/// PresignedUrlRequest
///
/// Input payload for requesting a short-lived upload URL for a post image.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "cat.gif")]
    pub filename: String,
    /// The MIME type; only `image/*` is accepted.
    #[schema(example = "image/gif")]
    pub file_type: String,
}

// --- Response Schemas (Output) ---

/// PresignedUrlResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// Object key to pass as the post form's `image`.
    pub resource_key: String,
}

/// AuthToken
///
/// Returned by POST /auth/login. Sent back as `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct AuthToken {
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Page
///
/// One page of a paginated listing, mirroring what a page-number paginator exposes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default, PartialEq)]
#[ts(export)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number actually served (after clamping).
    pub number: u32,
    pub num_pages: u32,
    /// Total number of items across all pages.
    pub count: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

/// GroupPage
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct GroupPage {
    pub group: Group,
    pub page: Page<PostView>,
}

/// ProfilePage
///
/// Author profile: their posts, post count, and whether the requester follows them.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct ProfilePage {
    pub author: Author,
    pub posts_count: u64,
    /// False for anonymous requesters.
    pub following: bool,
    pub page: Page<PostView>,
}

/// PostDetail
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PostDetail {
    pub post: PostView,
    /// Number of posts written by this post's author.
    pub posts_count: u64,
    pub comments: Vec<Comment>,
}
