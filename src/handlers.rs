use crate::{
    AppState,
    auth::{self, AuthUser, MaybeAuthUser},
    cache::IndexCacheState,
    error::{AppError, FieldErrors},
    forms::{self, CleanPost},
    models::{
        AssignGroupRequest, AuthToken, Author, Comment, CommentForm, Group, GroupForm, GroupPage,
        LoginRequest, Page, PasswordChangeForm, Post, PostDetail, PostForm, PostView,
        PresignedUrlRequest, PresignedUrlResponse, ProfilePage, ROLE_USER, SignupForm, User,
        short_text,
    },
    pagination::{POSTS_PER_PAGE, PageQuery, PageWindow, Paginator},
    password,
    repository::{NewUser, PostScope, RepositoryState},
    storage::{self, StorageState},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

// --- Filter Structs ---

/// AdminSearch
///
/// Query parameters of the admin listings: a text search and a page number.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminSearch {
    /// Case-insensitive substring of the text.
    pub search: Option<String>,
    pub page: Option<String>,
}

impl AdminSearch {
    fn term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// --- Shared helpers ---

/// Fills `image_url` for every post carrying an image. A failed signature leaves the
/// URL out instead of failing the whole page.
async fn attach_image_urls(storage: &StorageState, posts: &mut [PostView]) {
    for post in posts.iter_mut() {
        let Some(key) = post.image.as_deref() else {
            continue;
        };
        match storage.get_presigned_download_url(key).await {
            Ok(url) => post.image_url = Some(url),
            Err(e) => tracing::warn!(post_id = post.id, "could not sign image url: {}", e),
        }
    }
}

/// Counts the scope and clamps the requested page.
async fn page_window(
    repo: &RepositoryState,
    scope: &PostScope,
    page: Option<&str>,
) -> Result<(PageWindow, u64), AppError> {
    let count = repo.count_posts(scope).await?;
    Ok((Paginator::new(count, POSTS_PER_PAGE).window(page), count))
}

async fn fetch_page(
    state: &AppState,
    scope: &PostScope,
    window: PageWindow,
    count: u64,
) -> Result<Page<PostView>, AppError> {
    let mut posts = state
        .repo
        .get_posts(scope, window.limit, window.offset)
        .await?;
    attach_image_urls(&state.storage, &mut posts).await;
    Ok(window.into_page(posts, count))
}

async fn post_page(
    state: &AppState,
    scope: PostScope,
    page: Option<&str>,
) -> Result<Page<PostView>, AppError> {
    let (window, count) = page_window(&state.repo, &scope, page).await?;
    fetch_page(state, &scope, window, count).await
}

async fn post_detail_of(state: &AppState, post_id: i64) -> Result<PostDetail, AppError> {
    let mut post = state
        .repo
        .get_post(post_id)
        .await?
        .ok_or(AppError::NotFound)?;
    attach_image_urls(&state.storage, std::slice::from_mut(&mut post)).await;
    let posts_count = state
        .repo
        .count_posts(&PostScope::Author(post.author_id))
        .await?;
    let comments = state.repo.get_comments(post_id).await?;
    Ok(PostDetail {
        post,
        posts_count,
        comments,
    })
}

/// A post form may only reference an existing group.
async fn ensure_group_exists(repo: &RepositoryState, group: Option<i64>) -> Result<(), AppError> {
    if let Some(group_id) = group {
        if repo.get_group(group_id).await?.is_none() {
            let mut errors = FieldErrors::new();
            errors.add(
                "group",
                "Select a valid choice. That choice is not one of the available choices.",
            );
            return Err(AppError::Validation(errors));
        }
    }
    Ok(())
}

async fn clean_post_form(repo: &RepositoryState, form: PostForm) -> Result<CleanPost, AppError> {
    let post = forms::validate_post(form)?;
    ensure_group_exists(repo, post.group).await?;
    Ok(post)
}

async fn author_by_username(repo: &RepositoryState, username: &str) -> Result<User, AppError> {
    repo.get_user_by_username(username)
        .await?
        .ok_or(AppError::NotFound)
}

// --- Post pages (public) ---

/// index
///
/// [Public Route] All posts, newest first, one page at a time. Pages are served from
/// the index cache while fresh, keyed by the page number after clamping.
#[utoipa::path(
    get,
    path = "/",
    params(PageQuery),
    responses((status = 200, description = "Latest posts", body = Page<PostView>))
)]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<PostView>>, AppError> {
    let (window, count) = page_window(&state.repo, &PostScope::All, query.page.as_deref()).await?;
    if let Some(page) = state.index_cache.get(window.number).await {
        return Ok(Json(page));
    }

    let page = fetch_page(&state, &PostScope::All, window, count).await?;
    state.index_cache.put(window.number, page.clone()).await;
    Ok(Json(page))
}

/// get_groups
///
/// [Public Route] Every group, to populate the group choice of the post form.
#[utoipa::path(
    get,
    path = "/groups",
    responses((status = 200, description = "Groups", body = [Group]))
)]
pub async fn get_groups(State(state): State<AppState>) -> Result<Json<Vec<Group>>, AppError> {
    Ok(Json(state.repo.get_groups().await?))
}

/// group_posts
///
/// [Public Route] A group and a page of the posts tagged to it.
#[utoipa::path(
    get,
    path = "/group/{slug}",
    params(("slug" = String, Path, description = "Group slug"), PageQuery),
    responses(
        (status = 200, description = "Group posts", body = GroupPage),
        (status = 404, description = "No such group")
    )
)]
pub async fn group_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<GroupPage>, AppError> {
    let group = state
        .repo
        .get_group_by_slug(&slug)
        .await?
        .ok_or(AppError::NotFound)?;
    let page = post_page(&state, PostScope::Group(group.id), query.page.as_deref()).await?;
    Ok(Json(GroupPage { group, page }))
}

/// profile
///
/// [Public Route] An author's posts and post count. `following` is only ever true for
/// a logged-in visitor who follows this author.
#[utoipa::path(
    get,
    path = "/profile/{username}",
    params(("username" = String, Path, description = "Author username"), PageQuery),
    responses(
        (status = 200, description = "Profile", body = ProfilePage),
        (status = 404, description = "No such user")
    )
)]
pub async fn profile(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ProfilePage>, AppError> {
    let author = author_by_username(&state.repo, &username).await?;

    let following = match viewer {
        Some(viewer) => state.repo.is_following(viewer.id, author.id).await?,
        None => false,
    };

    let page = post_page(&state, PostScope::Author(author.id), query.page.as_deref()).await?;

    Ok(Json(ProfilePage {
        author: Author::from(&author),
        posts_count: page.count,
        following,
        page,
    }))
}

/// post_detail
///
/// [Public Route] One post with its comments and the author's post count.
#[utoipa::path(
    get,
    path = "/posts/{post_id}",
    params(("post_id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post", body = PostDetail),
        (status = 404, description = "No such post")
    )
)]
pub async fn post_detail(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Json<PostDetail>, AppError> {
    Ok(Json(post_detail_of(&state, post_id).await?))
}

// --- Post actions (login required) ---

/// post_create
///
/// [Authenticated Route] Publishes a post authored by the requester. The `Location`
/// header points at the author's profile, where the new post is listed first.
#[utoipa::path(
    post,
    path = "/create",
    request_body = PostForm,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 401, description = "Login required"),
        (status = 422, description = "Invalid form")
    )
)]
pub async fn post_create(
    user: AuthUser,
    State(state): State<AppState>,
    Json(form): Json<PostForm>,
) -> Result<impl IntoResponse, AppError> {
    let post = clean_post_form(&state.repo, form).await?;
    let created = state.repo.create_post(user.id, post).await?;

    tracing::info!(
        post_id = created.id,
        author = %user.username,
        text = %short_text(&created.text),
        "post created"
    );

    let location = format!("/profile/{}", user.username);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(created),
    ))
}

/// post_edit
///
/// [Authenticated Route] Author-only edit. Anyone else gets 403 and the post is left
/// untouched. Omitting `image` keeps the current one, `clear_image` removes it.
#[utoipa::path(
    put,
    path = "/posts/{post_id}/edit",
    params(("post_id" = i64, Path, description = "Post ID")),
    request_body = PostForm,
    responses(
        (status = 200, description = "Updated", body = PostDetail),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such post"),
        (status = 422, description = "Invalid form")
    )
)]
pub async fn post_edit(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Json(form): Json<PostForm>,
) -> Result<Json<PostDetail>, AppError> {
    let existing = state
        .repo
        .get_post(post_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if existing.author_id != user.id {
        return Err(AppError::Forbidden);
    }

    let post = clean_post_form(&state.repo, form).await?;
    // The repository re-checks ownership in the same statement as the write.
    state
        .repo
        .update_post(post_id, user.id, post)
        .await?
        .ok_or(AppError::Forbidden)?;

    let detail = post_detail_of(&state, post_id).await?;
    tracing::info!(post_id, text = %detail.post.short_text(), "post edited");
    Ok(Json(detail))
}

/// add_comment
///
/// [Authenticated Route] Comments on an existing post as the requester.
#[utoipa::path(
    post,
    path = "/posts/{post_id}/comment",
    params(("post_id" = i64, Path, description = "Post ID")),
    request_body = CommentForm,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 404, description = "No such post"),
        (status = 422, description = "Invalid form")
    )
)]
pub async fn add_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Json(form): Json<CommentForm>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    if state.repo.get_post(post_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let text = forms::validate_comment(form)?;
    let comment = state.repo.add_comment(post_id, user.id, text).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// follow_index
///
/// [Authenticated Route] The feed: posts by every author the requester follows.
#[utoipa::path(
    get,
    path = "/follow",
    params(PageQuery),
    responses((status = 200, description = "Feed", body = Page<PostView>))
)]
pub async fn follow_index(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<PostView>>, AppError> {
    let page = post_page(&state, PostScope::FollowedBy(user.id), query.page.as_deref()).await?;
    Ok(Json(page))
}

/// profile_follow
///
/// [Authenticated Route] Follows an author. Following yourself, or someone you
/// already follow, is a silent no-op.
#[utoipa::path(
    post,
    path = "/profile/{username}/follow",
    params(("username" = String, Path, description = "Author username")),
    responses(
        (status = 204, description = "Following"),
        (status = 404, description = "No such user")
    )
)]
pub async fn profile_follow(
    user: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, AppError> {
    let author = author_by_username(&state.repo, &username).await?;
    if author.id != user.id && state.repo.follow(user.id, author.id).await? {
        tracing::debug!(follower = %user.username, author = %author.username, "follow created");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// profile_unfollow
///
/// [Authenticated Route] Stops following an author. Idempotent.
#[utoipa::path(
    post,
    path = "/profile/{username}/unfollow",
    params(("username" = String, Path, description = "Author username")),
    responses(
        (status = 204, description = "Not following"),
        (status = 404, description = "No such user")
    )
)]
pub async fn profile_unfollow(
    user: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, AppError> {
    let author = author_by_username(&state.repo, &username).await?;
    if author.id != user.id {
        state.repo.unfollow(user.id, author.id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Accounts ---

/// signup
///
/// [Public Route] Registers a new account with role `user`.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupForm,
    responses(
        (status = 201, description = "Registered", body = User),
        (status = 409, description = "Username taken"),
        (status = 422, description = "Invalid form")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(form): Json<SignupForm>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let form = forms::validate_signup(form)?;
    let password_hash = password::hash_password(&form.password)?;

    let user = state
        .repo
        .create_user(NewUser {
            username: form.username,
            email: form.email,
            first_name: form.first_name,
            last_name: form.last_name,
            password_hash,
            role: ROLE_USER.to_string(),
        })
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// login
///
/// [Public Route] Exchanges username and password for a session token.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token", body = AuthToken),
        (status = 401, description = "Wrong credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthToken>, AppError> {
    let user = state
        .repo
        .get_user_by_username(payload.username.trim())
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !password::verify_password(&payload.password, &user.password_hash) {
        return Err(AppError::Unauthorized);
    }

    Ok(Json(auth::issue_token(&state.config, &user)?))
}

/// get_me
///
/// [Authenticated Route] The requester's own account.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses((status = 200, description = "Account", body = User))
)]
pub async fn get_me(user: AuthUser, State(state): State<AppState>) -> Result<Json<User>, AppError> {
    let account = state
        .repo
        .get_user(user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(account))
}

/// password_change
///
/// [Authenticated Route] Replaces the password after checking the current one.
#[utoipa::path(
    post,
    path = "/auth/password_change",
    request_body = PasswordChangeForm,
    responses(
        (status = 204, description = "Changed"),
        (status = 400, description = "Old password incorrect"),
        (status = 422, description = "Invalid new password")
    )
)]
pub async fn password_change(
    user: AuthUser,
    State(state): State<AppState>,
    Json(form): Json<PasswordChangeForm>,
) -> Result<StatusCode, AppError> {
    forms::validate_password_change(&form)?;

    let account = state
        .repo
        .get_user(user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !password::verify_password(&form.old_password, &account.password_hash) {
        return Err(AppError::BadRequest(
            "Your old password was entered incorrectly.".to_string(),
        ));
    }

    let password_hash = password::hash_password(&form.new_password)?;
    state.repo.set_password(user.id, &password_hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Uploads ---

/// get_presigned_url
///
/// [Authenticated Route] Issues a 10-minute upload URL for a post image. The returned
/// `resource_key` goes into the post form's `image` field.
#[utoipa::path(
    post,
    path = "/upload/presigned",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "URL", body = PresignedUrlResponse),
        (status = 422, description = "Not an image")
    )
)]
pub async fn get_presigned_url(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> Result<Json<PresignedUrlResponse>, AppError> {
    if !payload.file_type.starts_with("image/") {
        let mut errors = FieldErrors::new();
        errors.add("file_type", "Upload a valid image.");
        return Err(AppError::Validation(errors));
    }

    let object_key = storage::new_image_key(&payload.filename);

    let upload_url = state
        .storage
        .get_presigned_upload_url(&object_key, &payload.file_type)
        .await?;

    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: object_key,
    }))
}

// --- Administration ---

/// admin_groups
///
/// [Admin Route] Every group.
#[utoipa::path(
    get,
    path = "/admin/groups",
    responses((status = 200, description = "Groups", body = [Group]))
)]
pub async fn admin_groups(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Group>>, AppError> {
    user.require_admin()?;
    Ok(Json(state.repo.get_groups().await?))
}

/// create_group
///
/// [Admin Route] Adds a group. Slugs are unique.
#[utoipa::path(
    post,
    path = "/admin/groups",
    request_body = GroupForm,
    responses(
        (status = 201, description = "Created", body = Group),
        (status = 409, description = "Slug taken")
    )
)]
pub async fn create_group(
    user: AuthUser,
    State(state): State<AppState>,
    Json(form): Json<GroupForm>,
) -> Result<(StatusCode, Json<Group>), AppError> {
    user.require_admin()?;
    let form = forms::validate_group(form)?;
    let group = state.repo.create_group(form).await?;
    tracing::info!(slug = %group.slug, "group created");
    Ok((StatusCode::CREATED, Json(group)))
}

/// update_group
///
/// [Admin Route] Replaces a group's title, slug and description.
#[utoipa::path(
    put,
    path = "/admin/groups/{slug}",
    params(("slug" = String, Path, description = "Group slug")),
    request_body = GroupForm,
    responses(
        (status = 200, description = "Updated", body = Group),
        (status = 404, description = "No such group"),
        (status = 409, description = "Slug taken")
    )
)]
pub async fn update_group(
    user: AuthUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(form): Json<GroupForm>,
) -> Result<Json<Group>, AppError> {
    user.require_admin()?;
    let form = forms::validate_group(form)?;
    let group = state
        .repo
        .update_group(&slug, form)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(group))
}

/// delete_group
///
/// [Admin Route] Removes a group. Its posts stay, with no group.
#[utoipa::path(
    delete,
    path = "/admin/groups/{slug}",
    params(("slug" = String, Path, description = "Group slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such group")
    )
)]
pub async fn delete_group(
    user: AuthUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, AppError> {
    user.require_admin()?;
    if state.repo.delete_group(&slug).await? {
        tracing::info!(slug = %slug, "group deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

/// admin_posts
///
/// [Admin Route] All posts, optionally filtered by a text search.
#[utoipa::path(
    get,
    path = "/admin/posts",
    params(AdminSearch),
    responses((status = 200, description = "Posts", body = Page<PostView>))
)]
pub async fn admin_posts(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AdminSearch>,
) -> Result<Json<Page<PostView>>, AppError> {
    user.require_admin()?;
    let scope = match query.term() {
        Some(term) => PostScope::Search(term.to_string()),
        None => PostScope::All,
    };
    Ok(Json(post_page(&state, scope, query.page.as_deref()).await?))
}

/// assign_post_group
///
/// [Admin Route] Moves a post to another group, or clears its group with `null`.
#[utoipa::path(
    patch,
    path = "/admin/posts/{post_id}/group",
    params(("post_id" = i64, Path, description = "Post ID")),
    request_body = AssignGroupRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 404, description = "No such post"),
        (status = 422, description = "No such group")
    )
)]
pub async fn assign_post_group(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Json(payload): Json<AssignGroupRequest>,
) -> Result<Json<Post>, AppError> {
    user.require_admin()?;
    ensure_group_exists(&state.repo, payload.group).await?;
    let post = state
        .repo
        .set_post_group(post_id, payload.group)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(post))
}

/// admin_delete_post
///
/// [Admin Route] Deletes any post together with its comments.
#[utoipa::path(
    delete,
    path = "/admin/posts/{post_id}",
    params(("post_id" = i64, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such post")
    )
)]
pub async fn admin_delete_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    user.require_admin()?;
    if state.repo.delete_post(post_id).await? {
        tracing::info!(post_id, admin = %user.username, "post deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

/// admin_comments
///
/// [Admin Route] All comments, optionally filtered by a text search.
#[utoipa::path(
    get,
    path = "/admin/comments",
    params(AdminSearch),
    responses((status = 200, description = "Comments", body = Page<Comment>))
)]
pub async fn admin_comments(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AdminSearch>,
) -> Result<Json<Page<Comment>>, AppError> {
    user.require_admin()?;
    let term = query.term();
    let count = state.repo.count_comments(term).await?;
    let window = Paginator::new(count, POSTS_PER_PAGE).window(query.page.as_deref());
    let comments = state
        .repo
        .search_comments(term, window.limit, window.offset)
        .await?;
    Ok(Json(window.into_page(comments, count)))
}

/// admin_delete_comment
///
/// [Admin Route] Deletes any comment.
#[utoipa::path(
    delete,
    path = "/admin/comments/{comment_id}",
    params(("comment_id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such comment")
    )
)]
pub async fn admin_delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    user.require_admin()?;
    if state.repo.delete_comment(comment_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

/// clear_index_cache
///
/// [Admin Route] Drops every cached index page so the next request reads fresh posts.
#[utoipa::path(
    delete,
    path = "/admin/cache",
    responses(
        (status = 204, description = "Cache cleared"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn clear_index_cache(
    user: AuthUser,
    State(cache): State<IndexCacheState>,
) -> Result<StatusCode, AppError> {
    user.require_admin()?;
    cache.clear().await;
    tracing::info!(admin = %user.username, "index cache cleared");
    Ok(StatusCode::NO_CONTENT)
}
