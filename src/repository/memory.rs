use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{NewUser, PostScope, Repository};
use crate::{
    error::AppError,
    forms::CleanPost,
    models::{Comment, Follow, Group, GroupForm, Post, PostView, User},
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    groups: Vec<Group>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    follows: Vec<Follow>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn view(&self, post: &Post) -> PostView {
        let group = post
            .group_id
            .and_then(|gid| self.groups.iter().find(|g| g.id == gid));
        PostView {
            id: post.id,
            text: post.text.clone(),
            created: post.created,
            image: Some(post.image.clone()).filter(|i| !i.is_empty()),
            image_url: None,
            author_id: post.author_id,
            author: self
                .user(post.author_id)
                .map(|u| u.username.clone())
                .unwrap_or_default(),
            group_id: group.map(|g| g.id),
            group_slug: group.map(|g| g.slug.clone()),
            group_title: group.map(|g| g.title.clone()),
        }
    }

    fn in_scope(&self, post: &Post, scope: &PostScope) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(group_id) => post.group_id == Some(*group_id),
            PostScope::Author(author_id) => post.author_id == *author_id,
            PostScope::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|f| f.user_id == *user_id && f.author_id == post.author_id),
            PostScope::Search(text) => contains_ignore_case(&post.text, text),
        }
    }

    /// Newest first, id breaking ties between posts created in the same instant.
    fn scoped_posts(&self, scope: &PostScope) -> Vec<&Post> {
        let mut posts: Vec<&Post> = self
            .posts
            .iter()
            .filter(|p| self.in_scope(p, scope))
            .collect();
        posts.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        posts
    }

    fn scoped_comments(&self, search: Option<&str>) -> Vec<&Comment> {
        let mut comments: Vec<&Comment> = self
            .comments
            .iter()
            .filter(|c| search.is_none_or(|s| contains_ignore_case(&c.text, s)))
            .collect();
        comments.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        comments
    }

    fn check_group(&self, group_id: Option<i64>) -> Result<(), AppError> {
        match group_id {
            Some(gid) if !self.groups.iter().any(|g| g.id == gid) => Err(AppError::NotFound),
            _ => Ok(()),
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn window<T: Clone>(items: Vec<&T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(0))
        .take(usize::try_from(limit).unwrap_or(0))
        .cloned()
        .collect()
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory. It enforces the same relational
/// rules as the PostgreSQL schema (unique usernames/slugs, unique non-self follows,
/// SET NULL on group deletion, cascading comments) so handler logic can be exercised
/// without a database. Used by the router tests and for quick local runs.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables.lock().await.user(id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(AppError::Conflict("users_username_key".to_string()));
        }
        let created = User {
            id: tables.next_id(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            role: user.role,
            date_joined: Utc::now(),
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(AppError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn set_role(&self, id: i64, role: &str) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        match tables.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.role = role.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_groups(&self) -> Result<Vec<Group>, AppError> {
        let mut groups = self.tables.lock().await.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }

    async fn get_group(&self, id: i64) -> Result<Option<Group>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn get_group_by_slug(&self, slug: &str) -> Result<Option<Group>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|g| g.slug == slug).cloned())
    }

    async fn create_group(&self, form: GroupForm) -> Result<Group, AppError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.iter().any(|g| g.slug == form.slug) {
            return Err(AppError::Conflict("groups_slug_key".to_string()));
        }
        let group = Group {
            id: tables.next_id(),
            title: form.title,
            slug: form.slug,
            description: form.description,
        };
        tables.groups.push(group.clone());
        Ok(group)
    }

    async fn update_group(&self, slug: &str, form: GroupForm) -> Result<Option<Group>, AppError> {
        let mut tables = self.tables.lock().await;
        if form.slug != slug && tables.groups.iter().any(|g| g.slug == form.slug) {
            return Err(AppError::Conflict("groups_slug_key".to_string()));
        }
        let Some(group) = tables.groups.iter_mut().find(|g| g.slug == slug) else {
            return Ok(None);
        };
        group.title = form.title;
        group.slug = form.slug;
        group.description = form.description;
        Ok(Some(group.clone()))
    }

    async fn delete_group(&self, slug: &str) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        let Some(pos) = tables.groups.iter().position(|g| g.slug == slug) else {
            return Ok(false);
        };
        let removed = tables.groups.remove(pos);
        for post in tables.posts.iter_mut().filter(|p| p.group_id == Some(removed.id)) {
            post.group_id = None;
        }
        Ok(true)
    }

    async fn count_posts(&self, scope: &PostScope) -> Result<u64, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.scoped_posts(scope).len() as u64)
    }

    async fn get_posts(
        &self,
        scope: &PostScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostView>, AppError> {
        let tables = self.tables.lock().await;
        let posts = window(tables.scoped_posts(scope), limit, offset);
        Ok(posts.iter().map(|p| tables.view(p)).collect())
    }

    async fn get_post(&self, id: i64) -> Result<Option<PostView>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .find(|p| p.id == id)
            .map(|p| tables.view(p)))
    }

    async fn create_post(&self, author_id: i64, post: CleanPost) -> Result<Post, AppError> {
        let mut tables = self.tables.lock().await;
        if tables.user(author_id).is_none() {
            return Err(AppError::NotFound);
        }
        tables.check_group(post.group)?;
        let created = Post {
            id: tables.next_id(),
            text: post.text,
            created: Utc::now(),
            image: post.image.unwrap_or_default(),
            author_id,
            group_id: post.group,
        };
        tables.posts.push(created.clone());
        Ok(created)
    }

    async fn update_post(
        &self,
        id: i64,
        author_id: i64,
        post: CleanPost,
    ) -> Result<Option<Post>, AppError> {
        let mut tables = self.tables.lock().await;
        tables.check_group(post.group)?;
        let Some(stored) = tables
            .posts
            .iter_mut()
            .find(|p| p.id == id && p.author_id == author_id)
        else {
            return Ok(None);
        };
        stored.text = post.text;
        stored.group_id = post.group;
        if post.clear_image {
            stored.image.clear();
        } else if let Some(image) = post.image {
            stored.image = image;
        }
        Ok(Some(stored.clone()))
    }

    async fn set_post_group(
        &self,
        id: i64,
        group_id: Option<i64>,
    ) -> Result<Option<Post>, AppError> {
        let mut tables = self.tables.lock().await;
        tables.check_group(group_id)?;
        let Some(stored) = tables.posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        stored.group_id = group_id;
        Ok(Some(stored.clone()))
    }

    async fn delete_post(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        let before = tables.posts.len();
        tables.posts.retain(|p| p.id != id);
        if tables.posts.len() == before {
            return Ok(false);
        }
        tables.comments.retain(|c| c.post_id != id);
        Ok(true)
    }

    async fn get_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        let tables = self.tables.lock().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn add_comment(
        &self,
        post_id: i64,
        author_id: i64,
        text: String,
    ) -> Result<Comment, AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.posts.iter().any(|p| p.id == post_id) {
            return Err(AppError::NotFound);
        }
        let author = tables
            .user(author_id)
            .map(|u| u.username.clone())
            .ok_or(AppError::NotFound)?;
        let comment = Comment {
            id: tables.next_id(),
            post_id,
            author_id,
            author,
            text,
            created: Utc::now(),
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn count_comments(&self, search: Option<&str>) -> Result<u64, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.scoped_comments(search).len() as u64)
    }

    async fn search_comments(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Comment>, AppError> {
        let tables = self.tables.lock().await;
        Ok(window(tables.scoped_comments(search), limit, offset))
    }

    async fn delete_comment(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        let before = tables.comments.len();
        tables.comments.retain(|c| c.id != id);
        Ok(tables.comments.len() < before)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id))
    }

    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        if user_id == author_id {
            return Err(AppError::Conflict("prevent_self_follow".to_string()));
        }
        if tables.user(user_id).is_none() || tables.user(author_id).is_none() {
            return Err(AppError::NotFound);
        }
        if tables
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id)
        {
            return Ok(false);
        }
        let follow = Follow {
            id: tables.next_id(),
            user_id,
            author_id,
        };
        tables.follows.push(follow);
        Ok(true)
    }

    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|f| !(f.user_id == user_id && f.author_id == author_id));
        Ok(tables.follows.len() < before)
    }
}
