use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};

use super::{NewUser, PostScope, Repository};
use crate::{
    error::AppError,
    forms::CleanPost,
    models::{Comment, Group, GroupForm, Post, PostView, User},
};

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, role, date_joined";

const POST_COLUMNS: &str = "id, text, created, image, author_id, group_id";

const POST_VIEW_SELECT: &str = r#"
    SELECT
        p.id, p.text, p.created, NULLIF(p.image, '') AS image,
        p.author_id, u.username AS author,
        p.group_id, g.slug AS group_slug, g.title AS group_title
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN groups g ON g.id = p.group_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.author_id, u.username AS author, c.text, c.created
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends the WHERE clause for a listing scope. Values are always bound, never interpolated.
fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: &PostScope) {
    match scope {
        PostScope::All => {}
        PostScope::Group(group_id) => {
            builder.push(" WHERE p.group_id = ");
            builder.push_bind(*group_id);
        }
        PostScope::Author(author_id) => {
            builder.push(" WHERE p.author_id = ");
            builder.push_bind(*author_id);
        }
        PostScope::FollowedBy(user_id) => {
            builder.push(" WHERE p.author_id IN (SELECT f.author_id FROM follows f WHERE f.user_id = ");
            builder.push_bind(*user_id);
            builder.push(")");
        }
        PostScope::Search(text) => {
            builder.push(" WHERE p.text ILIKE ");
            builder.push_bind(format!("%{}%", text));
        }
    }
}

fn push_comment_search(builder: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
    if let Some(text) = search {
        builder.push(" WHERE c.text ILIKE ");
        builder.push_bind(format!("%{}%", text));
    }
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or_default()
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// The unique index on `username` turns a duplicate registration into `Conflict`.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"INSERT INTO users (username, email, first_name, last_name, password_hash, role, date_joined)
               VALUES ($1, $2, $3, $4, $5, $6, NOW())
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(&user.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        let res = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn set_role(&self, id: i64, role: &str) -> Result<bool, AppError> {
        let res = sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(role)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn get_groups(&self) -> Result<Vec<Group>, AppError> {
        let groups = sqlx::query_as::<_, Group>(
            "SELECT id, title, slug, description FROM groups ORDER BY title ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }

    async fn get_group(&self, id: i64) -> Result<Option<Group>, AppError> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, title, slug, description FROM groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn get_group_by_slug(&self, slug: &str) -> Result<Option<Group>, AppError> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, title, slug, description FROM groups WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn create_group(&self, form: GroupForm) -> Result<Group, AppError> {
        let group = sqlx::query_as::<_, Group>(
            "INSERT INTO groups (title, slug, description) VALUES ($1, $2, $3) RETURNING id, title, slug, description",
        )
        .bind(&form.title)
        .bind(&form.slug)
        .bind(&form.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(group)
    }

    async fn update_group(&self, slug: &str, form: GroupForm) -> Result<Option<Group>, AppError> {
        let group = sqlx::query_as::<_, Group>(
            r#"UPDATE groups SET title = $1, slug = $2, description = $3
               WHERE slug = $4
               RETURNING id, title, slug, description"#,
        )
        .bind(&form.title)
        .bind(&form.slug)
        .bind(&form.description)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    /// `ON DELETE SET NULL` on `posts.group_id` keeps the group's posts.
    async fn delete_group(&self, slug: &str) -> Result<bool, AppError> {
        let res = sqlx::query("DELETE FROM groups WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_posts(&self, scope: &PostScope) -> Result<u64, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM posts p");
        push_scope(&mut builder, scope);
        let count: i64 = builder.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(to_count(count))
    }

    async fn get_posts(
        &self,
        scope: &PostScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostView>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(POST_VIEW_SELECT);
        push_scope(&mut builder, scope);
        builder.push(" ORDER BY p.created DESC, p.id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let posts = builder
            .build_query_as::<PostView>()
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    async fn get_post(&self, id: i64) -> Result<Option<PostView>, AppError> {
        let post = sqlx::query_as::<_, PostView>(&format!("{POST_VIEW_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn create_post(&self, author_id: i64, post: CleanPost) -> Result<Post, AppError> {
        let created = sqlx::query_as::<_, Post>(&format!(
            r#"INSERT INTO posts (text, created, image, author_id, group_id)
               VALUES ($1, NOW(), $2, $3, $4)
               RETURNING {POST_COLUMNS}"#
        ))
        .bind(&post.text)
        .bind(post.image.unwrap_or_default())
        .bind(author_id)
        .bind(post.group)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// The ownership check is part of the WHERE clause, so a foreign post is never touched.
    async fn update_post(
        &self,
        id: i64,
        author_id: i64,
        post: CleanPost,
    ) -> Result<Option<Post>, AppError> {
        let updated = sqlx::query_as::<_, Post>(&format!(
            r#"UPDATE posts
               SET text = $3, group_id = $4,
                   image = CASE WHEN $6 THEN '' ELSE COALESCE($5, image) END
               WHERE id = $1 AND author_id = $2
               RETURNING {POST_COLUMNS}"#
        ))
        .bind(id)
        .bind(author_id)
        .bind(&post.text)
        .bind(post.group)
        .bind(post.image)
        .bind(post.clear_image)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn set_post_group(
        &self,
        id: i64,
        group_id: Option<i64>,
    ) -> Result<Option<Post>, AppError> {
        let updated = sqlx::query_as::<_, Post>(&format!(
            "UPDATE posts SET group_id = $2 WHERE id = $1 RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_post(&self, id: i64) -> Result<bool, AppError> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn get_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.post_id = $1 ORDER BY c.created DESC, c.id DESC"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    /// Inserts the comment and joins the author's username in one round trip.
    async fn add_comment(
        &self,
        post_id: i64,
        author_id: i64,
        text: String,
    ) -> Result<Comment, AppError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (post_id, author_id, text, created)
                VALUES ($1, $2, $3, NOW())
                RETURNING id, post_id, author_id, text, created
            )
            SELECT i.id, i.post_id, i.author_id, u.username AS author, i.text, i.created
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn count_comments(&self, search: Option<&str>) -> Result<u64, AppError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM comments c");
        push_comment_search(&mut builder, search);
        let count: i64 = builder.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(to_count(count))
    }

    async fn search_comments(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Comment>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(COMMENT_SELECT);
        push_comment_search(&mut builder, search);
        builder.push(" ORDER BY c.created DESC, c.id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let comments = builder
            .build_query_as::<Comment>()
            .fetch_all(&self.pool)
            .await?;
        Ok(comments)
    }

    async fn delete_comment(&self, id: i64) -> Result<bool, AppError> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// `ON CONFLICT DO NOTHING` makes a repeated follow a no-op. The
    /// `prevent_self_follow` check still rejects a self-follow with `Conflict`.
    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, AppError> {
        let res = sqlx::query(
            "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT ON CONSTRAINT unique_relationships DO NOTHING",
        )
        .bind(user_id)
        .bind(author_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, AppError> {
        let res = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
