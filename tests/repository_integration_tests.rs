//! Repository tests against a real PostgreSQL database.
//!
//! Run with `DATABASE_URL` set and `cargo test -- --ignored`. Every test creates its
//! own uniquely named users and groups, so runs do not interfere with each other.

use sqlx::PgPool;
use uuid::Uuid;
use yatube::{
    AppError,
    forms::CleanPost,
    models::{Group, GroupForm, Post, ROLE_ADMIN, ROLE_USER, User},
    repository::{NewUser, PostScope, PostgresRepository, Repository},
};

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

async fn create_test_user(repo: &PostgresRepository, prefix: &str) -> User {
    repo.create_user(NewUser {
        username: unique(prefix),
        email: "test@example.com".to_string(),
        role: ROLE_USER.to_string(),
        password_hash: "not-a-real-hash".to_string(),
        ..NewUser::default()
    })
    .await
    .expect("Failed to create test user")
}

async fn create_test_group(repo: &PostgresRepository) -> Group {
    let slug = unique("group");
    repo.create_group(GroupForm {
        title: format!("Title {slug}"),
        slug,
        description: "Test group".to_string(),
    })
    .await
    .expect("Failed to create test group")
}

async fn create_test_post(
    repo: &PostgresRepository,
    author: &User,
    text: &str,
    group: Option<&Group>,
) -> Post {
    repo.create_post(
        author.id,
        CleanPost {
            text: text.to_string(),
            group: group.map(|g| g.id),
            image: None,
            clear_image: false,
        },
    )
    .await
    .expect("Failed to create test post")
}

// --- Users ---

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_user_lifecycle() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, "user").await;

    let by_name = repo
        .get_user_by_username(&user.username)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_name.id, user.id);
    assert_eq!(by_name.password_hash, "not-a-real-hash");

    repo.set_password(user.id, "another-hash").await.unwrap();
    assert!(repo.set_role(user.id, ROLE_ADMIN).await.unwrap());
    let updated = repo.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(updated.password_hash, "another-hash");
    assert!(updated.is_admin());

    let duplicate = repo
        .create_user(NewUser {
            username: user.username.clone(),
            role: ROLE_USER.to_string(),
            ..NewUser::default()
        })
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
}

// --- Posts ---

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_post_scopes_and_ordering() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let author = create_test_user(&repo, "author").await;
    let group = create_test_group(&repo).await;

    let first = create_test_post(&repo, &author, "first", Some(&group)).await;
    let second = create_test_post(&repo, &author, "second", None).await;

    let scope = PostScope::Author(author.id);
    assert_eq!(repo.count_posts(&scope).await.unwrap(), 2);
    let posts = repo.get_posts(&scope, 10, 0).await.unwrap();
    assert_eq!(posts[0].id, second.id);
    assert_eq!(posts[1].id, first.id);
    assert_eq!(posts[1].group_slug.as_deref(), Some(group.slug.as_str()));
    assert_eq!(posts[0].author, author.username);

    let page_two = repo.get_posts(&scope, 1, 1).await.unwrap();
    assert_eq!(page_two.len(), 1);
    assert_eq!(page_two[0].id, first.id);

    assert_eq!(repo.count_posts(&PostScope::Group(group.id)).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_update_post_is_owner_only() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let author = create_test_user(&repo, "author").await;
    let stranger = create_test_user(&repo, "stranger").await;
    let post = create_test_post(&repo, &author, "original", None).await;

    let edit = CleanPost {
        text: "edited".to_string(),
        group: None,
        image: Some("posts/new.gif".to_string()),
        clear_image: false,
    };
    assert!(
        repo.update_post(post.id, stranger.id, edit.clone())
            .await
            .unwrap()
            .is_none()
    );

    let updated = repo.update_post(post.id, author.id, edit).await.unwrap().unwrap();
    assert_eq!(updated.text, "edited");
    assert_eq!(updated.image, "posts/new.gif");

    // Omitting the image keeps the current one.
    let kept = repo
        .update_post(
            post.id,
            author.id,
            CleanPost {
                text: "again".to_string(),
                group: None,
                image: None,
                clear_image: false,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.image, "posts/new.gif");

    let cleared = repo
        .update_post(
            post.id,
            author.id,
            CleanPost {
                text: "again".to_string(),
                group: None,
                image: None,
                clear_image: true,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cleared.image, "");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_group_delete_nulls_and_post_delete_cascades() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let author = create_test_user(&repo, "author").await;
    let group = create_test_group(&repo).await;
    let post = create_test_post(&repo, &author, "grouped", Some(&group)).await;
    let comment = repo
        .add_comment(post.id, author.id, "hello".to_string())
        .await
        .unwrap();
    assert_eq!(comment.author, author.username);

    assert!(repo.delete_group(&group.slug).await.unwrap());
    let orphan = repo.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(orphan.group_id, None);

    assert!(repo.delete_post(post.id).await.unwrap());
    assert!(repo.get_comments(post.id).await.unwrap().is_empty());
    assert!(!repo.delete_comment(comment.id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_comment_on_missing_post_is_not_found() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let author = create_test_user(&repo, "author").await;

    let result = repo.add_comment(i64::MAX, author.id, "void".to_string()).await;
    assert!(matches!(result, Err(AppError::NotFound)));
}

// --- Follows ---

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_follow_constraints() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let reader = create_test_user(&repo, "reader").await;
    let writer = create_test_user(&repo, "writer").await;
    create_test_post(&repo, &writer, "for the feed", None).await;

    assert!(repo.follow(reader.id, writer.id).await.unwrap());
    assert!(!repo.follow(reader.id, writer.id).await.unwrap());
    assert!(repo.is_following(reader.id, writer.id).await.unwrap());
    assert_eq!(
        repo.count_posts(&PostScope::FollowedBy(reader.id)).await.unwrap(),
        1
    );

    // The CHECK constraint rejects self-follows.
    let self_follow = repo.follow(reader.id, reader.id).await;
    assert!(matches!(self_follow, Err(AppError::Conflict(name)) if name == "prevent_self_follow"));

    assert!(repo.unfollow(reader.id, writer.id).await.unwrap());
    assert!(!repo.unfollow(reader.id, writer.id).await.unwrap());
    assert_eq!(
        repo.count_posts(&PostScope::FollowedBy(reader.id)).await.unwrap(),
        0
    );
}
