#![allow(dead_code)]

use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use yatube::{
    AppConfig, AppState, InMemoryRepository, MockStorageService, create_router,
    forms::CleanPost,
    models::{Group, GroupForm, Post, ROLE_ADMIN, ROLE_USER, User},
    repository::{NewUser, Repository, RepositoryState},
    storage::StorageState,
};

/// A running server over the in-memory repository, plus direct access to that
/// repository for seeding and assertions.
pub struct TestApp {
    pub address: String,
    pub repo: Arc<InMemoryRepository>,
    pub client: reqwest::Client,
    pub config: AppConfig,
}

/// Index cache disabled, so every request sees the current data.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(AppConfig {
        index_cache_ttl: Duration::ZERO,
        ..AppConfig::default()
    })
    .await
}

pub async fn spawn_app_with(config: AppConfig) -> TestApp {
    spawn_app_with_storage(config, MockStorageService::new()).await
}

pub async fn spawn_app_with_storage(config: AppConfig, storage: MockStorageService) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState::new(
        repo.clone() as RepositoryState,
        Arc::new(storage) as StorageState,
        config.clone(),
    );
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        client: reqwest::Client::new(),
        config,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Seeds an account without a usable password (hashing is only paid for in auth tests).
    pub async fn create_user(&self, username: &str) -> User {
        self.repo
            .create_user(NewUser {
                username: username.to_string(),
                role: ROLE_USER.to_string(),
                ..NewUser::default()
            })
            .await
            .unwrap()
    }

    pub async fn create_admin(&self, username: &str) -> User {
        let user = self.create_user(username).await;
        self.repo.set_role(user.id, ROLE_ADMIN).await.unwrap();
        self.repo.get_user(user.id).await.unwrap().unwrap()
    }

    pub async fn create_group(&self, slug: &str) -> Group {
        self.repo
            .create_group(GroupForm {
                title: format!("Group {slug}"),
                slug: slug.to_string(),
                description: format!("All about {slug}"),
            })
            .await
            .unwrap()
    }

    pub async fn create_post(&self, author: &User, text: &str, group: Option<&Group>) -> Post {
        self.repo
            .create_post(
                author.id,
                CleanPost {
                    text: text.to_string(),
                    group: group.map(|g| g.id),
                    image: None,
                    clear_image: false,
                },
            )
            .await
            .unwrap()
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path))
    }

    /// A request authenticated through the local `x-user-id` bypass.
    pub fn as_user(&self, method: reqwest::Method, path: &str, user: &User) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(yatube::auth::DEV_USER_HEADER, user.id.to_string())
    }
}
