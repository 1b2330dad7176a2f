// Remote story API: the only place that knows about HTTP
//
// Upper layers (controller, CLI) only see the StoryApi trait.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{NewStory, Session, Story};

#[cfg(not(target_arch = "wasm32"))]
pub mod client;

#[cfg(not(target_arch = "wasm32"))]
pub use client::HttpStoryClient;

pub const DEFAULT_BASE_URL: &str = "https://story-api.dicoding.dev/v1";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {message}")]
    Network { message: String },
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
    #[error("not logged in")]
    MissingToken,
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl ApiError {
    /// Transport failures and server-side outages, as opposed to rejected requests.
    pub fn is_connectivity(&self) -> bool {
        match self {
            ApiError::Network { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Story service operations.
#[async_trait]
pub trait StoryApi: Send + Sync {
    /// Create an account. Returns the server's message.
    async fn register(&self, name: &str, email: &str, password: &str) -> Result<String, ApiError>;

    /// Log in and keep the returned token for later requests.
    async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError>;

    /// Install (or drop) the bearer token, e.g. one restored from the local store.
    fn set_token(&self, token: Option<String>);

    fn has_token(&self) -> bool;

    async fn list_stories(&self) -> Result<Vec<Story>, ApiError>;

    async fn get_story(&self, id: &str) -> Result<Story, ApiError>;

    /// Upload a new story. Returns the server's message.
    async fn add_story(&self, story: NewStory) -> Result<String, ApiError>;
}
