// HTTP client for the story API (reqwest, bearer auth)

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ApiError, ClientConfig, StoryApi};
use crate::model::{NewStory, Session, Story};

/// Envelope fields present on every response.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    list_story: Vec<Story>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    story: Story,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    login_result: Option<LoginResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResult {
    user_id: String,
    name: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

pub struct HttpStoryClient {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpStoryClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Network {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/stories/{id}` with the id encoded as a single path segment.
    fn story_url(&self, id: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.url("/stories")).map_err(|e| ApiError::Network {
            message: format!("invalid base URL: {}", e),
        })?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Network {
                message: format!("base URL cannot hold a path: {}", self.base_url),
            })?
            .push(id);
        Ok(url)
    }

    fn bearer(&self) -> Result<String, ApiError> {
        self.token
            .read()
            .as_ref()
            .map(|token| format!("Bearer {}", token))
            .ok_or(ApiError::MissingToken)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await.map_err(|e| ApiError::Network {
            message: e.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::Network {
            message: format!("failed to read response body: {}", e),
        })?;

        let envelope = serde_json::from_str::<ApiMessage>(&body).ok();

        if !status.is_success() {
            let message = envelope
                .map(|m| m.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("API Error").to_string());
            tracing::debug!("Story API returned {}: {}", status, message);
            return Err(if status == StatusCode::UNAUTHORIZED {
                ApiError::Unauthorized { message }
            } else {
                ApiError::Status {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        if let Some(envelope) = envelope.filter(|m| m.error) {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: envelope.message,
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl StoryApi for HttpStoryClient {
    async fn register(&self, name: &str, email: &str, password: &str) -> Result<String, ApiError> {
        let request = self
            .client
            .post(self.url("/register"))
            .json(&RegisterRequest {
                name,
                email,
                password,
            });
        let response: ApiMessage = self.send(request).await?;
        tracing::info!("Registered account for {}", email);
        Ok(response.message)
    }

    async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let request = self
            .client
            .post(self.url("/login"))
            .json(&LoginRequest { email, password });
        let response: LoginResponse = self.send(request).await?;

        let result = response.login_result.ok_or_else(|| ApiError::InvalidResponse {
            message: "login result missing".to_string(),
        })?;
        let token = result
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse {
                message: "token not found".to_string(),
            })?;

        *self.token.write() = Some(token.clone());
        tracing::info!("Logged in as {}", result.name);
        Ok(Session {
            user_id: result.user_id,
            name: result.name,
            token,
        })
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    async fn list_stories(&self) -> Result<Vec<Story>, ApiError> {
        let request = self
            .client
            .get(self.url("/stories"))
            .header(AUTHORIZATION, self.bearer()?);
        let response: ListResponse = self.send(request).await?;
        tracing::debug!("Fetched {} stories", response.list_story.len());
        Ok(response.list_story)
    }

    async fn get_story(&self, id: &str) -> Result<Story, ApiError> {
        let request = self
            .client
            .get(self.story_url(id)?)
            .header(AUTHORIZATION, self.bearer()?);
        let response: DetailResponse = self.send(request).await?;
        Ok(response.story)
    }

    async fn add_story(&self, story: NewStory) -> Result<String, ApiError> {
        let bearer = self.bearer()?;
        let photo = Part::bytes(story.photo)
            .file_name(story.photo_name.clone())
            .mime_str(photo_mime(&story.photo_name))
            .map_err(|e| ApiError::InvalidResponse {
                message: format!("invalid photo type: {}", e),
            })?;

        let mut form = Form::new()
            .part("photo", photo)
            .text("description", story.description);
        if let (Some(lat), Some(lon)) = (story.lat, story.lon) {
            form = form.text("lat", lat.to_string()).text("lon", lon.to_string());
        }

        let request = self
            .client
            .post(self.url("/stories"))
            .header(AUTHORIZATION, bearer)
            .multipart(form);
        let response: ApiMessage = self.send(request).await?;
        tracing::info!("Story uploaded: {}", response.message);
        Ok(response.message)
    }
}

fn photo_mime(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
