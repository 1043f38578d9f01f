use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use shared::{
    domain::{ToggleAction, ToggleKey, UserId},
    error::{ApiError, ApiException},
    protocol::{FeedPage, FeedQuery, LoginRequest, TokenPair, UserProfile},
};
use tracing::{debug, info};
use url::Url;

use crate::{credentials::CredentialStore, ConfirmationAction};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin wrapper over the social REST API.
pub struct SocialApiClient {
    http: Client,
    server_url: String,
    credentials: Arc<dyn CredentialStore>,
}

impl SocialApiClient {
    pub fn new(
        server_url: &str,
        credentials: Arc<dyn CredentialStore>,
        timeout: Duration,
    ) -> Result<Self> {
        let parsed = Url::parse(server_url)
            .with_context(|| format!("invalid server url '{server_url}'"))?;
        if parsed.cannot_be_a_base() {
            return Err(anyhow!("server url '{server_url}' cannot be used as a base"));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let builder = self
            .http
            .request(method, format!("{}{path}", self.server_url));
        match self.credentials.get()? {
            Some(tokens) => Ok(builder.bearer_auth(tokens.access_token)),
            None => Ok(builder),
        }
    }

    async fn send(&self, method: Method, path: &str, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("{method} {path} request failed"))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiError>(&body) {
            Ok(api_error) => Err(anyhow::Error::new(ApiException::from(api_error))
                .context(format!("{method} {path} failed with status {status}"))),
            Err(_) => Err(anyhow!("{method} {path} failed with status {status}")),
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        let path = "/auth/login";
        let builder = self
            .http
            .post(format!("{}{path}", self.server_url))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            });
        let tokens: TokenPair = self
            .send(Method::POST, path, builder)
            .await?
            .json()
            .await
            .context("malformed login response")?;

        self.credentials.set(&tokens)?;
        info!(username, "logged in");
        Ok(tokens)
    }

    pub fn logout(&self) -> Result<()> {
        self.credentials.clear()?;
        info!("logged out");
        Ok(())
    }

    pub async fn fetch_profile(&self, user_id: UserId) -> Result<UserProfile> {
        let path = format!("/users/{user_id}");
        let builder = self.request(Method::GET, &path)?;
        let profile: UserProfile = self
            .send(Method::GET, &path, builder)
            .await?
            .json()
            .await
            .with_context(|| format!("malformed profile response for user {user_id}"))?;

        if profile.user_id != user_id {
            return Err(anyhow!(
                "server returned profile {} for requested user {user_id}",
                profile.user_id
            ));
        }
        Ok(profile)
    }

    pub async fn fetch_feed(&self, page: u32, page_size: u32) -> Result<FeedPage> {
        let path = "/posts";
        let builder = self
            .request(Method::GET, path)?
            .query(&FeedQuery { page, page_size });
        self.send(Method::GET, path, builder)
            .await?
            .json()
            .await
            .with_context(|| format!("malformed feed response for page {page}"))
    }

    pub async fn set_relation(&self, key: ToggleKey, enabled: bool) -> Result<()> {
        let path = relation_path(key);
        let method = if enabled { Method::POST } else { Method::DELETE };
        let builder = self.request(method.clone(), &path)?;
        self.send(method.clone(), &path, builder).await?;
        debug!(%method, %path, "relation updated");
        Ok(())
    }
}

fn relation_path(key: ToggleKey) -> String {
    let id = key.target_id();
    match key.action() {
        ToggleAction::Follow => format!("/users/{id}/follow"),
        ToggleAction::Like => format!("/posts/{id}/like"),
    }
}

#[async_trait]
impl ConfirmationAction<ToggleKey> for SocialApiClient {
    async fn confirm(&self, key: &ToggleKey, desired: bool) -> Result<()> {
        self.set_relation(*key, desired).await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
