//! HTTP client for the remote session API
//!
//! Two calls: exchange credentials for a bearer token, then fetch the profile
//! of the token's owner to learn their id and role.

use async_trait::async_trait;
use edulink_core::{
    authentication_error, retry_async, ApiConfig, Credentials, EdulinkError, EdulinkResult,
    ErrorContext, RetryConfig, Role, SessionApi, UserProfile,
};
use futures::FutureExt;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Login endpoint response
#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Profile endpoint response; extra fields are ignored
#[derive(Debug, Deserialize)]
struct ProfileResponse {
    id: serde_json::Value,
    #[serde(default)]
    role: Option<String>,
}

/// [`SessionApi`] over HTTP/JSON
pub struct HttpSessionApi {
    client: reqwest::Client,
    config: ApiConfig,
    retry: RetryConfig,
}

impl HttpSessionApi {
    pub fn new(config: ApiConfig) -> EdulinkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| EdulinkError::Config {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("session_api").with_operation("create_client"),
            })?;

        let retry = RetryConfig {
            max_attempts: config.max_attempts.max(1),
            ..RetryConfig::default()
        };

        info!("Created session API client for {}", config.base_url);

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    /// Override the retry policy used for profile fetches
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn authenticate(&self, credentials: &Credentials) -> EdulinkResult<String> {
        let url = self.endpoint(&self.config.login_path);
        debug!(url = %url, email = %credentials.email, "Requesting session token");

        let response = self
            .client
            .post(&url)
            .json(credentials)
            .send()
            .await
            .map_err(|e| transport_error(e, "authenticate"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, "authenticate"))?;

        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            return Err(authentication_error!(
                format!(
                    "Login rejected ({}){}",
                    status.as_u16(),
                    server_message(&body).map(|m| format!(": {}", m)).unwrap_or_default()
                ),
                "session_api"
            ));
        }
        if !status.is_success() {
            return Err(status_error(status, &body, "authenticate"));
        }

        let login: LoginResponse = serde_json::from_str(&body)?;
        if login.token.trim().is_empty() {
            return Err(authentication_error!(
                "Login response did not contain a token",
                "session_api"
            ));
        }

        Ok(login.token)
    }

    async fn fetch_profile(&self, token: &str) -> EdulinkResult<UserProfile> {
        let url = self.endpoint(&self.config.profile_path);
        let client = self.client.clone();
        let token = token.to_string();

        let operation = move || {
            let client = client.clone();
            let url = url.clone();
            let token = token.clone();
            async move { request_profile(&client, &url, &token).await }.boxed()
        };

        retry_async(operation, &self.retry, "fetch_profile").await
    }
}

async fn request_profile(
    client: &reqwest::Client,
    url: &str,
    token: &str,
) -> EdulinkResult<UserProfile> {
    debug!(url = %url, "Fetching user profile");

    let response = client
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| transport_error(e, "fetch_profile"))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(e, "fetch_profile"))?;

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(EdulinkError::Authentication {
            message: format!("Token rejected by profile endpoint ({})", status.as_u16()),
            context: ErrorContext::new("session_api")
                .with_operation("fetch_profile")
                .with_suggestion("Sign in again to obtain a fresh token"),
        });
    }
    if !status.is_success() {
        return Err(status_error(status, &body, "fetch_profile"));
    }

    let profile: ProfileResponse = serde_json::from_str(&body)?;
    let id = match profile.id {
        serde_json::Value::String(id) => id,
        serde_json::Value::Number(id) => id.to_string(),
        other => {
            return Err(EdulinkError::Validation {
                message: format!("Unsupported user id in profile: {}", other),
                field: Some("id".to_string()),
                context: ErrorContext::new("session_api").with_operation("fetch_profile"),
            });
        }
    };

    Ok(UserProfile {
        id,
        role: Role::from(profile.role.unwrap_or_default()),
    })
}

fn transport_error(error: reqwest::Error, operation: &str) -> EdulinkError {
    let suggestion = if error.is_timeout() {
        "Increase api.timeout_seconds"
    } else {
        "Check network connectivity and api.base_url"
    };

    EdulinkError::Network {
        message: format!("Request failed: {}", error),
        status: error.status().map(|s| s.as_u16()),
        source: Some(Box::new(error)),
        context: ErrorContext::new("session_api")
            .with_operation(operation)
            .with_suggestion(suggestion),
    }
}

fn status_error(status: StatusCode, body: &str, operation: &str) -> EdulinkError {
    EdulinkError::Network {
        message: format!(
            "Unexpected status {}{}",
            status.as_u16(),
            server_message(body).map(|m| format!(": {}", m)).unwrap_or_default()
        ),
        status: Some(status.as_u16()),
        source: None,
        context: ErrorContext::new("session_api").with_operation(operation),
    }
}

/// Pull a human-readable `message` or `error` field out of an error body
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|field| value.get(field)?.as_str().map(str::to_string))
}
