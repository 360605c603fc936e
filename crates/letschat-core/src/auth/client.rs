//! Anonymous sign-in against the Firebase Identity Toolkit REST API.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::SessionData;
use crate::remote::ApiError;

/// Identity Toolkit endpoint for creating anonymous accounts
const SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";

/// Secure Token endpoint for exchanging refresh tokens
const REFRESH_URL: &str = "https://securetoken.googleapis.com/v1/token";

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Token lifetime when the response omits or garbles `expiresIn`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    local_id: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    user_id: String,
}

fn parse_expires_in(value: Option<&str>) -> i64 {
    value
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
}

#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    api_key: String,
}

impl AuthClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Create a fresh anonymous account and return its session
    pub async fn sign_in_anonymously(&self) -> Result<SessionData> {
        let response = self
            .client
            .post(SIGN_UP_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "returnSecureToken": true }))
            .send()
            .await
            .context("Failed to send anonymous sign-in request")?;

        let response = Self::check_response(response).await?;
        let auth: SignUpResponse = response
            .json()
            .await
            .context("Failed to parse sign-in response")?;
        debug!(user_id = %auth.local_id, "Signed in anonymously");

        Ok(SessionData {
            expires_in_secs: parse_expires_in(auth.expires_in.as_deref()),
            id_token: auth.id_token,
            refresh_token: auth.refresh_token,
            user_id: auth.local_id,
            created_at: Utc::now(),
        })
    }

    /// Exchange a refresh token for a new ID token, keeping the same user
    pub async fn refresh(&self, session: &SessionData) -> Result<SessionData> {
        let response = self
            .client
            .post(REFRESH_URL)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
            ])
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let response = Self::check_response(response).await?;
        let refreshed: RefreshResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;
        debug!(user_id = %refreshed.user_id, "Session token refreshed");

        Ok(SessionData {
            expires_in_secs: parse_expires_in(refreshed.expires_in.as_deref()),
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
            user_id: refreshed.user_id,
            created_at: Utc::now(),
        })
    }
}
