//! Cloud Firestore client over the REST API.
//!
//! Reads use `documents:runQuery`, writes use `createDocument`. The REST
//! API has no push channel, so a subscription is a background task that
//! re-runs the query on an interval and pushes only changed results.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::document::{self, RunQueryItem};
use super::{ApiError, RemoteStore, SnapshotCallback, SortDirection, SubscriptionHandle};
use crate::auth::BearerToken;
use crate::models::{Message, Snapshot};

// ============================================================================
// Constants
// ============================================================================

/// Base URL for the Firestore REST API
const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Collection holding chat messages
pub const MESSAGES_COLLECTION: &str = "messages";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Default delay between subscription queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct FirestoreSettings {
    pub project_id: String,
    pub api_key: String,
    pub poll_interval: Duration,
}

impl FirestoreSettings {
    pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_key: api_key.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            FIRESTORE_BASE_URL, self.project_id
        )
    }
}

/// Firestore client. Clone is cheap and shares the connection pool and token.
#[derive(Clone)]
pub struct FirestoreClient {
    client: Client,
    settings: FirestoreSettings,
    token: BearerToken,
}

impl FirestoreClient {
    pub fn new(settings: FirestoreSettings, token: BearerToken) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            settings,
            token,
        })
    }

    pub fn settings(&self) -> &FirestoreSettings {
        &self.settings
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(None) for rate limit (should retry).
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self
                .client
                .post(url)
                .query(&[("key", self.settings.api_key.as_str())])
                .query(query)
                .json(body);
            if let Some(token) = self.token.get() {
                request = request.bearer_auth(token);
            }

            let response = request.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response.json().await?),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    /// Fetch the whole message collection in the requested order.
    pub async fn run_query(
        &self,
        order_by: &str,
        direction: SortDirection,
    ) -> Result<Snapshot, ApiError> {
        let url = format!("{}:runQuery", self.settings.documents_url());
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": MESSAGES_COLLECTION }],
                "orderBy": [{
                    "field": { "fieldPath": order_by },
                    "direction": direction.as_firestore(),
                }],
            }
        });

        let items: Vec<RunQueryItem> = self.post(&url, &[], &body).await?;

        let mut messages = Vec::with_capacity(items.len());
        for doc in items.into_iter().filter_map(|item| item.document) {
            match document::from_document(&doc) {
                Ok(message) => messages.push(message),
                // One malformed document must not hide the rest of the chat
                Err(e) => warn!(name = %doc.name, error = %e, "Skipping malformed message document"),
            }
        }

        debug!(count = messages.len(), "Query returned messages");
        // Keep the server's order, including among equal timestamps
        Ok(Snapshot::new(messages))
    }

    pub async fn create_document(&self, message: &Message) -> Result<(), ApiError> {
        let url = format!("{}/{}", self.settings.documents_url(), MESSAGES_COLLECTION);
        let body = document::to_document(message);
        let _created: document::Document = self
            .post(&url, &[("documentId", message.id.as_str())], &body)
            .await?;
        debug!(id = %message.id, "Message document created");
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FirestoreClient {
    fn subscribe(
        &self,
        order_by: &str,
        direction: SortDirection,
        callback: SnapshotCallback,
    ) -> SubscriptionHandle {
        let client = self.clone();
        let order_by = order_by.to_string();

        let task = tokio::spawn(async move {
            let mut last: Option<Snapshot> = None;
            let mut ticker = tokio::time::interval(client.settings.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match client.run_query(&order_by, direction).await {
                    Ok(snapshot) => {
                        if last.as_ref() != Some(&snapshot) {
                            last = Some(snapshot.clone());
                            callback(Ok(snapshot));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Message subscription query failed");
                        callback(Err(e));
                        break;
                    }
                }
            }
        });

        let abort = task.abort_handle();
        SubscriptionHandle::new(move || abort.abort())
    }

    async fn append(&self, message: &Message) -> Result<(), ApiError> {
        self.create_document(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_url() {
        let settings = FirestoreSettings::new("lets-chat-5fe86", "key");
        assert_eq!(
            settings.documents_url(),
            "https://firestore.googleapis.com/v1/projects/lets-chat-5fe86/databases/(default)/documents"
        );
    }

    #[test]
    fn test_sort_direction_names() {
        assert_eq!(SortDirection::Descending.as_firestore(), "DESCENDING");
        assert_eq!(SortDirection::Ascending.as_firestore(), "ASCENDING");
    }

    #[tokio::test]
    async fn test_cancelled_subscription_task_is_aborted() {
        // The current-thread test runtime has not polled the task yet, so a
        // cancel here must stop it before any query or callback runs.
        let settings = FirestoreSettings {
            poll_interval: Duration::from_secs(3600),
            ..FirestoreSettings::new("test", "key")
        };
        let client = FirestoreClient::new(settings, BearerToken::default()).expect("client");
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&calls);
        let callback: SnapshotCallback = std::sync::Arc::new(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        let mut handle = client.subscribe("createdAt", SortDirection::Descending, callback);
        handle.cancel();
        assert!(!handle.is_active());
        tokio::task::yield_now().await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
