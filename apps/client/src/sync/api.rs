//! Client side of the sync HTTP contract.

use std::future::Future;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use wordbook_core::{UserSettings, WordBookEntry};

use super::SyncError;

/// Server window requested during a word book exchange.
///
/// Pages are keyed on entry id: `after_id` is the last id of the previous
/// page, so rows leaving the window between rounds cannot shift later pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeWindow {
    pub from: i64,
    pub to: i64,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_id: Option<String>,
}

/// Position in a dictionary table ordered by `(update_time, id)`.
///
/// The first page starts at the watermark with no `after_id`; later pages
/// resume after the last row received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullCursor {
    pub updated_after: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_id: Option<String>,
}

impl PullCursor {
    pub fn starting_at(watermark: i64) -> Self {
        Self {
            updated_after: watermark,
            after_id: None,
        }
    }

    pub fn after(update_time: i64, id: &str) -> Self {
        Self {
            updated_after: update_time,
            after_id: Some(id.to_string()),
        }
    }
}

/// Remote end of the sync protocol.
pub trait SyncApi: Send + Sync {
    /// Whether requests carry a user credential.
    fn is_authenticated(&self) -> bool;

    /// Fetch rows of `table` past `cursor`, oldest first.
    fn pull_page<T>(
        &self,
        table: &'static str,
        cursor: &PullCursor,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<T>, SyncError>> + Send
    where
        T: DeserializeOwned + Send;

    /// Send locally changed entries and receive the server's changes in
    /// `window`.
    fn exchange_entries(
        &self,
        entries: &[WordBookEntry],
        window: &ExchangeWindow,
    ) -> impl Future<Output = Result<Vec<WordBookEntry>, SyncError>> + Send;

    /// Send the local settings and receive the ones the server keeps.
    fn exchange_settings(
        &self,
        settings: &UserSettings,
    ) -> impl Future<Output = Result<UserSettings, SyncError>> + Send;
}

/// `SyncApi` over HTTP.
#[derive(Clone)]
pub struct HttpSyncApi {
    client: Client,
    backend_url: String,
    token: Option<String>,
}

impl HttpSyncApi {
    pub fn new(backend_url: &str, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            backend_url: backend_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Check if backend is reachable.
    pub async fn check_connectivity(&self) -> Result<bool, SyncError> {
        let url = format!("{}/health", self.backend_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => Err(SyncError::Network(e.to_string())),
        }
    }

    fn sync_url(&self, table: &str) -> String {
        format!("{}/api/sync/{}", self.backend_url, table)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl SyncApi for HttpSyncApi {
    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    async fn pull_page<T>(
        &self,
        table: &'static str,
        cursor: &PullCursor,
        limit: usize,
    ) -> Result<Vec<T>, SyncError>
    where
        T: DeserializeOwned + Send,
    {
        let request = self
            .client
            .get(self.sync_url(table))
            .query(cursor)
            .query(&[("limit", limit)]);

        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        read_json(resp).await
    }

    async fn exchange_entries(
        &self,
        entries: &[WordBookEntry],
        window: &ExchangeWindow,
    ) -> Result<Vec<WordBookEntry>, SyncError> {
        if self.token.is_none() {
            return Err(SyncError::NotAuthenticated);
        }

        let request = self
            .client
            .post(self.sync_url("WordBookEntry"))
            .query(window)
            .json(entries);

        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        read_json(resp).await
    }

    async fn exchange_settings(&self, settings: &UserSettings) -> Result<UserSettings, SyncError> {
        if self.token.is_none() {
            return Err(SyncError::NotAuthenticated);
        }

        let request = self.client.post(self.sync_url("UserSettings")).json(settings);
        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        read_json(resp).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, SyncError> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        return Err(SyncError::Backend { status, message });
    }

    resp.json()
        .await
        .map_err(|e| SyncError::Parse(e.to_string()))
}
