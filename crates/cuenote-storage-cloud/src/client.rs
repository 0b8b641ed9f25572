use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cuenote_storage_core::{CloudStore, StorageError, StoredVideoData};
use reqwest::Client as HttpClient;
use tracing::{debug, instrument, warn};

/// REST client for the cuenote sync service.
///
/// Talks to a notes sync endpoint over HTTPS. Video payloads are
/// exchanged as JSON; a bearer token authenticates every request when
/// one is configured.
///
/// Availability is probed once via [`initialize`](CloudClient::initialize)
/// and cached. A client that never initialized successfully reports
/// itself unavailable and the sync layer routes around it.
pub struct CloudClient {
    http_client: HttpClient,
    base_url: String,
    api_token: Option<String>,
    available: AtomicBool,
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient")
            .field("base_url", &self.base_url)
            .field("has_token", &self.api_token.is_some())
            .field("available", &self.available.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl CloudClient {
    /// Create a new client for the given service URL.
    ///
    /// Trailing slashes on `base_url` are stripped so path joins stay
    /// predictable.
    pub fn new(base_url: String, api_token: Option<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            available: AtomicBool::new(false),
        }
    }

    fn videos_url(&self) -> String {
        format!("{}/v1/videos", self.base_url)
    }

    fn video_url(&self, video_id: &str) -> String {
        format!("{}/v1/videos/{}", self.base_url, urlencoding::encode(video_id))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl CloudStore for CloudClient {
    fn backend_name(&self) -> &'static str {
        "cloud"
    }

    /// Probe the service health endpoint and record the result.
    ///
    /// An unreachable or unhealthy service is not an error. The caller
    /// gets `false` and the client stays in the unavailable state.
    #[instrument(skip(self), level = "debug")]
    async fn initialize(&self) -> Result<bool, StorageError> {
        let url = format!("{}/v1/health", self.base_url);

        let healthy = match self.authorize(self.http_client.get(&url)).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(
                    "cloud health check failed with status {}",
                    response.status()
                );
                false
            }
            Err(e) => {
                warn!("cloud health check unreachable: {}", e);
                false
            }
        };

        self.available.store(healthy, Ordering::Relaxed);
        debug!("cloud initialize: available={}", healthy);
        Ok(healthy)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    #[instrument(skip(self, data), level = "debug", fields(video_id = %data.video_id))]
    async fn save_video_notes(&self, data: &StoredVideoData) -> Result<(), StorageError> {
        let url = self.video_url(&data.video_id);

        let response = self
            .authorize(self.http_client.put(&url))
            .json(data)
            .send()
            .await
            .map_err(|e| StorageError::Network(format!("cloud PUT request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Network(format!(
                "cloud PUT failed with status {}: {}",
                status, text
            )));
        }

        debug!("cloud PUT {} ({} notes)", data.video_id, data.notes.len());
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn load_video_notes(
        &self,
        video_id: &str,
    ) -> Result<Option<StoredVideoData>, StorageError> {
        let url = self.video_url(video_id);

        let response = self
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| StorageError::Network(format!("cloud GET request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("cloud video not found: {}", video_id);
            return Ok(None);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Network(format!(
                "cloud GET failed with status {}: {}",
                status, text
            )));
        }

        let data = response
            .json::<StoredVideoData>()
            .await
            .map_err(|e| StorageError::Serialization(format!("cloud GET decode failed: {}", e)))?;

        debug!("cloud GET {} ({} notes)", video_id, data.notes.len());
        Ok(Some(data))
    }

    #[instrument(skip(self), level = "debug")]
    async fn load_all_videos(&self) -> Result<Vec<StoredVideoData>, StorageError> {
        let url = self.videos_url();

        let response = self
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| StorageError::Network(format!("cloud LIST request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Network(format!(
                "cloud LIST failed with status {}: {}",
                status, text
            )));
        }

        let videos = response
            .json::<Vec<StoredVideoData>>()
            .await
            .map_err(|e| StorageError::Serialization(format!("cloud LIST decode failed: {}", e)))?;

        debug!("cloud LIST returned {} videos", videos.len());
        Ok(videos)
    }

    /// Delete one video. A 404 means it was already gone, which is fine.
    #[instrument(skip(self), level = "debug")]
    async fn delete_video(&self, video_id: &str) -> Result<(), StorageError> {
        let url = self.video_url(video_id);

        let response = self
            .authorize(self.http_client.delete(&url))
            .send()
            .await
            .map_err(|e| StorageError::Network(format!("cloud DELETE request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Network(format!(
                "cloud DELETE failed with status {}: {}",
                status, text
            )));
        }

        debug!("cloud DELETE {}", video_id);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_all_notes(&self) -> Result<(), StorageError> {
        let url = self.videos_url();

        let response = self
            .authorize(self.http_client.delete(&url))
            .send()
            .await
            .map_err(|e| {
                StorageError::Network(format!("cloud DELETE ALL request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Network(format!(
                "cloud DELETE ALL failed with status {}: {}",
                status, text
            )));
        }

        debug!("cloud DELETE ALL done");
        Ok(())
    }

    /// Push a batch of videos in one request.
    #[instrument(skip(self, videos), level = "debug", fields(count = videos.len()))]
    async fn sync_to_cloud(&self, videos: &[StoredVideoData]) -> Result<(), StorageError> {
        if videos.is_empty() {
            return Ok(());
        }

        let url = format!("{}/batch", self.videos_url());

        let response = self
            .authorize(self.http_client.post(&url))
            .json(&videos)
            .send()
            .await
            .map_err(|e| StorageError::Network(format!("cloud BATCH request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Network(format!(
                "cloud BATCH failed with status {}: {}",
                status, text
            )));
        }

        debug!("cloud BATCH pushed {} videos", videos.len());
        Ok(())
    }
}
