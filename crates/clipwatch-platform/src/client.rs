use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clipwatch_core::{Credential, ClipwatchError, LiveRanking, RankedChannel, Result};
use clipwatch_credentials::CredentialStore;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error_classify::{classify_status, is_retryable_status};
use crate::PlatformClient;

#[derive(Debug, Clone, Deserialize)]
pub struct ClipMetadata {
    pub embed_url: String,
    pub thumbnail_url: String,
}

/// Twitch Helix client backed by a single user-scoped OAuth token.
///
/// The token lives behind an `RwLock` so a refresh triggered by a 401 cannot
/// race a concurrent request building its `Authorization` header (spec.md
/// §5 shared-resource policy).
pub struct TwitchPlatformClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    token: RwLock<String>,
    client_id: String,
    client_secret: String,
    api_base: String,
    auth_base: String,
}

impl TwitchPlatformClient {
    pub async fn new(
        credentials: Arc<dyn CredentialStore>,
        client_id: String,
        client_secret: String,
        api_base: String,
        auth_base: String,
        timeout: Duration,
    ) -> Result<Self> {
        let initial = credentials.load().await?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClipwatchError::Fatal(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            credentials,
            token: RwLock::new(initial.access_token),
            client_id,
            client_secret,
            api_base,
            auth_base,
        })
    }

    async fn refresh_token(&self) -> Result<String> {
        let current = self.credentials.load().await?;

        info!("refreshing Twitch user access token");
        let resp = self
            .http
            .post(format!("{}/token", self.auth_base))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(classify_reqwest_err)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            warn!(status, "token refresh failed");
            return Err(ClipwatchError::Permanent(format!(
                "token refresh failed: {status} {body}"
            )));
        }

        let refreshed: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| ClipwatchError::Permanent(format!("malformed refresh response: {e}")))?;

        let updated = Credential {
            access_token: refreshed.access_token.clone(),
            refresh_token: refreshed.refresh_token.unwrap_or(current.refresh_token),
            scopes: current.scopes,
            updated_at: chrono::Utc::now(),
        };
        self.credentials.save(&updated).await?;
        *self.token.write().await = updated.access_token.clone();

        Ok(updated.access_token)
    }

    async fn current_token(&self) -> String {
        self.token.read().await.clone()
    }

    fn helix_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
}

fn classify_reqwest_err(e: reqwest::Error) -> ClipwatchError {
    if e.is_timeout() || e.is_connect() {
        ClipwatchError::Transient(format!("network error: {e}"))
    } else {
        ClipwatchError::Permanent(format!("request error: {e}"))
    }
}

#[async_trait]
impl PlatformClient for TwitchPlatformClient {
    async fn list_top_live(&self, n: u32) -> Result<LiveRanking> {
        let token = self.current_token().await;
        let url = self.helix_url("/streams");

        let mut resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .header("Client-Id", &self.client_id)
            .query(&[("first", n.to_string())])
            .send()
            .await
            .map_err(classify_reqwest_err)?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            let token = self.refresh_token().await?;
            resp = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .header("Client-Id", &self.client_id)
                .query(&[("first", n.to_string())])
                .send()
                .await
                .map_err(classify_reqwest_err)?;
        }

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: StreamsResponse = resp
            .json()
            .await
            .map_err(|e| ClipwatchError::Permanent(format!("malformed streams response: {e}")))?;

        let channels = body
            .data
            .into_iter()
            .enumerate()
            .map(|(idx, s)| RankedChannel {
                channel_id: s.user_id.parse().unwrap_or(0),
                login: s.user_login.to_lowercase(),
                rank: (idx + 1) as u32,
            })
            .collect();

        Ok(LiveRanking { channels })
    }

    async fn create_clip(&self, channel_id: u64) -> Result<String> {
        let token = self.current_token().await;
        let url = self.helix_url("/clips");

        let mut resp = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header("Client-Id", &self.client_id)
            .query(&[("broadcaster_id", channel_id.to_string())])
            .send()
            .await
            .map_err(classify_reqwest_err)?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            let token = self.refresh_token().await?;
            resp = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .header("Client-Id", &self.client_id)
                .query(&[("broadcaster_id", channel_id.to_string())])
                .send()
                .await
                .map_err(classify_reqwest_err)?;

            if resp.status() != StatusCode::ACCEPTED {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(ClipwatchError::Permanent(format!(
                    "create clip failed after token refresh: {status} {body}"
                )));
            }
        }

        if resp.status() != StatusCode::ACCEPTED {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: ClipsResponse = resp
            .json()
            .await
            .map_err(|e| ClipwatchError::Permanent(format!("malformed create-clip response: {e}")))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.id)
            .ok_or_else(|| ClipwatchError::Permanent("create clip accepted but no data".into()))
    }

    async fn get_clip(&self, clip_id: &str) -> Result<Option<ClipMetadata>> {
        let token = self.current_token().await;
        let url = self.helix_url("/clips");

        let mut resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .header("Client-Id", &self.client_id)
            .query(&[("id", clip_id)])
            .send()
            .await
            .map_err(classify_reqwest_err)?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            let token = self.refresh_token().await?;
            resp = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .header("Client-Id", &self.client_id)
                .query(&[("id", clip_id)])
                .send()
                .await
                .map_err(classify_reqwest_err)?;
        }

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            if is_retryable_status(status) {
                let body = resp.text().await.unwrap_or_default();
                return Err(classify_status(status, &body));
            }
            return Ok(None);
        }

        let body: GetClipResponse = resp
            .json()
            .await
            .map_err(|e| ClipwatchError::Permanent(format!("malformed get-clip response: {e}")))?;

        Ok(body.data.into_iter().next().map(|d| ClipMetadata {
            embed_url: d.embed_url,
            thumbnail_url: d.thumbnail_url,
        }))
    }
}

#[derive(Deserialize)]
struct StreamsResponse {
    data: Vec<StreamEntry>,
}

#[derive(Deserialize)]
struct StreamEntry {
    user_id: String,
    user_login: String,
}

#[derive(Deserialize)]
struct ClipsResponse {
    data: Vec<CreatedClip>,
}

#[derive(Deserialize)]
struct CreatedClip {
    id: String,
}

#[derive(Deserialize)]
struct GetClipResponse {
    data: Vec<GetClipEntry>,
}

#[derive(Deserialize)]
struct GetClipEntry {
    embed_url: String,
    thumbnail_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipwatch_credentials::MemoryCredentialStore;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential() -> Credential {
        Credential {
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
            scopes: vec!["chat:read".into(), "clips:edit".into()],
            updated_at: chrono::Utc::now(),
        }
    }

    async fn client_for(server: &MockServer) -> TwitchPlatformClient {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new(credential()));
        TwitchPlatformClient::new(
            store,
            "client-id".into(),
            "client-secret".into(),
            server.uri(),
            server.uri(),
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn list_top_live_ranks_from_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streams"))
            .and(header("Authorization", "Bearer at-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"user_id": "1", "user_login": "Alice"},
                    {"user_id": "2", "user_login": "Bob"},
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let ranking = client.list_top_live(2).await.unwrap();
        assert_eq!(ranking.channels[0].rank, 1);
        assert_eq!(ranking.channels[0].login, "alice");
        assert_eq!(ranking.channels[1].rank, 2);
    }

    #[tokio::test]
    async fn create_clip_returns_id_on_202() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/clips"))
            .and(query_param("broadcaster_id", "111"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "data": [{"id": "C1"}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let clip_id = client.create_clip(111).await.unwrap();
        assert_eq!(clip_id, "C1");
    }

    #[tokio::test]
    async fn create_clip_403_is_permanent_with_no_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/clips"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.create_clip(111).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn create_clip_503_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/clips"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.create_clip(111).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn get_clip_returns_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clips"))
            .and(query_param("id", "C1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embed_url": "e1", "thumbnail_url": "t1"}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let meta = client.get_clip("C1").await.unwrap().unwrap();
        assert_eq!(meta.embed_url, "e1");
        assert_eq!(meta.thumbnail_url, "t1");
    }
}
