//! Client seam for the third-party media host.
//!
//! Callers state the [`UploadIntent`] up front; the final response is turned
//! into an [`UploadOutcome`] of that intent instead of guessing from which
//! fields the host happened to return.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, multipart};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::chunker::ChunkRange;
use crate::config::MediaHostConfig;
use crate::error::{AppError, AppResult};

pub const UPLOAD_ID_HEADER: &str = "X-Unique-Upload-Id";
pub const CONTENT_RANGE_HEADER: &str = "Content-Range";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadIntent {
    Video,
    Image,
}

impl UploadIntent {
    pub fn resource_type(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChunkRequest {
    pub upload_id: String,
    pub intent: UploadIntent,
    pub range: ChunkRange,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EagerVariant {
    #[serde(default)]
    pub secure_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Raw JSON body returned by the host for a chunk or single-shot upload.
/// Intermediate chunk responses usually carry no `secure_url`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaHostResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eager: Vec<EagerVariant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum UploadOutcome {
    Video {
        secure_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_id: Option<String>,
        #[serde(default)]
        eager: Vec<EagerVariant>,
    },
    Image {
        secure_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_id: Option<String>,
    },
}

impl UploadOutcome {
    pub fn from_final(intent: UploadIntent, response: MediaHostResponse) -> AppResult<Self> {
        let secure_url = response
            .secure_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AppError::MediaHost {
                status: 200,
                body: "final upload response carried no secure_url".to_string(),
            })?;
        Ok(match intent {
            UploadIntent::Video => Self::Video {
                secure_url,
                public_id: response.public_id,
                eager: response.eager,
            },
            UploadIntent::Image => Self::Image {
                secure_url,
                public_id: response.public_id,
            },
        })
    }

    pub fn intent(&self) -> UploadIntent {
        match self {
            Self::Video { .. } => UploadIntent::Video,
            Self::Image { .. } => UploadIntent::Image,
        }
    }

    pub fn secure_url(&self) -> &str {
        match self {
            Self::Video { secure_url, .. } | Self::Image { secure_url, .. } => secure_url,
        }
    }
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload_chunk(&self, request: ChunkRequest) -> AppResult<MediaHostResponse>;

    async fn upload_data_url(
        &self,
        data_url: &str,
        intent: UploadIntent,
    ) -> AppResult<MediaHostResponse>;
}

/// Signature over the sorted `key=value` pairs followed by the API secret.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct HttpMediaHost {
    config: MediaHostConfig,
    client: Client,
}

impl HttpMediaHost {
    pub fn new(config: MediaHostConfig, timeout: Option<Duration>) -> AppResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            config,
            client: builder.build()?,
        })
    }

    pub fn upload_url(&self, intent: UploadIntent) -> String {
        format!(
            "{}/v1_1/{}/{}/upload",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            intent.resource_type()
        )
    }

    fn preset(&self, intent: UploadIntent) -> &str {
        match intent {
            UploadIntent::Video => &self.config.video_preset,
            UploadIntent::Image => &self.config.image_preset,
        }
    }

    fn base_form(&self, intent: UploadIntent) -> multipart::Form {
        let preset = self.preset(intent).to_string();
        match (&self.config.api_key, &self.config.api_secret) {
            (Some(api_key), Some(api_secret)) => {
                let timestamp = Utc::now().timestamp().to_string();
                let params = [
                    ("timestamp", timestamp.clone()),
                    ("upload_preset", preset.clone()),
                ];
                let signature = sign_params(&params, api_secret);
                multipart::Form::new()
                    .text("upload_preset", preset)
                    .text("timestamp", timestamp)
                    .text("api_key", api_key.clone())
                    .text("signature", signature)
            }
            _ => multipart::Form::new().text("upload_preset", preset),
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> AppResult<MediaHostResponse> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AppError::MediaHost {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(MediaHostResponse::default());
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MediaHost for HttpMediaHost {
    async fn upload_chunk(&self, request: ChunkRequest) -> AppResult<MediaHostResponse> {
        let mime = mime_guess::from_path(&request.file_name)
            .first_or_octet_stream()
            .to_string();
        let part = multipart::Part::bytes(request.bytes)
            .file_name(request.file_name.clone())
            .mime_str(&mime)?;
        let form = self.base_form(request.intent).part("file", part);

        debug!(
            upload_id = %request.upload_id,
            chunk = request.range.index,
            content_range = %request.range.content_range(),
            "sending chunk"
        );
        let builder = self
            .client
            .post(self.upload_url(request.intent))
            .header(UPLOAD_ID_HEADER, &request.upload_id)
            .header(CONTENT_RANGE_HEADER, request.range.content_range())
            .multipart(form);
        self.send(builder).await
    }

    async fn upload_data_url(
        &self,
        data_url: &str,
        intent: UploadIntent,
    ) -> AppResult<MediaHostResponse> {
        let form = self.base_form(intent).text("file", data_url.to_string());
        let builder = self.client.post(self.upload_url(intent)).multipart(form);
        self.send(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::{Path as AxumPath, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;

    use crate::chunker::plan_chunks;

    #[derive(Clone, Debug)]
    struct SeenRequest {
        resource: String,
        upload_id: Option<String>,
        content_range: Option<String>,
        body: Vec<u8>,
    }

    #[derive(Clone, Default)]
    struct FakeHost {
        seen: Arc<Mutex<Vec<SeenRequest>>>,
        fail: bool,
    }

    async fn fake_upload(
        State(host): State<FakeHost>,
        AxumPath((_cloud, resource)): AxumPath<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> impl IntoResponse {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let mut seen = host.seen.lock().unwrap();
        seen.push(SeenRequest {
            resource: resource.clone(),
            upload_id: header(UPLOAD_ID_HEADER),
            content_range: header(CONTENT_RANGE_HEADER),
            body: body.to_vec(),
        });
        if host.fail {
            return (StatusCode::BAD_GATEWAY, "host down".to_string());
        }
        let n = seen.len();
        let body = serde_json::json!({
            "secure_url": format!("https://cdn.test/{resource}/{n}"),
            "public_id": format!("asset-{n}"),
            "eager": [{"secure_url": format!("https://cdn.test/{resource}/{n}.m3u8")}],
        });
        (StatusCode::OK, body.to_string())
    }

    async fn spawn_fake_host(fail: bool) -> (String, Arc<Mutex<Vec<SeenRequest>>>) {
        let host = FakeHost {
            seen: Arc::default(),
            fail,
        };
        let seen = host.seen.clone();
        let app = Router::new()
            .route("/v1_1/{cloud}/{resource}/upload", post(fake_upload))
            .with_state(host);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    fn config(api_base: &str) -> MediaHostConfig {
        MediaHostConfig {
            api_base: api_base.to_string(),
            cloud_name: "demo".to_string(),
            api_key: None,
            api_secret: None,
            video_preset: "vp".to_string(),
            image_preset: "ip".to_string(),
        }
    }

    #[test]
    fn signature_sorts_params_and_appends_secret() {
        let params = [
            ("upload_preset", "image_preset".to_string()),
            ("timestamp", "1700000000".to_string()),
        ];
        assert_eq!(
            sign_params(&params, "secret"),
            "3021cdfdc1024d59a1a3259302bb78c74c6bde36"
        );
    }

    #[test]
    fn outcome_follows_intent_not_response_shape() {
        let response = MediaHostResponse {
            secure_url: Some("https://cdn/x".into()),
            public_id: None,
            eager: vec![EagerVariant {
                secure_url: "https://cdn/x.m3u8".into(),
                ..Default::default()
            }],
            done: Some(true),
        };
        let image = UploadOutcome::from_final(UploadIntent::Image, response.clone()).unwrap();
        assert_eq!(image.intent(), UploadIntent::Image);
        assert_eq!(image.secure_url(), "https://cdn/x");

        let video = UploadOutcome::from_final(UploadIntent::Video, response).unwrap();
        match video {
            UploadOutcome::Video { eager, .. } => assert_eq!(eager.len(), 1),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn final_response_without_url_is_an_error() {
        let err = UploadOutcome::from_final(UploadIntent::Video, MediaHostResponse::default())
            .unwrap_err();
        assert!(matches!(err, AppError::MediaHost { .. }));
    }

    #[tokio::test]
    async fn chunk_upload_sends_range_headers() {
        let (base, seen) = spawn_fake_host(false).await;
        let host = HttpMediaHost::new(config(&base), None).unwrap();
        let range = plan_chunks(12, 5).unwrap()[2];

        let response = host
            .upload_chunk(ChunkRequest {
                upload_id: "uqid-1".into(),
                intent: UploadIntent::Video,
                range,
                file_name: "clip.mp4".into(),
                bytes: b"kl".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(response.secure_url.as_deref(), Some("https://cdn.test/video/1"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].resource, "video");
        assert_eq!(seen[0].upload_id.as_deref(), Some("uqid-1"));
        assert_eq!(seen[0].content_range.as_deref(), Some("bytes 10-11/12"));
        let body = String::from_utf8_lossy(&seen[0].body);
        assert!(body.contains("name=\"upload_preset\""));
        assert!(body.contains("vp"));
        assert!(body.contains("filename=\"clip.mp4\""));
    }

    #[tokio::test]
    async fn signed_data_url_upload_carries_signature() {
        let (base, seen) = spawn_fake_host(false).await;
        let mut config = config(&base);
        config.api_key = Some("key".into());
        config.api_secret = Some("secret".into());
        let host = HttpMediaHost::new(config, Some(Duration::from_secs(5))).unwrap();

        let response = host
            .upload_data_url("data:image/jpeg;base64,AAAA", UploadIntent::Image)
            .await
            .unwrap();
        assert!(response.secure_url.is_some());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].resource, "image");
        let body = String::from_utf8_lossy(&seen[0].body);
        assert!(body.contains("name=\"signature\""));
        assert!(body.contains("name=\"api_key\""));
        assert!(body.contains("data:image/jpeg;base64,AAAA"));
    }

    #[tokio::test]
    async fn host_failure_surfaces_status_and_body() {
        let (base, _seen) = spawn_fake_host(true).await;
        let host = HttpMediaHost::new(config(&base), None).unwrap();
        let err = host
            .upload_data_url("data:image/png;base64,AA", UploadIntent::Image)
            .await
            .unwrap_err();
        match err {
            AppError::MediaHost { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "host down");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
