//! Reqwest implementation of the [`SessionApi`] port.

use std::time::Duration;

use async_trait::async_trait;
use flashtalk_core::{
    EngineSettings, FrameByteStream, InitSessionRequest, InitSessionResponse, SessionApi,
    SessionId, StreamKind, TransportError,
};
use futures_util::TryStreamExt;
use tracing::debug;
use url::Url;

use crate::error::StreamError;

// ============================================================================
// HTTP Session API
// ============================================================================

/// Session API client over HTTP.
///
/// Streaming GETs have no overall timeout: a generation may legitimately
/// stream for minutes. Only establishing the connection is bounded.
#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl HttpSessionApi {
    /// Build a client from validated settings.
    pub fn new(settings: &EngineSettings) -> Result<Self, StreamError> {
        let raw = settings.effective_api_base_url();
        let base_url = Url::parse(&raw).map_err(|e| StreamError::InvalidBaseUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StreamError::InvalidBaseUrl {
                url: raw,
                reason: "URL cannot carry a path".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(
                settings.effective_connect_timeout_secs(),
            ))
            .build()
            .map_err(|e| StreamError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            auth_token: settings.auth_token.clone(),
            request_timeout: Duration::from_secs(settings.effective_request_timeout_secs()),
        })
    }

    /// `{base}/session/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("session").extend(segments);
        }
        url
    }

    /// Attach optional bearer authentication.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<reqwest::Response, TransportError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

fn network_error(error: reqwest::Error) -> TransportError {
    if error.is_decode() {
        TransportError::InvalidResponse(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn init_session(
        &self,
        request: InitSessionRequest,
    ) -> Result<InitSessionResponse, TransportError> {
        let url = self.endpoint(&["init"]);
        debug!(%url, context_id = %request.context_id, voice = request.voice, "Initialising session");

        let builder = self
            .client
            .post(url.as_str())
            .timeout(self.request_timeout)
            .json(&request);
        let response = self.send(builder, &url).await?;

        response
            .json::<InitSessionResponse>()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }

    async fn open_stream(
        &self,
        session_id: &SessionId,
        kind: StreamKind,
    ) -> Result<FrameByteStream, TransportError> {
        let leaf = match kind {
            StreamKind::Live => "stream",
            StreamKind::Recovery => "status",
        };
        let url = self.endpoint(&[session_id.as_str(), leaf]);
        debug!(%url, %session_id, kind = kind.as_str(), "Opening stream");

        let builder = self
            .client
            .get(url.as_str())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
        let response = self.send(builder, &url).await?;

        Ok(Box::pin(response.bytes_stream().map_err(network_error)))
    }

    async fn interrupt(&self, session_id: &SessionId) -> Result<(), TransportError> {
        let url = self.endpoint(&[session_id.as_str(), "interrupt"]);
        debug!(%url, %session_id, "Requesting interrupt");

        let builder = self.client.post(url.as_str()).timeout(self.request_timeout);
        self.send(builder, &url).await?;
        Ok(())
    }
}
