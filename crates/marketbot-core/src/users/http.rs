//! Marketplace backend user lookup over HTTP.

use super::{LookupError, User, UserDirectory};
use crate::update::Identity;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client as HttpClient, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

/// [`UserDirectory`] backed by the marketplace REST API.
///
/// Issues `GET {base_url}/users/telegram/{identity}`; the backend answers
/// `404` for unknown users.
#[derive(Clone)]
pub struct HttpUserDirectory {
    client: HttpClient,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpUserDirectory {
    /// Create a directory client for `base_url`.
    ///
    /// `request_timeout` caps the whole HTTP exchange. The auth gate applies
    /// its own lookup timeout on top of this.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Transport` if `base_url` is not an absolute
    /// http(s) URL or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, LookupError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| LookupError::Transport(format!("Invalid backend URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(LookupError::Transport(format!(
                "Backend URL {base_url} cannot carry a path"
            )));
        }

        let client = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LookupError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    /// Lookup URL for `identity`, with the identity percent-encoded as a
    /// single path segment.
    fn user_url(&self, identity: &Identity) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["users", "telegram", identity.as_str()]);
        }
        url
    }
}

/// Map a backend response to a lookup result.
fn decode_response(status: StatusCode, body: &str) -> Result<Option<User>, LookupError> {
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(LookupError::Status(status.as_u16()));
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| LookupError::Decode(e.to_string()))
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn find_user_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<User>, LookupError> {
        let url = self.user_url(identity);
        let mut request = self.client.get(url);

        if let Some(token) = &self.api_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        debug!(identity = %identity, status = status.as_u16(), "User lookup answered");
        decode_response(status, &body)
    }
}
