//! Control requests to the backend's camera endpoint.
//!
//! Every call resolves to a [`ControlResult`]; transport errors are folded
//! into `NetworkError` rather than returned.

use async_trait::async_trait;
use blinkrise_core::ControlResult;
use blinkrise_protocol::{control_url, ControlAction};
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait ControlClient: Send + Sync {
    async fn send(&self, action: ControlAction) -> ControlResult;

    async fn start(&self) -> ControlResult {
        self.send(ControlAction::Start).await
    }

    async fn stop(&self) -> ControlResult {
        self.send(ControlAction::Stop).await
    }
}

pub struct HttpControlClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpControlClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ControlClient for HttpControlClient {
    async fn send(&self, action: ControlAction) -> ControlResult {
        let url = match control_url(&self.base_url, action) {
            Ok(url) => url,
            Err(err) => return ControlResult::network_error(err),
        };

        debug!(action = action.as_str(), url = %url, "Sending camera control");
        let response = match self.http.post(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(action = action.as_str(), error = %err, "Camera control request failed");
                return ControlResult::network_error(err);
            }
        };

        let http_ok = response.status().is_success();
        match response.bytes().await {
            Ok(body) => ControlResult::from_reply(http_ok, &body),
            Err(err) => ControlResult::network_error(err),
        }
    }
}
