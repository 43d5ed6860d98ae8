//! Watches the image stream's load lifecycle.
//!
//! The first body chunk of a 2xx response counts as "loaded"; anything else is
//! a load error. Silence is left to the coordinator's readiness timeout.

use blinkrise_core::{Input, StreamEpoch};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

pub trait StreamProbe {
    /// Starts watching `url`, cancelling any previous watch.
    fn watch(&mut self, epoch: StreamEpoch, url: String, inputs: UnboundedSender<Input>);

    fn cancel(&mut self);
}

pub struct HttpStreamProbe {
    http: reqwest::Client,
    task: Option<JoinHandle<()>>,
}

impl HttpStreamProbe {
    /// No overall timeout: the stream never ends on its own.
    pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { http, task: None })
    }
}

impl StreamProbe for HttpStreamProbe {
    fn watch(&mut self, epoch: StreamEpoch, url: String, inputs: UnboundedSender<Input>) {
        self.cancel();
        let http = self.http.clone();
        self.task = Some(tokio::spawn(async move {
            let input = probe(&http, epoch, &url).await;
            let _ = inputs.send(input);
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HttpStreamProbe {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn probe(http: &reqwest::Client, epoch: StreamEpoch, url: &str) -> Input {
    debug!(epoch = %epoch, url = %url, "Probing video stream");
    let failed = |reason: String| Input::StreamFailed { epoch, reason };

    let mut response = match http.get(url).send().await {
        Ok(response) => response,
        Err(err) => return failed(err.to_string()),
    };
    if !response.status().is_success() {
        return failed(format!("HTTP {}", response.status()));
    }

    match response.chunk().await {
        Ok(Some(_)) => Input::StreamLoaded { epoch },
        Ok(None) => failed("stream ended before the first frame".to_string()),
        Err(err) => failed(err.to_string()),
    }
}
