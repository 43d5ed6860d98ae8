//! Telemetry channel: one WebSocket per session, receive-only.
//!
//! The connection task reports through a [`ChannelObserver`]. Closing the
//! channel detaches the observer before aborting the task, so nothing the
//! task does afterwards reaches the event loop.

use blinkrise_core::{ChannelEvent, ChannelGeneration, Input};
use blinkrise_protocol::parse_telemetry;
use chrono::Utc;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

pub trait TelemetryChannel {
    /// Opens a connection, replacing any existing one.
    fn open(&mut self, observer: ChannelObserver);

    /// Idempotent. No observer callback fires after this returns.
    fn close(&mut self);
}

#[derive(Clone)]
pub struct ChannelObserver {
    generation: ChannelGeneration,
    inputs: UnboundedSender<Input>,
    detached: Arc<AtomicBool>,
}

impl ChannelObserver {
    pub fn new(generation: ChannelGeneration, inputs: UnboundedSender<Input>) -> Self {
        Self {
            generation,
            inputs,
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> ChannelGeneration {
        self.generation
    }

    /// Returns false when the event was dropped.
    pub fn notify(&self, event: ChannelEvent) -> bool {
        if self.is_detached() {
            return false;
        }
        self.inputs
            .send(Input::Channel {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

struct ConnectionHandle {
    observer: ChannelObserver,
    task: JoinHandle<()>,
}

pub struct WsTelemetryChannel {
    url: String,
    connection: Option<ConnectionHandle>,
}

impl WsTelemetryChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: None,
        }
    }
}

impl TelemetryChannel for WsTelemetryChannel {
    fn open(&mut self, observer: ChannelObserver) {
        self.close();
        debug!(generation = %observer.generation(), url = %self.url, "Opening telemetry channel");
        let task = tokio::spawn(run_connection(self.url.clone(), observer.clone()));
        self.connection = Some(ConnectionHandle { observer, task });
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.observer.detach();
            connection.task.abort();
            debug!(generation = %connection.observer.generation(), "Telemetry channel closed");
        }
    }
}

impl Drop for WsTelemetryChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(url: String, observer: ChannelObserver) {
    let mut stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            observer.notify(ChannelEvent::Failed {
                reason: err.to_string(),
            });
            return;
        }
    };
    observer.notify(ChannelEvent::Opened);

    while let Some(message) = stream.next().await {
        let event = match message {
            Ok(Message::Text(text)) => decode(&text),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => decode(text),
                Err(err) => ChannelEvent::Malformed {
                    details: format!("telemetry payload is not UTF-8: {}", err),
                },
            },
            Ok(Message::Close(_)) => {
                observer.notify(ChannelEvent::Closed);
                return;
            }
            Ok(_) => continue,
            Err(err) => {
                observer.notify(ChannelEvent::Failed {
                    reason: err.to_string(),
                });
                return;
            }
        };
        if !observer.notify(event) {
            return;
        }
    }

    observer.notify(ChannelEvent::Closed);
}

fn decode(text: &str) -> ChannelEvent {
    match parse_telemetry(text) {
        Ok(snapshot) => ChannelEvent::Snapshot {
            snapshot,
            received_at: Utc::now(),
        },
        Err(err) => ChannelEvent::Malformed {
            details: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::timeout;

    const FRAME: &str =
        r#"{"ear":0.25,"blink":3,"status":"Drowsy","probability":0.81,"alarm_on":true}"#;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Input>) -> ChannelEvent {
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Input::Channel { event, .. })) => event,
            other => panic!("expected channel event, got {:?}", other),
        }
    }

    #[test]
    fn detached_observer_drops_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(ChannelGeneration(3), tx);

        assert!(observer.notify(ChannelEvent::Opened));
        observer.clone().detach();
        assert!(!observer.notify(ChannelEvent::Closed));

        assert_eq!(
            rx.try_recv().ok(),
            Some(Input::Channel {
                generation: ChannelGeneration(3),
                event: ChannelEvent::Opened
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_without_open_is_a_no_op() {
        let mut channel = WsTelemetryChannel::new("ws://127.0.0.1:9/ws/drowsiness");
        channel.close();
        channel.close();
    }

    #[tokio::test]
    async fn delivers_snapshots_and_reports_malformed_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws/drowsiness", listener.local_addr().unwrap());
        let (late_tx, late_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(FRAME.to_string())).await.unwrap();
            ws.send(Message::Text("{broken".to_string())).await.unwrap();
            let _ = late_rx.await;
            let _ = ws.send(Message::Text(FRAME.to_string())).await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channel = WsTelemetryChannel::new(url);
        channel.open(ChannelObserver::new(ChannelGeneration(0), tx));

        assert_eq!(next_event(&mut rx).await, ChannelEvent::Opened);
        match next_event(&mut rx).await {
            ChannelEvent::Snapshot { snapshot, .. } => {
                assert_eq!(snapshot.blink, 3);
                assert!(snapshot.alarm_on);
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
        assert!(matches!(
            next_event(&mut rx).await,
            ChannelEvent::Malformed { .. }
        ));

        channel.close();
        late_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_failure_is_reported_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws/drowsiness", listener.local_addr().unwrap());
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channel = WsTelemetryChannel::new(url);
        channel.open(ChannelObserver::new(ChannelGeneration(1), tx));

        assert!(matches!(
            next_event(&mut rx).await,
            ChannelEvent::Failed { .. }
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
