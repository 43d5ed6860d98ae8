//! Terminal-bell alarm sink.

use blinkrise_core::{AlarmError, AlarmSink};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

const DEFAULT_PERIOD: Duration = Duration::from_millis(800);

/// Rings BEL on stderr in a loop while playing.
pub struct BellAlarm {
    period: Duration,
    rings: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl BellAlarm {
    pub fn new() -> Self {
        Self::with_period(DEFAULT_PERIOD)
    }

    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            rings: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Rings since the last rewind.
    pub fn rings(&self) -> u64 {
        self.rings.load(Ordering::SeqCst)
    }
}

impl Default for BellAlarm {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmSink for BellAlarm {
    fn play(&mut self) -> Result<(), AlarmError> {
        if self.task.is_some() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| AlarmError::Unavailable(err.to_string()))?;

        let rings = Arc::clone(&self.rings);
        let period = self.period;
        self.task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let mut stderr = std::io::stderr();
                if let Err(err) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
                    warn!(error = %err, "Alarm bell write failed");
                    return;
                }
                rings.fetch_add(1, Ordering::SeqCst);
            }
        }));
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn rewind(&mut self) {
        self.rings.store(0, Ordering::SeqCst);
    }
}

impl Drop for BellAlarm {
    fn drop(&mut self) {
        self.pause();
    }
}
