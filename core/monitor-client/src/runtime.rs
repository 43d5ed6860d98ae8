//! Single-task event loop around the session coordinator.
//!
//! All coordinator state is touched from `run` only. Control requests, the
//! telemetry connection, the stream probe and timers run as tasks that report
//! back through one unbounded queue of [`Input`]s.

use blinkrise_core::{
    AlarmDriver, AlarmSink, ControlAction, Effect, Input, SessionCoordinator, SessionView,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::control_client::ControlClient;
use crate::stream_probe::StreamProbe;
use crate::telemetry::{ChannelObserver, TelemetryChannel};

pub struct Runtime<C, T, P, A>
where
    C: ControlClient + 'static,
    T: TelemetryChannel,
    P: StreamProbe,
    A: AlarmSink,
{
    coordinator: SessionCoordinator,
    control: Arc<C>,
    channel: T,
    probe: P,
    alarm: AlarmDriver<A>,
    inputs: UnboundedSender<Input>,
    queue: UnboundedReceiver<Input>,
    control_tasks: Vec<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl<C, T, P, A> Runtime<C, T, P, A>
where
    C: ControlClient + 'static,
    T: TelemetryChannel,
    P: StreamProbe,
    A: AlarmSink,
{
    pub fn new(
        coordinator: SessionCoordinator,
        control: C,
        channel: T,
        probe: P,
        alarm: A,
        shutdown_timeout: Duration,
    ) -> Self {
        let (inputs, queue) = mpsc::unbounded_channel();
        Self {
            coordinator,
            control: Arc::new(control),
            channel,
            probe,
            alarm: AlarmDriver::new(alarm),
            inputs,
            queue,
            control_tasks: Vec::new(),
            shutdown_timeout,
        }
    }

    /// Handle for operator input and signal handlers.
    pub fn sender(&self) -> UnboundedSender<Input> {
        self.inputs.clone()
    }

    /// Runs until teardown. `on_view` sees the initial view and every change.
    /// Returns the final view and the alarm sink.
    pub async fn run<F>(mut self, mut on_view: F) -> (SessionView, A)
    where
        F: FnMut(&SessionView),
    {
        let mut last = self.coordinator.view();
        on_view(&last);

        while let Some(input) = self.queue.recv().await {
            self.step(input);

            let view = self.coordinator.view();
            if view != last {
                on_view(&view);
                last = view;
            }
            if self.coordinator.is_torn_down() {
                break;
            }
        }

        self.finish().await;
        let Runtime { alarm, .. } = self;
        (last, alarm.into_sink())
    }

    fn step(&mut self, input: Input) {
        for effect in self.coordinator.handle(input) {
            self.execute(effect);
        }
        // Failures are logged by the driver and never fatal.
        let _ = self.alarm.apply(self.coordinator.view().telemetry.alarm_on);
    }

    fn execute(&mut self, effect: Effect) {
        debug!(effect = ?effect, "Executing effect");
        match effect {
            Effect::CloseChannel { .. } => self.channel.close(),
            Effect::CloseStream { .. } => self.probe.cancel(),
            Effect::SendControl { ticket, action } => {
                let control = Arc::clone(&self.control);
                let inputs = self.inputs.clone();
                let task = tokio::spawn(async move {
                    let result = match action {
                        ControlAction::Start => control.start().await,
                        ControlAction::Stop => control.stop().await,
                    };
                    let _ = inputs.send(Input::ControlCompleted {
                        ticket,
                        action,
                        result,
                    });
                });
                self.control_tasks.retain(|task| !task.is_finished());
                self.control_tasks.push(task);
            }
            Effect::OpenChannel { generation } => self
                .channel
                .open(ChannelObserver::new(generation, self.inputs.clone())),
            Effect::OpenStream { epoch, url } => {
                self.probe.watch(epoch, url, self.inputs.clone())
            }
            Effect::ArmReadinessTimeout { epoch, after } => {
                self.arm_timer(after, Input::ReadinessTimeout { epoch })
            }
            Effect::ArmGraceTimer { ticket, after } => {
                self.arm_timer(after, Input::GraceElapsed { ticket })
            }
        }
    }

    fn arm_timer(&self, after: Duration, input: Input) {
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = inputs.send(input);
        });
    }

    /// Lets the teardown stop request reach the backend before the process
    /// goes away.
    async fn finish(&mut self) {
        self.channel.close();
        self.probe.cancel();
        for task in self.control_tasks.drain(..) {
            if tokio::time::timeout(self.shutdown_timeout, task).await.is_err() {
                warn!("Timed out waiting for camera control request during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blinkrise_core::{
        AlarmError, ChannelEvent, ControlResult, SessionPhase, SessionSettings, StreamEpoch,
        TelemetrySnapshot,
    };
    use blinkrise_protocol::parse_telemetry;
    use chrono::Utc;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    struct FakeControl {
        log: Log,
        start_result: ControlResult,
    }

    #[async_trait]
    impl ControlClient for FakeControl {
        async fn send(&self, action: ControlAction) -> ControlResult {
            record(&self.log, action.as_str());
            tokio::time::sleep(Duration::from_millis(20)).await;
            match action {
                ControlAction::Start => self.start_result.clone(),
                ControlAction::Stop => ControlResult::success("Camera stopped and state reset."),
            }
        }
    }

    /// Delivers `frames` right after opening. `last_opened` keeps a clone of
    /// the observer so a test can push a frame after close.
    struct FakeChannel {
        log: Log,
        frames: Vec<&'static str>,
        live: Option<ChannelObserver>,
        last_opened: Arc<Mutex<Option<ChannelObserver>>>,
    }

    impl TelemetryChannel for FakeChannel {
        fn open(&mut self, observer: ChannelObserver) {
            record(&self.log, format!("open:{}", observer.generation()));
            observer.notify(ChannelEvent::Opened);
            for frame in &self.frames {
                observer.notify(ChannelEvent::Snapshot {
                    snapshot: parse_telemetry(frame).unwrap(),
                    received_at: Utc::now(),
                });
            }
            *self.last_opened.lock().unwrap() = Some(observer.clone());
            self.live = Some(observer);
        }

        fn close(&mut self) {
            if let Some(observer) = self.live.take() {
                observer.detach();
                record(&self.log, "close");
            }
        }
    }

    struct FakeProbe {
        log: Log,
        load: bool,
    }

    impl StreamProbe for FakeProbe {
        fn watch(&mut self, epoch: StreamEpoch, url: String, inputs: UnboundedSender<Input>) {
            record(&self.log, format!("watch:{}", url));
            if self.load {
                let _ = inputs.send(Input::StreamLoaded { epoch });
            }
        }

        fn cancel(&mut self) {}
    }

    #[derive(Default)]
    struct FakeAlarm {
        plays: usize,
        pauses: usize,
        unavailable: bool,
    }

    impl AlarmSink for FakeAlarm {
        fn play(&mut self) -> Result<(), AlarmError> {
            self.plays += 1;
            if self.unavailable {
                return Err(AlarmError::Unavailable("no output device".to_string()));
            }
            Ok(())
        }

        fn pause(&mut self) {
            self.pauses += 1;
        }

        fn rewind(&mut self) {}
    }

    const DROWSY: &str =
        r#"{"ear":0.25,"blink":3,"status":"Drowsy","probability":0.81,"alarm_on":true}"#;

    fn runtime(
        log: &Log,
        start_result: ControlResult,
        frames: Vec<&'static str>,
        last_opened: Arc<Mutex<Option<ChannelObserver>>>,
        alarm: FakeAlarm,
    ) -> Runtime<FakeControl, FakeChannel, FakeProbe, FakeAlarm> {
        let settings = SessionSettings {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            grace_delay: Duration::from_millis(300),
            readiness_timeout: Duration::from_millis(2500),
        };
        Runtime::new(
            SessionCoordinator::new(settings),
            FakeControl {
                log: Arc::clone(log),
                start_result,
            },
            FakeChannel {
                log: Arc::clone(log),
                frames,
                live: None,
                last_opened,
            },
            FakeProbe {
                log: Arc::clone(log),
                load: true,
            },
            alarm,
            Duration::from_secs(1),
        )
    }

    fn schedule(inputs: &UnboundedSender<Input>, at_ms: u64, input: Input) {
        let inputs = inputs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(at_ms)).await;
            let _ = inputs.send(input);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn session_runs_and_teardown_stops_camera() {
        let log = Log::default();
        let runtime = runtime(
            &log,
            ControlResult::success("Camera stream started."),
            vec![DROWSY],
            Arc::default(),
            FakeAlarm::default(),
        );
        let inputs = runtime.sender();
        inputs.send(Input::Toggle).unwrap();
        schedule(&inputs, 1000, Input::Teardown);

        let mut views = Vec::new();
        let (last, alarm) = runtime.run(|view| views.push(view.clone())).await;

        assert_eq!(
            entries(&log),
            vec![
                "start",
                "open:0",
                "watch:http://127.0.0.1:8000/video_feed?key=1",
                "close",
                "stop"
            ]
        );
        assert!(views.iter().any(|view| view.phase == SessionPhase::On
            && view.telemetry.status == "Drowsy"
            && view.telemetry.alarm_on
            && !view.stream_loading));
        assert_eq!(last.phase, SessionPhase::Off);
        assert_eq!(last.telemetry, TelemetrySnapshot::video_off());
        assert_eq!(alarm.plays, 1);
        assert_eq!(alarm.pauses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_off_resets_after_grace_delay() {
        let log = Log::default();
        let last_opened: Arc<Mutex<Option<ChannelObserver>>> = Arc::default();
        let runtime = runtime(
            &log,
            ControlResult::success(""),
            vec![DROWSY],
            Arc::clone(&last_opened),
            FakeAlarm::default(),
        );
        let inputs = runtime.sender();
        inputs.send(Input::Toggle).unwrap();
        schedule(&inputs, 1000, Input::Toggle);
        schedule(&inputs, 3000, Input::Teardown);

        // A frame from the closed connection, arriving mid-grace.
        let late_delivered = Arc::new(Mutex::new(None));
        {
            let last_opened = Arc::clone(&last_opened);
            let late_delivered = Arc::clone(&late_delivered);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1100)).await;
                let observer = last_opened.lock().unwrap().clone().expect("opened");
                let delivered = observer.notify(ChannelEvent::Snapshot {
                    snapshot: parse_telemetry(DROWSY).unwrap(),
                    received_at: Utc::now(),
                });
                *late_delivered.lock().unwrap() = Some(delivered);
            });
        }

        let mut views = Vec::new();
        let (_, alarm) = runtime.run(|view| views.push(view.clone())).await;

        let calls: Vec<String> = entries(&log)
            .into_iter()
            .filter(|entry| entry == "start" || entry == "stop" || entry == "close")
            .collect();
        assert_eq!(calls, vec!["start", "close", "stop", "stop"]);
        assert_eq!(*late_delivered.lock().unwrap(), Some(false));

        let stopping = views
            .iter()
            .position(|view| view.phase == SessionPhase::On && view.busy)
            .expect("stopping view");
        let reset = views[stopping + 1..]
            .iter()
            .position(|view| view.phase == SessionPhase::Off)
            .map(|offset| stopping + 1 + offset)
            .expect("reset view");
        assert_eq!(views[reset].telemetry, TelemetrySnapshot::video_off());
        assert_eq!(views[reset].error, None);
        assert!(views[reset..]
            .iter()
            .all(|view| view.telemetry == TelemetrySnapshot::video_off()));
        assert_eq!(alarm.plays, 1);
        assert_eq!(alarm.pauses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_surfaces_error_and_keeps_channel_closed() {
        let log = Log::default();
        let runtime = runtime(
            &log,
            ControlResult::failed("camera busy"),
            Vec::new(),
            Arc::default(),
            FakeAlarm::default(),
        );
        let inputs = runtime.sender();
        inputs.send(Input::Toggle).unwrap();
        schedule(&inputs, 500, Input::Teardown);

        let mut views = Vec::new();
        runtime.run(|view| views.push(view.clone())).await;

        assert!(views.iter().any(|view| view.phase == SessionPhase::Off
            && view
                .error
                .as_ref()
                .map(|err| err.to_string() == "Camera start failed: camera busy")
                .unwrap_or(false)));
        assert!(!entries(&log).iter().any(|entry| entry.starts_with("open")));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_alarm_is_tried_once_while_flag_stays_raised() {
        let log = Log::default();
        let runtime = runtime(
            &log,
            ControlResult::success(""),
            vec![DROWSY, DROWSY, DROWSY],
            Arc::default(),
            FakeAlarm {
                unavailable: true,
                ..FakeAlarm::default()
            },
        );
        let inputs = runtime.sender();
        inputs.send(Input::Toggle).unwrap();
        schedule(&inputs, 500, Input::Teardown);

        let (last, alarm) = runtime.run(|_| {}).await;

        assert_eq!(alarm.plays, 1);
        assert_eq!(alarm.pauses, 0);
        assert_eq!(last.phase, SessionPhase::Off);
    }
}
