//! Drives the audible alarm from the telemetry alarm flag.

use tracing::{debug, warn};

use crate::error::AlarmError;

/// Audio output controlled by [`AlarmDriver`].
pub trait AlarmSink {
    fn play(&mut self) -> Result<(), AlarmError>;
    fn pause(&mut self);
    /// Moves playback back to the start of the sound.
    fn rewind(&mut self);
}

/// Edge-triggered: only flag changes reach the sink.
pub struct AlarmDriver<S: AlarmSink> {
    sink: S,
    playing: bool,
    /// Set when `play` failed for the current raised flag.
    failed: bool,
}

impl<S: AlarmSink> AlarmDriver<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            playing: false,
            failed: false,
        }
    }

    /// A failed start is logged and returned once; the driver stays silent
    /// until the flag drops, and the next rising edge tries again.
    pub fn apply(&mut self, alarm_on: bool) -> Result<(), AlarmError> {
        if !alarm_on {
            self.failed = false;
        }
        match (self.playing, alarm_on) {
            (false, true) if self.failed => Ok(()),
            (false, true) => match self.sink.play() {
                Ok(()) => {
                    debug!("Alarm started");
                    self.playing = true;
                    Ok(())
                }
                Err(err) => {
                    warn!(error = %err, "Alarm play error");
                    self.failed = true;
                    Err(err)
                }
            },
            (true, false) => {
                self.sink.pause();
                self.sink.rewind();
                self.playing = false;
                debug!("Alarm stopped");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<&'static str>,
        fail_play: bool,
    }

    impl AlarmSink for RecordingSink {
        fn play(&mut self) -> Result<(), AlarmError> {
            self.calls.push("play");
            if self.fail_play {
                return Err(AlarmError::Unavailable("no output device".to_string()));
            }
            Ok(())
        }

        fn pause(&mut self) {
            self.calls.push("pause");
        }

        fn rewind(&mut self) {
            self.calls.push("rewind");
        }
    }

    #[test]
    fn repeated_flags_start_and_stop_once() {
        let mut driver = AlarmDriver::new(RecordingSink::default());
        for flag in [false, true, true, false] {
            driver.apply(flag).expect("apply");
        }

        assert_eq!(driver.sink().calls, vec!["play", "pause", "rewind"]);
        assert!(!driver.is_playing());
    }

    #[test]
    fn double_stop_is_harmless() {
        let mut driver = AlarmDriver::new(RecordingSink::default());
        driver.apply(false).expect("first stop");
        driver.apply(false).expect("second stop");

        assert!(driver.sink().calls.is_empty());
    }

    #[test]
    fn failed_play_is_reported_once_per_rising_edge() {
        let mut driver = AlarmDriver::new(RecordingSink {
            fail_play: true,
            ..RecordingSink::default()
        });

        assert!(driver.apply(true).is_err());
        assert!(!driver.is_playing());
        assert!(driver.apply(true).is_ok());
        assert!(driver.apply(true).is_ok());
        assert_eq!(driver.sink().calls, vec!["play"]);

        driver.apply(false).expect("lower flag");
        assert!(driver.apply(true).is_err());
        assert_eq!(driver.sink().calls, vec!["play", "play"]);
    }
}
