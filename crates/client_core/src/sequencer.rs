//! Automated test sequencer: timed waypoint sweeps over one servo or the
//! whole arm, strictly sequential, cancellable between steps.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::domain::{LogSeverity, ServoChannel, ServoConfig};

use crate::{ConsoleClient, ConsoleEvent};

/// Center angle every sweep returns to between the safe extremes.
const SWEEP_CENTER: i32 = 90;

/// Waypoints per servo sweep.
pub const SWEEP_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestTarget {
    One(ServoChannel),
    All,
}

impl std::fmt::Display for TestTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestTarget::One(channel) => write!(f, "servo {channel}"),
            TestTarget::All => write!(f, "all servos"),
        }
    }
}

/// Observable snapshot of a running sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRun {
    pub target: TestTarget,
    pub step_index: usize,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Completed,
    /// Cancelled by an emergency stop before the sweep finished.
    Aborted,
    /// Refused up front: another sequence was active, or the channel is
    /// not configured.
    NotStarted,
}

/// Book-keeping for the sequence in flight. The cancellation flag is
/// shared with `emergency_stop`, which may trip it from another task.
pub(crate) struct ActiveTestRun {
    pub(crate) target: TestTarget,
    pub(crate) step_index: usize,
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl ActiveTestRun {
    pub(crate) fn snapshot(&self) -> TestRun {
        TestRun {
            target: self.target,
            step_index: self.step_index,
            running: true,
        }
    }
}

/// The fixed sweep for one servo: center, safe minimum, center, safe
/// maximum, center.
pub fn sweep_waypoints(config: &ServoConfig) -> [i32; SWEEP_LEN] {
    [
        SWEEP_CENTER,
        config.safe_min,
        SWEEP_CENTER,
        config.safe_max,
        SWEEP_CENTER,
    ]
}

impl ConsoleClient {
    /// Sweeps one servo through its safety envelope. Each waypoint is
    /// preceded by the settle delay (the first included) and the next
    /// command is only issued after the previous response was observed
    /// and logged.
    pub async fn run_servo_test(&self, channel: ServoChannel) -> TestOutcome {
        let Some(cancelled) = self.begin_test(TestTarget::One(channel)).await else {
            return TestOutcome::NotStarted;
        };
        let outcome = self.sweep_servo(channel, &cancelled, 0).await;
        self.finish_test(outcome).await;
        outcome
    }

    /// Runs the single-servo sweep for every configured servo, in
    /// configuration order, with a pause between servos. One servo moves
    /// at a time; waypoints of two servos are never interleaved.
    pub async fn run_full_test(&self) -> TestOutcome {
        let Some(cancelled) = self.begin_test(TestTarget::All).await else {
            return TestOutcome::NotStarted;
        };
        let channels: Vec<ServoChannel> = self
            .config
            .servos
            .iter()
            .map(|config| config.channel)
            .collect();
        self.log(
            LogSeverity::Info,
            format!("testing all {} servos", channels.len()),
        )
        .await;

        let mut outcome = TestOutcome::Completed;
        for (index, channel) in channels.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.inter_servo_pause).await;
            }
            if cancelled.load(Ordering::SeqCst) {
                outcome = TestOutcome::Aborted;
                break;
            }
            outcome = self
                .sweep_servo(*channel, &cancelled, index * SWEEP_LEN)
                .await;
            if outcome != TestOutcome::Completed {
                break;
            }
        }

        if outcome == TestOutcome::Completed {
            self.log(LogSeverity::Success, "full arm test complete").await;
        }
        self.finish_test(outcome).await;
        outcome
    }

    async fn sweep_servo(
        &self,
        channel: ServoChannel,
        cancelled: &AtomicBool,
        step_offset: usize,
    ) -> TestOutcome {
        // begin_test already validated the channel.
        let Some(config) = self.servo_config(channel).cloned() else {
            return TestOutcome::NotStarted;
        };
        self.log(
            LogSeverity::Info,
            format!("testing servo {channel} ({})", config.name),
        )
        .await;

        for (index, angle) in sweep_waypoints(&config).into_iter().enumerate() {
            if cancelled.load(Ordering::SeqCst) {
                return TestOutcome::Aborted;
            }
            tokio::time::sleep(self.config.settle_delay).await;
            // Re-check after the delay: an emergency stop during the
            // settle window must not be followed by this waypoint.
            if cancelled.load(Ordering::SeqCst) {
                return TestOutcome::Aborted;
            }
            self.advance_test_step(step_offset + index).await;
            // Failures are logged by the dispatcher; the sweep keeps going.
            let _ = self.set_servo_angle(channel, angle).await;
        }

        self.log(
            LogSeverity::Success,
            format!("servo {channel} test complete"),
        )
        .await;
        TestOutcome::Completed
    }

    /// Claims the single test slot. `None` (with a logged error) when a
    /// sequence is already active or the channel is not configured.
    async fn begin_test(&self, target: TestTarget) -> Option<Arc<AtomicBool>> {
        if let TestTarget::One(channel) = target {
            if self.servo_config(channel).is_none() {
                self.log(
                    LogSeverity::Error,
                    format!("servo {channel} is not configured; test refused"),
                )
                .await;
                return None;
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut inner = self.inner.lock().await;
            if inner.active_test.is_some() {
                drop(inner);
                self.log(LogSeverity::Error, "a test sequence is already running")
                    .await;
                return None;
            }
            inner.active_test = Some(ActiveTestRun {
                target,
                step_index: 0,
                cancelled: Arc::clone(&cancelled),
            });
        }
        let _ = self.events.send(ConsoleEvent::TestStateChanged(Some(TestRun {
            target,
            step_index: 0,
            running: true,
        })));
        Some(cancelled)
    }

    async fn finish_test(&self, outcome: TestOutcome) {
        {
            let mut inner = self.inner.lock().await;
            inner.active_test = None;
        }
        let _ = self.events.send(ConsoleEvent::TestStateChanged(None));
        if outcome == TestOutcome::Aborted {
            self.log(LogSeverity::Info, "test sequence aborted by emergency stop")
                .await;
        }
    }

    async fn advance_test_step(&self, step_index: usize) {
        let snapshot = {
            let mut inner = self.inner.lock().await;
            let Some(run) = inner.active_test.as_mut() else {
                return;
            };
            run.step_index = step_index;
            run.snapshot()
        };
        let _ = self
            .events
            .send(ConsoleEvent::TestStateChanged(Some(snapshot)));
    }
}

#[cfg(test)]
#[path = "tests/sequencer_tests.rs"]
mod tests;
