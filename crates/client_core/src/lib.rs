use std::sync::{atomic::Ordering, Arc};
use std::time::Duration;

use shared::{
    domain::{ConnectionState, LogEntry, LogSeverity, Servo, ServoChannel, ServoConfig},
    error::DeviceError,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::warn;

pub mod activity;
pub mod envelope;
pub mod export;
pub mod sequencer;
pub mod transport;

use activity::ActivityLog;
use export::CalibrationExport;
use sequencer::ActiveTestRun;
pub use sequencer::{TestOutcome, TestRun, TestTarget};
pub use transport::{DeviceTransport, HttpDeviceTransport};

/// How often the device link re-probes `/status` while the session is open.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// Settle time before each waypoint command in a test sequence.
pub const SETTLE_DELAY: Duration = Duration::from_millis(800);
/// Pause between servos in a full-arm test.
pub const INTER_SERVO_PAUSE: Duration = Duration::from_millis(500);

/// Session-level knobs. Timings default to the reference arm's values;
/// tests shrink them.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub servos: Vec<ServoConfig>,
    pub health_interval: Duration,
    pub settle_delay: Duration,
    pub inter_servo_pause: Duration,
    /// Emergency stop also aborts a running test sequence. `false`
    /// preserves the legacy behavior where the sequence keeps issuing
    /// waypoints after a stop.
    pub abort_tests_on_stop: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            servos: reference_arm(),
            health_interval: HEALTH_CHECK_INTERVAL,
            settle_delay: SETTLE_DELAY,
            inter_servo_pause: INTER_SERVO_PAUSE,
            abort_tests_on_stop: true,
        }
    }
}

/// The four-servo reference arm. Hard limits are the hardware's full
/// travel; the safe sub-ranges are the operator defaults per joint.
pub fn reference_arm() -> Vec<ServoConfig> {
    vec![
        joint(0, "Base", 10, 170),
        joint(1, "Shoulder", 20, 160),
        joint(2, "Elbow", 20, 160),
        joint(3, "Head", 30, 150),
    ]
}

fn joint(channel: u8, name: &str, safe_min: i32, safe_max: i32) -> ServoConfig {
    ServoConfig {
        channel: ServoChannel(channel),
        name: name.to_string(),
        min: 0,
        max: 180,
        safe_min,
        safe_max,
        home: 90,
    }
}

/// Everything the UI needs to observe, in emission order.
#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    ConnectionChanged(ConnectionState),
    AngleUpdated { channel: ServoChannel, angle: i32 },
    LogAppended(LogEntry),
    TestStateChanged(Option<TestRun>),
}

pub(crate) struct SessionState {
    pub(crate) connection: ConnectionState,
    pub(crate) servos: Vec<Servo>,
    pub(crate) log: ActivityLog,
    pub(crate) active_test: Option<ActiveTestRun>,
}

/// Calibration session against one device. All shared mutable state lives
/// behind the single `inner` mutex: the periodic health probe and an
/// in-flight dispatch may both be on the wire at once, but every mutation
/// is a short critical section, so observers only ever see interleaving of
/// logged events.
pub struct ConsoleClient {
    pub(crate) transport: Arc<dyn DeviceTransport>,
    pub(crate) config: SessionConfig,
    pub(crate) inner: Mutex<SessionState>,
    pub(crate) events: broadcast::Sender<ConsoleEvent>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleClient {
    pub fn new(transport: Arc<dyn DeviceTransport>, config: SessionConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let servos = config
            .servos
            .iter()
            .cloned()
            .map(Servo::from_config)
            .collect();
        Arc::new(Self {
            transport,
            inner: Mutex::new(SessionState {
                connection: ConnectionState::Disconnected,
                servos,
                log: ActivityLog::new(),
                active_test: None,
            }),
            events,
            health_task: Mutex::new(None),
            config,
        })
    }

    /// Builds a session over the real HTTP transport, validating every
    /// servo envelope first.
    pub fn over_http(base_url: &str, config: SessionConfig) -> anyhow::Result<Arc<Self>> {
        for servo in &config.servos {
            servo.validate()?;
        }
        let transport = HttpDeviceTransport::new(base_url)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.lock().await.connection
    }

    pub async fn servos(&self) -> Vec<Servo> {
        self.inner.lock().await.servos.clone()
    }

    pub async fn recent_log(&self) -> Vec<LogEntry> {
        self.inner.lock().await.log.entries()
    }

    /// Snapshot of the running test sequence, if any.
    pub async fn active_test(&self) -> Option<TestRun> {
        self.inner
            .lock()
            .await
            .active_test
            .as_ref()
            .map(ActiveTestRun::snapshot)
    }

    /// User-initiated connect: one probe, resulting state, outcome logged.
    /// Does not retry; the periodic health check is the recovery path.
    pub async fn connect(&self) -> ConnectionState {
        self.set_connection(ConnectionState::Connecting).await;
        self.check_health().await
    }

    /// One status probe. `Connected` iff the device answers an explicit
    /// "ok"; any transport failure or other status downgrades to
    /// `Disconnected`. Logs only on state transitions so the periodic
    /// probe cannot cycle the bounded log.
    pub async fn check_health(&self) -> ConnectionState {
        let healthy = match self.transport.probe_status().await {
            Ok(status) if status.is_ok() => true,
            Ok(status) => {
                warn!(status = %status.status, "device reported non-ok status");
                false
            }
            Err(err) => {
                warn!("status probe failed: {err}");
                false
            }
        };

        let next = if healthy {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        let previous = self.set_connection(next).await;
        if previous != next {
            match next {
                ConnectionState::Connected => {
                    self.log(LogSeverity::Success, "device link established").await;
                }
                _ => {
                    self.log(LogSeverity::Error, "device unreachable; connection lost")
                        .await;
                }
            }
        }
        next
    }

    /// Starts the periodic link probe for the life of the session. The
    /// task is owned here; [`shutdown`](Self::shutdown) stops it. Calling
    /// again replaces the previous task.
    pub async fn start_health_monitor(self: &Arc<Self>) {
        let client = Arc::clone(self);
        let interval = self.config.health_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                client.check_health().await;
            }
        });

        let previous = self.health_task.lock().await.replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.health_task.lock().await.take() {
            task.abort();
        }
    }

    /// Dispatches one move. The requested angle is clamped into the
    /// servo's hard limits and the local model is updated before the
    /// device round-trip; it models the *commanded* angle and is never
    /// rolled back on a device-side failure. A rejected or failed move
    /// does not downgrade the connection state.
    pub async fn set_servo_angle(
        &self,
        channel: ServoChannel,
        requested: i32,
    ) -> Result<i32, DeviceError> {
        let clamped = {
            let mut inner = self.inner.lock().await;
            if inner.connection != ConnectionState::Connected {
                drop(inner);
                self.log(
                    LogSeverity::Error,
                    format!("servo {channel}: move to {requested} deg refused; not connected"),
                )
                .await;
                return Err(DeviceError::NotConnected);
            }
            let Some(servo) = inner
                .servos
                .iter_mut()
                .find(|servo| servo.config.channel == channel)
            else {
                drop(inner);
                self.log(
                    LogSeverity::Error,
                    format!("servo {channel}: channel is not configured"),
                )
                .await;
                return Err(DeviceError::Rejected(format!(
                    "channel {channel} is not configured"
                )));
            };
            let clamped = envelope::clamp_angle(&servo.config, requested);
            servo.angle = clamped;
            clamped
        };
        let _ = self
            .events
            .send(ConsoleEvent::AngleUpdated { channel, angle: clamped });

        match self.transport.move_servo(channel, clamped).await {
            Ok(response) if response.success => {
                self.log(LogSeverity::Success, format!("servo {channel} -> {clamped} deg"))
                    .await;
                Ok(clamped)
            }
            Ok(response) => {
                let reason = response
                    .error
                    .unwrap_or_else(|| "no reason given".to_string());
                self.log(
                    LogSeverity::Error,
                    format!("servo {channel}: device rejected move to {clamped} deg: {reason}"),
                )
                .await;
                Err(DeviceError::Rejected(reason))
            }
            Err(err) => {
                self.log(
                    LogSeverity::Error,
                    format!("servo {channel}: move to {clamped} deg failed: {err}"),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Sends the dedicated stop request immediately, regardless of
    /// connection state or a running sequence, and trips the active run's
    /// cancellation flag when configured to. Local angles are left as
    /// commanded; the reference device returns every servo to neutral on
    /// stop. Idempotent.
    pub async fn emergency_stop(&self) {
        if self.config.abort_tests_on_stop {
            // Flag first, before the request leaves: no waypoint may be
            // dispatched after this call returns.
            let inner = self.inner.lock().await;
            if let Some(run) = &inner.active_test {
                run.cancelled.store(true, Ordering::SeqCst);
            }
        }

        match self.transport.stop_all().await {
            Ok(()) => {
                self.log(
                    LogSeverity::Success,
                    "emergency stop acknowledged (device parks servos at neutral)",
                )
                .await;
            }
            Err(err) => {
                self.log(LogSeverity::Error, format!("emergency stop failed: {err}"))
                    .await;
            }
        }
    }

    /// Captures the current `{channel -> angle}` snapshot for export.
    pub async fn export_calibration(&self) -> CalibrationExport {
        let inner = self.inner.lock().await;
        CalibrationExport::from_servos(&inner.servos)
    }

    pub(crate) fn servo_config(&self, channel: ServoChannel) -> Option<&ServoConfig> {
        self.config
            .servos
            .iter()
            .find(|config| config.channel == channel)
    }

    pub(crate) async fn log(&self, severity: LogSeverity, message: impl Into<String>) {
        let entry = LogEntry::new(severity, message);
        {
            let mut inner = self.inner.lock().await;
            inner.log.push(entry.clone());
        }
        let _ = self.events.send(ConsoleEvent::LogAppended(entry));
    }

    async fn set_connection(&self, next: ConnectionState) -> ConnectionState {
        let previous = {
            let mut inner = self.inner.lock().await;
            std::mem::replace(&mut inner.connection, next)
        };
        if previous != next {
            let _ = self.events.send(ConsoleEvent::ConnectionChanged(next));
        }
        previous
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
