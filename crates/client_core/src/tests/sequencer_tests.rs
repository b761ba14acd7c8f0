use std::sync::atomic::AtomicU32;
use std::time::Duration;

use async_trait::async_trait;
use shared::{
    domain::{ConnectionState, ServoChannel, ServoConfig},
    error::DeviceError,
    protocol::{MoveResponse, StatusResponse},
};
use tokio::sync::Mutex;

use super::*;
use crate::{ConsoleClient, DeviceTransport, SessionConfig};

#[derive(Default)]
struct RecordingDevice {
    moves: Mutex<Vec<(u8, i32)>>,
    stops: AtomicU32,
}

#[async_trait]
impl DeviceTransport for RecordingDevice {
    async fn probe_status(&self) -> Result<StatusResponse, DeviceError> {
        Ok(StatusResponse {
            status: "ok".to_string(),
            servo_available: Some(true),
            servo_initialized: Some(true),
        })
    }

    async fn move_servo(
        &self,
        channel: ServoChannel,
        angle: i32,
    ) -> Result<MoveResponse, DeviceError> {
        self.moves.lock().await.push((channel.0, angle));
        Ok(MoveResponse {
            success: true,
            channel: Some(channel.0),
            angle: Some(angle),
            error: None,
        })
    }

    async fn stop_all(&self) -> Result<(), DeviceError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn timed_config(step_ms: u64) -> SessionConfig {
    SessionConfig {
        settle_delay: Duration::from_millis(step_ms),
        inter_servo_pause: Duration::from_millis(step_ms),
        ..SessionConfig::default()
    }
}

async fn connected_client(
    device: Arc<RecordingDevice>,
    config: SessionConfig,
) -> Arc<ConsoleClient> {
    let client = ConsoleClient::new(device, config);
    assert_eq!(client.connect().await, ConnectionState::Connected);
    client
}

fn envelope(safe_min: i32, safe_max: i32) -> ServoConfig {
    ServoConfig {
        channel: ServoChannel(0),
        name: "Base".to_string(),
        min: 0,
        max: 180,
        safe_min,
        safe_max,
        home: 90,
    }
}

#[test]
fn sweep_covers_center_and_both_safe_extremes() {
    assert_eq!(sweep_waypoints(&envelope(10, 170)), [90, 10, 90, 170, 90]);
    assert_eq!(sweep_waypoints(&envelope(20, 160)), [90, 20, 90, 160, 90]);
}

#[tokio::test]
async fn single_servo_test_issues_five_waypoints_in_order() {
    let device = Arc::new(RecordingDevice::default());
    let client = connected_client(Arc::clone(&device), timed_config(1)).await;

    let outcome = client.run_servo_test(ServoChannel(0)).await;

    assert_eq!(outcome, TestOutcome::Completed);
    // Reference arm servo 0: safe range 10..170.
    assert_eq!(
        *device.moves.lock().await,
        vec![(0, 90), (0, 10), (0, 90), (0, 170), (0, 90)]
    );
    assert!(client.active_test().await.is_none());
}

#[tokio::test]
async fn sweep_follows_the_servos_own_safe_range() {
    let device = Arc::new(RecordingDevice::default());
    let client = connected_client(Arc::clone(&device), timed_config(1)).await;

    // Reference arm servo 1: safe range 20..160.
    let outcome = client.run_servo_test(ServoChannel(1)).await;

    assert_eq!(outcome, TestOutcome::Completed);
    assert_eq!(
        *device.moves.lock().await,
        vec![(1, 90), (1, 20), (1, 90), (1, 160), (1, 90)]
    );
}

#[tokio::test]
async fn full_test_sweeps_each_servo_in_order_without_interleaving() {
    let device = Arc::new(RecordingDevice::default());
    let client = connected_client(Arc::clone(&device), timed_config(1)).await;

    let outcome = client.run_full_test().await;
    assert_eq!(outcome, TestOutcome::Completed);

    let moves = device.moves.lock().await.clone();
    let configs = client.config().servos.clone();
    assert_eq!(moves.len(), configs.len() * SWEEP_LEN);

    for (index, config) in configs.iter().enumerate() {
        let chunk = &moves[index * SWEEP_LEN..(index + 1) * SWEEP_LEN];
        // One servo at a time, configuration order.
        assert!(chunk.iter().all(|(channel, _)| *channel == config.channel.0));
        let angles: Vec<i32> = chunk.iter().map(|(_, angle)| *angle).collect();
        assert_eq!(angles, sweep_waypoints(config).to_vec());
    }
}

#[tokio::test]
async fn unconfigured_channel_does_not_start_a_test() {
    let device = Arc::new(RecordingDevice::default());
    let client = connected_client(Arc::clone(&device), timed_config(1)).await;

    let outcome = client.run_servo_test(ServoChannel(9)).await;

    assert_eq!(outcome, TestOutcome::NotStarted);
    assert!(device.moves.lock().await.is_empty());
    let log = client.recent_log().await;
    assert!(log
        .last()
        .expect("entry")
        .message
        .contains("not configured"));
}

#[tokio::test]
async fn second_test_is_refused_while_one_runs() {
    let device = Arc::new(RecordingDevice::default());
    let client = connected_client(Arc::clone(&device), timed_config(30)).await;

    let runner = Arc::clone(&client);
    let handle = tokio::spawn(async move { runner.run_servo_test(ServoChannel(0)).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(client.run_full_test().await, TestOutcome::NotStarted);
    let log = client.recent_log().await;
    assert!(log
        .iter()
        .any(|entry| entry.message.contains("already running")));

    assert_eq!(handle.await.expect("join"), TestOutcome::Completed);
    assert_eq!(device.moves.lock().await.len(), SWEEP_LEN);
}

#[tokio::test]
async fn emergency_stop_aborts_the_sequence_between_steps() {
    let device = Arc::new(RecordingDevice::default());
    let client = connected_client(Arc::clone(&device), timed_config(40)).await;

    let runner = Arc::clone(&client);
    let handle = tokio::spawn(async move { runner.run_full_test().await });
    // Land mid-settle, a couple of waypoints in.
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.emergency_stop().await;
    let moves_at_stop = device.moves.lock().await.len();

    assert_eq!(handle.await.expect("join"), TestOutcome::Aborted);
    assert_eq!(device.stops.load(Ordering::SeqCst), 1);
    assert!(client.active_test().await.is_none());

    // No waypoint command after the stop call returned.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(device.moves.lock().await.len(), moves_at_stop);
    assert!(moves_at_stop < client.config().servos.len() * SWEEP_LEN);
}

#[tokio::test]
async fn legacy_mode_keeps_the_sequence_running_after_stop() {
    let device = Arc::new(RecordingDevice::default());
    let mut config = timed_config(20);
    config.abort_tests_on_stop = false;
    let client = connected_client(Arc::clone(&device), config).await;

    let runner = Arc::clone(&client);
    let handle = tokio::spawn(async move { runner.run_servo_test(ServoChannel(0)).await });
    tokio::time::sleep(Duration::from_millis(30)).await;

    client.emergency_stop().await;

    assert_eq!(handle.await.expect("join"), TestOutcome::Completed);
    assert_eq!(device.moves.lock().await.len(), SWEEP_LEN);
    assert_eq!(device.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_snapshot_advances_through_every_step() {
    let device = Arc::new(RecordingDevice::default());
    let client = connected_client(Arc::clone(&device), timed_config(1)).await;
    let mut events = client.subscribe_events();

    assert_eq!(
        client.run_servo_test(ServoChannel(0)).await,
        TestOutcome::Completed
    );

    let mut steps = Vec::new();
    let mut cleared = false;
    while let Ok(event) = events.try_recv() {
        if let ConsoleEvent::TestStateChanged(state) = event {
            match state {
                Some(run) => {
                    assert_eq!(run.target, TestTarget::One(ServoChannel(0)));
                    assert!(run.running);
                    steps.push(run.step_index);
                }
                None => cleared = true,
            }
        }
    }

    assert_eq!(steps, vec![0, 0, 1, 2, 3, 4]);
    assert!(cleared);
}
