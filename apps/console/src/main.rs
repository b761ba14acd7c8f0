use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{envelope, ConsoleClient, ConsoleEvent, SessionConfig};
use shared::domain::{LogSeverity, ServoChannel};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
    task::JoinHandle,
};
use tracing::info;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(about = "Interactive calibration console for an HTTP-controlled servo arm")]
struct Args {
    /// Device base url, e.g. http://192.168.1.42:5001 (overrides console.toml)
    #[arg(long)]
    device_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = args.device_url {
        settings.device_url = url;
    }

    let client = ConsoleClient::over_http(&settings.device_url, SessionConfig::default())?;
    client.start_health_monitor().await;
    info!("session started against {}", settings.device_url);

    println!("servo calibration console - device at {}", settings.device_url);
    println!("type 'help' for commands");

    let printer = spawn_log_printer(&client);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        if !handle_command(&client, line.trim()).await {
            break;
        }
    }

    printer.abort();
    client.shutdown().await;
    Ok(())
}

/// Prints activity-log entries as they happen. Connection transitions are
/// already logged by the device link, so no extra printing is needed.
fn spawn_log_printer(client: &Arc<ConsoleClient>) -> JoinHandle<()> {
    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ConsoleEvent::LogAppended(entry)) => {
                    println!(
                        "[{}] {} {}",
                        entry.timestamp.format("%H:%M:%S"),
                        severity_tag(entry.severity),
                        entry.message
                    );
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn severity_tag(severity: LogSeverity) -> &'static str {
    match severity {
        LogSeverity::Info => "  ",
        LogSeverity::Success => "ok",
        LogSeverity::Error => "!!",
    }
}

/// Returns false when the operator asked to quit.
async fn handle_command(client: &Arc<ConsoleClient>, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => {}
        Some("connect") => {
            client.connect().await;
        }
        Some("status") => print_status(client).await,
        Some("set") => {
            let channel = parts.next().and_then(|v| v.parse::<u8>().ok());
            let angle = parts.next().and_then(|v| v.parse::<i32>().ok());
            match (channel, angle) {
                (Some(channel), Some(angle)) => {
                    if client.active_test().await.is_some() {
                        println!("a test is running; only 'stop' is available");
                    } else {
                        let _ = client.set_servo_angle(ServoChannel(channel), angle).await;
                    }
                }
                _ => println!("usage: set <channel> <angle>"),
            }
        }
        Some("test") => match parts.next().and_then(|v| v.parse::<u8>().ok()) {
            Some(channel) => {
                let runner = Arc::clone(client);
                tokio::spawn(async move {
                    runner.run_servo_test(ServoChannel(channel)).await;
                });
            }
            None => println!("usage: test <channel>  (or: test-all)"),
        },
        Some("test-all") => {
            let runner = Arc::clone(client);
            tokio::spawn(async move {
                runner.run_full_test().await;
            });
        }
        Some("stop") => client.emergency_stop().await,
        Some("export") => {
            let path = parts.next().unwrap_or("calibration_replay.py");
            match export_script(client, path).await {
                Ok(count) => println!("wrote {count} servo entries to {path}"),
                Err(err) => println!("export failed: {err:#}"),
            }
        }
        Some("log") => {
            for entry in client.recent_log().await {
                println!(
                    "[{}] {} {}",
                    entry.timestamp.format("%H:%M:%S"),
                    severity_tag(entry.severity),
                    entry.message
                );
            }
        }
        Some("help") => print_help(),
        Some("quit") | Some("exit") => return false,
        Some(other) => println!("unknown command '{other}'; type 'help'"),
    }
    true
}

async fn print_status(client: &Arc<ConsoleClient>) {
    println!("connection: {}", client.connection_state().await);
    if let Some(run) = client.active_test().await {
        println!("test running: {} (step {})", run.target, run.step_index + 1);
    }
    for servo in client.servos().await {
        let marker = if envelope::is_safe(&servo) {
            "safe"
        } else {
            "outside safe range"
        };
        let cfg = &servo.config;
        println!(
            "  [{}] {:<10} {:>4} deg  (limits {}..{}, safe {}..{})  {}",
            cfg.channel, cfg.name, servo.angle, cfg.min, cfg.max, cfg.safe_min, cfg.safe_max, marker
        );
    }
}

async fn export_script(client: &Arc<ConsoleClient>, path: &str) -> Result<usize> {
    let export = client.export_calibration().await;
    std::fs::write(path, export.render_script())
        .with_context(|| format!("failed to write '{path}'"))?;
    Ok(export.entries().len())
}

fn print_help() {
    println!("commands:");
    println!("  connect            probe the device and open the link");
    println!("  status             connection state and per-servo angles");
    println!("  set <ch> <angle>   move one servo (angle is clamped to its limits)");
    println!("  test <ch>          run the waypoint sweep on one servo");
    println!("  test-all           sweep every servo in order");
    println!("  stop               emergency stop (aborts a running test)");
    println!("  export [path]      write the calibration replay script");
    println!("  log                show the recent activity log");
    println!("  quit               leave the console");
}
