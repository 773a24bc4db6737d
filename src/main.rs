use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use telerobot_bridge::bridge::memory::loopback;
use telerobot_bridge::bridge::websocket::WebSocketTransport;
use telerobot_bridge::bridge::Transport;
use telerobot_bridge::commands::{handle_command, parse_command};
use telerobot_bridge::config::{BackendKind, Config};
use telerobot_bridge::session::{RobotSession, SessionEvent};

/// Telerobot bridge - drives one robot over a rosbridge WebSocket
#[derive(Parser, Debug)]
#[command(name = "telerobot-bridge", version, about)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Robot name
    #[arg(short, long)]
    name: Option<String>,

    /// Robot backend
    #[arg(short, long, value_enum)]
    backend: Option<BackendKind>,

    /// rosbridge URI
    #[arg(short, long)]
    uri: Option<String>,

    /// rosbridge port
    #[arg(short, long)]
    port: Option<u16>,

    /// Use the in-process loopback bridge instead of a WebSocket
    #[arg(long)]
    offline: bool,
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default_for_backend(
            "robot".to_string(),
            args.backend.unwrap_or(BackendKind::Virtual),
        ),
    };
    if let Some(name) = &args.name {
        config.robot_name = name.clone();
    }
    if let Some(backend) = args.backend {
        config.session.backend = backend;
    }
    if let Some(uri) = &args.uri {
        config.robot.ros_bridge_uri = uri.clone();
    }
    if let Some(port) = args.port {
        config.robot.ros_bridge_port = port;
    }
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries command reports
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    info!(
        robot = %config.robot_name,
        backend = config.session.backend.as_str(),
        uri = %config.robot.ros_bridge_uri,
        port = config.robot.ros_bridge_port,
        offline = args.offline,
        "telerobot bridge starting"
    );

    let transport: Arc<dyn Transport> = if args.offline {
        Arc::new(loopback())
    } else {
        Arc::new(WebSocketTransport)
    };

    let name = config.robot_name.clone();
    let mut session = RobotSession::initialise(&config, &name, transport).await?;
    session.on_lost_connection(|reason| {
        error!(reason = reason.unwrap_or("unknown"), "robot unreachable, operator attention needed");
    });

    info!("session ready, entering control loop");
    let result = run(&mut session, Duration::from_millis(config.session.tick_interval_ms.max(1))).await;
    session.destroy();
    result
}

async fn run(session: &mut RobotSession, tick: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for event in session.tick() {
                    match event {
                        SessionEvent::PathCompleted => info!("path completed"),
                        SessionEvent::LostConnection { .. } => {
                            // No automatic reconnect
                            return Ok(());
                        }
                        SessionEvent::Disconnected => return Ok(()),
                    }
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match parse_command(line.as_bytes()) {
                        Ok(cmd) => {
                            let report = handle_command(session, &cmd);
                            let mut out = serde_json::to_vec(&report)?;
                            out.push(b'\n');
                            stdout.write_all(&out).await?;
                            stdout.flush().await?;
                        }
                        Err(e) => warn!(error = %e, "failed to parse command"),
                    },
                    None => {
                        info!("stdin closed, commands disabled");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                if let Err(e) = session.stop_robot() {
                    warn!(error = %e, "stop on shutdown failed");
                }
                return Ok(());
            }
        }
    }
}
