//! camprobe CLI - find IP cameras on the local network and work out how to
//! talk to them
//!
//! This binary can:
//! - Scan the local network (ONVIF WS-Discovery, then an RTSP port sweep)
//! - Probe a camera for a working RTSP path and credentials
//! - Send ONVIF PTZ commands to a saved camera or an address
//! - Keep a small list of saved cameras

use anyhow::{Context, Result, bail};
use camprobe_core::camera::{CameraStore, JsonCameraStore, StreamTarget};
use camprobe_core::config::{self, Config};
use camprobe_core::onvif::OnvifPtzClient;
use camprobe_core::{
    Camera, Credential, Diagnostic, DiagnosticsSink, NetworkScanner, ProbeOutcome, PtzCapability,
    PtzCommand, RtspProber, SubnetBase,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "camprobe")]
#[command(version)]
#[command(about = "Find IP cameras on the local network, resolve their RTSP stream and drive PTZ")]
#[command(long_about = "
camprobe finds unmanaged IP cameras on the local network and works out how
to talk to them.

Quick start:
  1. Find cameras:        camprobe scan
  2. Resolve the stream:  camprobe probe 192.168.1.64 --save porch
  3. Move the camera:     camprobe ptz porch move --pan 0.5

Settings are read from the environment, then ~/.config/camprobe/config.toml.
See: camprobe config
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the local network for cameras
    Scan {
        /// Skip the ONVIF WS-Discovery phase
        #[arg(long)]
        no_discovery: bool,

        /// Subnet to sweep, e.g. 192.168.1 (default: detected)
        #[arg(long)]
        subnet: Option<String>,

        /// RTSP port to look for
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Find a working RTSP path (and credentials) on a camera
    Probe {
        /// Camera address
        host: String,

        /// RTSP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Username to offer instead of the factory default list
        #[arg(short, long, requires = "password")]
        username: Option<String>,

        /// Password for --username
        #[arg(long, requires = "username")]
        password: Option<String>,

        /// Save the resolved camera under this name
        #[arg(long)]
        save: Option<String>,

        /// Mark the saved camera as ONVIF PTZ capable
        #[arg(long, requires = "save")]
        ptz: bool,

        /// ONVIF port stored with the saved camera
        #[arg(long, requires = "save")]
        onvif_port: Option<u16>,
    },

    /// Send a PTZ command over ONVIF
    Ptz {
        /// Saved camera name or id, or a camera address
        target: String,

        /// ONVIF port when TARGET is an address
        #[arg(long)]
        onvif_port: Option<u16>,

        /// Username when TARGET is an address
        #[arg(short, long)]
        username: Option<String>,

        /// Password when TARGET is an address
        #[arg(long)]
        password: Option<String>,

        #[command(subcommand)]
        action: PtzAction,
    },

    /// List saved cameras
    Cameras,

    /// Show configuration paths and settings
    Config,
}

#[derive(Subcommand)]
pub enum PtzAction {
    /// Continuous move; velocities are clamped to [-1, 1]
    Move {
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        pan: f32,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        tilt: f32,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        zoom: f32,

        /// Stop again after this many milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,
    },

    /// Stop all movement
    Stop,

    /// Go to a stored preset
    Preset {
        /// Preset token
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("camprobe={},camprobe_core={}", log_level, log_level).into()
            }),
        )
        .with_target(false)
        .init();

    let config = config::load_config();

    match cli.command {
        Commands::Scan {
            no_discovery,
            ref subnet,
            port,
        } => cmd_scan(&cli, config, no_discovery, subnet.as_deref(), port).await,
        Commands::Probe {
            ref host,
            port,
            ref username,
            ref password,
            ref save,
            ptz,
            onvif_port,
        } => {
            let credential = match (username, password) {
                (Some(u), Some(p)) => Some(Credential::new(u.clone(), p.clone())),
                _ => None,
            };
            let save = save.as_deref().map(|name| SaveRequest {
                name,
                ptz,
                onvif_port,
            });
            cmd_probe(&cli, config, host, port, credential, save).await
        }
        Commands::Ptz {
            ref target,
            onvif_port,
            ref username,
            ref password,
            ref action,
        } => {
            let client = ptz_client(&config, target, onvif_port, username, password)?;
            cmd_ptz(&cli, &client, action).await
        }
        Commands::Cameras => cmd_cameras(&cli),
        Commands::Config => cmd_config(&cli, &config),
    }
}

/// Print diagnostics as progress lines in text mode.
fn text_progress(cli: &Cli) -> Option<DiagnosticsSink> {
    match cli.format {
        OutputFormat::Text => Some(Arc::new(|event: &Diagnostic| match event {
            Diagnostic::Status(message) => println!("  {}", message),
            Diagnostic::HostDiscovered(host) => {
                println!("  + {} ({})", host.host, host.source)
            }
            Diagnostic::Probe(attempt) => println!(
                "    {:<40} {:?}{}",
                attempt.path,
                attempt.auth_state,
                attempt
                    .username
                    .as_deref()
                    .map(|u| format!(" as {}", u))
                    .unwrap_or_default()
            ),
            Diagnostic::Scan(_) => {}
        })),
        OutputFormat::Json => None,
    }
}

async fn cmd_scan(
    cli: &Cli,
    config: Config,
    no_discovery: bool,
    subnet: Option<&str>,
    port: Option<u16>,
) -> Result<()> {
    let mut scan = config.scan;
    if no_discovery {
        scan.ws_discovery = false;
    }
    if let Some(raw) = subnet {
        let base: SubnetBase = raw.parse().with_context(|| format!("invalid --subnet {}", raw))?;
        scan.subnet = Some(base);
    }
    if let Some(port) = port {
        scan.port = port;
    }

    match cli.format {
        OutputFormat::Text => println!("Scanning for cameras on port {}...", scan.port),
        OutputFormat::Json => {}
    }

    let mut scanner = NetworkScanner::new(scan);
    if let Some(sink) = text_progress(cli) {
        scanner = scanner.with_diagnostics(sink);
    }

    scanner.start_scan();
    tokio::select! {
        _ = scanner.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            scanner.stop_scan();
        }
    }

    let snapshot = scanner.snapshot();
    match cli.format {
        OutputFormat::Text => {
            println!();
            println!("{} ({:.0}%)", snapshot.status, snapshot.progress * 100.0);
            if !snapshot.hosts.is_empty() {
                println!();
                for host in &snapshot.hosts {
                    println!(
                        "  {:15} {:>5}  {:<10} {}",
                        host.host,
                        host.port,
                        host.source,
                        host.display_name.as_deref().unwrap_or("")
                    );
                }
                println!();
                println!("Next: camprobe probe <address>");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "hosts": snapshot.hosts,
                "status": snapshot.status,
                "progress": snapshot.progress,
            }));
        }
    }

    Ok(())
}

struct SaveRequest<'a> {
    name: &'a str,
    ptz: bool,
    onvif_port: Option<u16>,
}

async fn cmd_probe(
    cli: &Cli,
    config: Config,
    host: &str,
    port: Option<u16>,
    credential: Option<Credential>,
    save: Option<SaveRequest<'_>>,
) -> Result<()> {
    camprobe_core::camera::validate_host(host)?;
    let port = port.unwrap_or(config.scan.port);

    match cli.format {
        OutputFormat::Text => println!("Probing rtsp://{}:{} ...", host, port),
        OutputFormat::Json => {}
    }

    let mut prober = RtspProber::new(config.rtsp.clone());
    if let Some(sink) = text_progress(cli) {
        prober = prober.with_diagnostics(sink);
    }

    let outcome = tokio::select! {
        outcome = prober.probe(host, port, credential) => outcome,
        _ = tokio::signal::ctrl_c() => {
            prober.stop();
            ProbeOutcome::Cancelled
        }
    };

    let target = match &outcome {
        ProbeOutcome::Found(result) => Some(StreamTarget::from_probe(host, port, result)),
        _ => None,
    };

    let mut saved = None;
    if let (ProbeOutcome::Found(result), Some(request)) = (&outcome, save) {
        let mut camera = Camera::from_probe(request.name, host, port, result)?;
        if request.ptz {
            camera.ptz_capability = PtzCapability::Onvif;
        }
        if let Some(onvif_port) = request.onvif_port {
            camera.onvif_port = onvif_port;
        }
        let store = JsonCameraStore::default_location()?;
        store
            .save(&camera)
            .with_context(|| format!("failed to save camera to {}", store.path().display()))?;
        saved = Some(camera);
    }

    match cli.format {
        OutputFormat::Text => {
            println!();
            println!("{}", prober.status_message());
            if let Some(ref target) = target {
                println!("Stream URL: {}", target.url());
            }
            if let Some(ref camera) = saved {
                println!("Saved as '{}'", camera.name);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "host": host,
                "port": port,
                "status": prober.status_message(),
                "attempts": prober.attempts(),
                "result": target,
                "url": target.as_ref().map(StreamTarget::url),
                "saved": saved,
            }));
        }
    }

    Ok(())
}

fn ptz_client(
    config: &Config,
    target: &str,
    onvif_port: Option<u16>,
    username: &Option<String>,
    password: &Option<String>,
) -> Result<OnvifPtzClient> {
    let saved = match JsonCameraStore::default_location().and_then(|s| s.get(target)) {
        Ok(camera) => camera,
        Err(e) => {
            tracing::warn!("Could not read saved cameras: {}", e);
            None
        }
    };

    if let Some(camera) = saved {
        return match camera.ptz_client(&config.onvif)? {
            Some(client) => Ok(client),
            None => bail!("camera '{}' is not marked as ONVIF PTZ capable", camera.name),
        };
    }

    let credential = Credential::new(
        username.clone().unwrap_or_default(),
        password.clone().unwrap_or_default(),
    );
    let port = onvif_port.unwrap_or(config.onvif.port);
    OnvifPtzClient::with_config(target, port, credential, &config.onvif)
        .with_context(|| format!("'{}' is neither a saved camera nor a valid address", target))
}

async fn cmd_ptz(cli: &Cli, client: &OnvifPtzClient, action: &PtzAction) -> Result<()> {
    let command = match action {
        PtzAction::Move { pan, tilt, zoom, .. } => PtzCommand::continuous_move(*pan, *tilt, *zoom),
        PtzAction::Stop => PtzCommand::Stop,
        PtzAction::Preset { token } => PtzCommand::goto_preset(token.clone()),
    };

    client
        .send(&command)
        .await
        .with_context(|| format!("PTZ {} failed", command.operation()))?;

    if let PtzAction::Move {
        duration_ms: Some(ms),
        ..
    } = action
    {
        tokio::time::sleep(Duration::from_millis(*ms)).await;
        client.stop().await.context("PTZ Stop failed")?;
    }

    match cli.format {
        OutputFormat::Text => println!("{} sent to {}", command.operation(), client.endpoint()),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "command": command.operation(),
                "endpoint": client.endpoint(),
                "ok": true,
            }));
        }
    }

    Ok(())
}

fn cmd_cameras(cli: &Cli) -> Result<()> {
    let store = JsonCameraStore::default_location()?;
    let cameras = store.list()?;

    match cli.format {
        OutputFormat::Text => {
            if cameras.is_empty() {
                println!("No saved cameras.");
                println!();
                println!("Save one with: camprobe probe <address> --save <name>");
                return Ok(());
            }
            for camera in &cameras {
                let ptz = match camera.ptz_capability {
                    PtzCapability::Onvif => format!("PTZ :{}", camera.onvif_port),
                    PtzCapability::None => "-".to_string(),
                };
                println!("  {:<16} {:<10} {}", camera.name, ptz, camera.rtsp_url());
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "cameras": cameras,
                "file": store.path().display().to_string(),
            }));
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli, config: &Config) -> Result<()> {
    let config_path = config::get_config_file_path_string();
    let subnet = config
        .scan
        .subnet
        .map(|s| s.to_string())
        .unwrap_or_else(|| "detected".to_string());

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!("Source:           {}", config.source);
            println!("Subnet:           {}", subnet);
            println!("RTSP port:        {}", config.scan.port);
            println!("Scan concurrency: {}", config.scan.concurrency);
            println!("RTSP paths:       {}", config.rtsp.paths.len());
            println!("Credentials:      {}", config.rtsp.credentials.len());
            println!("ONVIF port:       {}", config.onvif.port);
            println!();
            println!("Environment variables:");
            println!("  {} - Subnet to sweep, e.g. 192.168.1", config::ENV_SUBNET);
            println!("  {} - RTSP port", config::ENV_RTSP_PORT);
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "source": config.source.to_string(),
                "subnet": subnet,
                "rtsp_port": config.scan.port,
                "concurrency": config.scan.concurrency,
                "connect_timeout_ms": config.scan.connect_timeout.as_millis() as u64,
                "discovery_timeout_ms": config.scan.discovery_timeout.as_millis() as u64,
                "rtsp_timeout_ms": config.rtsp.timeout.as_millis() as u64,
                "rtsp_paths": config.rtsp.paths,
                "onvif_port": config.onvif.port,
                "onvif_timeout_ms": config.onvif.timeout.as_millis() as u64,
                "profile_token": config.onvif.profile_token,
            }));
        }
    }

    Ok(())
}
