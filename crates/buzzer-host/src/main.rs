//! Buzzer host entry point.
//!
//! Connects to a buzzer gateway over USB or BLE and either watches the live
//! peer table or issues a single command.
//!
//! # Usage
//!
//! ```text
//! buzzer-host [OPTIONS] <COMMAND>
//!
//! Commands:
//!   watch          Print the peer table whenever it changes
//!   version        Print the gateway firmware version
//!   command        Send a command to one peer or to all peers
//!   ping-interval  Show or set the gateway ping interval
//!   game-config    Show or change the game configuration
//!
//! Options:
//!   --config <PATH>         Configuration file [env: BUZZER_HOST_CONFIG]
//!   --transport <usb|ble>   Gateway link [default: usb]
//!   --json                  Print machine-readable JSON
//! ```
//!
//! # What happens at startup
//!
//! 1. The configuration is loaded (defaults when the file is absent).
//! 2. `tracing_subscriber` is initialised from `RUST_LOG`, falling back to
//!    the configured `log_level`.
//! 3. The protocol schema table is validated once.
//! 4. The transport is built and the connection lifecycle runs.
//! 5. The subcommand runs; the connection is closed afterwards, or on Ctrl-C
//!    for `watch`.  While watching, a gateway that is unplugged (or drops its
//!    BLE link) is reconnected when it comes back.

use std::path::PathBuf;

use anyhow::{bail, Context};
use buzzer_core::protocol::{
    validate_protocol_schemas, BuzzEffect, ColorSelection, KeyConfig, MacAddress, NodeMode,
    PeerCommand, TimeSetting,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use buzzer_host::application::errors::{ErrorReporter, HostError};
use buzzer_host::application::lifecycle::{ConnectionLifecycle, ConnectionState, DeviceEvent};
use buzzer_host::application::peer_sync::PeerSnapshot;
use buzzer_host::application::transport::{DeviceEvents, TransportError, TransportKind};
use buzzer_host::infrastructure::storage::config::{load_config, load_config_from};
use buzzer_host::infrastructure::transport::build_transport;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Host for wireless game-show buzzers.
#[derive(Debug, Parser)]
#[command(name = "buzzer-host", version)]
struct Cli {
    /// Configuration file; the platform config directory is used when absent.
    #[arg(long, env = "BUZZER_HOST_CONFIG")]
    config: Option<PathBuf>,

    /// Link used to reach the gateway.
    #[arg(long, value_enum, default_value_t = TransportArg::Usb)]
    transport: TransportArg,

    /// Print machine-readable JSON instead of text.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Usb,
    Ble,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Usb => TransportKind::Usb,
            TransportArg::Ble => TransportKind::Ble,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the peer table whenever it changes, until Ctrl-C.
    Watch,
    /// Print the gateway firmware version.
    Version,
    /// Send a command to one peer (`AA:BB:CC:DD:EE:FF`) or to `all` peers.
    Command {
        #[arg(value_parser = parse_target)]
        target: MacAddress,
        #[command(subcommand)]
        action: Action,
    },
    /// Show the gateway ping interval, or set it when a value is given.
    PingInterval { interval_ms: Option<u16> },
    /// Show or change the game configuration.
    GameConfig {
        #[command(subcommand)]
        action: GameConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum Action {
    Buzz,
    Activate,
    Deactivate,
    Reset,
    Shutdown,
    /// Palette name (`red`, `teal`, ...) or `#rrggbb`.
    Color { color: ColorSelection },
    /// Key binding such as `ctrl+shift+a`.
    Key { binding: KeyConfig },
    Mode {
        #[arg(value_enum)]
        mode: ModeArg,
    },
}

#[derive(Debug, Subcommand)]
enum GameConfigAction {
    Show,
    /// Change the given fields; the rest keep their current values.
    Set {
        /// `immediate`, `infinite` or milliseconds.
        #[arg(long)]
        active_time: Option<TimeSetting>,
        /// `immediate`, `infinite` or milliseconds.
        #[arg(long)]
        deactivation_time: Option<TimeSetting>,
        #[arg(long, value_enum)]
        effect: Option<EffectArg>,
        #[arg(long)]
        can_buzz_while_other_is_active: Option<bool>,
        #[arg(long)]
        must_release_before_pressing: Option<bool>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Default,
    SimonSays,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EffectArg {
    None,
    FlashBaseColor,
    FlashWhite,
}

impl From<ModeArg> for NodeMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Default => NodeMode::Default,
            ModeArg::SimonSays => NodeMode::SimonSays,
        }
    }
}

impl From<EffectArg> for BuzzEffect {
    fn from(arg: EffectArg) -> Self {
        match arg {
            EffectArg::None => BuzzEffect::None,
            EffectArg::FlashBaseColor => BuzzEffect::FlashBaseColor,
            EffectArg::FlashWhite => BuzzEffect::FlashWhite,
        }
    }
}

impl Action {
    fn into_command(self) -> PeerCommand {
        match self {
            Action::Buzz => PeerCommand::Buzz,
            Action::Activate => PeerCommand::SetActive,
            Action::Deactivate => PeerCommand::SetInactive,
            Action::Reset => PeerCommand::Reset,
            Action::Shutdown => PeerCommand::Shutdown,
            Action::Color { color } => PeerCommand::SetColor(color),
            Action::Key { binding } => PeerCommand::SetKeyConfig(binding),
            Action::Mode { mode } => PeerCommand::SetMode(mode.into()),
        }
    }
}

fn parse_target(text: &str) -> Result<MacAddress, String> {
    if text.eq_ignore_ascii_case("all") {
        return Ok(MacAddress::BROADCAST);
    }
    text.parse().map_err(|e: buzzer_core::protocol::mac::ParseMacError| e.to_string())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.host.log_level)),
        )
        .init();

    validate_protocol_schemas().context("protocol schema table is invalid")?;

    let errors = ErrorReporter::new();
    let kind = TransportKind::from(cli.transport);
    let transport = errors.check(build_transport(kind, &config).await)?;

    let mut lifecycle = ConnectionLifecycle::new(transport, config.lifecycle_options(), errors);
    lifecycle.handle_event(DeviceEvent::Arrived).await?;

    let result = run(cli.command, &mut lifecycle, cli.json).await;
    lifecycle.close().await;
    result
}

async fn run(command: Command, lifecycle: &mut ConnectionLifecycle, json: bool) -> anyhow::Result<()> {
    if let Command::Version = command {
        let version = lifecycle
            .device_version()
            .context("gateway version unknown")?;
        if json {
            println!("{}", serde_json::json!({ "version": version, "compatible": !lifecycle.is_incompatible() }));
        } else {
            println!("firmware version 0x{version:02X} ({version})");
        }
        return Ok(());
    }

    if !lifecycle.is_ready() {
        match lifecycle.errors().latest() {
            Some(err) => bail!(err),
            None => bail!("{} gateway is not ready", lifecycle.kind()),
        }
    }

    match command {
        Command::Version => Ok(()),
        Command::Watch => watch(lifecycle, json).await,
        Command::Command { target, action } => {
            let issuer = lifecycle.commands().context("gateway is not ready")?;
            issuer.send(target, action.into_command()).await?;
            info!("command sent to {target}");
            Ok(())
        }
        Command::PingInterval { interval_ms } => {
            let issuer = lifecycle.commands().context("gateway is not ready")?;
            if let Some(ms) = interval_ms {
                issuer.write_ping_interval(ms).await?;
            }
            match issuer.read_ping_interval().await {
                Ok(ms) => println!("ping interval: {ms} ms"),
                Err(HostError::ReadFailed(TransportError::Unsupported { .. })) if interval_ms.is_some() => {}
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        Command::GameConfig { action } => {
            let issuer = lifecycle.commands().context("gateway is not ready")?;
            let config = match action {
                GameConfigAction::Show => issuer.read_game_config().await?,
                GameConfigAction::Set {
                    active_time,
                    deactivation_time,
                    effect,
                    can_buzz_while_other_is_active,
                    must_release_before_pressing,
                } => {
                    issuer
                        .update_game_config(|s| {
                            if let Some(t) = active_time {
                                s.buzzer_active_time = t;
                            }
                            if let Some(t) = deactivation_time {
                                s.deactivation_time_after_buzzing = t;
                            }
                            if let Some(e) = effect {
                                s.buzz_effect = e.into();
                            }
                            if let Some(b) = can_buzz_while_other_is_active {
                                s.can_buzz_while_other_is_active = b;
                            }
                            if let Some(b) = must_release_before_pressing {
                                s.must_release_before_pressing = b;
                            }
                        })
                        .await?
                }
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                let s = config.settings();
                println!("buzzer active time:        {}", s.buzzer_active_time);
                println!("lockout after buzzing:     {}", s.deactivation_time_after_buzzing);
                println!("buzz effect:               {:?}", s.buzz_effect);
                println!("buzz while other active:   {}", s.can_buzz_while_other_is_active);
                println!("release before pressing:   {}", s.must_release_before_pressing);
                println!("crc:                       0x{:04X}", config.crc());
            }
            Ok(())
        }
    }
}

async fn watch(lifecycle: &mut ConnectionLifecycle, json: bool) -> anyhow::Result<()> {
    let mut peers = lifecycle.peers().context("gateway is not ready")?;
    let mut states = lifecycle.watch_state();
    let mut events = match lifecycle.device_events().await {
        Ok(rx) => Some(rx),
        Err(e) => {
            debug!("no device notifications: {e}");
            None
        }
    };
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("watching {} gateway; press Ctrl-C to exit", lifecycle.kind());
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown signal received");
                break;
            }
            changed = peers.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = peers.borrow_and_update().clone();
                if lifecycle.is_ready() {
                    print_snapshot(&snapshot, json)?;
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                if *states.borrow_and_update() != ConnectionState::Disconnected {
                    continue;
                }
                if events.is_none() {
                    bail!("{} gateway disconnected", lifecycle.kind());
                }
                info!("{} gateway disconnected; waiting for it to return", lifecycle.kind());
            }
            event = next_device_event(&mut events) => match event {
                Some(event) => {
                    // Failures are already reported; the next arrival retries.
                    let _ = lifecycle.handle_event(event).await;
                }
                None => {
                    events = None;
                    if *states.borrow() == ConnectionState::Disconnected {
                        bail!("{} gateway disconnected", lifecycle.kind());
                    }
                }
            },
        }
    }
    Ok(())
}

async fn next_device_event(events: &mut Option<DeviceEvents>) -> Option<DeviceEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn print_snapshot(snapshot: &PeerSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    println!(
        "── {} peer(s), snapshot #{} ──",
        snapshot.len(),
        snapshot.sequence
    );
    for peer in &snapshot.peers {
        let record = &peer.record;
        let info = &record.node_info;
        let color = record
            .display_color()
            .map_or_else(|| "gray".to_string(), |c| c.to_string());
        let latency = record
            .latency_ms()
            .map_or_else(|| "-".to_string(), |ms| format!("{ms:.1} ms"));
        println!(
            "{}  {:<8} {:<8} {:>3}%  {:<9} {:>9}  {}",
            record.mac,
            color,
            if peer.active { "active" } else { "inactive" },
            info.battery_percent_clamped(),
            format!("{:?}", record.signal_quality()).to_lowercase(),
            latency,
            info.key_config,
        );
    }
    Ok(())
}
