//! Subcommand execution.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wapoll_runtime::{LoopbackBackend, MessagingBackend, PollService};
use wapoll_settings::{WapollSettings, load_settings_from_path, settings_path};
use wapoll_store::DeviceIdentity;

use crate::cli::{BackendKind, Cli, Command};
use crate::render::{PairingRenderer, PlainRenderer, TerminalRenderer};

/// Load settings for `cli`: file (or `--settings`), env, then flags.
pub fn resolve_settings(cli: &Cli) -> anyhow::Result<WapollSettings> {
    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;
    apply_cli_overrides(&mut settings, cli);
    Ok(settings)
}

/// Apply command-line flags over loaded settings.
pub fn apply_cli_overrides(settings: &mut WapollSettings, cli: &Cli) {
    if let Some(url) = &cli.database_url {
        settings.store.database_url.clone_from(url);
    }
    if let Command::Poll { to: Some(to), .. } = &cli.command {
        settings.poll.destination = Some(to.clone());
    }
}

/// Prefix for every line printed while running against a simulated backend.
const SIMULATED: &str = "[simulated] ";

/// Backend for `kind`. No real network backend ships with this build, so an
/// unset choice is an error rather than a silent fallback to the simulator.
pub fn select_backend(kind: Option<BackendKind>) -> anyhow::Result<Arc<dyn MessagingBackend>> {
    match kind {
        Some(BackendKind::Loopback) => {
            warn!("running against the loopback simulator: nothing is sent to the network");
            Ok(Arc::new(LoopbackBackend::new()))
        }
        None => anyhow::bail!(
            "no messaging backend configured; pass `--backend loopback` to run against the in-process simulator"
        ),
    }
}

/// Run the parsed command against `backend`.
pub async fn run(
    cli: Cli,
    settings: Arc<WapollSettings>,
    backend: Arc<dyn MessagingBackend>,
) -> anyhow::Result<()> {
    let backend_is_simulated = backend.is_simulated();
    let service = PollService::new(Arc::clone(&settings), backend)
        .context("opening identity store")?;
    let mut stdout = std::io::stdout();
    let tag = if backend_is_simulated { SIMULATED } else { "" };

    match cli.command {
        Command::Login => {
            let renderer: &dyn PairingRenderer = if cli.plain {
                &PlainRenderer
            } else {
                &TerminalRenderer
            };
            match service.login_code().await? {
                Some(code) => {
                    if backend_is_simulated {
                        writeln!(stdout, "{tag}this code does not link a real device")?;
                    }
                    renderer.render(&code, &mut stdout)?;
                }
                None => warn!("backend closed the pairing channel without issuing a code"),
            }
        }
        Command::Logout => {
            service.logout().await?;
            writeln!(stdout, "{tag}Logged out.")?;
        }
        Command::Listen { seconds } => {
            let duration = Duration::from_secs(seconds.unwrap_or(settings.session.listen_seconds));
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            let _ = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, stopping");
                    on_signal.cancel();
                }
            });
            service.listen(duration, cancel).await?;
        }
        Command::Poll {
            question,
            options,
            selectable,
            ..
        } => {
            let question = question.unwrap_or_else(|| settings.poll.question.clone());
            let options = if options.is_empty() {
                settings.poll.options.clone()
            } else {
                options
            };
            let selectable = selectable.unwrap_or(settings.poll.selectable_count);
            let receipt = service
                .create_poll(&question, options, selectable)
                .await
                .context("poll was not sent")?;
            writeln!(
                stdout,
                "{tag}Poll sent to {} ({})",
                receipt.recipient, receipt.message_id
            )?;
        }
        Command::Devices { json } => {
            let devices = service.devices()?;
            if json {
                writeln!(stdout, "{}", serde_json::to_string_pretty(&devices)?)?;
            } else if devices.is_empty() {
                writeln!(stdout, "{tag}No devices. Run `wapoll login` to pair one.")?;
            } else {
                for device in &devices {
                    writeln!(stdout, "{tag}{}", device_line(device))?;
                }
            }
        }
    }
    Ok(())
}

fn device_line(device: &DeviceIdentity) -> String {
    let account = device
        .jid
        .as_ref()
        .map_or_else(|| "(unpaired)".to_string(), ToString::to_string);
    match &device.push_name {
        Some(name) => format!("{}  {account}  {name}", device.id),
        None => format!("{}  {account}", device.id),
    }
}
