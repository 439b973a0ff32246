use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use hapticd::config::{default_config_path, new_shared_config, HapticConfig, SharedConfig};
use hapticd::device::ConsoleHub;
use hapticd::{GameCommand, GameTriggers, Scheduler};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Haptic feedback daemon driven by game events read from stdin
#[derive(Parser, Debug)]
#[command(name = "hapticd")]
#[command(version, about)]
struct Args {
    /// Config file (default: <config dir>/hapticd/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Number of simulated console devices
    #[arg(short, long, default_value_t = 1)]
    devices: usize,

    /// Write the default config to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup(args.verbose)?;

    let config_path = args.config.clone().unwrap_or_else(default_config_path);

    if args.write_default_config {
        HapticConfig::default().save(&config_path).await?;
        info!("Default config written to {:?}", config_path);
        return Ok(());
    }

    if args.config.is_none() {
        HapticConfig::ensure_default(&config_path).await?;
    }
    let config = HapticConfig::load_or_default(&config_path).await;
    let max_intensity = config.max_intensity;
    let config = new_shared_config(config);

    info!(devices = args.devices, "Starting console device hub");
    let hub = Arc::new(ConsoleHub::new(args.devices));
    let scheduler = Scheduler::spawn(hub.clone(), max_intensity)
        .map_err(|e| eyre!("Failed to spawn scheduler: {}", e))?;
    let triggers = GameTriggers::new(scheduler, config.clone(), hub);

    info!("Reading commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                if line.trim().is_empty() || line.trim_start().starts_with('#') {
                    continue;
                }
                match line.parse::<GameCommand>() {
                    Ok(GameCommand::Quit) => break,
                    Ok(GameCommand::Reload) => reload(&triggers, &config_path).await,
                    Ok(command) => dispatch(&triggers, &config, command),
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    info!("Shutting down");
    triggers.disable();
    // give the actuator worker a moment to deliver the stop
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    Ok(())
}

fn dispatch(triggers: &GameTriggers, config: &SharedConfig, command: GameCommand) {
    match command {
        GameCommand::Health {
            current_hp,
            max_hp,
            dead,
        } => triggers.health_updated(current_hp, max_hp, dead),
        GameCommand::Hurt { damage, max_hp } => triggers.damaged(damage, max_hp),
        GameCommand::Death { respawn_ticks } => triggers.died(respawn_ticks),
        GameCommand::Respawn { current_hp, max_hp } => triggers.respawned(current_hp, max_hp),
        GameCommand::Potion => triggers.potion_used(),
        GameCommand::Debuff { duration_ticks } => {
            if !triggers.damage_over_time(duration_ticks) {
                debug!("Debuff pulse not started");
            }
        }
        GameCommand::Vibrate {
            priority,
            duration_ms,
            strength,
            insert_at_front,
            clear_others,
        } => {
            let enabled = config
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .enabled;
            if enabled {
                triggers.scheduler().submit(
                    priority,
                    duration_ms,
                    strength,
                    insert_at_front,
                    clear_others,
                );
            } else {
                warn!("Vibration is disabled in the config");
            }
        }
        GameCommand::Status => {
            let status = triggers.scheduler().status();
            info!(
                active = status.active,
                strength = status.last_applied_strength,
                debuff = triggers.debuff_active(),
                "Queued: {:?}",
                status.queued
            );
        }
        GameCommand::Reset => triggers.reset(),
        GameCommand::Halt => triggers.disable(),
        // handled by the input loop
        GameCommand::Reload | GameCommand::Quit => {}
    }
}

/// Re-reads the config file and applies it. A broken file leaves the running
/// settings untouched.
async fn reload(triggers: &GameTriggers, path: &Path) {
    match HapticConfig::load(path).await {
        Ok(config) => triggers.apply_config(config),
        Err(e) => warn!("Failed to reload config, keeping current settings: {}", e),
    }
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}
