//! `garagelink run`: bridge every configured accessory until Ctrl-C.

use std::path::Path;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use garagelink_config::{Config, resolve_accessories};
use garagelink_core::{Bridge, ConnectionState, DoorState};

use crate::error::CliError;
use crate::output;

pub async fn handle(cfg: &Config, config_path: &Path, color: bool) -> Result<(), CliError> {
    let mut bridges = Vec::new();

    for (index, result) in resolve_accessories(cfg).into_iter().enumerate() {
        match result {
            Ok(device) => bridges.push(Bridge::new(device)),
            // One bad entry must not take the others down with it.
            Err(e) => {
                warn!(entry = index + 1, error = %e, "skipping accessory");
                eprintln!("{}", output::check_line(false, "skipped", &e.to_string(), color));
            }
        }
    }

    if bridges.is_empty() {
        return Err(CliError::NoAccessories {
            path: config_path.display().to_string(),
        });
    }

    let mut reporters = Vec::with_capacity(bridges.len());
    for bridge in &bridges {
        bridge
            .start()
            .map_err(|e| CliError::device(bridge.name(), e))?;
        reporters.push(spawn_reporter(bridge.clone(), color));
    }
    info!(accessories = bridges.len(), "bridging, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    for reporter in &reporters {
        reporter.abort();
    }
    for bridge in &bridges {
        bridge.shutdown().await;
    }
    Ok(())
}

/// Print every state push for one bridge, and prime the state cache each
/// time the link authenticates.
fn spawn_reporter(bridge: Bridge, color: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = bridge.name().to_owned();
        let mut connection = bridge.connection_state();
        let mut current = bridge.current_state_stream();
        let mut target = bridge.target_state_stream();

        loop {
            tokio::select! {
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = connection.borrow_and_update().clone();
                    info!(device = %name, ?state, "connection state changed");
                    if state == ConnectionState::Authenticated {
                        let _ = bridge.door().get_current_state();
                    }
                }
                Some(state) = current.changed() => print_push(&name, "current", state, color),
                Some(state) = target.changed() => print_push(&name, "target", state, color),
            }
        }
    })
}

fn print_push(name: &str, characteristic: &str, state: DoorState, color: bool) {
    println!(
        "{} {name} {characteristic} -> {}",
        chrono::Local::now().format("%H:%M:%S"),
        output::paint_state(state, color)
    );
}
