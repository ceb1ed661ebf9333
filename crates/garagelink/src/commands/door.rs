//! One-shot door commands: status, open, close.

use std::time::Duration;

use garagelink_config::{Config, find_accessory};
use garagelink_core::{Bridge, CoreError, DoorState};

use crate::cli::{DoorArgs, MoveArgs};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Current state, asking the device when nothing is cached yet.
async fn read_current(bridge: &Bridge, wait: Duration) -> Result<DoorState, CoreError> {
    let mut pushes = bridge.current_state_stream();
    match bridge.door().get_current_state() {
        Ok(state) => return Ok(state),
        Err(CoreError::NoValueAvailable) => {}
        Err(e) => return Err(e),
    }

    tokio::time::timeout(wait, pushes.changed())
        .await
        .map_err(|_| CoreError::Timeout {
            timeout_secs: wait.as_secs(),
        })?
        .ok_or(CoreError::NotConnected)
}

/// Wait until the door reports `target`.
async fn wait_for_state(bridge: &Bridge, target: DoorState, wait: Duration) -> Result<(), CoreError> {
    let mut pushes = bridge.current_state_stream();
    if pushes.latest() == target {
        return Ok(());
    }

    let settled = async {
        while let Some(state) = pushes.changed().await {
            tracing::debug!(device = bridge.name(), state = %state, "door moving");
            if state == target {
                return Ok(());
            }
        }
        Err(CoreError::NotConnected)
    };

    tokio::time::timeout(wait, settled)
        .await
        .map_err(|_| CoreError::Timeout {
            timeout_secs: wait.as_secs(),
        })?
}

/// Wait for the device to answer a query issued after our command.
/// Requests go out in order, so the answer implies the command was sent.
async fn wait_for_ack(bridge: &Bridge, wait: Duration) -> Result<(), CoreError> {
    let mut events = bridge.subscribe_events();
    let _ = bridge.door().get_current_state();

    tokio::time::timeout(wait, events.changed())
        .await
        .map_err(|_| CoreError::Timeout {
            timeout_secs: wait.as_secs(),
        })?
        .map_err(|_| CoreError::NotConnected)
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn status(args: DoorArgs, cfg: &Config, color: bool) -> Result<(), CliError> {
    let device = find_accessory(cfg, &args.name)?;
    let name = device.name.clone();
    let wait = Duration::from_secs(args.timeout);

    let (current, target) = Bridge::oneshot(device, |bridge| async move {
        let current = read_current(&bridge, wait).await?;
        let target = bridge.door().get_target_state()?;
        Ok((current, target))
    })
    .await
    .map_err(|e| CliError::device(&name, e))?;

    println!("{}", output::status_line(&name, current, target, color));
    Ok(())
}

pub async fn move_door(
    args: MoveArgs,
    requested: DoorState,
    cfg: &Config,
    color: bool,
) -> Result<(), CliError> {
    let device = find_accessory(cfg, &args.door.name)?;
    let name = device.name.clone();
    let wait = Duration::from_secs(args.door.timeout);
    let settle = args.wait;

    let (current, target) = Bridge::oneshot(device, |bridge| async move {
        // Learn where the door is first, so asking for the state it is
        // already in stays a no-op.
        let before = read_current(&bridge, wait).await?;
        let door = bridge.door();
        door.get_target_state()?;
        door.set_target_state(requested)?;

        if before == requested {
            tracing::info!(device = bridge.name(), state = %requested, "door already there");
        } else if settle {
            wait_for_state(&bridge, requested, wait).await?;
        } else {
            wait_for_ack(&bridge, wait).await?;
        }

        let current = bridge.current_state_stream().latest();
        Ok((current, door.get_target_state()?))
    })
    .await
    .map_err(|e| CliError::device(&name, e))?;

    println!("{}", output::status_line(&name, current, target, color));
    Ok(())
}
