//! Kernel uevent subscription, filtered to the `video4linux` subsystem.
//!
//! Wraps `udev::MonitorSocket` in `tokio::io::unix::AsyncFd` so the blocking
//! netlink socket participates in the same cooperative task set as every
//! other suspension point in the Reconciler (§5).

use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use udev::{EventType, MonitorBuilder};

use crate::device_tracker::RawAction;
use crate::errors::CoreError;

use super::IngressEvent;

/// Run the subscription loop until `token` is cancelled. Returns an error
/// only if the subscription could not be established at all — once
/// running, socket read errors are logged and the loop continues.
pub async fn run(tx: mpsc::Sender<IngressEvent>, token: CancellationToken) -> Result<(), CoreError> {
    let socket = MonitorBuilder::new()
        .map_err(|e| CoreError::Fatal(format!("udev monitor builder: {e}")))?
        .match_subsystem("video4linux")
        .map_err(|e| CoreError::Fatal(format!("udev match_subsystem: {e}")))?
        .listen()
        .map_err(|e| CoreError::Fatal(format!("udev monitor listen: {e}")))?;

    let mut async_fd = AsyncFd::new(socket)
        .map_err(|e| CoreError::Fatal(format!("registering udev socket with reactor: {e}")))?;

    log::info!("subscribed to kernel video4linux uevents");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("event ingress subscription shutting down");
                return Ok(());
            }
            guard = async_fd.readable_mut() => {
                let mut guard = match guard {
                    Ok(g) => g,
                    Err(e) => {
                        log::warn!("udev socket readiness error: {e}");
                        continue;
                    }
                };

                for event in guard.get_inner().iter() {
                    let Some(devnode) = event.devnode() else { continue };
                    let Some(path) = devnode.to_str() else { continue };
                    let action = match event.event_type() {
                        EventType::Add | EventType::Change => RawAction::Add,
                        EventType::Remove => RawAction::Remove,
                        _ => continue,
                    };
                    if tx
                        .send(IngressEvent { path: path.to_string(), action })
                        .await
                        .is_err()
                    {
                        log::info!("ingress channel closed, stopping subscription");
                        return Ok(());
                    }
                }
                guard.clear_ready();
            }
        }
    }
}
