//! Event Ingress (§4.9): the Reconciler's only source of device hotplug
//! information. Owns exactly one of two mutually exclusive modes, chosen
//! once at startup — never switched live.

mod poll;
mod subscription;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device_tracker::RawAction;

/// A normalized `{path, action}` message posted to the Device Tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressEvent {
    pub path: String,
    pub action: RawAction,
}

/// Start event ingress. Tries kernel uevent subscription first; if that
/// fails (e.g. no udev, insufficient permissions), falls back to polling
/// for the remainder of the process lifetime.
pub fn spawn(
    tx: mpsc::Sender<IngressEvent>,
    token: CancellationToken,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match subscription::run(tx.clone(), token.clone()).await {
            Ok(()) => {}
            Err(e) => {
                log::warn!("kernel uevent subscription unavailable ({e}), falling back to polling");
                poll::run(tx, token, poll_interval).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_tracker::RawAction;

    #[test]
    fn ingress_event_equality_is_by_value() {
        let a = IngressEvent {
            path: "/dev/video0".to_string(),
            action: RawAction::Add,
        };
        let b = IngressEvent {
            path: "/dev/video0".to_string(),
            action: RawAction::Add,
        };
        assert_eq!(a, b);
    }
}
