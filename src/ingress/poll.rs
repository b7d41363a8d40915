//! Polling fallback (§4.9): periodic `/dev/video*` enumeration, chosen only
//! when kernel uevent subscription fails at startup.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::device_tracker::RawAction;

use super::IngressEvent;

fn list_video_nodes() -> BTreeSet<String> {
    let Ok(entries) = std::fs::read_dir("/dev") else {
        return BTreeSet::new();
    };
    entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            if name.starts_with("video") && name["video".len()..].parse::<u32>().is_ok() {
                Some(format!("/dev/{name}"))
            } else {
                None
            }
        })
        .collect()
}

/// Scan `/dev/video*` every `interval`, diffing against the previous scan,
/// and post synthesized add/remove messages. Runs until `token` is
/// cancelled.
pub async fn run(tx: mpsc::Sender<IngressEvent>, token: CancellationToken, interval: Duration) {
    log::info!("event ingress running in polling mode (interval={interval:?})");
    let mut known = list_video_nodes();

    for path in &known {
        if tx
            .send(IngressEvent {
                path: path.clone(),
                action: RawAction::Add,
            })
            .await
            .is_err()
        {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("event ingress polling loop shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let current = list_video_nodes();

        for added in current.difference(&known) {
            if tx
                .send(IngressEvent {
                    path: added.clone(),
                    action: RawAction::Add,
                })
                .await
                .is_err()
            {
                return;
            }
        }
        for removed in known.difference(&current) {
            if tx
                .send(IngressEvent {
                    path: removed.clone(),
                    action: RawAction::Remove,
                })
                .await
                .is_err()
            {
                return;
            }
        }

        known = current;
    }
}
