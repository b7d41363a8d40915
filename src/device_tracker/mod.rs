//! Device Tracker (§4.3): turns raw kernel hotplug observations into the
//! `{appeared, disappeared, changed}` event stream the Reconciler consumes.
//!
//! Owns the `device_path -> fingerprint` index in-process; the only state
//! that crosses the boundary to the Reconciler is [`crate::types::DeviceEvent`].

mod sysfs;

pub use sysfs::{node_index, read_fingerprint};

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use crate::hardware::probe_capabilities;
use crate::types::{CapabilityMap, DeviceEvent, Fingerprint};

/// A raw, un-debounced observation from the Event Ingress layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawAction {
    Add,
    Remove,
}

#[derive(Debug, Clone)]
struct TrackedDevice {
    fingerprint: Fingerprint,
    hardware_name: String,
    lowest_path: String,
    all_paths: BTreeSet<String>,
    capabilities: CapabilityMap,
}

pub struct DeviceTracker {
    debounce: Duration,
    devices: HashMap<String, TrackedDevice>,
    path_to_uid: HashMap<String, String>,
    pending_removal: HashMap<String, Instant>,
}

impl DeviceTracker {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            devices: HashMap::new(),
            path_to_uid: HashMap::new(),
            pending_removal: HashMap::new(),
        }
    }

    /// Handle a kernel "device appeared" observation. Probes the device for
    /// its fingerprint and capabilities itself — Event Ingress only hands
    /// over the path. Returns `None` when the observation is a duplicate of
    /// already-known state (debounce, or a non-lowest-index sub-node).
    pub fn observe_added(&mut self, device_path: &str) -> Option<DeviceEvent> {
        let (fingerprint, hardware_name) = match read_fingerprint(device_path) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("failed to fingerprint {device_path}: {e}");
                return None;
            }
        };
        let capabilities = match probe_capabilities(device_path) {
            Ok(caps) if !caps.is_empty() => caps,
            Ok(_) => {
                log::warn!("{device_path} advertised no capabilities; keeping last known");
                self.last_known_capabilities(&fingerprint.uid())
            }
            Err(e) => {
                log::warn!("capability probe failed for {device_path}: {e}");
                self.last_known_capabilities(&fingerprint.uid())
            }
        };

        self.ingest_added(device_path, fingerprint, hardware_name, capabilities)
    }

    fn last_known_capabilities(&self, uid: &str) -> CapabilityMap {
        self.devices
            .get(uid)
            .map(|d| d.capabilities.clone())
            .unwrap_or_default()
    }

    /// Pure core of [`Self::observe_added`], taking already-probed data so
    /// tests can drive the state machine without touching real hardware.
    pub fn ingest_added(
        &mut self,
        device_path: &str,
        fingerprint: Fingerprint,
        hardware_name: String,
        capabilities: CapabilityMap,
    ) -> Option<DeviceEvent> {
        let uid = fingerprint.uid();
        self.path_to_uid.insert(device_path.to_string(), uid.clone());
        self.pending_removal.remove(&uid);

        match self.devices.get_mut(&uid) {
            None => {
                let mut all_paths = BTreeSet::new();
                all_paths.insert(device_path.to_string());
                self.devices.insert(
                    uid,
                    TrackedDevice {
                        fingerprint: fingerprint.clone(),
                        hardware_name: hardware_name.clone(),
                        lowest_path: device_path.to_string(),
                        all_paths,
                        capabilities: capabilities.clone(),
                    },
                );
                Some(DeviceEvent::Appeared {
                    fingerprint,
                    device_path: device_path.to_string(),
                    hardware_name,
                    capabilities,
                })
            }
            Some(existing) => {
                existing.all_paths.insert(device_path.to_string());
                existing.lowest_path = lowest_indexed(&existing.all_paths);

                // Only the lowest-index node is visible; capability changes
                // reported against a higher-index sub-node are ignored.
                if device_path != existing.lowest_path {
                    return None;
                }

                if existing.capabilities == capabilities {
                    None
                } else {
                    existing.capabilities = capabilities.clone();
                    Some(DeviceEvent::Changed {
                        uid: uid.clone(),
                        device_path: device_path.to_string(),
                        capabilities,
                    })
                }
            }
        }
    }

    /// Handle a kernel "device removed" observation. Emission of
    /// `Disappeared` is deferred to [`Self::tick`] so a quick unplug/replug
    /// flicker across sub-nodes (§4.3) never reaches the Reconciler.
    pub fn observe_removed(&mut self, device_path: &str, now: Instant) {
        let Some(uid) = self.path_to_uid.remove(device_path) else {
            return;
        };
        if let Some(existing) = self.devices.get_mut(&uid) {
            existing.all_paths.remove(device_path);
            if existing.all_paths.is_empty() {
                self.pending_removal.insert(uid, now + self.debounce);
            } else {
                existing.lowest_path = lowest_indexed(&existing.all_paths);
            }
        }
    }

    /// Settle any pending removals whose debounce window has elapsed.
    /// Callers (the Reconciler's timer task) drive this with wall-clock time.
    pub fn tick(&mut self, now: Instant) -> Vec<DeviceEvent> {
        let due: Vec<String> = self
            .pending_removal
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(uid, _)| uid.clone())
            .collect();

        let mut events = Vec::with_capacity(due.len());
        for uid in due {
            self.pending_removal.remove(&uid);
            self.devices.remove(&uid);
            events.push(DeviceEvent::Disappeared { uid });
        }
        events
    }

    pub fn is_connected(&self, uid: &str) -> bool {
        self.devices.contains_key(uid) && !self.pending_removal.contains_key(uid)
    }
}

fn lowest_indexed(paths: &BTreeSet<String>) -> String {
    paths
        .iter()
        .min_by_key(|p| node_index(p).unwrap_or(u32::MAX))
        .cloned()
        .unwrap_or_default()
}
