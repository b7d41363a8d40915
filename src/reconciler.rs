//! Reconciler (§4.8): the control loop. Runs one logical task at a time so
//! no two tasks ever race on desired→observed transitions (§5, §9
//! "coroutine control flow → serialized reconciler").

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::admin::{AdminCommand, AdminOpResult, CameraPatch, SettingsPatch, SystemStatus};
use crate::config::SystemConfig;
use crate::device_tracker::{DeviceTracker, RawAction};
use crate::errors::CoreError;
use crate::hardware::HardwareProbe;
use crate::ingress::IngressEvent;
use crate::profile;
use crate::store::Store;
use crate::supervisor::registration::{self, DesiredWebcam};
use crate::supervisor::{MediaServerClient, OrchestrationClient, RegistrationSync, StreamSupervisor};
use crate::synth;
use crate::types::{CameraRecord, DeviceEvent, ProfileOverrides, SystemSettings};

pub struct Reconciler<SC: MediaServerClient, OC: OrchestrationClient> {
    store: Store,
    tracker: DeviceTracker,
    stream: StreamSupervisor<SC>,
    registration: RegistrationSync<OC>,
    hardware: HardwareProbe,
    config: SystemConfig,
    settings: SystemSettings,
    rtsp_base: String,
    pending_events: Vec<DeviceEvent>,
    last_status: SystemStatus,
}

impl<SC: MediaServerClient, OC: OrchestrationClient> Reconciler<SC, OC> {
    /// Build a Reconciler, seeding the Settings Store's admin-mutable
    /// `SystemSettings` row from `config` the first time it starts against a
    /// fresh store; subsequent starts resume whatever an administrator last
    /// set via [`crate::admin::AdminHandle::update_settings`] (§3, §6).
    pub async fn new(store: Store, stream_client: SC, orchestration_client: OC, config: SystemConfig) -> Result<Self, CoreError> {
        let rtsp_base = format!("rtsp://127.0.0.1:{}", config.mediamtx.rtsp_port);
        let settings = match store.get_system_settings().await? {
            Some(settings) => settings,
            None => {
                let defaults = config.default_settings();
                store.set_system_settings(&defaults).await?;
                defaults
            }
        };
        Ok(Self {
            store,
            tracker: DeviceTracker::new(Duration::from_millis(config.debounce_ms)),
            stream: StreamSupervisor::new(stream_client),
            registration: RegistrationSync::new(orchestration_client),
            hardware: HardwareProbe::detect(),
            config,
            settings,
            rtsp_base,
            pending_events: Vec::new(),
            last_status: SystemStatus::default(),
        })
    }

    /// Drive the control loop until `token` is cancelled. A single
    /// in-flight tick absorbs every trigger that arrives while it runs
    /// (§4.8, §5): the run loop drains all queued ingress events before
    /// starting the next tick rather than starting one tick per event.
    pub async fn run(
        mut self,
        mut ingress_rx: mpsc::Receiver<IngressEvent>,
        mut admin_rx: mpsc::Receiver<AdminCommand>,
        token: CancellationToken,
    ) -> Result<(), CoreError> {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.reconcile_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    log::info!("reconciler shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {}
                Some(event) = ingress_rx.recv() => {
                    self.ingest_raw(event, Instant::now());
                }
                Some(cmd) = admin_rx.recv() => {
                    self.handle_admin(cmd).await;
                    continue;
                }
                else => {
                    log::error!("event ingress channel closed without shutdown signal");
                    return Err(CoreError::Fatal("event ingress lost".to_string()));
                }
            }

            while let Ok(event) = ingress_rx.try_recv() {
                self.ingest_raw(event, Instant::now());
            }

            let budget = Duration::from_secs(self.config.tick_budget_secs);
            match tokio::time::timeout(budget, self.tick(Instant::now())).await {
                Ok(Ok(sync_errors)) => {
                    for err in &sync_errors {
                        log::warn!("sync error: {err}");
                    }
                }
                Ok(Err(e)) if e.is_fatal() => {
                    log::error!("fatal reconciler error: {e}");
                    return Err(e);
                }
                Ok(Err(e)) => {
                    log::warn!("recoverable reconciler error, retrying next tick: {e}");
                }
                Err(_) => {
                    log::warn!("reconcile tick exceeded budget of {budget:?}");
                }
            }
        }
    }

    fn ingest_raw(&mut self, event: IngressEvent, now: Instant) {
        match event.action {
            RawAction::Add => {
                if let Some(device_event) = self.tracker.observe_added(&event.path) {
                    self.pending_events.push(device_event);
                }
            }
            RawAction::Remove => self.tracker.observe_removed(&event.path, now),
        }
    }

    /// Run one reconcile tick (§4.8 steps 1-6).
    pub async fn tick(&mut self, now: Instant) -> Result<Vec<String>, CoreError> {
        let mut events = std::mem::take(&mut self.pending_events);
        events.extend(self.tracker.tick(now));
        for event in events {
            self.apply_device_event(event).await?;
        }

        let records = self.store.list().await?;
        let mut sync_errors = Vec::new();

        let mediamtx_up = self.probe_health(self.stream.health()).await;
        if mediamtx_up {
            let desired: HashMap<String, String> = records
                .iter()
                .filter(|r| r.enabled && r.connected)
                .map(|r| (r.uid.clone(), synth::command_hash(&synth::synthesize(r, &self.rtsp_base))))
                .collect();
            match self.stream.reconcile(&desired, now).await {
                Ok(errs) => sync_errors.extend(errs),
                Err(e) => sync_errors.push(format!("stream supervisor: {e}")),
            }
        } else {
            sync_errors.push("mediamtx unreachable, skipping stream supervisor this tick".to_string());
        }

        let moonraker_up = self.probe_health(self.registration.health()).await;
        if moonraker_up {
            let desired: HashMap<String, DesiredWebcam> = records
                .iter()
                .filter(|r| r.enabled && r.connected && r.moonraker_enabled)
                .map(|r| (r.uid.clone(), registration::render_urls(&self.settings.base_host, &r.uid, &r.friendly_name)))
                .collect();
            match self.registration.reconcile(&desired, now).await {
                Ok(errs) => sync_errors.extend(errs),
                Err(e) => sync_errors.push(format!("registration sync: {e}")),
            }
        } else {
            sync_errors.push("moonraker unreachable, skipping registration sync this tick".to_string());
        }

        self.last_status = SystemStatus {
            cameras_total: records.len(),
            cameras_connected: records.iter().filter(|r| r.connected).count(),
            mediamtx_reachable: mediamtx_up,
            moonraker_reachable: moonraker_up,
            last_tick_at: Some(Utc::now()),
        };

        Ok(sync_errors)
    }

    async fn probe_health(&self, call: impl std::future::Future<Output = Result<(), CoreError>>) -> bool {
        tokio::time::timeout(Duration::from_secs(self.config.call_timeout_secs), call)
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    /// Current in-memory `SystemSettings`, for inspection without a round
    /// trip through the admin channel.
    pub fn get_settings(&self) -> &SystemSettings {
        &self.settings
    }

    /// Apply one Device Tracker event to the store without waiting for a
    /// full tick. Exposed so callers (and tests) can inject a
    /// pre-fingerprinted event without a real UVC device attached, the way
    /// `device_tracker::ingest_added` takes pre-probed data for the same
    /// reason.
    pub async fn apply_device_event(&mut self, event: DeviceEvent) -> Result<(), CoreError> {
        match event {
            DeviceEvent::Appeared { fingerprint, device_path, hardware_name, capabilities } => {
                let uid = fingerprint.uid();
                match self.store.get(&uid).await? {
                    Some(mut record) => {
                        record.device_path = Some(device_path);
                        record.hardware_name = hardware_name;
                        if !capabilities.is_empty() {
                            record.capabilities = capabilities;
                        }
                        record.connected = true;
                        record.updated_at = Utc::now();
                        self.store.upsert(record).await?;
                    }
                    None => {
                        let effective_score = self.hardware.effective_score();
                        let profile = profile::select(&capabilities, effective_score, &ProfileOverrides::default(), self.hardware.encoders(), self.settings.cpu_threshold);
                        if let Some(warning) = &profile.warning {
                            self.store.log_event("warn", Some(&uid), warning).await.ok();
                        }
                        let record = CameraRecord::new(fingerprint, hardware_name, Some(device_path), capabilities, profile);
                        self.store.upsert(record).await?;
                    }
                }
            }
            DeviceEvent::Disappeared { uid } => {
                if let Some(mut record) = self.store.get(&uid).await? {
                    record.connected = false;
                    record.device_path = None;
                    record.updated_at = Utc::now();
                    self.store.upsert(record).await?;
                }
            }
            DeviceEvent::Changed { uid, device_path, capabilities } => {
                if let Some(mut record) = self.store.get(&uid).await? {
                    record.device_path = Some(device_path);
                    if !capabilities.is_empty() {
                        record.capabilities = capabilities;
                    }
                    record.updated_at = Utc::now();
                    self.store.upsert(record).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_admin(&mut self, cmd: AdminCommand) {
        match cmd {
            AdminCommand::ListCameras(respond) => {
                let _ = respond.send(self.store.list().await);
            }
            AdminCommand::UpdateCamera { uid, patch, respond } => {
                let result = self.update_camera(&uid, patch).await;
                let _ = respond.send(result);
            }
            AdminCommand::DeleteCamera { uid, respond } => {
                let result = self.delete_camera(&uid).await;
                let _ = respond.send(result);
            }
            AdminCommand::AddDevice { device_path, overrides, respond } => {
                let result = self.add_device(&device_path, overrides).await;
                let _ = respond.send(result);
            }
            AdminCommand::ForceReconcile(respond) => {
                let result = self.tick(Instant::now()).await.map(|sync_errors| AdminOpResult { value: (), sync_errors });
                let _ = respond.send(result);
            }
            AdminCommand::SystemStatus(respond) => {
                let _ = respond.send(self.last_status.clone());
            }
            AdminCommand::GetSettings(respond) => {
                let _ = respond.send(Ok(self.settings.clone()));
            }
            AdminCommand::UpdateSettings { patch, respond } => {
                let result = self.update_settings(patch).await;
                let _ = respond.send(result);
            }
        }
    }

    /// Apply an administrator's partial update to the persisted
    /// `SystemSettings` row, taking effect starting with the next reconcile
    /// tick (§3, §6). `pub` for the same test-injection reason as
    /// [`Self::apply_device_event`]: exercising the admin path without
    /// driving the full [`Self::run`] channel plumbing.
    pub async fn update_settings(&mut self, patch: SettingsPatch) -> Result<SystemSettings, CoreError> {
        if let Some(base_host) = patch.base_host {
            self.settings.base_host = base_host;
        }
        if let Some(orchestration_base_url) = patch.orchestration_base_url {
            self.settings.orchestration_base_url = orchestration_base_url;
        }
        if let Some(cpu_threshold) = patch.cpu_threshold {
            self.settings.cpu_threshold = cpu_threshold;
        }
        if let Some(log_level) = patch.log_level {
            self.settings.log_level = log_level;
        }
        self.store.set_system_settings(&self.settings).await?;
        Ok(self.settings.clone())
    }

    async fn update_camera(&mut self, uid: &str, patch: CameraPatch) -> Result<AdminOpResult<CameraRecord>, CoreError> {
        let mut record = self
            .store
            .get(uid)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no camera with uid {uid}")))?;

        if let Some(name) = patch.friendly_name {
            record.friendly_name = name;
        }
        if let Some(overrides) = patch.overrides {
            let effective_score = self.hardware.effective_score();
            let profile = profile::select(&record.capabilities, effective_score, &overrides, self.hardware.encoders(), self.settings.cpu_threshold);
            record.format = profile.format;
            record.resolution = profile.resolution;
            record.framerate = profile.framerate;
            record.bitrate = profile.bitrate;
            record.encoder = profile.encoder;
        }
        if let Some(rotation) = patch.rotation {
            record.rotation = rotation;
        }
        if let Some(controls) = patch.controls {
            record.controls = controls;
        }
        if let Some(enabled) = patch.moonraker_enabled {
            record.moonraker_enabled = enabled;
        }
        if let Some(enabled) = patch.enabled {
            record.enabled = enabled;
        }
        record.updated_at = Utc::now();

        self.store.upsert(record.clone()).await?;
        let sync_errors = self.tick(Instant::now()).await?;
        Ok(AdminOpResult { value: record, sync_errors })
    }

    async fn delete_camera(&mut self, uid: &str) -> Result<AdminOpResult<()>, CoreError> {
        self.store
            .get(uid)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no camera with uid {uid}")))?;
        self.store.delete(uid).await?;
        let sync_errors = self.tick(Instant::now()).await?;
        Ok(AdminOpResult { value: (), sync_errors })
    }

    async fn add_device(&mut self, device_path: &str, overrides: ProfileOverrides) -> Result<AdminOpResult<CameraRecord>, CoreError> {
        if let Some(device_event) = self.tracker.observe_added(device_path) {
            self.apply_device_event(device_event).await?;
        }

        let devices = self.store.list().await?;
        let record = devices
            .into_iter()
            .find(|r| r.device_path.as_deref() == Some(device_path))
            .ok_or_else(|| CoreError::BadRequest(format!("could not fingerprint {device_path}")))?;

        let result = self.update_camera(&record.uid, CameraPatch { overrides: Some(overrides), ..Default::default() }).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_tracker::RawAction;
    use crate::supervisor::{DesiredWebcam, MediaServerClient, OrchestrationClient};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeStreamClient {
        paths: StdMutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl MediaServerClient for FakeStreamClient {
        async fn health(&self) -> Result<(), CoreError> {
            Ok(())
        }
        async fn list_paths(&self) -> Result<HashMap<String, String>, CoreError> {
            Ok(self.paths.lock().unwrap().clone())
        }
        async fn create_path(&self, name: &str, command: &str) -> Result<(), CoreError> {
            self.paths.lock().unwrap().insert(name.to_string(), command.to_string());
            Ok(())
        }
        async fn delete_path(&self, name: &str) -> Result<(), CoreError> {
            self.paths.lock().unwrap().remove(name);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeOrchestrationClient {
        webcams: StdMutex<HashMap<String, DesiredWebcam>>,
    }

    #[async_trait]
    impl OrchestrationClient for FakeOrchestrationClient {
        async fn health(&self) -> Result<(), CoreError> {
            Ok(())
        }
        async fn list_webcams(&self) -> Result<HashMap<String, DesiredWebcam>, CoreError> {
            Ok(self.webcams.lock().unwrap().clone())
        }
        async fn upsert_webcam(&self, uid: &str, webcam: &DesiredWebcam) -> Result<(), CoreError> {
            self.webcams.lock().unwrap().insert(uid.to_string(), webcam.clone());
            Ok(())
        }
        async fn delete_webcam(&self, uid: &str) -> Result<(), CoreError> {
            self.webcams.lock().unwrap().remove(uid);
            Ok(())
        }
    }

    async fn test_reconciler() -> Reconciler<FakeStreamClient, FakeOrchestrationClient> {
        let store = Store::open_in_memory().unwrap();
        Reconciler::new(store, FakeStreamClient::default(), FakeOrchestrationClient::default(), SystemConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_plugin_creates_record_path_and_registration() {
        let mut reconciler = test_reconciler().await;
        let fingerprint = crate::types::Fingerprint::new(0x046d, 0x0825, Some("ABC123".into()), "usb-1-1".into());
        let uid = fingerprint.uid();

        let mut capabilities = std::collections::BTreeMap::new();
        let mut resolutions = std::collections::BTreeMap::new();
        resolutions.insert(crate::types::Resolution::new(1280, 720), vec![30, 15]);
        resolutions.insert(crate::types::Resolution::new(640, 480), vec![30]);
        capabilities.insert(crate::types::PixelFormat::Mjpeg, resolutions);

        reconciler
            .apply_device_event(DeviceEvent::Appeared {
                fingerprint,
                device_path: "/dev/video0".to_string(),
                hardware_name: "Example Cam".to_string(),
                capabilities,
            })
            .await
            .unwrap();

        let sync_errors = reconciler.tick(Instant::now()).await.unwrap();
        assert!(sync_errors.is_empty());

        let record = reconciler.store.get(&uid).await.unwrap().unwrap();
        assert_eq!(record.format, crate::types::PixelFormat::Mjpeg);
        assert_eq!(record.resolution, crate::types::Resolution::new(1280, 720));

        assert!(reconciler.stream.health().await.is_ok());
    }

    #[tokio::test]
    async fn second_identical_tick_issues_no_operations() {
        let mut reconciler = test_reconciler().await;
        let fingerprint = crate::types::Fingerprint::new(0x046d, 0x0825, Some("ABC123".into()), "usb-1-1".into());

        let mut capabilities = std::collections::BTreeMap::new();
        let mut resolutions = std::collections::BTreeMap::new();
        resolutions.insert(crate::types::Resolution::new(1280, 720), vec![30]);
        capabilities.insert(crate::types::PixelFormat::Mjpeg, resolutions);

        reconciler
            .apply_device_event(DeviceEvent::Appeared {
                fingerprint,
                device_path: "/dev/video0".to_string(),
                hardware_name: "Example Cam".to_string(),
                capabilities,
            })
            .await
            .unwrap();

        reconciler.tick(Instant::now()).await.unwrap();
        let errors_second = reconciler.tick(Instant::now()).await.unwrap();
        assert!(errors_second.is_empty());
    }

    #[tokio::test]
    async fn ingest_raw_routes_add_and_remove() {
        let mut reconciler = test_reconciler().await;
        reconciler.ingest_raw(IngressEvent { path: "/dev/video0".to_string(), action: RawAction::Remove }, Instant::now());
        // Removing an unknown path is a no-op, not a panic.
        assert!(reconciler.pending_events.is_empty());
    }

    #[tokio::test]
    async fn update_settings_persists_base_host_across_new_reconciler_over_same_store() {
        let store = Store::open_in_memory().unwrap();
        let mut reconciler = Reconciler::new(
            store.clone(),
            FakeStreamClient::default(),
            FakeOrchestrationClient::default(),
            SystemConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(reconciler.settings.base_host, "localhost");
        let updated = reconciler
            .update_settings(SettingsPatch { base_host: Some("printer.local".to_string()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.base_host, "printer.local");

        let restarted = Reconciler::new(store, FakeStreamClient::default(), FakeOrchestrationClient::default(), SystemConfig::default())
            .await
            .unwrap();
        assert_eq!(restarted.settings.base_host, "printer.local");
    }
}
