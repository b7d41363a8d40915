//! End-to-end convergence scenarios (S1-S6) driving the Reconciler through
//! its public surface: no real UVC hardware or live MediaMTX/Moonraker
//! instance, just the Settings Store and a pair of in-memory fake clients.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use async_trait::async_trait;

use ravens_perch::config::SystemConfig;
use ravens_perch::errors::CoreError;
use ravens_perch::reconciler::Reconciler;
use ravens_perch::store::Store;
use ravens_perch::supervisor::{DesiredWebcam, MediaServerClient, OrchestrationClient};
use ravens_perch::testing::{s1_capabilities, s1_fingerprint, second_identical_camera_fingerprint};
use ravens_perch::types::DeviceEvent;

#[derive(Clone, Default)]
struct FakeMediaServer {
    paths: Arc<StdMutex<HashMap<String, String>>>,
    healthy: Arc<AtomicBool>,
}

impl FakeMediaServer {
    fn new() -> Self {
        Self { paths: Arc::default(), healthy: Arc::new(AtomicBool::new(true)) }
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn paths_snapshot(&self) -> HashMap<String, String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaServerClient for FakeMediaServer {
    async fn health(&self) -> Result<(), CoreError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::Unreachable("mediamtx down".to_string()))
        }
    }
    async fn list_paths(&self) -> Result<HashMap<String, String>, CoreError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(CoreError::Unreachable("mediamtx down".to_string()));
        }
        Ok(self.paths_snapshot())
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

#[derive(Clone, Default)]
struct FakeOrchestration {
    webcams: Arc<StdMutex<HashMap<String, DesiredWebcam>>>,
}

impl FakeOrchestration {
    fn webcams_snapshot(&self) -> HashMap<String, DesiredWebcam> {
        self.webcams.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrchestrationClient for FakeOrchestration {
    async fn health(&self) -> Result<(), CoreError> {
        Ok(())
    }
    async fn list_webcams(&self) -> Result<HashMap<String, DesiredWebcam>, CoreError> {
        Ok(self.webcams_snapshot())
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

fn appeared_s1() -> DeviceEvent {
    DeviceEvent::Appeared {
        fingerprint: s1_fingerprint(),
        device_path: "/dev/video0".to_string(),
        hardware_name: "Example Webcam".to_string(),
        capabilities: s1_capabilities(),
    }
}

struct Harness {
    reconciler: Reconciler<FakeMediaServer, FakeOrchestration>,
    store: Store,
    media: FakeMediaServer,
    orchestration: FakeOrchestration,
}

async fn harness() -> Harness {
    let store = Store::open_in_memory().unwrap();
    let media = FakeMediaServer::new();
    let orchestration = FakeOrchestration::default();
    let reconciler = Reconciler::new(store.clone(), media.clone(), orchestration.clone(), SystemConfig::default())
        .await
        .unwrap();
    Harness { reconciler, store, media, orchestration }
}

#[tokio::test]
async fn s1_first_plugin_creates_path_and_registration() {
    let mut h = harness().await;
    h.reconciler.apply_device_event(appeared_s1()).await.unwrap();
    let sync_errors = h.reconciler.tick(Instant::now()).await.unwrap();
    assert!(sync_errors.is_empty());

    let uid = s1_fingerprint().uid();
    let record = h.store.get(&uid).await.unwrap().unwrap();
    assert_eq!(record.format, ravens_perch::types::PixelFormat::Mjpeg);
    assert_eq!(record.resolution, ravens_perch::types::Resolution::new(1280, 720));
    assert_eq!(record.framerate, 30);
    assert_eq!(record.bitrate, 4_000_000);

    assert_eq!(h.media.paths_snapshot().len(), 1);
    let webcams = h.orchestration.webcams_snapshot();
    let webcam = webcams.get(&uid).unwrap();
    assert_eq!(webcam.stream_url, format!("http://localhost:8889/{uid}/"));
    assert_eq!(webcam.name, record.friendly_name);
}

#[tokio::test]
async fn s2_unplug_replug_preserves_uid_and_registration() {
    let mut h = harness().await;
    h.reconciler.apply_device_event(appeared_s1()).await.unwrap();
    h.reconciler.tick(Instant::now()).await.unwrap();
    let uid = s1_fingerprint().uid();
    let paths_after_first = h.media.paths_snapshot();

    // A disappear immediately followed by a reappear (e.g. a brief USB
    // glitch) coalesces into the single next tick, the same way a burst of
    // ingress events collapses into one reconcile pass: the stream and
    // registration supervisors only ever observe the terminal `connected`
    // state, so the path and registration are never actually torn down.
    h.reconciler.apply_device_event(DeviceEvent::Disappeared { uid: uid.clone() }).await.unwrap();
    h.reconciler.apply_device_event(appeared_s1()).await.unwrap();
    h.reconciler.tick(Instant::now()).await.unwrap();

    let record = h.store.get(&uid).await.unwrap().unwrap();
    assert!(record.connected);

    // No new UID was minted and the idempotent recreate left the same path set.
    assert_eq!(h.media.paths_snapshot(), paths_after_first);
    assert!(h.orchestration.webcams_snapshot().contains_key(&uid));
}

#[tokio::test]
async fn s3_overrides_persist_across_restart() {
    let store = Store::open_in_memory().unwrap();
    let media = FakeMediaServer::new();
    let orchestration = FakeOrchestration::default();
    let mut reconciler = Reconciler::new(store.clone(), media.clone(), orchestration.clone(), SystemConfig::default())
        .await
        .unwrap();

    reconciler.apply_device_event(appeared_s1()).await.unwrap();
    reconciler.tick(Instant::now()).await.unwrap();

    let uid = s1_fingerprint().uid();
    let mut record = store.get(&uid).await.unwrap().unwrap();
    record.resolution = ravens_perch::types::Resolution::new(640, 480);
    record.framerate = 30;
    record.bitrate = 1_000_000;
    store.upsert(record).await.unwrap();
    reconciler.tick(Instant::now()).await.unwrap();

    // Simulate a process restart: a fresh Reconciler over the same store.
    let mut restarted = Reconciler::new(store.clone(), media.clone(), orchestration.clone(), SystemConfig::default())
        .await
        .unwrap();
    let errors_first_tick = restarted.tick(Instant::now()).await.unwrap();
    assert!(errors_first_tick.is_empty());

    let command = media.paths_snapshot().get(&uid).unwrap().clone();
    assert!(command.contains("640x480"));
    assert!(!command.contains("1280x720"));

    let paths_after_first = media.paths_snapshot();
    let errors_second_tick = restarted.tick(Instant::now()).await.unwrap();
    assert!(errors_second_tick.is_empty());
    assert_eq!(media.paths_snapshot(), paths_after_first);
}

#[tokio::test]
async fn s4_disable_deletes_path_and_registration_but_keeps_record() {
    let mut h = harness().await;
    h.reconciler.apply_device_event(appeared_s1()).await.unwrap();
    h.reconciler.tick(Instant::now()).await.unwrap();

    let uid = s1_fingerprint().uid();
    let mut record = h.store.get(&uid).await.unwrap().unwrap();
    record.enabled = false;
    h.store.upsert(record).await.unwrap();
    h.reconciler.tick(Instant::now()).await.unwrap();

    assert!(h.media.paths_snapshot().is_empty());
    assert!(h.orchestration.webcams_snapshot().is_empty());

    let record = h.store.get(&uid).await.unwrap().unwrap();
    assert!(!record.enabled);
}

#[tokio::test]
async fn s5_two_identical_cameras_get_distinct_uids() {
    let mut h = harness().await;
    h.reconciler.apply_device_event(appeared_s1()).await.unwrap();
    h.reconciler
        .apply_device_event(DeviceEvent::Appeared {
            fingerprint: second_identical_camera_fingerprint(),
            device_path: "/dev/video1".to_string(),
            hardware_name: "Example Webcam".to_string(),
            capabilities: s1_capabilities(),
        })
        .await
        .unwrap();
    h.reconciler.tick(Instant::now()).await.unwrap();

    let uid_a = s1_fingerprint().uid();
    let uid_b = second_identical_camera_fingerprint().uid();
    assert_ne!(uid_a, uid_b);

    assert_eq!(h.media.paths_snapshot().len(), 2);
    assert_eq!(h.orchestration.webcams_snapshot().len(), 2);
}

#[tokio::test]
async fn s6_streaming_server_down_skips_stream_but_registration_still_runs() {
    let mut h = harness().await;
    h.media.set_healthy(false);

    h.reconciler.apply_device_event(appeared_s1()).await.unwrap();
    let sync_errors = h.reconciler.tick(Instant::now()).await.unwrap();

    assert!(h.media.paths_snapshot().is_empty());
    assert!(sync_errors.iter().any(|e| e.contains("mediamtx")));

    let uid = s1_fingerprint().uid();
    assert!(h.orchestration.webcams_snapshot().contains_key(&uid));

    h.media.set_healthy(true);
    let sync_errors = h.reconciler.tick(Instant::now()).await.unwrap();
    assert!(sync_errors.is_empty());
    assert!(h.media.paths_snapshot().contains_key(&uid));
}

#[tokio::test]
async fn s7_admin_base_host_update_is_persisted_and_reflected_in_registration() {
    let mut h = harness().await;
    h.reconciler.apply_device_event(appeared_s1()).await.unwrap();
    h.reconciler.tick(Instant::now()).await.unwrap();

    let uid = s1_fingerprint().uid();
    assert_eq!(
        h.orchestration.webcams_snapshot().get(&uid).unwrap().stream_url,
        format!("http://localhost:8889/{uid}/")
    );

    h.reconciler
        .update_settings(ravens_perch::admin::SettingsPatch {
            base_host: Some("printer.local".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    h.reconciler.tick(Instant::now()).await.unwrap();

    assert_eq!(
        h.orchestration.webcams_snapshot().get(&uid).unwrap().stream_url,
        format!("http://printer.local:8889/{uid}/")
    );

    // The new base_host survives a process restart over the same store.
    let restarted = Reconciler::new(h.store.clone(), h.media.clone(), h.orchestration.clone(), SystemConfig::default())
        .await
        .unwrap();
    assert_eq!(restarted.get_settings().base_host, "printer.local");
}
