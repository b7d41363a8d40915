//! Administrative surface (§6, consumed by this core): an in-process
//! request/response boundary. Serving the HTTP/HTML admin UI itself is out
//! of scope (§1) — an external layer not built here holds an [`AdminHandle`]
//! and translates its requests to it, mirroring the way the teacher's
//! `platform::device_monitor` exposes an actor over `tokio::sync::mpsc`.

use tokio::sync::{mpsc, oneshot};

use crate::errors::CoreError;
use crate::types::{CameraRecord, ProfileOverrides, Rotation, SystemSettings};

/// Partial update to a camera record; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct CameraPatch {
    pub friendly_name: Option<String>,
    pub overrides: Option<ProfileOverrides>,
    pub rotation: Option<Rotation>,
    pub controls: Option<std::collections::BTreeMap<String, i64>>,
    pub moonraker_enabled: Option<bool>,
    pub enabled: Option<bool>,
}

/// Partial update to the singleton [`SystemSettings`] row; `None` fields are
/// left unchanged. `cpu_threshold` and `orchestration_base_url` take effect
/// on the next reconcile tick; `base_host` takes effect on the Registration
/// Sync desired set it renders (§4.7).
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub base_host: Option<String>,
    pub orchestration_base_url: Option<String>,
    pub cpu_threshold: Option<u8>,
    pub log_level: Option<String>,
}

/// Result of a mutating admin operation: the operation's own outcome plus
/// whatever sync errors the ensuing reconcile tick reported. Mirrors
/// spec's `{ok, sync_errors: [...]}` response shape.
#[derive(Debug, Clone)]
pub struct AdminOpResult<T> {
    pub value: T,
    pub sync_errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SystemStatus {
    pub cameras_total: usize,
    pub cameras_connected: usize,
    pub mediamtx_reachable: bool,
    pub moonraker_reachable: bool,
    pub last_tick_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub enum AdminCommand {
    ListCameras(oneshot::Sender<Result<Vec<CameraRecord>, CoreError>>),
    UpdateCamera {
        uid: String,
        patch: CameraPatch,
        respond: oneshot::Sender<Result<AdminOpResult<CameraRecord>, CoreError>>,
    },
    DeleteCamera {
        uid: String,
        respond: oneshot::Sender<Result<AdminOpResult<()>, CoreError>>,
    },
    AddDevice {
        device_path: String,
        overrides: ProfileOverrides,
        respond: oneshot::Sender<Result<AdminOpResult<CameraRecord>, CoreError>>,
    },
    ForceReconcile(oneshot::Sender<Result<AdminOpResult<()>, CoreError>>),
    SystemStatus(oneshot::Sender<SystemStatus>),
    GetSettings(oneshot::Sender<Result<SystemSettings, CoreError>>),
    UpdateSettings {
        patch: SettingsPatch,
        respond: oneshot::Sender<Result<SystemSettings, CoreError>>,
    },
}

/// Cheaply-cloneable front for the Reconciler's admin command channel.
#[derive(Clone)]
pub struct AdminHandle {
    tx: mpsc::Sender<AdminCommand>,
}

impl AdminHandle {
    pub fn new(tx: mpsc::Sender<AdminCommand>) -> Self {
        Self { tx }
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> AdminCommand) -> Result<T, CoreError> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(build(respond))
            .await
            .map_err(|_| CoreError::Fatal("reconciler admin channel closed".to_string()))?;
        rx.await.map_err(|_| CoreError::Fatal("reconciler dropped admin response".to_string()))
    }

    pub async fn list_cameras(&self) -> Result<Vec<CameraRecord>, CoreError> {
        self.call(AdminCommand::ListCameras).await?
    }

    pub async fn update_camera(&self, uid: String, patch: CameraPatch) -> Result<AdminOpResult<CameraRecord>, CoreError> {
        self.call(|respond| AdminCommand::UpdateCamera { uid, patch, respond }).await?
    }

    pub async fn delete_camera(&self, uid: String) -> Result<AdminOpResult<()>, CoreError> {
        self.call(|respond| AdminCommand::DeleteCamera { uid, respond }).await?
    }

    pub async fn add_device(&self, device_path: String, overrides: ProfileOverrides) -> Result<AdminOpResult<CameraRecord>, CoreError> {
        self.call(|respond| AdminCommand::AddDevice { device_path, overrides, respond }).await?
    }

    pub async fn force_reconcile(&self) -> Result<AdminOpResult<()>, CoreError> {
        self.call(AdminCommand::ForceReconcile).await?
    }

    pub async fn system_status(&self) -> Result<SystemStatus, CoreError> {
        self.call(AdminCommand::SystemStatus).await
    }

    pub async fn get_settings(&self) -> Result<SystemSettings, CoreError> {
        self.call(AdminCommand::GetSettings).await?
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<SystemSettings, CoreError> {
        self.call(|respond| AdminCommand::UpdateSettings { patch, respond }).await?
    }
}
