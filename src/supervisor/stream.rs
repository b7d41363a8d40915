//! Stream Supervisor (§4.6): converges MediaMTX's declared paths to the
//! desired `{uid -> command_hash}` set.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::CoreError;

use super::backoff::BackoffTracker;
use super::plan::{self, Action};

/// A UID is a 16-character lowercase-hex string (`Fingerprint::uid`).
/// Anything else is a path this core did not create and must never touch.
pub fn is_owned_name(name: &str) -> bool {
    name.len() == 16 && name.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

#[async_trait]
pub trait MediaServerClient: Send + Sync {
    async fn health(&self) -> Result<(), CoreError>;
    /// All currently configured paths, name -> configured run command.
    async fn list_paths(&self) -> Result<HashMap<String, String>, CoreError>;
    async fn create_path(&self, name: &str, command: &str) -> Result<(), CoreError>;
    async fn delete_path(&self, name: &str) -> Result<(), CoreError>;
}

pub struct ReqwestMediaServerClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestMediaServerClient {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Fatal(format!("building HTTP client: {e}")))?;
        Ok(Self { client, base_url: base_url.into() })
    }
}

#[derive(Deserialize)]
struct PathsListResponse {
    items: Vec<PathItem>,
}

#[derive(Deserialize)]
struct PathItem {
    name: String,
    #[serde(rename = "runOnInit", default)]
    run_on_init: String,
}

#[async_trait]
impl MediaServerClient for ReqwestMediaServerClient {
    async fn health(&self) -> Result<(), CoreError> {
        self.client
            .get(format!("{}/v3/paths/list", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_paths(&self) -> Result<HashMap<String, String>, CoreError> {
        let response: PathsListResponse = self
            .client
            .get(format!("{}/v3/paths/list", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.items.into_iter().map(|p| (p.name, p.run_on_init)).collect())
    }

    async fn create_path(&self, name: &str, command: &str) -> Result<(), CoreError> {
        self.client
            .post(format!("{}/v3/config/paths/add/{name}", self.base_url))
            .json(&serde_json::json!({ "runOnInit": command, "runOnInitRestart": true }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_path(&self, name: &str) -> Result<(), CoreError> {
        let response = self
            .client
            .post(format!("{}/v3/config/paths/delete/{name}", self.base_url))
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(()); // already absent, deletion is idempotent
        }
        response.error_for_status()?;
        Ok(())
    }
}

/// Drives one convergence pass. Backoff state persists across ticks.
pub struct StreamSupervisor<C: MediaServerClient> {
    client: C,
    backoff: BackoffTracker,
}

impl<C: MediaServerClient> StreamSupervisor<C> {
    pub fn new(client: C) -> Self {
        Self { client, backoff: BackoffTracker::new() }
    }

    pub async fn health(&self) -> Result<(), CoreError> {
        self.client.health().await
    }

    /// Run one tick. `desired` maps UID to the synthesized command's
    /// content hash. Returns per-UID error strings for operations that
    /// failed; a single failure never aborts the rest of the plan.
    pub async fn reconcile(&mut self, desired: &HashMap<String, String>, now: Instant) -> Result<Vec<String>, CoreError> {
        let observed = self.client.list_paths().await?;
        let owned: HashMap<String, String> = observed.into_iter().filter(|(name, _)| is_owned_name(name)).collect();

        let mut errors = Vec::new();
        for action in plan::diff(desired, &owned) {
            let uid = match &action {
                Action::Create(uid, _) | Action::Replace(uid, _) | Action::Delete(uid) => uid.clone(),
            };

            if !self.backoff.is_ready(&uid, now) {
                continue;
            }

            let result = self.apply(&action).await;
            match result {
                Ok(()) => self.backoff.record_success(&uid),
                Err(e) => {
                    self.backoff.record_failure(&uid, now);
                    errors.push(format!("{uid}: {e}"));
                }
            }
        }

        Ok(errors)
    }

    async fn apply(&self, action: &Action<String, String>) -> Result<(), CoreError> {
        match action {
            Action::Create(uid, command) => self.client.create_path(uid, command).await,
            Action::Replace(uid, command) => {
                self.client.delete_path(uid).await?;
                self.client.create_path(uid, command).await
            }
            Action::Delete(uid) => self.client.delete_path(uid).await,
        }
    }
}
