//! Registration Sync (§4.7): converges Moonraker's webcams to the desired
//! set, keyed by camera UID.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

use super::backoff::BackoffTracker;
use super::plan::{self, Action};
pub use super::stream::is_owned_name;

/// The desired shape of a single webcam registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredWebcam {
    pub name: String,
    pub stream_url: String,
    pub snapshot_url: String,
    pub service: String,
}

pub fn render_urls(host: &str, uid: &str, friendly_name: &str) -> DesiredWebcam {
    let name = if friendly_name.is_empty() { uid.to_string() } else { friendly_name.to_string() };
    DesiredWebcam {
        name,
        stream_url: format!("http://{host}:8889/{uid}/"),
        snapshot_url: format!("http://{host}/cameras/snapshot/{uid}.jpg"),
        service: "webrtc-mediamtx".to_string(),
    }
}

#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    async fn health(&self) -> Result<(), CoreError>;
    async fn list_webcams(&self) -> Result<HashMap<String, DesiredWebcam>, CoreError>;
    async fn upsert_webcam(&self, uid: &str, webcam: &DesiredWebcam) -> Result<(), CoreError>;
    async fn delete_webcam(&self, uid: &str) -> Result<(), CoreError>;
}

pub struct ReqwestOrchestrationClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestOrchestrationClient {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Fatal(format!("building HTTP client: {e}")))?;
        Ok(Self { client, base_url: base_url.into() })
    }
}

#[derive(Deserialize)]
struct WebcamsListResponse {
    result: WebcamsListResult,
}

#[derive(Deserialize)]
struct WebcamsListResult {
    webcams: Vec<WebcamItem>,
}

#[derive(Deserialize)]
struct WebcamItem {
    uid: String,
    name: String,
    stream_url: String,
    snapshot_url: String,
    service: String,
}

#[derive(Serialize)]
struct UpsertPayload<'a> {
    uid: &'a str,
    name: &'a str,
    stream_url: &'a str,
    snapshot_url: &'a str,
    service: &'a str,
}

#[async_trait]
impl OrchestrationClient for ReqwestOrchestrationClient {
    async fn health(&self) -> Result<(), CoreError> {
        self.client
            .get(format!("{}/server/info", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_webcams(&self) -> Result<HashMap<String, DesiredWebcam>, CoreError> {
        let response: WebcamsListResponse = self
            .client
            .get(format!("{}/server/webcams/list", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .result
            .webcams
            .into_iter()
            .map(|w| {
                (
                    w.uid,
                    DesiredWebcam { name: w.name, stream_url: w.stream_url, snapshot_url: w.snapshot_url, service: w.service },
                )
            })
            .collect())
    }

    async fn upsert_webcam(&self, uid: &str, webcam: &DesiredWebcam) -> Result<(), CoreError> {
        let payload = UpsertPayload {
            uid,
            name: &webcam.name,
            stream_url: &webcam.stream_url,
            snapshot_url: &webcam.snapshot_url,
            service: &webcam.service,
        };
        self.client
            .post(format!("{}/server/webcams/item", self.base_url))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_webcam(&self, uid: &str) -> Result<(), CoreError> {
        let response = self
            .client
            .delete(format!("{}/server/webcams/item", self.base_url))
            .query(&[("uid", uid)])
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }
}

pub struct RegistrationSync<C: OrchestrationClient> {
    client: C,
    backoff: BackoffTracker,
}

impl<C: OrchestrationClient> RegistrationSync<C> {
    pub fn new(client: C) -> Self {
        Self { client, backoff: BackoffTracker::new() }
    }

    pub async fn health(&self) -> Result<(), CoreError> {
        self.client.health().await
    }

    /// Run one tick. `desired` maps UID to the webcam it should resolve to.
    /// A registration differing only by `name` is mutated in place; any
    /// other difference is a delete-then-create replace (§4.7).
    pub async fn reconcile(&mut self, desired: &HashMap<String, DesiredWebcam>, now: Instant) -> Result<Vec<String>, CoreError> {
        let observed = self.client.list_webcams().await?;
        let owned: HashMap<String, DesiredWebcam> =
            observed.into_iter().filter(|(uid, _)| is_owned_name(uid)).collect();

        let mut errors = Vec::new();
        for action in plan::diff(desired, &owned) {
            let uid = match &action {
                Action::Create(uid, _) | Action::Replace(uid, _) | Action::Delete(uid) => uid.clone(),
            };

            if !self.backoff.is_ready(&uid, now) {
                continue;
            }

            let result = self.apply(&uid, &action, &owned).await;
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

    async fn apply(
        &self,
        uid: &str,
        action: &Action<String, DesiredWebcam>,
        owned: &HashMap<String, DesiredWebcam>,
    ) -> Result<(), CoreError> {
        match action {
            Action::Create(_, webcam) => self.client.upsert_webcam(uid, webcam).await,
            Action::Replace(_, webcam) => {
                let name_only_differs = owned
                    .get(uid)
                    .map(|have| have.stream_url == webcam.stream_url && have.snapshot_url == webcam.snapshot_url)
                    .unwrap_or(false);
                if name_only_differs {
                    self.client.upsert_webcam(uid, webcam).await
                } else {
                    self.client.delete_webcam(uid).await?;
                    self.client.upsert_webcam(uid, webcam).await
                }
            }
            Action::Delete(_) => self.client.delete_webcam(uid).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeOrchestration {
        webcams: StdMutex<HashMap<String, DesiredWebcam>>,
    }

    #[async_trait]
    impl OrchestrationClient for FakeOrchestration {
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

    #[test]
    fn render_urls_uses_friendly_name_and_falls_back_to_uid() {
        let named = render_urls("host.local", "0123456789abcdef", "Garage Cam");
        assert_eq!(named.name, "Garage Cam");

        let unnamed = render_urls("host.local", "0123456789abcdef", "");
        assert_eq!(unnamed.name, "0123456789abcdef");
    }

    #[tokio::test]
    async fn creates_missing_registration() {
        let mut sync = RegistrationSync::new(FakeOrchestration::default());
        let mut desired = HashMap::new();
        desired.insert("0123456789abcdef".to_string(), render_urls("host.local", "0123456789abcdef", "Example Webcam"));

        let errors = sync.reconcile(&desired, Instant::now()).await.unwrap();
        assert!(errors.is_empty());
        assert!(sync.client.webcams.lock().unwrap().contains_key("0123456789abcdef"));
    }

    #[tokio::test]
    async fn name_only_difference_mutates_in_place_without_delete() {
        let server = FakeOrchestration::default();
        let uid = "0123456789abcdef";
        server.webcams.lock().unwrap().insert(uid.to_string(), render_urls("host.local", uid, "Example Webcam"));
        let mut sync = RegistrationSync::new(server);

        let mut desired_webcam = render_urls("host.local", uid, "Example Webcam");
        desired_webcam.name = "Renamed Camera".to_string();
        let mut desired = HashMap::new();
        desired.insert(uid.to_string(), desired_webcam.clone());

        sync.reconcile(&desired, Instant::now()).await.unwrap();
        assert_eq!(sync.client.webcams.lock().unwrap().get(uid).unwrap().name, "Renamed Camera");
    }

    #[tokio::test]
    async fn non_owned_registration_survives() {
        let server = FakeOrchestration::default();
        server.webcams.lock().unwrap().insert(
            "garage-door-cam".to_string(),
            DesiredWebcam {
                name: "Garage".to_string(),
                stream_url: "http://other/".to_string(),
                snapshot_url: "http://other/snap.jpg".to_string(),
                service: "hlsstream".to_string(),
            },
        );
        let mut sync = RegistrationSync::new(server);

        sync.reconcile(&HashMap::new(), Instant::now()).await.unwrap();
        assert!(sync.client.webcams.lock().unwrap().contains_key("garage-door-cam"));
    }
}
