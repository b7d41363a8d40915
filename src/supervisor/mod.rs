//! Stream Supervisor (§4.6) and Registration Sync (§4.7): the two
//! convergence loops the Reconciler drives each tick, sharing a generic
//! create/replace/delete plan and per-UID backoff.

mod backoff;
mod plan;
pub mod registration;
pub mod stream;

pub use backoff::BackoffTracker;
pub use plan::Action;
pub use registration::{DesiredWebcam, OrchestrationClient, RegistrationSync};
pub use stream::{is_owned_name, MediaServerClient, StreamSupervisor};
