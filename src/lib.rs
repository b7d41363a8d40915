//! ravens-perch: a zero-touch reconciliation core that keeps UVC webcams,
//! their MediaMTX stream paths, and their Moonraker registrations converged
//! with no administrator intervention beyond plugging a camera in.
//!
//! # Usage
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! ravens-perch = "0.1"
//! ```
//!
//! The core is driven by a [`reconciler::Reconciler`]; a binary wires it to
//! real event ingress and HTTP clients (see `src/bin/ravens_perchd.rs`).

pub mod admin;
pub mod config;
pub mod device_tracker;
pub mod errors;
pub mod hardware;
pub mod ingress;
pub mod invariant_ppt;
pub mod profile;
pub mod reconciler;
pub mod store;
pub mod supervisor;
pub mod synth;
pub mod types;

// Testing utilities - synthetic data for offline testing
pub mod testing;

pub use admin::{AdminCommand, AdminHandle};
pub use config::SystemConfig;
pub use errors::{CoreError, CoreResult};
pub use reconciler::Reconciler;
pub use types::{CameraRecord, DeviceEvent, Fingerprint};

/// Initialize logging. Respects `RUST_LOG` if already set, otherwise
/// defaults this crate to `info`.
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "ravens_perch=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
