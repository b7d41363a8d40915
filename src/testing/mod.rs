//! Testing utilities: synthetic capability maps and camera-record fixtures
//! for exercising the Reconciler and its supervisors without real hardware
//! or a live MediaMTX/Moonraker instance.

pub mod synthetic_data;

pub use synthetic_data::{
    full_tier_capabilities, s1_camera_record, s1_capabilities, s1_fingerprint,
    second_identical_camera_fingerprint,
};
