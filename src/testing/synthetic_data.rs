//! Synthetic fixtures for offline testing: capability maps and camera
//! records built without touching real V4L2 hardware, generalizing the
//! teacher's synthetic-capture-frame fixtures to this crate's data model.

use std::collections::BTreeMap;

use crate::types::{CameraRecord, CapabilityMap, Encoder, Fingerprint, PixelFormat, Profile, Resolution};

/// The S1 fixture camera from the testable-properties scenario list: a
/// Logitech-class UVC webcam exposing MJPEG at two resolutions.
pub fn s1_fingerprint() -> Fingerprint {
    Fingerprint::new(0x046d, 0x0825, Some("ABC123".to_string()), "usb-1-1".to_string())
}

pub fn s1_capabilities() -> CapabilityMap {
    let mut map = BTreeMap::new();
    let mut resolutions = BTreeMap::new();
    resolutions.insert(Resolution::new(1280, 720), vec![30, 15]);
    resolutions.insert(Resolution::new(640, 480), vec![30]);
    map.insert(PixelFormat::Mjpeg, resolutions);
    map
}

/// A capability map covering all three known pixel formats, sized so every
/// quality tier in §4.4 has at least one candidate resolution — used by
/// the profile-selection round-trip property test.
pub fn full_tier_capabilities() -> CapabilityMap {
    let mut map = BTreeMap::new();

    let mut mjpeg = BTreeMap::new();
    mjpeg.insert(Resolution::new(1280, 720), vec![30, 15, 10]);
    mjpeg.insert(Resolution::new(640, 480), vec![30, 15, 10]);
    map.insert(PixelFormat::Mjpeg, mjpeg);

    let mut h264 = BTreeMap::new();
    h264.insert(Resolution::new(1280, 720), vec![30, 15]);
    h264.insert(Resolution::new(640, 480), vec![15, 10]);
    map.insert(PixelFormat::H264, h264);

    map
}

/// A ready-to-use [`CameraRecord`] matching the S1 fixture's terminal
/// state, seeded with default (hardware-selected) profile fields.
pub fn s1_camera_record() -> CameraRecord {
    let profile = Profile {
        format: PixelFormat::Mjpeg,
        resolution: Resolution::new(1280, 720),
        framerate: 30,
        bitrate: 4_000_000,
        encoder: Encoder::Software,
        warning: None,
    };
    CameraRecord::new(
        s1_fingerprint(),
        "Example Webcam".to_string(),
        Some("/dev/video0".to_string()),
        s1_capabilities(),
        profile,
    )
}

/// A second, physically distinct camera with identical VID/PID but a
/// different bus path, matching the S5 "two identical cameras" fixture.
pub fn second_identical_camera_fingerprint() -> Fingerprint {
    Fingerprint::new(0x046d, 0x0825, None, "usb-1-2".to_string())
}
