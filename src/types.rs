//! Core data model: fingerprints, UIDs, capability maps, camera records, and
//! the device-tracker event sum type.
//!
//! Per the "dynamic typing → tagged variants" redesign flag, every payload
//! that crosses a component boundary here is a concrete struct or closed
//! enum, never a loosely-typed map.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hardware identity a UID is derived from.
///
/// `serial` is absent for some UVC devices; `bus_path` always contributes so
/// that two identical cameras on different ports still fingerprint apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: Option<String>,
    pub bus_path: String,
}

impl Fingerprint {
    pub fn new(vendor_id: u16, product_id: u16, serial: Option<String>, bus_path: impl Into<String>) -> Self {
        Self {
            vendor_id,
            product_id,
            serial,
            bus_path: bus_path.into(),
        }
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.vendor_id.to_le_bytes());
        buf.extend_from_slice(&self.product_id.to_le_bytes());
        buf.push(0);
        match &self.serial {
            Some(s) => buf.extend_from_slice(s.as_bytes()),
            None => buf.extend_from_slice(self.bus_path.as_bytes()),
        }
        buf.push(0);
        buf.extend_from_slice(self.bus_path.as_bytes());
        buf
    }

    /// Stable short UID for this fingerprint. Pure: equal fingerprints
    /// always hash to the same UID, across process restarts.
    pub fn uid(&self) -> String {
        let hash = blake3::hash(&self.canonical_bytes());
        hash.to_hex()[..16].to_string()
    }
}

/// One pixel format's advertised resolutions, each with framerates ordered
/// descending by frame count (§3: "Capability map").
pub type ResolutionMap = BTreeMap<Resolution, Vec<u32>>;

/// `format -> resolution -> [framerates]`.
pub type CapabilityMap = BTreeMap<PixelFormat, ResolutionMap>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Mjpeg,
    H264,
    Yuyv,
    Other(u32),
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Mjpeg => write!(f, "mjpeg"),
            PixelFormat::H264 => write!(f, "h264"),
            PixelFormat::Yuyv => write!(f, "yuyv"),
            PixelFormat::Other(code) => write!(f, "fourcc-{code:08x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoder {
    Software,
    Vaapi,
    V4l2m2m,
    Rkmpp,
}

impl std::fmt::Display for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Encoder::Software => "software",
            Encoder::Vaapi => "vaapi",
            Encoder::V4l2m2m => "v4l2m2m",
            Encoder::Rkmpp => "rkmpp",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum Rotation {
    None = 0,
    Quarter = 90,
    Half = 180,
    ThreeQuarter = 270,
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::None
    }
}

/// Overrides an administrator may set on a camera; fields left `None` mean
/// "let the Profile Selector decide".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileOverrides {
    pub format: Option<PixelFormat>,
    pub resolution: Option<Resolution>,
    pub framerate: Option<u32>,
    pub bitrate: Option<u32>,
}

/// Output of the Profile Selector (§4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub format: PixelFormat,
    pub resolution: Resolution,
    pub framerate: u32,
    pub bitrate: u32,
    pub encoder: Encoder,
    /// Set when an override could not be honored and the selector fell back.
    pub warning: Option<String>,
}

/// The authoritative per-camera row in the Settings Store (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraRecord {
    pub uid: String,
    pub device_path: Option<String>,
    pub hardware_name: String,
    pub friendly_name: String,
    pub fingerprint: Fingerprint,
    pub capabilities: CapabilityMap,
    pub format: PixelFormat,
    pub resolution: Resolution,
    pub framerate: u32,
    pub bitrate: u32,
    pub rotation: Rotation,
    pub encoder: Encoder,
    pub input_format: PixelFormat,
    pub controls: BTreeMap<String, i64>,
    pub overlay_path: Option<PathBuf>,
    pub moonraker_enabled: bool,
    pub enabled: bool,
    pub connected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CameraRecord {
    /// Build a fresh record for a newly observed fingerprint, seeded from a
    /// profile chosen by the Profile Selector.
    pub fn new(
        fingerprint: Fingerprint,
        hardware_name: String,
        device_path: Option<String>,
        capabilities: CapabilityMap,
        profile: Profile,
    ) -> Self {
        let now = Utc::now();
        let uid = fingerprint.uid();
        Self {
            uid,
            device_path,
            hardware_name: hardware_name.clone(),
            friendly_name: hardware_name,
            fingerprint,
            capabilities,
            format: profile.format,
            resolution: profile.resolution,
            framerate: profile.framerate,
            bitrate: profile.bitrate,
            rotation: Rotation::None,
            encoder: profile.encoder,
            input_format: profile.format,
            controls: BTreeMap::new(),
            overlay_path: None,
            moonraker_enabled: true,
            enabled: true,
            connected: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn overrides(&self) -> ProfileOverrides {
        ProfileOverrides {
            format: Some(self.format),
            resolution: Some(self.resolution),
            framerate: Some(self.framerate),
            bitrate: Some(self.bitrate),
        }
    }
}

/// Singleton system configuration persisted in the `settings` table (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    pub cpu_threshold: u8,
    pub orchestration_base_url: String,
    pub log_level: String,
    pub base_host: String,
}

/// Sum-typed events the Device Tracker emits to the Reconciler (§4.3, §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEvent {
    Appeared {
        fingerprint: Fingerprint,
        device_path: String,
        hardware_name: String,
        capabilities: CapabilityMap,
    },
    Disappeared {
        uid: String,
    },
    Changed {
        uid: String,
        device_path: String,
        capabilities: CapabilityMap,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_uid_is_pure_and_stable() {
        let f = Fingerprint::new(0x046d, 0x0825, Some("ABC123".into()), "usb-1-1".into());
        let uid1 = f.uid();
        let uid2 = f.uid();
        assert_eq!(uid1, uid2);
    }

    #[test]
    fn distinct_fingerprints_get_distinct_uids() {
        let a = Fingerprint::new(0x046d, 0x0825, None, "usb-1-1".into());
        let b = Fingerprint::new(0x046d, 0x0825, None, "usb-1-2".into());
        assert_ne!(a.uid(), b.uid());
    }

    #[test]
    fn equal_fingerprints_collide_in_uid() {
        let a = Fingerprint::new(0x046d, 0x0825, Some("X".into()), "usb-1-1".into());
        let b = Fingerprint::new(0x046d, 0x0825, Some("X".into()), "usb-1-1".into());
        assert_eq!(a.uid(), b.uid());
    }
}
