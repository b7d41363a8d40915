//! Reads hardware identity off the udev database for a `/dev/videoN` node.
//!
//! This is the only place that talks to `udev` for device *properties*
//! (as opposed to `crate::ingress`, which subscribes to its event stream).

use std::path::Path;

use crate::errors::CoreError;
use crate::types::Fingerprint;

/// Resolve a device path to its hardware fingerprint and a human label.
pub fn read_fingerprint(device_path: &str) -> Result<(Fingerprint, String), CoreError> {
    let device = find_udev_device(device_path)?;

    let usb = device.parent_with_subsystem("usb").ok().flatten();

    let vendor_id = usb
        .as_ref()
        .and_then(|d| d.attribute_value("idVendor"))
        .and_then(|s| s.to_str())
        .and_then(|s| u16::from_str_radix(s, 16).ok())
        .unwrap_or(0);

    let product_id = usb
        .as_ref()
        .and_then(|d| d.attribute_value("idProduct"))
        .and_then(|s| s.to_str())
        .and_then(|s| u16::from_str_radix(s, 16).ok())
        .unwrap_or(0);

    let serial = usb
        .as_ref()
        .and_then(|d| d.attribute_value("serial"))
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .filter(|s| !s.is_empty());

    let bus_path = device
        .property_value("ID_PATH")
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .or_else(|| usb.as_ref().map(|d| d.syspath().to_string_lossy().to_string()))
        .unwrap_or_else(|| device_path.to_string());

    let hardware_name = usb
        .as_ref()
        .and_then(|d| d.attribute_value("product"))
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .or_else(|| {
            device
                .property_value("ID_MODEL")
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown UVC camera".to_string());

    Ok((
        Fingerprint::new(vendor_id, product_id, serial, bus_path),
        hardware_name,
    ))
}

fn find_udev_device(device_path: &str) -> Result<udev::Device, CoreError> {
    let mut enumerator = udev::Enumerator::new()
        .map_err(|e| CoreError::ProtocolError(format!("udev enumerator: {e}")))?;
    enumerator
        .match_subsystem("video4linux")
        .map_err(|e| CoreError::ProtocolError(format!("udev match_subsystem: {e}")))?;

    let devices = enumerator
        .scan_devices()
        .map_err(|e| CoreError::ProtocolError(format!("udev scan_devices: {e}")))?;

    for device in devices {
        if device.devnode() == Some(Path::new(device_path)) {
            return Ok(device);
        }
    }

    Err(CoreError::NotFound(format!("no udev device for {device_path}")))
}

/// Extract the V4L2 node index from a `/dev/videoN` path, used to pick the
/// lowest-index capture node when a UVC device exposes several.
pub fn node_index(device_path: &str) -> Option<u32> {
    device_path.strip_prefix("/dev/video")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_index_parses_trailing_digits() {
        assert_eq!(node_index("/dev/video0"), Some(0));
        assert_eq!(node_index("/dev/video12"), Some(12));
        assert_eq!(node_index("/dev/v4l-subdev0"), None);
    }
}
