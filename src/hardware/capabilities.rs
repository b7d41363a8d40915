//! Capability enumeration for a single device path (§4.2, §3 "Capability
//! map"). Sourced exclusively from kernel-advertised V4L2 enumeration via
//! the `v4l` crate, mirroring how the teacher's `platform::linux` module
//! talked to Video4Linux, but through ioctl-backed enumeration instead of a
//! fixed list of common formats.

use std::collections::BTreeMap;

use v4l::framesize::FrameSizeEnum;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::errors::CoreError;
use crate::types::{CapabilityMap, PixelFormat, Resolution};

fn pixel_format_from_fourcc(fourcc: FourCC) -> PixelFormat {
    match &fourcc.repr {
        b"MJPG" => PixelFormat::Mjpeg,
        b"H264" => PixelFormat::H264,
        b"YUYV" => PixelFormat::Yuyv,
        repr => PixelFormat::Other(u32::from_le_bytes(*repr)),
    }
}

/// Enumerate every pixel format, resolution, and framerate this device
/// advertises. Framerates within a resolution are ordered descending by
/// frame count, matching §3's data model.
///
/// Typed failures: `Busy` when the device is held open elsewhere,
/// `NotFound` when the path does not exist, `ProtocolError` for any other
/// ioctl failure (malformed response from the kernel driver).
pub fn probe_capabilities(device_path: &str) -> Result<CapabilityMap, CoreError> {
    let device = open_device(device_path)?;

    let formats = device.enum_formats().map_err(|e| {
        CoreError::ProtocolError(format!("enum_formats failed for {device_path}: {e}"))
    })?;

    let mut map: CapabilityMap = BTreeMap::new();

    for format_desc in formats {
        let pixel_format = pixel_format_from_fourcc(format_desc.fourcc);
        let mut resolutions = BTreeMap::new();

        let frame_sizes = device
            .enum_framesizes(format_desc.fourcc)
            .map_err(|e| CoreError::ProtocolError(format!("enum_framesizes failed: {e}")))?;

        for frame_size in frame_sizes {
            // Stepwise/continuous sizes are rare on UVC webcams and carry no
            // fixed (width, height) to key the map by; skip them.
            let FrameSizeEnum::Discrete(discrete) = frame_size.size else {
                continue;
            };
            let resolution = Resolution::new(discrete.width, discrete.height);

            let intervals = device
                .enum_frameintervals(format_desc.fourcc, discrete.width, discrete.height)
                .unwrap_or_default();

            let mut framerates: Vec<u32> = intervals
                .into_iter()
                .filter_map(|interval| match interval.interval {
                    FrameIntervalEnum::Discrete(fraction) if fraction.numerator > 0 => {
                        Some(fraction.denominator / fraction.numerator)
                    }
                    _ => None,
                })
                .collect();
            framerates.sort_unstable_by(|a, b| b.cmp(a));
            framerates.dedup();

            resolutions.insert(resolution, framerates);
        }

        map.insert(pixel_format, resolutions);
    }

    Ok(map)
}

fn open_device(device_path: &str) -> Result<Device, CoreError> {
    if !std::path::Path::new(device_path).exists() {
        return Err(CoreError::NotFound(format!("no such device: {device_path}")));
    }

    Device::with_path(device_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            CoreError::BadRequest(format!("permission denied opening {device_path}: {e}"))
        } else if is_busy(&e) {
            CoreError::Busy(format!("{device_path} is held by another process: {e}"))
        } else {
            CoreError::ProtocolError(format!("failed to open {device_path}: {e}"))
        }
    })
}

fn is_busy(e: &std::io::Error) -> bool {
    matches!(e.raw_os_error(), Some(code) if code == libc::EBUSY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_is_not_found() {
        let err = probe_capabilities("/dev/video-does-not-exist").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
