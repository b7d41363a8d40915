//! Profile Selector (§4.4): a pure function from capabilities and an
//! effective CPU score to a chosen encode profile. No I/O, no logging side
//! effects — any override that could not be honored is surfaced as a
//! warning on the returned [`Profile`] instead.

use crate::hardware::EncoderAvailability;
use crate::types::{CapabilityMap, Encoder, PixelFormat, Profile, ProfileOverrides, Resolution};

struct Tier {
    max_score: u8,
    ceiling: Resolution,
    target_fps: u32,
    bitrate: u32,
}

const TIERS: &[Tier] = &[
    Tier { max_score: 3, ceiling: Resolution::new(640, 480), target_fps: 10, bitrate: 500_000 },
    Tier { max_score: 5, ceiling: Resolution::new(640, 480), target_fps: 15, bitrate: 1_000_000 },
    Tier { max_score: 7, ceiling: Resolution::new(1280, 720), target_fps: 15, bitrate: 2_000_000 },
    Tier { max_score: 9, ceiling: Resolution::new(1280, 720), target_fps: 15, bitrate: 2_000_000 },
    Tier { max_score: 10, ceiling: Resolution::new(1280, 720), target_fps: 30, bitrate: 4_000_000 },
];

const FORMAT_PREFERENCE: &[PixelFormat] = &[PixelFormat::Mjpeg, PixelFormat::H264, PixelFormat::Yuyv];

fn tier_for_score(effective_score: u8) -> &'static Tier {
    TIERS
        .iter()
        .find(|t| effective_score <= t.max_score)
        .unwrap_or(&TIERS[TIERS.len() - 1])
}

/// Choose an encode profile. Pure: identical inputs always produce an
/// identical profile (testable property 7).
pub fn select(
    capabilities: &CapabilityMap,
    effective_score: u8,
    overrides: &ProfileOverrides,
    encoders: &EncoderAvailability,
    cpu_threshold: u8,
) -> Profile {
    if let Some(profile) = try_full_override(capabilities, overrides, encoders, effective_score, cpu_threshold) {
        return profile;
    }

    let tier = tier_for_score(effective_score);
    let mut warning = None;

    let format = select_format(capabilities, overrides, &mut warning);
    let Some(resolutions) = capabilities.get(&format) else {
        return empty_capabilities_profile(format, tier, encoders, effective_score, cpu_threshold);
    };

    let resolution = select_resolution(resolutions, tier.ceiling);
    let framerates = resolutions.get(&resolution).cloned().unwrap_or_default();
    let framerate = select_framerate(&framerates, tier.target_fps);

    let bitrate = match overrides.bitrate {
        Some(b) => b,
        None => tier.bitrate,
    };
    if overrides.resolution.is_some() && overrides.resolution != Some(resolution) {
        warning.get_or_insert_with(|| "resolution override not available in capabilities, falling back".to_string());
    }
    if overrides.framerate.is_some() && overrides.framerate != Some(framerate) {
        warning.get_or_insert_with(|| "framerate override not available in capabilities, falling back".to_string());
    }

    Profile {
        format,
        resolution,
        framerate,
        bitrate,
        encoder: select_encoder(format, encoders, effective_score, cpu_threshold),
        warning,
    }
}

/// When `overrides` names a complete `(format, resolution, framerate)`
/// combination that exists verbatim in `capabilities`, it always wins.
fn try_full_override(
    capabilities: &CapabilityMap,
    overrides: &ProfileOverrides,
    encoders: &EncoderAvailability,
    effective_score: u8,
    cpu_threshold: u8,
) -> Option<Profile> {
    let format = overrides.format?;
    let resolution = overrides.resolution?;
    let framerate = overrides.framerate?;

    let framerates = capabilities.get(&format)?.get(&resolution)?;
    if !framerates.contains(&framerate) {
        return None;
    }

    let tier = tier_for_score(10); // bitrate default only used when not overridden
    Some(Profile {
        format,
        resolution,
        framerate,
        bitrate: overrides.bitrate.unwrap_or(tier.bitrate),
        encoder: select_encoder(format, encoders, effective_score, cpu_threshold),
        warning: None,
    })
}

fn select_format(
    capabilities: &CapabilityMap,
    overrides: &ProfileOverrides,
    warning: &mut Option<String>,
) -> PixelFormat {
    if let Some(wanted) = overrides.format {
        if capabilities.contains_key(&wanted) {
            return wanted;
        }
        *warning = Some(format!("overridden format {wanted} not advertised by device, falling back"));
    }

    for candidate in FORMAT_PREFERENCE {
        if capabilities.contains_key(candidate) {
            return *candidate;
        }
    }

    capabilities
        .keys()
        .next()
        .copied()
        .unwrap_or(PixelFormat::Other(0))
}

fn select_resolution(resolutions: &crate::types::ResolutionMap, ceiling: Resolution) -> Resolution {
    let ceiling_pixels = ceiling.pixels();
    resolutions
        .keys()
        .filter(|r| r.pixels() <= ceiling_pixels)
        .max_by_key(|r| (r.pixels(), *r == &ceiling))
        .copied()
        .or_else(|| resolutions.keys().min_by_key(|r| r.pixels()).copied())
        .unwrap_or(ceiling)
}

fn select_framerate(framerates: &[u32], target_fps: u32) -> u32 {
    framerates
        .iter()
        .filter(|&&fps| fps <= target_fps)
        .max()
        .copied()
        .or_else(|| framerates.iter().min().copied())
        .unwrap_or(target_fps)
}

/// Hardware encoders in this crate only carry a license-free path for H264;
/// MJPEG/YUYV stay on software passthrough, which is already the
/// lower-CPU-cost choice for those formats (§4.4). Below `cpu_threshold`,
/// hardware encoding is skipped even when available and even for H264:
/// a CPU that weak is assumed too constrained to run the driver's hardware
/// encoder handoff reliably, so software is the safer default.
fn select_encoder(format: PixelFormat, encoders: &EncoderAvailability, effective_score: u8, cpu_threshold: u8) -> Encoder {
    if format == PixelFormat::H264 && effective_score >= cpu_threshold {
        encoders.first_available().unwrap_or(Encoder::Software)
    } else {
        Encoder::Software
    }
}

fn empty_capabilities_profile(
    format: PixelFormat,
    tier: &Tier,
    encoders: &EncoderAvailability,
    effective_score: u8,
    cpu_threshold: u8,
) -> Profile {
    Profile {
        format,
        resolution: tier.ceiling,
        framerate: tier.target_fps,
        bitrate: tier.bitrate,
        encoder: select_encoder(format, encoders, effective_score, cpu_threshold),
        warning: Some("device advertised no capabilities for selected format".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn no_hw() -> EncoderAvailability {
        EncoderAvailability { vaapi: false, v4l2m2m: false, rkmpp: false }
    }

    fn s1_capabilities() -> CapabilityMap {
        let mut map = BTreeMap::new();
        let mut resolutions = BTreeMap::new();
        resolutions.insert(Resolution::new(1280, 720), vec![30, 15]);
        resolutions.insert(Resolution::new(640, 480), vec![30]);
        map.insert(PixelFormat::Mjpeg, resolutions);
        map
    }

    #[test]
    fn s1_fixture_selects_max_tier_defaults() {
        let profile = select(&s1_capabilities(), 10, &ProfileOverrides::default(), &no_hw(), 1);
        assert_eq!(profile.format, PixelFormat::Mjpeg);
        assert_eq!(profile.resolution, Resolution::new(1280, 720));
        assert_eq!(profile.framerate, 30);
        assert_eq!(profile.bitrate, 4_000_000);
        assert_eq!(profile.encoder, Encoder::Software);
        assert!(profile.warning.is_none());
    }

    #[test]
    fn low_score_selects_low_tier() {
        let profile = select(&s1_capabilities(), 2, &ProfileOverrides::default(), &no_hw(), 1);
        assert_eq!(profile.resolution, Resolution::new(640, 480));
        // only 30fps is advertised at 640x480; tier target is 10fps, so
        // nothing qualifies and the smallest advertised rate is used.
        assert_eq!(profile.framerate, 30);
        assert_eq!(profile.bitrate, 500_000);
    }

    #[test]
    fn full_override_naming_in_capability_combo_wins() {
        let overrides = ProfileOverrides {
            format: Some(PixelFormat::Mjpeg),
            resolution: Some(Resolution::new(640, 480)),
            framerate: Some(30),
            bitrate: Some(1_000_000),
        };
        let profile = select(&s1_capabilities(), 10, &overrides, &no_hw(), 1);
        assert_eq!(profile.resolution, Resolution::new(640, 480));
        assert_eq!(profile.framerate, 30);
        assert_eq!(profile.bitrate, 1_000_000);
        assert!(profile.warning.is_none());
    }

    #[test]
    fn invalid_override_combo_falls_back_with_warning() {
        let overrides = ProfileOverrides {
            format: Some(PixelFormat::Mjpeg),
            resolution: Some(Resolution::new(1920, 1080)),
            framerate: Some(60),
            bitrate: None,
        };
        let profile = select(&s1_capabilities(), 10, &overrides, &no_hw(), 1);
        assert_eq!(profile.resolution, Resolution::new(1280, 720));
        assert!(profile.warning.is_some());
    }

    #[test]
    fn h264_prefers_hardware_encoder_when_available() {
        let mut map = BTreeMap::new();
        let mut resolutions = BTreeMap::new();
        resolutions.insert(Resolution::new(1280, 720), vec![30]);
        map.insert(PixelFormat::H264, resolutions);

        let hw = EncoderAvailability { vaapi: true, v4l2m2m: false, rkmpp: false };
        let profile = select(&map, 10, &ProfileOverrides::default(), &hw, 1);
        assert_eq!(profile.encoder, Encoder::Vaapi);
    }

    #[test]
    fn below_cpu_threshold_falls_back_to_software_even_with_hardware_available() {
        let mut map = BTreeMap::new();
        let mut resolutions = BTreeMap::new();
        resolutions.insert(Resolution::new(1280, 720), vec![30]);
        map.insert(PixelFormat::H264, resolutions);

        let hw = EncoderAvailability { vaapi: true, v4l2m2m: false, rkmpp: false };
        let profile = select(&map, 4, &ProfileOverrides::default(), &hw, 5);
        assert_eq!(profile.encoder, Encoder::Software);

        let profile_at_threshold = select(&map, 5, &ProfileOverrides::default(), &hw, 5);
        assert_eq!(profile_at_threshold.encoder, Encoder::Vaapi);
    }
}
