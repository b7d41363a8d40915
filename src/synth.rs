//! Command Synthesizer (§4.5): builds the external transcoder invocation
//! string for a camera record, and the content hash the Reconciler uses to
//! detect drift against the streaming server's configured command.

use crate::types::{CameraRecord, Encoder, PixelFormat, Rotation};

/// Build the transcoder command line for `record`, targeting an RTSP
/// ingest path on `rtsp_base` (e.g. `rtsp://127.0.0.1:8554`) keyed by UID.
///
/// Deterministic: equal records (and equal `rtsp_base`) always produce a
/// byte-identical string (testable property 8).
pub fn synthesize(record: &CameraRecord, rtsp_base: &str) -> String {
    let device_path = record.device_path.as_deref().unwrap_or("/dev/null");
    let mut parts = vec![
        "ffmpeg".to_string(),
        "-f".to_string(),
        "v4l2".to_string(),
        "-input_format".to_string(),
        format_name(record.input_format),
        "-video_size".to_string(),
        format!("{}x{}", record.resolution.width, record.resolution.height),
        "-framerate".to_string(),
        record.framerate.to_string(),
        "-i".to_string(),
        device_path.to_string(),
    ];

    if let Some(filter) = rotation_filter(record.rotation) {
        parts.push("-vf".to_string());
        parts.push(filter.to_string());
    }

    if let Some(overlay) = &record.overlay_path {
        parts.push("-i".to_string());
        parts.push(overlay.to_string_lossy().to_string());
        parts.push("-filter_complex".to_string());
        parts.push("overlay".to_string());
    }

    parts.push("-c:v".to_string());
    parts.push(encoder_codec(record.encoder, record.format).to_string());

    if record.encoder != Encoder::Software || record.format != PixelFormat::Mjpeg {
        parts.push("-b:v".to_string());
        parts.push(format!("{}k", record.bitrate / 1000));
    }

    for (name, value) in &record.controls {
        parts.push("-control".to_string());
        parts.push(format!("{name}={value}"));
    }

    parts.push("-f".to_string());
    parts.push("rtsp".to_string());
    parts.push(format!("{rtsp_base}/{}", record.uid));

    parts.join(" ")
}

/// Content hash of a synthesized command, used to detect drift between
/// desired and observed streaming-server configuration.
pub fn command_hash(command: &str) -> String {
    blake3::hash(command.as_bytes()).to_hex().to_string()
}

fn format_name(format: PixelFormat) -> String {
    match format {
        PixelFormat::Mjpeg => "mjpeg".to_string(),
        PixelFormat::H264 => "h264".to_string(),
        PixelFormat::Yuyv => "yuyv422".to_string(),
        PixelFormat::Other(code) => format!("0x{code:08x}"),
    }
}

fn rotation_filter(rotation: Rotation) -> Option<&'static str> {
    match rotation {
        Rotation::None => None,
        Rotation::Quarter => Some("transpose=1"),
        Rotation::Half => Some("vflip,hflip"),
        Rotation::ThreeQuarter => Some("transpose=2"),
    }
}

fn encoder_codec(encoder: Encoder, format: PixelFormat) -> &'static str {
    // MJPEG passes through untouched unless forced onto a hardware
    // encoder by an explicit operator override.
    if format == PixelFormat::Mjpeg && encoder == Encoder::Software {
        return "copy";
    }
    match encoder {
        Encoder::Software => "libx264",
        Encoder::Vaapi => "h264_vaapi",
        Encoder::V4l2m2m => "h264_v4l2m2m",
        Encoder::Rkmpp => "h264_rkmpp",
    }
}
