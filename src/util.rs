use crate::engine::scheduler::PlaybackMode;
use crate::model::request::SynthesisRequest;
use anyhow::Context;
use log::info;
use serde_json::Value;
use std::fs;
use std::path::Path;

pub fn parse_mode(s: &str) -> PlaybackMode {
    match s.to_lowercase().as_str() {
        "a" | "all" | "both" => PlaybackMode::Both,
        "b" | "beat" | "beats" => PlaybackMode::Beat,
        "m" | "melody" | "notes" => PlaybackMode::Melody,
        other => {
            info!("Unknown playback mode '{}', defaulting to `both`..!", other);
            PlaybackMode::Both
        }
    }
}

/// Reads a pattern file as raw JSON; validation happens in `normalize`.
pub fn read_pattern_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Value> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pattern file {}", path.display()))?;

    serde_json::from_str(&text)
        .with_context(|| format!("Pattern file {} is not valid JSON", path.display()))
}

/// One line per request for dry runs.
pub fn describe_request(index: usize, request: &SynthesisRequest) -> String {
    let pitch = match (request.frequency_hz(), request.instrument()) {
        (Some(hz), Some(instrument)) => format!("{:.2}Hz {}", hz, instrument),
        _ => String::from("percussion"),
    };

    format!(
        "Request {}: {} ({}) start={:.3}s dur={:.3}s envelope={} points",
        index,
        request.label,
        pitch,
        request.start_offset_seconds,
        request.duration_seconds,
        request.effective_envelope().len()
    )
}
