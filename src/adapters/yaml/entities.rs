//! Raw YAML documents, before validation.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub application: ApplicationEntry,
    pub server: ServerEntry,
    pub stream_templates: HashMap<String, StreamEntryWrapper>,
    pub channels: HashMap<String, StreamEntryWrapper>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApplicationEntry {
    pub public_path: String,
    pub all_streams_playlist: AllStreamsPlaylistEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AllStreamsPlaylistEntry {
    pub enabled: bool,
    pub path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerEntry {
    #[serde(rename = "http")]
    pub http_port: i64,
    #[serde(rename = "rtmp")]
    pub rtmp_port: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AudioEntry {
    pub bitrate: String,
    pub codec: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QualityEntry {
    pub width: i64,
    pub height: i64,
    pub framerate: i64,
    pub bitrate: String,
    pub codec: String,
    pub audio: AudioEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HlsEntry {
    pub segment_duration: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DistributionEntry {
    pub hls: HlsEntry,
}

/// A channel or a stream template, both nest their definition under `stream`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StreamEntryWrapper {
    pub stream: StreamEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StreamEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub qualities: HashMap<String, QualityEntry>,
    pub distribution: DistributionEntry,
    pub video_input_path: String,
    pub delete_after_encoding: bool,
    pub live_stream_key: String,
}
