//! Stream definitions loaded from configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_QUALITY: &str = "default";
pub const MASTER_PLAYLIST: &str = "master.m3u8";
pub const SUB_PLAYLIST: &str = "playlist.m3u8";
pub const SEGMENT_NAME: &str = "segment_%03d.ts";
pub const LIVE_PLAYLIST: &str = "live.m3u8";
pub const LIVE_SEGMENT_NAME: &str = "live_%03d.ts";
pub const VALID_VIDEO_EXTENSIONS: [&str; 1] = [".mp4"];
pub const VALID_MASTER_PLAYLIST_EXTENSIONS: [&str; 1] = [".m3u8"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    VideoEncoded,
    VideoUnencoded,
    Live,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamType::VideoEncoded => "video_encoded",
            StreamType::VideoUnencoded => "video_unencoded",
            StreamType::Live => "live",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audio {
    /// Bitrate of the audio, e.g. `128k`
    pub bitrate: String,
    pub codec: String,
}

/// One rendition produced from a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Video bitrate, e.g. `3000k`
    pub bitrate: String,
    pub codec: String,
    pub audio: Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hls {
    /// Target segment duration in seconds
    pub segment_duration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Distribution {
    pub hls: Hls,
}

/// An immutable stream definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub kind: StreamType,
    /// Placeholder template of where outputs live, relative to the data directory
    pub path: String,
    pub qualities: HashMap<String, Quality>,
    pub distribution: Distribution,
    /// Placeholder template of the inputs of a `video_unencoded` stream
    pub video_input_path: Option<String>,
    /// Delete the source file once it is encoded (`video_unencoded` only)
    pub delete_after_encoding: bool,
    /// Shared secret of a `live` stream
    pub live_stream_key: Option<String>,
}

impl Stream {
    pub fn master_playlist_template(&self) -> String {
        format!("{}/{}", self.path, MASTER_PLAYLIST)
    }

    pub fn deletes_source_after_encoding(&self) -> bool {
        self.kind == StreamType::VideoUnencoded && self.delete_after_encoding
    }
}

/// Application wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Application {
    /// Public base URL the streams are served under
    pub public_path: String,
    pub all_streams_playlist: AllStreamsPlaylist,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllStreamsPlaylist {
    pub enabled: bool,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Server {
    pub http_port: u16,
    pub rtmp_port: u16,
}

/// Channels keyed by their public path pattern.
pub type Channels = HashMap<String, Stream>;
