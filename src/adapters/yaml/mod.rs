//! YAML configuration file.
//!
//! ```yaml
//! application:
//!   public_path: https://cdn.example.com
//!   all_streams_playlist: { enabled: true, path: /all.m3u8 }
//! server: { http: 8080, rtmp: 1935 }
//! channels:
//!   "live/{username}":
//!     stream:
//!       type: live
//!       path: live/{username}
//!       live_stream_key: s3cr3t
//!       qualities: { ... }
//!       distribution: { hls: { segment_duration: 4 } }
//! ```
//!
//! `stream_templates` are validated like channels but are not inherited.

mod entities;

use crate::domain::stream::{
    AllStreamsPlaylist, Application, Audio, Channels, Distribution, Hls, Quality, Server,
    Stream, StreamType,
};
use crate::ports::config::{ConfigError, ConfigurationPort, LoadedConfig};
use entities::{ConfigFile, QualityEntry, StreamEntry, StreamEntryWrapper};
use std::collections::HashMap;
use std::path::Path;

/// Characters refused in configured paths.
const DANGEROUS_PATH_SEQUENCES: [&str; 9] = ["%00", "%2e", "%2f", "%5c", "|", ">", "<", "*", "?"];

#[derive(Clone, Copy, Debug, Default)]
pub struct YamlConfigFile;

impl YamlConfigFile {
    pub fn new() -> Self {
        Self
    }

    /// Parses, validates and maps a YAML document.
    pub fn parse(content: &str) -> Result<LoadedConfig, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(content)?;
        validate(&file).map_err(ConfigError::Invalid)?;
        Ok(to_domain(file))
    }
}

impl ConfigurationPort for YamlConfigFile {
    fn load(&self, path: &Path) -> Result<LoadedConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string_lossy().into_owned(),
            source,
        })?;
        Self::parse(&content)
    }
}

fn validate(file: &ConfigFile) -> Result<(), String> {
    let playlist = &file.application.all_streams_playlist;
    if playlist.enabled && playlist.path.is_empty() {
        return Err("all_streams_playlist is enabled but path is empty".to_string());
    }

    validate_port(file.server.http_port, "HTTP")?;
    validate_port(file.server.rtmp_port, "RTMP")?;

    validate_entries(&file.stream_templates, "template")?;
    validate_entries(&file.channels, "channel")
}

fn validate_port(port: i64, name: &str) -> Result<(), String> {
    if port <= 0 || port > i64::from(u16::MAX) {
        return Err(format!("invalid {} port: must be between 1 and 65535", name));
    }
    Ok(())
}

fn validate_entries(entries: &HashMap<String, StreamEntryWrapper>, kind: &str) -> Result<(), String> {
    // Sorted so the reported error does not depend on map order.
    let mut names: Vec<&String> = entries.keys().collect();
    names.sort();

    for name in names {
        if name.is_empty() || name == "/" {
            return Err(format!("invalid {} name: must not be empty or '/'", kind));
        }
        validate_stream(&entries[name].stream, &format!("{} '{}'", kind, name))?;
    }
    Ok(())
}

fn validate_stream(stream: &StreamEntry, context: &str) -> Result<(), String> {
    if stream.kind.is_empty() {
        return Err(format!("{} has empty type", context));
    }
    let kind = parse_kind(&stream.kind)
        .ok_or_else(|| format!("{} has invalid type: {}", context, stream.kind))?;

    if stream.path.is_empty() {
        return Err(format!("{} has empty path", context));
    }
    validate_path(&stream.path, &format!("{} path", context))?;

    match kind {
        StreamType::VideoUnencoded => {
            if stream.video_input_path.is_empty() {
                return Err(format!(
                    "{} of type video_unencoded must have video_input_path",
                    context
                ));
            }
            validate_path(
                &stream.video_input_path,
                &format!("{} video_input_path", context),
            )?;
        }
        StreamType::Live => {
            if stream.live_stream_key.is_empty() {
                return Err(format!("{} of type live must have live_stream_key", context));
            }
            if !stream.video_input_path.is_empty() {
                return Err(format!("{} of type live should not have video_input_path", context));
            }
            if stream.delete_after_encoding {
                return Err(format!(
                    "{} of type live should not have delete_after_encoding enabled",
                    context
                ));
            }
        }
        StreamType::VideoEncoded => {}
    }

    if stream.qualities.is_empty() {
        return Err(format!("{} has no quality profiles defined", context));
    }
    let mut qualities: Vec<(&String, &QualityEntry)> = stream.qualities.iter().collect();
    qualities.sort_by(|a, b| a.0.cmp(b.0));
    for (name, quality) in qualities {
        validate_quality(quality, &format!("{} quality '{}'", context, name))?;
    }

    if stream.distribution.hls.segment_duration <= 0 {
        return Err(format!(
            "{} has invalid HLS segment_duration: must be greater than 0",
            context
        ));
    }
    Ok(())
}

fn validate_quality(quality: &QualityEntry, context: &str) -> Result<(), String> {
    for (field, value) in [
        ("width", quality.width),
        ("height", quality.height),
        ("framerate", quality.framerate),
    ] {
        if value <= 0 || value > i64::from(u32::MAX) {
            return Err(format!("{} has invalid {}: must be greater than 0", context, field));
        }
    }
    for (field, value) in [
        ("bitrate", &quality.bitrate),
        ("codec", &quality.codec),
        ("audio bitrate", &quality.audio.bitrate),
        ("audio codec", &quality.audio.codec),
    ] {
        if value.is_empty() {
            return Err(format!("{} has empty {}", context, field));
        }
    }
    Ok(())
}

fn validate_path(path: &str, context: &str) -> Result<(), String> {
    if path.contains("..") {
        return Err(format!("{} cannot contain '..' (path traversal attempt)", context));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(format!("{} should be a relative path, not absolute", context));
    }
    if path.as_bytes().get(1) == Some(&b':') {
        return Err(format!("{} should not contain Windows drive letters", context));
    }
    if path.split('/').any(str::is_empty) {
        return Err(format!("{} cannot contain empty segments", context));
    }
    if let Some(seq) = DANGEROUS_PATH_SEQUENCES.iter().find(|seq| path.contains(*seq)) {
        return Err(format!(
            "{} contains potentially dangerous character: {}",
            context, seq
        ));
    }
    Ok(())
}

fn parse_kind(kind: &str) -> Option<StreamType> {
    match kind {
        "video_encoded" => Some(StreamType::VideoEncoded),
        "video_unencoded" => Some(StreamType::VideoUnencoded),
        "live" => Some(StreamType::Live),
        _ => None,
    }
}

// Only called on validated documents: numeric ranges were checked above.
fn to_domain(file: ConfigFile) -> LoadedConfig {
    let application = Application {
        public_path: file.application.public_path,
        all_streams_playlist: AllStreamsPlaylist {
            enabled: file.application.all_streams_playlist.enabled,
            path: file.application.all_streams_playlist.path,
        },
    };
    let server = Server {
        http_port: file.server.http_port as u16,
        rtmp_port: file.server.rtmp_port as u16,
    };
    let channels: Channels = file
        .channels
        .into_iter()
        .filter_map(|(name, entry)| to_stream(entry.stream).map(|stream| (name, stream)))
        .collect();

    LoadedConfig {
        application,
        server,
        channels,
    }
}

fn to_stream(entry: StreamEntry) -> Option<Stream> {
    let kind = parse_kind(&entry.kind)?;
    let qualities = entry
        .qualities
        .into_iter()
        .map(|(name, q)| {
            let quality = Quality {
                width: q.width as u32,
                height: q.height as u32,
                framerate: q.framerate as u32,
                bitrate: q.bitrate,
                codec: q.codec,
                audio: Audio {
                    bitrate: q.audio.bitrate,
                    codec: q.audio.codec,
                },
            };
            (name, quality)
        })
        .collect();

    Some(Stream {
        kind,
        path: entry.path,
        qualities,
        distribution: Distribution {
            hls: Hls {
                segment_duration: entry.distribution.hls.segment_duration as u32,
            },
        },
        video_input_path: Some(entry.video_input_path).filter(|p| !p.is_empty()),
        delete_after_encoding: entry.delete_after_encoding,
        live_stream_key: Some(entry.live_stream_key).filter(|k| !k.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
application:
  public_path: https://cdn.example.com
  all_streams_playlist:
    enabled: true
    path: /all.m3u8
server:
  http: 8080
  rtmp: 1935
stream_templates:
  hd:
    stream:
      type: video_encoded
      path: templates/hd
      qualities:
        720p: { width: 1280, height: 720, framerate: 30, bitrate: 3000k, codec: libx264, audio: { bitrate: 128k, codec: aac } }
      distribution: { hls: { segment_duration: 4 } }
channels:
  "videos/{name}":
    stream:
      type: video_unencoded
      path: videos/{name}
      video_input_path: uploads/{name}
      delete_after_encoding: true
      qualities:
        720p: { width: 1280, height: 720, framerate: 30, bitrate: 3000k, codec: libx264, audio: { bitrate: 128k, codec: aac } }
        360p: { width: 640, height: 360, framerate: 30, bitrate: 800k, codec: libx264, audio: { bitrate: 96k, codec: aac } }
      distribution: { hls: { segment_duration: 6 } }
  "live/{username}":
    stream:
      type: live
      path: live/{username}
      live_stream_key: s3cr3t
      qualities:
        source: { width: 1920, height: 1080, framerate: 60, bitrate: 6000k, codec: copy, audio: { bitrate: 160k, codec: copy } }
      distribution: { hls: { segment_duration: 1 } }
"#;

    fn invalid(content: &str) -> String {
        match YamlConfigFile::parse(content) {
            Err(ConfigError::Invalid(message)) => message,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_valid_config() {
        let config = YamlConfigFile::parse(VALID).unwrap();

        assert_eq!(config.application.public_path, "https://cdn.example.com");
        assert!(config.application.all_streams_playlist.enabled);
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.channels.len(), 2);

        let videos = &config.channels["videos/{name}"];
        assert_eq!(videos.kind, StreamType::VideoUnencoded);
        assert_eq!(videos.video_input_path.as_deref(), Some("uploads/{name}"));
        assert!(videos.delete_after_encoding);
        assert_eq!(videos.qualities["360p"].width, 640);
        assert_eq!(videos.distribution.hls.segment_duration, 6);

        let live = &config.channels["live/{username}"];
        assert_eq!(live.live_stream_key.as_deref(), Some("s3cr3t"));
        assert_eq!(live.video_input_path, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let config = YamlConfigFile::new().load(file.path()).unwrap();
        assert_eq!(config.server.rtmp_port, 1935);
    }

    #[test]
    fn test_load_missing_file() {
        let result = YamlConfigFile::new().load(Path::new("/nonexistent/config.yml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_parse_error() {
        let result = YamlConfigFile::parse("server: [unterminated");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_invalid_application_and_server() {
        let message = invalid(&VALID.replace("path: /all.m3u8", "path: ''"));
        assert!(message.contains("all_streams_playlist"));

        let message = invalid(&VALID.replace("http: 8080", "http: 0"));
        assert!(message.contains("HTTP port"));
    }

    #[test]
    fn test_rejects_unsafe_paths() {
        let message = invalid(&VALID.replace("path: videos/{name}", "path: ../videos/{name}"));
        assert!(message.contains("path traversal"));

        let message = invalid(&VALID.replace("path: videos/{name}", "path: /videos/{name}"));
        assert!(message.contains("relative path"));

        let message = invalid(&VALID.replace("path: videos/{name}", "path: c:/videos"));
        assert!(message.contains("drive letters"));

        let message = invalid(&VALID.replace("path: videos/{name}", "path: videos//{name}"));
        assert!(message.contains("empty segments"));

        let message = invalid(&VALID.replace("uploads/{name}", "uploads/*"));
        assert!(message.contains("video_input_path contains potentially dangerous character: *"));
    }

    #[test]
    fn test_rejects_type_specific_mistakes() {
        let message = invalid(&VALID.replace("type: live", "type: radio"));
        assert!(message.contains("invalid type: radio"));

        let message = invalid(&VALID.replace("      video_input_path: uploads/{name}\n", ""));
        assert!(message.contains("must have video_input_path"));

        let message = invalid(&VALID.replace("live_stream_key: s3cr3t", "live_stream_key: ''"));
        assert!(message.contains("must have live_stream_key"));

        let message = invalid(&VALID.replace(
            "live_stream_key: s3cr3t",
            "live_stream_key: s3cr3t\n      delete_after_encoding: true",
        ));
        assert!(message.contains("should not have delete_after_encoding"));
    }

    #[test]
    fn test_rejects_invalid_qualities() {
        let message = invalid(&VALID.replace("width: 640", "width: 0"));
        assert!(message.contains("quality '360p' has invalid width"));

        let message = invalid(&VALID.replace("bitrate: 96k", "bitrate: ''"));
        assert!(message.contains("empty audio bitrate"));

        let message = invalid(&VALID.replace("segment_duration: 6", "segment_duration: 0"));
        assert!(message.contains("segment_duration"));
    }

    #[test]
    fn test_rejects_root_channel_name() {
        let message = invalid(&VALID.replace("\"videos/{name}\":", "\"/\":"));
        assert!(message.contains("invalid channel name"));
    }
}
