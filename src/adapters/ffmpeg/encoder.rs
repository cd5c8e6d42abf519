use crate::domain::stream::{
    Distribution, Quality, LIVE_PLAYLIST, LIVE_SEGMENT_NAME, MASTER_PLAYLIST, SEGMENT_NAME,
    SUB_PLAYLIST,
};
use crate::ports::encoder::{EncodeError, EncoderPort, LiveTranscoderPort};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{error, info};

/// Runs the `ffmpeg` binary.
#[derive(Clone, Debug)]
pub struct FfmpegEncoder {
    ffmpeg_path: String,
    /// Only log the VOD command line, never run it
    dry_run: bool,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<String>, dry_run: bool) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            dry_run,
        }
    }

    /// Arguments turning `input_path` into one HLS rendition per quality.
    ///
    /// Qualities are ordered by name so that the `i`-th video output, audio
    /// output and stream map entry all describe the same rendition.
    pub fn vod_args(
        input_path: &Path,
        output_path: &Path,
        qualities: &HashMap<String, Quality>,
        distribution: &Distribution,
    ) -> Vec<String> {
        let mut ordered: Vec<(&String, &Quality)> = qualities.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(b.0));

        let output_dir = output_path.parent().unwrap_or_else(|| Path::new("."));
        let mut args = vec!["-i".to_string(), input_path.to_string_lossy().into_owned()];

        // [0:v]split=2[v0][v1];[v0]scale=1280:720[v0out];[v1]scale=...
        let mut filter = format!("[0:v]split={}", ordered.len());
        for i in 0..ordered.len() {
            filter.push_str(&format!("[v{}]", i));
        }
        for (i, (_, quality)) in ordered.iter().enumerate() {
            filter.push_str(&format!(
                ";[v{i}]scale={}:{}[v{i}out]",
                quality.width, quality.height
            ));
        }
        args.extend(["-filter_complex".to_string(), filter]);

        for (i, (_, quality)) in ordered.iter().enumerate() {
            args.extend([
                "-map".to_string(),
                format!("[v{}out]", i),
                format!("-c:v:{}", i),
                quality.codec.clone(),
                format!("-b:v:{}", i),
                quality.bitrate.clone(),
                format!("-maxrate:v:{}", i),
                max_rate(&quality.bitrate),
                format!("-bufsize:v:{}", i),
                quality.bitrate.clone(),
            ]);
        }

        for (i, (_, quality)) in ordered.iter().enumerate() {
            args.extend([
                "-map".to_string(),
                "a:0".to_string(),
                format!("-c:a:{}", i),
                quality.audio.codec.clone(),
                format!("-b:a:{}", i),
                quality.audio.bitrate.clone(),
            ]);
        }

        let stream_map = ordered
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("v:{i},a:{i},name:{name}"))
            .collect::<Vec<_>>()
            .join(" ");
        let rendition_dir = output_dir.join("%v");

        args.extend([
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            distribution.hls.segment_duration.to_string(),
            "-var_stream_map".to_string(),
            stream_map,
            "-hls_segment_filename".to_string(),
            rendition_dir.join(SEGMENT_NAME).to_string_lossy().into_owned(),
            "-master_pl_name".to_string(),
            MASTER_PLAYLIST.to_string(),
            rendition_dir.join(SUB_PLAYLIST).to_string_lossy().into_owned(),
        ]);
        args
    }

    /// Arguments of a low latency remux of an FLV feed read from stdin.
    pub fn live_args(output_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-re",
            "-fflags",
            "+nobuffer",
            "-flags",
            "low_delay",
            "-f",
            "flv",
            "-i",
            "pipe:0",
            "-c:v",
            "copy",
            "-c:a",
            "copy",
            "-f",
            "hls",
            "-hls_time",
            "1",
            "-hls_list_size",
            "3",
            "-hls_flags",
            "delete_segments+temp_file+independent_segments",
            "-hls_segment_type",
            "mpegts",
            "-hls_allow_cache",
            "0",
            "-hls_segment_filename",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect();

        args.push(output_dir.join(LIVE_SEGMENT_NAME).to_string_lossy().into_owned());
        args.push(output_dir.join(LIVE_PLAYLIST).to_string_lossy().into_owned());
        args
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg", false)
    }
}

/// Two thirds of a `3000k` style bitrate, rounded to the kilobit.
fn max_rate(bitrate: &str) -> String {
    let kbits: f64 = bitrate.trim_end_matches('k').parse().unwrap_or(0.0);
    format!("{:.0}k", kbits * 2.0 / 3.0)
}

#[async_trait]
impl EncoderPort for FfmpegEncoder {
    async fn encode_video(
        &self,
        input_path: &Path,
        output_path: &Path,
        qualities: &HashMap<String, Quality>,
        distribution: &Distribution,
    ) -> Result<(), EncodeError> {
        if qualities.is_empty() {
            return Err(EncodeError::NoQualities);
        }

        let output_dir = output_path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| EncodeError::OutputDir {
                path: output_dir.to_string_lossy().into_owned(),
                source,
            })?;

        let args = Self::vod_args(input_path, output_path, qualities, distribution);
        if self.dry_run {
            info!(command = %format!("{} {}", self.ffmpeg_path, args.join(" ")), "Prepared ffmpeg command");
            return Ok(());
        }

        info!(input = ?input_path, output = ?output_path, "Executing ffmpeg");
        let status = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(EncodeError::Spawn)?;

        if !status.success() {
            error!(%status, input = ?input_path, "ffmpeg execution failed");
            return Err(EncodeError::Failed(status));
        }
        info!(output = ?output_path, "Successfully encoded video");
        Ok(())
    }
}

impl LiveTranscoderPort for FfmpegEncoder {
    fn spawn_live(&self, output_dir: &Path) -> std::io::Result<Child> {
        Command::new(&self.ffmpeg_path)
            .args(Self::live_args(output_dir))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
    }
}
