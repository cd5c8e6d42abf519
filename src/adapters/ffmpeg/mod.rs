//! ffmpeg backed transcoders.

mod encoder;

pub use encoder::FfmpegEncoder;
