//! Application layer - Generic services that use ports.

pub mod detector;
pub mod ingest;
pub mod playlist;
pub mod stream_service;
pub mod supervisor;
pub mod transcode_queue;
