//! Theatrum - Self-hosted media streaming server
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (patterns, templates, streams, authorization, hls)
//! - ports/: Trait definitions (storage, encoder, job queue, configuration)
//! - adapters/: Concrete implementations (filesystem, ffmpeg, YAML, HTTP)
//! - application/: Generic services (transcode queue, live supervisor, detection, ingest)
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
