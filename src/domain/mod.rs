//! Domain layer - Pure business logic.

pub mod auth;
pub mod hls;
pub mod jobs;
pub mod pattern;
pub mod stream;
pub mod template;
