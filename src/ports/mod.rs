//! Ports - Trait definitions for the collaborators of the core.

pub mod config;
pub mod encoder;
pub mod queue;
pub mod storage;
