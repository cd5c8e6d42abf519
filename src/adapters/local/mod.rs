//! Local filesystem adapter.

pub mod fs;

pub use fs::FsAdapter;
