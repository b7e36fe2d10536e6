// src/export/mod.rs
//! Export sink: archive envelope and file writers.

pub mod archive;
pub mod writers;

pub use archive::{FeedArchive, RunStats};
pub use writers::{render_csv, render_markdown, write_archive};
