//! Chrome DevTools Protocol plumbing.

pub mod client;
pub mod protocol;

pub use client::{CdpClient, CdpSession};
pub use protocol::{BrowserVersion, PageTab};
