// src/lib.rs

//! Incremental harvester for unbounded, virtualized feeds, driven through a
//! running browser's DevTools session. The browser is attached to, never
//! launched; the user's logged-in session stays untouched.

pub mod cdp;
pub mod error;
pub mod export;
pub mod harvest;
pub mod models;

pub use error::{AppError, Result};
