//! Domain data structures.

pub mod config;
pub mod item;
pub mod presets;
pub mod template;

pub use config::{ChromeConfig, Config, OutputConfig, TerminationPolicy};
pub use item::{FieldValue, Item, RawItem};
pub use template::{FieldTransform, ItemPredicate, Template};
