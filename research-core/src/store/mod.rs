//! Per-project persistence
//!
//! Every store owns exactly one file in the project directory and performs a
//! full read-modify-write of it on each update. There is no locking: writers
//! target disjoint files, and each write replaces the file atomically.

pub mod activity;
pub mod json;
pub mod messages;
pub mod metadata;
pub mod progress;

pub use activity::ActivityStore;
pub use json::Loaded;
pub use messages::MessageQueue;
pub use metadata::{MetadataStore, MetadataUpdate};
pub use progress::{ProgressOutcome, ProgressStore, ProgressUpdate};
