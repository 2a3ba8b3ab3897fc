#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]

pub mod config;
pub mod element;
mod merge;
mod position;
pub mod replica;
pub mod snapshot;
mod view;

pub use config::{ReplicaConfig, ReplicaConfigBuilder};
pub use element::{Element, VersionedIndex, VersionedValue};
pub use replica::Replica;
pub use snapshot::{ElementSnapshot, ReplicaSnapshot, SnapshotError};
