#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]

pub mod clock;
pub mod errors;
pub mod id;

pub use clock::{ConcurrentWinner, HappenedBeforeOrd, HappenedBeforeOrdering, VectorClock};
pub use id::ElementId;
pub use marray_utils::{EmptyReplicaId, ReplicaId};
