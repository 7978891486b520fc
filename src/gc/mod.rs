//! Identity and lifetime tracking across the managed/native boundary

pub mod registry;
pub mod weak_table;


pub use registry::{IdentityRegistry, SweepStats};
pub use weak_table::WeakTable;
