//! API implementation submodules.
//!
//! Each submodule contains `impl ExtSync` blocks that extend the public API
//! with domain-specific methods. The struct definition remains in `lib.rs`.

mod builder;
mod extensions;
mod lifecycle;
mod state;

pub use builder::SyncBuilder;
pub use lifecycle::StartupReport;
pub(crate) use state::SyncState;
