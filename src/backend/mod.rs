//! In-memory backend used by tests and the `serve` command.
//!
//! Not part of the lifecycle manager itself: the manager only ever talks to
//! a backend through the channels in [`crate::connection`].

pub mod conductor;
pub mod memory;
pub mod server;

pub use conductor::{Conductor, RoleManifest};
pub use memory::InMemoryTransport;
pub use server::{ConductorServer, ServerStats};
