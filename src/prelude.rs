//! Recommended API entrypoints grouped by abstraction level.
//!
//! `manager` covers applications that just run lifecycles.
//! `advanced` exposes the channels and transports underneath.

pub mod manager {
    //! Stable high-level surface.
    pub use crate::{
        CloneError, CloneManager, LifecycleConfig, LifecyclePlan, Modifiers, RunReport,
        RunStatus,
    };
}

pub mod advanced {
    //! Channels, transports and the registry.
    //!
    //! Application code should normally stay on `prelude::manager`.
    pub use crate::connection::{AdminChannel, AppChannel, RpcChannel, TcpTransport, Transport};
    pub use crate::protocol::{InterfaceScope, RpcRequest, RpcResponse};
    pub use crate::registry::{CloneRegistry, RoleGuard};
}
