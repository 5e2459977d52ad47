//! Session lifecycle: registry, per-session serial execution, eviction and restore.

pub mod capability;
pub mod entry;
pub mod events;
pub mod eviction;
pub mod executor;
pub mod manager;
mod preserve;
pub mod registry;
pub mod sweeper;

pub use capability::CapabilityRegistry;
pub use entry::{OperationContext, Session};
pub use events::{LifecycleEvent, RestoreReport, SweepReport};
pub use eviction::EvictionPolicy;
pub use executor::SerialExecutor;
pub use manager::{SessionInfo, SessionManager};
pub use registry::{Acquired, SessionRegistry};
pub use sweeper::SweeperHandle;
