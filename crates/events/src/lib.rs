//! Status notifications emitted by the job agent.
//!
//! The pub/sub abstraction lives here as pure mechanics; infrastructure
//! transports (e.g. Redis) live in `jobagent-infra`.

pub mod bus;
pub mod in_memory_bus;
pub mod status;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use status::{NotifyTarget, Phase, StatusEvent};
