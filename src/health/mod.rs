//! URL health monitoring: probes, result cache, notification bus and the
//! orchestrating monitor

pub mod bus;
pub mod cache;
pub mod monitor;
pub mod policy;
pub mod probe;

pub use bus::{EventBus, HealthBus, HealthEvent, SubscriptionToken};
pub use cache::HealthCache;
pub use monitor::{BatchOptions, CheckOptions, HealthMonitor};
pub use policy::{Backoff, RetryPolicy};
pub use probe::{FaviconProbe, HeadProbe, ProbeError, ProbeResult, ProbeStrategy};
