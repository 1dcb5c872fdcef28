//! Rate limiting logic and state management.

mod counter;
mod limiter;
mod registry;
mod sweeper;

pub use counter::AttemptCounter;
pub use limiter::{LimiterDefinition, SweepStats};
pub use registry::LimiterRegistry;
pub use sweeper::{ExpirySweeper, SweeperHandle};
