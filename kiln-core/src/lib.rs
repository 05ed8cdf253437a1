//! kiln Core Library
//!
//! Builder instances (named groups of build nodes), their persistent store,
//! the driver abstraction that realizes nodes, and the bootstrap sequence that
//! brings them to a connectable state.

pub mod bootstrap;
pub mod builder;
pub mod config;
pub mod drivers;
pub mod error;
pub mod observability;
pub mod paths;
pub mod platform;
pub mod progress;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use config::Config;
pub use drivers::{Driver, DriverFactory, DriverRegistry, EngineConnection, EngineEndpoint};
pub use error::{KilnError, Result};
pub use observability::init as init_observability;
pub use platform::Platform;
pub use store::{Store, Txn};
pub use types::{Node, NodeGroup};
