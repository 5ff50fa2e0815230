pub mod cli;
pub mod config;
pub mod dataset;
pub mod discovery;
pub mod service_bootstrap;
pub mod storage;
pub mod store;
pub mod walker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use service_bootstrap::ServiceContext;
