pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod init;
pub mod models;
pub mod rate_limit;
pub mod shutdown;
pub mod transport;

// Re-export key types for convenience
pub use config::Config;
pub use error::ExtractError;
pub use extractor::{Extractor, RunSummary, StopReason, TickOutcome};
pub use init::{initialize_config, InitOptions};
pub use models::{Extraction, Project, User};
pub use shutdown::{Shutdown, StopCause};
pub use transport::{create_transport, HttpResponse, Transport};

// Test utilities module - only compiled with test or testing feature
#[cfg(any(test, feature = "testing"))]
pub mod test_utils;
