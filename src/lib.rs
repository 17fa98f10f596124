pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod facade;
pub mod filter;
pub mod host;
pub mod logging;
pub mod model;
pub mod report;
pub mod state;
pub mod time;
pub mod utils;
pub mod xml;

pub use error::{AdaptorError, RecorderError};
pub use host::{TestDescriptor, TestId, TestListener};
pub use report::{ReportWriter, SessionSummary};
pub use state::Aggregator;
