//! Study coach core: pipeline coordination and progress analytics.

pub mod capabilities;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod gaps;
pub mod gemini;
pub mod import;
pub mod insights;
pub mod metrics;
pub mod models;
pub mod planner;
pub mod quiz;
pub mod report;
pub mod resources;
pub mod retry;
pub mod store;
pub mod trend;

pub use coordinator::AgentCoordinator;
pub use error::{CoachError, CoachResult};
