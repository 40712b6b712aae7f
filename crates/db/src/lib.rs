pub mod connection;
pub mod fixtures;
pub mod locks;
pub mod migrations;
pub mod repositories;
pub mod workflow;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, SeedResult, VerificationResult};
pub use locks::RequestLocks;
pub use workflow::{ApprovalWorkflow, DecisionOutcome, WorkflowError};
