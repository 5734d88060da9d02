//! Labeler client core.
//!
//! This crate provides the client side of the labeler annotation service:
//! - Authentication (access tokens, browser sign-in, job tokens)
//! - Project sessions, subsets and the annotation cache
//! - Concurrent annotation submission and batched reconciliation reads
//! - Schema, statistics and project administration accessors
//! - Agent registry and LLM labeling jobs

pub mod auth;
pub mod config;
pub mod controller;
pub mod errors;
pub mod http;
pub mod labeling;
pub mod model_config;
pub mod project;
pub mod prompt;
pub mod reconciliation;
pub mod routes;
pub mod schema;
pub mod service;
pub mod shared_client;
pub mod statistic;
pub mod submission;
pub mod subset;

// Re-export core types at crate root for convenience
pub use auth::{Authentication, Credential, LoginOptions};
pub use config::{load_config, ClientConfig};
pub use controller::Controller;
pub use errors::{CoreError, CoreResult, RemoteErrorInfo};
pub use labeling::{LabelingEngine, LabelingOutcome, OpenAiLabeler};
pub use model_config::{validate_model_config, validate_model_config_for};
pub use project::ProjectAdmin;
pub use prompt::PromptTemplate;
pub use schema::Schema;
pub use service::{Service, ServiceOptions};
pub use statistic::Statistic;
pub use submission::{SubmissionError, SubmissionResult};
pub use subset::Subset;

pub use labeler_core_types as types;
