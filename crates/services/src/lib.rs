#![forbid(unsafe_code)]

pub mod aggregation;
pub mod app_services;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod loader;
pub mod recorder;
pub mod runner;

pub use mastery_core::Clock;

pub use aggregation::{AggregationView, Dashboard};
pub use app_services::AppServices;
pub use config::{Backend, ServiceConfig};
pub use context::SessionContext;
pub use error::{AppServicesError, ServiceError};
pub use guard::CallGuard;
pub use loader::SessionLoader;
pub use recorder::{FailedAttempt, FlushReport, ProgressRecorder, RecorderHandle, RetryPolicy};
pub use runner::{QuizOutcome, QuizRunner};
