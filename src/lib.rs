pub mod app;
pub mod config;
pub mod error;
pub mod services;
pub mod workflow;

pub use config::Settings;
pub use error::{AppError, CaptureError, ServiceError};

pub use app::{AppController, ControllerHandle};
pub use workflow::{Intent, WorkflowController, WorkflowSnapshot, WorkflowState};
