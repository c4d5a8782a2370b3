//! The capture -> identify -> present workflow, free of any I/O or UI.

pub mod command;
pub mod controller;
pub mod intent;
pub mod state;
pub mod types;

pub use command::{Command, Completion, CompletionResult, RequestToken};
pub use controller::WorkflowController;
pub use intent::Intent;
pub use state::{StateKind, WorkflowSnapshot, WorkflowState};
pub use types::{
    CapturedImage, FollowupAnswer, IdentificationOutcome, MedicationRecord, MedicationSuggestion,
};
