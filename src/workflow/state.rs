use crate::workflow::types::{CapturedImage, FollowupAnswer, MedicationRecord, MedicationSuggestion};

/// What the user currently sees. Exactly one variant is live at a time and
/// every held value is dropped with the variant that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkflowState {
    #[default]
    Idle,
    Capturing,
    Captured {
        image: CapturedImage,
    },
    Analyzing {
        image: CapturedImage,
        /// Set when the request is a suggestion lookup rather than a photo upload.
        lookup: Option<String>,
    },
    Result {
        image: CapturedImage,
        record: MedicationRecord,
    },
    Suggestions {
        image: CapturedImage,
        suggestions: Vec<MedicationSuggestion>,
    },
    QuestionMode {
        image: CapturedImage,
        record: MedicationRecord,
        answer: Option<FollowupAnswer>,
        error: Option<String>,
    },
    Answering {
        image: CapturedImage,
        record: MedicationRecord,
        question: String,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Idle,
    Capturing,
    Captured,
    Analyzing,
    Result,
    Suggestions,
    QuestionMode,
    Answering,
    Failed,
}

impl WorkflowState {
    pub fn kind(&self) -> StateKind {
        match self {
            WorkflowState::Idle => StateKind::Idle,
            WorkflowState::Capturing => StateKind::Capturing,
            WorkflowState::Captured { .. } => StateKind::Captured,
            WorkflowState::Analyzing { .. } => StateKind::Analyzing,
            WorkflowState::Result { .. } => StateKind::Result,
            WorkflowState::Suggestions { .. } => StateKind::Suggestions,
            WorkflowState::QuestionMode { .. } => StateKind::QuestionMode,
            WorkflowState::Answering { .. } => StateKind::Answering,
            WorkflowState::Failed { .. } => StateKind::Failed,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.kind().is_in_flight()
    }

    pub fn image(&self) -> Option<&CapturedImage> {
        match self {
            WorkflowState::Captured { image }
            | WorkflowState::Analyzing { image, .. }
            | WorkflowState::Result { image, .. }
            | WorkflowState::Suggestions { image, .. }
            | WorkflowState::QuestionMode { image, .. }
            | WorkflowState::Answering { image, .. } => Some(image),
            WorkflowState::Idle | WorkflowState::Capturing | WorkflowState::Failed { .. } => None,
        }
    }

    pub fn record(&self) -> Option<&MedicationRecord> {
        match self {
            WorkflowState::Result { record, .. }
            | WorkflowState::QuestionMode { record, .. }
            | WorkflowState::Answering { record, .. } => Some(record),
            _ => None,
        }
    }
}

impl StateKind {
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            StateKind::Capturing | StateKind::Analyzing | StateKind::Answering
        )
    }
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    /// One-shot message, e.g. a camera failure; cleared by the next accepted intent.
    pub notice: Option<String>,
    pub reset_pending: bool,
}
