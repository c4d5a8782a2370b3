use std::mem;

use tracing::{debug, error, info, warn};

use crate::error::CaptureError;
use crate::workflow::command::{Command, Completion, CompletionResult, RequestToken};
use crate::workflow::intent::Intent;
use crate::workflow::state::{WorkflowSnapshot, WorkflowState};
use crate::workflow::types::{CapturedImage, IdentificationOutcome};

pub const EMPTY_QUESTION_MESSAGE: &str = "Type a question first.";

/// The capture -> identify -> present state machine.
///
/// The controller performs no I/O. Intents and completions go in, at most one
/// [`Command`] comes out per step, and the driver executes it. A completion is
/// applied only when it carries the token of the operation currently awaited.
#[derive(Debug)]
pub struct WorkflowController {
    state: WorkflowState,
    notice: Option<String>,
    in_flight: Option<RequestToken>,
    last_token: RequestToken,
    abort_in_flight: bool,
    reset_pending: bool,
}

impl Default for WorkflowController {
    fn default() -> Self {
        Self::new(true)
    }
}

impl WorkflowController {
    pub fn new(abort_in_flight: bool) -> Self {
        Self {
            state: WorkflowState::Idle,
            notice: None,
            in_flight: None,
            last_token: RequestToken::first(),
            abort_in_flight,
            reset_pending: false,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn in_flight(&self) -> Option<RequestToken> {
        self.in_flight
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            state: self.state.clone(),
            notice: self.notice.clone(),
            reset_pending: self.reset_pending,
        }
    }

    /// Applies a user intent. Intents that are illegal in the current state are ignored.
    pub fn handle_intent(&mut self, intent: Intent) -> Option<Command> {
        let name = intent.name();
        let from = self.state.kind();
        if self.reset_pending {
            debug!("Ignoring {} while a reset waits on {:?}", name, from);
            return None;
        }

        let state = mem::take(&mut self.state);
        let (next, command, accepted) = match (state, intent) {
            (WorkflowState::Idle, Intent::Capture) => {
                let token = self.issue();
                (WorkflowState::Capturing, Some(Command::Capture { token }), true)
            }
            (WorkflowState::Captured { image }, Intent::Analyze)
            | (WorkflowState::Suggestions { image, .. }, Intent::Analyze) => {
                let token = self.issue();
                let command = Command::Identify {
                    token,
                    image: image.clone(),
                };
                (
                    WorkflowState::Analyzing {
                        image,
                        lookup: None,
                    },
                    Some(command),
                    true,
                )
            }
            (WorkflowState::Suggestions { image, suggestions }, Intent::SelectSuggestion(code)) => {
                if suggestions.iter().any(|s| s.code == code) {
                    let token = self.issue();
                    let command = Command::Lookup {
                        token,
                        code: code.clone(),
                    };
                    (
                        WorkflowState::Analyzing {
                            image,
                            lookup: Some(code),
                        },
                        Some(command),
                        true,
                    )
                } else {
                    debug!("Ignoring unknown suggestion {}", code);
                    (WorkflowState::Suggestions { image, suggestions }, None, false)
                }
            }
            (WorkflowState::Result { image, record }, Intent::OpenQuestions) => (
                WorkflowState::QuestionMode {
                    image,
                    record,
                    answer: None,
                    error: None,
                },
                None,
                true,
            ),
            (
                WorkflowState::QuestionMode {
                    image,
                    record,
                    answer,
                    ..
                },
                Intent::AskQuestion(text),
            ) => {
                let question = text.trim();
                if question.is_empty() {
                    (
                        WorkflowState::QuestionMode {
                            image,
                            record,
                            answer,
                            error: Some(EMPTY_QUESTION_MESSAGE.to_string()),
                        },
                        None,
                        true,
                    )
                } else {
                    let token = self.issue();
                    let command = Command::Ask {
                        token,
                        subject: record.subject_ref().to_string(),
                        question: question.to_string(),
                    };
                    (
                        WorkflowState::Answering {
                            image,
                            record,
                            question: question.to_string(),
                        },
                        Some(command),
                        true,
                    )
                }
            }
            (WorkflowState::QuestionMode { image, record, .. }, Intent::BackFromQuestion) => {
                (WorkflowState::Result { image, record }, None, true)
            }
            (WorkflowState::Captured { .. }, Intent::Cancel)
            | (WorkflowState::Suggestions { .. }, Intent::Retry)
            | (WorkflowState::Failed { .. }, Intent::Retry) => (WorkflowState::Idle, None, true),
            (state, Intent::Reset) | (state, Intent::Cancel) if state.is_in_flight() => {
                let (next, command) = self.interrupt(state);
                (next, command, true)
            }
            (_, Intent::Reset) => (WorkflowState::Idle, None, true),
            (state, _) => (state, None, false),
        };

        self.state = next;
        if accepted {
            self.notice = None;
            debug!("{:?} --{}--> {:?}", from, name, self.state.kind());
        } else {
            debug!("Ignoring {} in {:?}", name, from);
        }
        command
    }

    /// Applies the result of an operation. Returns false when the completion was stale.
    pub fn handle_completion(&mut self, completion: Completion) -> bool {
        let Completion { token, result } = completion;
        if self.in_flight != Some(token) {
            debug!("Discarding stale completion {}", token);
            return false;
        }
        self.in_flight = None;

        if self.reset_pending {
            self.reset_pending = false;
            self.state = WorkflowState::Idle;
            info!("Deferred reset applied after completion {}", token);
            return true;
        }

        let from = self.state.kind();
        let state = mem::take(&mut self.state);
        let next = match (state, result) {
            (WorkflowState::Capturing, CompletionResult::Captured(Ok(image))) => {
                WorkflowState::Captured { image }
            }
            (WorkflowState::Capturing, CompletionResult::Captured(Err(err))) => {
                if let CaptureError::Device(_) = err {
                    warn!("Capture failed: {}", err);
                    self.notice = Some(err.to_string());
                } else {
                    debug!("Capture cancelled by the user");
                }
                WorkflowState::Idle
            }
            (WorkflowState::Analyzing { image, .. }, CompletionResult::Identified(Ok(outcome))) => {
                Self::present(image, outcome)
            }
            (WorkflowState::Analyzing { .. }, CompletionResult::Identified(Err(err))) => {
                warn!("Identification request failed: {}", err);
                WorkflowState::Failed {
                    message: err.user_message(),
                }
            }
            (
                WorkflowState::Answering {
                    image,
                    record,
                    ..
                },
                CompletionResult::Answered(result),
            ) => {
                let (answer, error) = match result {
                    Ok(answer) => (Some(answer), None),
                    Err(err) => {
                        warn!("Follow-up question failed: {}", err);
                        (None, Some(err.user_message()))
                    }
                };
                WorkflowState::QuestionMode {
                    image,
                    record,
                    answer,
                    error,
                }
            }
            (state, result) => {
                error!(
                    "Completion {} does not match {:?}: {:?}",
                    token,
                    state.kind(),
                    result
                );
                self.in_flight = Some(token);
                self.state = state;
                return false;
            }
        };
        self.state = next;
        debug!("{:?} --completion {}--> {:?}", from, token, self.state.kind());
        true
    }

    fn present(image: CapturedImage, outcome: IdentificationOutcome) -> WorkflowState {
        match outcome {
            IdentificationOutcome::Identified { subject } => {
                info!("Identified {}", subject.name);
                WorkflowState::Result {
                    image,
                    record: subject,
                }
            }
            IdentificationOutcome::Ambiguous { suggestions } => {
                info!("Identification ambiguous, {} suggestions", suggestions.len());
                WorkflowState::Suggestions { image, suggestions }
            }
            IdentificationOutcome::NotFound { message }
            | IdentificationOutcome::ServiceError { message } => {
                info!("Identification service answered negatively: {}", message);
                WorkflowState::Failed { message }
            }
        }
    }

    fn interrupt(&mut self, state: WorkflowState) -> (WorkflowState, Option<Command>) {
        if self.abort_in_flight {
            let command = self.in_flight.take().map(|token| Command::Cancel { token });
            (WorkflowState::Idle, command)
        } else {
            info!("Reset deferred until {:?} resolves", state.kind());
            self.reset_pending = true;
            (state, None)
        }
    }

    fn issue(&mut self) -> RequestToken {
        self.last_token = self.last_token.next();
        self.in_flight = Some(self.last_token);
        self.last_token
    }
}
