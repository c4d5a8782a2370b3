use std::fmt;

use crate::error::{CaptureError, ServiceError};
use crate::workflow::types::{CapturedImage, FollowupAnswer, IdentificationOutcome};

/// Identifies one issued operation. Tokens only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub(crate) fn first() -> Self {
        RequestToken(0)
    }

    pub(crate) fn next(self) -> Self {
        RequestToken(self.0 + 1)
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Side effects the controller asks its driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Capture {
        token: RequestToken,
    },
    Identify {
        token: RequestToken,
        image: CapturedImage,
    },
    Lookup {
        token: RequestToken,
        code: String,
    },
    Ask {
        token: RequestToken,
        subject: String,
        question: String,
    },
    Cancel {
        token: RequestToken,
    },
}

impl Command {
    pub fn token(&self) -> RequestToken {
        match self {
            Command::Capture { token }
            | Command::Identify { token, .. }
            | Command::Lookup { token, .. }
            | Command::Ask { token, .. }
            | Command::Cancel { token } => *token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    Captured(Result<CapturedImage, CaptureError>),
    Identified(Result<IdentificationOutcome, ServiceError>),
    Answered(Result<FollowupAnswer, ServiceError>),
}

/// The result of an issued operation, tagged with the token it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub token: RequestToken,
    pub result: CompletionResult,
}

impl Completion {
    pub fn new(token: RequestToken, result: CompletionResult) -> Self {
        Self { token, result }
    }
}
