/// User intents forwarded by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Capture,
    Cancel,
    Analyze,
    SelectSuggestion(String),
    Retry,
    OpenQuestions,
    AskQuestion(String),
    BackFromQuestion,
    Reset,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Capture => "capture",
            Intent::Cancel => "cancel",
            Intent::Analyze => "analyze",
            Intent::SelectSuggestion(_) => "select_suggestion",
            Intent::Retry => "retry",
            Intent::OpenQuestions => "open_questions",
            Intent::AskQuestion(_) => "ask_question",
            Intent::BackFromQuestion => "back_from_question",
            Intent::Reset => "reset",
        }
    }
}
