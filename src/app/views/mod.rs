pub mod scanner_view;

use crate::workflow::{Intent, WorkflowSnapshot};

/// A view renders a snapshot and collects the intents the user triggered.
pub trait View {
    fn draw(&mut self, ui: &mut egui::Ui, snapshot: &WorkflowSnapshot, intents: &mut Vec<Intent>);
}
