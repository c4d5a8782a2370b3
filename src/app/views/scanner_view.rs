use egui::{Color32, RichText};

use crate::app::views::View;
use crate::workflow::{
    CapturedImage, FollowupAnswer, Intent, MedicationRecord, MedicationSuggestion,
    WorkflowSnapshot, WorkflowState,
};

const ACCENT: Color32 = Color32::from_rgb(2, 132, 199);
const SUCCESS: Color32 = Color32::from_rgb(22, 101, 52);
const DANGER: Color32 = Color32::from_rgb(185, 28, 28);

/// The scan screen. Only the question draft lives here; everything else comes
/// from the snapshot.
#[derive(Default)]
pub struct ScannerView {
    question_draft: String,
}

impl ScannerView {
    pub fn new() -> Self {
        Self::default()
    }

    fn draw_preview(&self, ui: &mut egui::Ui, image: &CapturedImage) {
        let (width, height) = image.dimensions();
        ui.group(|ui| {
            ui.add(
                egui::Image::from_bytes(
                    format!("bytes://capture-{}.jpg", image.id()),
                    egui::load::Bytes::Shared(image.shared_bytes()),
                )
                .max_height(400.0)
                .maintain_aspect_ratio(true),
            );
            ui.label(format!("{}x{}", width, height));
        });
    }

    fn draw_record(&self, ui: &mut egui::Ui, record: &MedicationRecord) {
        ui.group(|ui| {
            ui.label(RichText::new(&record.name).heading().color(SUCCESS));
            if !record.description.is_empty() {
                ui.label(&record.description);
            }
            if let Some(manufacturer) = &record.manufacturer {
                ui.label(format!("Manufacturer: {}", manufacturer));
            }
            if let Some(code) = &record.code {
                ui.label(format!("National code: {}", code));
            }
            if let Some(leaflet) = &record.leaflet {
                ui.hyperlink_to("Open patient leaflet", leaflet);
            }
        });
    }

    fn draw_suggestions(
        &self,
        ui: &mut egui::Ui,
        suggestions: &[MedicationSuggestion],
        intents: &mut Vec<Intent>,
    ) {
        ui.heading("Which one is it?");
        if suggestions.is_empty() {
            ui.label("The photo was not clear enough to suggest anything.");
        }
        for suggestion in suggestions {
            let label = format!("{} ({})", suggestion.name, suggestion.code);
            if ui.button(label).clicked() {
                intents.push(Intent::SelectSuggestion(suggestion.code.clone()));
            }
        }
        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Analyze again").clicked() {
                intents.push(Intent::Analyze);
            }
            if ui.button("Take another photo").clicked() {
                intents.push(Intent::Retry);
            }
        });
    }

    fn draw_question_form(
        &mut self,
        ui: &mut egui::Ui,
        answer: Option<&FollowupAnswer>,
        error: Option<&str>,
        intents: &mut Vec<Intent>,
    ) {
        if let Some(answer) = answer {
            ui.group(|ui| {
                ui.label(RichText::new(&answer.question).strong());
                ui.label(&answer.text);
            });
        }
        if let Some(error) = error {
            ui.colored_label(DANGER, error);
        }

        let response = ui.add(
            egui::TextEdit::singleline(&mut self.question_draft)
                .hint_text("e.g. Can I take it on an empty stomach?"),
        );
        let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        ui.horizontal(|ui| {
            if ui.button("Ask").clicked() || submitted {
                intents.push(self.take_question());
            }
            if ui.button("Back").clicked() {
                self.question_draft.clear();
                intents.push(Intent::BackFromQuestion);
            }
        });
    }

    /// Empty drafts stay in the box so the inline error sits next to them.
    fn take_question(&mut self) -> Intent {
        if self.question_draft.trim().is_empty() {
            Intent::AskQuestion(self.question_draft.clone())
        } else {
            Intent::AskQuestion(std::mem::take(&mut self.question_draft))
        }
    }

    fn draw_busy(
        &self,
        ui: &mut egui::Ui,
        text: &str,
        snapshot: &WorkflowSnapshot,
        intents: &mut Vec<Intent>,
    ) {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label(RichText::new(text).strong());
        });
        if snapshot.reset_pending {
            ui.label("Cancelling once the current request finishes...");
        } else if ui.button("Cancel").clicked() {
            intents.push(Intent::Reset);
        }
    }
}

impl View for ScannerView {
    fn draw(&mut self, ui: &mut egui::Ui, snapshot: &WorkflowSnapshot, intents: &mut Vec<Intent>) {
        ui.heading(RichText::new("Identify Medicine").color(ACCENT));
        ui.separator();

        if let Some(notice) = &snapshot.notice {
            ui.colored_label(DANGER, notice);
        }

        match &snapshot.state {
            WorkflowState::Idle => {
                let label = RichText::new("TAP TO SCAN").size(24.0).color(ACCENT);
                let button = egui::Button::new(label).min_size(egui::vec2(280.0, 280.0));
                if ui.add(button).clicked() {
                    intents.push(Intent::Capture);
                }
            }
            WorkflowState::Capturing => {
                self.draw_busy(ui, "Waiting for the camera...", snapshot, intents);
            }
            WorkflowState::Captured { image } => {
                self.draw_preview(ui, image);
                ui.horizontal(|ui| {
                    if ui.button(RichText::new("X").color(DANGER)).clicked() {
                        intents.push(Intent::Cancel);
                    }
                    if ui.button(RichText::new("ANALYZE").strong()).clicked() {
                        intents.push(Intent::Analyze);
                    }
                });
            }
            WorkflowState::Analyzing { lookup, .. } => {
                let text = match lookup {
                    Some(code) => format!("Looking up {}...", code),
                    None => "Asking the identification service...".to_string(),
                };
                self.draw_busy(ui, &text, snapshot, intents);
            }
            WorkflowState::Result { record, .. } => {
                self.draw_record(ui, record);
                ui.horizontal(|ui| {
                    if ui.button("Ask a question").clicked() {
                        intents.push(Intent::OpenQuestions);
                    }
                    if ui.button("SCAN ANOTHER").clicked() {
                        intents.push(Intent::Reset);
                    }
                });
            }
            WorkflowState::Suggestions { image, suggestions } => {
                self.draw_preview(ui, image);
                self.draw_suggestions(ui, suggestions, intents);
            }
            WorkflowState::QuestionMode {
                record,
                answer,
                error,
                ..
            } => {
                ui.label(RichText::new(&record.name).strong());
                self.draw_question_form(ui, answer.as_ref(), error.as_deref(), intents);
            }
            WorkflowState::Answering {
                record, question, ..
            } => {
                ui.label(RichText::new(&record.name).strong());
                ui.label(format!("Q: {}", question));
                self.draw_busy(ui, "Reading the leaflet...", snapshot, intents);
            }
            WorkflowState::Failed { message } => {
                ui.colored_label(DANGER, format!("⚠ {}", message));
                if ui.button("Try again").clicked() {
                    intents.push(Intent::Retry);
                }
            }
        }
    }
}
