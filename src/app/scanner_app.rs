use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::error;

use crate::app::controller::{AppController, ControllerHandle};
use crate::app::views::{scanner_view::ScannerView, View};
use crate::config::Settings;
use crate::error::AppError;
use crate::services;
use crate::workflow::Intent;

const REPAINT_INTERVAL: Duration = Duration::from_millis(100);

pub struct ScannerApp {
    handle: ControllerHandle,
    controller_task: JoinHandle<()>,
    view: ScannerView,
    errors: Vec<AppError>,
}

impl ScannerApp {
    pub fn new(handle: ControllerHandle, controller_task: JoinHandle<()>) -> Self {
        Self {
            handle,
            controller_task,
            view: ScannerView::new(),
            errors: Vec::new(),
        }
    }

    /// Wires the camera and identification service into a controller and opens the window.
    pub fn start_gui(settings: &Settings) -> Result<(), AppError> {
        let identification = services::identification_service(settings)?;
        let capture = services::capture_service(settings);
        let (controller, handle) = AppController::new(&settings.workflow, capture, identification);
        let controller_task = controller.spawn();

        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size(egui::vec2(
                    settings.ui.window_width,
                    settings.ui.window_height,
                ))
                .with_title(&settings.ui.title),
            ..Default::default()
        };

        eframe::run_native(
            &settings.ui.title,
            options,
            Box::new(move |cc| {
                egui_extras::install_image_loaders(&cc.egui_ctx);
                Ok(Box::new(ScannerApp::new(handle, controller_task)))
            }),
        )
        .map_err(|e| AppError::Ui(e.to_string()))
    }
}

impl eframe::App for ScannerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let snapshot = self.handle.snapshot();
        let mut intents: Vec<Intent> = Vec::new();

        egui::TopBottomPanel::bottom("error_panel")
            .resizable(true)
            .show(ctx, |ui| {
                ui.heading("Error Log");
                egui::ScrollArea::vertical().show(ui, |ui| {
                    for error in self.errors.iter().rev() {
                        ui.label(format!("[ERROR] {}", error));
                    }
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.view.draw(ui, &snapshot, &mut intents);
            });
        });

        for intent in intents {
            if let Err(e) = self.handle.try_submit(intent) {
                error!("Failed to submit intent: {}", e);
                self.errors.push(e);
            }
        }

        let reported = matches!(self.errors.last(), Some(AppError::RuntimeStopped));
        if self.controller_task.is_finished() && !reported {
            self.errors.push(AppError::RuntimeStopped);
        }
        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}
