pub mod controller;
pub mod scanner_app;
pub mod views;

pub use controller::{AppController, ControllerHandle};
pub use scanner_app::ScannerApp;
pub use views::scanner_view::ScannerView;
