use medscan::app::ScannerApp;
use medscan::{AppError, Settings};
use tracing::{info, Level};

fn init_logging(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let settings = Settings::load()?;
    init_logging(settings.log_level()?);
    info!(
        "Using identification service at {} (timeout {}s), photos from {}",
        settings.service.base_url,
        settings.service.timeout_secs,
        settings.capture.inbox_dir.display()
    );
    ScannerApp::start_gui(&settings)
}
