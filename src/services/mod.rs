pub mod capture;
pub mod identification;
pub mod request_log;

use tower::util::BoxCloneService;
use tower::ServiceBuilder;

use crate::config::Settings;
use crate::error::{CaptureError, ServiceError};
use crate::workflow::CapturedImage;

pub use capture::{CaptureRequest, InboxCaptureProvider};
pub use identification::{HttpIdentificationService, ServiceRequest, ServiceResponse};
pub use request_log::{Operation, RequestLogLayer};

pub type CaptureService = BoxCloneService<CaptureRequest, CapturedImage, CaptureError>;
pub type IdentificationService = BoxCloneService<ServiceRequest, ServiceResponse, ServiceError>;

/// HTTP client wrapped with request logging and the configured timeout.
pub fn identification_service(settings: &Settings) -> Result<IdentificationService, ServiceError> {
    let http = HttpIdentificationService::new(&settings.service)?;
    let service = ServiceBuilder::new()
        .layer(RequestLogLayer::new("identification"))
        .map_err(ServiceError::from_boxed)
        .timeout(settings.service.timeout())
        .service(http);
    Ok(BoxCloneService::new(service))
}

pub fn capture_service(settings: &Settings) -> CaptureService {
    let service = ServiceBuilder::new()
        .layer(RequestLogLayer::new("camera"))
        .service(InboxCaptureProvider::new(&settings.capture));
    BoxCloneService::new(service)
}
