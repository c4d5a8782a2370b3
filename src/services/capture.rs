use std::fs;
use std::path::{Path, PathBuf};
use std::task::{Context, Poll};
use std::time::SystemTime;

use futures::future::BoxFuture;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tower::Service;
use tracing::{debug, info};

use crate::config::CaptureSettings;
use crate::error::CaptureError;
use crate::services::request_log::Operation;
use crate::workflow::CapturedImage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureRequest;

impl Operation for CaptureRequest {
    fn operation(&self) -> &'static str {
        "capture"
    }
}

/// Desktop stand-in for the phone camera: the newest photo dropped into the
/// inbox directory is taken as the shot. An empty inbox means nothing was shot.
#[derive(Debug, Clone)]
pub struct InboxCaptureProvider {
    inbox: PathBuf,
    max_dimension: u32,
    jpeg_quality: u8,
}

impl InboxCaptureProvider {
    pub fn new(settings: &CaptureSettings) -> Self {
        Self {
            inbox: settings.inbox_dir.clone(),
            max_dimension: settings.max_dimension,
            jpeg_quality: settings.jpeg_quality,
        }
    }

    fn take_photo(&self) -> Result<CapturedImage, CaptureError> {
        let path = newest_photo(&self.inbox)?.ok_or(CaptureError::UserCancelled)?;
        debug!("Taking photo from {}", path.display());

        let decoded = image::open(&path)
            .map_err(|e| CaptureError::Device(format!("{}: {}", path.display(), e)))?;
        let normalized = self.normalize(decoded);
        let (width, height) = (normalized.width(), normalized.height());

        let mut bytes = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut bytes, self.jpeg_quality);
        DynamicImage::ImageRgb8(normalized.to_rgb8())
            .write_with_encoder(encoder)
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        info!(
            "Captured {} as {}x{} JPEG ({} bytes)",
            path.display(),
            width,
            height,
            bytes.len()
        );
        Ok(CapturedImage::new(bytes, width, height).with_source(path))
    }

    fn normalize(&self, image: DynamicImage) -> DynamicImage {
        if self.max_dimension == 0 || image.width().max(image.height()) <= self.max_dimension {
            return image;
        }
        image.resize(self.max_dimension, self.max_dimension, FilterType::Triangle)
    }
}

fn newest_photo(inbox: &Path) -> Result<Option<PathBuf>, CaptureError> {
    let entries = fs::read_dir(inbox)
        .map_err(|e| CaptureError::Device(format!("{}: {}", inbox.display(), e)))?;

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || ImageFormat::from_path(&path).is_err() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        match &newest {
            Some((current, _)) if *current >= modified => {}
            _ => newest = Some((modified, path)),
        }
    }
    Ok(newest.map(|(_, path)| path))
}

impl Service<CaptureRequest> for InboxCaptureProvider {
    type Response = CapturedImage;
    type Error = CaptureError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _request: CaptureRequest) -> Self::Future {
        let provider = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || provider.take_photo())
                .await
                .map_err(|e| CaptureError::Device(e.to_string()))?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tower::ServiceExt;

    fn provider(inbox: &Path, max_dimension: u32) -> InboxCaptureProvider {
        InboxCaptureProvider::new(&CaptureSettings {
            inbox_dir: inbox.to_path_buf(),
            max_dimension,
            jpeg_quality: 90,
        })
    }

    #[tokio::test]
    async fn takes_the_photo_as_jpeg() {
        let inbox = tempfile::tempdir().unwrap();
        RgbImage::new(4, 3)
            .save(inbox.path().join("box.png"))
            .unwrap();

        let image = provider(inbox.path(), 1600)
            .oneshot(CaptureRequest)
            .await
            .unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(&image.bytes()[..2], &[0xff, 0xd8]);
        assert_eq!(image.source(), Some(&inbox.path().join("box.png")));
    }

    #[tokio::test]
    async fn large_photos_are_downscaled() {
        let inbox = tempfile::tempdir().unwrap();
        RgbImage::new(40, 20)
            .save(inbox.path().join("wide.png"))
            .unwrap();

        let image = provider(inbox.path(), 10)
            .oneshot(CaptureRequest)
            .await
            .unwrap();
        assert_eq!(image.dimensions(), (10, 5));
    }

    #[tokio::test]
    async fn empty_inbox_counts_as_a_cancel() {
        let inbox = tempfile::tempdir().unwrap();
        fs::write(inbox.path().join("notes.txt"), "not a photo").unwrap();

        let result = provider(inbox.path(), 1600).oneshot(CaptureRequest).await;
        assert_eq!(result, Err(CaptureError::UserCancelled));
    }

    #[tokio::test]
    async fn missing_inbox_is_a_device_error() {
        let inbox = tempfile::tempdir().unwrap();
        let missing = inbox.path().join("camera");

        let result = provider(&missing, 1600).oneshot(CaptureRequest).await;
        assert!(matches!(result, Err(CaptureError::Device(_))));
    }

    #[tokio::test]
    async fn unreadable_photo_is_a_device_error() {
        let inbox = tempfile::tempdir().unwrap();
        fs::write(inbox.path().join("broken.jpg"), b"definitely not jpeg").unwrap();

        let result = provider(inbox.path(), 1600).oneshot(CaptureRequest).await;
        assert!(matches!(result, Err(CaptureError::Device(_))));
    }
}
