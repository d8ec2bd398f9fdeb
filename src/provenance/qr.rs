//! QR raster generation

use std::io::Cursor;

use image::{ImageFormat, Luma};
use qrcode::QrCode;
use tracing::debug;
use uuid::Uuid;

use crate::store::{FileStore, StorageRoot};
use crate::types::{PipelineError, Result};

use super::ProvenancePayload;

/// QR generator configuration
#[derive(Debug, Clone)]
pub struct QrConfig {
    /// Minimum raster edge in pixels; sized for embedding at 60pt
    pub min_pixels: u32,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self { min_pixels: 240 }
    }
}

/// Generated QR artifact
#[derive(Debug, Clone)]
pub struct QrArtifact {
    /// Raster path, relative to the QR-outputs root
    pub path: String,
    /// Canonical provenance string encoded in the raster
    pub data: String,
}

/// Renders provenance payloads as scannable rasters
///
/// Output files are keyed by request id so concurrent items never collide.
/// There is no internal retry; the caller decides whether to retry the
/// whole item.
#[derive(Debug, Clone)]
pub struct QrGenerator {
    config: QrConfig,
    store: FileStore,
}

impl QrGenerator {
    /// Create a generator writing into the given store
    pub fn new(config: QrConfig, store: FileStore) -> Self {
        Self { config, store }
    }

    /// Encode the payload and write the raster for the given request
    pub async fn generate(
        &self,
        payload: &ProvenancePayload,
        request_id: Uuid,
    ) -> Result<QrArtifact> {
        let data = payload.canonical_json()?;
        let png = self.encode_png(&data)?;

        let relative = format!("qr_{request_id}.png");
        self.store
            .write_atomic(StorageRoot::QrOutputs, &relative, &png)
            .await?;

        debug!(request_id = %request_id, bytes = png.len(), "QR raster written");

        Ok(QrArtifact { path: relative, data })
    }

    fn encode_png(&self, data: &str) -> Result<Vec<u8>> {
        let code = QrCode::new(data.as_bytes())
            .map_err(|e| PipelineError::Qr(format!("encode: {e}")))?;

        let raster = code
            .render::<Luma<u8>>()
            .min_dimensions(self.config.min_pixels, self.config.min_pixels)
            .build();

        let mut png = Vec::new();
        image::DynamicImage::ImageLuma8(raster)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| PipelineError::Qr(format!("raster encode: {e}")))?;

        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RequestCategory, RequestorSnapshot, SigningRequest};
    use chrono::Utc;
    use tempfile::TempDir;

    fn generator(dir: &TempDir) -> QrGenerator {
        let store = FileStore::new(
            dir.path().join("uploads"),
            dir.path().join("signed"),
            dir.path().join("qr"),
        );
        QrGenerator::new(QrConfig::default(), store)
    }

    fn sample_payload() -> (ProvenancePayload, Uuid) {
        let request = SigningRequest::new(
            "Letter".to_string(),
            RequestCategory::Endorsement,
            RequestorSnapshot {
                id: "student-1".to_string(),
                display_name: "Alice".to_string(),
                registration_number: None,
                email: None,
            },
            "lecturer-1".to_string(),
            Some("doc.pdf".to_string()),
        );
        let id = request.id;
        (ProvenancePayload::new(&request, "lecturer-1", Utc::now()), id)
    }

    #[tokio::test]
    async fn test_raster_written_keyed_by_request_id() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir);
        let (payload, request_id) = sample_payload();

        let artifact = generator.generate(&payload, request_id).await.unwrap();

        assert_eq!(artifact.path, format!("qr_{request_id}.png"));
        let path = dir.path().join("qr").join(&artifact.path);
        let bytes = std::fs::read(path).unwrap();
        // PNG signature
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    }

    #[tokio::test]
    async fn test_artifact_carries_canonical_data() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir);
        let (payload, request_id) = sample_payload();

        let artifact = generator.generate(&payload, request_id).await.unwrap();
        assert_eq!(artifact.data, payload.canonical_json().unwrap());
    }

    #[tokio::test]
    async fn test_unwritable_output_location_fails() {
        let dir = TempDir::new().unwrap();
        // Occupy the QR root path with a plain file
        std::fs::write(dir.path().join("qr"), b"not a directory").unwrap();

        let generator = generator(&dir);
        let (payload, request_id) = sample_payload();

        let result = generator.generate(&payload, request_id).await;
        assert!(matches!(result, Err(PipelineError::Storage(_))));
    }
}
