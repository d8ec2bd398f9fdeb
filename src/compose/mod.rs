//! Signature compositor
//!
//! Merges an existing document's pages into a signed artifact: every page
//! except the last is carried unmodified, and the last page gains a
//! signature block (signature image, signer name and title, category
//! header, verification QR with caption). The composed output is built
//! fully in memory and written through the store's atomic path, so a
//! failure never leaves a partial file. The source document is never
//! mutated.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::domain::RequestCategory;
use crate::store::{FileStore, StorageRoot};
use crate::types::{PipelineError, Result};

// Overlay geometry, in PDF points from the lower-left of the last page.
const SIGNATURE_X: f32 = 50.0;
const SIGNATURE_Y: f32 = 80.0;
const SIGNATURE_WIDTH: f32 = 120.0;
const SIGNATURE_HEIGHT: f32 = 60.0;
const QR_SIZE: f32 = 60.0;
const QR_X: f32 = SIGNATURE_X + SIGNATURE_WIDTH + 40.0;
const QR_Y: f32 = SIGNATURE_Y;
const QR_CAPTION: &str = "Verify";

const HEADER_FONT_SIZE: f32 = 9.0;
const BODY_FONT_SIZE: f32 = 8.0;
const ANNOTATION_FONT_SIZE: f32 = 7.0;

// Approximate mean glyph advance for Helvetica, as a fraction of the font
// size. Used to size the name underline and center the QR caption.
const MEAN_GLYPH_ADVANCE: f32 = 0.5;

const OVERLAY_FONT: &str = "Fov";
const SIGNATURE_XOBJECT: &str = "XSig";
const QR_XOBJECT: &str = "XQr";

/// Inputs for one composition
#[derive(Debug, Clone)]
pub struct CompositionInput {
    /// Source document, relative to the source-uploads root
    pub source_document: String,
    /// Signature image, relative to the source-uploads root
    pub signature_image: String,
    /// QR raster, relative to the QR-outputs root
    pub qr_code: String,
    /// Signer display name, printed and underlined beneath the signature
    pub signer_name: String,
    /// Signer title, printed beneath the name
    pub signer_title: String,
    /// Request category; drives the header line and optional annotation
    pub category: RequestCategory,
    /// Signed-at display string for the header line
    pub signed_at_display: String,
    /// Output path, relative to the signed-outputs root
    pub output: String,
}

/// Composes signed documents by overlaying a signature block onto the
/// final page
#[derive(Debug, Clone)]
pub struct SignatureCompositor {
    store: FileStore,
}

impl SignatureCompositor {
    /// Create a compositor over the given store
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    /// Compose and write the signed artifact for one request
    pub async fn compose_signed(&self, input: CompositionInput) -> Result<()> {
        // Fail fast, naming the missing resource
        if !self
            .store
            .exists(StorageRoot::SourceUploads, &input.source_document)
            .await
        {
            return Err(PipelineError::Composition(format!(
                "source document not found: {}",
                input.source_document
            )));
        }
        if !self
            .store
            .exists(StorageRoot::SourceUploads, &input.signature_image)
            .await
        {
            return Err(PipelineError::Composition(format!(
                "signature image not found: {}",
                input.signature_image
            )));
        }
        if !self.store.exists(StorageRoot::QrOutputs, &input.qr_code).await {
            return Err(PipelineError::Composition(format!(
                "QR raster not found: {}",
                input.qr_code
            )));
        }

        let source_bytes = self
            .store
            .read(StorageRoot::SourceUploads, &input.source_document)
            .await?;
        let signature_path = self
            .store
            .resolve(StorageRoot::SourceUploads, &input.signature_image);
        let qr_path = self.store.resolve(StorageRoot::QrOutputs, &input.qr_code);

        let overlay = OverlayText {
            signer_name: input.signer_name.clone(),
            signer_title: input.signer_title.clone(),
            category: input.category,
            signed_at_display: input.signed_at_display.clone(),
        };

        let output_bytes = tokio::task::spawn_blocking(move || {
            compose_overlay(&source_bytes, &signature_path, &qr_path, &overlay)
        })
        .await
        .map_err(|e| PipelineError::Composition(format!("compose task failed: {e}")))??;

        self.store
            .write_atomic(StorageRoot::SignedOutputs, &input.output, &output_bytes)
            .await?;

        debug!(
            output = %input.output,
            bytes = output_bytes.len(),
            "Signed document composed"
        );

        Ok(())
    }
}

struct OverlayText {
    signer_name: String,
    signer_title: String,
    category: RequestCategory,
    signed_at_display: String,
}

fn compose_overlay(
    source_bytes: &[u8],
    signature_path: &std::path::Path,
    qr_path: &std::path::Path,
    overlay: &OverlayText,
) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(source_bytes)
        .map_err(|e| PipelineError::Composition(format!("load source: {e}")))?;

    let last_page_id = *doc
        .get_pages()
        .values()
        .next_back()
        .ok_or_else(|| PipelineError::Composition("document has no pages".to_string()))?;

    let signature = xobject_from_image(signature_path)?;
    let qr = xobject_from_image(qr_path)?;
    let (signature_width, signature_height) = fit_into_box(
        image_dimensions(&signature)?,
        SIGNATURE_WIDTH,
        SIGNATURE_HEIGHT,
    );

    let signature_id = doc.add_object(signature);
    let qr_id = doc.add_object(qr);
    doc.add_xobject(last_page_id, SIGNATURE_XOBJECT, signature_id)
        .map_err(|e| PipelineError::Composition(format!("register signature image: {e}")))?;
    doc.add_xobject(last_page_id, QR_XOBJECT, qr_id)
        .map_err(|e| PipelineError::Composition(format!("register QR image: {e}")))?;
    register_overlay_font(&mut doc, last_page_id)?;

    // Bracket the original content in q/Q so its graphics state cannot
    // displace the overlay, then append the overlay operations.
    let original = doc
        .get_and_decode_page_content(last_page_id)
        .map_err(|e| PipelineError::Composition(format!("decode last page: {e}")))?;

    let mut operations = Vec::with_capacity(original.operations.len() + 48);
    operations.push(Operation::new("q", vec![]));
    operations.extend(original.operations);
    operations.push(Operation::new("Q", vec![]));
    operations.extend(overlay_operations(overlay, signature_width, signature_height));

    let encoded = Content { operations }
        .encode()
        .map_err(|e| PipelineError::Composition(format!("encode overlay: {e}")))?;
    doc.change_page_content(last_page_id, encoded)
        .map_err(|e| PipelineError::Composition(format!("replace last page: {e}")))?;

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| PipelineError::Composition(format!("serialize output: {e}")))?;

    Ok(output)
}

fn xobject_from_image(path: &std::path::Path) -> Result<Stream> {
    lopdf::xobject::image(path)
        .map_err(|e| PipelineError::Composition(format!("embed {}: {e}", path.display())))
}

fn image_dimensions(image: &Stream) -> Result<(f32, f32)> {
    let width = image
        .dict
        .get(b"Width")
        .and_then(Object::as_i64)
        .map_err(|e| PipelineError::Composition(format!("image width: {e}")))?;
    let height = image
        .dict
        .get(b"Height")
        .and_then(Object::as_i64)
        .map_err(|e| PipelineError::Composition(format!("image height: {e}")))?;
    Ok((width as f32, height as f32))
}

/// Scale dimensions to fit a box while preserving aspect ratio
fn fit_into_box((width, height): (f32, f32), box_width: f32, box_height: f32) -> (f32, f32) {
    if width <= 0.0 || height <= 0.0 {
        return (box_width, box_height);
    }
    let scale = (box_width / width).min(box_height / height);
    (width * scale, height * scale)
}

fn approximate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * MEAN_GLYPH_ADVANCE
}

fn text_line(x: f32, y: f32, font_size: f32, text: &str) -> [Operation; 5] {
    [
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(OVERLAY_FONT.into()), font_size.into()],
        ),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

fn image_placement(name: &str, x: f32, y: f32, width: f32, height: f32) -> [Operation; 4] {
    [
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                width.into(),
                0.into(),
                0.into(),
                height.into(),
                x.into(),
                y.into(),
            ],
        ),
        Operation::new("Do", vec![Object::Name(name.into())]),
        Operation::new("Q", vec![]),
    ]
}

fn overlay_operations(
    overlay: &OverlayText,
    signature_width: f32,
    signature_height: f32,
) -> Vec<Operation> {
    let mut ops = Vec::new();

    // Header line above the block: approved category and timestamp
    let header = format!(
        "Approved: {} ({})",
        overlay.category.label(),
        overlay.signed_at_display
    );
    let header_y = SIGNATURE_Y + SIGNATURE_HEIGHT + 10.0;
    ops.extend(text_line(SIGNATURE_X, header_y, HEADER_FONT_SIZE, &header));

    // Signature image in its fixed box, aspect preserved
    ops.extend(image_placement(
        SIGNATURE_XOBJECT,
        SIGNATURE_X,
        SIGNATURE_Y,
        signature_width,
        signature_height,
    ));

    // QR raster to the right of the signature
    ops.extend(image_placement(QR_XOBJECT, QR_X, QR_Y, QR_SIZE, QR_SIZE));

    // Signer name with an underline sized to the text, then the title
    let name_y = SIGNATURE_Y - 20.0;
    let line_y = name_y - 5.0;
    let title_y = line_y - 10.0;
    ops.extend(text_line(SIGNATURE_X, name_y, BODY_FONT_SIZE, &overlay.signer_name));

    let underline_width = approximate_text_width(&overlay.signer_name, BODY_FONT_SIZE);
    ops.push(Operation::new("m", vec![SIGNATURE_X.into(), line_y.into()]));
    ops.push(Operation::new(
        "l",
        vec![(SIGNATURE_X + underline_width).into(), line_y.into()],
    ));
    ops.push(Operation::new("S", vec![]));

    ops.extend(text_line(
        SIGNATURE_X,
        title_y,
        BODY_FONT_SIZE,
        &overlay.signer_title,
    ));

    // Category-specific instructional lines beneath the title
    if let Some(lines) = overlay.category.annotation_lines() {
        let mut note_y = title_y - 12.0;
        for line in lines {
            ops.extend(text_line(SIGNATURE_X, note_y, ANNOTATION_FONT_SIZE, line));
            note_y -= 10.0;
        }
    }

    // Centered caption beneath the QR raster
    let caption_width = approximate_text_width(QR_CAPTION, BODY_FONT_SIZE);
    let caption_x = QR_X + QR_SIZE / 2.0 - caption_width / 2.0;
    ops.extend(text_line(caption_x, QR_Y - 15.0, BODY_FONT_SIZE, QR_CAPTION));

    ops
}

fn register_overlay_font(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    // Resources may be inline on the page or a referenced dictionary; the
    // Font entry itself may also be referenced.
    enum FontSlot {
        Inline,
        Referenced(ObjectId),
    }

    let slot = {
        let resources = doc
            .get_or_create_resources(page_id)
            .map_err(|e| PipelineError::Composition(format!("page resources: {e}")))?
            .as_dict_mut()
            .map_err(|e| PipelineError::Composition(format!("page resources: {e}")))?;

        match resources.get(b"Font") {
            Ok(Object::Reference(id)) => FontSlot::Referenced(*id),
            Ok(Object::Dictionary(_)) => FontSlot::Inline,
            _ => {
                resources.set("Font", Dictionary::new());
                FontSlot::Inline
            }
        }
    };

    let fonts = match slot {
        FontSlot::Inline => doc
            .get_or_create_resources(page_id)
            .and_then(Object::as_dict_mut)
            .and_then(|resources| resources.get_mut(b"Font"))
            .and_then(Object::as_dict_mut),
        FontSlot::Referenced(id) => doc.get_object_mut(id).and_then(Object::as_dict_mut),
    }
    .map_err(|e| PipelineError::Composition(format!("page font resources: {e}")))?;

    fonts.set(OVERLAY_FONT, Object::Reference(font_id));
    Ok(())
}
