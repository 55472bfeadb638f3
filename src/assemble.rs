//! Artifact assembly
//!
//! Turns a fetch report into the final artifact: either one composite PDF
//! with pages embedded in ascending index order, or a directory of page
//! files named by zero-padded index. Strict mode refuses incomplete
//! reports; partial mode assembles what succeeded and reports the gaps.

use std::io::Cursor;
use std::path::PathBuf;

use image::{ColorType, ImageFormat};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref};

use crate::config::{AssemblyMode, OutputConfig, OutputMode};
use crate::error::{AssemblyError, Error, Result};
use crate::types::{Artifact, Assembly, FetchReport, Manifest};
use crate::util::{page_file_name, sanitize_filename, unique_output_path};

/// JPEG quality used when a payload has to be re-encoded for embedding
const REENCODE_QUALITY: u8 = 90;

/// Assembles fetched pages into the configured artifact shape.
pub struct Assembler {
    output_dir: PathBuf,
    mode: OutputMode,
    assembly: AssemblyMode,
    save_metadata: bool,
}

impl Assembler {
    /// Create an assembler from the output configuration.
    pub fn new(output: &OutputConfig) -> Self {
        Self {
            output_dir: output.output_dir.clone(),
            mode: output.mode,
            assembly: output.assembly,
            save_metadata: output.save_metadata,
        }
    }

    /// Assemble the report into an artifact.
    ///
    /// In strict mode an incomplete report fails with the missing indices.
    /// In partial mode the ok-subset is assembled in ascending index order,
    /// gaps skipped, and the missing set returned alongside the artifact.
    pub fn assemble(&self, manifest: &Manifest, report: &FetchReport) -> Result<Assembly> {
        let missing = report.missing_indices();
        if !missing.is_empty() && self.assembly == AssemblyMode::Strict {
            return Err(AssemblyError::Incomplete { missing }.into());
        }

        std::fs::create_dir_all(&self.output_dir)?;

        let artifact = match self.mode {
            OutputMode::Document => self.assemble_document(manifest, report)?,
            OutputMode::Pages => self.assemble_pages(manifest, report)?,
        };

        if self.save_metadata {
            // Metadata is a convenience sidecar; its failure must not void
            // an artifact that was already written.
            if let Err(e) = self.write_metadata(manifest, &artifact) {
                tracing::warn!(error = %e, "Failed to write metadata sidecar");
            }
        }

        tracing::info!(
            artifact = %artifact.path().display(),
            pages = report.fetched_count(),
            missing = missing.len(),
            "Artifact assembled"
        );
        Ok(Assembly {
            artifact,
            missing_pages: missing,
        })
    }

    /// Write one composite PDF embedding the ok pages in ascending index order.
    ///
    /// Pages are embedded exactly as reported: no reordering and no
    /// deduplication of byte-identical payloads.
    fn assemble_document(&self, manifest: &Manifest, report: &FetchReport) -> Result<Artifact> {
        let stem = sanitize_filename(&manifest.title);
        let path = unique_output_path(&self.output_dir.join(format!("{stem}.pdf")));

        let mut pdf = Pdf::new();
        let mut alloc = Ref::new(1);
        let catalog_id = alloc.bump();
        let page_tree_id = alloc.bump();
        pdf.catalog(catalog_id).pages(page_tree_id);

        let embedded: Vec<(EmbeddedPage, Ref, Ref, Ref)> = report
            .ok_pages()
            .map(|(index, payload)| {
                let page = prepare_page(index, payload)?;
                Ok((page, alloc.bump(), alloc.bump(), alloc.bump()))
            })
            .collect::<Result<_>>()?;

        let kids: Vec<Ref> = embedded.iter().map(|(_, page_id, _, _)| *page_id).collect();
        pdf.pages(page_tree_id)
            .kids(kids.iter().copied())
            .count(kids.len() as i32);

        let image_name = Name(b"Im0");
        for (page, page_id, image_id, content_id) in &embedded {
            let width = page.width as f32;
            let height = page.height as f32;

            let mut obj = pdf.page(*page_id);
            obj.media_box(Rect::new(0.0, 0.0, width, height));
            obj.parent(page_tree_id);
            obj.contents(*content_id);
            obj.resources().x_objects().pair(image_name, *image_id);
            obj.finish();

            let mut xobject = pdf.image_xobject(*image_id, &page.data);
            xobject.filter(Filter::DctDecode);
            xobject.width(page.width as i32);
            xobject.height(page.height as i32);
            if page.gray {
                xobject.color_space().device_gray();
            } else {
                xobject.color_space().device_rgb();
            }
            xobject.bits_per_component(8);
            xobject.finish();

            let mut content = Content::new();
            content.save_state();
            content.transform([width, 0.0, 0.0, height, 0.0, 0.0]);
            content.x_object(image_name);
            content.restore_state();
            pdf.stream(*content_id, &content.finish());
        }

        std::fs::write(&path, pdf.finish())?;
        Ok(Artifact::Document { path })
    }

    /// Write one file per ok page, named by zero-padded index.
    fn assemble_pages(&self, manifest: &Manifest, report: &FetchReport) -> Result<Artifact> {
        let dir = unique_output_path(&self.output_dir.join(sanitize_filename(&manifest.title)));
        std::fs::create_dir_all(&dir)?;

        let total = report.len();
        let mut files = Vec::with_capacity(report.fetched_count());
        for (index, payload) in report.ok_pages() {
            let file = dir.join(page_file_name(index, total));
            std::fs::write(&file, payload)?;
            files.push(file);
        }

        Ok(Artifact::Pages { dir, files })
    }

    /// Write the service metadata as a pretty-printed JSON sidecar.
    fn write_metadata(&self, manifest: &Manifest, artifact: &Artifact) -> Result<()> {
        let path = match artifact {
            Artifact::Document { path } => path.with_extension("metadata.json"),
            Artifact::Pages { dir, .. } => dir.join("metadata.json"),
        };
        let json = serde_json::to_string_pretty(&manifest.metadata)?;
        std::fs::write(&path, json)?;
        tracing::debug!(path = %path.display(), "Metadata sidecar written");
        Ok(())
    }
}

/// A payload ready for PDF embedding.
#[derive(Debug)]
struct EmbeddedPage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    gray: bool,
}

/// Prepare a page payload for embedding.
///
/// JPEG payloads pass through untouched (DCT-encoded streams embed
/// directly); anything else decodable is normalized to JPEG first. A payload
/// that is not an image at all is an assembly error.
fn prepare_page(index: usize, payload: &[u8]) -> Result<EmbeddedPage> {
    let format = image::guess_format(payload).map_err(|e| {
        Error::Assembly(AssemblyError::UnsupportedPayload {
            index,
            reason: format!("not a recognized image: {e}"),
        })
    })?;
    let decoded = image::load_from_memory(payload).map_err(|e| {
        Error::Assembly(AssemblyError::UnsupportedPayload {
            index,
            reason: format!("payload failed to decode: {e}"),
        })
    })?;
    let (width, height) = (decoded.width(), decoded.height());

    if format == ImageFormat::Jpeg {
        let gray = matches!(decoded.color(), ColorType::L8 | ColorType::L16);
        return Ok(EmbeddedPage {
            data: payload.to_vec(),
            width,
            height,
            gray,
        });
    }

    let mut data = Vec::new();
    image::DynamicImage::ImageRgb8(decoded.to_rgb8())
        .write_to(
            &mut Cursor::new(&mut data),
            image::ImageOutputFormat::Jpeg(REENCODE_QUALITY),
        )
        .map_err(|e| {
            Error::Assembly(AssemblyError::UnsupportedPayload {
                index,
                reason: format!("re-encoding failed: {e}"),
            })
        })?;
    Ok(EmbeddedPage {
        data,
        width,
        height,
        gray: false,
    })
}

/// Read a metadata sidecar path back for assertions.
#[cfg(test)]
fn sidecar_path(artifact: &Artifact) -> PathBuf {
    match artifact {
        Artifact::Document { path } => path.with_extension("metadata.json"),
        Artifact::Pages { dir, .. } => dir.join("metadata.json"),
    }
}
