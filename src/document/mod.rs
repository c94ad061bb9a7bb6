//! Structural document model shared by the narrative exports and build
//! assembly, plus its two writers.
//!
//! Content is first reduced to a flat list of `Block`s; `docx` and `pdf`
//! each render that list. Neither writer sees markdown.

pub mod docx;
pub mod markdown;
pub mod pdf;

pub use docx::write_docx;
pub use markdown::markdown_blocks;
pub use pdf::write_pdf;

use std::io::Cursor;

use thiserror::Error;

/// Fixed print width for embedded diagrams.
pub const DIAGRAM_WIDTH_IN: f32 = 5.5;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("DOCX packaging failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    /// Bold, centered line under the title.
    Subtitle(String),
    /// Small centered line, used for the generation date.
    Caption(String),
    PageBreak,
    Heading { level: u8, text: String },
    Paragraph(String),
    /// Lines of a fenced code region, rendered monospaced.
    Code(Vec<String>),
    Diagram(DiagramBlock),
}

/// Heading, description and (if one was ingested) the image.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramBlock {
    pub title: String,
    pub description: String,
    pub image: Option<DiagramImage>,
}

/// Diagram pixels normalized to 8-bit RGB.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramImage {
    pub name: String,
    pub pixels: image::RgbImage,
}

impl DiagramImage {
    /// Decode any supported image and drop its alpha channel.
    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self, DocumentError> {
        let pixels = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self {
            name: name.to_string(),
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Re-encoded RGB PNG bytes.
    pub fn png_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(self.pixels.clone())
            .write_to(&mut out, image::ImageOutputFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Print height in inches when scaled to `DIAGRAM_WIDTH_IN`.
    pub fn print_height_in(&self) -> f32 {
        if self.width() == 0 {
            return 0.0;
        }
        DIAGRAM_WIDTH_IN * self.height() as f32 / self.width() as f32
    }
}

/// Ordered blocks plus document-level metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDocument {
    pub title: String,
    /// Text printed before the page number on every page.
    pub footer: Option<String>,
    pub blocks: Vec<Block>,
}

impl AssembledDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            footer: None,
            blocks: Vec::new(),
        }
    }

    pub fn with_blocks(title: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            ..Self::new(title)
        }
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Diagram blocks that carry an image.
    pub fn embedded_images(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Block::Diagram(DiagramBlock { image: Some(_), .. })))
            .count()
    }
}
