//! Fixed-layout PDF rendering of a block list via `printpdf` builtin fonts.

use std::io::BufWriter;

use printpdf::*;

use super::{AssembledDocument, Block, DiagramImage, DocumentError, DIAGRAM_WIDTH_IN};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN_X: f32 = 20.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;
const MM_PER_INCH: f32 = 25.4;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
}

/// Page cursor: current layer plus the baseline of the next line.
struct PageCursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
    page: u32,
    footer: Option<&'a str>,
    footer_font: IndirectFontRef,
}

impl PageCursor<'_> {
    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = TOP;
        self.page += 1;
        self.stamp_footer();
    }

    fn stamp_footer(&self) {
        let text = match self.footer {
            Some(footer) => format!("{footer}   {}", self.page),
            None => self.page.to_string(),
        };
        let x = PAGE_W - MARGIN_X - text_width_mm(&text, 8.0);
        self.layer.use_text(text, 8.0, Mm(x), Mm(10.0), &self.footer_font);
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < BOTTOM {
            self.new_page();
        }
    }

    fn line(&mut self, text: &str, size: f32, x: f32, leading: f32, font: &IndirectFontRef) {
        self.ensure(leading);
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
        self.y -= leading;
    }

    fn wrapped(&mut self, text: &str, size: f32, max_chars: usize, leading: f32, font: &IndirectFontRef) {
        for line in wrap_text(text, max_chars) {
            self.line(&line, size, MARGIN_X, leading, font);
        }
    }

    fn centered(&mut self, text: &str, size: f32, leading: f32, font: &IndirectFontRef) {
        let width = text_width_mm(text, size);
        let x = ((PAGE_W - width) / 2.0).max(MARGIN_X);
        self.line(text, size, x, leading, font);
    }

    fn image(&mut self, image: &DiagramImage) {
        // Tall diagrams shrink to fit one page.
        let natural_h = image.print_height_in() * MM_PER_INCH;
        let max_h = TOP - BOTTOM - 4.0;
        let scale = if natural_h > max_h { max_h / natural_h } else { 1.0 };
        let width_mm = DIAGRAM_WIDTH_IN * MM_PER_INCH * scale;
        let height_mm = natural_h * scale;
        self.ensure(height_mm + 4.0);
        let bottom = self.y - height_mm;
        let dpi = image.width() as f32 / (DIAGRAM_WIDTH_IN * scale);

        Image::from_dynamic_image(&::image::DynamicImage::ImageRgb8(image.pixels.clone())).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm((PAGE_W - width_mm) / 2.0)),
                translate_y: Some(Mm(bottom)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        self.y = bottom - 6.0;
    }
}

/// Render `doc` to PDF bytes.
pub fn write_pdf(doc: &AssembledDocument) -> Result<Vec<u8>, DocumentError> {
    let (pdf, page1, layer1) = PdfDocument::new(&doc.title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let fonts = Fonts {
        regular: pdf
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| DocumentError::Pdf(format!("font error: {e}")))?,
        bold: pdf
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| DocumentError::Pdf(format!("font error: {e}")))?,
        mono: pdf
            .add_builtin_font(BuiltinFont::Courier)
            .map_err(|e| DocumentError::Pdf(format!("font error: {e}")))?,
    };

    let mut cursor = PageCursor {
        doc: &pdf,
        layer: pdf.get_page(page1).get_layer(layer1),
        y: TOP,
        page: 1,
        footer: doc.footer.as_deref(),
        footer_font: fonts.regular.clone(),
    };
    cursor.stamp_footer();

    for block in &doc.blocks {
        match block {
            Block::Title(text) => {
                cursor.y = cursor.y.min(200.0);
                cursor.centered(text, 26.0, 14.0, &fonts.bold);
            }
            Block::Subtitle(text) => cursor.centered(text, 14.0, 10.0, &fonts.bold),
            Block::Caption(text) => cursor.centered(text, 10.0, 8.0, &fonts.regular),
            Block::PageBreak => cursor.new_page(),
            Block::Heading { level, text } => {
                let size = match level {
                    1 => 16.0,
                    2 => 13.0,
                    _ => 11.5,
                };
                cursor.y -= 3.0;
                cursor.ensure(14.0);
                cursor.wrapped(text, size, 70, size * 0.5, &fonts.bold);
                cursor.y -= 1.5;
            }
            Block::Paragraph(text) => {
                cursor.wrapped(text, 10.0, 95, 4.8, &fonts.regular);
                cursor.y -= 2.0;
            }
            Block::Code(lines) => {
                for line in lines {
                    for chunk in hard_wrap(line, 90) {
                        cursor.line(&chunk, 8.5, MARGIN_X + 3.0, 3.9, &fonts.mono);
                    }
                }
                cursor.y -= 2.0;
            }
            Block::Diagram(diagram) => {
                cursor.y -= 3.0;
                cursor.ensure(14.0);
                cursor.wrapped(&diagram.title, 13.0, 70, 6.5, &fonts.bold);
                cursor.wrapped(&diagram.description, 10.0, 95, 4.8, &fonts.regular);
                if let Some(image) = &diagram.image {
                    cursor.y -= 2.0;
                    cursor.image(image);
                }
            }
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    pdf.save(&mut buf)
        .map_err(|e| DocumentError::Pdf(format!("save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| DocumentError::Pdf(format!("buffer error: {e}")))
}

/// Approximate Helvetica width: half an em per glyph, 1pt = 0.3528mm.
fn text_width_mm(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5 * 0.3528
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Split a code line into fixed-width chunks, preserving leading spaces.
fn hard_wrap(line: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}
