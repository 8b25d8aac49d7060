//! Small generated PDFs for tests across the workspace.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

pub const FIXTURE_FONT_SIZE: f32 = 12.0;
pub const FIXTURE_LEADING: f32 = 20.0;
pub const FIXTURE_MARGIN: f32 = 72.0;

/// One page: its MediaBox size in points and the text lines to lay out from the top margin.
#[derive(Debug, Clone)]
pub struct PageSpec {
    pub width_pt: f32,
    pub height_pt: f32,
    pub lines: Vec<String>,
}

impl PageSpec {
    pub fn new(width_pt: f32, height_pt: f32, lines: &[&str]) -> Self {
        Self { width_pt, height_pt, lines: lines.iter().map(|line| (*line).to_owned()).collect() }
    }

    pub fn letter(lines: &[&str]) -> Self {
        Self::new(612.0, 792.0, lines)
    }

    /// Baseline of line `index` in PDF space.
    pub fn baseline(&self, index: usize) -> f32 {
        self.height_pt - FIXTURE_MARGIN - index as f32 * FIXTURE_LEADING
    }
}

/// Builds a PDF whose pages use Helvetica at 12pt, one `Tj` per line.
pub fn build_pdf(pages: &[PageSpec]) -> Vec<u8> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::with_capacity(pages.len());
    for spec in pages {
        let mut operations = Vec::new();
        for (index, line) in spec.lines.iter().enumerate() {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), FIXTURE_FONT_SIZE.into()]),
                Operation::new("Td", vec![FIXTURE_MARGIN.into(), spec.baseline(index).into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(line.as_bytes().to_vec(), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ]);
        }

        let mut content = Content { operations }.encode().unwrap_or_default();
        content.push(b'\n');
        let content_id = document.add_object(Stream::new(dictionary! {}, content));

        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), spec.width_pt.into(), spec.height_pt.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    if let Err(err) = document.save_to(&mut bytes) {
        panic!("fixture PDF failed to serialize: {err}");
    }
    bytes
}
