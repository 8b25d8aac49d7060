//! Document writer: paints overlays into an existing PDF
//!
//! Drawing calls are queued per page and flushed on [`DocumentWriter::save`]
//! as one extra content stream per page. The page's original content is
//! wrapped in `q`/`Q` so overlays start from a clean graphics state.

use crate::lopdf_engine::{inherited_dictionary, load_document, page_size_of};
use crate::{PageSize, PdfEngineError};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::{BTreeMap, BTreeSet};

const OVERLAY_FONT: &str = "MkHelv";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfPoint {
    pub x: f32,
    pub y: f32,
}

impl PdfPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Rectangle in PDF user space (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// DeviceRGB color with channels in 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl PdfColor {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    fn operands(self) -> Vec<Object> {
        vec![self.r.into(), self.g.into(), self.b.into()]
    }
}

/// Editable document that accepts filled rectangles, line segments and text runs.
pub trait DocumentWriter: Sized {
    fn load(bytes: &[u8]) -> Result<Self, PdfEngineError>;

    fn page_count(&self) -> u32;

    fn page_size(&self, page_number: u32) -> Result<PageSize, PdfEngineError>;

    fn draw_rectangle(
        &mut self,
        page_number: u32,
        rect: PdfRect,
        color: PdfColor,
        opacity: f32,
    ) -> Result<(), PdfEngineError>;

    fn draw_line(
        &mut self,
        page_number: u32,
        start: PdfPoint,
        end: PdfPoint,
        thickness: f32,
        color: PdfColor,
    ) -> Result<(), PdfEngineError>;

    fn draw_text(
        &mut self,
        page_number: u32,
        text: &str,
        origin: PdfPoint,
        size: f32,
        color: PdfColor,
    ) -> Result<(), PdfEngineError>;

    fn save(self) -> Result<Vec<u8>, PdfEngineError>;
}

enum ResourcesAt {
    Object(ObjectId),
    Inline,
    Missing,
}

#[derive(Debug, Default)]
struct PageOverlay {
    operations: Vec<Operation>,
    opacities: BTreeSet<u16>,
    uses_font: bool,
}

#[derive(Debug)]
pub struct LopdfWriter {
    document: Document,
    pages: BTreeMap<u32, ObjectId>,
    overlays: BTreeMap<u32, PageOverlay>,
}

/// Opacity bucketed to thousandths so equal values share one ExtGState.
fn opacity_key(opacity: f32) -> u16 {
    (opacity.clamp(0.0, 1.0) * 1000.0).round() as u16
}

fn graphics_state_name(key: u16) -> String {
    format!("MkGS{key}")
}

/// WinAnsi-compatible bytes; anything outside Latin-1 becomes `?`.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            code @ 0x20..=0xFF => code as u8,
            _ => b'?',
        })
        .collect()
}

impl LopdfWriter {
    fn overlay(&mut self, page_number: u32) -> Result<&mut PageOverlay, PdfEngineError> {
        if !self.pages.contains_key(&page_number) {
            return Err(PdfEngineError::PageOutOfRange {
                page: page_number,
                page_count: self.pages.len() as u32,
            });
        }
        Ok(self.overlays.entry(page_number).or_default())
    }

    /// Returns the id of the object holding the page's resource dictionary,
    /// making inherited resources local first so edits do not leak to siblings.
    fn own_resources(&mut self, page_id: ObjectId) -> Result<ObjectId, PdfEngineError> {
        let found = match self.document.get_dictionary(page_id)?.get(b"Resources") {
            Ok(Object::Reference(id)) => ResourcesAt::Object(*id),
            Ok(Object::Dictionary(_)) => ResourcesAt::Inline,
            _ => ResourcesAt::Missing,
        };

        let inline = match found {
            ResourcesAt::Object(id) => return Ok(id),
            ResourcesAt::Inline => self.document.get_dictionary(page_id)?.get(b"Resources")?.clone(),
            ResourcesAt::Missing => Object::Dictionary(
                inherited_dictionary(&self.document, page_id, b"Resources").unwrap_or_default(),
            ),
        };

        let id = self.document.add_object(inline);
        self.document.get_dictionary_mut(page_id)?.set("Resources", Object::Reference(id));
        Ok(id)
    }

    fn register_resource(
        &mut self,
        resources_id: ObjectId,
        category: &str,
        name: &str,
        target: ObjectId,
    ) -> Result<(), PdfEngineError> {
        let category_ref = match self.document.get_dictionary(resources_id)?.get(category.as_bytes())
        {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };

        let entries = match category_ref {
            Some(id) => self.document.get_dictionary_mut(id)?,
            None => {
                let resources = self.document.get_dictionary_mut(resources_id)?;
                if !matches!(resources.get(category.as_bytes()), Ok(Object::Dictionary(_))) {
                    resources.set(category, Dictionary::new());
                }
                resources.get_mut(category.as_bytes())?.as_dict_mut()?
            }
        };

        entries.set(name, Object::Reference(target));
        Ok(())
    }

    fn append_contents(
        &mut self,
        page_id: ObjectId,
        prefix: ObjectId,
        suffix: ObjectId,
    ) -> Result<(), PdfEngineError> {
        let mut contents = match self.document.get_dictionary(page_id)?.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.document.get_object(*id)? {
                Object::Array(items) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        contents.insert(0, Object::Reference(prefix));
        contents.push(Object::Reference(suffix));
        self.document.get_dictionary_mut(page_id)?.set("Contents", Object::Array(contents));
        Ok(())
    }

    fn flush_page(
        &mut self,
        page_id: ObjectId,
        overlay: PageOverlay,
        graphics_states: &mut BTreeMap<u16, ObjectId>,
        font: &mut Option<ObjectId>,
    ) -> Result<(), PdfEngineError> {
        let resources_id = self.own_resources(page_id)?;

        for key in &overlay.opacities {
            let state_id = match graphics_states.get(key) {
                Some(id) => *id,
                None => {
                    let alpha = f32::from(*key) / 1000.0;
                    let id = self.document.add_object(dictionary! {
                        "Type" => "ExtGState",
                        "ca" => alpha,
                        "CA" => alpha,
                    });
                    graphics_states.insert(*key, id);
                    id
                }
            };
            self.register_resource(resources_id, "ExtGState", &graphics_state_name(*key), state_id)?;
        }

        if overlay.uses_font {
            let font_id = *font.get_or_insert_with(|| {
                self.document.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                })
            });
            self.register_resource(resources_id, "Font", OVERLAY_FONT, font_id)?;
        }

        let mut operations = vec![Operation::new("Q", vec![]), Operation::new("q", vec![])];
        operations.extend(overlay.operations);
        operations.push(Operation::new("Q", vec![]));
        let mut body = b"\n".to_vec();
        body.extend(Content { operations }.encode()?);

        let prefix = self.document.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let suffix = self.document.add_object(Stream::new(dictionary! {}, body));
        self.append_contents(page_id, prefix, suffix)
    }
}

impl DocumentWriter for LopdfWriter {
    fn load(bytes: &[u8]) -> Result<Self, PdfEngineError> {
        let document = load_document(bytes)?;
        let pages = document.get_pages();
        Ok(Self { document, pages, overlays: BTreeMap::new() })
    }

    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page_number: u32) -> Result<PageSize, PdfEngineError> {
        let page_id = self.pages.get(&page_number).copied().ok_or(
            PdfEngineError::PageOutOfRange { page: page_number, page_count: self.page_count() },
        )?;
        Ok(page_size_of(&self.document, page_id))
    }

    fn draw_rectangle(
        &mut self,
        page_number: u32,
        rect: PdfRect,
        color: PdfColor,
        opacity: f32,
    ) -> Result<(), PdfEngineError> {
        let overlay = self.overlay(page_number)?;
        let key = opacity_key(opacity);

        overlay.operations.push(Operation::new("q", vec![]));
        if key < 1000 {
            overlay.opacities.insert(key);
            overlay
                .operations
                .push(Operation::new("gs", vec![Object::Name(graphics_state_name(key).into_bytes())]));
        }
        overlay.operations.push(Operation::new("rg", color.operands()));
        overlay.operations.push(Operation::new(
            "re",
            vec![rect.x.into(), rect.y.into(), rect.width.into(), rect.height.into()],
        ));
        overlay.operations.push(Operation::new("f", vec![]));
        overlay.operations.push(Operation::new("Q", vec![]));
        Ok(())
    }

    fn draw_line(
        &mut self,
        page_number: u32,
        start: PdfPoint,
        end: PdfPoint,
        thickness: f32,
        color: PdfColor,
    ) -> Result<(), PdfEngineError> {
        let overlay = self.overlay(page_number)?;

        overlay.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("RG", color.operands()),
            Operation::new("w", vec![thickness.into()]),
            Operation::new("J", vec![Object::Integer(1)]),
            Operation::new("m", vec![start.x.into(), start.y.into()]),
            Operation::new("l", vec![end.x.into(), end.y.into()]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn draw_text(
        &mut self,
        page_number: u32,
        text: &str,
        origin: PdfPoint,
        size: f32,
        color: PdfColor,
    ) -> Result<(), PdfEngineError> {
        let overlay = self.overlay(page_number)?;
        overlay.uses_font = true;

        overlay.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("rg", color.operands()),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(OVERLAY_FONT.as_bytes().to_vec()), size.into()]),
            Operation::new("Td", vec![origin.x.into(), origin.y.into()]),
            Operation::new("Tj", vec![Object::String(encode_text(text), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn save(mut self) -> Result<Vec<u8>, PdfEngineError> {
        let overlays = std::mem::take(&mut self.overlays);
        let mut graphics_states = BTreeMap::new();
        let mut font = None;

        for (page_number, overlay) in overlays {
            if overlay.operations.is_empty() {
                continue;
            }
            let Some(page_id) = self.pages.get(&page_number).copied() else {
                continue;
            };
            self.flush_page(page_id, overlay, &mut graphics_states, &mut font)?;
        }

        let mut output = Vec::new();
        self.document.save_to(&mut output)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{build_pdf, PageSpec};
    use crate::text::extract_text_items;

    fn overlay_operators(bytes: &[u8], page_number: u32) -> Vec<String> {
        let document = Document::load_mem(bytes).expect("output should parse");
        let page_id = document.get_pages()[&page_number];
        let content = document.get_page_content(page_id).expect("content should load");
        Content::decode(&content)
            .expect("content should decode")
            .operations
            .into_iter()
            .map(|operation| operation.operator)
            .collect()
    }

    #[test]
    fn untouched_document_round_trips() {
        let source = build_pdf(&[PageSpec::letter(&["keep me"])]);
        let output = LopdfWriter::load(&source).expect("load").save().expect("save");

        let document = Document::load_mem(&output).expect("output should parse");
        assert_eq!(document.get_pages().len(), 1);
    }

    #[test]
    fn rectangle_registers_opacity_state() {
        let source = build_pdf(&[PageSpec::letter(&[])]);
        let mut writer = LopdfWriter::load(&source).expect("load");
        writer
            .draw_rectangle(
                1,
                PdfRect { x: 10.0, y: 20.0, width: 30.0, height: 40.0 },
                PdfColor::new(1.0, 1.0, 0.0),
                0.35,
            )
            .expect("draw");
        let output = writer.save().expect("save");

        let operators = overlay_operators(&output, 1);
        assert!(operators.iter().any(|op| op == "gs"));
        assert!(operators.iter().any(|op| op == "re"));

        let document = Document::load_mem(&output).expect("output should parse");
        let page_id = document.get_pages()[&1];
        let resources = inherited_dictionary(&document, page_id, b"Resources").expect("resources");
        let states = match resources.get(b"ExtGState").expect("ExtGState") {
            Object::Dictionary(dict) => dict.clone(),
            Object::Reference(id) => document.get_dictionary(*id).expect("dict").clone(),
            other => panic!("unexpected ExtGState {other:?}"),
        };
        assert!(states.has(b"MkGS350"));
    }

    #[test]
    fn text_and_lines_land_on_requested_page_only() {
        let source = build_pdf(&[PageSpec::letter(&["one"]), PageSpec::letter(&["two"])]);
        let mut writer = LopdfWriter::load(&source).expect("load");
        writer
            .draw_line(2, PdfPoint::new(0.0, 0.0), PdfPoint::new(10.0, 10.0), 1.5, PdfColor::new(0.0, 0.0, 1.0))
            .expect("line");
        writer
            .draw_text(2, "Note", PdfPoint::new(72.0, 100.0), 12.0, PdfColor::new(0.0, 0.0, 0.0))
            .expect("text");
        let output = writer.save().expect("save");

        assert!(!overlay_operators(&output, 1).iter().any(|op| op == "S"));
        assert!(overlay_operators(&output, 2).iter().any(|op| op == "S"));

        let document = Document::load_mem(&output).expect("output should parse");
        let content = document.get_page_content(document.get_pages()[&2]).expect("content");
        let texts: Vec<_> =
            extract_text_items(&content).expect("text").into_iter().map(|item| item.text).collect();
        assert_eq!(texts, vec!["two".to_owned(), "Note".to_owned()]);
    }

    #[test]
    fn drawing_on_missing_page_fails() {
        let source = build_pdf(&[PageSpec::letter(&[])]);
        let mut writer = LopdfWriter::load(&source).expect("load");
        let err = writer
            .draw_text(5, "x", PdfPoint::new(0.0, 0.0), 10.0, PdfColor::new(0.0, 0.0, 0.0))
            .expect_err("page 5 does not exist");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 5, page_count: 1 }));
    }

    #[test]
    fn non_latin_text_is_replaced() {
        assert_eq!(encode_text("café ✓"), b"caf\xe9 ?".to_vec());
    }
}
