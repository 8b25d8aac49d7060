//! Text-layout extraction from page content streams
//!
//! Walks the text operators of a decoded content stream and emits one
//! [`TextItem`] per show-text operation. Glyph advances use a fixed
//! half-em estimate; no font programs are loaded.

use lopdf::content::Content;
use lopdf::Object;
use serde::Serialize;

/// Average glyph advance as a fraction of the font size.
pub const AVERAGE_ADVANCE_EM: f32 = 0.5;

/// A run of text as laid out on the page, in unscaled PDF space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextItem {
    pub text: String,
    /// `[a, b, c, d, e, f]`: `d` is the font height, `(e, f)` the baseline origin.
    pub transform: [f32; 6],
    pub width: f32,
    pub height: f32,
    pub font_name: String,
}

impl TextItem {
    pub fn x(&self) -> f32 {
        self.transform[4]
    }

    pub fn baseline_y(&self) -> f32 {
        self.transform[5]
    }

    pub fn font_height(&self) -> f32 {
        self.transform[3].abs()
    }
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `a × b` for PDF row-vector matrices.
fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn translation(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(operands) {
        *slot = number(operand)?;
    }
    Some(out)
}

/// Latin-1 view of a PDF string; good enough for the standard 14 fonts.
fn decode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| char::from(*byte)).collect()
}

#[derive(Debug, Clone)]
struct TextState {
    ctm: Matrix,
    font_name: String,
    font_size: f32,
    leading: f32,
    line_matrix: Matrix,
    text_matrix: Matrix,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            font_name: String::new(),
            font_size: 12.0,
            leading: 0.0,
            line_matrix: IDENTITY,
            text_matrix: IDENTITY,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translation(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }

    /// Emits an item for `text` (with `adjust` in thousandths of an em) and advances.
    fn show(&mut self, text: String, adjust: f32, items: &mut Vec<TextItem>) {
        let chars = text.chars().count() as f32;
        let advance = chars * AVERAGE_ADVANCE_EM * self.font_size - adjust / 1000.0 * self.font_size;

        if !text.is_empty() {
            let size = [self.font_size, 0.0, 0.0, self.font_size, 0.0, 0.0];
            let transform = multiply(&multiply(&size, &self.text_matrix), &self.ctm);
            let horizontal = (transform[0] * transform[0] + transform[1] * transform[1]).sqrt();
            items.push(TextItem {
                width: advance.max(0.0) * horizontal / self.font_size.max(f32::EPSILON),
                height: transform[3].abs(),
                transform,
                text,
                font_name: self.font_name.clone(),
            });
        }

        self.text_matrix = multiply(&translation(advance, 0.0), &self.text_matrix);
    }
}

/// Extracts text items from raw (already decompressed) content stream bytes.
pub fn extract_text_items(content: &[u8]) -> Result<Vec<TextItem>, lopdf::Error> {
    let content = Content::decode(content)?;
    let mut items = Vec::new();
    let mut state = TextState::default();
    let mut saved: Vec<TextState> = Vec::new();

    for operation in &content.operations {
        let operands = operation.operands.as_slice();
        match operation.operator.as_str() {
            "q" => saved.push(state.clone()),
            "Q" => {
                if let Some(previous) = saved.pop() {
                    state = previous;
                }
            }
            "cm" => {
                if let Some(matrix) = numbers::<6>(operands) {
                    state.ctm = multiply(&matrix, &state.ctm);
                }
            }
            "BT" => {
                state.line_matrix = IDENTITY;
                state.text_matrix = IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    state.font_name = String::from_utf8_lossy(name).into_owned();
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(operands) {
                    state.leading = leading;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    state.move_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    state.leading = -ty;
                    state.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(matrix) = numbers::<6>(operands) {
                    state.line_matrix = matrix;
                    state.text_matrix = matrix;
                }
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    state.show(decode_bytes(bytes), 0.0, &mut items);
                }
            }
            "'" => {
                state.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    state.show(decode_bytes(bytes), 0.0, &mut items);
                }
            }
            "\"" => {
                state.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    state.show(decode_bytes(bytes), 0.0, &mut items);
                }
            }
            "TJ" => {
                if let Some(Object::Array(parts)) = operands.first() {
                    let mut text = String::new();
                    let mut adjust = 0.0;
                    for part in parts {
                        match part {
                            Object::String(bytes, _) => text.push_str(&decode_bytes(bytes)),
                            other => adjust += number(other).unwrap_or(0.0),
                        }
                    }
                    state.show(text, adjust, &mut items);
                }
            }
            _ => {}
        }
    }

    Ok(items)
}
