use std::collections::BTreeMap;
use std::path::Path;

use encoding_rs::{UTF_16BE, WINDOWS_1252};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::ExtractError;
use crate::model::{PageGeometry, RawSpan, Rect};
use crate::pipeline::PageSource;

/// Glyph advance used when a font carries no usable `/Widths`.
const DEFAULT_GLYPH_WIDTH: f32 = 0.5;
const ASCENT: f32 = 0.8;
const DESCENT: f32 = 0.2;
/// US Letter, used when no `/MediaBox` is found on the page or its parents.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];
/// Nesting limit for form XObjects drawn from other forms.
const MAX_FORM_DEPTH: usize = 8;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Row-vector product `m × n`: apply `m` first, then `n`.
fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => {
            let value: f64 = (*value).into();
            Some(value as f32)
        }
        _ => None,
    }
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    document.dereference(object).map_or(object, |(_, resolved)| resolved)
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    let mut out = [0.0; N];
    if operands.len() < N {
        return None;
    }
    for (slot, operand) in out.iter_mut().zip(operands) {
        *slot = number(operand)?;
    }
    Some(out)
}

fn looks_decoding_broken(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if text.contains("?Identity-H Unimplemented?") {
        return true;
    }

    let total = text.chars().count();
    let replacement = text.matches('\u{FFFD}').count();
    let control = text
        .chars()
        .filter(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
        .count();
    replacement * 8 > total || control * 5 > total
}

fn decode_pdf_bytes(encoding: Option<&str>, bytes: &[u8]) -> String {
    let decoded = Document::decode_text(encoding, bytes);
    if !looks_decoding_broken(&decoded) {
        return decoded;
    }

    if bytes.starts_with(&[0xFE, 0xFF]) {
        let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(&bytes[2..]);
        if !had_errors && !utf16.is_empty() {
            return utf16.into_owned();
        }
    }

    if let Some(name) = encoding {
        let lower = name.to_ascii_lowercase();
        if lower.contains("utf16")
            || lower.contains("ucs2")
            || lower.contains("identity-h")
            || lower.contains("unicode")
        {
            let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
            if !had_errors && !utf16.is_empty() {
                return utf16.into_owned();
            }
        }
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
    }
}

/// What the walker needs to know about one font resource.
#[derive(Debug, Clone, Default)]
struct FontInfo {
    encoding: Option<String>,
    bold: bool,
    italic: bool,
    first_char: i64,
    widths: Vec<f32>,
    two_byte: bool,
}

impl FontInfo {
    fn from_dictionary(document: &Document, font: &Dictionary) -> Self {
        let base_font = font
            .get(b"BaseFont")
            .and_then(Object::as_name)
            .map(|name| String::from_utf8_lossy(name).to_ascii_lowercase())
            .unwrap_or_default();
        let encoding = font.get_font_encoding().to_string();
        let two_byte = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|subtype| subtype == b"Type0");

        let widths = font
            .get(b"Widths")
            .ok()
            .map(|object| resolve(document, object))
            .and_then(|object| object.as_array().ok())
            .map(|items| {
                items
                    .iter()
                    .map(|item| number(item).unwrap_or(0.0) / 1000.0)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            encoding: Some(encoding),
            bold: base_font.contains("bold") || base_font.contains("black") || base_font.contains("heavy"),
            italic: base_font.contains("italic") || base_font.contains("oblique"),
            first_char: font.get(b"FirstChar").and_then(Object::as_i64).unwrap_or(0),
            widths,
            two_byte,
        }
    }

    /// Advance of `bytes` in text space units of one em.
    fn advance(&self, bytes: &[u8], char_spacing: f32, word_spacing: f32, size: f32) -> f32 {
        if self.two_byte {
            let glyphs = bytes.len().div_ceil(2) as f32;
            return glyphs * (DEFAULT_GLYPH_WIDTH * size + char_spacing);
        }
        bytes
            .iter()
            .map(|&code| {
                let width = usize::try_from(i64::from(code) - self.first_char)
                    .ok()
                    .and_then(|index| self.widths.get(index).copied())
                    .filter(|width| *width > 0.0)
                    .unwrap_or(DEFAULT_GLYPH_WIDTH);
                let spacing = if code == b' ' { word_spacing } else { 0.0 };
                width * size + char_spacing + spacing
            })
            .sum()
    }
}

type FontTable = BTreeMap<Vec<u8>, FontInfo>;

fn resource_entries<'a>(
    document: &'a Document,
    resources: &'a Dictionary,
    key: &[u8],
) -> impl Iterator<Item = (&'a Vec<u8>, &'a Object)> {
    resources
        .get(key)
        .ok()
        .map(|object| resolve(document, object))
        .and_then(|object| object.as_dict().ok())
        .into_iter()
        .flat_map(|dictionary| dictionary.iter())
        .map(move |(name, value)| (name, resolve(document, value)))
}

/// Fonts and form XObjects visible to one content stream.
#[derive(Debug, Clone, Default)]
struct Resources<'a> {
    fonts: FontTable,
    forms: BTreeMap<Vec<u8>, &'a Stream>,
}

impl<'a> Resources<'a> {
    /// These resources with the entries of `dictionary` layered on top.
    fn layered(&self, document: &'a Document, dictionary: &'a Dictionary) -> Self {
        let mut resources = self.clone();
        for (name, font) in resource_entries(document, dictionary, b"Font") {
            if let Ok(font) = font.as_dict() {
                resources
                    .fonts
                    .insert(name.clone(), FontInfo::from_dictionary(document, font));
            }
        }
        for (name, xobject) in resource_entries(document, dictionary, b"XObject") {
            if let Ok(stream) = xobject.as_stream()
                && stream
                    .dict
                    .get(b"Subtype")
                    .and_then(Object::as_name)
                    .is_ok_and(|subtype| subtype == b"Form")
            {
                resources.forms.insert(name.clone(), stream);
            }
        }
        resources
    }
}

/// Resources of the page, inherited from the page tree root downwards.
fn page_resources(document: &Document, page_id: ObjectId) -> Resources<'_> {
    let mut chain = Vec::new();
    let mut current = document.get_dictionary(page_id).ok();
    while let Some(node) = current {
        if let Ok(resources) = node
            .get(b"Resources")
            .map(|object| resolve(document, object))
            .and_then(Object::as_dict)
        {
            chain.push(resources);
        }
        current = node
            .get(b"Parent")
            .and_then(Object::as_reference)
            .ok()
            .and_then(|parent| document.get_dictionary(parent).ok());
    }
    chain
        .into_iter()
        .rev()
        .fold(Resources::default(), |inherited, dictionary| inherited.layered(document, dictionary))
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            font: None,
            font_size: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
        }
    }
}

/// Bounding box of the path under construction, in user space.
#[derive(Debug, Default)]
struct PathBounds {
    bounds: Option<(f32, f32, f32, f32)>,
}

impl PathBounds {
    fn extend(&mut self, (x, y): (f32, f32)) {
        self.bounds = Some(match self.bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    fn take(&mut self) -> Option<(f32, f32, f32, f32)> {
        self.bounds.take()
    }
}

/// Maps user space onto the top-left page frame.
#[derive(Debug, Clone, Copy)]
struct PageFrame {
    media_box: [f32; 4],
}

impl PageFrame {
    fn width(&self) -> f32 {
        self.media_box[2] - self.media_box[0]
    }

    fn height(&self) -> f32 {
        self.media_box[3] - self.media_box[1]
    }

    fn rect(&self, (x0, y0, x1, y1): (f32, f32, f32, f32)) -> Rect {
        Rect::new(
            x0 - self.media_box[0],
            self.media_box[3] - y1,
            x1 - self.media_box[0],
            self.media_box[3] - y0,
        )
    }
}

#[derive(Debug, Default)]
struct TextRun {
    text: String,
    bytes_shown: bool,
    start: Option<(f32, f32)>,
    end: (f32, f32),
    size: f32,
}

/// Walks one content stream, collecting painted path boxes and text runs.
struct ContentWalker<'a> {
    document: &'a Document,
    resources: Resources<'a>,
    frame: PageFrame,
    form_depth: usize,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    path: PathBounds,
    text_matrix: Matrix,
    line_matrix: Matrix,
    rects: Vec<Rect>,
    spans: Vec<RawSpan>,
}

impl<'a> ContentWalker<'a> {
    fn new(document: &'a Document, resources: Resources<'a>, frame: PageFrame) -> Self {
        Self {
            document,
            resources,
            frame,
            form_depth: 0,
            state: GraphicsState::default(),
            stack: Vec::new(),
            path: PathBounds::default(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            rects: Vec::new(),
            spans: Vec::new(),
        }
    }

    fn font(&self) -> Option<&FontInfo> {
        self.state
            .font
            .as_ref()
            .and_then(|name| self.resources.fonts.get(name))
    }

    fn user_point(&self, x: f32, y: f32) -> (f32, f32) {
        apply(&self.state.ctm, x, y)
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translate(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.state.leading);
    }

    fn paint(&mut self) {
        if let Some(bounds) = self.path.take() {
            let rect = self.frame.rect(bounds);
            if !rect.is_empty() {
                self.rects.push(rect);
            }
        }
    }

    fn show(&mut self, run: &mut TextRun, bytes: &[u8]) {
        let (text, advance) = match self.font() {
            Some(font) => (
                decode_pdf_bytes(font.encoding.as_deref(), bytes),
                font.advance(
                    bytes,
                    self.state.char_spacing,
                    self.state.word_spacing,
                    self.state.font_size,
                ),
            ),
            None => (
                decode_pdf_bytes(None, bytes),
                bytes.len() as f32 * DEFAULT_GLYPH_WIDTH * self.state.font_size,
            ),
        };
        run.text.push_str(&text);
        run.bytes_shown = true;

        let rendering = multiply(&self.text_matrix, &self.state.ctm);
        if run.start.is_none() {
            run.start = Some(apply(&rendering, 0.0, 0.0));
            run.size = self.state.font_size * rendering[2].hypot(rendering[3]);
        }

        self.text_matrix = multiply(&translate(advance, 0.0), &self.text_matrix);
        run.end = apply(&multiply(&self.text_matrix, &self.state.ctm), 0.0, 0.0);
    }

    fn kern(&mut self, run: &mut TextRun, thousandths: f32) {
        if thousandths < -100.0 && !run.text.ends_with(' ') {
            run.text.push(' ');
        }
        let shift = -thousandths / 1000.0 * self.state.font_size;
        self.text_matrix = multiply(&translate(shift, 0.0), &self.text_matrix);
    }

    fn show_operands(&mut self, operands: &[Object]) {
        let mut run = TextRun::default();
        for operand in operands {
            match operand {
                Object::String(bytes, _) => self.show(&mut run, bytes),
                Object::Array(items) => {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(&mut run, bytes),
                            other => {
                                if let Some(value) = number(other) {
                                    self.kern(&mut run, value);
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        self.finish_run(run);
    }

    fn finish_run(&mut self, run: TextRun) {
        let Some((start_x, start_y)) = run.start else {
            return;
        };
        if !run.bytes_shown || run.text.trim().is_empty() {
            return;
        }

        let (end_x, _) = run.end;
        let bounds = (
            start_x.min(end_x),
            start_y - DESCENT * run.size,
            start_x.max(end_x),
            start_y + ASCENT * run.size,
        );
        let (bold, italic) = self.font().map_or((false, false), |font| (font.bold, font.italic));
        self.spans.push(RawSpan {
            text: run.text,
            size: run.size,
            bold,
            italic,
            bbox: self.frame.rect(bounds),
        });
    }

    /// Draws the named form XObject in a saved graphics state.
    fn draw_form(&mut self, operands: &[Object]) {
        let Some(stream) = operands
            .first()
            .and_then(|operand| operand.as_name().ok())
            .and_then(|name| self.resources.forms.get(name))
            .copied()
        else {
            return;
        };
        if self.form_depth >= MAX_FORM_DEPTH {
            debug!(depth = self.form_depth, "form XObject nested too deeply, skipped");
            return;
        }

        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let content = match Content::decode(&bytes) {
            Ok(content) => content,
            Err(err) => {
                debug!(error = %err, "form XObject content could not be decoded");
                return;
            }
        };
        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .map(|object| resolve(self.document, object))
            .and_then(|object| object.as_array().ok())
            .and_then(|items| numbers::<6>(items))
            .unwrap_or(IDENTITY);
        let resources = match stream
            .dict
            .get(b"Resources")
            .map(|object| resolve(self.document, object))
            .and_then(Object::as_dict)
        {
            Ok(own) => self.resources.layered(self.document, own),
            Err(_) => self.resources.clone(),
        };

        let outer = std::mem::replace(&mut self.resources, resources);
        let saved = self.state.clone();
        let stack_depth = self.stack.len();
        self.state.ctm = multiply(&matrix, &self.state.ctm);
        self.form_depth += 1;
        self.run(&content.operations);
        self.form_depth -= 1;
        self.stack.truncate(stack_depth);
        self.state = saved;
        self.resources = outer;
    }

    fn walk(mut self, content: &Content) -> (Vec<Rect>, Vec<RawSpan>) {
        self.run(&content.operations);
        (self.rects, self.spans)
    }

    fn run(&mut self, operations: &[Operation]) {
        for operation in operations {
            let operands = operation.operands.as_slice();
            match operation.operator.as_str() {
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(state) = self.stack.pop() {
                        self.state = state;
                    }
                }
                "cm" => {
                    if let Some(m) = numbers::<6>(operands) {
                        self.state.ctm = multiply(&m, &self.state.ctm);
                    }
                }
                "re" => {
                    if let Some([x, y, w, h]) = numbers::<4>(operands) {
                        for (px, py) in [(x, y), (x + w, y), (x, y + h), (x + w, y + h)] {
                            let point = self.user_point(px, py);
                            self.path.extend(point);
                        }
                    }
                }
                "m" | "l" => {
                    if let Some([x, y]) = numbers::<2>(operands) {
                        let point = self.user_point(x, y);
                        self.path.extend(point);
                    }
                }
                "c" | "v" | "y" => {
                    for pair in operands.chunks_exact(2) {
                        if let Some([x, y]) = numbers::<2>(pair) {
                            let point = self.user_point(x, y);
                            self.path.extend(point);
                        }
                    }
                }
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => self.paint(),
                "n" => {
                    self.path.take();
                }
                "BT" => {
                    self.text_matrix = IDENTITY;
                    self.line_matrix = IDENTITY;
                }
                "Tf" => {
                    self.state.font = operands
                        .first()
                        .and_then(|operand| operand.as_name().ok())
                        .map(<[u8]>::to_vec);
                    if let Some(size) = operands.get(1).and_then(number) {
                        self.state.font_size = size;
                    }
                }
                "TL" => {
                    if let Some([leading]) = numbers::<1>(operands) {
                        self.state.leading = leading;
                    }
                }
                "Tc" => {
                    if let Some([spacing]) = numbers::<1>(operands) {
                        self.state.char_spacing = spacing;
                    }
                }
                "Tw" => {
                    if let Some([spacing]) = numbers::<1>(operands) {
                        self.state.word_spacing = spacing;
                    }
                }
                "Tm" => {
                    if let Some(m) = numbers::<6>(operands) {
                        self.text_matrix = m;
                        self.line_matrix = m;
                    }
                }
                "Td" => {
                    if let Some([tx, ty]) = numbers::<2>(operands) {
                        self.move_line(tx, ty);
                    }
                }
                "TD" => {
                    if let Some([tx, ty]) = numbers::<2>(operands) {
                        self.state.leading = -ty;
                        self.move_line(tx, ty);
                    }
                }
                "T*" => self.next_line(),
                "Tj" | "TJ" => self.show_operands(operands),
                "'" => {
                    self.next_line();
                    self.show_operands(operands);
                }
                "\"" => {
                    if let Some([word, char]) = numbers::<2>(operands) {
                        self.state.word_spacing = word;
                        self.state.char_spacing = char;
                    }
                    self.next_line();
                    self.show_operands(operands.get(2..).unwrap_or_default());
                }
                "Do" => self.draw_form(operands),
                _ => {}
            }
        }
    }
}

fn media_box(document: &Document, page_id: ObjectId) -> [f32; 4] {
    let mut current = document.get_dictionary(page_id).ok();
    while let Some(dictionary) = current {
        if let Some(values) = dictionary
            .get(b"MediaBox")
            .ok()
            .map(|object| resolve(document, object))
            .and_then(|object| object.as_array().ok())
            .and_then(|items| numbers::<4>(items))
        {
            return [
                values[0].min(values[2]),
                values[1].min(values[3]),
                values[0].max(values[2]),
                values[1].max(values[3]),
            ];
        }
        current = dictionary
            .get(b"Parent")
            .and_then(Object::as_reference)
            .ok()
            .and_then(|parent| document.get_dictionary(parent).ok());
    }
    DEFAULT_MEDIA_BOX
}

#[derive(Debug, Clone)]
struct ParsedPage {
    geometry: PageGeometry,
    spans: Vec<RawSpan>,
}

fn parse_page(document: &Document, page_no: u32, page_id: ObjectId) -> Result<ParsedPage, ExtractError> {
    let frame = PageFrame {
        media_box: media_box(document, page_id),
    };
    let resources = page_resources(document, page_id);
    let raw_content = document.get_page_content(page_id)?;
    let content = Content::decode(&raw_content)?;
    let (rects, spans) = ContentWalker::new(document, resources, frame).walk(&content);
    debug!(page = page_no, rects = rects.len(), spans = spans.len(), "parsed page content");

    Ok(ParsedPage {
        geometry: PageGeometry {
            width: frame.width(),
            height: frame.height(),
            rects,
        },
        spans,
    })
}

/// Vector and text layer of a PDF, parsed once when opened.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pages: Vec<ParsedPage>,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        Self::from_document(&Document::load(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExtractError> {
        Self::from_document(&Document::load_mem(bytes)?)
    }

    pub fn from_document(document: &Document) -> Result<Self, ExtractError> {
        let pages = document
            .get_pages()
            .into_iter()
            .map(|(page_no, page_id)| parse_page(document, page_no, page_id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pages })
    }

    fn page(&self, index: u32) -> Result<&ParsedPage, ExtractError> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.pages.get(index))
            .ok_or(ExtractError::PageOutOfRange {
                page: index + 1,
                count: self.page_count(),
            })
    }
}

impl PageSource for PdfDocument {
    fn page_count(&self) -> u32 {
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
    }

    fn geometry(&self, index: u32) -> Result<PageGeometry, ExtractError> {
        Ok(self.page(index)?.geometry.clone())
    }

    fn text_in_rect(&self, index: u32, rect: &Rect) -> Result<Vec<RawSpan>, ExtractError> {
        Ok(self
            .page(index)?
            .spans
            .iter()
            .filter(|span| {
                span.bbox.x0 < rect.x1
                    && span.bbox.x1 > rect.x0
                    && span.bbox.y0 < rect.y1
                    && span.bbox.y1 > rect.y0
            })
            .cloned()
            .collect())
    }
}
