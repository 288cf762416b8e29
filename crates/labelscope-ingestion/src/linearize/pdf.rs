//! PDF reader: positioned text runs grouped into lines.
//!
//! Glyphs come from `pdf_extract`, which decodes them through each font's
//! encoding and `ToUnicode` map and reports their position on the page.
//! Adjacent glyphs on one baseline form a run; runs are grouped into lines by
//! baseline, top to bottom, then left to right. Optionally:
//! - runs inside the top/bottom margin band are dropped (running headers,
//!   footers, page numbers)
//! - runs whose midpoint falls inside a ruled table are dropped; a table is
//!   a connected cluster of at least `MIN_TABLE_RULES` painted rectangles
//!   or line segments, read from the page's content stream with `lopdf`

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};
use pdf_extract::{MediaBox, OutputDev, OutputError, Transform};
use tracing::{debug, warn};

use crate::error::IngestError;

/// 0.7 inch at 72 points per inch.
pub const DEFAULT_MARGIN_PT: f32 = 50.4;

const MIN_TABLE_RULES: usize = 3;
const RULE_TOLERANCE: f32 = 1.0;
/// Largest glyph gap, as a fraction of the font size, that continues a run.
const JOIN_GAP: f32 = 0.1;
/// Gap between runs, as a fraction of the font size, read as a word break.
const WORD_GAP: f32 = 0.2;

#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    /// Height of the top and bottom bands to crop, in points.
    pub margin: Option<f32>,
    pub exclude_tables: bool,
}

// ── Geometry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    fn from_operands(ops: &[Object]) -> Option<Self> {
        if ops.len() < 6 {
            return None;
        }
        Some(Matrix {
            a: number(&ops[0])?,
            b: number(&ops[1])?,
            c: number(&ops[2])?,
            d: number(&ops[3])?,
            e: number(&ops[4])?,
            f: number(&ops[5])?,
        })
    }

    /// `self × other` in PDF's row-vector convention.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.a + y * self.c + self.e, x * self.b + y * self.d + self.f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rect {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

impl Rect {
    fn from_corners((ax, ay): (f32, f32), (bx, by): (f32, f32)) -> Self {
        Rect { x0: ax.min(bx), y0: ay.min(by), x1: ax.max(bx), y1: ay.max(by) }
    }

    fn area(&self) -> f32 {
        (self.x1 - self.x0) * (self.y1 - self.y0)
    }

    fn touches(&self, other: &Rect, tolerance: f32) -> bool {
        self.x0 <= other.x1 + tolerance
            && other.x0 <= self.x1 + tolerance
            && self.y0 <= other.y1 + tolerance
            && other.y0 <= self.y1 + tolerance
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

// ── Glyph collection ──────────────────────────────────────────────────────────

/// A run of text at one position.
#[derive(Debug, Clone)]
struct Run {
    x: f32,
    end_x: f32,
    y: f32,
    size: f32,
    text: String,
}

struct PageText {
    number: u32,
    bounds: Rect,
    runs: Vec<Run>,
}

/// Receives decoded glyphs in user space and joins adjacent ones into runs.
#[derive(Default)]
struct RunCollector {
    pages: Vec<PageText>,
    current: Option<Run>,
}

impl RunCollector {
    fn flush(&mut self) {
        let Some(run) = self.current.take() else { return };
        if run.text.trim().is_empty() {
            return;
        }
        if let Some(page) = self.pages.last_mut() {
            page.runs.push(run);
        }
    }

    fn continues(&self, x: f32, y: f32, size: f32) -> bool {
        self.current.as_ref().is_some_and(|run| {
            let tolerance = JOIN_GAP * size.max(1.0);
            (run.y - y).abs() <= tolerance && (x - run.end_x).abs() <= tolerance
        })
    }
}

impl OutputDev for RunCollector {
    fn begin_page(
        &mut self,
        page_num: u32,
        media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> Result<(), OutputError> {
        self.flush();
        self.pages.push(PageText {
            number: page_num,
            bounds: Rect::from_corners(
                (media_box.llx as f32, media_box.lly as f32),
                (media_box.urx as f32, media_box.ury as f32),
            ),
            runs: Vec::new(),
        });
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        self.flush();
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        spacing: f64,
        font_size: f64,
        ch: &str,
    ) -> Result<(), OutputError> {
        let (x, y) = (trm.m31 as f32, trm.m32 as f32);
        let size = (font_size * trm.m21.hypot(trm.m22)) as f32;
        let advance = ((width * font_size + spacing) * trm.m11.hypot(trm.m12)) as f32;

        if !self.continues(x, y, size) {
            self.flush();
            self.current = Some(Run { x, end_x: x, y, size, text: String::new() });
        }
        if let Some(run) = self.current.as_mut() {
            run.text.extend(ch.chars().map(|c| if c.is_control() { ' ' } else { c }));
            run.end_x = run.end_x.max(x + advance);
        }
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        self.flush();
        Ok(())
    }
}

// ── Ruling ────────────────────────────────────────────────────────────────────

/// Collects painted rectangles and line segments. Text operators are ignored.
struct RuleScanner {
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    path_start: Option<(f32, f32)>,
    pending: Vec<Rect>,
    rules: Vec<Rect>,
}

impl RuleScanner {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            path_start: None,
            pending: Vec::new(),
            rules: Vec::new(),
        }
    }

    fn point(&self, ops: &[Object]) -> Option<(f32, f32)> {
        let x = number(ops.first()?)?;
        let y = number(ops.get(1)?)?;
        Some(self.ctm.apply(x, y))
    }

    fn execute(&mut self, op: &Operation) {
        let ops = &op.operands;
        match op.operator.as_str() {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.ctm_stack.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(ops) {
                    self.ctm = m.then(&self.ctm);
                }
            }
            "re" => {
                if let (Some(near), Some(w), Some(h)) =
                    (self.point(ops), ops.get(2).and_then(number), ops.get(3).and_then(number))
                {
                    let raw_x = number(&ops[0]).unwrap_or_default();
                    let raw_y = number(&ops[1]).unwrap_or_default();
                    let far = self.ctm.apply(raw_x + w, raw_y + h);
                    self.pending.push(Rect::from_corners(near, far));
                }
            }
            "m" => self.path_start = self.point(ops),
            "l" => {
                if let (Some(from), Some(to)) = (self.path_start, self.point(ops)) {
                    self.pending.push(Rect::from_corners(from, to));
                    self.path_start = Some(to);
                }
            }
            "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                self.rules.append(&mut self.pending);
                self.path_start = None;
            }
            "n" => {
                // clipping or discarded path
                self.pending.clear();
                self.path_start = None;
            }
            _ => {}
        }
    }
}

fn page_rules(doc: &Document, page_number: u32, page_id: ObjectId) -> Vec<Rect> {
    let content = match doc.get_page_content(page_id).and_then(|bytes| Content::decode(&bytes)) {
        Ok(content) => content,
        Err(e) => {
            warn!(page = page_number, error = %e, "Skipping unreadable page content");
            return Vec::new();
        }
    };
    let mut scanner = RuleScanner::new();
    for op in &content.operations {
        scanner.execute(op);
    }
    scanner.rules
}

/// Bounding boxes of ruled tables.
fn table_regions(rules: &[Rect], page_area: f32) -> Vec<Rect> {
    let rules: Vec<Rect> = rules.iter().copied().filter(|r| r.area() < page_area * 0.5).collect();
    let mut parent: Vec<usize> = (0..rules.len()).collect();

    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..rules.len() {
        for j in (i + 1)..rules.len() {
            if rules[i].touches(&rules[j], RULE_TOLERANCE) {
                let (ri, rj) = (root(&mut parent, i), root(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut clusters: std::collections::BTreeMap<usize, (Rect, usize)> = std::collections::BTreeMap::new();
    for (i, rule) in rules.iter().enumerate() {
        let r = root(&mut parent, i);
        clusters
            .entry(r)
            .and_modify(|(bbox, n)| {
                *bbox = bbox.union(rule);
                *n += 1;
            })
            .or_insert((*rule, 1));
    }

    clusters
        .into_values()
        .filter(|(bbox, n)| *n >= MIN_TABLE_RULES && bbox.x1 - bbox.x0 > 10.0 && bbox.y1 - bbox.y0 > 10.0)
        .map(|(bbox, _)| bbox)
        .collect()
}

/// Group runs into lines: top to bottom, left to right.
fn group_lines(mut runs: Vec<Run>) -> Vec<String> {
    runs.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<Vec<Run>> = Vec::new();
    for run in runs {
        match lines.last_mut() {
            Some(line) if (line[0].y - run.y).abs() <= (0.4 * line[0].size).max(1.0) => line.push(run),
            _ => lines.push(vec![run]),
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
            let mut text = String::new();
            let mut prev_end: Option<f32> = None;
            for run in &line {
                if let Some(end) = prev_end {
                    let gap = run.x - end;
                    if gap > WORD_GAP * run.size && !text.ends_with(' ') && !run.text.starts_with(' ') {
                        text.push(' ');
                    }
                }
                text.push_str(&run.text);
                prev_end = Some(run.end_x);
            }
            text.trim().to_string()
        })
        .filter(|l| !l.is_empty())
        .collect()
}

// ── Document ──────────────────────────────────────────────────────────────────

/// Lines of every page, in page order.
pub fn extract_lines(bytes: &[u8], options: &PageOptions) -> Result<Vec<String>, IngestError> {
    let doc = Document::load_mem(bytes).map_err(|e| IngestError::Linearize(format!("invalid PDF: {}", e)))?;
    let mut collector = RunCollector::default();
    pdf_extract::output_doc(&doc, &mut collector)
        .map_err(|e| IngestError::Linearize(format!("unreadable PDF text: {:?}", e)))?;

    let page_ids = doc.get_pages();
    let mut lines = Vec::new();
    for PageText { number, bounds, mut runs } in collector.pages {
        if let Some(margin) = options.margin {
            runs.retain(|r| r.y >= bounds.y0 + margin && r.y <= bounds.y1 - margin);
        }

        if options.exclude_tables {
            if let Some(&page_id) = page_ids.get(&number) {
                let tables = table_regions(&page_rules(&doc, number, page_id), bounds.area());
                if !tables.is_empty() {
                    let before = runs.len();
                    runs.retain(|r| {
                        let (mx, my) = ((r.x + r.end_x) / 2.0, r.y + r.size * 0.3);
                        !tables.iter().any(|t| t.contains(mx, my))
                    });
                    debug!(page = number, tables = tables.len(), dropped = before - runs.len(), "Excluded table text");
                }
            }
        }

        lines.extend(group_lines(runs));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn text_at(size: i64, x: i64, y: i64, text: &str) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]
    }

    fn rect(x: i64, y: i64, w: i64, h: i64) -> Operation {
        Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()])
    }

    /// One A4 page whose MediaBox is inherited from the page tree root.
    fn pdf(operations: Vec<Operation>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn label_page() -> Vec<u8> {
        let mut ops = text_at(10, 72, 815, "Diffusia PI v3");
        ops.extend(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("4.1 THERAPEUTIC INDICATIONS")]),
            Operation::new("Td", vec![0.into(), (-20).into()]),
            Operation::new("Tj", vec![Object::string_literal("Treats")]),
            Operation::new("Td", vec![40.into(), 0.into()]),
            Operation::new("Tj", vec![Object::string_literal("condition Z.")]),
            Operation::new("ET", vec![]),
        ]);
        ops.extend(text_at(10, 290, 30, "Page 1 of 9"));
        pdf(ops)
    }

    #[test]
    fn test_lines_top_to_bottom() {
        let lines = extract_lines(&label_page(), &PageOptions::default()).unwrap();
        assert_eq!(
            lines,
            vec!["Diffusia PI v3", "4.1 THERAPEUTIC INDICATIONS", "Treats condition Z.", "Page 1 of 9"]
        );
    }

    #[test]
    fn test_margins_cropped() {
        let options = PageOptions { margin: Some(DEFAULT_MARGIN_PT), exclude_tables: false };
        let lines = extract_lines(&label_page(), &options).unwrap();
        assert_eq!(lines, vec!["4.1 THERAPEUTIC INDICATIONS", "Treats condition Z."]);
    }

    #[test]
    fn test_ruled_table_excluded() {
        let mut ops = vec![
            // page-sized clip, never painted
            rect(0, 0, 595, 842),
            Operation::new("W", vec![]),
            Operation::new("n", vec![]),
            rect(72, 400, 100, 20),
            rect(172, 400, 100, 20),
            rect(72, 380, 100, 20),
            rect(172, 380, 100, 20),
            Operation::new("S", vec![]),
        ];
        ops.extend(text_at(10, 80, 405, "cell text"));
        ops.extend(text_at(12, 72, 300, "After the table"));
        let bytes = pdf(ops);

        let kept = extract_lines(&bytes, &PageOptions { margin: None, exclude_tables: true }).unwrap();
        assert_eq!(kept, vec!["After the table"]);

        let all = extract_lines(&bytes, &PageOptions::default()).unwrap();
        assert_eq!(all, vec!["cell text", "After the table"]);
    }

    #[test]
    fn test_tj_array_spacing() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 500.into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("Posology"),
                    (-400).into(),
                    Object::string_literal("and"),
                    (-20).into(),
                    Object::string_literal("method"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ];
        let lines = extract_lines(&pdf(ops), &PageOptions::default()).unwrap();
        assert_eq!(lines, vec!["Posology andmethod"]);
    }

    #[test]
    fn test_not_a_pdf() {
        let err = extract_lines(b"plain text", &PageOptions::default()).unwrap_err();
        assert!(matches!(err, IngestError::Linearize(_)));
    }

    #[test]
    fn test_text_decoded_through_font_encoding() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 500.into()]),
            Operation::new("Tj", vec![Object::string_literal(b"Patient\x92s leaflet \x96 caf\xe9".to_vec())]),
            Operation::new("ET", vec![]),
        ];
        let lines = extract_lines(&pdf(ops), &PageOptions::default()).unwrap();
        assert_eq!(lines, vec!["Patient\u{2019}s leaflet \u{2013} caf\u{e9}"]);
    }
}
