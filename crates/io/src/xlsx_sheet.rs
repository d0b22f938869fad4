//! Worksheet XML: reading cell values and splicing appended rows back in.
//!
//! The original XML is kept verbatim. Saving only inserts new `<row>`
//! elements into `<sheetData>` and widens `<dimension>`; every other byte of
//! the part is reproduced as read.

use std::collections::BTreeMap;

use ledgersync_recon::cells::{date_to_excel_serial, parse_date_str, Cell, ColumnRef};
use ledgersync_recon::{LedgerSheet, ReconError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Row attributes copied from the template row onto appended rows.
const ROW_STYLE_ATTRS: &[&str] = &["s", "customFormat", "ht", "customHeight"];

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone)]
struct CellInfo {
    value: Cell,
    style: Option<u32>,
    formula: bool,
    span: (usize, usize),
}

impl CellInfo {
    /// Holds a value or a formula. Styled blanks do not count.
    fn is_occupied(&self) -> bool {
        self.formula || self.value != Cell::Empty
    }
}

#[derive(Debug, Clone)]
struct RowInfo {
    span: (usize, usize),
    /// `<row ...>`, never self-closing.
    open_tag: String,
    style: Vec<(String, String)>,
    cells: BTreeMap<u16, CellInfo>,
}

#[derive(Debug, Clone)]
struct NewRow {
    cells: Vec<(u16, Cell)>,
    style_from: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
enum DataSpan {
    /// `<sheetData>` .. `</sheetData>`; offsets of the content between them.
    Open { content_start: usize, content_end: usize },
    /// `<sheetData/>`
    Empty { start: usize, end: usize },
}

#[derive(Debug, Clone)]
struct Dimension {
    span: (usize, usize),
    reference: String,
}

#[derive(Debug)]
pub struct XlsxSheet {
    name: String,
    part: String,
    xml: String,
    rows: BTreeMap<u32, RowInfo>,
    data: DataSpan,
    dimension: Option<Dimension>,
    appended: BTreeMap<u32, NewRow>,
}

impl XlsxSheet {
    pub fn parse(name: &str, part: &str, xml: String, shared: &[String]) -> Result<Self, String> {
        let parsed = SheetParser::new(shared).run(&xml).map_err(|e| format!("{part}: {e}"))?;
        let data = parsed
            .data
            .ok_or_else(|| format!("{part}: worksheet has no <sheetData>"))?;
        Ok(Self {
            name: name.to_string(),
            part: part.to_string(),
            xml,
            rows: parsed.rows,
            data,
            dimension: parsed.dimension,
            appended: BTreeMap::new(),
        })
    }

    pub fn part(&self) -> &str {
        &self.part
    }

    pub fn is_modified(&self) -> bool {
        !self.appended.is_empty()
    }

    /// The worksheet XML with appended rows spliced in, or `None` when
    /// nothing was appended.
    pub fn render(&self) -> Option<String> {
        if self.appended.is_empty() {
            return None;
        }

        let mut edits: Vec<(usize, usize, String)> = Vec::new();

        if let Some(dim) = &self.dimension {
            let reference = self.widened_dimension(&dim.reference);
            edits.push((dim.span.0, dim.span.1, format!("<dimension ref=\"{reference}\"/>")));
        }

        match self.data {
            DataSpan::Empty { start, end } => {
                let mut body = String::from("<sheetData>");
                for (&row, new) in &self.appended {
                    body.push_str(&self.render_new_row(row, new));
                }
                body.push_str("</sheetData>");
                edits.push((start, end, body));
            }
            DataSpan::Open { content_end, .. } => {
                for (&row, new) in &self.appended {
                    if let Some(existing) = self.rows.get(&row) {
                        edits.push((existing.span.0, existing.span.1, self.render_merged_row(row, existing, new)));
                        continue;
                    }
                    let at = self
                        .rows
                        .range(row + 1..)
                        .next()
                        .map(|(_, r)| r.span.0)
                        .unwrap_or(content_end);
                    edits.push((at, at, self.render_new_row(row, new)));
                }
            }
        }

        // stable: several inserts at one offset keep row order
        edits.sort_by_key(|(start, _, _)| *start);
        let mut out = String::with_capacity(self.xml.len() + edits.iter().map(|e| e.2.len()).sum::<usize>());
        let mut cursor = 0;
        for (start, end, text) in edits {
            out.push_str(&self.xml[cursor..start]);
            out.push_str(&text);
            cursor = end;
        }
        out.push_str(&self.xml[cursor..]);
        Some(out)
    }

    fn template(&self, new: &NewRow) -> Option<&RowInfo> {
        new.style_from.and_then(|r| self.rows.get(&r))
    }

    fn render_new_row(&self, row: u32, new: &NewRow) -> String {
        let template = self.template(new);
        let mut out = format!("<row r=\"{}\"", row + 1);
        if let Some(t) = template {
            for (key, value) in &t.style {
                out.push_str(&format!(" {key}=\"{value}\""));
            }
        }
        out.push('>');

        // every styled column of the template row, plus the new values
        let mut columns: BTreeMap<u16, (Option<&Cell>, Option<u32>)> = BTreeMap::new();
        if let Some(t) = template {
            for (&col, info) in &t.cells {
                if info.style.is_some() {
                    columns.insert(col, (None, info.style));
                }
            }
        }
        for (col, cell) in &new.cells {
            columns.entry(*col).or_insert((None, None)).0 = Some(cell);
        }
        for (col, (value, style)) in columns {
            out.push_str(&render_cell(row, col, value, style));
        }
        out.push_str("</row>");
        out
    }

    fn render_merged_row(&self, row: u32, existing: &RowInfo, new: &NewRow) -> String {
        let template = self.template(new);
        let mut pieces: BTreeMap<u16, String> = existing
            .cells
            .iter()
            .map(|(&col, info)| (col, self.xml[info.span.0..info.span.1].to_string()))
            .collect();
        for (col, cell) in &new.cells {
            let current = existing.cells.get(col);
            if current.is_some_and(CellInfo::is_occupied) {
                continue;
            }
            let style = current
                .and_then(|c| c.style)
                .or_else(|| template.and_then(|t| t.cells.get(col)).and_then(|c| c.style));
            pieces.insert(*col, render_cell(row, *col, Some(cell), style));
        }
        let mut out = existing.open_tag.clone();
        for piece in pieces.values() {
            out.push_str(piece);
        }
        out.push_str("</row>");
        out
    }

    fn widened_dimension(&self, reference: &str) -> String {
        let mut max_row = self.rows.keys().next_back().copied().unwrap_or(0);
        let mut max_col = self
            .rows
            .values()
            .filter_map(|r| r.cells.keys().next_back().copied())
            .max()
            .unwrap_or(0);
        for (&row, new) in &self.appended {
            max_row = max_row.max(row);
            if let Some(col) = new.cells.iter().map(|(c, _)| *c).max() {
                max_col = max_col.max(col);
            }
            if let Some(t) = self.template(new) {
                if let Some(&col) = t.cells.keys().next_back() {
                    max_col = max_col.max(col);
                }
            }
        }

        let mut parts = reference.split(':');
        let top_left = parts.next().unwrap_or("A1").to_string();
        if let Some((old_row, old_col)) = parts.next().or(Some(top_left.as_str())).and_then(parse_cell_ref) {
            max_row = max_row.max(old_row);
            max_col = max_col.max(old_col);
        }
        format!("{top_left}:{}", cell_ref(max_row, max_col))
    }
}

fn render_cell(row: u32, col: u16, value: Option<&Cell>, style: Option<u32>) -> String {
    let r = cell_ref(row, col);
    let s = style.map(|s| format!(" s=\"{s}\"")).unwrap_or_default();
    match value {
        None | Some(Cell::Empty) => format!("<c r=\"{r}\"{s}/>"),
        Some(Cell::Number(n)) => format!("<c r=\"{r}\"{s}><v>{n}</v></c>"),
        Some(Cell::Date(d)) => format!("<c r=\"{r}\"{s}><v>{}</v></c>", date_to_excel_serial(*d)),
        Some(Cell::Bool(b)) => format!("<c r=\"{r}\"{s} t=\"b\"><v>{}</v></c>", u8::from(*b)),
        Some(Cell::Text(t)) => format!(
            "<c r=\"{r}\"{s} t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
            escape_xml(t)
        ),
    }
}

// ============================================================================
// LedgerSheet
// ============================================================================

impl LedgerSheet for XlsxSheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_count(&self) -> u32 {
        let existing = self.rows.keys().next_back().map(|r| r + 1).unwrap_or(0);
        let appended = self.appended.keys().next_back().map(|r| r + 1).unwrap_or(0);
        existing.max(appended)
    }

    fn cell(&self, row: u32, col: u16) -> Cell {
        if let Some(info) = self.rows.get(&row).and_then(|r| r.cells.get(&col)) {
            if info.value != Cell::Empty {
                return info.value.clone();
            }
        }
        self.appended
            .get(&row)
            .and_then(|r| r.cells.iter().find(|(c, _)| *c == col))
            .map(|(_, cell)| cell.clone())
            .unwrap_or(Cell::Empty)
    }

    fn append_row(
        &mut self,
        row: u32,
        cells: &[(u16, Cell)],
        style_from: Option<u32>,
    ) -> Result<(), ReconError> {
        let existing = self.rows.get(&row);
        let kept: Vec<(u16, Cell)> = cells
            .iter()
            .filter(|(col, _)| {
                let taken = existing
                    .and_then(|r| r.cells.get(col))
                    .is_some_and(CellInfo::is_occupied);
                if taken {
                    log::debug!("{}: keeping existing {}", self.name, cell_ref(row, *col));
                }
                !taken
            })
            .cloned()
            .collect();

        let entry = self
            .appended
            .entry(row)
            .or_insert(NewRow { cells: Vec::new(), style_from });
        for (col, cell) in kept {
            if !entry.cells.iter().any(|(c, _)| *c == col) {
                entry.cells.push((col, cell));
            }
        }
        entry.cells.sort_by_key(|(c, _)| *c);
        Ok(())
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parsed {
    rows: BTreeMap<u32, RowInfo>,
    data: Option<DataSpan>,
    dimension: Option<Dimension>,
}

#[derive(Clone, Copy, PartialEq)]
enum TextTarget {
    None,
    Value,
    Inline,
}

struct PendingCell {
    col: u16,
    kind: Option<String>,
    style: Option<u32>,
    formula: bool,
    start: usize,
    value: String,
    inline: String,
}

struct PendingRow {
    index: u32,
    info: RowInfo,
}

struct SheetParser<'s> {
    shared: &'s [String],
    rows: BTreeMap<u32, RowInfo>,
    data: Option<DataSpan>,
    data_start: usize,
    dimension: Option<Dimension>,
    in_sheet_data: bool,
    row: Option<PendingRow>,
    cell: Option<PendingCell>,
    target: TextTarget,
    in_inline: bool,
    in_phonetic: bool,
    next_row: u32,
    next_col: u16,
}

impl<'s> SheetParser<'s> {
    fn new(shared: &'s [String]) -> Self {
        Self {
            shared,
            rows: BTreeMap::new(),
            data: None,
            data_start: 0,
            dimension: None,
            in_sheet_data: false,
            row: None,
            cell: None,
            target: TextTarget::None,
            in_inline: false,
            in_phonetic: false,
            next_row: 0,
            next_col: 0,
        }
    }

    fn run(mut self, xml: &str) -> Result<Parsed, String> {
        let mut reader = Reader::from_str(xml);
        // whitespace is kept so byte offsets stay exact

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(|e| e.to_string())?;
            let after = reader.buffer_position() as usize;
            match event {
                Event::Start(ref e) => self.open(xml, e, false, before, after),
                Event::Empty(ref e) => self.open(xml, e, true, before, after),
                Event::End(ref e) => self.close(e.name().as_ref(), before, after),
                Event::Text(ref e) => {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    self.text(&unescape_xml(&raw));
                }
                Event::CData(ref e) => {
                    let raw = String::from_utf8_lossy(e.as_ref()).to_string();
                    self.text(&raw);
                }
                Event::GeneralRef(ref e) => {
                    let name = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&name) {
                        self.text(&resolved);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Parsed { rows: self.rows, data: self.data, dimension: self.dimension })
    }

    fn open(&mut self, xml: &str, e: &BytesStart<'_>, empty: bool, before: usize, after: usize) {
        match e.name().as_ref() {
            b"dimension" => {
                if let Some(reference) = attr(e, b"ref") {
                    // only the self-closing form is ever written by Excel
                    if empty {
                        self.dimension = Some(Dimension { span: (before, after), reference });
                    }
                }
            }
            b"sheetData" => {
                if empty {
                    self.data = Some(DataSpan::Empty { start: before, end: after });
                } else {
                    self.in_sheet_data = true;
                    self.data_start = after;
                }
            }
            b"row" if self.in_sheet_data => {
                let index = attr(e, b"r")
                    .and_then(|r| r.parse::<u32>().ok())
                    .map(|r| r.saturating_sub(1))
                    .unwrap_or(self.next_row);
                self.next_row = index + 1;
                self.next_col = 0;

                let raw = &xml[before..after];
                let open_tag = if empty {
                    format!("{}>", raw.trim_end_matches('>').trim_end_matches('/').trim_end())
                } else {
                    raw.to_string()
                };
                let style = ROW_STYLE_ATTRS
                    .iter()
                    .filter_map(|key| attr(e, key.as_bytes()).map(|v| (key.to_string(), v)))
                    .collect();
                let info = RowInfo { span: (before, after), open_tag, style, cells: BTreeMap::new() };
                if empty {
                    self.rows.insert(index, info);
                } else {
                    self.row = Some(PendingRow { index, info });
                }
            }
            b"c" if self.row.is_some() => {
                let col = attr(e, b"r")
                    .and_then(|r| parse_cell_ref(&r))
                    .map(|(_, c)| c)
                    .unwrap_or(self.next_col);
                self.next_col = col.saturating_add(1);
                let pending = PendingCell {
                    col,
                    kind: attr(e, b"t"),
                    style: attr(e, b"s").and_then(|s| s.parse().ok()),
                    formula: false,
                    start: before,
                    value: String::new(),
                    inline: String::new(),
                };
                if empty {
                    self.finish_cell(pending, after);
                } else {
                    self.cell = Some(pending);
                }
            }
            b"v" if self.cell.is_some() => self.target = TextTarget::Value,
            b"f" => {
                if let Some(cell) = self.cell.as_mut() {
                    cell.formula = true;
                }
            }
            b"is" if self.cell.is_some() => self.in_inline = true,
            b"rPh" => self.in_phonetic = true,
            b"t" if self.in_inline && !self.in_phonetic && !empty => self.target = TextTarget::Inline,
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8], before: usize, after: usize) {
        match name {
            b"v" | b"t" => self.target = TextTarget::None,
            b"is" => self.in_inline = false,
            b"rPh" => self.in_phonetic = false,
            b"c" => {
                if let Some(pending) = self.cell.take() {
                    self.finish_cell(pending, after);
                }
            }
            b"row" => {
                if let Some(mut pending) = self.row.take() {
                    pending.info.span.1 = after;
                    self.rows.insert(pending.index, pending.info);
                }
            }
            b"sheetData" => {
                self.in_sheet_data = false;
                self.data = Some(DataSpan::Open { content_start: self.data_start, content_end: before });
            }
            _ => {}
        }
    }

    fn text(&mut self, s: &str) {
        if let Some(cell) = self.cell.as_mut() {
            match self.target {
                TextTarget::Value => cell.value.push_str(s),
                TextTarget::Inline => cell.inline.push_str(s),
                TextTarget::None => {}
            }
        }
    }

    fn finish_cell(&mut self, pending: PendingCell, end: usize) {
        let value = resolve_value(pending.kind.as_deref(), &pending.value, &pending.inline, self.shared);
        if let Some(row) = self.row.as_mut() {
            row.info.cells.insert(
                pending.col,
                CellInfo { value, style: pending.style, formula: pending.formula, span: (pending.start, end) },
            );
        }
    }
}

fn resolve_value(kind: Option<&str>, value: &str, inline: &str, shared: &[String]) -> Cell {
    match kind {
        Some("s") => value
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i))
            .map(|s| Cell::text(s.as_str()))
            .unwrap_or(Cell::Empty),
        Some("inlineStr") => Cell::text(inline),
        Some("str") | Some("e") => Cell::text(value),
        Some("b") => Cell::Bool(value.trim() == "1"),
        Some("d") => parse_date_str(value)
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::text(value)),
        _ => {
            let v = value.trim();
            if v.is_empty() {
                Cell::Empty
            } else {
                v.parse::<f64>().map(Cell::Number).unwrap_or_else(|_| Cell::text(v))
            }
        }
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| unescape_xml(&String::from_utf8_lossy(&a.value)))
}

// ============================================================================
// XML text + cell references
// ============================================================================

pub(crate) fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        match tail.find(';').and_then(|semi| resolve_entity(&tail[..semi]).map(|r| (semi, r))) {
            Some((semi, resolved)) => {
                out.push_str(&resolved);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Text for an entity name such as `amp` or `#x41`.
fn resolve_entity(name: &str) -> Option<String> {
    let named = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    };
    if let Some(c) = named {
        return Some(c.to_string());
    }
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        name.strip_prefix('#')?.parse().ok()?
    };
    char::from_u32(code).map(|c| c.to_string())
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            // not representable in XML 1.0
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

/// `"AB12"` -> 0-based (row, col).
pub(crate) fn parse_cell_ref(s: &str) -> Option<(u32, u16)> {
    let s = s.trim().replace('$', "");
    let split = s.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = s.split_at(split);
    let col = ColumnRef::parse(letters)?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col.0))
}

pub(crate) fn cell_ref(row: u32, col: u16) -> String {
    format!("{}{}", ColumnRef(col), row + 1)
}
