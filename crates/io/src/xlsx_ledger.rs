// Master ledger workbook (xlsx).
//
// Opened from a template, edited through the LedgerDocument trait and saved
// under a new name. Zip entries other than modified worksheets are copied
// raw, so charts, pivot caches, macros, styles and defined names come out
// byte-for-byte as they went in.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use ledgersync_recon::{LedgerDocument, LedgerSheet, ReconError};
use quick_xml::events::Event;
use quick_xml::Reader;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::xlsx_sheet::{unescape_xml, XlsxSheet};

pub struct XlsxLedger {
    bytes: Vec<u8>,
    sheets: Vec<XlsxSheet>,
}

impl XlsxLedger {
    pub fn open(path: &Path) -> Result<Self, ReconError> {
        let bytes = fs::read(path)
            .map_err(|e| ReconError::LedgerUnreadable(format!("{}: {e}", path.display())))?;
        Self::from_bytes(path, bytes)
    }

    pub fn from_bytes(source: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Self, ReconError> {
        let source = source.into();
        let unreadable = |reason: String| ReconError::LedgerUnreadable(format!("{}: {reason}", source.display()));

        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).map_err(|e| unreadable(e.to_string()))?;
        let workbook_xml = read_zip_file(&mut archive, "xl/workbook.xml")
            .ok_or_else(|| unreadable("missing xl/workbook.xml".into()))?;
        let rels_xml = read_zip_file(&mut archive, "xl/_rels/workbook.xml.rels")
            .ok_or_else(|| unreadable("missing xl/_rels/workbook.xml.rels".into()))?;
        let shared = read_zip_file(&mut archive, "xl/sharedStrings.xml")
            .map(|xml| parse_shared_strings(&xml))
            .unwrap_or_default();

        let mut sheets = Vec::new();
        for (name, part) in resolve_worksheets(&workbook_xml, &rels_xml) {
            let xml = read_zip_file(&mut archive, &part)
                .ok_or_else(|| unreadable(format!("sheet '{name}': missing part {part}")))?;
            sheets.push(XlsxSheet::parse(&name, &part, xml, &shared).map_err(unreadable)?);
        }
        log::debug!("{}: {} worksheets, {} shared strings", source.display(), sheets.len(), shared.len());
        drop(archive);

        Ok(Self { bytes, sheets })
    }

    pub fn sheet(&self, name: &str) -> Option<&XlsxSheet> {
        self.sheets.iter().find(|s| s.name() == name)
    }

    pub fn is_modified(&self) -> bool {
        self.sheets.iter().any(XlsxSheet::is_modified)
    }

    /// Write the workbook to `path` through a temporary file in the same
    /// directory, so a failed save never leaves a partial workbook behind.
    pub fn save_as(&self, path: &Path) -> Result<(), ReconError> {
        let failed = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ReconError::OutputLocked { path: path.display().to_string(), reason: e.to_string() }
            } else {
                ReconError::Io(format!("{}: {e}", path.display()))
            }
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(failed)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(failed)?;
        self.write_to(tmp.as_file_mut())?;
        tmp.as_file().sync_all().map_err(failed)?;
        tmp.persist(path).map_err(|e| failed(e.error))?;

        log::info!("saved {}", path.display());
        Ok(())
    }

    fn write_to<W: Write + Seek>(&self, out: W) -> Result<(), ReconError> {
        let zip_err = |e: zip::result::ZipError| ReconError::Io(format!("writing workbook: {e}"));

        let rendered: HashMap<&str, String> = self
            .sheets
            .iter()
            .filter_map(|s| s.render().map(|xml| (s.part(), xml)))
            .collect();

        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice())).map_err(zip_err)?;
        let mut writer = ZipWriter::new(out);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i).map_err(zip_err)?;
            match rendered.get(entry.name()) {
                Some(xml) => {
                    let name = entry.name().to_string();
                    drop(entry);
                    writer.start_file(name, options).map_err(zip_err)?;
                    writer
                        .write_all(xml.as_bytes())
                        .map_err(|e| ReconError::Io(format!("writing workbook: {e}")))?;
                }
                None => writer.raw_copy_file(entry).map_err(zip_err)?,
            }
        }
        writer.finish().map_err(zip_err)?;
        Ok(())
    }
}

impl LedgerDocument for XlsxLedger {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name().to_string()).collect()
    }

    fn sheet_mut(&mut self, name: &str) -> Option<&mut dyn LedgerSheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.name() == name)
            .map(|s| s as &mut dyn LedgerSheet)
    }
}

// ============================================================================
// Workbook parts
// ============================================================================

fn read_zip_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Option<String> {
    let mut file = archive.by_name(path).ok()?;
    let mut content = String::new();
    file.read_to_string(&mut content).ok()?;
    Some(content)
}

/// (sheet name, zip part) for every worksheet, in workbook order.
fn resolve_worksheets(workbook_xml: &str, rels_xml: &str) -> Vec<(String, String)> {
    let mut sheets = Vec::new();
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rid = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => name = Some(unescape_xml(&String::from_utf8_lossy(&attr.value))),
                        b"r:id" => rid = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        _ => {}
                    }
                }
                if let (Some(name), Some(rid)) = (name, rid) {
                    sheets.push((name, rid));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let mut targets: HashMap<String, String> = HashMap::new();
    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        b"Target" => target = Some(unescape_xml(&String::from_utf8_lossy(&attr.value))),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    sheets
        .into_iter()
        .filter_map(|(name, rid)| {
            let target = targets.get(&rid)?;
            // chartsheets have no rows
            if !target.contains("worksheet") {
                return None;
            }
            let part = match target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("xl/{target}"),
            };
            Some((name, part))
        })
        .collect()
}

/// `<si>` entries of xl/sharedStrings.xml; rich-text runs are joined and
/// phonetic hints dropped.
fn parse_shared_strings(xml: &str) -> Vec<String> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut in_si = false;
    let mut in_t = false;
    let mut in_phonetic = false;
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"rPh" => in_phonetic = true,
                b"t" if in_si && !in_phonetic => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(ref e)) if in_t => {
                current.push_str(&unescape_xml(&String::from_utf8_lossy(e.as_ref())));
            }
            Ok(Event::GeneralRef(ref e)) if in_t => {
                let entity = format!("&{};", String::from_utf8_lossy(e.as_ref()));
                current.push_str(&unescape_xml(&entity));
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                b"si" => {
                    strings.push(std::mem::take(&mut current));
                    in_si = false;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    strings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worksheets_resolve_through_relationships() {
        let workbook = r#"<workbook><sheets>
            <sheet name="R&amp;D" sheetId="1" r:id="rId2"/>
            <sheet name="Chart" sheetId="2" r:id="rId3"/>
            <sheet name="ACCT-1" sheetId="3" r:id="rId1"/>
        </sheets></workbook>"#;
        let rels = r#"<Relationships>
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet9.xml"/>
            <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
            <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/chartsheet" Target="chartsheets/sheet1.xml"/>
        </Relationships>"#;
        assert_eq!(
            resolve_worksheets(workbook, rels),
            vec![
                ("R&D".to_string(), "xl/worksheets/sheet1.xml".to_string()),
                ("ACCT-1".to_string(), "xl/worksheets/sheet9.xml".to_string()),
            ]
        );
    }

    #[test]
    fn shared_strings_join_runs_and_skip_phonetics() {
        let xml = r#"<sst><si><t>Date</t></si><si><r><t>SERVICE </t></r><r><t>CHARGE</t></r></si><si/><si><t>漢字</t><rPh sb="0" eb="2"><t>カンジ</t></rPh></si><si><t>A &amp; B</t></si></sst>"#;
        assert_eq!(parse_shared_strings(xml), vec!["Date", "SERVICE CHARGE", "", "漢字", "A & B"]);
    }

    #[test]
    fn garbage_is_unreadable() {
        let err = XlsxLedger::from_bytes("master.xlsx", b"not a zip".to_vec()).err().unwrap();
        assert!(matches!(err, ReconError::LedgerUnreadable(_)));
    }
}
