//! Post-save edits on the `.xlsx` package itself.
//!
//! The cell editor leaves sheet views and row outline levels alone, so the
//! frozen header and the grouped loss ledger are applied here by rewriting the
//! worksheet parts in the zip. `xl/workbook.xml` is rewritten only when a
//! replaced sheet left two sheets sharing a `sheetId`. Every other part is
//! copied through untouched.

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{RowGroup, Sheet};
use crate::utils::column_letter;

/// Sheet view and outline settings for one worksheet part
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetLayout {
    /// Top-left cell of the scrolling pane, 1-based
    pub freeze_panes: Option<(u32, u16)>,
    pub row_groups: Vec<RowGroup>,
}

impl SheetLayout {
    pub fn of(sheet: &Sheet) -> Self {
        Self {
            freeze_panes: sheet.freeze_panes(),
            row_groups: sheet.row_groups().to_vec(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.freeze_panes.is_none() && self.row_groups.is_empty()
    }

    fn outline(&self, row: u32) -> Option<&RowGroup> {
        self.row_groups
            .iter()
            .find(|g| (g.first..=g.last).contains(&row))
    }
}

const WORKBOOK_PART: &str = "xl/workbook.xml";

/// Apply layouts, keyed by sheet name, to the saved package at `path` and
/// make sheet ids unique
pub fn patch(path: &Path, layouts: &[(String, SheetLayout)]) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to reopen {}", path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .with_context(|| format!("{} is not an xlsx package", path.display()))?;

    let mut patched = HashMap::new();
    let workbook_xml = read_zip_file(&mut archive, WORKBOOK_PART)?;
    if let Some(renumbered) = renumber_sheet_ids(&workbook_xml)? {
        debug!("Duplicate sheet ids renumbered");
        patched.insert(WORKBOOK_PART.to_string(), renumbered);
    }

    for (sheet, layout) in layouts {
        let part = find_worksheet_part(&mut archive, sheet)?;
        let xml = read_zip_file(&mut archive, &part)?;
        let rewritten = rewrite_sheet_xml(&xml, layout)
            .with_context(|| format!("Failed to update layout of sheet '{}'", sheet))?;
        debug!("Layout applied to '{}' ({})", sheet, part);
        patched.insert(part, rewritten);
    }

    if patched.is_empty() {
        return Ok(());
    }

    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let name = entry.name().to_string();
        match patched.get(&name) {
            Some(xml) => {
                drop(entry);
                out.start_file(name.as_str(), options)?;
                out.write_all(xml.as_bytes())?;
            }
            None => out.raw_copy_file(entry)?,
        }
    }
    let buffer = out.finish()?.into_inner();

    std::fs::write(path, buffer)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Read the XML of a worksheet part by sheet name
pub fn read_sheet_xml(path: &Path, sheet: &str) -> Result<String> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive = ZipArchive::new(file)?;
    let part = find_worksheet_part(&mut archive, sheet)?;
    read_zip_file(&mut archive, &part)
}

/// Resolve `xl/workbook.xml` sheet name -> rId -> part path
fn find_worksheet_part<R: Read + Seek>(archive: &mut ZipArchive<R>, sheet: &str) -> Result<String> {
    let workbook_xml = read_zip_file(archive, WORKBOOK_PART)?;
    let rid = find_sheet_rid(&workbook_xml, sheet)?;
    let rels_xml = read_zip_file(archive, "xl/_rels/workbook.xml.rels")?;
    let target = find_relationship_target(&rels_xml, &rid)?;

    // Targets are relative to xl/ unless absolute within the package
    Ok(match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    })
}

fn find_sheet_rid(workbook_xml: &str, sheet: &str) -> Result<String> {
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rid = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => name = Some(attr.decode_and_unescape_value(reader.decoder())?.into_owned()),
                        b"r:id" => rid = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                        _ => {}
                    }
                }
                if name.as_deref() == Some(sheet) {
                    if let Some(rid) = rid {
                        return Ok(rid);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    bail!("Sheet '{}' not found in workbook.xml", sheet)
}

fn find_relationship_target(rels_xml: &str, rid: &str) -> Result<String> {
    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                        b"Target" => target = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                        _ => {}
                    }
                }
                if id.as_deref() == Some(rid) {
                    if let Some(target) = target {
                        return Ok(target);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(anyhow!("Relationship '{}' not found", rid))
}

/// Give every sheet after the first holder of a `sheetId` a fresh one;
/// `None` when the ids are already unique
fn renumber_sheet_ids(workbook_xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(workbook_xml);
    let mut ids = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"sheet" => {
                ids.push(sheet_id(e));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut seen = HashSet::new();
    if ids.iter().flatten().all(|id| seen.insert(*id)) {
        return Ok(None);
    }

    let mut next = ids.iter().flatten().max().copied().unwrap_or(0);
    let mut seen = HashSet::new();
    let mut reader = Reader::from_str(workbook_xml);
    let mut writer = Writer::new(Vec::new());
    loop {
        let event = reader.read_event()?;
        match event {
            Event::Eof => break,
            Event::Empty(ref e) if e.local_name().as_ref() == b"sheet" => {
                match sheet_id(e) {
                    Some(id) if !seen.insert(id) => {
                        next += 1;
                        seen.insert(next);
                        let mut sheet = copy_without(e, &[b"sheetId"]);
                        sheet.push_attribute(("sheetId", next.to_string().as_str()));
                        writer.write_event(Event::Empty(sheet))?;
                    }
                    _ => writer.write_event(event.borrow())?,
                }
            }
            other => writer.write_event(other)?,
        }
    }

    Ok(Some(
        String::from_utf8(writer.into_inner()).context("Workbook XML is not UTF-8")?,
    ))
}

fn sheet_id(e: &BytesStart<'_>) -> Option<u32> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"sheetId")
        .and_then(|a| std::str::from_utf8(&a.value).ok()?.parse().ok())
}

fn read_zip_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let mut file = archive
        .by_name(path)
        .with_context(|| format!("'{}' not found in package", path))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .with_context(|| format!("Failed to read '{}'", path))?;
    Ok(content)
}

/// Rewrite one worksheet part: frozen pane in the first sheet view, outline
/// level on grouped rows and on the sheet format
fn rewrite_sheet_xml(xml: &str, layout: &SheetLayout) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());

    let mut views_seen = false;
    let mut format_seen = false;
    let mut pane_written = false;
    let mut in_view = false;

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = e.local_name().as_ref().to_vec();
                let is_empty = matches!(event, Event::Empty(_));

                if matches!(name.as_slice(), b"sheetFormatPr" | b"cols" | b"sheetData") {
                    if !views_seen {
                        write_sheet_views(&mut writer, layout)?;
                        views_seen = true;
                    }
                    if !format_seen && name != b"sheetFormatPr" && !layout.row_groups.is_empty() {
                        let mut format = BytesStart::new("sheetFormatPr");
                        format.push_attribute(("defaultRowHeight", "15"));
                        format.push_attribute(("outlineLevelRow", "1"));
                        writer.write_event(Event::Empty(format))?;
                    }
                    format_seen = true;
                }

                match name.as_slice() {
                    b"sheetViews" => {
                        views_seen = true;
                        writer.write_event(event.borrow())?;
                    }
                    b"sheetView" if !pane_written && layout.freeze_panes.is_some() => {
                        writer.write_event(Event::Start(e.borrow()))?;
                        write_pane(&mut writer, layout)?;
                        pane_written = true;
                        if is_empty {
                            writer.write_event(Event::End(e.to_end()))?;
                        } else {
                            in_view = true;
                        }
                    }
                    // an existing split is replaced by ours
                    b"pane" if in_view => {
                        if !is_empty {
                            reader.read_to_end(e.name())?;
                        }
                    }
                    b"sheetFormatPr" if !layout.row_groups.is_empty() => {
                        let mut format = copy_without(e, &[b"outlineLevelRow"]);
                        format.push_attribute(("outlineLevelRow", "1"));
                        writer.write_event(if is_empty {
                            Event::Empty(format)
                        } else {
                            Event::Start(format)
                        })?;
                    }
                    b"row" => {
                        let row = row_number(e);
                        match row.and_then(|r| layout.outline(r).map(|g| (r, g))) {
                            Some((r, group)) => {
                                let mut start = copy_without(e, &[b"outlineLevel", b"collapsed"]);
                                start.push_attribute(("outlineLevel", "1"));
                                if group.collapsed && r == group.last {
                                    start.push_attribute(("collapsed", "1"));
                                }
                                writer.write_event(if is_empty {
                                    Event::Empty(start)
                                } else {
                                    Event::Start(start)
                                })?;
                            }
                            None => writer.write_event(event.borrow())?,
                        }
                    }
                    _ => writer.write_event(event.borrow())?,
                }
            }
            Event::End(ref e) => {
                if e.local_name().as_ref() == b"sheetView" {
                    in_view = false;
                }
                writer.write_event(event.borrow())?;
            }
            other => writer.write_event(other)?,
        }
    }

    String::from_utf8(writer.into_inner()).context("Worksheet XML is not UTF-8")
}

fn write_sheet_views(writer: &mut Writer<Vec<u8>>, layout: &SheetLayout) -> Result<()> {
    if layout.freeze_panes.is_none() {
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new("sheetViews")))?;
    let mut view = BytesStart::new("sheetView");
    view.push_attribute(("workbookViewId", "0"));
    writer.write_event(Event::Start(view))?;
    write_pane(writer, layout)?;
    writer.write_event(Event::End(BytesEnd::new("sheetView")))?;
    writer.write_event(Event::End(BytesEnd::new("sheetViews")))?;
    Ok(())
}

fn write_pane(writer: &mut Writer<Vec<u8>>, layout: &SheetLayout) -> Result<()> {
    let Some((row, col)) = layout.freeze_panes else {
        return Ok(());
    };
    let (x_split, y_split) = (col.saturating_sub(1), row.saturating_sub(1));
    if x_split == 0 && y_split == 0 {
        return Ok(());
    }

    let active = match (x_split > 0, y_split > 0) {
        (true, true) => "bottomRight",
        (true, false) => "topRight",
        _ => "bottomLeft",
    };
    let top_left = format!("{}{}", column_letter(col), row);

    let mut pane = BytesStart::new("pane");
    if x_split > 0 {
        pane.push_attribute(("xSplit", x_split.to_string().as_str()));
    }
    if y_split > 0 {
        pane.push_attribute(("ySplit", y_split.to_string().as_str()));
    }
    pane.push_attribute(("topLeftCell", top_left.as_str()));
    pane.push_attribute(("activePane", active));
    pane.push_attribute(("state", "frozen"));
    writer.write_event(Event::Empty(pane))?;
    Ok(())
}

fn copy_without(e: &BytesStart<'_>, dropped: &[&[u8]]) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut copy = BytesStart::new(name);
    for attr in e.attributes().flatten() {
        if !dropped.contains(&attr.key.as_ref()) {
            copy.push_attribute(attr);
        }
    }
    copy
}

fn row_number(e: &BytesStart<'_>) -> Option<u32> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"r")
        .and_then(|a| std::str::from_utf8(&a.value).ok()?.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        r#"<dimension ref="A1:D50"/>"#,
        r#"<sheetViews><sheetView tabSelected="1" workbookViewId="0">"#,
        r#"<selection activeCell="A1" sqref="A1"/></sheetView></sheetViews>"#,
        r#"<sheetFormatPr defaultRowHeight="15"/>"#,
        r#"<sheetData>"#,
        r#"<row r="42"><c r="C42" t="inlineStr"><is><t>P&amp;L</t></is></c></row>"#,
        r#"<row r="43" spans="1:4"><c r="C43"><v>1</v></c></row>"#,
        r#"<row r="50"><c r="C50"><v>2</v></c></row>"#,
        r#"</sheetData></worksheet>"#
    );

    fn dre_layout() -> SheetLayout {
        SheetLayout {
            freeze_panes: Some((4, 4)),
            row_groups: vec![RowGroup {
                first: 43,
                last: 50,
                collapsed: true,
            }],
        }
    }

    #[test]
    fn test_rewrite_adds_pane_and_outline() {
        let xml = rewrite_sheet_xml(SHEET, &dre_layout()).unwrap();

        assert!(xml.contains(
            r#"<sheetView tabSelected="1" workbookViewId="0"><pane xSplit="3" ySplit="3" topLeftCell="D4" activePane="bottomRight" state="frozen"/><selection"#
        ));
        assert!(xml.contains(r#"<sheetFormatPr defaultRowHeight="15" outlineLevelRow="1"/>"#));
        assert!(xml.contains(r#"<row r="42">"#));
        assert!(xml.contains(r#"<row r="43" spans="1:4" outlineLevel="1">"#));
        assert!(xml.contains(r#"<row r="50" outlineLevel="1" collapsed="1">"#));
        // untouched content survives byte for byte
        assert!(xml.contains(r#"<t>P&amp;L</t>"#));
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
    }

    #[test]
    fn test_rewrite_replaces_existing_pane() {
        let sheet = SHEET.replace(
            r#"<selection activeCell="A1" sqref="A1"/>"#,
            r#"<pane ySplit="1" topLeftCell="A2" activePane="bottomLeft" state="frozen"/>"#,
        );
        let xml = rewrite_sheet_xml(&sheet, &dre_layout()).unwrap();
        assert_eq!(xml.matches("<pane ").count(), 1);
        assert!(xml.contains(r#"topLeftCell="D4""#));
    }

    #[test]
    fn test_rewrite_creates_missing_sheet_views() {
        let sheet = concat!(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
            r#"<dimension ref="A1"/><sheetData><row r="1"/></sheetData></worksheet>"#
        );
        let layout = SheetLayout {
            freeze_panes: Some((2, 1)),
            row_groups: Vec::new(),
        };
        let xml = rewrite_sheet_xml(sheet, &layout).unwrap();
        assert!(xml.contains(concat!(
            r#"<dimension ref="A1"/><sheetViews><sheetView workbookViewId="0">"#,
            r#"<pane ySplit="1" topLeftCell="A2" activePane="bottomLeft" state="frozen"/>"#,
            r#"</sheetView></sheetViews><sheetData>"#
        )));
        assert!(!xml.contains("outlineLevel"));
    }

    #[test]
    fn test_duplicate_sheet_ids_are_renumbered() {
        let workbook = concat!(
            r#"<workbook><sheets><sheet name="DRE" sheetId="5" r:id="rId6"/>"#,
            r#"<sheet name="Vendas" sheetId="2" r:id="rId1"/>"#,
            r#"<sheet name="Folha" sheetId="5" r:id="rId5"/></sheets></workbook>"#
        );
        let xml = renumber_sheet_ids(workbook).unwrap().unwrap();
        assert!(xml.contains(r#"<sheet name="DRE" sheetId="5" r:id="rId6"/>"#));
        assert!(xml.contains(r#"<sheet name="Folha" r:id="rId5" sheetId="6"/>"#));

        let unique = xml.replace("sheetId=\"6\"", "sheetId=\"7\"");
        assert_eq!(renumber_sheet_ids(&unique).unwrap(), None);
    }

    #[test]
    fn test_relationship_lookup_resolves_part() {
        let workbook = concat!(
            r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<sheets><sheet name="DRE" sheetId="4" r:id="rId4"/>"#,
            r#"<sheet name="Vendas" sheetId="1" r:id="rId1"/></sheets></workbook>"#
        );
        let rels = concat!(
            r#"<Relationships><Relationship Id="rId1" Target="worksheets/sheet1.xml"/>"#,
            r#"<Relationship Id="rId4" Target="/xl/worksheets/sheet4.xml"/></Relationships>"#
        );
        assert_eq!(find_sheet_rid(workbook, "DRE").unwrap(), "rId4");
        assert_eq!(find_relationship_target(rels, "rId1").unwrap(), "worksheets/sheet1.xml");
        assert!(find_sheet_rid(workbook, "Folha").is_err());
    }
}
