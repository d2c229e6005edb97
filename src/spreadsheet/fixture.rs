//! Writes small xlsx workbooks for tests.

use crate::spreadsheet::reference::index_to_reference;
use quick_xml::escape::escape;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Clone, Debug)]
pub(crate) enum FixtureCell {
    Empty,
    /// Text stored in the shared string table
    Text(&'static str),
    /// Text stored inline in the cell
    Inline(&'static str),
    Number(f64),
    /// Serial day number with a built-in date format
    Date(f64),
    Bool(bool),
    Error(&'static str),
}

#[derive(Default)]
pub(crate) struct WorkbookFixture {
    sheets: Vec<(String, Vec<Vec<FixtureCell>>)>,
}

impl WorkbookFixture {
    pub(crate) fn new() -> Self {
        WorkbookFixture::default()
    }

    pub(crate) fn sheet(mut self, name: &str, rows: Vec<Vec<FixtureCell>>) -> Self {
        self.sheets.push((name.to_owned(), rows));
        self
    }

    pub(crate) fn write(&self, path: PathBuf) -> PathBuf {
        let mut shared_strings = Vec::<&str>::new();
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();

        let mut workbook = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><workbookPr/><sheets>"#,
        );
        let mut relationships = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (index, (name, rows)) in self.sheets.iter().enumerate() {
            let number = index + 1;
            workbook.push_str(&format!(
                r#"<sheet name="{}" sheetId="{number}" r:id="rId{number}"/>"#,
                escape(name.as_str())
            ));
            relationships.push_str(&format!(
                r#"<Relationship Id="rId{number}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{number}.xml"/>"#
            ));
            let sheet = sheet_xml(rows, &mut shared_strings);
            zip.start_file(format!("xl/worksheets/sheet{number}.xml"), options).unwrap();
            zip.write_all(sheet.as_bytes()).unwrap();
        }
        workbook.push_str("</sheets></workbook>");
        relationships.push_str("</Relationships>");

        zip.start_file("xl/workbook.xml", options).unwrap();
        zip.write_all(workbook.as_bytes()).unwrap();
        zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
        zip.write_all(relationships.as_bytes()).unwrap();

        let mut strings = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );
        for text in &shared_strings {
            strings.push_str(&format!("<si><t>{}</t></si>", escape(*text)));
        }
        strings.push_str("</sst>");
        zip.start_file("xl/sharedStrings.xml", options).unwrap();
        zip.write_all(strings.as_bytes()).unwrap();

        zip.start_file("xl/styles.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/></cellXfs></styleSheet>"#,
        )
        .unwrap();
        zip.finish().unwrap();
        path
    }
}

fn sheet_xml(rows: &[Vec<FixtureCell>], shared_strings: &mut Vec<&'static str>) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (row, cells) in rows.iter().enumerate() {
        if cells.iter().all(|cell| matches!(cell, FixtureCell::Empty)) {
            continue;
        }
        xml.push_str(&format!(r#"<row r="{}">"#, row + 1));
        for (col, cell) in cells.iter().enumerate() {
            let reference = index_to_reference(row, col);
            let content = match cell {
                FixtureCell::Empty => continue,
                FixtureCell::Text(text) => {
                    let index = match shared_strings.iter().position(|known| known == text) {
                        Some(index) => index,
                        None => {
                            shared_strings.push(*text);
                            shared_strings.len() - 1
                        }
                    };
                    format!(r#"<c r="{reference}" t="s"><v>{index}</v></c>"#)
                }
                FixtureCell::Inline(text) => format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    escape(*text)
                ),
                FixtureCell::Number(number) => format!(r#"<c r="{reference}"><v>{number}</v></c>"#),
                FixtureCell::Date(serial) => format!(r#"<c r="{reference}" s="1"><v>{serial}</v></c>"#),
                FixtureCell::Bool(flag) => format!(r#"<c r="{reference}" t="b"><v>{}</v></c>"#, *flag as u8),
                FixtureCell::Error(code) => format!(r#"<c r="{reference}" t="e"><v>{}</v></c>"#, escape(*code)),
            };
            xml.push_str(&content);
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}
