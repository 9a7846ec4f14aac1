//! Text extraction for Word documents.
//!
//! A `.docx` file is a ZIP archive; the body lives in `word/document.xml`
//! as `w:p` paragraphs made of `w:t` text runs.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use super::DocumentError;

pub fn extract_text(path: &Path) -> Result<String, DocumentError> {
    let extraction = |reason: String| DocumentError::Extraction {
        path: path.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| extraction(format!("not a Word archive: {}", e)))?;

    let xml = read_document_xml(&mut archive).map_err(extraction)?;
    parse_document_xml(&xml).map_err(extraction)
}

fn read_document_xml<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<String, String> {
    let mut document = archive
        .by_name("word/document.xml")
        .map_err(|e| format!("Cannot find word/document.xml: {}", e))?;

    let mut xml = String::new();
    document.read_to_string(&mut xml).map_err(|e| e.to_string())?;
    Ok(xml)
}

/// Paragraphs are separated by blank lines so the splitter can cut between them.
pub fn parse_document_xml(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:p" => current.clear(),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" | b"w:cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let paragraph = current.trim();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e.unescape().map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {:?}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    Ok(paragraphs.join("\n\n"))
}
