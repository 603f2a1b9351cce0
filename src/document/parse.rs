use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Block, OutputFormat, StructuredDocument};
use crate::error::MinerError;

/// Flattens a persisted document back into plain text for keyword scoring.
pub struct DocumentParser;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    /// `source` attribute of the root, when present.
    pub source: Option<String>,
    pub text: String,
}

impl DocumentParser {
    /// Paragraphs of `doc > main`, whitespace-normalised and joined with
    /// single spaces, plus the root's `source`.
    ///
    /// `Err(Parse)` means the input is not a well-formed document; a valid
    /// document without paragraphs yields empty text.
    pub fn parse_document(raw: &str, format: OutputFormat) -> Result<ParsedDocument, MinerError> {
        match format {
            OutputFormat::Xml => Self::parse_xml_document(raw),
            OutputFormat::Json => Self::parse_json_document(raw),
        }
    }

    #[cfg(test)]
    pub fn parse(raw: &str, format: OutputFormat) -> Result<String, MinerError> {
        Self::parse_document(raw, format).map(|doc| doc.text)
    }

    #[cfg(test)]
    pub fn parse_xml(raw: &str) -> Result<String, MinerError> {
        Self::parse_xml_document(raw).map(|doc| doc.text)
    }

    #[cfg(test)]
    pub fn parse_json(raw: &str) -> Result<String, MinerError> {
        Self::parse_json_document(raw).map(|doc| doc.text)
    }

    fn parse_xml_document(raw: &str) -> Result<ParsedDocument, MinerError> {
        let mut reader = Reader::from_str(raw);
        let mut stack: Vec<String> = Vec::new();
        let mut saw_root = false;
        let mut current: Option<String> = None;
        let mut paragraphs = Vec::new();
        let mut source = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if stack.is_empty() {
                        if saw_root {
                            return Err(syntax_error("multiple root elements"));
                        }
                        saw_root = true;
                        source = root_source(&e)?;
                    }
                    stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                    if is_main_paragraph(&stack) {
                        current = Some(String::new());
                    }
                }
                Ok(Event::Empty(e)) => {
                    if stack.is_empty() {
                        if saw_root {
                            return Err(syntax_error("multiple root elements"));
                        }
                        saw_root = true;
                        source = root_source(&e)?;
                    }
                }
                Ok(Event::End(_)) => {
                    if is_main_paragraph(&stack) {
                        if let Some(text) = current.take() {
                            paragraphs.push(text);
                        }
                    }
                    stack.pop();
                }
                Ok(Event::Text(t)) => {
                    if let Some(buf) = current.as_mut() {
                        let text = t
                            .unescape()
                            .map_err(|e| syntax_error(&e.to_string()))?;
                        buf.push_str(&text);
                    } else if stack.is_empty() && !t.iter().all(u8::is_ascii_whitespace) {
                        return Err(syntax_error("text outside the root element"));
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(buf) = current.as_mut() {
                        buf.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(syntax_error(&format!(
                        "{} at position {}",
                        e,
                        reader.buffer_position()
                    )))
                }
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(syntax_error(&format!("unclosed element <{}>", stack.join("><"))));
        }
        if !saw_root {
            return Err(syntax_error("no root element"));
        }

        Ok(ParsedDocument {
            source,
            text: join_paragraphs(paragraphs),
        })
    }

    fn parse_json_document(raw: &str) -> Result<ParsedDocument, MinerError> {
        let doc: StructuredDocument =
            serde_json::from_str(raw).map_err(|e| syntax_error(&e.to_string()))?;
        let paragraphs = doc
            .main
            .iter()
            .filter(|b| matches!(b, Block::Paragraph { .. }))
            .map(Block::text);
        Ok(ParsedDocument {
            text: join_paragraphs(paragraphs),
            source: Some(doc.meta.source).filter(|s| !s.is_empty()),
        })
    }
}

fn root_source(root: &BytesStart<'_>) -> Result<Option<String>, MinerError> {
    if root.name().as_ref() != b"doc" {
        return Ok(None);
    }
    let attr = root
        .try_get_attribute("source")
        .map_err(|e| syntax_error(&e.to_string()))?;
    match attr {
        Some(a) => {
            let value = a
                .unescape_value()
                .map_err(|e| syntax_error(&e.to_string()))?;
            Ok(Some(value.into_owned()).filter(|s| !s.is_empty()))
        }
        None => Ok(None),
    }
}

fn syntax_error(detail: &str) -> MinerError {
    MinerError::Parse(format!("syntax error: {}", detail))
}

fn is_main_paragraph(stack: &[String]) -> bool {
    matches!(stack, [doc, main, p] if doc == "doc" && main == "main" && p == "p")
}

fn join_paragraphs<I: IntoIterator<Item = String>>(paragraphs: I) -> String {
    paragraphs
        .into_iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
