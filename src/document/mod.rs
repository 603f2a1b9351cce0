pub mod parse;

use anyhow::Result;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

/// Serialization shape of a persisted document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Xml,
    Json,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 2] = [OutputFormat::Xml, OutputFormat::Json];

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Xml => "xml",
            OutputFormat::Json => "json",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "xml" => Some(OutputFormat::Xml),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Inline {
    Text { text: String },
    Link { target: String, text: String },
}

impl Inline {
    pub fn text(&self) -> &str {
        match self {
            Inline::Text { text } | Inline::Link { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Block {
    Head { level: u8, content: Vec<Inline> },
    Paragraph { content: Vec<Inline> },
    List { items: Vec<Vec<Inline>> },
    Quote { content: Vec<Inline> },
}

impl Block {
    #[cfg(test)]
    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph {
            content: vec![Inline::Text { text: text.into() }],
        }
    }

    /// Plain text of the block, inline runs concatenated as written.
    pub fn text(&self) -> String {
        match self {
            Block::Head { content, .. } | Block::Paragraph { content } | Block::Quote { content } => {
                inline_text(content)
            }
            Block::List { items } => items
                .iter()
                .map(|item| inline_text(item))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

pub fn inline_text(content: &[Inline]) -> String {
    content.iter().map(Inline::text).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub source: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

/// Boilerplate-free page content: an ordered `main` body plus optional
/// reader comments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub meta: DocumentMeta,
    pub main: Vec<Block>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Block>,
}

impl StructuredDocument {
    /// Paragraph texts of the main body, in order.
    #[cfg(test)]
    pub fn paragraphs(&self) -> Vec<String> {
        self.main
            .iter()
            .filter(|b| matches!(b, Block::Paragraph { .. }))
            .map(Block::text)
            .collect()
    }

    pub fn serialize(&self) -> Result<String> {
        match self.meta.format {
            OutputFormat::Xml => self.to_xml(),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());

        let meta = &self.meta;
        let mut root = BytesStart::new("doc");
        root.push_attribute(("source", meta.source.as_str()));
        root.push_attribute(("hostname", meta.hostname.as_str()));
        let optional = [
            ("title", &meta.title),
            ("sitename", &meta.sitename),
            ("description", &meta.description),
            ("language", &meta.language),
            ("fetched", &meta.fetched),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                root.push_attribute((key, v.as_str()));
            }
        }
        root.push_attribute(("format", meta.format.extension()));

        writer.write_event(Event::Start(root))?;
        write_section(&mut writer, "main", &self.main)?;
        if !self.comments.is_empty() {
            write_section(&mut writer, "comments", &self.comments)?;
        }
        newline(&mut writer)?;
        writer.write_event(Event::End(BytesEnd::new("doc")))?;
        newline(&mut writer)?;

        Ok(String::from_utf8(writer.into_inner())?)
    }
}

fn newline(writer: &mut Writer<Vec<u8>>) -> Result<()> {
    writer.write_event(Event::Text(BytesText::new("\n")))?;
    Ok(())
}

fn write_section(writer: &mut Writer<Vec<u8>>, name: &str, blocks: &[Block]) -> Result<()> {
    newline(writer)?;
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    for block in blocks {
        newline(writer)?;
        match block {
            Block::Head { level, content } => {
                let rend = format!("h{}", level);
                let mut start = BytesStart::new("head");
                start.push_attribute(("rend", rend.as_str()));
                write_inline_element(writer, start, content)?;
            }
            Block::Paragraph { content } => {
                write_inline_element(writer, BytesStart::new("p"), content)?;
            }
            Block::Quote { content } => {
                write_inline_element(writer, BytesStart::new("quote"), content)?;
            }
            Block::List { items } => {
                writer.write_event(Event::Start(BytesStart::new("list")))?;
                for item in items {
                    write_inline_element(writer, BytesStart::new("item"), item)?;
                }
                writer.write_event(Event::End(BytesEnd::new("list")))?;
            }
        }
    }
    newline(writer)?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_inline_element(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    content: &[Inline],
) -> Result<()> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    for inline in content {
        match inline {
            Inline::Text { text } => {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            Inline::Link { target, text } => {
                let mut r = BytesStart::new("ref");
                r.push_attribute(("target", target.as_str()));
                writer.write_event(Event::Start(r))?;
                writer.write_event(Event::Text(BytesText::new(text)))?;
                writer.write_event(Event::End(BytesEnd::new("ref")))?;
            }
        }
    }
    writer.write_event(Event::End(end))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample() -> StructuredDocument {
        StructuredDocument {
            meta: DocumentMeta {
                source: "https://example.com/a".into(),
                hostname: "example.com".into(),
                title: Some("Fish & Chips <daily>".into()),
                ..Default::default()
            },
            main: vec![
                Block::Head {
                    level: 2,
                    content: vec![Inline::Text { text: "Intro".into() }],
                },
                Block::Paragraph {
                    content: vec![
                        Inline::Text { text: "Hello ".into() },
                        Inline::Link {
                            target: "https://example.com/w?a=1&b=2".into(),
                            text: "world".into(),
                        },
                        Inline::Text { text: ".".into() },
                    ],
                },
                Block::List {
                    items: vec![vec![Inline::Text { text: "one".into() }]],
                },
                Block::paragraph("Second paragraph."),
            ],
            comments: vec![Block::paragraph("Nice post")],
        }
    }

    #[test]
    fn xml_has_expected_shape() {
        let xml = sample().to_xml().unwrap();
        assert!(xml.starts_with("<doc source=\"https://example.com/a\""));
        assert!(xml.contains("title=\"Fish &amp; Chips &lt;daily&gt;\""));
        assert!(xml.contains("<head rend=\"h2\">Intro</head>"));
        assert!(xml.contains(
            "<p>Hello <ref target=\"https://example.com/w?a=1&amp;b=2\">world</ref>.</p>"
        ));
        assert!(xml.contains("<list><item>one</item></list>"));
        assert!(xml.contains("<comments>"));
        assert!(xml.contains("format=\"xml\""));
    }

    #[test]
    fn comments_section_omitted_when_empty() {
        let mut doc = sample();
        doc.comments.clear();
        let xml = doc.to_xml().unwrap();
        assert!(!xml.contains("<comments>"));
    }

    #[test]
    fn paragraphs_skip_other_blocks() {
        assert_eq!(sample().paragraphs(), vec!["Hello world.", "Second paragraph."]);
    }

    #[test]
    fn json_serialization_follows_format_tag() {
        let mut doc = sample();
        doc.meta.format = OutputFormat::Json;
        let json = doc.serialize().unwrap();
        let back: StructuredDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
