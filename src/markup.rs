//! Parsing of assistant text for display: inline citation markers and the
//! `<facts>` / `<thinking>` / `<action>` blocks some prompts produce.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::citations::{CitationRecord, CitationRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    /// A citation marker. `record` is `None` when the id is not (yet) known;
    /// the marker still gets a number so later resolution does not renumber.
    Citation {
        id: &'a str,
        number: usize,
        record: Option<CitationRecord>,
    },
}

fn citation_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r#"<citation\s+id=["']([^"']+)["']\s*/?>(?:\s*</citation>)?"#)
            .expect("valid citation regex")
    })
}

/// Split `text` at citation markers, numbering each cited id on first sight.
pub fn segments<'a>(text: &'a str, registry: &mut CitationRegistry) -> Vec<Segment<'a>> {
    let mut out = Vec::new();
    let mut last = 0;

    for caps in citation_marker().captures_iter(text) {
        let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            out.push(Segment::Text(&text[last..whole.start()]));
        }
        let id = id.as_str();
        out.push(Segment::Citation {
            id,
            number: registry.display_number(id),
            record: registry.resolve(id).cloned(),
        });
        last = whole.end();
    }

    if last < text.len() {
        out.push(Segment::Text(&text[last..]));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Text,
    Facts,
    Thinking,
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub kind: SectionKind,
    pub content: String,
}

impl Section {
    fn new(kind: SectionKind) -> Self {
        Self {
            kind,
            content: String::new(),
        }
    }
}

fn opening_tag(line: &str) -> Option<SectionKind> {
    if line.starts_with("<facts>") {
        Some(SectionKind::Facts)
    } else if line.starts_with("<thinking>") {
        Some(SectionKind::Thinking)
    } else if line.starts_with("<action>") {
        Some(SectionKind::Action)
    } else {
        None
    }
}

fn is_closing_tag(line: &str) -> bool {
    ["</facts>", "</thinking>", "</action>"]
        .iter()
        .any(|tag| line.starts_with(tag))
}

/// Split streamed text into sections. Tags only count at the start of a line
/// and the remainder of a tag line is dropped. Lines inside a tagged block
/// keep their trailing newline; plain text lines are joined with `\n`.
/// Works on partial input: an unterminated block is returned as is.
pub fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section::new(SectionKind::Text);

    let mut flush = |current: &mut Section, next: SectionKind| {
        let done = std::mem::replace(current, Section::new(next));
        if !done.content.is_empty() {
            sections.push(done);
        }
    };

    for line in text.split('\n') {
        if let Some(kind) = opening_tag(line) {
            flush(&mut current, kind);
        } else if is_closing_tag(line) {
            flush(&mut current, SectionKind::Text);
        } else if current.kind == SectionKind::Text {
            if !current.content.is_empty() {
                current.content.push('\n');
            }
            current.content.push_str(line);
        } else {
            current.content.push_str(line);
            current.content.push('\n');
        }
    }

    flush(&mut current, SectionKind::Text);
    sections
}
