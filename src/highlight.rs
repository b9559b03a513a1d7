use regex::Regex;
use serde::Serialize;
use std::ops::Range;
use std::sync::OnceLock;

/// Result of looking for a citation quote inside a piece of document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight<'a> {
    Unmarked(&'a str),
    Marked {
        before: &'a str,
        marked: &'a str,
        after: &'a str,
    },
}

impl<'a> Highlight<'a> {
    pub fn is_marked(&self) -> bool {
        matches!(self, Highlight::Marked { .. })
    }

    pub fn marked(&self) -> Option<&'a str> {
        match self {
            Highlight::Marked { marked, .. } => Some(marked),
            Highlight::Unmarked(_) => None,
        }
    }
}

/// Mark the span of `text` that best matches `quote`.
///
/// Falls back to [`Highlight::Unmarked`] when the quote cannot be found, which
/// is a normal outcome for paraphrased or re-transcribed quotes.
pub fn highlight<'a>(text: &'a str, quote: &str) -> Highlight<'a> {
    match find_span(text, quote) {
        Some(span) => Highlight::Marked {
            before: &text[..span.start],
            marked: &text[span.clone()],
            after: &text[span.end..],
        },
        None => Highlight::Unmarked(text),
    }
}

/// Byte range of `quote` inside `text`: exact match first, then a match on
/// lower-cased, punctuation-free, whitespace-collapsed forms of both.
pub fn find_span(text: &str, quote: &str) -> Option<Range<usize>> {
    if quote.is_empty() {
        return None;
    }
    if let Some(start) = text.find(quote) {
        return Some(start..start + quote.len());
    }

    let needle = Normalized::new(quote);
    let needle = needle.text.trim();
    if needle.is_empty() {
        return None;
    }

    let haystack = Normalized::new(text);
    let start = haystack.text.find(needle)?;
    haystack.original_range(start, start + needle.len())
}

/// Lower-cased text with punctuation removed and whitespace runs collapsed,
/// plus the original byte range behind every normalized character.
struct Normalized {
    text: String,
    // (byte offset in `text`, original byte range)
    offsets: Vec<(usize, Range<usize>)>,
}

impl Normalized {
    fn new(original: &str) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut offsets = Vec::with_capacity(original.len());
        let mut last_was_space = false;

        for (pos, ch) in original.char_indices() {
            let source = pos..pos + ch.len_utf8();
            if ch.is_whitespace() {
                // Dropped punctuation between two spaces still collapses them.
                if !last_was_space {
                    offsets.push((text.len(), source));
                    text.push(' ');
                    last_was_space = true;
                }
            } else if ch.is_alphanumeric() {
                for lower in ch.to_lowercase() {
                    offsets.push((text.len(), source.clone()));
                    text.push(lower);
                }
                last_was_space = false;
            }
        }

        Self { text, offsets }
    }

    /// Map a normalized byte range back onto the original text.
    fn original_range(&self, start: usize, end: usize) -> Option<Range<usize>> {
        let first = self
            .offsets
            .binary_search_by_key(&start, |(offset, _)| *offset)
            .ok()?;
        let last = self.offsets.partition_point(|(offset, _)| *offset < end);
        let (_, first_range) = &self.offsets[first];
        let (_, last_range) = self.offsets.get(last.checked_sub(1)?)?;
        Some(first_range.start..last_range.end)
    }
}

/// One block of a document as shown in the document panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSection {
    pub speaker: Option<String>,
    pub paragraphs: Vec<String>,
}

fn speaker_line() -> &'static Regex {
    static SPEAKER: OnceLock<Regex> = OnceLock::new();
    SPEAKER.get_or_init(|| Regex::new(r"^([^:]+):\s*(.*)$").expect("valid speaker regex"))
}

/// Split transcript-style content into speaker sections. Any line containing a
/// colon opens a new section named by the text before the colon; lines before
/// the first such line form an unnamed section.
pub fn split_sections(content: &str) -> Vec<DocumentSection> {
    let mut sections: Vec<DocumentSection> = Vec::new();
    let mut current = DocumentSection {
        speaker: None,
        paragraphs: Vec::new(),
    };

    for line in content.lines() {
        if let Some(caps) = speaker_line().captures(line) {
            if current.speaker.is_some() || !current.paragraphs.is_empty() {
                sections.push(current);
            }
            let first = caps[2].trim();
            current = DocumentSection {
                speaker: Some(caps[1].trim().to_string()),
                paragraphs: if first.is_empty() {
                    Vec::new()
                } else {
                    vec![first.to_string()]
                },
            };
        } else if !line.trim().is_empty() {
            current.paragraphs.push(line.trim().to_string());
        }
    }

    if current.speaker.is_some() || !current.paragraphs.is_empty() {
        sections.push(current);
    }
    sections
}

/// A paragraph with the byte range of the cited quote, if it occurs there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkedParagraph {
    pub text: String,
    pub mark: Option<Range<usize>>,
}

impl MarkedParagraph {
    pub fn highlight(&self) -> Highlight<'_> {
        match &self.mark {
            Some(span) => Highlight::Marked {
                before: &self.text[..span.start],
                marked: &self.text[span.clone()],
                after: &self.text[span.end..],
            },
            None => Highlight::Unmarked(&self.text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkedSection {
    pub speaker: Option<String>,
    pub paragraphs: Vec<MarkedParagraph>,
}

/// [`split_sections`] with every paragraph checked against `quote`.
pub fn mark_sections(content: &str, quote: Option<&str>) -> Vec<MarkedSection> {
    split_sections(content)
        .into_iter()
        .map(|section| MarkedSection {
            speaker: section.speaker,
            paragraphs: section
                .paragraphs
                .into_iter()
                .map(|text| {
                    let mark = quote.and_then(|quote| find_span(&text, quote));
                    MarkedParagraph { text, mark }
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exact_match_round_trip() {
        let text = "Operator: Welcome. Revenue grew 10%, year over year. Thanks.";
        let quote = "Revenue grew 10%, year over year.";
        let span = find_span(text, quote).unwrap();
        assert_eq!(&text[span], quote);
    }

    #[test]
    fn test_exact_match_is_case_sensitive_before_fallback() {
        let text = "Margins were STABLE in Q1.";
        let span = find_span(text, "margins were stable").unwrap();
        assert_eq!(&text[span], "Margins were STABLE");
    }

    #[test]
    fn test_normalized_match_maps_back_to_original() {
        let text = "Revenue grew 10%, year over year.";
        let result = highlight(text, "revenue grew 10 year over year");
        assert_eq!(result.marked(), Some("Revenue grew 10%, year over year"));
        match result {
            Highlight::Marked { before, after, .. } => {
                assert_eq!(before, "");
                assert_eq!(after, ".");
            }
            Highlight::Unmarked(_) => panic!("expected a match"),
        }
    }

    #[test]
    fn test_tolerates_whitespace_and_smart_quotes() {
        let text = "CEO said:  \u{201c}we   expect   growth\u{201d} next year.";
        let span = find_span(text, "\"we expect growth\"").unwrap();
        assert_eq!(&text[span], "we   expect   growth");
    }

    #[test]
    fn test_no_match_returns_text_unmarked() {
        let paragraph = "Gross margin was flat.";
        assert_eq!(
            highlight(paragraph, "completely unrelated phrase"),
            Highlight::Unmarked(paragraph)
        );
    }

    #[test]
    fn test_empty_or_punctuation_quote_never_matches() {
        assert_eq!(find_span("anything", ""), None);
        assert_eq!(find_span("anything", "..."), None);
    }

    #[test]
    fn test_multibyte_text_offsets_stay_on_char_boundaries() {
        let text = "Umsatz stieg – laut CFO – um 5 %, ÜBERRASCHEND.";
        let span = find_span(text, "laut cfo um 5 überraschend").unwrap();
        assert_eq!(&text[span], "laut CFO – um 5 %, ÜBERRASCHEND");
    }

    #[test]
    fn test_split_sections_by_speaker() {
        let content = "Earnings call transcript\n\nOperator: Good morning.\nPlease hold.\nJane Doe: Revenue grew.\n\nWe are pleased.";
        let sections = split_sections(content);
        assert_eq!(
            sections,
            vec![
                DocumentSection {
                    speaker: None,
                    paragraphs: vec!["Earnings call transcript".into()],
                },
                DocumentSection {
                    speaker: Some("Operator".into()),
                    paragraphs: vec!["Good morning.".into(), "Please hold.".into()],
                },
                DocumentSection {
                    speaker: Some("Jane Doe".into()),
                    paragraphs: vec!["Revenue grew.".into(), "We are pleased.".into()],
                },
            ]
        );
    }

    #[test]
    fn test_mark_sections_marks_only_matching_paragraphs() {
        let content = "Operator: Welcome to the call.\nCFO: Revenue grew 10%, year over year.\nMargins held.";
        let sections = mark_sections(content, Some("revenue grew 10 year over year"));
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].paragraphs[0].mark, None);
        assert_eq!(
            sections[1].paragraphs[0].highlight().marked(),
            Some("Revenue grew 10%, year over year")
        );
        assert_eq!(sections[1].paragraphs[1].mark, None);

        let plain = mark_sections(content, None);
        assert!(plain
            .iter()
            .flat_map(|section| &section.paragraphs)
            .all(|paragraph| !paragraph.highlight().is_marked()));
    }
}
