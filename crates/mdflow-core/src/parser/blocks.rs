//! Line-oriented markdown block scanner.
//!
//! Produces a flat sequence of top-level blocks (headings, lists, paragraphs,
//! fenced code). List items keep their indented child lines verbatim so the
//! section-specific item parsers can interpret key lines and nested
//! `Parameters:` blocks themselves.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use mdflow_types::error::{ParseError, ParseErrorKind};
use regex::Regex;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})(?:[ \t]+(.*?))?[ \t#]*$").expect("valid regex"));

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*+]|(\d{1,9})[.)])(?:[ \t]+(.*))?$").expect("valid regex"));

/// Lines are checked against the deadline in batches of this size.
const DEADLINE_STRIDE: usize = 64;

// ---------------------------------------------------------------------------
// Block tree
// ---------------------------------------------------------------------------

/// One physical source line with its indentation measured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceLine {
    /// 1-based line number.
    pub number: usize,
    /// Leading whitespace width (tabs count as 4).
    pub indent: usize,
    /// Line content with leading whitespace removed.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListItem {
    pub line: usize,
    pub indent: usize,
    /// Number of an ordered marker (`3.` -> 3).
    pub ordinal: Option<usize>,
    /// Text after the marker on the first line.
    pub text: String,
    /// Following lines that belong to this item.
    pub children: Vec<SourceLine>,
}

impl ListItem {
    /// The item's first line plus its children, as plain source lines.
    pub fn as_lines(&self) -> Vec<SourceLine> {
        let mut lines = Vec::with_capacity(self.children.len() + 1);
        lines.push(SourceLine {
            number: self.line,
            indent: self.indent,
            text: self.text.clone(),
        });
        lines.extend(self.children.iter().cloned());
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Block {
    Heading { level: u8, text: String, line: usize },
    List { items: Vec<ListItem>, line: usize },
    Paragraph { lines: Vec<SourceLine>, line: usize },
    Code { info: String, body: String, line: usize },
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// Wall-clock budget shared by the scanner and the section walker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
        }
    }

    pub fn check(&self) -> Result<(), ParseError> {
        match self.limit {
            Some(limit) if self.started.elapsed() > limit => {
                Err(ParseError::new(ParseErrorKind::Timeout {
                    limit_ms: limit.as_millis() as u64,
                }))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

fn measure_indent(raw: &str) -> usize {
    let mut width = 0;
    for c in raw.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
    }
    width
}

fn is_fence(text: &str) -> Option<&'static str> {
    if text.starts_with("```") {
        Some("```")
    } else if text.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn heading(text: &str) -> Option<(u8, String)> {
    let caps = HEADING.captures(text)?;
    let level = caps.get(1)?.as_str().len() as u8;
    let title = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
    Some((level, title.to_string()))
}

fn list_marker(text: &str) -> Option<(Option<usize>, String)> {
    // A thematic break ("---", "***") is not a list item.
    if text.len() >= 3 && text.chars().all(|c| c == '-' || c == '*' || c == ' ') {
        return None;
    }
    let caps = LIST_MARKER.captures(text)?;
    let ordinal = caps.get(1).and_then(|m| m.as_str().parse().ok());
    let body = caps.get(2).map(|m| m.as_str().trim_end()).unwrap_or_default();
    Some((ordinal, body.to_string()))
}

struct Scanner<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    max_depth: usize,
    deadline: &'a Deadline,
}

impl<'a> Scanner<'a> {
    fn line(&self, idx: usize) -> (usize, &'a str) {
        let raw = self.lines[idx];
        (measure_indent(raw), raw.trim())
    }

    fn is_blank(&self, idx: usize) -> bool {
        self.lines[idx].trim().is_empty()
    }

    fn tick(&self) -> Result<(), ParseError> {
        if self.pos % DEADLINE_STRIDE == 0 {
            self.deadline.check()?;
        }
        Ok(())
    }

    fn run(mut self) -> Result<Vec<Block>, ParseError> {
        let mut blocks = Vec::new();
        while self.pos < self.lines.len() {
            self.tick()?;
            if self.is_blank(self.pos) {
                self.pos += 1;
                continue;
            }
            let (indent, text) = self.line(self.pos);
            let number = self.pos + 1;

            if indent <= 3 {
                if let Some(fence) = is_fence(text) {
                    blocks.push(self.code_block(fence, text, number)?);
                    continue;
                }
                if let Some((level, title)) = heading(text) {
                    blocks.push(Block::Heading {
                        level,
                        text: title,
                        line: number,
                    });
                    self.pos += 1;
                    continue;
                }
                if list_marker(text).is_some() {
                    blocks.push(self.list_block(indent)?);
                    continue;
                }
            }
            blocks.push(self.paragraph());
        }
        Ok(blocks)
    }

    fn code_block(&mut self, fence: &str, opening: &str, line: usize) -> Result<Block, ParseError> {
        let info = opening.trim_start_matches(fence).trim().to_string();
        let mut body = Vec::new();
        self.pos += 1;
        while self.pos < self.lines.len() {
            self.tick()?;
            let (_, text) = self.line(self.pos);
            self.pos += 1;
            if text.starts_with(fence) {
                break;
            }
            body.push(self.lines[self.pos - 1]);
        }
        Ok(Block::Code {
            info,
            body: body.join("\n"),
            line,
        })
    }

    fn paragraph(&mut self) -> Block {
        let line = self.pos + 1;
        let mut lines = Vec::new();
        while self.pos < self.lines.len() && !self.is_blank(self.pos) {
            let (indent, text) = self.line(self.pos);
            if !lines.is_empty()
                && indent <= 3
                && (heading(text).is_some() || is_fence(text).is_some() || list_marker(text).is_some())
            {
                break;
            }
            lines.push(SourceLine {
                number: self.pos + 1,
                indent,
                text: text.to_string(),
            });
            self.pos += 1;
        }
        Block::Paragraph { lines, line }
    }

    fn list_block(&mut self, base_indent: usize) -> Result<Block, ParseError> {
        let line = self.pos + 1;
        let mut items: Vec<ListItem> = Vec::new();
        // Marker indents of nested lists inside the current item.
        let mut nested: Vec<usize> = Vec::new();
        let mut previous_blank = false;

        while self.pos < self.lines.len() {
            self.tick()?;
            if self.is_blank(self.pos) {
                previous_blank = true;
                self.pos += 1;
                continue;
            }
            let (indent, text) = self.line(self.pos);
            let number = self.pos + 1;

            if indent <= base_indent + 1 {
                if let Some((ordinal, body)) = list_marker(text) {
                    nested.clear();
                    items.push(ListItem {
                        line: number,
                        indent,
                        ordinal,
                        text: body,
                        children: Vec::new(),
                    });
                    previous_blank = false;
                    self.pos += 1;
                    continue;
                }
                // Lazy continuation directly below an item; anything else ends the list.
                let lazy =
                    !previous_blank && heading(text).is_none() && is_fence(text).is_none();
                if !lazy {
                    break;
                }
            }

            let Some(item) = items.last_mut() else {
                break;
            };
            while nested.last().is_some_and(|&d| d >= indent) {
                nested.pop();
            }
            if list_marker(text).is_some() && indent > base_indent + 1 {
                nested.push(indent);
                let depth = nested.len() + 1;
                if depth > self.max_depth {
                    return Err(ParseError::new(ParseErrorKind::NestingTooDeep {
                        depth,
                        limit: self.max_depth,
                    })
                    .at_line(number, text));
                }
            }
            item.children.push(SourceLine {
                number,
                indent,
                text: text.to_string(),
            });
            previous_blank = false;
            self.pos += 1;
        }

        Ok(Block::List { items, line })
    }
}

/// Split `content` into top-level markdown blocks.
///
/// Fails when list nesting exceeds `max_depth` or the deadline passes.
pub(crate) fn scan(
    content: &str,
    max_depth: usize,
    deadline: &Deadline,
) -> Result<Vec<Block>, ParseError> {
    let scanner = Scanner {
        lines: content.lines().collect(),
        pos: 0,
        max_depth: max_depth.max(1),
        deadline,
    };
    scanner.run()
}
