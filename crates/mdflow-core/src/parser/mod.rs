//! Markdown workflow parser.
//!
//! Turns markdown text into a [`Document`]. The work is split in two passes:
//! `blocks::scan` builds a flat block sequence, then [`Walker`] visits the
//! blocks in order, opening sections on headings and routing lists to the
//! section-specific item parsers (variables, steps, metadata).
//!
//! Parsing is a pure function of the input text plus [`ParseOptions`]; the
//! only I/O is reading the file in [`Parser::read_source`].

mod blocks;
pub(crate) mod keywords;
mod links;
mod metadata;
mod steps;
mod variables;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use mdflow_types::config::ParseOptions;
use mdflow_types::document::{
    Document, Metadata, ParseWarning, Section, SectionKind, Step, Variable,
};
use mdflow_types::error::{ParseError, ParseErrorKind};

use crate::hash::ContentHasher;
use blocks::{Block, Deadline, SourceLine};

/// Nesting limit used by [`looks_like_workflow`], which ignores options.
const PROBE_NESTING_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Parse context
// ---------------------------------------------------------------------------

/// Per-parse state shared by the section item parsers.
pub(crate) struct ParseContext<'a> {
    pub options: &'a ParseOptions,
    pub deadline: Deadline,
    pub warnings: Vec<ParseWarning>,
}

impl<'a> ParseContext<'a> {
    pub fn new(options: &'a ParseOptions, deadline: Deadline) -> Self {
        Self {
            options,
            deadline,
            warnings: Vec::new(),
        }
    }

    /// Report a problem that is fatal in strict mode and a warning otherwise.
    pub fn recoverable(&mut self, error: ParseError) -> Result<(), ParseError> {
        if self.options.strict {
            return Err(error);
        }
        self.warn(error.location.line, error.kind.to_string());
        Ok(())
    }

    /// Record a warning that never fails the parse.
    pub fn warn(&mut self, line: Option<usize>, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(line = ?line, message = %message, "parse warning");
        self.warnings.push(ParseWarning::new(line, message));
    }
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

fn flatten(items: &[blocks::ListItem]) -> Vec<SourceLine> {
    items.iter().flat_map(|item| item.as_lines()).collect()
}

fn qualifier(title: &str) -> Option<String> {
    let open = title.find('(')?;
    let close = title.rfind(')')?;
    (close > open + 1).then(|| title[open + 1..close].trim().to_string())
}

/// Visits top-level blocks in order and assembles the document parts.
#[derive(Default)]
struct Walker {
    metadata: Metadata,
    sections: Vec<Section>,
    variables: Vec<Variable>,
    steps: Vec<Step>,
    /// Kind of the innermost open section; `None` before the first section.
    current: Option<SectionKind>,
    /// Step opened by an H3+ heading inside Steps, still collecting key lines.
    heading_step: Option<Step>,
    title_seen: bool,
}

impl Walker {
    fn close_step(&mut self) {
        if let Some(step) = self.heading_step.take() {
            self.steps.push(step);
        }
    }

    fn append_description(&mut self, lines: &[SourceLine]) {
        let text = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        match &mut self.metadata.description {
            Some(existing) => {
                existing.push_str("\n\n");
                existing.push_str(&text);
            }
            None => self.metadata.description = Some(text),
        }
    }

    fn heading(&mut self, level: u8, text: &str, line: usize) {
        self.close_step();

        if level == 1 && !self.title_seen {
            self.metadata.title = keywords::strip_title_prefix(text).to_string();
            self.title_seen = true;
            self.current = None;
            return;
        }

        let kind = keywords::section_kind(text);
        if level >= 3 && self.current == Some(SectionKind::Steps) && kind == SectionKind::Unknown {
            let mut step = Step::named(steps::clean_title(text), self.steps.len() + 1);
            step.line = line;
            self.heading_step = Some(step);
            return;
        }

        let mut attributes = BTreeMap::new();
        if let Some(q) = qualifier(text) {
            attributes.insert("qualifier".to_string(), q);
        }
        self.sections.push(Section {
            kind,
            title: text.to_string(),
            level,
            order: self.sections.len(),
            line,
            content: String::new(),
            attributes,
        });
        self.current = Some(kind);
    }

    fn block(&mut self, block: &Block, ctx: &mut ParseContext<'_>) -> Result<(), ParseError> {
        match block {
            Block::Heading { level, text, line } => self.heading(*level, text, *line),
            Block::List { items, .. } => {
                if let Some(step) = self.heading_step.as_mut() {
                    steps::apply_key_lines(step, &flatten(items), ctx)?;
                    return Ok(());
                }
                match self.current {
                    Some(SectionKind::Variables) => {
                        variables::parse_items(items, ctx, &mut self.variables)?;
                    }
                    Some(SectionKind::Steps) => steps::parse_items(items, ctx, &mut self.steps)?,
                    Some(SectionKind::Metadata) => {
                        metadata::apply_lines(&mut self.metadata, &flatten(items), ctx)?;
                    }
                    _ => {}
                }
            }
            Block::Paragraph { lines, .. } => {
                if let Some(step) = self.heading_step.as_mut() {
                    steps::apply_key_lines(step, lines, ctx)?;
                    return Ok(());
                }
                match self.current {
                    Some(SectionKind::Metadata) => {
                        metadata::apply_lines(&mut self.metadata, lines, ctx)?;
                    }
                    Some(SectionKind::Description) => self.append_description(lines),
                    // Preamble prose under the title doubles as the description.
                    None if self.title_seen && self.metadata.description.is_none() => {
                        if !lines.iter().all(|l| metadata::is_key_value(&l.text)) {
                            self.append_description(lines);
                        }
                    }
                    _ => {}
                }
            }
            Block::Code { body, .. } => {
                if let Some(step) = self.heading_step.as_mut() {
                    steps::fill_command(step, body);
                }
            }
        }
        Ok(())
    }

    /// Fill each section's raw content from the source lines it spans.
    fn fill_section_content(&mut self, source_lines: &[&str]) {
        let starts: Vec<usize> = self.sections.iter().map(|s| s.line).collect();
        for (idx, section) in self.sections.iter_mut().enumerate() {
            let from = section.line.min(source_lines.len());
            let to = starts
                .get(idx + 1)
                .map_or(source_lines.len(), |next| next.saturating_sub(1))
                .max(from);
            section.content = source_lines[from..to].join("\n").trim().to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

fn io_error(error: &std::io::Error, path: &Path) -> ParseError {
    let kind = match error.kind() {
        std::io::ErrorKind::NotFound => ParseErrorKind::FileNotFound,
        _ => ParseErrorKind::Io(error.to_string()),
    };
    ParseError::new(kind).with_path(path)
}

/// Markdown workflow parser.
///
/// Cheap to clone; safe to share between threads.
#[derive(Clone)]
pub struct Parser {
    options: ParseOptions,
    hasher: Arc<dyn ContentHasher>,
}

impl Parser {
    pub fn new(hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            options: ParseOptions::default(),
            hasher,
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Parse in-memory content with no source path.
    pub fn parse(&self, content: &str) -> Result<Document, ParseError> {
        self.parse_source(content, None)
    }

    /// Read and parse a file, enforcing the size limit before reading it.
    pub fn parse_file(&self, path: &Path) -> Result<Document, ParseError> {
        let content = self.read_source(path)?;
        self.parse_source(&content, Some(path))
    }

    /// Read a source file as UTF-8, enforcing the size limit before reading it.
    pub fn read_source(&self, path: &Path) -> Result<String, ParseError> {
        let meta = std::fs::metadata(path).map_err(|e| io_error(&e, path))?;
        if meta.len() > self.options.max_file_size {
            return Err(ParseError::new(ParseErrorKind::FileTooLarge {
                size: meta.len(),
                limit: self.options.max_file_size,
            })
            .with_path(path));
        }
        let bytes = std::fs::read(path).map_err(|e| io_error(&e, path))?;
        let content = String::from_utf8(bytes).map_err(|e| {
            let valid = e.utf8_error().valid_up_to();
            let line = e.as_bytes()[..valid].iter().filter(|&&b| b == b'\n').count() + 1;
            ParseError::new(ParseErrorKind::Encoding(e.utf8_error().to_string()))
                .with_path(path)
                .at_line(line, "")
        })?;
        Ok(content)
    }

    /// Parse content, attributing errors and link checks to `source`.
    pub fn parse_source(&self, content: &str, source: Option<&Path>) -> Result<Document, ParseError> {
        self.parse_inner(content, source).map_err(|e| match source {
            Some(path) if e.location.path.is_none() => e.with_path(path),
            _ => e,
        })
    }

    fn parse_inner(&self, content: &str, source: Option<&Path>) -> Result<Document, ParseError> {
        let options = &self.options;
        let size = content.len() as u64;
        if size > options.max_file_size {
            return Err(ParseError::new(ParseErrorKind::FileTooLarge {
                size,
                limit: options.max_file_size,
            }));
        }

        let deadline = if options.timeout_ms == 0 {
            Deadline::unbounded()
        } else {
            Deadline::new(options.timeout())
        };
        let mut ctx = ParseContext::new(options, deadline);

        let text = content.strip_prefix('\u{feff}').unwrap_or(content);
        let blocks = blocks::scan(text, options.max_nesting_depth, &ctx.deadline)?;

        let mut walker = Walker::default();
        for block in &blocks {
            ctx.deadline.check()?;
            walker.block(block, &mut ctx)?;
        }
        walker.close_step();
        let source_lines: Vec<&str> = text.lines().collect();
        walker.fill_section_content(&source_lines);

        if options.strict {
            if !walker.sections.iter().any(|s| s.kind != SectionKind::Unknown) {
                return Err(ParseError::new(ParseErrorKind::NoRecognisedSections));
            }
            if !walker.sections.iter().any(|s| s.kind == SectionKind::Steps) {
                return Err(ParseError::new(ParseErrorKind::MissingSection(
                    SectionKind::Steps,
                )));
            }
        }

        if options.placeholders {
            for step in &walker.steps {
                steps::check_placeholders(step, &mut ctx)?;
            }
        }

        if options.validate_links {
            match source {
                Some(path) => links::check(text, &walker.steps, path, &mut ctx)?,
                None => tracing::debug!("skipping link validation for in-memory content"),
            }
        }

        let document = Document {
            source: source.map(Path::to_path_buf),
            raw: content.to_string(),
            content_hash: self.hasher.compute_hash(content),
            parsed_at: Utc::now(),
            metadata: walker.metadata,
            sections: walker.sections,
            variables: walker.variables,
            steps: walker.steps,
            warnings: ctx.warnings,
        };

        tracing::debug!(
            title = %document.metadata.title,
            sections = document.sections.len(),
            variables = document.variables.len(),
            steps = document.steps.len(),
            warnings = document.warnings.len(),
            "parsed workflow document"
        );
        Ok(document)
    }
}

/// Cheap shape check: does `content` look like a workflow document at all?
///
/// True for an H1 with a `Workflow:` style prefix, or a recognised Steps
/// heading followed directly by a list or a deeper heading.
pub fn looks_like_workflow(content: &str) -> bool {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Ok(blocks) = blocks::scan(content, PROBE_NESTING_DEPTH, &Deadline::unbounded()) else {
        return false;
    };
    blocks.iter().enumerate().any(|(idx, block)| match block {
        Block::Heading { level: 1, text, .. } if keywords::has_title_prefix(text) => true,
        Block::Heading { level, text, .. }
            if keywords::section_kind(text) == SectionKind::Steps =>
        {
            match blocks.get(idx + 1) {
                Some(Block::List { .. }) => true,
                Some(Block::Heading { level: next, .. }) => next > level,
                _ => false,
            }
        }
        _ => false,
    })
}
