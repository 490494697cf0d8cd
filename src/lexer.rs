use crate::config::TagConfig;
use crate::error::TokenizerError;
use crate::loader::{normalize, FsLoader, SourceLoader};
use crate::location::{line_text, SourceLocation};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Plain,
    Expression,
    For,
    EndFor,
    If,
    ElseIf,
    Else,
    EndIf,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenKind::Plain => "Plain",
            TokenKind::Expression => "Expression",
            TokenKind::For => "For",
            TokenKind::EndFor => "Efor",
            TokenKind::If => "If",
            TokenKind::ElseIf => "Else If",
            TokenKind::Else => "Else",
            TokenKind::EndIf => "Eif",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Inner text: untrimmed for `Plain`, trimmed for tags that carry an
    /// expression, `None` for `efor`, `else` and `eif`.
    pub value: Option<String>,
    pub location: SourceLocation,
}

impl Token {
    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

// Tried in order; `else if` must come before `else`.
const CONTROL_KEYWORDS: &[(&[&str], TokenKind)] = &[
    (&["for"], TokenKind::For),
    (&["efor"], TokenKind::EndFor),
    (&["if"], TokenKind::If),
    (&["else", "if"], TokenKind::ElseIf),
    (&["else"], TokenKind::Else),
    (&["eif"], TokenKind::EndIf),
];

pub const MAX_INCLUDE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Expression,
    Control,
    Include,
}

impl Tag {
    fn name(self) -> &'static str {
        match self {
            Tag::Expression => "expression",
            Tag::Control => "control",
            Tag::Include => "include",
        }
    }
}

static FS_LOADER: FsLoader = FsLoader;

/// Scans template text into tokens, splicing included files in place.
pub struct Tokenizer<'a> {
    input: &'a str,
    tags: &'a TagConfig,
    source_name: &'a str,
    loader: &'a dyn SourceLoader,
    // Files currently being tokenized, outermost first.
    include_stack: Vec<PathBuf>,
    cursor: usize,
    line: usize,
    line_start: usize,
    column: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str, tags: &'a TagConfig, source_name: &'a str) -> Self {
        Self {
            input,
            tags,
            source_name,
            loader: &FS_LOADER,
            include_stack: vec![normalize(Path::new(source_name))],
            cursor: 0,
            line: 1,
            line_start: 0,
            column: 1,
        }
    }

    pub fn with_loader(mut self, loader: &'a dyn SourceLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizerError> {
        let mut tokens = Vec::new();
        while self.cursor < self.input.len() {
            let location = self.location();
            let end = match self.classify() {
                None => {
                    let end = self.plain_end();
                    tokens.push(Token {
                        kind: TokenKind::Plain,
                        value: Some(self.input[self.cursor..end].to_string()),
                        location,
                    });
                    end
                }
                Some((tag, start_len)) => {
                    let (inner, end) = self.tag_body(tag, start_len, &location)?;
                    match tag {
                        Tag::Expression => tokens.push(Token {
                            kind: TokenKind::Expression,
                            value: Some(inner.trim().to_string()),
                            location,
                        }),
                        Tag::Control => tokens.push(self.control(inner, location)?),
                        Tag::Include => tokens.extend(self.include(inner.trim(), &location)?),
                    }
                    end
                }
            };
            self.advance_to(end);
        }
        trace!(file = self.source_name, tokens = tokens.len(), "tokenized");
        Ok(tokens)
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(
            self.source_name,
            self.line,
            self.column,
            line_text(self.input, self.line_start),
        )
    }

    fn advance_to(&mut self, end: usize) {
        let consumed = &self.input[self.cursor..end];
        match consumed.rfind('\n') {
            Some(last) => {
                self.line += consumed.matches('\n').count();
                self.line_start = self.cursor + last + 1;
                self.column = self.input[self.line_start..end].chars().count() + 1;
            }
            None => self.column += consumed.chars().count(),
        }
        self.cursor = end;
    }

    fn start_tags(&self) -> [(Tag, &'a str); 3] {
        [
            (Tag::Expression, self.tags.expression_start()),
            (Tag::Control, self.tags.control_start()),
            (Tag::Include, self.tags.include_start()),
        ]
    }

    fn end_tag(&self, tag: Tag) -> &'a str {
        match tag {
            Tag::Expression => self.tags.expression_end(),
            Tag::Control => self.tags.control_end(),
            Tag::Include => self.tags.include_end(),
        }
    }

    /// The tag starting at the cursor, if any: longest start tag wins, ties
    /// go to the earlier of expression, control, include.
    fn classify(&self) -> Option<(Tag, usize)> {
        let rest = &self.input[self.cursor..];
        let mut best: Option<(Tag, usize)> = None;
        for (tag, start) in self.start_tags() {
            if rest.starts_with(start) && best.map_or(true, |(_, len)| start.len() > len) {
                best = Some((tag, start.len()));
            }
        }
        best
    }

    fn plain_end(&self) -> usize {
        let rest = &self.input[self.cursor..];
        self.start_tags()
            .iter()
            .filter_map(|(_, start)| rest.find(start))
            .min()
            .map_or(self.input.len(), |offset| self.cursor + offset)
    }

    /// Text between the start tag at the cursor and its end tag, plus the
    /// offset just past the end tag.
    fn tag_body(
        &self,
        tag: Tag,
        start_len: usize,
        location: &SourceLocation,
    ) -> Result<(&'a str, usize), TokenizerError> {
        let body_start = self.cursor + start_len;
        let end_tag = self.end_tag(tag);
        match self.input[body_start..].find(end_tag) {
            Some(offset) => Ok((
                &self.input[body_start..body_start + offset],
                body_start + offset + end_tag.len(),
            )),
            None => Err(TokenizerError::new(
                format!("could not find {} end tag {}", tag.name(), end_tag),
                location.clone(),
            )),
        }
    }

    fn control(&self, inner: &str, location: SourceLocation) -> Result<Token, TokenizerError> {
        for (words, kind) in CONTROL_KEYWORDS {
            let rest = match match_keyword(inner.trim_start(), words) {
                Some(rest) => rest,
                None => continue,
            };
            let value = match kind {
                TokenKind::For | TokenKind::If | TokenKind::ElseIf => Some(rest.trim().to_string()),
                _ => {
                    if !rest.trim().is_empty() {
                        warn!(
                            file = self.source_name,
                            line = location.line,
                            "ignoring text after {} tag: {:?}",
                            kind,
                            rest.trim()
                        );
                    }
                    None
                }
            };
            return Ok(Token {
                kind: *kind,
                value,
                location,
            });
        }
        Err(TokenizerError::new("invalid control tag type", location))
    }

    fn include(&self, target: &str, location: &SourceLocation) -> Result<Vec<Token>, TokenizerError> {
        let base = Path::new(self.source_name).parent().unwrap_or(Path::new(""));
        let path = normalize(&base.join(target));
        let name = path.to_string_lossy().into_owned();

        if self.include_stack.contains(&path) {
            return Err(TokenizerError::new(
                format!("circular include of '{}'", name),
                location.clone(),
            ));
        }
        if self.include_stack.len() > MAX_INCLUDE_DEPTH {
            return Err(TokenizerError::new(
                format!("include depth limit of {} exceeded", MAX_INCLUDE_DEPTH),
                location.clone(),
            ));
        }

        let source = self.loader.load(&path).map_err(|err| {
            debug!(file = %name, error = %err, "include failed");
            TokenizerError::new(format!("could not open file '{}'", name), location.clone())
        })?;
        debug!(file = %name, from = self.source_name, "including file");

        let mut include_stack = self.include_stack.clone();
        include_stack.push(path);
        Tokenizer {
            input: &source,
            tags: self.tags,
            source_name: &name,
            loader: self.loader,
            include_stack,
            cursor: 0,
            line: 1,
            line_start: 0,
            column: 1,
        }
        .tokenize()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Match `words` (separated by any whitespace) at the start of `s`; returns
/// what follows. The last word must not run into an identifier, so `format`
/// is not `for`.
fn match_keyword<'s>(s: &'s str, words: &[&str]) -> Option<&'s str> {
    let mut rest = s;
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            let trimmed = rest.trim_start();
            if trimmed.len() == rest.len() {
                return None;
            }
            rest = trimmed;
        }
        rest = rest.strip_prefix(word)?;
    }
    match rest.chars().next() {
        Some(c) if is_word_char(c) => None,
        _ => Some(rest),
    }
}

/// Tokenize `source`, reading includes from disk relative to `source_name`.
pub fn tokenize(
    source: &str,
    tags: &TagConfig,
    source_name: &str,
) -> Result<Vec<Token>, TokenizerError> {
    Tokenizer::new(source, tags, source_name).tokenize()
}
