use crate::ast::Template;
use crate::config::{RepeatSpec, TagConfig};
use crate::context::Context;
use crate::error::Result;
use crate::eval::evaluate;
use crate::lexer::Tokenizer;
use crate::loader::{normalize, FsLoader, SourceLoader};
use crate::parser::parse;
use crate::repeat::{repeat, RenderedFile};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Tags, include loader and repeat specs for one run.
///
/// Every call tokenizes, parses and evaluates from scratch; nothing is cached
/// between templates.
pub struct Engine<L: SourceLoader = FsLoader> {
    tags: TagConfig,
    loader: L,
    repeats: HashMap<PathBuf, RepeatSpec>,
}

impl Default for Engine<FsLoader> {
    fn default() -> Self {
        Self::new(TagConfig::default())
    }
}

impl Engine<FsLoader> {
    pub fn new(tags: TagConfig) -> Self {
        Self::with_loader(tags, FsLoader)
    }
}

impl<L: SourceLoader> Engine<L> {
    pub fn with_loader(tags: TagConfig, loader: L) -> Self {
        Self {
            tags,
            loader,
            repeats: HashMap::new(),
        }
    }

    /// Render the template at `path` once per element of `spec.iterable`
    /// instead of once.
    pub fn add_repeat(&mut self, path: impl AsRef<Path>, spec: RepeatSpec) {
        self.repeats.insert(normalize(path.as_ref()), spec);
    }

    pub fn with_repeat(mut self, path: impl AsRef<Path>, spec: RepeatSpec) -> Self {
        self.add_repeat(path, spec);
        self
    }

    pub fn repeat_for(&self, path: &Path) -> Option<&RepeatSpec> {
        self.repeats.get(&normalize(path))
    }

    /// Tokenize and parse; includes resolve relative to `source_name`.
    pub fn compile(&self, source: &str, source_name: &str) -> Result<Template> {
        let tokens = Tokenizer::new(source, &self.tags, source_name)
            .with_loader(&self.loader)
            .tokenize()?;
        Ok(parse(&tokens)?)
    }

    pub fn render_str(&self, source: &str, source_name: &str, context: &Context) -> Result<String> {
        let template = self.compile(source, source_name)?;
        Ok(evaluate(&template, context)?)
    }

    /// Produce the outputs of the template at `path`: one file at `path`
    /// itself, or one per element when a repeat is registered for it.
    pub fn process(&self, path: &Path, source: &str, context: &Context) -> Result<Vec<RenderedFile>> {
        let name = path.to_string_lossy();
        let template = self.compile(source, &name)?;
        match self.repeat_for(path) {
            Some(spec) => repeat(spec, path, &template, context, &self.tags, &self.loader),
            None => Ok(vec![RenderedFile {
                path: path.to_path_buf(),
                body: evaluate(&template, context)?,
            }]),
        }
    }
}
