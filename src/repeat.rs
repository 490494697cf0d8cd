use crate::ast::{Expression, Node};
use crate::config::{RepeatSpec, TagConfig};
use crate::context::Context;
use crate::error::{EvaluatorError, ExprError, Result};
use crate::eval::{evaluate_expression, Evaluator};
use crate::lexer::Tokenizer;
use crate::loader::SourceLoader;
use crate::location::SourceLocation;
use crate::parser::parse;
use crate::value::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One output of a template run: where it goes and what it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub body: String,
}

/// Render `template` once per element of `spec.iterable`.
///
/// Each element is bound to `spec.variable` in its own child of `context`;
/// the file name comes from rendering `spec.filename` in that same child
/// context and is placed next to the template. If the iterable refers to an
/// unknown name or does not parse, there is nothing to repeat and no files
/// are produced.
pub fn repeat(
    spec: &RepeatSpec,
    template_path: &Path,
    template: &[Node],
    context: &Context,
    tags: &TagConfig,
    loader: &dyn SourceLoader,
) -> Result<Vec<RenderedFile>> {
    let location = SourceLocation::new(
        format!("{} (repeat)", template_path.display()),
        1,
        1,
        spec.iterable.as_str(),
    );

    let iterable = Expression::compile(spec.iterable.as_str());
    let items = match evaluate_expression(&iterable, context) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            let fault = ExprError::Type(format!(
                "repeat iterable '{}' is not an array (got {})",
                spec.iterable,
                other.type_name()
            ));
            return Err(EvaluatorError::new(fault, &location).into());
        }
        Err(fault) if fault.is_reference_or_syntax() => {
            warn!(
                template = %template_path.display(),
                iterable = %spec.iterable,
                "skipping repeat: {}",
                fault
            );
            return Ok(Vec::new());
        }
        Err(fault) => return Err(EvaluatorError::new(fault, &location).into()),
    };

    let filename_source = format!("{} (repeat filename)", template_path.display());
    let filename_tokens = Tokenizer::new(&spec.filename, tags, &filename_source)
        .with_loader(loader)
        .tokenize()?;
    let filename = parse(&filename_tokens)?;

    let dir = template_path.parent().unwrap_or_else(|| Path::new(""));
    let mut files = Vec::with_capacity(items.len());
    for item in items {
        let scope = Evaluator::new(context.child(spec.variable.as_str(), item));
        let name = scope.render(&filename)?;
        let body = scope.render(template)?;
        let path = dir.join(name);
        debug!(template = %template_path.display(), output = %path.display(), "repeat output");
        files.push(RenderedFile { path, body });
    }
    Ok(files)
}
