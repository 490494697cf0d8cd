//! gelato: a template compiler for generating source files.
//!
//! A template is plain text with three kinds of tags (delimiters are
//! configurable through [`TagConfig`]):
//!
//! - `[[ expr ]]` renders an expression.
//! - `[! for x in xs !] ... [! efor !]` repeats its body for each element.
//! - `[! if a !] ... [! else if b !] ... [! else !] ... [! eif !]` picks one
//!   branch.
//! - `[@ relative/path @]` splices in another file at scan time, resolved
//!   against the directory of the file containing the tag.
//!
//! Rendering runs in three stages: the tokenizer ([`lexer`]) turns text into
//! tokens and inlines includes, the [`parser`] builds a node tree, and the
//! evaluator ([`eval`]) walks the tree against a [`Context`]. The [`repeat`]
//! driver sits on top and renders one template into many files.
//!
//! Expressions use a small sandboxed language ([`expr`]): literals, names
//! from the context, member/index access, calls of functions the host put in
//! the context, and the usual arithmetic, comparison and logical operators.
//! Nothing outside the context is reachable.
//!
//! Errors from every stage carry the file, line, column and source line of
//! the tag that caused them.

pub mod ast;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod eval;
pub mod expr;
pub mod lexer;
pub mod loader;
pub mod location;
pub mod parser;
pub mod repeat;
pub mod value;

pub use ast::{Node, Template};
pub use config::{RepeatSpec, RunConfig, TagConfig};
pub use context::Context;
pub use engine::Engine;
pub use error::{ConfigError, Error, EvaluatorError, ExprError, ParserError, Result, TokenizerError};
pub use eval::{evaluate, Evaluator};
pub use lexer::{tokenize, Token, TokenKind, Tokenizer};
pub use loader::{FsLoader, MemoryLoader, SourceLoader};
pub use location::SourceLocation;
pub use parser::{parse, Parser};
pub use repeat::{repeat, RenderedFile};
pub use value::{Function, Value};

/// Name used in diagnostics for templates that do not come from a file.
pub const INLINE_SOURCE: &str = "<template>";

/// Render `template` with the default tags. Includes are read from disk,
/// relative to the working directory.
pub fn render(template: &str, context: &Context) -> Result<String> {
    Engine::default().render_str(template, INLINE_SOURCE, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_for_loop_over_models() {
        let template = "[! for model in models !][[ model.name ]]: [[ model.table ]]\n[! efor !]";
        let context = Context::from_json(serde_json::json!({
            "models": [
                { "name": "User", "table": "users" },
                { "name": "Company", "table": "companies" },
            ]
        }))
        .unwrap();

        let rendered = render(template, &context).unwrap();
        assert_eq!(rendered, "User: users\nCompany: companies\n");
    }

    #[test]
    fn template_newlines_are_preserved_verbatim() {
        let template = "prefix-\n\
[! for x in xs !]A: [[ x ]]\n[! efor !]\
middle-\n\
[! for x in xs !]B: [[ x ]]\n[! efor !]suffix";
        let context = Context::new().with_var("xs", vec!["one", "two"]);

        let rendered = render(template, &context).unwrap();
        let expected = concat!(
            "prefix-\n",
            "A: one\n",
            "A: two\n",
            "middle-\n",
            "B: one\n",
            "B: two\n",
            "suffix",
        );
        assert_eq!(rendered, expected);
    }

    #[test]
    fn malformed_for_missing_efor_is_an_error() {
        let context = Context::new().with_var("xs", vec![1]);
        let err = render("before [! for x in xs !]broken", &context).unwrap_err();
        assert!(matches!(err, Error::Parser(_)));
    }

    #[test]
    fn unclosed_control_tag_is_an_error() {
        let err = render("oops [! for x in xs broken", &Context::new()).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Tokenizer Error - could not find control end tag !] (<template>:1:6)"));
    }
}
