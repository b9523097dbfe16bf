//! Template markup compiler and renderer
//!
//! Compiles a handlebars-flavored markup dialect into an executable op
//! tree and renders it against a JSON model. The pipeline has three
//! stages: a quote- and bracket-aware [`Tokenizer`], a single-pass
//! [`compile`] step that builds the op tree with a directive block
//! stack, and two interpreters over the tree, one direct and one
//! suspending.
//!
//! Directive expressions are opaque to the compiler and evaluated at
//! render time through the [`ExpressionEvaluator`] seam; the shipped
//! [`PathEvaluator`] handles literals, dotted paths and simple
//! comparisons.
//!
//! ```ignore
//! use obi_templates::{compile, RenderContext, RenderMode};
//! use serde_json::json;
//!
//! let tpl = compile("Hello {{model.name}}!", RenderMode::Direct)?;
//! let mut model = json!({"name": "world"});
//! let out = tpl.render(&mut model, &RenderContext::new())?;
//! assert_eq!(out, "Hello world!");
//! ```

#![warn(missing_docs)]

pub mod compiler;
pub mod context;
pub mod error;
pub mod eval;
pub mod program;
mod render;
mod scanner;
pub mod scope;
pub mod template;
pub mod token;
pub mod tokenizer;

pub use compiler::compile;
pub use context::{PartialHooks, PartialResolver, RenderContext, SuspendingPartialResolver};
pub use error::{CompileError, RenderError};
pub use eval::{EvalContext, ExpressionEvaluator, PathEvaluator};
pub use program::{IfArm, Node};
pub use render::escape;
pub use scope::Scope;
pub use template::{RenderMode, Template};
pub use token::{Directive, Token, TokenKind};
pub use tokenizer::Tokenizer;
