//! Compiled templates and their render entry points

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RenderContext;
use crate::error::RenderError;
use crate::program::{write_nodes, Node};
use crate::render;

/// Which execution model a template is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    /// The compiled procedure runs to completion without yielding
    Direct,
    /// The compiled procedure may suspend at partial resolution,
    /// iteration bodies, conditional-binding bodies and capture assembly
    Suspending,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderMode::Direct => f.write_str("direct"),
            RenderMode::Suspending => f.write_str("suspending"),
        }
    }
}

/// A compiled template: an executable rendering procedure
///
/// Produced by [`crate::compile`]; invoked with a model and a
/// [`RenderContext`] to produce text. The model is mutable because
/// `{{#capture}}` writes its accumulated text back into it.
#[derive(Debug, Clone)]
pub struct Template {
    pub(crate) mode: RenderMode,
    pub(crate) preamble: Vec<String>,
    pub(crate) program: Vec<Node>,
}

impl Template {
    /// The mode this template was compiled for
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// The hoisted `{{#code}}` sources, in template order
    ///
    /// These are handed to the expression evaluator so user helper
    /// definitions are visible to every expression in the template.
    pub fn preamble(&self) -> &[String] {
        &self.preamble
    }

    /// Pretty-prints the compiled op tree
    ///
    /// Debug aid: the textual form of what the template will execute.
    pub fn debug_source(&self) -> String {
        let mut out = String::new();
        if !self.preamble.is_empty() {
            out.push_str("preamble {\n");
            for code in &self.preamble {
                out.push_str(code);
                if !code.ends_with('\n') {
                    out.push('\n');
                }
            }
            out.push_str("}\n");
        }
        // the writer only ever fails on formatting, which String never does
        let _ = write_nodes(&mut out, &self.program, 0);
        out
    }

    /// Renders the template to completion
    ///
    /// Only valid for [`RenderMode::Direct`] templates; a suspending
    /// template must go through [`Template::render_suspending`].
    pub fn render(&self, model: &mut Value, ctx: &RenderContext) -> Result<String, RenderError> {
        if self.mode != RenderMode::Direct {
            return Err(RenderError::ModeMismatch {
                compiled: self.mode,
                requested: RenderMode::Direct,
            });
        }
        render::render_direct(self, model, ctx)
    }

    /// Renders the template, suspending at the defined points
    ///
    /// Only valid for [`RenderMode::Suspending`] templates. Suspension
    /// points are awaited strictly in document order; iteration never
    /// fans out concurrently.
    pub async fn render_suspending(
        &self,
        model: &mut Value,
        ctx: &RenderContext,
    ) -> Result<String, RenderError> {
        if self.mode != RenderMode::Suspending {
            return Err(RenderError::ModeMismatch {
                compiled: self.mode,
                requested: RenderMode::Suspending,
            });
        }
        render::render_suspending(self, model, ctx).await
    }
}
