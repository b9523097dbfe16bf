//! Render-time configuration
//!
//! A [`RenderContext`] carries everything a render needs besides the
//! model: the context value exposed to expressions as `context`, the
//! expression evaluator, partial resolvers for both render modes, and
//! optional partial hooks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RenderError;
use crate::eval::{ExpressionEvaluator, PathEvaluator};
use crate::template::Template;

/// Resolves partial names to compiled templates for direct rendering
pub trait PartialResolver: Send + Sync {
    /// Returns the compiled template for `name`
    fn resolve(&self, name: &str) -> Result<Arc<Template>, RenderError>;
}

/// Resolves partial names to compiled templates, possibly suspending
///
/// Used by suspending renders; a render context may carry both resolver
/// kinds, in which case suspending renders prefer this one.
#[async_trait]
pub trait SuspendingPartialResolver: Send + Sync {
    /// Returns the compiled template for `name`
    async fn resolve(&self, name: &str) -> Result<Arc<Template>, RenderError>;
}

/// Host integration points applied around partial invocation
pub trait PartialHooks: Send + Sync {
    /// Adjusts the sub-model handed to a partial
    ///
    /// Not called when the partial inherits the caller's model unchanged.
    fn decorate_partial_model(&self, model: Value) -> Value {
        model
    }

    /// Maps a partial name to the name handed to the resolver
    fn resolve_partial_path(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Everything a render consults besides the model
#[derive(Clone)]
pub struct RenderContext {
    data: Value,
    evaluator: Arc<dyn ExpressionEvaluator>,
    partials: Option<Arc<dyn PartialResolver>>,
    suspending_partials: Option<Arc<dyn SuspendingPartialResolver>>,
    hooks: Option<Arc<dyn PartialHooks>>,
}

impl Default for RenderContext {
    fn default() -> Self {
        RenderContext {
            data: Value::Null,
            evaluator: Arc::new(PathEvaluator::new()),
            partials: None,
            suspending_partials: None,
            hooks: None,
        }
    }
}

impl RenderContext {
    /// Creates a context with the reference evaluator and no partials
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value expressions see as `context`
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Replaces the expression evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Sets the partial resolver used by direct renders
    pub fn with_partials(mut self, partials: Arc<dyn PartialResolver>) -> Self {
        self.partials = Some(partials);
        self
    }

    /// Sets the partial resolver used by suspending renders
    pub fn with_suspending_partials(
        mut self,
        partials: Arc<dyn SuspendingPartialResolver>,
    ) -> Self {
        self.suspending_partials = Some(partials);
        self
    }

    /// Sets the partial hooks
    pub fn with_hooks(mut self, hooks: Arc<dyn PartialHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// The context value exposed to expressions
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The expression evaluator
    pub fn evaluator(&self) -> &dyn ExpressionEvaluator {
        self.evaluator.as_ref()
    }

    pub(crate) fn partials(&self) -> Option<&dyn PartialResolver> {
        self.partials.as_deref()
    }

    pub(crate) fn suspending_partials(&self) -> Option<&dyn SuspendingPartialResolver> {
        self.suspending_partials.as_deref()
    }

    pub(crate) fn hooks(&self) -> Option<&dyn PartialHooks> {
        self.hooks.as_deref()
    }
}
