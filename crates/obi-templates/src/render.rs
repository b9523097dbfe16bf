//! Op-tree interpreters for both render modes
//!
//! Two interpreters walk the same tree: a plain recursive one for direct
//! renders and a boxed-future one for suspending renders. Both produce
//! identical output for the same inputs; the suspending interpreter just
//! awaits partial resolution and recursion points in document order.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::trace;

use crate::context::RenderContext;
use crate::error::RenderError;
use crate::eval::EvalContext;
use crate::program::Node;
use crate::scope::{Bindings, Scope};
use crate::template::Template;

/// Entity-escapes a value for text emission
///
/// Null renders as the empty string; everything else is stringified and
/// has `"`, `&`, `'`, `<` and `>` replaced with character entities.
pub fn escape(value: &Value) -> String {
    let text = stringify(value);
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("&quot;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

/// Truthiness: null, false, zero, NaN and the empty string are falsy;
/// arrays and objects are always truthy, even when empty.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Normalizes an iteration source to an item list
///
/// Falsy values iterate zero times, arrays iterate their elements,
/// objects iterate `{key, value}` records in insertion order, and any
/// other truthy value iterates once over itself.
pub(crate) fn normalize_items(value: &Value) -> Vec<Value> {
    if !is_truthy(value) {
        return Vec::new();
    }
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| serde_json::json!({"key": k, "value": v}))
            .collect(),
        other => vec![other.clone()],
    }
}

struct Ctx<'r> {
    render: &'r RenderContext,
    preamble: &'r [String],
}

impl<'r> Ctx<'r> {
    fn eval(
        &self,
        expr: &str,
        model: &Value,
        scope: Option<&Scope<'_>>,
        bindings: Option<&Bindings<'_>>,
    ) -> Result<Value, RenderError> {
        let ec = EvalContext {
            model,
            context: self.render.data(),
            scope,
            preamble: self.preamble,
            bindings,
        };
        self.render.evaluator().eval(expr, &ec)
    }
}

pub(crate) fn render_direct(
    tpl: &Template,
    model: &mut Value,
    ctx: &RenderContext,
) -> Result<String, RenderError> {
    trace!(mode = %tpl.mode(), "rendering template");
    let st = Ctx {
        render: ctx,
        preamble: tpl.preamble(),
    };
    let mut out = String::new();
    render_nodes(&st, &tpl.program, model, None, None, &mut out)?;
    Ok(out)
}

fn render_nodes(
    st: &Ctx<'_>,
    nodes: &[Node],
    model: &mut Value,
    scope: Option<&Scope<'_>>,
    bindings: Option<&Bindings<'_>>,
    out: &mut String,
) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Encoded(expr) => {
                let value = st.eval(expr, model, scope, bindings)?;
                out.push_str(&escape(&value));
            }
            Node::Raw(expr) => {
                let value = st.eval(expr, model, scope, bindings)?;
                out.push_str(&stringify(&value));
            }
            Node::If { arms, else_body } => {
                let mut matched = false;
                for arm in arms {
                    let cond = st.eval(&arm.cond, model, scope, bindings)?;
                    if is_truthy(&cond) {
                        render_nodes(st, &arm.body, model, scope, bindings, out)?;
                        matched = true;
                        break;
                    }
                }
                if !matched {
                    if let Some(body) = else_body {
                        render_nodes(st, body, model, scope, bindings, out)?;
                    }
                }
            }
            Node::Unless { expr, body } => {
                let cond = st.eval(expr, model, scope, bindings)?;
                if !is_truthy(&cond) {
                    render_nodes(st, body, model, scope, bindings, out)?;
                }
            }
            Node::Each { name, expr, body, empty } => {
                let source = st.eval(expr, model, scope, bindings)?;
                let items = normalize_items(&source);
                if items.is_empty() {
                    if let Some(empty) = empty {
                        let rec = Scope {
                            outer: scope,
                            index: -1,
                            first: false,
                            last: false,
                            item: Value::Null,
                            items: &[],
                        };
                        let bound = Bindings::new(bindings, name, &rec.item);
                        render_nodes(st, empty, model, Some(&rec), Some(&bound), out)?;
                    }
                } else {
                    let last_index = items.len() - 1;
                    for (i, item) in items.iter().enumerate() {
                        let rec = Scope {
                            outer: scope,
                            index: i as i64,
                            first: i == 0,
                            last: i == last_index,
                            item: item.clone(),
                            items: &items,
                        };
                        let bound = Bindings::new(bindings, name, &rec.item);
                        render_nodes(st, body, model, Some(&rec), Some(&bound), out)?;
                    }
                }
            }
            Node::With { name, expr, body, empty } => {
                let value = st.eval(expr, model, scope, bindings)?;
                if is_truthy(&value) {
                    let bound = Bindings::new(bindings, name, &value);
                    render_nodes(st, body, model, scope, Some(&bound), out)?;
                } else if let Some(empty) = empty {
                    render_nodes(st, empty, model, scope, bindings, out)?;
                }
            }
            Node::Capture { target, body } => {
                let mut buf = String::new();
                render_nodes(st, body, model, scope, bindings, &mut buf)?;
                st.render
                    .evaluator()
                    .assign(target, Value::String(buf), model)?;
            }
            Node::Partial { name_expr, model_expr } => {
                let (name, sub_model) =
                    prepare_partial(st, name_expr, model_expr.as_deref(), model, scope, bindings)?;
                let resolver = st
                    .render
                    .partials()
                    .ok_or_else(|| RenderError::NoPartialResolver { name: name.clone() })?;
                let partial = resolver.resolve(&name)?;
                let sub = Ctx {
                    render: st.render,
                    preamble: partial.preamble(),
                };
                match sub_model {
                    Some(mut owned) => {
                        render_nodes(&sub, &partial.program, &mut owned, None, None, out)?
                    }
                    None => render_nodes(&sub, &partial.program, model, None, None, out)?,
                }
            }
        }
    }
    Ok(())
}

/// Evaluates a partial's name and sub-model and applies the hooks
///
/// The sub-model is the explicit argument when given and truthy, else
/// the current iteration item when truthy. `None` means the partial
/// inherits the caller's model itself, by reference, so a capture
/// inside the partial writes back into the caller's model.
/// `decorate_partial_model` runs only on a non-inherited sub-model.
fn prepare_partial(
    st: &Ctx<'_>,
    name_expr: &str,
    model_expr: Option<&str>,
    model: &Value,
    scope: Option<&Scope<'_>>,
    bindings: Option<&Bindings<'_>>,
) -> Result<(String, Option<Value>), RenderError> {
    let name_value = st.eval(name_expr, model, scope, bindings)?;
    let name = stringify(&name_value);

    let explicit = match model_expr {
        Some(expr) => Some(st.eval(expr, model, scope, bindings)?),
        None => None,
    };

    let sub_model = match explicit {
        Some(v) if is_truthy(&v) => Some(v),
        _ => match scope {
            Some(rec) if is_truthy(&rec.item) => Some(rec.item.clone()),
            _ => None,
        },
    };

    let sub_model = match (st.render.hooks(), sub_model) {
        (Some(hooks), Some(owned)) => Some(hooks.decorate_partial_model(owned)),
        (_, sub_model) => sub_model,
    };
    let name = match st.render.hooks() {
        Some(hooks) => hooks.resolve_partial_path(&name),
        None => name,
    };
    trace!(partial = %name, "invoking partial");
    Ok((name, sub_model))
}

pub(crate) async fn render_suspending(
    tpl: &Template,
    model: &mut Value,
    ctx: &RenderContext,
) -> Result<String, RenderError> {
    trace!(mode = %tpl.mode(), "rendering template");
    let st = Ctx {
        render: ctx,
        preamble: tpl.preamble(),
    };
    let mut out = String::new();
    render_nodes_suspending(&st, &tpl.program, model, None, None, &mut out).await?;
    Ok(out)
}

// Recursion through an async fn needs an explicitly boxed future.
fn render_nodes_suspending<'a>(
    st: &'a Ctx<'a>,
    nodes: &'a [Node],
    model: &'a mut Value,
    scope: Option<&'a Scope<'a>>,
    bindings: Option<&'a Bindings<'a>>,
    out: &'a mut String,
) -> Pin<Box<dyn Future<Output = Result<(), RenderError>> + Send + 'a>> {
    Box::pin(async move {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Encoded(expr) => {
                    let value = st.eval(expr, model, scope, bindings)?;
                    out.push_str(&escape(&value));
                }
                Node::Raw(expr) => {
                    let value = st.eval(expr, model, scope, bindings)?;
                    out.push_str(&stringify(&value));
                }
                Node::If { arms, else_body } => {
                    let mut matched = false;
                    for arm in arms {
                        let cond = st.eval(&arm.cond, model, scope, bindings)?;
                        if is_truthy(&cond) {
                            render_nodes_suspending(st, &arm.body, model, scope, bindings, out)
                                .await?;
                            matched = true;
                            break;
                        }
                    }
                    if !matched {
                        if let Some(body) = else_body {
                            render_nodes_suspending(st, body, model, scope, bindings, out).await?;
                        }
                    }
                }
                Node::Unless { expr, body } => {
                    let cond = st.eval(expr, model, scope, bindings)?;
                    if !is_truthy(&cond) {
                        render_nodes_suspending(st, body, model, scope, bindings, out).await?;
                    }
                }
                Node::Each { name, expr, body, empty } => {
                    let source = st.eval(expr, model, scope, bindings)?;
                    let items = normalize_items(&source);
                    if items.is_empty() {
                        if let Some(empty) = empty {
                            let rec = Scope {
                                outer: scope,
                                index: -1,
                                first: false,
                                last: false,
                                item: Value::Null,
                                items: &[],
                            };
                            let bound = Bindings::new(bindings, name, &rec.item);
                            render_nodes_suspending(st, empty, model, Some(&rec), Some(&bound), out)
                                .await?;
                        }
                    } else {
                        let last_index = items.len() - 1;
                        for (i, item) in items.iter().enumerate() {
                            let rec = Scope {
                                outer: scope,
                                index: i as i64,
                                first: i == 0,
                                last: i == last_index,
                                item: item.clone(),
                                items: &items,
                            };
                            let bound = Bindings::new(bindings, name, &rec.item);
                            render_nodes_suspending(st, body, model, Some(&rec), Some(&bound), out)
                                .await?;
                        }
                    }
                }
                Node::With { name, expr, body, empty } => {
                    let value = st.eval(expr, model, scope, bindings)?;
                    if is_truthy(&value) {
                        let bound = Bindings::new(bindings, name, &value);
                        render_nodes_suspending(st, body, model, scope, Some(&bound), out).await?;
                    } else if let Some(empty) = empty {
                        render_nodes_suspending(st, empty, model, scope, bindings, out).await?;
                    }
                }
                Node::Capture { target, body } => {
                    let mut buf = String::new();
                    render_nodes_suspending(st, body, model, scope, bindings, &mut buf).await?;
                    st.render
                        .evaluator()
                        .assign(target, Value::String(buf), model)?;
                }
                Node::Partial { name_expr, model_expr } => {
                    let (name, sub_model) = prepare_partial(
                        st,
                        name_expr,
                        model_expr.as_deref(),
                        model,
                        scope,
                        bindings,
                    )?;
                    let partial = if let Some(resolver) = st.render.suspending_partials() {
                        resolver.resolve(&name).await?
                    } else if let Some(resolver) = st.render.partials() {
                        resolver.resolve(&name)?
                    } else {
                        return Err(RenderError::NoPartialResolver { name });
                    };
                    let sub = Ctx {
                        render: st.render,
                        preamble: partial.preamble(),
                    };
                    match sub_model {
                        Some(mut owned) => {
                            render_nodes_suspending(
                                &sub,
                                &partial.program,
                                &mut owned,
                                None,
                                None,
                                out,
                            )
                            .await?
                        }
                        None => {
                            render_nodes_suspending(&sub, &partial.program, model, None, None, out)
                                .await?
                        }
                    }
                }
            }
        }
        Ok(())
    })
}
