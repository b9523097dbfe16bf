//! The compiled op tree
//!
//! The compiler turns the token stream into a tree of render ops instead
//! of generating source text in a host language; the interpreter in
//! [`crate::render`] executes the tree with the same ordering and scoping
//! contracts the generated-source approach would have.

use std::fmt::{self, Write};

/// One arm of an if/elseif chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfArm {
    /// The condition expression text
    pub cond: String,
    /// Ops rendered when the condition is truthy
    pub body: Vec<Node>,
}

/// A single render op
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Emit literal text verbatim
    Text(String),
    /// Evaluate an expression and emit it entity-escaped
    Encoded(String),
    /// Evaluate an expression and emit it unescaped
    Raw(String),
    /// Invoke a partial; `model_expr` is the optional explicit sub-model
    Partial {
        /// Expression yielding the partial's name
        name_expr: String,
        /// Optional expression yielding the explicit sub-model
        model_expr: Option<String>,
    },
    /// An if/elseif chain with an optional else body
    If {
        /// Arms tried in order; the first truthy condition wins
        arms: Vec<IfArm>,
        /// Rendered when no arm matched
        else_body: Option<Vec<Node>>,
    },
    /// An inverted conditional; no else form exists
    Unless {
        /// The condition expression text
        expr: String,
        /// Rendered when the condition is falsy
        body: Vec<Node>,
    },
    /// Iterate a normalized item list, binding `name` per item
    Each {
        /// Name the item is bound to inside the body
        name: String,
        /// Expression yielding the iteration source
        expr: String,
        /// Rendered once per item
        body: Vec<Node>,
        /// Rendered once when the list is empty
        empty: Option<Vec<Node>>,
    },
    /// Bind a truthy value to `name` for the body
    With {
        /// Name the value is bound to inside the body
        name: String,
        /// Expression yielding the value
        expr: String,
        /// Rendered when the value is truthy
        body: Vec<Node>,
        /// Rendered when the value is falsy
        empty: Option<Vec<Node>>,
    },
    /// Render the body into a buffer and assign it to `target`
    Capture {
        /// Assignment target expression
        target: String,
        /// Ops whose output is captured
        body: Vec<Node>,
    },
}

pub(crate) fn write_nodes(out: &mut String, nodes: &[Node], depth: usize) -> fmt::Result {
    for node in nodes {
        write_node(out, node, depth)?;
    }
    Ok(())
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_node(out: &mut String, node: &Node, depth: usize) -> fmt::Result {
    indent(out, depth);
    match node {
        Node::Text(text) => writeln!(out, "text {:?}", text),
        Node::Encoded(expr) => writeln!(out, "encoded({expr})"),
        Node::Raw(expr) => writeln!(out, "raw({expr})"),
        Node::Partial { name_expr, model_expr } => match model_expr {
            Some(m) => writeln!(out, "partial({name_expr}, {m})"),
            None => writeln!(out, "partial({name_expr})"),
        },
        Node::If { arms, else_body } => {
            for (i, arm) in arms.iter().enumerate() {
                if i > 0 {
                    indent(out, depth);
                    writeln!(out, "}} elseif {} {{", arm.cond)?;
                } else {
                    writeln!(out, "if {} {{", arm.cond)?;
                }
                write_nodes(out, &arm.body, depth + 1)?;
            }
            if let Some(body) = else_body {
                indent(out, depth);
                writeln!(out, "}} else {{")?;
                write_nodes(out, body, depth + 1)?;
            }
            indent(out, depth);
            writeln!(out, "}}")
        }
        Node::Unless { expr, body } => {
            writeln!(out, "unless {expr} {{")?;
            write_nodes(out, body, depth + 1)?;
            indent(out, depth);
            writeln!(out, "}}")
        }
        Node::Each { name, expr, body, empty } => {
            writeln!(out, "each {name} in {expr} {{")?;
            write_nodes(out, body, depth + 1)?;
            if let Some(empty) = empty {
                indent(out, depth);
                writeln!(out, "}} else {{")?;
                write_nodes(out, empty, depth + 1)?;
            }
            indent(out, depth);
            writeln!(out, "}}")
        }
        Node::With { name, expr, body, empty } => {
            writeln!(out, "with {name} as {expr} {{")?;
            write_nodes(out, body, depth + 1)?;
            if let Some(empty) = empty {
                indent(out, depth);
                writeln!(out, "}} else {{")?;
                write_nodes(out, empty, depth + 1)?;
            }
            indent(out, depth);
            writeln!(out, "}}")
        }
        Node::Capture { target, body } => {
            writeln!(out, "capture {target} {{")?;
            write_nodes(out, body, depth + 1)?;
            indent(out, depth);
            writeln!(out, "}}")
        }
    }
}
