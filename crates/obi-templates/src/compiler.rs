//! Single-pass compiler from tokens to the op tree
//!
//! One pass over the token stream, with a stack of open block frames.
//! `else`/`elseif` augment the innermost open frame in place, so no
//! lookahead or tree rewriting is needed.

use std::mem;

use tracing::debug;

use crate::error::CompileError;
use crate::program::{IfArm, Node};
use crate::scanner;
use crate::template::{RenderMode, Template};
use crate::token::{Directive, TokenKind};
use crate::tokenizer::Tokenizer;

/// Compiles template source into an executable [`Template`]
///
/// The first tokenizer or structural error aborts the compile; no
/// partial template is ever produced.
pub fn compile(source: &str, mode: RenderMode) -> Result<Template, CompileError> {
    debug!(mode = %mode, bytes = source.len(), "compiling template");

    let mut preamble: Vec<String> = Vec::new();
    let mut stack: Vec<Frame> = vec![Frame::Root { body: Vec::new() }];

    for token in Tokenizer::new(source) {
        let token = token?;
        let offset = token.offset;
        match token.kind {
            TokenKind::Literal(text) => {
                if !text.is_empty() {
                    emit(&mut stack, Node::Text(text.to_string()));
                }
            }
            TokenKind::Encoded(expr) => emit(&mut stack, Node::Encoded(expr.to_string())),
            TokenKind::Raw(expr) => emit(&mut stack, Node::Raw(expr.to_string())),
            TokenKind::Code(body) => preamble.push(body.to_string()),
            TokenKind::Partial(args) => {
                let (name_expr, model_expr) = split_partial_args(args)?;
                emit(&mut stack, Node::Partial { name_expr, model_expr });
            }
            TokenKind::Open { directive, expr } => match directive {
                Directive::If => stack.push(Frame::If {
                    arms: Vec::new(),
                    cond: expr.to_string(),
                    body: Vec::new(),
                    else_body: None,
                }),
                Directive::Unless => stack.push(Frame::Unless {
                    expr: expr.to_string(),
                    body: Vec::new(),
                }),
                Directive::Each => {
                    let (name, source_expr) = split_binding(expr, "in");
                    stack.push(Frame::Each {
                        name,
                        expr: source_expr,
                        body: Vec::new(),
                        empty: None,
                    });
                }
                Directive::With => {
                    let (name, source_expr) = split_binding(expr, "as");
                    stack.push(Frame::With {
                        name,
                        expr: source_expr,
                        body: Vec::new(),
                        empty: None,
                    });
                }
                Directive::Capture => stack.push(Frame::Capture {
                    target: expr.to_string(),
                    body: Vec::new(),
                }),
                Directive::Else => apply_else(&mut stack, offset)?,
                Directive::ElseIf => apply_elseif(&mut stack, expr, offset)?,
                // code bodies never reach the compiler as Open tokens
                Directive::Code => unreachable!("code blocks are consumed by the tokenizer"),
            },
            TokenKind::Close(directive) => close_frame(&mut stack, directive, offset)?,
        }
    }

    match stack.pop() {
        Some(Frame::Root { body }) => Ok(Template {
            mode,
            preamble,
            program: body,
        }),
        Some(frame) => Err(CompileError::MissingClose {
            kind: frame.kind_name(),
        }),
        None => unreachable!("the root frame is never popped early"),
    }
}

/// One open block on the compile stack
enum Frame {
    Root {
        body: Vec<Node>,
    },
    If {
        arms: Vec<IfArm>,
        cond: String,
        body: Vec<Node>,
        else_body: Option<Vec<Node>>,
    },
    Unless {
        expr: String,
        body: Vec<Node>,
    },
    Each {
        name: String,
        expr: String,
        body: Vec<Node>,
        empty: Option<Vec<Node>>,
    },
    With {
        name: String,
        expr: String,
        body: Vec<Node>,
        empty: Option<Vec<Node>>,
    },
    Capture {
        target: String,
        body: Vec<Node>,
    },
}

impl Frame {
    fn kind_name(&self) -> &'static str {
        match self {
            Frame::Root { .. } => "root",
            Frame::If { .. } => "if",
            Frame::Unless { .. } => "unless",
            Frame::Each { .. } => "each",
            Frame::With { .. } => "with",
            Frame::Capture { .. } => "capture",
        }
    }

    /// The body new ops currently flow into; after an `else`, that is the
    /// frame's else/empty branch.
    fn active_body(&mut self) -> &mut Vec<Node> {
        match self {
            Frame::Root { body }
            | Frame::Unless { body, .. }
            | Frame::Capture { body, .. } => body,
            Frame::If { body, else_body, .. } => else_body.as_mut().unwrap_or(body),
            Frame::Each { body, empty, .. } | Frame::With { body, empty, .. } => {
                empty.as_mut().unwrap_or(body)
            }
        }
    }
}

fn emit(stack: &mut [Frame], node: Node) {
    // the stack always holds at least the root frame
    if let Some(frame) = stack.last_mut() {
        frame.active_body().push(node);
    }
}

fn apply_else(stack: &mut [Frame], offset: usize) -> Result<(), CompileError> {
    match stack.last_mut() {
        Some(Frame::If { arms, cond, body, else_body }) if else_body.is_none() => {
            arms.push(IfArm {
                cond: mem::take(cond),
                body: mem::take(body),
            });
            *else_body = Some(Vec::new());
            Ok(())
        }
        Some(Frame::Each { empty, .. }) | Some(Frame::With { empty, .. })
            if empty.is_none() =>
        {
            *empty = Some(Vec::new());
            Ok(())
        }
        _ => Err(CompileError::UnexpectedElse { offset }),
    }
}

fn apply_elseif(stack: &mut [Frame], expr: &str, offset: usize) -> Result<(), CompileError> {
    match stack.last_mut() {
        Some(Frame::If { arms, cond, body, else_body }) if else_body.is_none() => {
            arms.push(IfArm {
                cond: mem::take(cond),
                body: mem::take(body),
            });
            *cond = expr.to_string();
            Ok(())
        }
        _ => Err(CompileError::UnexpectedElseIf { offset }),
    }
}

fn close_frame(
    stack: &mut Vec<Frame>,
    directive: Directive,
    offset: usize,
) -> Result<(), CompileError> {
    let found = directive.name();
    let top = stack.last().map(Frame::kind_name).unwrap_or("root");
    if top == "root" {
        return Err(CompileError::UnexpectedClose { found, offset });
    }
    // a close names the base kind even after else-augmentation
    if top != found {
        return Err(CompileError::MismatchedClose {
            expected: top,
            found,
            offset,
        });
    }

    let node = match stack.pop() {
        Some(Frame::If { mut arms, cond, body, else_body }) => {
            if else_body.is_none() {
                arms.push(IfArm { cond, body });
            }
            Node::If { arms, else_body }
        }
        Some(Frame::Unless { expr, body }) => Node::Unless { expr, body },
        Some(Frame::Each { name, expr, body, empty }) => Node::Each { name, expr, body, empty },
        Some(Frame::With { name, expr, body, empty }) => Node::With { name, expr, body, empty },
        Some(Frame::Capture { target, body }) => Node::Capture { target, body },
        _ => unreachable!("kind match above rules out root and empty stacks"),
    };
    emit(stack, node);
    Ok(())
}

/// Splits `name <keyword> source` binding forms, defaulting to `item`
///
/// The source expression is sliced from the original text, never
/// reassembled, so its internal spacing survives verbatim.
fn split_binding(expr: &str, keyword: &str) -> (String, String) {
    let b = expr.as_bytes();
    let name = scanner::read_identifier(expr, 0);
    if !name.is_empty() {
        let p = scanner::skip_white_space(expr, name.len());
        if p > name.len() && scanner::read_identifier(expr, p) == keyword {
            let q = p + keyword.len();
            if b.get(q).map(|&c| scanner::is_white_space(c)).unwrap_or(false) {
                let source = expr[q..].trim();
                if !source.is_empty() {
                    return (name.to_string(), source.to_string());
                }
            }
        }
    }
    ("item".to_string(), expr.trim().to_string())
}

/// Splits partial arguments at the first top-level comma
///
/// Commas inside strings or brackets belong to the argument expressions.
fn split_partial_args(args: &str) -> Result<(String, Option<String>), CompileError> {
    let b = args.as_bytes();
    let mut p = 0;
    let mut depth = 0usize;
    while p < b.len() {
        match b[p] {
            b'\'' | b'"' => p = scanner::skip_string(args, p)?,
            b'`' => p = scanner::skip_template_string(args, p)?,
            b'{' | b'(' | b'[' => {
                depth += 1;
                p += 1;
            }
            b'}' | b')' | b']' => {
                depth = depth.saturating_sub(1);
                p += 1;
            }
            b',' if depth == 0 => {
                let name = args[..p].trim().to_string();
                let model = args[p + 1..].trim().to_string();
                let model = if model.is_empty() { None } else { Some(model) };
                return Ok((name, model));
            }
            _ => p += 1,
        }
    }
    Ok((args.trim().to_string(), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_direct(src: &str) -> Template {
        compile(src, RenderMode::Direct).expect("compile failed")
    }

    fn compile_err(src: &str) -> CompileError {
        compile(src, RenderMode::Direct).expect_err("expected a compile error")
    }

    #[test]
    fn builds_a_flat_program() {
        let tpl = compile_direct("a{{x}}b{{{y}}}");
        assert_eq!(
            tpl.program,
            vec![
                Node::Text("a".to_string()),
                Node::Encoded("x".to_string()),
                Node::Text("b".to_string()),
                Node::Raw("y".to_string()),
            ]
        );
    }

    #[test]
    fn if_elseif_else_builds_arm_chain() {
        let tpl = compile_direct("{{#if a}}A{{elseif b}}B{{else}}C{{/if}}");
        assert_eq!(
            tpl.program,
            vec![Node::If {
                arms: vec![
                    IfArm { cond: "a".to_string(), body: vec![Node::Text("A".to_string())] },
                    IfArm { cond: "b".to_string(), body: vec![Node::Text("B".to_string())] },
                ],
                else_body: Some(vec![Node::Text("C".to_string())]),
            }]
        );
    }

    #[test]
    fn each_and_with_extract_bindings() {
        let tpl = compile_direct("{{#each x in model.list}}{{x}}{{/each}}");
        assert_eq!(
            tpl.program,
            vec![Node::Each {
                name: "x".to_string(),
                expr: "model.list".to_string(),
                body: vec![Node::Encoded("x".to_string())],
                empty: None,
            }]
        );

        let tpl = compile_direct("{{#with y as model.obj}}{{y}}{{/with}}");
        assert_eq!(
            tpl.program,
            vec![Node::With {
                name: "y".to_string(),
                expr: "model.obj".to_string(),
                body: vec![Node::Encoded("y".to_string())],
                empty: None,
            }]
        );
    }

    #[test]
    fn each_without_binding_defaults_to_item() {
        let tpl = compile_direct("{{#each model.list}}{{item}}{{/each}}");
        match &tpl.program[0] {
            Node::Each { name, expr, .. } => {
                assert_eq!(name, "item");
                assert_eq!(expr, "model.list");
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn binding_keyword_must_be_a_whole_word() {
        // `inx` is not the keyword `in`
        let tpl = compile_direct("{{#each inx}}{{item}}{{/each}}");
        match &tpl.program[0] {
            Node::Each { name, expr, .. } => {
                assert_eq!(name, "item");
                assert_eq!(expr, "inx");
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn each_else_goes_to_the_empty_branch() {
        let tpl = compile_direct("{{#each x in l}}A{{else}}B{{/each}}");
        match &tpl.program[0] {
            Node::Each { body, empty, .. } => {
                assert_eq!(body, &vec![Node::Text("A".to_string())]);
                assert_eq!(empty, &Some(vec![Node::Text("B".to_string())]));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn close_matches_base_kind_after_else() {
        // the else branch is open, but /each still closes the block
        assert!(compile("{{#each x in l}}{{else}}{{/each}}", RenderMode::Direct).is_ok());
        assert!(compile("{{#with x as v}}{{else}}{{/with}}", RenderMode::Direct).is_ok());
    }

    #[test]
    fn capture_keeps_its_target() {
        let tpl = compile_direct("{{#capture model.header}}Hi{{/capture}}");
        assert_eq!(
            tpl.program,
            vec![Node::Capture {
                target: "model.header".to_string(),
                body: vec![Node::Text("Hi".to_string())],
            }]
        );
    }

    #[test]
    fn code_blocks_hoist_to_the_preamble() {
        let tpl = compile_direct("{{#code}}\nfn helper() {}\n{{/code}}\ntext");
        assert_eq!(tpl.preamble, vec!["fn helper() {}\n".to_string()]);
        assert_eq!(tpl.program, vec![Node::Text("text".to_string())]);
    }

    #[test]
    fn partial_arguments_split_at_top_level_commas_only() {
        let tpl = compile_direct(r#"{{> "side", model.section}}"#);
        assert_eq!(
            tpl.program,
            vec![Node::Partial {
                name_expr: r#""side""#.to_string(),
                model_expr: Some("model.section".to_string()),
            }]
        );

        let tpl = compile_direct(r#"{{> names[0, 1], model.x}}"#);
        assert_eq!(
            tpl.program,
            vec![Node::Partial {
                name_expr: "names[0, 1]".to_string(),
                model_expr: Some("model.x".to_string()),
            }]
        );

        let tpl = compile_direct(r#"{{> "a,b"}}"#);
        assert_eq!(
            tpl.program,
            vec![Node::Partial {
                name_expr: r#""a,b""#.to_string(),
                model_expr: None,
            }]
        );
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(
            compile_err("{{#if a}}{{/each}}"),
            CompileError::MismatchedClose { expected: "if", found: "each", .. }
        ));
        assert!(matches!(
            compile_err("{{/if}}"),
            CompileError::UnexpectedClose { found: "if", .. }
        ));
        assert!(matches!(compile_err("{{#if a}}x"), CompileError::MissingClose { kind: "if" }));
        assert!(matches!(compile_err("{{else}}"), CompileError::UnexpectedElse { .. }));
        assert!(matches!(
            compile_err("{{#if a}}{{else}}{{else}}{{/if}}"),
            CompileError::UnexpectedElse { .. }
        ));
        assert!(matches!(
            compile_err("{{#unless a}}{{else}}{{/unless}}"),
            CompileError::UnexpectedElse { .. }
        ));
        assert!(matches!(
            compile_err("{{#each x in l}}{{elseif b}}{{/each}}"),
            CompileError::UnexpectedElseIf { .. }
        ));
        assert!(matches!(
            compile_err("{{#if a}}{{else}}{{elseif b}}{{/if}}"),
            CompileError::UnexpectedElseIf { .. }
        ));
    }

    #[test]
    fn debug_source_shows_the_op_tree() {
        let tpl = compile_direct("{{#code}}let n = 1;{{/code}}{{#if a}}{{x}}{{/if}}");
        let text = tpl.debug_source();
        assert!(text.contains("preamble {"));
        assert!(text.contains("let n = 1;"));
        assert!(text.contains("if a {"));
        assert!(text.contains("encoded(x)"));
    }
}
