//! Lazy tokenizer for template source text
//!
//! Turns raw template text into an ordered, finite sequence of tokens.
//! The iterator is pure over fixed text and non-restartable: tokenizing
//! the same source twice yields identical sequences.

use std::collections::VecDeque;

use crate::error::CompileError;
use crate::scanner;
use crate::token::{Directive, Token, TokenKind};

/// Streaming tokenizer over template source
///
/// Yields `Result<Token, CompileError>`; the first error ends the stream.
pub struct Tokenizer<'t> {
    src: &'t str,
    pos: usize,
    pending: VecDeque<Token<'t>>,
    failed: bool,
}

impl<'t> Tokenizer<'t> {
    /// Creates a tokenizer over `src`
    pub fn new(src: &'t str) -> Self {
        Tokenizer {
            src,
            pos: 0,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    fn push(&mut self, kind: TokenKind<'t>, offset: usize) {
        self.pending.push_back(Token { kind, offset });
    }

    /// Scans one directive boundary, queueing the tokens it produces
    fn step(&mut self) -> Result<(), CompileError> {
        let s = self.src;
        let b = s.as_bytes();
        let p = self.pos;

        // Find the next open delimiter; everything after the last one is
        // a single trailing literal.
        let Some(rel) = s[p..].find("{{") else {
            self.push(TokenKind::Literal(&s[p..]), p);
            self.pos = s.len();
            return Ok(());
        };
        let original_token_pos = p + rel;
        let mut token_pos = original_token_pos;

        // {{!-- comment --}}
        if s[token_pos + 2..].starts_with("!--") {
            let close_rel = s[token_pos..]
                .find("--}}")
                .ok_or(CompileError::UnclosedComment { offset: token_pos })?;
            let end_pos = token_pos + close_rel + 4;
            let (tp, ep) = scanner::consume_line_space(s, token_pos, end_pos);
            if tp > p {
                self.push(TokenKind::Literal(&s[p..tp]), p);
            }
            self.pos = ep;
            return Ok(());
        }

        // {{{{ raw passthrough }}}}
        if b.get(token_pos + 2) == Some(&b'{') && b.get(token_pos + 3) == Some(&b'{') {
            let close_rel = s[token_pos..]
                .find("}}}}")
                .ok_or(CompileError::UnclosedRawBlock { offset: token_pos })?;
            let mut end_pos = token_pos + close_rel;
            // Trailing brace runs belong to the raw text
            while b.get(end_pos + 4) == Some(&b'}') {
                end_pos += 1;
            }
            if token_pos > p {
                self.push(TokenKind::Literal(&s[p..token_pos]), p);
            }
            if end_pos > token_pos + 4 {
                self.push(TokenKind::Literal(&s[token_pos + 4..end_pos]), token_pos + 4);
            }
            self.pos = end_pos + 4;
            return Ok(());
        }

        let (mode, close): (usize, &'static str) = if b.get(token_pos + 2) == Some(&b'{') {
            (3, "}}}")
        } else {
            (2, "}}")
        };

        let mut inner_pos = token_pos + mode;
        let mut trim_before = false;
        if b.get(inner_pos) == Some(&b'~') {
            inner_pos += 1;
            trim_before = true;
        }

        let mut open_kind: Option<Directive> = None;
        let mut close_kind: Option<Directive> = None;
        if mode == 2 {
            match b.get(inner_pos) {
                Some(&sigil @ (b'#' | b'/')) => {
                    inner_pos += 1;
                    let name = scanner::read_identifier(s, inner_pos);
                    inner_pos += name.len();
                    let directive = Directive::parse(name).ok_or_else(|| {
                        CompileError::UnknownDirective {
                            name: format!("{}{}", sigil as char, name),
                            offset: original_token_pos,
                        }
                    })?;
                    if sigil == b'#' {
                        open_kind = Some(directive);
                    } else {
                        // else/elseif never close anything
                        if matches!(directive, Directive::Else | Directive::ElseIf) {
                            return Err(CompileError::UnknownDirective {
                                name: format!("/{name}"),
                                offset: original_token_pos,
                            });
                        }
                        close_kind = Some(directive);
                    }
                }
                Some(b'^') => {
                    // {{^}} is else, {{^if expr}} is elseif
                    inner_pos += 1;
                    if scanner::read_identifier(s, inner_pos) == "if" {
                        open_kind = Some(Directive::ElseIf);
                        inner_pos += 2;
                    } else {
                        open_kind = Some(Directive::Else);
                    }
                }
                _ => {
                    // bare {{else}} / {{elseif expr}} sugar
                    let id = scanner::read_identifier(s, inner_pos);
                    if id == "else" {
                        open_kind = Some(Directive::Else);
                        inner_pos += 4;
                    } else if id == "elseif" {
                        open_kind = Some(Directive::ElseIf);
                        inner_pos += 6;
                    }
                }
            }
        }

        let mut inner_end = scanner::skip_expression(s, inner_pos)?;
        if !s[inner_end..].starts_with(close) {
            return Err(CompileError::MalformedDirective {
                expected: close,
                offset: inner_end,
            });
        }
        let mut end_pos = inner_end + mode;

        if inner_end > inner_pos && b[inner_end - 1] == b'~' {
            inner_end -= 1;
            // explicit trim-after marker
            while end_pos < b.len() && scanner::is_white_space(b[end_pos]) {
                end_pos += 1;
            }
            if trim_before {
                while token_pos > p && scanner::is_white_space(b[token_pos - 1]) {
                    token_pos -= 1;
                }
            }
        } else if trim_before {
            while token_pos > p && scanner::is_white_space(b[token_pos - 1]) {
                token_pos -= 1;
            }
        } else if mode == 2 {
            // no explicit markers: standalone-line suppression
            let (tp, ep) = scanner::consume_line_space(s, token_pos, end_pos);
            token_pos = tp;
            end_pos = ep;
        }

        if token_pos > p {
            self.push(TokenKind::Literal(&s[p..token_pos]), p);
        }

        if let Some(directive) = open_kind {
            if directive == Directive::Code {
                // The body is everything up to the literal close tag; no
                // expression scanning happens inside it.
                let close_rel = s[end_pos..].find("{{/code}}").ok_or(CompileError::UnclosedCode {
                    offset: original_token_pos,
                })?;
                let close_pos = end_pos + close_rel;
                self.push(TokenKind::Code(&s[end_pos..close_pos]), original_token_pos);
                self.pos = scanner::skip_line_tail(s, close_pos + "{{/code}}".len());
                return Ok(());
            }
            let expr = s[inner_pos..inner_end].trim();
            self.push(TokenKind::Open { directive, expr }, original_token_pos);
        } else if let Some(directive) = close_kind {
            self.push(TokenKind::Close(directive), original_token_pos);
        } else {
            let expr = s[inner_pos..inner_end].trim();
            if mode == 2 {
                if let Some(rest) = expr.strip_prefix('>') {
                    self.push(TokenKind::Partial(rest.trim_start()), original_token_pos);
                } else {
                    self.push(TokenKind::Encoded(expr), original_token_pos);
                }
            } else {
                self.push(TokenKind::Raw(expr), original_token_pos);
            }
        }

        self.pos = end_pos;
        Ok(())
    }
}

impl<'t> Iterator for Tokenizer<'t> {
    type Item = Result<Token<'t>, CompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.failed || self.pos >= self.src.len() {
                return None;
            }
            if let Err(err) = self.step() {
                self.failed = true;
                return Some(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token<'_>> {
        Tokenizer::new(src)
            .collect::<Result<Vec<_>, _>>()
            .expect("tokenize failed")
    }

    fn kinds(src: &str) -> Vec<TokenKind<'_>> {
        tokens(src).into_iter().map(|t| t.kind).collect()
    }

    fn error(src: &str) -> CompileError {
        Tokenizer::new(src)
            .collect::<Result<Vec<_>, _>>()
            .expect_err("expected a tokenize error")
    }

    #[test]
    fn plain_text_is_one_literal() {
        assert_eq!(
            tokens("<html>"),
            vec![Token {
                kind: TokenKind::Literal("<html>"),
                offset: 0
            }]
        );
    }

    #[test]
    fn classifies_encoded_and_raw_expressions() {
        assert_eq!(
            tokens("line1\n{{expr}}{{{expr2}}}\ntail"),
            vec![
                Token { kind: TokenKind::Literal("line1\n"), offset: 0 },
                Token { kind: TokenKind::Encoded("expr"), offset: 6 },
                Token { kind: TokenKind::Raw("expr2"), offset: 14 },
                Token { kind: TokenKind::Literal("\ntail"), offset: 25 },
            ]
        );
    }

    #[test]
    fn expressions_may_contain_directive_delimiters_in_strings() {
        assert_eq!(
            kinds(r#"{{"{{"}}{{"}}"}}"#),
            vec![TokenKind::Encoded(r#""{{""#), TokenKind::Encoded(r#""}}""#)]
        );
    }

    #[test]
    fn directive_open_and_close() {
        assert_eq!(
            kinds("{{#if a}}A{{/if}}"),
            vec![
                TokenKind::Open { directive: Directive::If, expr: "a" },
                TokenKind::Literal("A"),
                TokenKind::Close(Directive::If),
            ]
        );
    }

    #[test]
    fn else_and_elseif_sugar_forms() {
        assert_eq!(
            kinds("{{#if a}}A{{^if b}}B{{elseif c}}C{{^}}D{{/if}}"),
            vec![
                TokenKind::Open { directive: Directive::If, expr: "a" },
                TokenKind::Literal("A"),
                TokenKind::Open { directive: Directive::ElseIf, expr: "b" },
                TokenKind::Literal("B"),
                TokenKind::Open { directive: Directive::ElseIf, expr: "c" },
                TokenKind::Literal("C"),
                TokenKind::Open { directive: Directive::Else, expr: "" },
                TokenKind::Literal("D"),
                TokenKind::Close(Directive::If),
            ]
        );
        assert_eq!(
            kinds("{{#if a}}A{{else}}B{{/if}}"),
            vec![
                TokenKind::Open { directive: Directive::If, expr: "a" },
                TokenKind::Literal("A"),
                TokenKind::Open { directive: Directive::Else, expr: "" },
                TokenKind::Literal("B"),
                TokenKind::Close(Directive::If),
            ]
        );
    }

    #[test]
    fn identifiers_merely_starting_with_else_are_expressions() {
        assert_eq!(kinds("{{elsewhere}}"), vec![TokenKind::Encoded("elsewhere")]);
    }

    #[test]
    fn partial_invocations() {
        assert_eq!(
            kinds(r#"{{> "sidebar", model.x}}"#),
            vec![TokenKind::Partial(r#""sidebar", model.x"#)]
        );
        assert_eq!(kinds("{{>nav}}"), vec![TokenKind::Partial("nav")]);
    }

    #[test]
    fn own_line_comments_remove_the_whole_line() {
        assert_eq!(
            kinds("a\n  {{!-- note --}}  \nb"),
            vec![TokenKind::Literal("a\n"), TokenKind::Literal("b")]
        );
    }

    #[test]
    fn inline_comments_remove_only_their_span() {
        assert_eq!(
            kinds("a {{!-- note --}} b"),
            vec![TokenKind::Literal("a "), TokenKind::Literal(" b")]
        );
    }

    #[test]
    fn raw_passthrough_blocks() {
        assert_eq!(
            kinds("pre{{{{RAW {{ }} TEXT}}}}post"),
            vec![
                TokenKind::Literal("pre"),
                TokenKind::Literal("RAW {{ }} TEXT"),
                TokenKind::Literal("post"),
            ]
        );
    }

    #[test]
    fn raw_passthrough_greedily_keeps_trailing_braces() {
        assert_eq!(kinds("{{{{a}}}}}}"), vec![TokenKind::Literal("a}}")]);
    }

    #[test]
    fn explicit_trim_markers() {
        assert_eq!(
            kinds("x \n {{~y~}} \nz"),
            vec![
                TokenKind::Literal("x"),
                TokenKind::Encoded("y"),
                TokenKind::Literal("z"),
            ]
        );
    }

    #[test]
    fn standalone_directive_lines_are_suppressed() {
        assert_eq!(
            kinds("A\n{{#if x}}\nB\n{{/if}}\nC"),
            vec![
                TokenKind::Literal("A\n"),
                TokenKind::Open { directive: Directive::If, expr: "x" },
                TokenKind::Literal("B\n"),
                TokenKind::Close(Directive::If),
                TokenKind::Literal("C"),
            ]
        );
    }

    #[test]
    fn inline_directives_keep_surrounding_text() {
        assert_eq!(
            kinds("A {{#if x}}B{{/if}} C"),
            vec![
                TokenKind::Literal("A "),
                TokenKind::Open { directive: Directive::If, expr: "x" },
                TokenKind::Literal("B"),
                TokenKind::Close(Directive::If),
                TokenKind::Literal(" C"),
            ]
        );
    }

    #[test]
    fn triple_brace_tokens_never_auto_trim() {
        assert_eq!(
            kinds("a\n{{{x}}}\nb"),
            vec![
                TokenKind::Literal("a\n"),
                TokenKind::Raw("x"),
                TokenKind::Literal("\nb"),
            ]
        );
    }

    #[test]
    fn code_blocks_scan_for_the_literal_close() {
        assert_eq!(
            kinds("{{#code}}\nlet x = 1; {{#if not a directive}}\n{{/code}}\nX"),
            vec![
                TokenKind::Code("let x = 1; {{#if not a directive}}\n"),
                TokenKind::Literal("X"),
            ]
        );
    }

    #[test]
    fn tokenizing_twice_is_deterministic() {
        let src = "a{{x}}b{{#each i in [1,2]}}{{i}}{{/each}}c{{!-- hi --}}d";
        let first = tokens(src);
        let second = tokens(src);
        assert_eq!(first, second);
    }

    #[test]
    fn unterminated_string_in_expression_is_fatal() {
        assert!(matches!(
            error(r#"{{"abc}}"#),
            CompileError::UnterminatedString { .. }
        ));
    }

    #[test]
    fn missing_close_delimiter_is_fatal() {
        assert!(matches!(
            error("{{x}"),
            CompileError::MalformedDirective { expected: "}}", .. }
        ));
        assert!(matches!(
            error("text {{{x}}"),
            CompileError::MalformedDirective { expected: "}}}", .. }
        ));
    }

    #[test]
    fn unclosed_constructs_are_fatal() {
        assert!(matches!(error("{{!-- x"), CompileError::UnclosedComment { offset: 0 }));
        assert!(matches!(error("{{{{x}}"), CompileError::UnclosedRawBlock { offset: 0 }));
        assert!(matches!(error("{{#code}}x"), CompileError::UnclosedCode { offset: 0 }));
    }

    #[test]
    fn unknown_directive_names_are_fatal() {
        assert!(matches!(
            error("{{#frob x}}"),
            CompileError::UnknownDirective { .. }
        ));
        assert!(matches!(error("{{/else}}"), CompileError::UnknownDirective { .. }));
    }
}
