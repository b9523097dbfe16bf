//! Error types for template compilation and rendering

use thiserror::Error;

use crate::template::RenderMode;

/// Errors raised while tokenizing or compiling a template
///
/// Compilation is all-or-nothing: the first error aborts the compile and
/// no partial template is produced. Lexical variants carry the byte offset
/// of the offending character; structural variants name the directive
/// kinds involved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A quoted literal inside an expression reached a raw newline or the
    /// end of input before its closing quote
    #[error("unterminated string literal at offset {offset}")]
    UnterminatedString {
        /// Byte offset of the character that ended the scan
        offset: usize,
    },

    /// A `{{!--` comment with no matching `--}}`
    #[error("unclosed comment at offset {offset}")]
    UnclosedComment {
        /// Byte offset of the comment opener
        offset: usize,
    },

    /// A 4-brace raw block with no matching close
    #[error("unclosed raw block at offset {offset}")]
    UnclosedRawBlock {
        /// Byte offset of the raw block opener
        offset: usize,
    },

    /// A `#code` block with no literal `{{/code}}` close
    #[error("unclosed code block at offset {offset}")]
    UnclosedCode {
        /// Byte offset of the code block opener
        offset: usize,
    },

    /// An opened bracket inside an expression was closed by the wrong
    /// character (or not at all)
    #[error("unmatched expression delimiter, expected `{expected}` at offset {offset}")]
    UnmatchedDelimiter {
        /// The closing character the scanner was looking for
        expected: char,
        /// Byte offset where the scan stopped
        offset: usize,
    },

    /// The token's closing brace run did not match its opening run
    #[error("malformed directive, expected `{expected}` at offset {offset}")]
    MalformedDirective {
        /// The close delimiter that was expected (`}}` or `}}}`)
        expected: &'static str,
        /// Byte offset where the close delimiter should have appeared
        offset: usize,
    },

    /// A `#name` or `/name` directive with a name outside the fixed set
    #[error("unknown directive `{name}` at offset {offset}")]
    UnknownDirective {
        /// The unrecognized directive name
        name: String,
        /// Byte offset of the directive token
        offset: usize,
    },

    /// A closing tag whose kind does not match the innermost open block
    #[error("closing tag mismatch at offset {offset}: expected /{expected}, found /{found}")]
    MismatchedClose {
        /// Base kind of the innermost open block
        expected: &'static str,
        /// Kind named by the closing tag
        found: &'static str,
        /// Byte offset of the closing tag
        offset: usize,
    },

    /// A closing tag with no block open at all
    #[error("unexpected closing tag /{found} at offset {offset}")]
    UnexpectedClose {
        /// Kind named by the closing tag
        found: &'static str,
        /// Byte offset of the closing tag
        offset: usize,
    },

    /// An `else` outside an `if`, `each` or `with` block, or a second
    /// `else` in the same block
    #[error("unexpected else directive at offset {offset}")]
    UnexpectedElse {
        /// Byte offset of the directive
        offset: usize,
    },

    /// An `elseif` anywhere other than directly inside an `if` block
    #[error("unexpected elseif directive at offset {offset}")]
    UnexpectedElseIf {
        /// Byte offset of the directive
        offset: usize,
    },

    /// End of template reached with a block still open
    #[error("missing closing tag for #{kind}")]
    MissingClose {
        /// Base kind of the innermost unclosed block
        kind: &'static str,
    },
}

/// Errors raised while executing a compiled template
///
/// Render failures propagate uncaught to the caller; the engine performs
/// no retry or degraded-output fallback.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The expression evaluator rejected an expression
    #[error("failed to evaluate `{expr}`: {message}")]
    Eval {
        /// The offending expression text
        expr: String,
        /// Evaluator-supplied detail
        message: String,
    },

    /// A capture block's target expression could not be assigned
    #[error("cannot assign capture result to `{target}`: {message}")]
    Assign {
        /// The capture target expression
        target: String,
        /// Evaluator-supplied detail
        message: String,
    },

    /// A partial was invoked but the context carries no resolver
    #[error("no partial resolver configured (while rendering partial `{name}`)")]
    NoPartialResolver {
        /// Resolved name of the partial
        name: String,
    },

    /// The resolver does not know the requested partial
    #[error("partial `{name}` not found")]
    PartialNotFound {
        /// Resolved name of the partial
        name: String,
    },

    /// A template was invoked through the entry point of the other mode
    #[error("template compiled for {compiled} rendering was invoked as {requested}")]
    ModeMismatch {
        /// Mode the template was compiled for
        compiled: RenderMode,
        /// Mode of the entry point that was called
        requested: RenderMode,
    },
}
