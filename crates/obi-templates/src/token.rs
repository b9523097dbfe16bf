//! Token types produced by the tokenizer

/// The fixed set of block directive names
///
/// Directive dispatch is a closed enum rather than string comparison so
/// the compiler can match exhaustively; names outside this set fail
/// tokenization with an unknown-directive error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// `{{#if expr}}`
    If,
    /// `{{#unless expr}}`
    Unless,
    /// `{{#each [name in] expr}}`
    Each,
    /// `{{#with [name as] expr}}`
    With,
    /// `{{#capture target}}`
    Capture,
    /// `{{#code}}` passthrough block
    Code,
    /// `{{#else}}` and its sugar forms
    Else,
    /// `{{#elseif expr}}` and its sugar forms
    ElseIf,
}

impl Directive {
    /// The directive's name as written in templates
    pub fn name(self) -> &'static str {
        match self {
            Directive::If => "if",
            Directive::Unless => "unless",
            Directive::Each => "each",
            Directive::With => "with",
            Directive::Capture => "capture",
            Directive::Code => "code",
            Directive::Else => "else",
            Directive::ElseIf => "elseif",
        }
    }

    /// Looks a name up in the fixed directive set
    pub fn parse(name: &str) -> Option<Directive> {
        match name {
            "if" => Some(Directive::If),
            "unless" => Some(Directive::Unless),
            "each" => Some(Directive::Each),
            "with" => Some(Directive::With),
            "capture" => Some(Directive::Capture),
            "code" => Some(Directive::Code),
            "else" => Some(Directive::Else),
            "elseif" => Some(Directive::ElseIf),
            _ => None,
        }
    }
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a single token is, with payload text borrowed from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind<'t> {
    /// Plain template text, emitted verbatim
    Literal(&'t str),
    /// `{{expr}}` — output escaped
    Encoded(&'t str),
    /// `{{{expr}}}` — output unescaped
    Raw(&'t str),
    /// `{{#directive expr}}`
    Open {
        /// Which block directive opened
        directive: Directive,
        /// The trimmed expression text following the directive name
        expr: &'t str,
    },
    /// `{{/directive}}`
    Close(Directive),
    /// `{{>expr}}` partial invocation
    Partial(&'t str),
    /// The verbatim body of a `{{#code}}...{{/code}}` block
    Code(&'t str),
}

/// One token together with its source byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'t> {
    /// What the token is
    pub kind: TokenKind<'t>,
    /// Byte offset of the token's first character in the source
    pub offset: usize,
}
