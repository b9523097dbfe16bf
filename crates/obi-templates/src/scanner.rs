//! Scanner primitives for the template tokenizer
//!
//! All functions work on byte positions into a `&str`. Every delimiter the
//! scanner cares about is ASCII, so byte scanning never lands a returned
//! position inside a multi-byte character: positions only ever stop at
//! ASCII delimiters.

use crate::error::CompileError;

/// Returns true for space and tab
pub(crate) fn is_line_space(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Returns true for space, tab, carriage return and newline
pub(crate) fn is_white_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// Returns true for identifier bytes: `[A-Za-z0-9_$]`
pub(crate) fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Advances past any run of spaces and tabs
pub(crate) fn skip_line_space(s: &str, mut p: usize) -> usize {
    let b = s.as_bytes();
    while p < b.len() && is_line_space(b[p]) {
        p += 1;
    }
    p
}

/// Advances past any run of whitespace including line breaks
pub(crate) fn skip_white_space(s: &str, mut p: usize) -> usize {
    let b = s.as_bytes();
    while p < b.len() && is_white_space(b[p]) {
        p += 1;
    }
    p
}

/// Consumes trailing line space and at most one line break, but only if
/// nothing else sits between `p_in` and the end of the line. Returns
/// `p_in` unchanged otherwise.
pub(crate) fn skip_line_tail(s: &str, p_in: usize) -> usize {
    let b = s.as_bytes();
    let mut p = skip_line_space(s, p_in);
    if p >= b.len() || b[p] == b'\r' || b[p] == b'\n' {
        if b.get(p) == Some(&b'\r') {
            p += 1;
        }
        if b.get(p) == Some(&b'\n') {
            p += 1;
        }
        return p;
    }
    p_in
}

/// Reads the longest identifier run starting at `p`
pub(crate) fn read_identifier(s: &str, p: usize) -> &str {
    let b = s.as_bytes();
    let mut q = p;
    while q < b.len() && is_identifier_byte(b[q]) {
        q += 1;
    }
    &s[p..q]
}

/// Advances past an ordinary quoted literal, honoring backslash escapes
///
/// `p` must point at the opening quote. A raw newline or end of input
/// before the closing quote is fatal.
pub(crate) fn skip_string(s: &str, mut p: usize) -> Result<usize, CompileError> {
    let b = s.as_bytes();
    let quote = b[p];
    p += 1;
    loop {
        match b.get(p) {
            None | Some(b'\r') | Some(b'\n') => {
                return Err(CompileError::UnterminatedString { offset: p })
            }
            Some(&c) if c == quote => return Ok(p + 1),
            Some(b'\\') => p += 2,
            Some(_) => p += 1,
        }
    }
}

/// Advances past a back-quoted literal
///
/// `${...}` substitutions are scanned recursively through
/// [`skip_expression`]; raw newlines are legal inside the literal.
pub(crate) fn skip_template_string(s: &str, mut p: usize) -> Result<usize, CompileError> {
    let b = s.as_bytes();
    p += 1;
    loop {
        match b.get(p) {
            None => return Err(CompileError::UnterminatedString { offset: p }),
            Some(b'`') => return Ok(p + 1),
            Some(b'$') if b.get(p + 1) == Some(&b'{') => {
                p = skip_expression(s, p + 2)?;
                if b.get(p) != Some(&b'}') {
                    return Err(CompileError::UnmatchedDelimiter {
                        expected: '}',
                        offset: p,
                    });
                }
                p += 1;
            }
            Some(b'\\') => p += 2,
            Some(_) => p += 1,
        }
    }
}

/// Finds the boundary of an embedded expression without parsing it
///
/// Balances `{}`, `()` and `[]` recursively and consumes string and
/// template literals whole, so expressions may contain raw braces without
/// being mistaken for directive delimiters. The scan stops at the first
/// unmatched closing bracket or at end of input.
///
/// The scan returns at *any* unmatched closing bracket, including one
/// inside a construct it does not model; the boundary finder is
/// deliberately not a grammar for the expression language.
pub(crate) fn skip_expression(s: &str, mut p: usize) -> Result<usize, CompileError> {
    let b = s.as_bytes();
    while p < b.len() {
        p = skip_white_space(s, p);
        if p >= b.len() {
            break;
        }
        match b[p] {
            b'}' | b')' | b']' => return Ok(p),
            b'{' => p = skip_balanced(s, p, b'}')?,
            b'(' => p = skip_balanced(s, p, b')')?,
            b'[' => p = skip_balanced(s, p, b']')?,
            b'\'' | b'"' => p = skip_string(s, p)?,
            b'`' => p = skip_template_string(s, p)?,
            _ => p += 1,
        }
    }
    Ok(p)
}

fn skip_balanced(s: &str, p: usize, close: u8) -> Result<usize, CompileError> {
    let b = s.as_bytes();
    let mut q = skip_expression(s, p + 1)?;
    q = skip_white_space(s, q);
    if b.get(q) != Some(&close) {
        return Err(CompileError::UnmatchedDelimiter {
            expected: close as char,
            offset: q,
        });
    }
    Ok(q + 1)
}

/// Widens `[start, end)` to swallow a whitespace-only line prefix and
/// suffix, but only when the surrounding whitespace reaches back to the
/// start of the line and forward to the end of the line (or end of
/// input). Returns the input range unchanged otherwise.
///
/// This is what makes a directive alone on its own line disappear along
/// with the line itself.
pub(crate) fn consume_line_space(s: &str, start_in: usize, end_in: usize) -> (usize, usize) {
    let b = s.as_bytes();

    let mut start = start_in;
    while start > 0 && is_line_space(b[start - 1]) {
        start -= 1;
    }

    if start == 0 || b[start - 1] == b'\r' || b[start - 1] == b'\n' {
        let mut end = skip_line_space(s, end_in);
        if end >= b.len() || b[end] == b'\r' || b[end] == b'\n' {
            if b.get(end) == Some(&b'\r') {
                end += 1;
            }
            if b.get(end) == Some(&b'\n') {
                end += 1;
            }
            return (start, end);
        }
    }

    (start_in, end_in)
}
