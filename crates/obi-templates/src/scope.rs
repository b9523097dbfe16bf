//! Runtime scope records and name bindings
//!
//! A [`Scope`] is created per active `#each` nesting level and exposes the
//! iteration position to expressions (`scope.index`, `scope.first`, ...).
//! Bound names (`{{#each x in ...}}`, `{{#with y as ...}}`) live in a
//! separate chain so an outer name stays visible inside an inner body
//! unless shadowed by reuse.

use serde_json::Value;

/// Iteration context for one active `#each` level
///
/// Records chain outward through `outer`; each record lives exactly as
/// long as its block body is rendering.
#[derive(Debug)]
pub struct Scope<'a> {
    /// The enclosing iteration's record, if any
    pub outer: Option<&'a Scope<'a>>,
    /// Zero-based position of the current item; `-1` on the record passed
    /// to an empty-iteration body
    pub index: i64,
    /// True on the first item
    pub first: bool,
    /// True on the last item
    pub last: bool,
    /// The current item
    pub item: Value,
    /// The full normalized item list
    pub items: &'a [Value],
}

/// One link in the bound-name chain
#[derive(Debug)]
pub(crate) struct Bindings<'a> {
    parent: Option<&'a Bindings<'a>>,
    name: &'a str,
    value: &'a Value,
}

impl<'a> Bindings<'a> {
    pub(crate) fn new(parent: Option<&'a Bindings<'a>>, name: &'a str, value: &'a Value) -> Self {
        Bindings { parent, name, value }
    }

    /// Innermost-first lookup
    pub(crate) fn lookup(&self, name: &str) -> Option<&'a Value> {
        if self.name == name {
            Some(self.value)
        } else {
            self.parent.and_then(|p| p.lookup(name))
        }
    }
}
