//! Source-location vocabulary shared with the document parser.
//!
//! Parsing itself lives outside this crate; executable documents arrive
//! already turned into the [`crate::ast`] types. What the executor needs from
//! the parser is the position information attached to every node, so that
//! errors raised during resolution can point back into the query source.

use std::fmt;

/// A reference to a line and column in an input source file.
///
/// Both are zero-based internally; serialization into GraphQL error
/// `locations` converts to the customary one-based form.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SourcePosition {
    line: usize,
    col: usize,
}

impl SourcePosition {
    #[doc(hidden)]
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }

    /// The position of the first character in the input source.
    pub fn new_origin() -> Self {
        Self { line: 0, col: 0 }
    }

    /// The line of the character in the input source, zero-based.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The column of the character in the input source, zero-based.
    pub fn column(&self) -> usize {
        self.col
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Range of characters in the input source, starting at the character pointed
/// by the `start` field and ending just before the `end` marker.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Span {
    /// Start position of this [`Span`].
    pub start: SourcePosition,

    /// End position of this [`Span`].
    ///
    /// > __NOTE__: This points to the first source position __after__ this
    /// > [`Span`].
    pub end: SourcePosition,
}

impl Span {
    #[doc(hidden)]
    #[inline]
    pub fn zero_width(pos: SourcePosition) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn unlocated() -> Self {
        Self {
            start: SourcePosition::new_origin(),
            end: SourcePosition::new_origin(),
        }
    }
}

/// Data structure used to wrap items into a [`Span`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Spanning<T> {
    /// Wrapped item.
    pub item: T,

    /// [`Span`] of the wrapped item.
    pub span: Span,
}

impl<T> Spanning<T> {
    #[doc(hidden)]
    pub fn new(span: Span, item: T) -> Self {
        Self { item, span }
    }

    #[doc(hidden)]
    pub fn zero_width(pos: &SourcePosition, item: T) -> Self {
        Self::new(Span::zero_width(*pos), item)
    }

    /// Wraps an item that carries no source information, e.g. one constructed
    /// programmatically rather than parsed.
    pub fn unlocated(item: T) -> Self {
        Self::new(Span::unlocated(), item)
    }

    /// Returns the start position of the item.
    #[inline]
    pub fn start(&self) -> SourcePosition {
        self.span.start
    }

    /// Modify the contents of the spanned item.
    pub fn map<O, F: FnOnce(T) -> O>(self, f: F) -> Spanning<O> {
        Spanning::new(self.span, f(self.item))
    }
}

impl<T: fmt::Display> fmt::Display for Spanning<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. At {}", self.item, self.span.start)
    }
}
