use std::fmt::{Debug, Display};

/// Location of a token in the source text. `line` and `column` are 1-based.
#[derive(Clone, Copy, PartialEq, Debug, Eq, Hash, Default)]
pub struct Span {
  pub start: usize,
  pub end: usize,
  pub line: usize,
  pub column: usize,
}

impl Span {
  pub fn identity() -> Self {
    Self {
      start: 0,
      end: 0,
      line: 0,
      column: 0
    }
  }

  pub fn between(&self, to: Self) -> Self {
    Span {
      start: self.start,
      end: to.end,
      line: self.line,
      column: self.column,
    }
  }

  pub fn wrap<T>(self, value: T) -> Positioned<T> {
    Positioned { value, span: self }
  }
}

impl Display for Span {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "line {}, column {}", self.line, self.column)
  }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Positioned<T> {
  pub value: T,
  pub span: Span,
}

impl<T> Positioned<T> {
  pub fn new(value: T, span: Span) -> Positioned<T> {
    Positioned { value, span }
  }

  pub fn identity(value: T) -> Positioned<T> {
    Positioned { value, span: Span::identity() }
  }
}

impl<T: Debug> Debug for Positioned<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}", self.value)
  }
}
