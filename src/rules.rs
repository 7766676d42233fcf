use std::fmt;

use crate::error::GrammarError;
use crate::value::{Lambda, Value};

/// Marks a category (non-terminal), e.g. `$E`
pub const CATEGORY_MARKER: char = '$';
/// Marks an optional right-hand item, e.g. `?$Det` or `?please`
pub const OPTIONAL_MARKER: char = '?';

pub fn is_category(label: &str) -> bool {
  label.starts_with(CATEGORY_MARKER)
}

pub fn is_optional(label: &str) -> bool {
  label.starts_with(OPTIONAL_MARKER) && label.len() > 1
}

#[derive(Debug, Clone, PartialEq)]
pub enum Production {
  Terminal(String),
  Category(String),
  /// Only present before compilation; the grammar rewrites these away
  Optional(Box<Production>),
}

impl Production {
  /// Classifies a right-hand label by its markers
  pub fn from_label(label: &str) -> Self {
    if is_optional(label) {
      Self::Optional(Box::new(Self::from_label(&label[1..])))
    } else if is_category(label) {
      Self::Category(label.to_string())
    } else {
      Self::Terminal(label.to_string())
    }
  }

  pub fn symbol_str(&self) -> &str {
    match self {
      Self::Terminal(s) => s,
      Self::Category(s) => s,
      Self::Optional(p) => p.symbol_str(),
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Terminal(_))
  }

  pub fn is_category(&self) -> bool {
    matches!(self, Self::Category(_))
  }

  pub fn is_optional(&self) -> bool {
    matches!(self, Self::Optional(_))
  }
}

impl fmt::Display for Production {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Terminal(s) => write!(f, "{}", s),
      Self::Category(s) => write!(f, "{}", s),
      Self::Optional(p) => write!(f, "{}{}", OPTIONAL_MARKER, p),
    }
  }
}

/// A rule's semantic attachment
#[derive(Debug, Clone, PartialEq)]
pub enum Semantics {
  /// Taken verbatim, whatever the children mean
  Constant(Value),
  /// Applied to the children's meanings, in order
  Function(Lambda),
}

impl Semantics {
  pub fn constant(v: impl Into<Value>) -> Self {
    Self::Constant(v.into())
  }

  pub fn func<F>(f: F) -> Self
  where
    F: Fn(&[Value]) -> Value + 'static,
  {
    Self::Function(Lambda::new("fn", f))
  }

  pub fn named<F>(name: &str, f: F) -> Self
  where
    F: Fn(&[Value]) -> Value + 'static,
  {
    Self::Function(Lambda::new(name, f))
  }

  pub fn apply(&self, children: &[Value]) -> Value {
    match self {
      Self::Constant(v) => v.clone(),
      Self::Function(f) => f.call(children),
    }
  }
}

impl Default for Semantics {
  fn default() -> Self {
    Self::Constant(Value::None)
  }
}

impl From<Value> for Semantics {
  fn from(v: Value) -> Self {
    Self::Constant(v)
  }
}

impl fmt::Display for Semantics {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Constant(v) => write!(f, "{}", v),
      Self::Function(l) => write!(f, "<{}>", l),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
  pub lhs: String,
  pub rhs: Vec<Production>,
  pub sem: Semantics,
}

impl Rule {
  /// Builds a rule from whitespace-separated right-hand labels:
  /// `Rule::new("$E", "$E ?$BinOp $E", sem)`
  pub fn new(lhs: &str, rhs: &str, sem: Semantics) -> Result<Self, GrammarError> {
    Self::from_productions(lhs, rhs.split_whitespace().map(Production::from_label).collect(), sem)
  }

  pub fn from_productions(
    lhs: &str,
    rhs: Vec<Production>,
    sem: Semantics,
  ) -> Result<Self, GrammarError> {
    if !is_category(lhs) {
      return Err(GrammarError::NotACategory(lhs.to_string()));
    }
    if rhs.is_empty() {
      return Err(GrammarError::EmptyRhs(lhs.to_string()));
    }
    Ok(Self {
      lhs: lhs.to_string(),
      rhs,
      sem,
    })
  }

  /// A rule over literal tokens, used for annotations. Tokens are never
  /// interpreted as categories or optionals, whatever they start with.
  pub fn lexical(lhs: &str, tokens: &[&str], sem: Semantics) -> Result<Self, GrammarError> {
    let rhs = tokens
      .iter()
      .map(|t| Production::Terminal(t.to_string()))
      .collect();
    Self::from_productions(lhs, rhs, sem)
  }

  pub fn len(&self) -> usize {
    self.rhs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_lexical(&self) -> bool {
    self.rhs.iter().all(Production::is_terminal)
  }

  pub fn is_unary(&self) -> bool {
    self.len() == 1 && self.rhs[0].is_category()
  }

  pub fn is_binary(&self) -> bool {
    self.len() == 2 && self.rhs.iter().all(Production::is_category)
  }

  /// Three or more categories and nothing else
  pub fn is_nary(&self) -> bool {
    self.len() > 2 && self.rhs.iter().all(Production::is_category)
  }

  pub fn has_optionals(&self) -> bool {
    self.rhs.iter().any(Production::is_optional)
  }

  /// The terminal sequence of a lexical rule
  pub fn terminals(&self) -> Vec<String> {
    self
      .rhs
      .iter()
      .filter(|p| p.is_terminal())
      .map(|p| p.symbol_str().to_string())
      .collect()
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ->", self.lhs)?;
    for p in self.rhs.iter() {
      write!(f, " {}", p)?;
    }
    write!(f, " = {}", self.sem)
  }
}
