use std::fmt;

use crate::value::Value;

/// An input with its gold meaning and/or gold denotation. Either may be
/// missing, e.g. when learning from denotations only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Example {
  pub input: String,
  pub semantics: Option<Value>,
  pub denotation: Option<Value>,
}

impl Example {
  pub fn new(input: &str) -> Self {
    Self {
      input: input.to_string(),
      ..Default::default()
    }
  }

  pub fn with_semantics(mut self, semantics: impl Into<Value>) -> Self {
    self.semantics = Some(semantics.into());
    self
  }

  pub fn with_denotation(mut self, denotation: impl Into<Value>) -> Self {
    self.denotation = Some(denotation.into());
    self
  }
}

impl fmt::Display for Example {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Example(input={:?}", self.input)?;
    if let Some(sem) = &self.semantics {
      write!(f, ", semantics={}", sem)?;
    }
    if let Some(den) = &self.denotation {
      write!(f, ", denotation={}", den)?;
    }
    write!(f, ")")
  }
}

#[test]
fn test_display() {
  let ex = Example::new("two plus three")
    .with_semantics(crate::tuple!["+", 2, 3])
    .with_denotation(5);
  assert_eq!(
    ex.to_string(),
    "Example(input=\"two plus three\", semantics=(+ 2 3), denotation=5)"
  );
  assert_eq!(Example::new("one").to_string(), "Example(input=\"one\")");
}
