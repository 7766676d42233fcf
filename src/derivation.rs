use std::fmt;
use std::rc::Rc;

use crate::error::GrammarError;
use crate::rules::{Production, Rule, Semantics};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Child {
  Token(String),
  Node(Rc<Derivation>),
}

impl Child {
  fn semantics(&self) -> Value {
    match self {
      Self::Token(t) => Value::from(t.as_str()),
      Self::Node(d) => d.semantics().clone(),
    }
  }

  pub fn get_node(&self) -> Option<&Derivation> {
    match self {
      Self::Node(d) => Some(d),
      _ => None,
    }
  }
}

/// A tree of rule applications over a span of tokens. Its meaning is computed
/// once, when it is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
  pub rule: Rc<Rule>,
  pub children: Vec<Child>,
  semantics: Value,
  pub score: Option<f64>,
  pub denotation: Option<Value>,
}

impl Derivation {
  /// Checks that `children` match the rule's right-hand side, then computes
  /// the meaning.
  pub fn new(rule: Rc<Rule>, children: Vec<Child>) -> Result<Self, GrammarError> {
    Self::validate(&rule, &children)?;
    Ok(Self::build(rule, children))
  }

  /// Builds without validation; for the chart, whose rule lookups already
  /// guarantee that children line up.
  pub(crate) fn build(rule: Rc<Rule>, children: Vec<Child>) -> Self {
    debug_assert!(Self::validate(&rule, &children).is_ok());
    let semantics = Self::compute_semantics(&rule, &children);
    Self {
      rule,
      children,
      semantics,
      score: None,
      denotation: None,
    }
  }

  fn validate(rule: &Rule, children: &[Child]) -> Result<(), GrammarError> {
    if children.len() != rule.len() {
      return Err(GrammarError::Arity {
        rule: rule.to_string(),
        expected: rule.len(),
        found: children.len(),
      });
    }

    for (idx, (production, child)) in rule.rhs.iter().zip(children).enumerate() {
      let found = match child {
        Child::Token(t) => t.as_str(),
        Child::Node(d) => d.rule.lhs.as_str(),
      };
      let matches = match (production, child) {
        (Production::Terminal(w), Child::Token(t)) => w == t,
        (Production::Category(c), Child::Node(d)) => *c == d.rule.lhs,
        _ => false,
      };
      if !matches {
        return Err(GrammarError::ChildMismatch {
          rule: rule.to_string(),
          idx,
          expected: production.to_string(),
          found: found.to_string(),
        });
      }
    }

    Ok(())
  }

  fn compute_semantics(rule: &Rule, children: &[Child]) -> Value {
    if rule.is_lexical() {
      // no implicit application for lexical rules
      match &rule.sem {
        Semantics::Constant(v) => v.clone(),
        Semantics::Function(f) => Value::Func(f.clone()),
      }
    } else {
      let sems = children.iter().map(Child::semantics).collect::<Vec<_>>();
      rule.sem.apply(&sems)
    }
  }

  pub fn semantics(&self) -> &Value {
    &self.semantics
  }

  pub fn category(&self) -> &str {
    &self.rule.lhs
  }

  /// The score, or NaN if this derivation hasn't been scored
  pub fn score(&self) -> f64 {
    self.score.unwrap_or(f64::NAN)
  }

  /// Visits this derivation and every sub-derivation, parents first
  pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Derivation)) {
    visit(self);
    for child in self.children.iter() {
      if let Child::Node(d) = child {
        d.walk(visit);
      }
    }
  }

  /// The tokens this derivation covers
  pub fn tokens(&self) -> Vec<&str> {
    let mut tokens = Vec::new();
    for child in self.children.iter() {
      match child {
        Child::Token(t) => tokens.push(t.as_str()),
        Child::Node(d) => tokens.extend(d.tokens()),
      }
    }
    tokens
  }
}

impl fmt::Display for Child {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Token(t) => write!(f, "{}", t),
      Self::Node(d) => write!(f, "{}", d),
    }
  }
}

impl fmt::Display for Derivation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let all_tokens = self.children.iter().all(|c| matches!(c, Child::Token(_)));
    write!(f, "({}", self.rule.lhs)?;
    if all_tokens || self.children.len() == 1 {
      for child in self.children.iter() {
        write!(f, " {}", child)?;
      }
    } else {
      for child in self.children.iter() {
        let fmt = format!("{}", child);
        for line in fmt.lines() {
          write!(f, "\n  {}", line)?;
        }
      }
    }
    write!(f, ")")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;

  fn lexical(lhs: &str, word: &str, v: i32) -> Derivation {
    let rule = Rule::new(lhs, word, Semantics::constant(v)).unwrap();
    Derivation::new(Rc::new(rule), vec![Child::Token(word.to_string())]).unwrap()
  }

  #[test]
  fn test_semantics_is_frozen() {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let rule = Rc::new(
      Rule::new(
        "$ROOT",
        "$E",
        Semantics::func(move |_| {
          counter.set(counter.get() + 1);
          Value::from(counter.get() as i32)
        }),
      )
      .unwrap(),
    );

    let child = Child::Node(Rc::new(lexical("$E", "one", 1)));
    let d = Derivation::new(rule.clone(), vec![child]).unwrap();
    assert_eq!(d.semantics(), &Value::from(1));

    // invoking the attachment again doesn't touch the derivation
    assert_eq!(rule.sem.apply(&[]), Value::from(2));
    assert_eq!(d.semantics(), &Value::from(1));
  }

  #[test]
  fn test_lexical_function_is_not_applied() {
    let rule = Rule::new(
      "$BinOp",
      "plus",
      Semantics::named("add", |xs| Value::from(xs[0].as_num().unwrap_or(0.0) + 1.0)),
    )
    .unwrap();
    let d = Derivation::new(Rc::new(rule), vec![Child::Token("plus".to_string())]).unwrap();

    let f = d.semantics().as_func().expect("lexical meaning is the function itself");
    assert_eq!(f.name(), "add");
  }

  #[test]
  fn test_constant_ignores_children() {
    let rule = Rule::new("$ROOT", "$E", Semantics::constant("trigger")).unwrap();
    let d = Derivation::new(Rc::new(rule), vec![Child::Node(Rc::new(lexical("$E", "one", 1)))]).unwrap();
    assert_eq!(d.semantics(), &Value::from("trigger"));
  }

  #[test]
  fn test_validation() {
    let rule = Rc::new(Rule::new("$E", "$E $BinOp", Semantics::default()).unwrap());
    let one = Child::Node(Rc::new(lexical("$E", "one", 1)));

    assert!(matches!(
      Derivation::new(rule.clone(), vec![one.clone()]),
      Err(GrammarError::Arity { expected: 2, found: 1, .. })
    ));
    assert!(matches!(
      Derivation::new(rule, vec![one.clone(), one]),
      Err(GrammarError::ChildMismatch { idx: 1, .. })
    ));
  }

  #[test]
  fn test_display() {
    let rule = Rc::new(Rule::new("$E", "$E $E", Semantics::default()).unwrap());
    let d = Derivation::new(
      rule,
      vec![
        Child::Node(Rc::new(lexical("$E", "one", 1))),
        Child::Node(Rc::new(lexical("$E", "two", 2))),
      ],
    )
    .unwrap();

    assert_eq!(d.to_string(), "($E\n  ($E one)\n  ($E two))");
    assert_eq!(d.tokens(), vec!["one", "two"]);
  }
}
