use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::derivation::Derivation;
use crate::grammar::Grammar;
use crate::utils::Err;
use crate::value::Value;

/// Feature name -> value, for one derivation
pub type Features = HashMap<String, f64>;

pub type FeatureFn = Rc<dyn Fn(&Derivation) -> Features>;

/// Maps a meaning to its denotation, e.g. by querying a knowledge base
pub type Executor = Rc<dyn Fn(&Value) -> Result<Value, Err>>;

/// Feature weights. Features that were never set weigh 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Weights(HashMap<String, f64>);

impl Weights {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, feature: &str) -> f64 {
    self.0.get(feature).copied().unwrap_or(0.0)
  }

  pub fn set(&mut self, feature: &str, weight: f64) {
    self.0.insert(feature.to_string(), weight);
  }

  pub fn add(&mut self, feature: &str, delta: f64) {
    *self.0.entry(feature.to_string()).or_insert(0.0) += delta;
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self.0.iter().map(|(f, w)| (f.as_str(), *w))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Inner product with `features`
  pub fn score(&self, features: &Features) -> f64 {
    features.iter().map(|(f, v)| self.get(f) * v).sum()
  }

  /// Non-zero weights, heaviest first; ties by name
  pub fn ranked(&self) -> Vec<(&str, f64)> {
    let mut ranked = self.iter().filter(|(_, w)| *w != 0.0).collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
  }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Weights {
  fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(f, w)| (f.into(), w)).collect())
  }
}

/// How often each rule is used in `d`, keyed by the rule's display form
pub fn rule_features(d: &Derivation) -> Features {
  let mut features = Features::new();
  d.walk(&mut |node| *features.entry(node.rule.to_string()).or_insert(0.0) += 1.0);
  features
}

/// A grammar with a linear scoring function over derivation features, and
/// optionally an executor that computes denotations.
#[derive(Clone)]
pub struct Model {
  pub grammar: Rc<Grammar>,
  pub feature_fn: FeatureFn,
  pub weights: Weights,
  pub executor: Option<Executor>,
}

impl Model {
  /// A model scoring rule usage, with zero weights and no executor
  pub fn new(grammar: Rc<Grammar>) -> Self {
    Self {
      grammar,
      feature_fn: Rc::new(rule_features),
      weights: Weights::new(),
      executor: None,
    }
  }

  pub fn with_feature_fn(mut self, feature_fn: impl Fn(&Derivation) -> Features + 'static) -> Self {
    self.feature_fn = Rc::new(feature_fn);
    self
  }

  pub fn with_weights(mut self, weights: Weights) -> Self {
    self.weights = weights;
    self
  }

  pub fn with_executor(mut self, executor: Executor) -> Self {
    self.executor = Some(executor);
    self
  }

  /// The same grammar, features and executor, with all weights zeroed
  pub fn fresh(&self) -> Self {
    Self {
      weights: Weights::new(),
      ..self.clone()
    }
  }

  pub fn features(&self, d: &Derivation) -> Features {
    (self.feature_fn)(d)
  }

  pub fn score(&self, d: &Derivation) -> f64 {
    self.weights.score(&self.features(d))
  }

  /// Parses `input`, executes and scores every derivation, and returns them
  /// best first. Equal scores keep chart order. Executor errors are returned,
  /// not skipped.
  pub fn parse_input(&self, input: &str) -> Result<Vec<Derivation>, Err> {
    let mut parses = self.grammar.parse_input(input);
    for parse in parses.iter_mut() {
      if let Some(executor) = &self.executor {
        parse.denotation = Some(executor(parse.semantics())?);
      }
      parse.score = Some(self.score(parse));
    }
    parses.sort_by(|a, b| b.score().total_cmp(&a.score()));
    Ok(parses)
  }
}

impl fmt::Debug for Model {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Model")
      .field("grammar", &self.grammar)
      .field("weights", &self.weights.len())
      .field("executor", &self.executor.is_some())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tuple;

  fn arithmetic() -> Rc<Grammar> {
    Rc::new(include_str!("../grammars/arithmetic.gram").parse().unwrap())
  }

  #[test]
  fn test_rule_features_count_uses() {
    let g = arithmetic();
    let parses = g.parse_input("two plus two");
    assert_eq!(parses.len(), 1);

    let features = rule_features(&parses[0]);
    assert_eq!(features["$E -> two = 2"], 2.0);
    assert_eq!(features["$BinOp -> plus = +"], 1.0);
    assert_eq!(features["$EBO -> $E $BinOp = <($1 $0)>"], 1.0);
    assert_eq!(features.len(), 4);
  }

  #[test]
  fn test_unknown_features_weigh_nothing() {
    let weights = [("a", 2.0), ("b", -1.0)].into_iter().collect::<Weights>();
    let features = [("a".to_string(), 1.5), ("c".to_string(), 10.0)].into_iter().collect();
    assert_eq!(weights.score(&features), 3.0);
    assert_eq!(weights.get("c"), 0.0);
    assert_eq!(weights.ranked(), vec![("a", 2.0), ("b", -1.0)]);
  }

  #[test]
  fn test_parses_sorted_by_score() {
    // "one plus two times three" has two bracketings
    let model = Model::new(arithmetic()).with_feature_fn(|d| {
      let mut features = Features::new();
      if let Some([op, ..]) = d.semantics().as_tuple() {
        features.insert(format!("top {}", op), 1.0);
      }
      features
    });

    let parses = model.parse_input("one plus two times three").unwrap();
    assert_eq!(parses.len(), 2);
    assert!(parses.iter().all(|p| p.score == Some(0.0)));

    let model = model.with_weights([("top +", 1.0)].into_iter().collect());
    let parses = model.parse_input("one plus two times three").unwrap();
    assert_eq!(parses[0].semantics(), &tuple!["+", 1, tuple!["*", 2, 3]]);
    assert_eq!(parses[0].score(), 1.0);
    assert_eq!(parses[1].score(), 0.0);

    let model = model.with_weights([("top +", -1.0)].into_iter().collect());
    let parses = model.parse_input("one plus two times three").unwrap();
    assert_eq!(parses[0].semantics(), &tuple!["*", tuple!["+", 1, 2], 3]);
  }

  #[test]
  fn test_executor_sets_denotations() {
    let model = Model::new(arithmetic()).with_executor(Rc::new(|sem: &Value| -> Result<Value, Err> {
      Ok(Value::from(sem.to_string().len()))
    }));
    let parses = model.parse_input("minus one").unwrap();
    assert_eq!(parses.len(), 1);
    assert_eq!(parses[0].denotation, Some(Value::from(5)));
  }

  #[test]
  fn test_executor_errors_propagate() {
    let model = Model::new(arithmetic())
      .with_executor(Rc::new(|sem: &Value| -> Result<Value, Err> {
        Err(format!("can't execute {}", sem).into())
      }));
    let err = model.parse_input("one").unwrap_err();
    assert_eq!(err.to_string(), "can't execute 1");

    // no parses, nothing to execute
    assert!(model.parse_input("five").unwrap().is_empty());
  }

  #[test]
  fn test_fresh_zeroes_weights() {
    let model = Model::new(arithmetic()).with_weights([("x", 1.0)].into_iter().collect());
    let fresh = model.fresh();
    assert!(fresh.weights.is_empty());
    assert!(Rc::ptr_eq(&fresh.grammar, &model.grammar));
    assert_eq!(model.weights.get("x"), 1.0);
  }
}
