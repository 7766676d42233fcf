//! Evaluation metrics: functions from an example and its (best first) parses to
//! a number. A metric must treat an empty parse list as a non-match.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info};

use crate::derivation::Derivation;
use crate::example::Example;
use crate::scoring::Model;
use crate::utils::Err;
use crate::value::Value;

pub trait Metric {
  fn name(&self) -> &str;
  fn evaluate(&self, example: &Example, parses: &[Derivation]) -> f64;
}

fn indicator(b: bool) -> f64 {
  if b { 1.0 } else { 0.0 }
}

fn semantics_match(example: &Example, parse: &Derivation) -> bool {
  example.semantics.as_ref() == Some(parse.semantics())
}

fn denotation_match(example: &Example, parse: &Derivation) -> bool {
  example.denotation.is_some() && example.denotation == parse.denotation
}

/// Whether the top parse has the gold meaning
#[derive(Debug, Default, Clone, Copy)]
pub struct SemanticsAccuracy;

impl Metric for SemanticsAccuracy {
  fn name(&self) -> &str {
    "semantics accuracy"
  }

  fn evaluate(&self, example: &Example, parses: &[Derivation]) -> f64 {
    indicator(parses.first().is_some_and(|p| semantics_match(example, p)))
  }
}

/// Whether the top parse has the gold denotation
#[derive(Debug, Default, Clone, Copy)]
pub struct DenotationAccuracy;

impl Metric for DenotationAccuracy {
  fn name(&self) -> &str {
    "denotation accuracy"
  }

  fn evaluate(&self, example: &Example, parses: &[Derivation]) -> f64 {
    indicator(parses.first().is_some_and(|p| denotation_match(example, p)))
  }
}

/// Whether any parse has the gold meaning
#[derive(Debug, Default, Clone, Copy)]
pub struct SemanticsOracleAccuracy;

impl Metric for SemanticsOracleAccuracy {
  fn name(&self) -> &str {
    "semantics oracle accuracy"
  }

  fn evaluate(&self, example: &Example, parses: &[Derivation]) -> f64 {
    indicator(parses.iter().any(|p| semantics_match(example, p)))
  }
}

/// Whether any parse has the gold denotation
#[derive(Debug, Default, Clone, Copy)]
pub struct DenotationOracleAccuracy;

impl Metric for DenotationOracleAccuracy {
  fn name(&self) -> &str {
    "denotation oracle accuracy"
  }

  fn evaluate(&self, example: &Example, parses: &[Derivation]) -> f64 {
    indicator(parses.iter().any(|p| denotation_match(example, p)))
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NumParses;

impl Metric for NumParses {
  fn name(&self) -> &str {
    "number of parses"
  }

  fn evaluate(&self, _example: &Example, parses: &[Derivation]) -> f64 {
    parses.len() as f64
  }
}

/// Whether any parse passes a filter (by default, any parse at all)
pub struct HasParse {
  name: String,
  filter: Box<dyn Fn(&Derivation) -> bool>,
}

impl HasParse {
  pub fn new() -> Self {
    Self::with_filter("has parse", |_| true)
  }

  pub fn with_filter(name: &str, filter: impl Fn(&Derivation) -> bool + 'static) -> Self {
    Self {
      name: name.to_string(),
      filter: Box::new(filter),
    }
  }
}

impl Default for HasParse {
  fn default() -> Self {
    Self::new()
  }
}

impl Metric for HasParse {
  fn name(&self) -> &str {
    &self.name
  }

  fn evaluate(&self, _example: &Example, parses: &[Derivation]) -> f64 {
    indicator(parses.iter().any(|p| (self.filter)(p)))
  }
}

/// Whether any parse has a non-empty denotation
#[derive(Debug, Default, Clone, Copy)]
pub struct HasDenotation;

impl Metric for HasDenotation {
  fn name(&self) -> &str {
    "has parse with denotation"
  }

  fn evaluate(&self, _example: &Example, parses: &[Derivation]) -> f64 {
    let nonempty = |v: &Value| match v {
      Value::None => false,
      Value::Num(n) => *n != 0.0,
      Value::Str(s) => !s.is_empty(),
      Value::Tuple(items) => !items.is_empty(),
      Value::Func(_) => true,
    };
    indicator(parses.iter().any(|p| p.denotation.as_ref().is_some_and(nonempty)))
  }
}

/// The fraction of parses whose meaning was already produced by another
/// parse: 0 when every parse means something different, 1 when several parses
/// all mean the same thing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpuriousAmbiguity;

impl Metric for SpuriousAmbiguity {
  fn name(&self) -> &str {
    "spurious ambiguity"
  }

  fn evaluate(&self, _example: &Example, parses: &[Derivation]) -> f64 {
    if parses.len() <= 1 {
      return 0.0;
    }
    let distinct = parses
      .iter()
      .map(|p| p.semantics().to_string())
      .collect::<HashSet<_>>()
      .len();
    (parses.len() - distinct) as f64 / (parses.len() - 1) as f64
  }
}

pub fn standard_metrics() -> Vec<Box<dyn Metric>> {
  vec![
    Box::new(SemanticsAccuracy),
    Box::new(SemanticsOracleAccuracy),
    Box::new(DenotationAccuracy),
    Box::new(DenotationOracleAccuracy),
    Box::new(NumParses),
    Box::new(SpuriousAmbiguity),
  ]
}

pub fn semantics_match_metrics() -> Vec<Box<dyn Metric>> {
  vec![
    Box::new(SemanticsAccuracy),
    Box::new(SemanticsOracleAccuracy),
    Box::new(NumParses),
    Box::new(SpuriousAmbiguity),
  ]
}

pub fn denotation_match_metrics() -> Vec<Box<dyn Metric>> {
  vec![
    Box::new(DenotationAccuracy),
    Box::new(DenotationOracleAccuracy),
    Box::new(NumParses),
    Box::new(SpuriousAmbiguity),
  ]
}

/// Mean value of each metric over a set of examples, in metric order
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
  pub examples: usize,
  pub means: Vec<(String, f64)>,
}

impl Evaluation {
  pub fn get(&self, metric: &str) -> Option<f64> {
    self.means.iter().find(|(name, _)| name == metric).map(|(_, v)| *v)
  }
}

impl fmt::Display for Evaluation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Over {} examples:", self.examples)?;
    for (name, value) in self.means.iter() {
      writeln!(f, "{:<34} {:.3}", name, value)?;
    }
    Ok(())
  }
}

/// Parses every example with `model` and averages each metric. With no
/// examples every mean is 0.
pub fn evaluate_model(
  model: &Model,
  examples: &[Example],
  metrics: &[Box<dyn Metric>],
) -> Result<Evaluation, Err> {
  let mut totals = vec![0.0; metrics.len()];
  for example in examples {
    let parses = model.parse_input(&example.input)?;
    for (total, metric) in totals.iter_mut().zip(metrics) {
      let value = metric.evaluate(example, &parses);
      debug!(input = %example.input, metric = metric.name(), value, "evaluated");
      *total += value;
    }
  }

  let means = metrics
    .iter()
    .zip(totals)
    .map(|(metric, total)| {
      let mean = if examples.is_empty() { 0.0 } else { total / examples.len() as f64 };
      info!(metric = metric.name(), mean, examples = examples.len(), "evaluation");
      (metric.name().to_string(), mean)
    })
    .collect();

  Ok(Evaluation {
    examples: examples.len(),
    means,
  })
}
