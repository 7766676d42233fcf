use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::derivation::{Child, Derivation};
use crate::grammar::Grammar;
use crate::rules::{Rule, Semantics};

/// Derivations indexed by the half-open token span they cover. Cells only
/// grow, and never past `capacity`.
#[derive(Debug)]
pub struct Chart {
  len: usize,
  cells: Vec<Vec<Rc<Derivation>>>,
  capacity: usize,
  capacity_hits: usize,
}

impl Chart {
  pub fn new(len: usize, capacity: usize) -> Self {
    Self {
      len,
      cells: vec![Vec::new(); (len + 1) * (len + 1)],
      capacity,
      capacity_hits: 0,
    }
  }

  /// Number of tokens the chart spans
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn index(&self, i: usize, j: usize) -> usize {
    assert!(i <= j && j <= self.len, "span {}..{} out of range", i, j);
    i * (self.len + 1) + j
  }

  pub fn cell(&self, i: usize, j: usize) -> &[Rc<Derivation>] {
    &self.cells[self.index(i, j)]
  }

  /// How many times a full cell turned away derivations during this parse
  pub fn capacity_hits(&self) -> usize {
    self.capacity_hits
  }

  /// Checks whether cell i..j can take another derivation. A full cell counts
  /// as a hit; hits are logged at powers of two.
  fn has_room(&mut self, i: usize, j: usize) -> bool {
    if self.cell(i, j).len() < self.capacity {
      return true;
    }

    self.capacity_hits += 1;
    if self.capacity_hits.is_power_of_two() {
      warn!(
        capacity = self.capacity,
        hits = self.capacity_hits,
        "max cell capacity has been hit"
      );
    }
    false
  }

  fn add(&mut self, i: usize, j: usize, derivation: Derivation) {
    let idx = self.index(i, j);
    self.cells[idx].push(Rc::new(derivation));
  }

  /// Get an owned handle so that passing around &mut chart is more ergonomic
  fn get(&self, i: usize, j: usize, idx: usize) -> Rc<Derivation> {
    self.cell(i, j)[idx].clone()
  }
}

impl fmt::Display for Chart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for width in 1..=self.len {
      for i in 0..=(self.len - width) {
        let j = i + width;
        for d in self.cell(i, j).iter() {
          writeln!(f, "{}..{}: {} = {}", i, j, d.rule, d.semantics())?;
        }
      }
    }
    Ok(())
  }
}

/// Fills a chart bottom-up. Spans are visited with `j` ascending and `i`
/// descending, so both halves of every split of i..j are complete before
/// i..j itself is.
pub fn parse_chart(g: &Grammar, tokens: &[&str]) -> Chart {
  let mut chart = Chart::new(tokens.len(), g.cell_capacity);

  for j in 1..=tokens.len() {
    for i in (0..j).rev() {
      apply_annotators(g, &mut chart, tokens, i, j);
      apply_lexical_rules(g, &mut chart, tokens, i, j);
      apply_binary_rules(g, &mut chart, i, j);
      apply_unary_rules(g, &mut chart, i, j);
    }
  }

  chart
}

fn token_children(tokens: &[&str]) -> Vec<Child> {
  tokens.iter().map(|t| Child::Token(t.to_string())).collect()
}

fn apply_annotators(g: &Grammar, chart: &mut Chart, tokens: &[&str], i: usize, j: usize) {
  let span = &tokens[i..j];
  for annotator in g.annotators.iter() {
    for (category, semantics) in annotator.annotate(span) {
      if !chart.has_room(i, j) {
        return;
      }
      match Rule::lexical(&category, span, Semantics::Constant(semantics)) {
        Ok(rule) => chart.add(i, j, Derivation::build(Rc::new(rule), token_children(span))),
        Err(e) => warn!(error = %e, "skipping annotation"),
      }
    }
  }
}

fn apply_lexical_rules(g: &Grammar, chart: &mut Chart, tokens: &[&str], i: usize, j: usize) {
  let span = &tokens[i..j];
  let key = span.iter().map(|t| t.to_string()).collect::<Vec<_>>();
  let Some(rules) = g.lexical_rules.get(&key) else {
    return;
  };

  for rule in rules {
    if !chart.has_room(i, j) {
      return;
    }
    chart.add(i, j, Derivation::build(rule.clone(), token_children(span)));
  }
}

fn apply_binary_rules(g: &Grammar, chart: &mut Chart, i: usize, j: usize) {
  for k in (i + 1)..j {
    for a in 0..chart.cell(i, k).len() {
      let left = chart.get(i, k, a);
      for b in 0..chart.cell(k, j).len() {
        let right = chart.get(k, j, b);
        let key = (left.rule.lhs.clone(), right.rule.lhs.clone());
        let Some(rules) = g.binary_rules.get(&key) else {
          continue;
        };

        for rule in rules {
          if !chart.has_room(i, j) {
            return;
          }
          let children = vec![Child::Node(left.clone()), Child::Node(right.clone())];
          chart.add(i, j, Derivation::build(rule.clone(), children));
        }
      }
    }
  }
}

fn apply_unary_rules(g: &Grammar, chart: &mut Chart, i: usize, j: usize) {
  // need to use while loop because the cell grows during the loop: derivations
  // added here are themselves expanded, which gives the transitive closure.
  // unary cycles are cut off by the cell capacity.
  let mut idx = 0;
  while idx < chart.cell(i, j).len() {
    let child = chart.get(i, j, idx);
    idx += 1;

    let Some(rules) = g.unary_rules.get(&child.rule.lhs) else {
      continue;
    };
    for rule in rules {
      if !chart.has_room(i, j) {
        return;
      }
      chart.add(i, j, Derivation::build(rule.clone(), vec![Child::Node(child.clone())]));
    }
  }
}
