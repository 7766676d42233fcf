use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::info;

use crate::annotator::Annotator;
use crate::chart::{parse_chart, Chart};
use crate::derivation::Derivation;
use crate::error::GrammarError;
use crate::rules::{Production, Rule, Semantics};
use crate::utils::tokenize;
use crate::value::{Lambda, Value};

/// Upper bound on the number of derivations in one chart cell
pub const DEFAULT_CELL_CAPACITY: usize = 1000;

/// A compiled grammar. Every indexed rule is lexical (terminals only), unary
/// (one category) or binary (two categories), and none has optional items.
pub struct Grammar {
  pub start: Option<String>,
  pub lexical_rules: HashMap<Vec<String>, Vec<Rc<Rule>>>,
  pub unary_rules: HashMap<String, Vec<Rc<Rule>>>,
  pub binary_rules: HashMap<(String, String), Vec<Rc<Rule>>>,
  pub annotators: Vec<Rc<dyn Annotator>>,
  pub cell_capacity: usize,
  categories: HashSet<String>,
  source: Vec<Rule>,
}

impl Grammar {
  pub fn new(
    rules: Vec<Rule>,
    annotators: Vec<Rc<dyn Annotator>>,
    start: Option<&str>,
  ) -> Result<Self, GrammarError> {
    let categories = rules.iter().flat_map(Self::rule_categories).collect();

    let mut g = Self {
      start: start.map(str::to_string),
      lexical_rules: HashMap::new(),
      unary_rules: HashMap::new(),
      binary_rules: HashMap::new(),
      annotators,
      cell_capacity: DEFAULT_CELL_CAPACITY,
      categories,
      source: Vec::new(),
    };

    for rule in rules.iter() {
      g.add_rule(rule.clone())?;
    }
    g.source = rules;

    info!(
      rules = g.source.len(),
      lexical = g.lexical_rules.values().map(Vec::len).sum::<usize>(),
      unary = g.unary_rules.values().map(Vec::len).sum::<usize>(),
      binary = g.binary_rules.values().map(Vec::len).sum::<usize>(),
      "created grammar"
    );

    Ok(g)
  }

  pub fn with_cell_capacity(mut self, capacity: usize) -> Self {
    self.cell_capacity = capacity;
    self
  }

  /// Compiles a new grammar from `rules`, keeping this grammar's annotators,
  /// start category and cell capacity.
  pub fn rebuild(&self, rules: Vec<Rule>) -> Result<Self, GrammarError> {
    Ok(
      Self::new(rules, self.annotators.clone(), self.start.as_deref())?
        .with_cell_capacity(self.cell_capacity),
    )
  }

  /// The rules this grammar was built from, before compilation
  pub fn rules(&self) -> &[Rule] {
    &self.source
  }

  pub fn is_category(&self, name: &str) -> bool {
    self.categories.contains(name)
  }

  fn rule_categories(rule: &Rule) -> Vec<String> {
    let mut cats = vec![rule.lhs.clone()];
    for p in rule.rhs.iter() {
      if let Production::Category(c) = p {
        cats.push(c.clone());
      } else if let Production::Optional(inner) = p {
        if inner.is_category() {
          cats.push(inner.symbol_str().to_string());
        }
      }
    }
    cats
  }

  fn add_rule(&mut self, rule: Rule) -> Result<(), GrammarError> {
    if rule.has_optionals() {
      self.add_rule_containing_optional(rule)
    } else if rule.is_lexical() {
      self
        .lexical_rules
        .entry(rule.terminals())
        .or_default()
        .push(Rc::new(rule));
      Ok(())
    } else if rule.is_unary() {
      let key = rule.rhs[0].symbol_str().to_string();
      self.unary_rules.entry(key).or_default().push(Rc::new(rule));
      Ok(())
    } else if rule.is_binary() {
      let key = (
        rule.rhs[0].symbol_str().to_string(),
        rule.rhs[1].symbol_str().to_string(),
      );
      self.binary_rules.entry(key).or_default().push(Rc::new(rule));
      Ok(())
    } else if rule.is_nary() {
      self.add_nary_rule(rule)
    } else {
      Err(GrammarError::MixedRhs(rule.to_string()))
    }
  }

  /// Replaces the leftmost optional item with two variants of the rule: one
  /// where the item is required, one where it's removed. Further optionals are
  /// handled by recursing.
  ///
  /// ```text
  /// $Z -> $A ?$B ?$C $D
  /// ```
  /// becomes
  /// ```text
  /// $Z -> $A $B ?$C $D
  /// $Z -> $A ?$C $D
  /// ```
  fn add_rule_containing_optional(&mut self, rule: Rule) -> Result<(), GrammarError> {
    let first = rule
      .rhs
      .iter()
      .position(Production::is_optional)
      .expect("rule has an optional item");
    if rule.len() == 1 {
      return Err(GrammarError::EntirelyOptional(rule.to_string()));
    }

    let mut required = rule.rhs.clone();
    if let Production::Optional(inner) = &rule.rhs[first] {
      required[first] = (**inner).clone();
    }
    self.add_rule(Rule {
      lhs: rule.lhs.clone(),
      rhs: required,
      sem: rule.sem.clone(),
    })?;

    let mut removed = rule.rhs;
    removed.remove(first);
    // function attachments still see the removed item, as a placeholder.
    // The name records the removed position so the variants stay distinct.
    let sem = match rule.sem {
      Semantics::Constant(v) => Semantics::Constant(v),
      Semantics::Function(f) => {
        let name = format!("{}/-{}", f.name(), first);
        Semantics::Function(Lambda::new(name, move |sems: &[Value]| {
          let mut full = Vec::with_capacity(sems.len() + 1);
          full.extend_from_slice(&sems[..first]);
          full.push(Value::None);
          full.extend_from_slice(&sems[first..]);
          f.call(&full)
        }))
      }
    };
    self.add_rule(Rule {
      lhs: rule.lhs,
      rhs: removed,
      sem,
    })
  }

  /// Splits a rule with three or more categories using a new category that
  /// covers everything but the first item (roughly, "lhs missing its first
  /// item to the left").
  ///
  /// ```text
  /// $Z -> $A $B $C $D
  /// ```
  /// becomes
  /// ```text
  /// $Z_$A -> $B $C $D
  /// $Z -> $A $Z_$A
  /// ```
  fn add_nary_rule(&mut self, rule: Rule) -> Result<(), GrammarError> {
    let category = self.fresh_category(&format!("{}_{}", rule.lhs, rule.rhs[0].symbol_str()));

    self.add_rule(Rule {
      lhs: category.clone(),
      rhs: rule.rhs[1..].to_vec(),
      sem: Semantics::named("children", |sems| Value::Tuple(sems.to_vec())),
    })?;

    let sem = match rule.sem {
      Semantics::Constant(v) => Semantics::Constant(v),
      Semantics::Function(f) => {
        let name = f.name().to_string();
        Semantics::Function(Lambda::new(name, move |sems: &[Value]| {
          let mut full = vec![sems[0].clone()];
          full.extend(sems[1].as_tuple().unwrap_or(&[]).iter().cloned());
          f.call(&full)
        }))
      }
    };
    self.add_rule(Rule {
      lhs: rule.lhs,
      rhs: vec![rule.rhs[0].clone(), Production::Category(category)],
      sem,
    })
  }

  fn fresh_category(&mut self, base: &str) -> String {
    let mut name = base.to_string();
    while self.categories.contains(&name) {
      name.push('_');
    }
    self.categories.insert(name.clone());
    name
  }

  pub fn parse_chart(&self, tokens: &[&str]) -> Chart {
    parse_chart(self, tokens)
  }

  /// All derivations of `tokens` rooted in the start category (or in any
  /// category when there's no start category), in chart order.
  pub fn parse_tokens(&self, tokens: &[&str]) -> Vec<Derivation> {
    let chart = self.parse_chart(tokens);
    chart
      .cell(0, tokens.len())
      .iter()
      .filter(|d| self.start.as_deref().is_none_or(|s| d.rule.lhs == s))
      .map(|d| (**d).clone())
      .collect()
  }

  pub fn parse_input(&self, input: &str) -> Vec<Derivation> {
    self.parse_tokens(&tokenize(input))
  }
}

/// Expands a rule set by pairing every lexical right-hand side with every
/// lexical semantics (within the same category when `restrict_by_lhs` is set),
/// so that training can pick out the right lexicon.
pub fn expand_lexical_rules(rules: &[Rule], restrict_by_lhs: bool) -> Vec<Rule> {
  let mut expanded = rules
    .iter()
    .filter(|r| !r.is_lexical())
    .cloned()
    .collect::<Vec<_>>();

  let mut partitions: Vec<(&str, Vec<&Rule>)> = Vec::new();
  for rule in rules.iter().filter(|r| r.is_lexical()) {
    let key = if restrict_by_lhs { rule.lhs.as_str() } else { "" };
    match partitions.iter_mut().find(|(k, _)| *k == key) {
      Some((_, group)) => group.push(rule),
      None => partitions.push((key, vec![rule])),
    }
  }

  for (_, group) in partitions {
    let mut sems: Vec<&Semantics> = Vec::new();
    for rule in group.iter() {
      if !sems.contains(&&rule.sem) {
        sems.push(&rule.sem);
      }
    }
    for rule in group.iter() {
      for sem in sems.iter() {
        expanded.push(Rule {
          lhs: rule.lhs.clone(),
          rhs: rule.rhs.clone(),
          sem: (*sem).clone(),
        });
      }
    }
  }

  expanded
}

impl fmt::Debug for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Grammar")
      .field("start", &self.start)
      .field("rules", &self.source.len())
      .field("annotators", &self.annotators.len())
      .field("cell_capacity", &self.cell_capacity)
      .finish_non_exhaustive()
  }
}

impl fmt::Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fn write_sorted<'a>(
      f: &mut fmt::Formatter<'_>,
      rules: impl Iterator<Item = &'a Rc<Rule>>,
    ) -> fmt::Result {
      let mut shown = rules.map(|r| r.to_string()).collect::<Vec<_>>();
      shown.sort();
      for rule in shown {
        writeln!(f, "  {}", rule)?;
      }
      Ok(())
    }

    if let Some(start) = &self.start {
      writeln!(f, "start: {}", start)?;
    }
    writeln!(f, "lexical rules:")?;
    write_sorted(f, self.lexical_rules.values().flatten())?;
    writeln!(f, "unary rules:")?;
    write_sorted(f, self.unary_rules.values().flatten())?;
    writeln!(f, "binary rules:")?;
    write_sorted(f, self.binary_rules.values().flatten())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rule(lhs: &str, rhs: &str) -> Rule {
    Rule::new(lhs, rhs, Semantics::default()).unwrap()
  }

  #[test]
  fn test_bucketing() {
    let g = Grammar::new(
      vec![
        rule("$E", "one"),
        rule("$E", "one hundred"),
        rule("$ROOT", "$E"),
        rule("$E", "$E $E"),
      ],
      Vec::new(),
      Some("$ROOT"),
    )
    .unwrap();

    assert_eq!(g.lexical_rules[&vec!["one".to_string()]].len(), 1);
    assert_eq!(g.lexical_rules[&vec!["one".to_string(), "hundred".to_string()]].len(), 1);
    assert_eq!(g.unary_rules["$E"].len(), 1);
    assert_eq!(g.binary_rules[&("$E".to_string(), "$E".to_string())].len(), 1);
    assert_eq!(g.rules().len(), 4);
  }

  #[test]
  fn test_optional_elimination() {
    let g = Grammar::new(vec![rule("$Z", "$A ?$B ?$C $D")], Vec::new(), None).unwrap();

    let mut shown = g
      .binary_rules
      .values()
      .flatten()
      .map(|r| r.to_string())
      .collect::<Vec<_>>();
    shown.sort();

    // $A $B $C $D and $A $B $D and $A $C $D flatten through fresh categories;
    // $A $D stays binary
    assert!(shown.contains(&"$Z -> $A $D = _".to_string()));
    assert!(g.binary_rules.contains_key(&("$A".to_string(), "$Z_$A".to_string())));
    assert!(g.lexical_rules.is_empty());
  }

  #[test]
  fn test_optional_placeholder_keeps_positions() {
    let g = Grammar::new(
      vec![
        Rule::new("$NP", "?$Det $N", Semantics::func(|sems| Value::Tuple(sems.to_vec()))).unwrap(),
        rule("$Det", "the"),
        Rule::new("$N", "dog", Semantics::constant("dog")).unwrap(),
      ],
      Vec::new(),
      Some("$NP"),
    )
    .unwrap();

    let parses = g.parse_input("dog");
    assert_eq!(parses.len(), 1);
    assert_eq!(parses[0].semantics().to_string(), "(_ dog)");

    let parses = g.parse_input("the dog");
    assert_eq!(parses.len(), 1);
    assert_eq!(parses[0].semantics().to_string(), "(_ dog)");
  }

  #[test]
  fn test_optional_variants_keep_distinct_names() {
    let sem = Semantics::named("f", |sems| Value::Tuple(sems.to_vec()));
    let g = Grammar::new(vec![Rule::new("$A", "?$B ?$B $C", sem).unwrap()], Vec::new(), None).unwrap();

    let shown = g.binary_rules[&("$B".to_string(), "$C".to_string())]
      .iter()
      .filter(|r| r.lhs == "$A")
      .map(|r| r.to_string())
      .collect::<Vec<_>>();
    // the bucket also holds $A_$B -> $B $C from flattening $A -> $B $B $C
    assert_eq!(shown, vec!["$A -> $B $C = <f/-1>", "$A -> $B $C = <f/-0>"]);
    assert_eq!(g.unary_rules["$C"][0].to_string(), "$A -> $C = <f/-0/-0>");
  }

  #[test]
  fn test_nary_flattening_reapplies_semantics() {
    let g = Grammar::new(
      vec![
        Rule::new(
          "$E",
          "$E $BinOp $E",
          Semantics::func(|sems| Value::Tuple(vec![sems[1].clone(), sems[0].clone(), sems[2].clone()])),
        )
        .unwrap(),
        Rule::new("$E", "two", Semantics::constant(2)).unwrap(),
        Rule::new("$E", "three", Semantics::constant(3)).unwrap(),
        Rule::new("$BinOp", "plus", Semantics::constant("+")).unwrap(),
      ],
      Vec::new(),
      Some("$E"),
    )
    .unwrap();

    assert!(g.is_category("$E_$E"));
    let parses = g.parse_input("two plus three");
    assert_eq!(parses.len(), 1);
    assert_eq!(parses[0].semantics(), &crate::tuple!["+", 2, 3]);
  }

  #[test]
  fn test_fresh_category_avoids_existing_names() {
    let g = Grammar::new(
      vec![rule("$Z", "$A $B $C"), rule("$Z_$A", "x")],
      Vec::new(),
      None,
    )
    .unwrap();

    assert!(g.unary_rules.is_empty());
    assert!(g.binary_rules.contains_key(&("$A".to_string(), "$Z_$A_".to_string())));
    assert!(g.binary_rules.contains_key(&("$B".to_string(), "$C".to_string())));
  }

  #[test]
  fn test_compile_errors() {
    let mixed = Grammar::new(vec![rule("$E", "$E plus $E")], Vec::new(), None);
    assert!(matches!(mixed, Err(GrammarError::MixedRhs(_))));

    let mixed = Grammar::new(vec![rule("$E", "minus $E")], Vec::new(), None);
    assert!(matches!(mixed, Err(GrammarError::MixedRhs(_))));

    let optional = Grammar::new(vec![rule("$E", "?$F")], Vec::new(), None);
    assert!(matches!(optional, Err(GrammarError::EntirelyOptional(_))));
  }

  #[test]
  fn test_expand_lexical_rules() {
    let rules = vec![
      Rule::new("$E", "one", Semantics::constant(1)).unwrap(),
      Rule::new("$E", "two", Semantics::constant(2)).unwrap(),
      Rule::new("$Op", "plus", Semantics::constant("+")).unwrap(),
      rule("$E", "$E $Op"),
    ];

    let expanded = expand_lexical_rules(&rules, true);
    // 1 compositional + 2x2 for $E + 1x1 for $Op
    assert_eq!(expanded.len(), 6);
    assert!(expanded.contains(&Rule::new("$E", "one", Semantics::constant(2)).unwrap()));

    let expanded = expand_lexical_rules(&rules, false);
    assert_eq!(expanded.len(), 1 + 3 * 3);
  }
}
