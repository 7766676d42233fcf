//! Simple recursive-descent parsing of grammar files.
//!
//! ```text
//! // comments run to the end of the line
//! $E -> one = 1;
//! $BinOp -> plus = +;
//! $E -> $E $BinOp $E = ($1 $0 $2);   // $N is the meaning of child N
//! $ROOT -> ?$Please $E = $1;          // omitted optionals mean _
//! $Please -> please;                  // no template: the meaning is _
//! ```
//!
//! A template is a number, a bare atom, a double-quoted string, `_`, a child
//! reference `$N` (optionally indexed into tuples: `$0.1`), or a parenthesized
//! tuple of templates. A reference past the end of the right-hand side is a
//! syntax error. The first rule's category is the start category.

use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::error::GrammarError;
use crate::grammar::Grammar;
use crate::rules::{Production, Rule, Semantics};
use crate::value::Value;

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), GrammarError>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

fn syntax(msg: String) -> GrammarError {
  GrammarError::Syntax(msg)
}

/// Try to consume a regex, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  if let Some(m) = re.find(s) {
    if m.start() > 0 {
      return (None, s);
    }
    let (_, rest) = s.split_at(m.end());
    (Some(m.as_str()), rest)
  } else {
    (None, s)
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(syntax(format!("couldn't match {} at {}", re, excerpt(s))))
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(syntax(format!("couldn't match {} at {}", c, excerpt(s))))
  }
}

/// The start of the remaining input, for error messages
fn excerpt(s: &str) -> &str {
  let end = s.char_indices().nth(30).map_or(s.len(), |(idx, _)| idx);
  &s[..end]
}

/// Skips whitespace and comments
fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"(\s|//[^\n]*)*");
  optional_re(&*WHITESPACE_OR_COMMENT, s).1
}

/// The meaning template of a rule, instantiated with the children's meanings
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
  Value(Value),
  /// Child index, then indices into nested tuples
  Child(usize, Vec<usize>),
  Tuple(Vec<Template>),
}

impl Template {
  pub fn is_constant(&self) -> bool {
    match self {
      Self::Value(_) => true,
      Self::Child(_, _) => false,
      Self::Tuple(items) => items.iter().all(Self::is_constant),
    }
  }

  /// Highest child index referenced anywhere in the template
  pub fn max_child(&self) -> Option<usize> {
    match self {
      Self::Value(_) => None,
      Self::Child(idx, _) => Some(*idx),
      Self::Tuple(items) => items.iter().filter_map(Self::max_child).max(),
    }
  }

  /// Fills in child references. References past the end of `sems`, or into
  /// something that isn't a tuple, give `_`.
  pub fn instantiate(&self, sems: &[Value]) -> Value {
    match self {
      Self::Value(v) => v.clone(),
      Self::Child(idx, path) => {
        let mut current = sems.get(*idx);
        for step in path {
          current = current.and_then(Value::as_tuple).and_then(|items| items.get(*step));
        }
        current.cloned().unwrap_or(Value::None)
      }
      Self::Tuple(items) => Value::Tuple(items.iter().map(|t| t.instantiate(sems)).collect()),
    }
  }

  pub fn into_semantics(self) -> Semantics {
    if self.is_constant() {
      Semantics::Constant(self.instantiate(&[]))
    } else {
      let name = self.to_string();
      Semantics::named(&name, move |sems| self.instantiate(sems))
    }
  }
}

impl fmt::Display for Template {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Value(Value::Str(s)) if s.is_empty() || s.contains(|c: char| c.is_whitespace()) => {
        write!(f, "{:?}", s)
      }
      Self::Value(v) => write!(f, "{}", v),
      Self::Child(idx, path) => {
        write!(f, "${}", idx)?;
        for step in path {
          write!(f, ".{}", step)?;
        }
        Ok(())
      }
      Self::Tuple(items) => {
        write!(f, "(")?;
        for (idx, item) in items.iter().enumerate() {
          if idx > 0 {
            write!(f, " ")?;
          }
          write!(f, "{}", item)?;
        }
        write!(f, ")")
      }
    }
  }
}

fn parse_template(s: &str) -> ParseResult<'_, Template> {
  regex_static!(CHILD, r"\$[0-9]+(\.[0-9]+)*");
  regex_static!(QUOTED, r#""[^"]*""#);
  regex_static!(ATOM, r#"[^\s;()"]+"#);
  regex_static!(NUMBER, r"^-?[0-9]+(\.[0-9]+)?$");

  if let (Some(_), rest) = optional_char('(', s) {
    let mut items = Vec::new();
    let mut rem = rest;
    loop {
      rem = skip_whitespace(rem);
      if let (Some(_), rest) = optional_char(')', rem) {
        return Ok((Template::Tuple(items), rest));
      }
      let (item, rest) = parse_template(rem)?;
      items.push(item);
      rem = rest;
    }
  }

  if let (Some(child), rest) = optional_re(&*CHILD, s) {
    let mut steps = child[1..].split('.').map(|n| n.parse::<usize>());
    let idx = steps
      .next()
      .and_then(Result::ok)
      .ok_or_else(|| syntax(format!("bad child reference {}", child)))?;
    let path = steps
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| syntax(format!("bad child reference {}: {}", child, e)))?;
    return Ok((Template::Child(idx, path), rest));
  }

  if let (Some(quoted), rest) = optional_re(&*QUOTED, s) {
    let inner = &quoted[1..quoted.len() - 1];
    return Ok((Template::Value(Value::from(inner)), rest));
  }

  let (atom, rest) = needed_re(&*ATOM, s).map_err(|e| syntax(format!("template: {}", e)))?;
  let value = if atom == "_" {
    Value::None
  } else if NUMBER.is_match(atom) {
    atom
      .parse::<f64>()
      .map(Value::Num)
      .map_err(|e| syntax(format!("number {}: {}", atom, e)))?
  } else {
    Value::from(atom)
  };
  Ok((Template::Value(value), rest))
}

/// Category, right-hand items, optional template, terminated by `;`
fn parse_rule(s: &str) -> ParseResult<'_, Rule> {
  #![allow(clippy::trivial_regex)]
  regex_static!(CATEGORY, r"\$[^\s;=]+");
  regex_static!(ARROW, "->");
  regex_static!(ITEM, r"[^\s;=]+");

  let (lhs, s) = needed_re(&*CATEGORY, s).map_err(|e| syntax(format!("rule category: {}", e)))?;
  let s = skip_whitespace(s);
  let (_, s) = needed_re(&*ARROW, s).map_err(|e| syntax(format!("rule arrow: {}", e)))?;

  let mut rhs = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.starts_with(';') || rem.starts_with('=') || rem.is_empty() {
      break;
    }
    let (item, s) = needed_re(&*ITEM, rem).map_err(|e| syntax(format!("rule item: {}", e)))?;
    rhs.push(Production::from_label(item));
    rem = s;
  }

  let (sem, rem) = if let (Some(_), s) = optional_char('=', rem) {
    let s = skip_whitespace(s);
    let (template, s) = parse_template(s)?;
    if let Some(idx) = template.max_child().filter(|idx| *idx >= rhs.len()) {
      return Err(syntax(format!(
        "{} refers to ${} but has {} right-hand items",
        lhs,
        idx,
        rhs.len()
      )));
    }
    (template.into_semantics(), skip_whitespace(s))
  } else {
    (Semantics::default(), rem)
  };
  let (_, rem) = needed_char(';', rem)?;

  Ok((Rule::from_productions(lhs, rhs, sem)?, rem))
}

fn parse_rules(s: &str) -> ParseResult<'_, Vec<Rule>> {
  let mut rules = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() {
      return Ok((rules, rem));
    }
    let (rule, s) = parse_rule(rem)?;
    rules.push(rule);
    rem = s;
  }
}

/// Parses a list of rules without compiling them, e.g. to expand them first
pub fn parse_rule_list(s: &str) -> Result<Vec<Rule>, GrammarError> {
  let (rules, rem) = parse_rules(s)?;
  debug_assert!(rem.is_empty());
  Ok(rules)
}

impl FromStr for Grammar {
  type Err = GrammarError;

  /// Parses a grammar from a string. Assumes the first rule's symbol
  /// is the start symbol.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let rules = parse_rule_list(s)?;
    let Some(first) = rules.first() else {
      return Err(syntax("empty ruleset".to_string()));
    };

    let start = first.lhs.clone();
    Self::new(rules, Vec::new(), Some(&start))
  }
}

impl Grammar {
  pub fn read_from_file(filename: &str) -> Result<Self, crate::Err> {
    Ok(std::fs::read_to_string(filename)?.parse()?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tuple;

  macro_rules! grammar_file {
    ($filename:expr) => {
      (
        $filename,
        include_str!(concat!("../grammars/", $filename)),
      )
    };
  }

  #[test]
  fn smoke_test_grammar_files() {
    let files = [
      grammar_file!("arithmetic.gram"),
      grammar_file!("polite-arithmetic.gram"),
      grammar_file!("family.gram"),
    ];

    for (filename, src) in files {
      assert!(src.parse::<Grammar>().is_ok(), "failed to parse {filename}");
    }
  }

  #[test]
  fn test_templates() {
    let (t, rest) = parse_template("($1 $0.1 (x \"a b\" -2.5 _)) ;").unwrap();
    assert_eq!(rest, " ;");
    assert!(!t.is_constant());
    assert_eq!(t.to_string(), "($1 $0.1 (x \"a b\" -2.5 _))");

    let sems = [tuple!["p", "q"], Value::from(7)];
    assert_eq!(
      t.instantiate(&sems),
      tuple![7, "q", tuple!["x", "a b", -2.5, Value::None]]
    );
    // out of range references are placeholders
    assert_eq!(t.instantiate(&[]), tuple![Value::None, Value::None, tuple!["x", "a b", -2.5, Value::None]]);
  }

  #[test]
  fn test_rules() {
    let rules = parse_rule_list(
      r#"
      // a comment
      $E -> one = 1;   // trailing comment
      $ROOT -> ?please $E = $1;
      $Pair -> $E and $E;
      $Op -> + = "+";
    "#,
    )
    .unwrap();

    assert_eq!(rules.len(), 4);
    assert_eq!(rules[0].sem, Semantics::constant(1));
    assert_eq!(rules[1].to_string(), "$ROOT -> ?please $E = <$1>");
    assert_eq!(rules[2].sem, Semantics::default());
    assert_eq!(rules[3].terminals(), vec!["+".to_string()]);
  }

  #[test]
  fn test_syntax_errors() {
    assert!(matches!("".parse::<Grammar>(), Err(GrammarError::Syntax(_))));
    assert!(matches!("E -> one;".parse::<Grammar>(), Err(GrammarError::Syntax(_))));
    assert!(matches!("$E -> one = 1".parse::<Grammar>(), Err(GrammarError::Syntax(_))));
    assert!(matches!("$E -> one = (1 2;".parse::<Grammar>(), Err(GrammarError::Syntax(_))));
    assert!(matches!("$E ->;".parse::<Grammar>(), Err(GrammarError::EmptyRhs(_))));
    assert!(matches!("$E -> $E plus $E;".parse::<Grammar>(), Err(GrammarError::MixedRhs(_))));
  }

  #[test]
  fn test_child_references_checked_against_rhs() {
    let err = "$E -> $E $E = (+ $0 $5);".parse::<Grammar>().unwrap_err();
    assert_eq!(
      err,
      GrammarError::Syntax("$E refers to $5 but has 2 right-hand items".to_string())
    );
    assert!(matches!("$E -> one = $0;".parse::<Grammar>(), Ok(_)));
    assert!(matches!("$E -> one = $1;".parse::<Grammar>(), Err(GrammarError::Syntax(_))));

    // optional items still count, so omitted ones can be referenced
    let g: Grammar = r#"
      $ROOT -> ?$Please $E ?$Now = ($0 $1 $2);
      $Please -> please;
      $Now -> now;
      $E -> one = 1;
    "#
    .parse()
    .unwrap();
    assert_eq!(g.parse_input("one")[0].semantics(), &tuple![Value::None, 1, Value::None]);
  }
}
