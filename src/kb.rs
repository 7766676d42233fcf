//! A graph-structured knowledge base of unary and binary facts, and a small
//! query language over it.
//!
//! Queries are meanings (`Value`s). With `U` a unary relation, `B` a binary
//! relation, `Q` a binary relation to numbers, and `X`, `Y` queries:
//!
//! ```text
//! v                  {v}, for any value that isn't a relation name
//! U                  everything in U
//! (B X)              everything that has relation B to something in X
//! (X B)              everything that something in X has relation B to
//! (.and X Y)         intersection; if one side is a predicate, a filter
//! (.or X Y)          union
//! (.not X)           every node not in X
//! .any               every node
//! (.count X)         {|X|}
//! (.gt X) (.lt X)    numbers above max(X) / below min(X), as a predicate
//! (.eq X)            the single element of X, as a predicate
//! (.max Q X)         {the largest Q-value of anything in X}; also .min
//! (.argmax Q X)      the elements of X with the largest Q-value; also .argmin
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::error::QueryError;
use crate::scoring::Executor;
use crate::utils::Err;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fact {
  Unary(String, Value),
  Binary(String, Value, Value),
}

impl TryFrom<&Value> for Fact {
  type Error = QueryError;

  /// `(rel x)` or `(rel src dst)`, with the relation name a string
  fn try_from(v: &Value) -> Result<Self, Self::Error> {
    let invalid = || QueryError::InvalidFact(v.clone());
    match v.as_tuple().ok_or_else(invalid)? {
      [rel, x] => Ok(Self::Unary(rel.as_str().ok_or_else(invalid)?.to_string(), x.clone())),
      [rel, src, dst] => Ok(Self::Binary(
        rel.as_str().ok_or_else(invalid)?.to_string(),
        src.clone(),
        dst.clone(),
      )),
      _ => Err(invalid()),
    }
  }
}

impl fmt::Display for Fact {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Unary(rel, x) => write!(f, "({} {})", rel, x),
      Self::Binary(rel, src, dst) => write!(f, "({} {} {})", rel, src, dst),
    }
  }
}

type Index = BTreeMap<String, BTreeMap<Value, BTreeSet<Value>>>;

/// Facts indexed for lookup by relation, and for binary relations by source
/// (forward) and by destination (reverse). Read-only once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeBase {
  nodes: BTreeSet<Value>,
  unaries: BTreeMap<String, BTreeSet<Value>>,
  forward: Index,
  reverse: Index,
}

impl KnowledgeBase {
  pub fn from_facts(facts: impl IntoIterator<Item = Fact>) -> Self {
    let mut kb = Self::default();
    for fact in facts {
      kb.add(fact);
    }
    kb
  }

  /// Builds from `(rel x)` and `(rel src dst)` tuples
  pub fn from_tuples<'a>(tuples: impl IntoIterator<Item = &'a Value>) -> Result<Self, QueryError> {
    let facts = tuples
      .into_iter()
      .map(Fact::try_from)
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self::from_facts(facts))
  }

  fn add(&mut self, fact: Fact) {
    match fact {
      Fact::Unary(rel, x) => {
        self.nodes.insert(x.clone());
        self.unaries.entry(rel).or_default().insert(x);
      }
      Fact::Binary(rel, src, dst) => {
        self.nodes.insert(src.clone());
        self.nodes.insert(dst.clone());
        self
          .forward
          .entry(rel.clone())
          .or_default()
          .entry(src.clone())
          .or_default()
          .insert(dst.clone());
        self.reverse.entry(rel).or_default().entry(dst).or_default().insert(src);
      }
    }
  }

  /// Everything that appears in some fact
  pub fn nodes(&self) -> &BTreeSet<Value> {
    &self.nodes
  }

  pub fn is_unary(&self, rel: &str) -> bool {
    self.unaries.contains_key(rel)
  }

  pub fn is_binary(&self, rel: &str) -> bool {
    self.forward.contains_key(rel)
  }

  /// All facts, sorted by relation, unary relations first
  pub fn facts(&self) -> Vec<Fact> {
    let mut facts = Vec::new();
    for (rel, xs) in self.unaries.iter() {
      facts.extend(xs.iter().map(|x| Fact::Unary(rel.clone(), x.clone())));
    }
    for (rel, pairs) in self.forward.iter() {
      for (src, dsts) in pairs.iter() {
        facts.extend(dsts.iter().map(|dst| Fact::Binary(rel.clone(), src.clone(), dst.clone())));
      }
    }
    facts
  }

  fn unary_name<'v>(&self, v: &'v Value) -> Option<&'v str> {
    v.as_str().filter(|s| self.is_unary(s))
  }

  fn binary_name<'v>(&self, v: &'v Value) -> Option<&'v str> {
    v.as_str().filter(|s| self.is_binary(s))
  }

  /// Reads a query from a meaning. Relation names are resolved against this
  /// knowledge base.
  pub fn compile(&self, sem: &Value) -> Result<Query, QueryError> {
    match sem {
      Value::Tuple(items) => self.compile_tuple(sem, items),
      Value::Str(s) if s.starts_with('.') => self.compile_operator(s, &[]),
      Value::Str(s) if self.is_unary(s) => Ok(Query::Unary(s.clone())),
      Value::Str(s) if self.is_binary(s) => Err(QueryError::RelationAsSet(s.clone())),
      v => Ok(Query::Literal(v.clone())),
    }
  }

  fn compile_tuple(&self, sem: &Value, items: &[Value]) -> Result<Query, QueryError> {
    match items {
      [u] if self.unary_name(u).is_some() => self.compile(u),
      [b, x] if self.binary_name(b).is_some() => Ok(Query::Join {
        relation: b.to_string(),
        direction: Direction::Sources,
        arg: Box::new(self.compile(x)?),
      }),
      [x, b] if self.binary_name(b).is_some() => Ok(Query::Join {
        relation: b.to_string(),
        direction: Direction::Targets,
        arg: Box::new(self.compile(x)?),
      }),
      [Value::Str(op), args @ ..] if op.starts_with('.') => self.compile_operator(op, args),
      _ => Err(QueryError::Malformed(sem.clone())),
    }
  }

  fn compile_operator(&self, op: &str, args: &[Value]) -> Result<Query, QueryError> {
    fn arity(op: &'static str, args: &[Value], expected: usize) -> Result<(), QueryError> {
      if args.len() == expected {
        Ok(())
      } else {
        Err(QueryError::Arity {
          op,
          expected,
          found: args.len(),
        })
      }
    }
    let arg = |idx: usize| self.compile(&args[idx]).map(Box::new);

    let query = match op {
      ".and" => {
        arity(".and", args, 2)?;
        Query::And(arg(0)?, arg(1)?)
      }
      ".or" => {
        arity(".or", args, 2)?;
        Query::Or(arg(0)?, arg(1)?)
      }
      ".not" => {
        arity(".not", args, 1)?;
        Query::Not(arg(0)?)
      }
      ".any" => {
        arity(".any", args, 0)?;
        Query::Any
      }
      ".count" => {
        arity(".count", args, 1)?;
        Query::Count(arg(0)?)
      }
      ".gt" => {
        arity(".gt", args, 1)?;
        Query::Gt(arg(0)?)
      }
      ".lt" => {
        arity(".lt", args, 1)?;
        Query::Lt(arg(0)?)
      }
      ".eq" => {
        arity(".eq", args, 1)?;
        Query::Eq(arg(0)?)
      }
      ".max" | ".min" | ".argmax" | ".argmin" => {
        let extremum = match op {
          ".max" => Extremum::Max,
          ".min" => Extremum::Min,
          ".argmax" => Extremum::ArgMax,
          _ => Extremum::ArgMin,
        };
        arity(extremum.name(), args, 2)?;
        let relation = self
          .binary_name(&args[0])
          .ok_or_else(|| QueryError::NotARelation(args[0].clone()))?;
        Query::Extremum {
          extremum,
          relation: relation.to_string(),
          arg: arg(1)?,
        }
      }
      _ => return Err(QueryError::UnknownOperator(op.to_string())),
    };
    Ok(query)
  }

  pub fn evaluate(&self, query: &Query) -> Result<Denotation, QueryError> {
    let denotation = match query {
      Query::Literal(v) => Denotation::Set(BTreeSet::from([v.clone()])),
      Query::Unary(rel) => Denotation::Set(self.unaries.get(rel).cloned().unwrap_or_default()),
      Query::Join {
        relation,
        direction,
        arg,
      } => {
        // (B X) looks up sources by destination, (X B) destinations by source
        let index = match direction {
          Direction::Sources => &self.reverse,
          Direction::Targets => &self.forward,
        };
        let Some(pairs) = index.get(relation) else {
          return Ok(Denotation::Set(BTreeSet::new()));
        };
        let found = match self.evaluate(arg)? {
          Denotation::Set(xs) => xs
            .iter()
            .filter_map(|x| pairs.get(x))
            .flatten()
            .cloned()
            .collect(),
          Denotation::Predicate(p) => pairs
            .iter()
            .filter(|(x, _)| p.test(x))
            .flat_map(|(_, ys)| ys.iter().cloned())
            .collect(),
        };
        Denotation::Set(found)
      }
      Query::And(x, y) => match (self.evaluate(x)?, self.evaluate(y)?) {
        (Denotation::Set(xs), Denotation::Set(ys)) => {
          Denotation::Set(xs.intersection(&ys).cloned().collect())
        }
        (Denotation::Set(xs), Denotation::Predicate(p))
        | (Denotation::Predicate(p), Denotation::Set(xs)) => {
          Denotation::Set(xs.into_iter().filter(|x| p.test(x)).collect())
        }
        (Denotation::Predicate(_), Denotation::Predicate(_)) => {
          return Err(QueryError::NotASet(".and"));
        }
      },
      Query::Or(x, y) => {
        let xs = self.set(x, ".or")?;
        let ys = self.set(y, ".or")?;
        Denotation::Set(xs.union(&ys).cloned().collect())
      }
      Query::Not(x) => {
        let xs = self.set(x, ".not")?;
        Denotation::Set(self.nodes.difference(&xs).cloned().collect())
      }
      Query::Any => Denotation::Set(self.nodes.clone()),
      Query::Count(x) => Denotation::Set(BTreeSet::from([Value::from(self.set(x, ".count")?.len())])),
      Query::Gt(x) => {
        let bound = self.numbers(x, ".gt")?.into_iter().fold(f64::NEG_INFINITY, f64::max);
        Denotation::Predicate(Predicate::Gt(bound))
      }
      Query::Lt(x) => {
        let bound = self.numbers(x, ".lt")?.into_iter().fold(f64::INFINITY, f64::min);
        Denotation::Predicate(Predicate::Lt(bound))
      }
      Query::Eq(x) => {
        let xs = self.set(x, ".eq")?;
        match xs.first() {
          Some(v) if xs.len() == 1 => Denotation::Predicate(Predicate::Eq(v.clone())),
          _ => return Err(QueryError::NotSingleton(xs.len())),
        }
      }
      Query::Extremum {
        extremum,
        relation,
        arg,
      } => Denotation::Set(self.extremum(*extremum, relation, arg)?),
    };
    Ok(denotation)
  }

  fn set(&self, query: &Query, op: &'static str) -> Result<BTreeSet<Value>, QueryError> {
    match self.evaluate(query)? {
      Denotation::Set(xs) => Ok(xs),
      Denotation::Predicate(_) => Err(QueryError::NotASet(op)),
    }
  }

  fn numbers(&self, query: &Query, op: &'static str) -> Result<Vec<f64>, QueryError> {
    self
      .set(query, op)?
      .into_iter()
      .map(|v| v.as_num().ok_or(QueryError::NotANumber(v)))
      .collect()
  }

  fn extremum(
    &self,
    extremum: Extremum,
    relation: &str,
    arg: &Query,
  ) -> Result<BTreeSet<Value>, QueryError> {
    let xs = self.set(arg, extremum.name())?;
    let index = self.forward.get(relation);
    let pairs = xs
      .iter()
      .flat_map(|x| {
        index
          .and_then(|values| values.get(x))
          .into_iter()
          .flatten()
          .map(move |v| (x, v))
      })
      .collect::<Vec<_>>();

    let values = pairs.iter().map(|(_, v)| *v);
    let best = match extremum {
      Extremum::Max | Extremum::ArgMax => values.max().cloned().unwrap_or(Value::Num(f64::NEG_INFINITY)),
      Extremum::Min | Extremum::ArgMin => values.min().cloned().unwrap_or(Value::Num(f64::INFINITY)),
    };

    Ok(match extremum {
      Extremum::Max | Extremum::Min => BTreeSet::from([best]),
      Extremum::ArgMax | Extremum::ArgMin => pairs
        .into_iter()
        .filter(|(_, v)| **v == best)
        .map(|(x, _)| x.clone())
        .collect(),
    })
  }

  /// Evaluates a meaning as a query. The result is the denoted set as a
  /// sorted tuple; queries that denote a predicate are an error.
  pub fn execute(&self, sem: &Value) -> Result<Value, QueryError> {
    match self.evaluate(&self.compile(sem)?)? {
      Denotation::Set(xs) => Ok(Value::Tuple(xs.into_iter().collect())),
      Denotation::Predicate(_) => Err(QueryError::PredicateDenotation),
    }
  }

  /// `execute` as a model's executor
  pub fn executor(self: Rc<Self>) -> Executor {
    Rc::new(move |sem: &Value| -> Result<Value, Err> { Ok(self.execute(sem)?) })
  }
}

impl fmt::Display for KnowledgeBase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for fact in self.facts() {
      writeln!(f, "{}", fact)?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  /// `(B X)`: things with relation B to something in X
  Sources,
  /// `(X B)`: things that something in X has relation B to
  Targets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
  Max,
  Min,
  ArgMax,
  ArgMin,
}

impl Extremum {
  fn name(self) -> &'static str {
    match self {
      Self::Max => ".max",
      Self::Min => ".min",
      Self::ArgMax => ".argmax",
      Self::ArgMin => ".argmin",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
  Literal(Value),
  Unary(String),
  Join {
    relation: String,
    direction: Direction,
    arg: Box<Query>,
  },
  And(Box<Query>, Box<Query>),
  Or(Box<Query>, Box<Query>),
  Not(Box<Query>),
  Any,
  Count(Box<Query>),
  Gt(Box<Query>),
  Lt(Box<Query>),
  Eq(Box<Query>),
  Extremum {
    extremum: Extremum,
    relation: String,
    arg: Box<Query>,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
  Gt(f64),
  Lt(f64),
  Eq(Value),
}

impl Predicate {
  /// Comparisons only hold for numbers
  pub fn test(&self, v: &Value) -> bool {
    match self {
      Self::Gt(bound) => v.as_num().is_some_and(|n| n > *bound),
      Self::Lt(bound) => v.as_num().is_some_and(|n| n < *bound),
      Self::Eq(x) => v == x,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Denotation {
  Set(BTreeSet<Value>),
  Predicate(Predicate),
}
