//! Error types for grammar construction and query evaluation.

use thiserror::Error;

use crate::value::Value;

/// Errors raised while building rules, compiling grammars, or assembling
/// derivations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GrammarError {
  #[error("not a category: {0}")]
  NotACategory(String),

  #[error("rule for {0} has an empty right-hand side")]
  EmptyRhs(String),

  #[error("entire right-hand side is optional: {0}")]
  EntirelyOptional(String),

  #[error("right-hand side mixes terminals and non-terminals: {0}")]
  MixedRhs(String),

  #[error("derivation of {rule} has {found} children, expected {expected}")]
  Arity {
    rule: String,
    expected: usize,
    found: usize,
  },

  #[error("child {idx} of {rule} should be {expected}, got {found}")]
  ChildMismatch {
    rule: String,
    idx: usize,
    expected: String,
    found: String,
  },

  #[error("grammar syntax: {0}")]
  Syntax(String),
}

/// Errors raised while building a knowledge base or evaluating a query against
/// it. All of these are caller errors; the engine never answers them with an
/// empty set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
  #[error("invalid fact: {0}")]
  InvalidFact(Value),

  #[error("unsupported operator: {0}")]
  UnknownOperator(String),

  #[error("{op} takes {expected} argument(s), got {found}")]
  Arity {
    op: &'static str,
    expected: usize,
    found: usize,
  },

  #[error("malformed query: {0}")]
  Malformed(Value),

  #[error("not a relation name: {0}")]
  NotARelation(Value),

  #[error("binary relation {0} used where a set is expected")]
  RelationAsSet(String),

  #[error("{0} needs a set operand, got a predicate")]
  NotASet(&'static str),

  #[error("not a number: {0}")]
  NotANumber(Value),

  #[error(".eq needs a singleton set, got {0} elements")]
  NotSingleton(usize),

  #[error("query denotes a predicate, not a set")]
  PredicateDenotation,
}
