#[macro_use]
extern crate lazy_static;

pub mod annotator;
pub mod chart;
pub mod derivation;
pub mod error;
pub mod example;
pub mod grammar;
pub mod kb;
pub mod learning;
pub mod metrics;
pub mod parse_grammar;
pub mod rules;
pub mod scoring;
pub mod utils;
pub mod value;

pub use crate::annotator::{Annotator, NumberAnnotator, TokenAnnotator};
pub use crate::derivation::{Child, Derivation};
pub use crate::error::{GrammarError, QueryError};
pub use crate::example::Example;
pub use crate::grammar::Grammar;
pub use crate::kb::KnowledgeBase;
pub use crate::learning::{latent_sgd, LearnerConfig};
pub use crate::rules::{Rule, Semantics};
pub use crate::scoring::{Model, Weights};
pub use crate::utils::Err;
pub use crate::value::{Lambda, Value};
