//! Latent structured learning: online SGD where the correct derivation of a
//! training example is unobserved, and only its meaning or denotation is
//! known.

use std::collections::{HashMap, HashSet};
use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::derivation::Derivation;
use crate::example::Example;
use crate::metrics::Metric;
use crate::scoring::{Features, Model, Weights};
use crate::utils::Err;

/// Number of weights shown at each end when logging trained weights
const SHOWN_WEIGHTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
  /// Non-target derivations get a margin cost of 1
  Hinge,
  /// No margin cost
  Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
  /// Per-feature step sizes from accumulated squared gradients
  AdaGrad,
  /// Fixed-rate steps with no margin cost and no L2 penalty
  Perceptron,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearnerConfig {
  pub epochs: usize,
  pub learning_rate: f64,
  /// Fixes the shuffling of examples and the breaking of ties. None draws a
  /// seed from the OS.
  pub seed: Option<u64>,
  pub loss: Loss,
  pub l2_penalty: f64,
  /// Training stops early once an epoch's error or update magnitude is
  /// below this
  pub epsilon: f64,
  pub update: Update,
}

impl Default for LearnerConfig {
  fn default() -> Self {
    Self {
      epochs: 10,
      learning_rate: 0.1,
      seed: None,
      loss: Loss::Hinge,
      l2_penalty: 0.0,
      epsilon: 1e-7,
      update: Update::AdaGrad,
    }
  }
}

/// What happened during one pass over the training examples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
  pub epoch: usize,
  /// Sum over examples with a good derivation of the best augmented score
  /// minus the target's score
  pub error: f64,
  /// Sum of squared weight changes
  pub update_magnitude: f64,
  /// Fraction of all examples whose predicted derivation was judged correct
  pub accuracy: f64,
}

impl fmt::Display for EpochStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "iter. {}; err. {:.7}; AdaGrad mag. {:.7}; train acc. {:.4}",
      self.epoch, self.error, self.update_magnitude, self.accuracy
    )
  }
}

#[derive(Debug, Clone)]
pub struct Training {
  pub model: Model,
  pub epochs: Vec<EpochStats>,
}

struct Learner<'a> {
  config: &'a LearnerConfig,
  metric: &'a dyn Metric,
  rng: StdRng,
  adagrad: HashMap<String, f64>,
}

impl Learner<'_> {
  fn cost(&self, target: usize, idx: usize) -> f64 {
    match (self.config.update, self.config.loss) {
      (Update::AdaGrad, Loss::Hinge) if idx != target => 1.0,
      _ => 0.0,
    }
  }

  fn is_good(&self, example: &Example, d: &Derivation) -> bool {
    self.metric.evaluate(example, std::slice::from_ref(d)) > 0.0
  }

  fn epoch(&mut self, model: &mut Model, examples: &mut [Example], epoch: usize) -> Result<EpochStats, Err> {
    examples.shuffle(&mut self.rng);

    let mut stats = EpochStats {
      epoch,
      error: 0.0,
      update_magnitude: 0.0,
      accuracy: 0.0,
    };
    let mut correct = 0;

    for example in examples.iter() {
      // reparse with the current weights, which change after every example
      let parses = model.parse_input(&example.input)?;
      let Some(target) = parses.iter().position(|p| self.is_good(example, p)) else {
        continue;
      };

      let augmented = parses
        .iter()
        .enumerate()
        .map(|(idx, p)| p.score() + self.cost(target, idx))
        .collect::<Vec<_>>();
      let max = augmented.iter().copied().fold(f64::NEG_INFINITY, f64::max);
      stats.error += max - parses[target].score();

      let best = (0..parses.len()).filter(|idx| augmented[*idx] == max).collect::<Vec<_>>();
      let predicted = *best.choose(&mut self.rng).expect("some derivation has the max score");
      if self.is_good(example, &parses[predicted]) {
        correct += 1;
      }

      stats.update_magnitude += self.update(model, &parses[target], &parses[predicted]);
    }

    if !examples.is_empty() {
      stats.accuracy = correct as f64 / examples.len() as f64;
    }
    Ok(stats)
  }

  /// Moves the weights toward the target's features and away from the
  /// prediction's. Returns the sum of squared weight changes.
  fn update(&mut self, model: &mut Model, target: &Derivation, predicted: &Derivation) -> f64 {
    let target_features = model.features(target);
    let predicted_features = model.features(predicted);
    let mut gradient = gradient(&target_features, &predicted_features);
    let eta = self.config.learning_rate;

    if self.config.update == Update::Perceptron {
      let mut magnitude = 0.0;
      for (f, g) in gradient {
        if g != 0.0 {
          model.weights.add(&f, eta * g);
          magnitude += (eta * g) * (eta * g);
        }
      }
      return magnitude;
    }

    if self.config.l2_penalty != 0.0 {
      for (f, w) in model.weights.iter() {
        *gradient.entry(f.to_string()).or_insert(0.0) -= self.config.l2_penalty * w;
      }
    }

    let mut magnitude = 0.0;
    for (f, g) in gradient {
      if g == 0.0 {
        continue;
      }
      let acc = self.adagrad.entry(f.clone()).or_insert(0.0);
      *acc += g * g;
      let decay = acc.sqrt();
      if decay != 0.0 {
        let dw = eta * g / decay;
        model.weights.add(&f, dw);
        magnitude += dw * dw;
      }
    }
    magnitude
  }
}

/// Target features minus predicted features, over the union of their names
fn gradient(target: &Features, predicted: &Features) -> HashMap<String, f64> {
  let names = target.keys().chain(predicted.keys()).collect::<HashSet<_>>();
  names
    .into_iter()
    .map(|f| {
      let t = target.get(f).copied().unwrap_or(0.0);
      let p = predicted.get(f).copied().unwrap_or(0.0);
      (f.clone(), t - p)
    })
    .collect()
}

fn log_weights(weights: &Weights) {
  let ranked = weights.ranked();
  if ranked.len() < SHOWN_WEIGHTS * 2 {
    for (f, w) in ranked {
      debug!(weight = w, feature = f, "trained weight");
    }
  } else {
    let top = &ranked[..SHOWN_WEIGHTS];
    let bottom = &ranked[ranked.len() - SHOWN_WEIGHTS..];
    for (f, w) in top.iter().chain(bottom) {
      debug!(weight = w, feature = f, "trained weight");
    }
  }
}

/// Trains a copy of `model`, starting from zero weights, to rank a derivation
/// judged good by `metric` above all others for each example. Examples with no
/// good derivation are skipped. With zero epochs the model comes back as it
/// was.
///
/// The order of `examples` is shuffled every epoch.
pub fn latent_sgd(
  model: &Model,
  examples: &mut [Example],
  metric: &dyn Metric,
  config: &LearnerConfig,
) -> Result<Training, Err> {
  if config.epochs == 0 {
    return Ok(Training {
      model: model.clone(),
      epochs: Vec::new(),
    });
  }

  info!(
    examples = examples.len(),
    metric = metric.name(),
    seed = ?config.seed,
    "running SGD"
  );

  let rng = match config.seed {
    Some(seed) => StdRng::seed_from_u64(seed),
    None => StdRng::from_entropy(),
  };
  let mut learner = Learner {
    config,
    metric,
    rng,
    adagrad: HashMap::new(),
  };

  let mut model = model.fresh();
  let mut epochs = Vec::new();
  for epoch in 1..=config.epochs {
    let stats = learner.epoch(&mut model, examples, epoch)?;
    info!(
      epoch,
      error = stats.error,
      update_magnitude = stats.update_magnitude,
      accuracy = stats.accuracy,
      "{}",
      stats
    );
    epochs.push(stats);

    if stats.error < config.epsilon || stats.update_magnitude < config.epsilon {
      break;
    }
  }

  log_weights(&model.weights);
  Ok(Training { model, epochs })
}
