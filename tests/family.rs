use std::rc::Rc;

use semparse::metrics::{denotation_match_metrics, evaluate_model, DenotationAccuracy};
use semparse::scoring::Features;
use semparse::{latent_sgd, tuple, Derivation, Example, Grammar, KnowledgeBase, LearnerConfig, Model, Value};

fn simpsons() -> KnowledgeBase {
  let tuples = [
    tuple!["male", "homer"],
    tuple!["female", "marge"],
    tuple!["male", "bart"],
    tuple!["female", "lisa"],
    tuple!["female", "maggie"],
    tuple!["adult", "homer"],
    tuple!["adult", "marge"],
    tuple!["child", "bart"],
    tuple!["child", "lisa"],
    tuple!["child", "maggie"],
    tuple!["has_age", "homer", 36],
    tuple!["has_age", "marge", 34],
    tuple!["has_age", "bart", 10],
    tuple!["has_age", "lisa", 8],
    tuple!["has_age", "maggie", 1],
    tuple!["has_brother", "lisa", "bart"],
    tuple!["has_brother", "maggie", "bart"],
    tuple!["has_sister", "bart", "maggie"],
    tuple!["has_sister", "bart", "lisa"],
    tuple!["has_father", "bart", "homer"],
    tuple!["has_father", "lisa", "homer"],
    tuple!["has_father", "maggie", "homer"],
    tuple!["has_mother", "bart", "marge"],
    tuple!["has_mother", "lisa", "marge"],
    tuple!["has_mother", "maggie", "marge"],
  ];
  KnowledgeBase::from_tuples(tuples.iter()).unwrap()
}

fn model() -> Model {
  let g: Grammar = include_str!("../grammars/family.gram").parse().unwrap();
  Model::new(Rc::new(g)).with_executor(Rc::new(simpsons()).executor())
}

/// Whether a disjunction is the outermost operation
fn top_operator(d: &Derivation) -> Features {
  let top = match d.semantics().as_tuple() {
    Some([op, ..]) if op.as_str() == Some(".or") => "or on top",
    _ => "join on top",
  };
  Features::from([(top.to_string(), 1.0)])
}

#[test]
fn test_questions() {
  let model = model();
  let cases = [
    ("bart", tuple!["bart"]),
    ("males", tuple!["bart", "homer"]),
    ("male children", tuple!["bart"]),
    ("male adults", tuple!["homer"]),
    ("sisters of bart", tuple!["lisa", "maggie"]),
    ("the sisters of bart", tuple!["lisa", "maggie"]),
    ("number of sisters of bart", tuple![2]),
    ("the oldest females", tuple!["marge"]),
    ("youngest children", tuple!["maggie"]),
    ("father of youngest children", tuple!["homer"]),
    ("males or adults", tuple!["bart", "homer", "marge"]),
  ];

  for (input, expected) in cases {
    let parses = model.parse_input(input).unwrap();
    assert_eq!(parses.len(), 1, "{}", input);
    assert_eq!(parses[0].denotation, Some(expected), "{}", input);
  }

  assert!(model.parse_input("the").unwrap().is_empty());
  assert!(model.parse_input("sisters of").unwrap().is_empty());
}

#[test]
fn test_attachment_ambiguity() {
  let model = model();
  let parses = model.parse_input("sisters of bart or adults").unwrap();
  assert_eq!(parses.len(), 2);

  let mut denotations = parses.into_iter().filter_map(|p| p.denotation).collect::<Vec<_>>();
  denotations.sort();
  assert_eq!(
    denotations,
    vec![tuple!["homer", "lisa", "maggie", "marge"], tuple!["lisa", "maggie"]]
  );
}

#[test]
fn test_learn_attachment_from_denotations() {
  let model = model().with_feature_fn(top_operator);
  let mut train = vec![
    Example::new("sisters of bart or adults").with_denotation(tuple!["homer", "lisa", "maggie", "marge"]),
    Example::new("mother of lisa or bart").with_denotation(tuple!["bart", "marge"]),
  ];
  let test = vec![Example::new("brothers of lisa or maggie").with_denotation(tuple!["bart", "maggie"])];

  let before = evaluate_model(&model, &train, &denotation_match_metrics()).unwrap();
  assert_eq!(before.get("denotation oracle accuracy"), Some(1.0));
  assert_eq!(before.get("number of parses"), Some(2.0));

  let config = LearnerConfig {
    seed: Some(3),
    ..Default::default()
  };
  let training = latent_sgd(&model, &mut train, &DenotationAccuracy, &config).unwrap();

  // both weights move by the same AdaGrad steps; the hinge margin is met
  // after ten updates
  assert_eq!(training.epochs.len(), 6);
  let last = training.epochs.last().unwrap();
  assert_eq!(last.error, 0.0);
  assert_eq!(last.accuracy, 1.0);

  let weights = &training.model.weights;
  assert!(weights.get("or on top") > 0.5);
  assert_eq!(weights.get("or on top"), -weights.get("join on top"));

  for examples in [&train, &test] {
    let eval = evaluate_model(&training.model, examples, &denotation_match_metrics()).unwrap();
    assert_eq!(eval.get("denotation accuracy"), Some(1.0));
  }
}

#[test]
fn test_semantics_are_queries() {
  let model = model();
  let parses = model.parse_input("the oldest females").unwrap();
  assert_eq!(parses[0].semantics(), &tuple![".argmax", "has_age", "female"]);

  let kb = simpsons();
  assert_eq!(kb.execute(parses[0].semantics()), Ok(tuple!["marge"]));
  assert_eq!(kb.execute(&Value::from("lisa")), Ok(tuple!["lisa"]));
}
