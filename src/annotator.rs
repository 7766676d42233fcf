use crate::value::Value;

/// Recognizes token spans as (category, meaning) pairs, independently of the
/// grammar's rules. Annotators must not depend on chart state.
pub trait Annotator {
  fn annotate(&self, tokens: &[&str]) -> Vec<(String, Value)>;
}

/// Labels every single token as `$Token`, meaning the token itself
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenAnnotator;

impl Annotator for TokenAnnotator {
  fn annotate(&self, tokens: &[&str]) -> Vec<(String, Value)> {
    match tokens {
      [token] => vec![("$Token".to_string(), Value::from(*token))],
      _ => Vec::new(),
    }
  }
}

/// Labels single numeric tokens as `$Number`
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberAnnotator;

impl Annotator for NumberAnnotator {
  fn annotate(&self, tokens: &[&str]) -> Vec<(String, Value)> {
    match tokens {
      [token] => match token.parse::<f64>() {
        Ok(n) if n.is_finite() => vec![("$Number".to_string(), Value::Num(n))],
        _ => Vec::new(),
      },
      _ => Vec::new(),
    }
  }
}

#[test]
fn test_annotators() {
  let tokens = "four score and 30 years ago".split(' ').collect::<Vec<_>>();

  assert_eq!(NumberAnnotator.annotate(&tokens[3..4]), vec![("$Number".to_string(), Value::from(30))]);
  assert!(NumberAnnotator.annotate(&tokens[0..1]).is_empty());
  assert!(NumberAnnotator.annotate(&tokens[3..5]).is_empty());

  assert_eq!(TokenAnnotator.annotate(&tokens[1..2]), vec![("$Token".to_string(), Value::from("score"))]);
  assert!(TokenAnnotator.annotate(&tokens[1..3]).is_empty());
}
