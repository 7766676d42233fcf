use std::error::Error;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// Splits input on whitespace. Tokens never contain whitespace.
///
/// ```
/// assert_eq!(semparse::utils::tokenize("  two plus\tthree "), vec!["two", "plus", "three"]);
/// ```
pub fn tokenize(input: &str) -> Vec<&str> {
  input.split_whitespace().collect()
}
