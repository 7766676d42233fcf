use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// A named function over a list of meanings. Used both as a rule's semantic
/// attachment and as a first-class meaning (e.g. a curried operator).
#[derive(Clone)]
pub struct Lambda {
  name: Rc<str>,
  f: Rc<dyn Fn(&[Value]) -> Value>,
}

impl Lambda {
  pub fn new<F>(name: impl Into<Rc<str>>, f: F) -> Self
  where
    F: Fn(&[Value]) -> Value + 'static,
  {
    Self {
      name: name.into(),
      f: Rc::new(f),
    }
  }

  pub fn call(&self, args: &[Value]) -> Value {
    (self.f)(args)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Identity of the underlying closure, shared by clones of this lambda
  fn addr(&self) -> usize {
    Rc::as_ptr(&self.f) as *const u8 as usize
  }
}

impl PartialEq for Lambda {
  fn eq(&self, other: &Self) -> bool {
    self.addr() == other.addr()
  }
}

impl Eq for Lambda {}

impl fmt::Debug for Lambda {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Lambda({})", self.name)
  }
}

impl fmt::Display for Lambda {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name)
  }
}

/// A meaning: semantics of a derivation, denotation of a query, or an element
/// of a fact.
#[derive(Debug, Clone)]
pub enum Value {
  /// Stands in for the meaning of an omitted optional item
  None,
  Num(f64),
  Str(String),
  Tuple(Vec<Value>),
  Func(Lambda),
}

impl Value {
  pub fn str(s: impl Into<String>) -> Self {
    Self::Str(s.into())
  }

  pub fn is_none(&self) -> bool {
    matches!(self, Self::None)
  }

  pub fn as_num(&self) -> Option<f64> {
    match self {
      Self::Num(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_tuple(&self) -> Option<&[Value]> {
    match self {
      Self::Tuple(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_func(&self) -> Option<&Lambda> {
    match self {
      Self::Func(f) => Some(f),
      _ => None,
    }
  }

  /// Calls a function-valued meaning. None if this isn't a function.
  pub fn apply(&self, args: &[Value]) -> Option<Value> {
    self.as_func().map(|f| f.call(args))
  }

  fn rank(&self) -> u8 {
    match self {
      Self::None => 0,
      Self::Num(_) => 1,
      Self::Str(_) => 2,
      Self::Tuple(_) => 3,
      Self::Func(_) => 4,
    }
  }
}

/// Folds -0 into 0 and every NaN into one NaN, so that numbers which
/// compare equal as floats are equal as values
fn canonical(n: f64) -> f64 {
  if n.is_nan() { f64::NAN } else { n + 0.0 }
}

impl Ord for Value {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Self::None, Self::None) => Ordering::Equal,
      (Self::Num(a), Self::Num(b)) => canonical(*a).total_cmp(&canonical(*b)),
      (Self::Str(a), Self::Str(b)) => a.cmp(b),
      (Self::Tuple(a), Self::Tuple(b)) => a.cmp(b),
      (Self::Func(a), Self::Func(b)) => a.addr().cmp(&b.addr()),
      _ => self.rank().cmp(&other.rank()),
    }
  }
}

impl PartialOrd for Value {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Value {}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::None => write!(f, "_"),
      Self::Num(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
        write!(f, "{}", *n as i64)
      }
      Self::Num(n) => write!(f, "{}", n),
      Self::Str(s) => write!(f, "{}", s),
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
      Self::Func(l) => write!(f, "<{}>", l),
    }
  }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self {
    Self::Num(n)
  }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self {
    Self::Num(n as f64)
  }
}

impl From<i32> for Value {
  fn from(n: i32) -> Self {
    Self::Num(n as f64)
  }
}

impl From<usize> for Value {
  fn from(n: usize) -> Self {
    Self::Num(n as f64)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Self::Str(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Self::Str(s)
  }
}

impl From<Vec<Value>> for Value {
  fn from(items: Vec<Value>) -> Self {
    Self::Tuple(items)
  }
}

impl From<Lambda> for Value {
  fn from(l: Lambda) -> Self {
    Self::Func(l)
  }
}

/// Builds a `Value::Tuple` from anything convertible into a `Value`:
///
/// ```
/// use semparse::{tuple, Value};
///
/// let sem = tuple!["+", 1, tuple!["~", 2]];
/// assert_eq!(sem.to_string(), "(+ 1 (~ 2))");
/// ```
#[macro_export]
macro_rules! tuple {
  ($($item:expr),* $(,)?) => {
    $crate::Value::Tuple(vec![$($crate::Value::from($item)),*])
  };
}
