use anyhow::Context;
use serde::Serialize;

use std::{
    fmt::{Debug, Display},
    ops::AddAssign,
    str::FromStr,
};

/// A single numeric cell.
///
/// Values read from an integer column stay integers through aggregation. A
/// value read from a float column is a float, and so is any sum that
/// involves one.
///
/// Zero is exact: `Int(0)` and `Float(0.0)` are zero, nothing else is.
#[derive(Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    #[must_use]
    pub fn is_zero(self) -> bool {
        match self {
            Self::Int(n) => n == 0,
            Self::Float(x) => x == 0.0,
        }
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float(_))
    }

    /// Returns the zero of the same kind as `self`.
    #[must_use]
    pub fn zero_like(self) -> Self {
        match self {
            Self::Int(_) => Self::Int(0),
            Self::Float(_) => Self::Float(0.0),
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_float(self) -> Self {
        match self {
            Self::Int(n) => Self::Float(n as f64),
            float @ Self::Float(_) => float,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(x) => x,
        }
    }
}

impl Default for Number {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl Debug for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            // keeps the trailing ".0" so floats are recognisable in dumps
            Self::Float(x) => write!(f, "{x:?}"),
        }
    }
}

impl FromStr for Number {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<i64>() {
            return Ok(Self::Int(n));
        }
        let x = s.parse::<f64>().with_context(|| format!("not a number: {s:?}"))?;
        Ok(Self::Float(x))
    }
}

impl AddAssign for Number {
    fn add_assign(&mut self, rhs: Self) {
        *self = match (*self, rhs) {
            (Self::Int(a), Self::Int(b)) => match a.checked_add(b) {
                Some(sum) => Self::Int(sum),
                None => Self::Float(self.as_f64() + rhs.as_f64()),
            },
            (a, b) => Self::Float(a.as_f64() + b.as_f64()),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_fn_keeps_integers_as_integers() {
        assert_eq!(Number::from_str("42").unwrap(), Number::Int(42));
        assert_eq!(Number::from_str("4.5").unwrap(), Number::Float(4.5));
        assert!(Number::from_str("lots").is_err());
    }

    #[test]
    fn add_assign_promotes_to_float_when_either_side_is_float() {
        let mut n = Number::Int(2);
        n += Number::Int(3);
        assert_eq!(n, Number::Int(5));
        n += Number::Float(0.5);
        assert_eq!(n, Number::Float(5.5));
    }

    #[test]
    fn add_assign_falls_back_to_float_on_overflow() {
        let mut n = Number::Int(i64::MAX);
        n += Number::Int(1);
        assert!(n.is_float());
        assert_eq!(n, Number::Float(i64::MAX as f64 + 1.0));
    }

    #[test]
    fn is_zero_fn_uses_exact_comparison() {
        assert!(Number::Int(0).is_zero());
        assert!(Number::Float(0.0).is_zero());
        assert!(Number::Float(-0.0).is_zero());
        assert!(!Number::Float(1e-12).is_zero());
        assert!(!Number::Float(f64::NAN).is_zero());
    }

    #[test]
    fn display_distinguishes_floats_from_integers() {
        assert_eq!(Number::Int(5).to_string(), "5");
        assert_eq!(Number::Float(5.0).to_string(), "5.0");
        assert_eq!(Number::Int(5).to_float(), Number::Float(5.0));
    }
}
