use serde_with::SerializeDisplay;

use std::{convert::Infallible, fmt::Display, str::FromStr};

/// A row or column label.
///
/// Text written exactly as an integer prints (a year, say) is kept as one,
/// so that labels sort numerically. Everything else is text. Integers sort before
/// text.
///
/// Labels serialize through their [`Display`] form, so integer labels become
/// string keys in a template context.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl Label {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Int(_) => None,
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl FromStr for Label {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.parse::<i64>() {
            Ok(n) if n.to_string() == s => Ok(Self::Int(n)),
            _ => Ok(Self::Text(s.to_string())),
        }
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(label) => label,
            Err(never) => match never {},
        }
    }
}

impl From<i64> for Label {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}
