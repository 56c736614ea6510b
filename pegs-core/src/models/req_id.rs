use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::registry;

/// Human-readable requirement identifier: a registered kind prefix followed by
/// a positive sequence number, e.g. `E.4.12`.
///
/// The textual form is part of the persisted contract, so parsing rejects
/// anything that would not print back identically (leading zeros, signs,
/// unregistered prefixes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReqId {
    prefix: &'static str,
    number: NonZeroU32,
}

impl ReqId {
    pub fn new(prefix: &'static str, number: NonZeroU32) -> Self {
        Self { prefix, number }
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    pub fn number(&self) -> NonZeroU32 {
        self.number
    }
}

impl fmt::Display for ReqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.number)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReqIdError {
    #[error("'{0}' does not start with a registered prefix")]
    UnknownPrefix(String),
    #[error("'{0}' does not end with a positive number")]
    Number(String),
}

impl FromStr for ReqId {
    type Err = ReqIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = registry::prefixes()
            .into_iter()
            .find(|prefix| s.starts_with(prefix))
            .ok_or_else(|| ReqIdError::UnknownPrefix(s.to_string()))?;

        let digits = &s[prefix.len()..];
        if digits.is_empty()
            || digits.starts_with('0')
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ReqIdError::Number(s.to_string()));
        }

        let number = digits
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| ReqIdError::Number(s.to_string()))?;

        Ok(Self::new(prefix, number))
    }
}

impl Serialize for ReqId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReqId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap()
    }

    #[test]
    fn displays_prefix_then_number() {
        assert_eq!(ReqId::new("E.4.", n(1)).to_string(), "E.4.1");
        assert_eq!(ReqId::new("G.6.", n(120)).to_string(), "G.6.120");
    }

    #[test]
    fn parses_what_it_prints() {
        for text in ["E.4.1", "G.3.42", "P.1.7", "M.2.1000"] {
            let id: ReqId = text.parse().unwrap();
            assert_eq!(id.to_string(), text);
        }
        let id: ReqId = "S.6.9".parse().unwrap();
        assert_eq!(id.prefix(), "S.6.");
        assert_eq!(id.number().get(), 9);
    }

    #[test]
    fn rejects_non_canonical_forms() {
        assert!(matches!("E.4.01".parse::<ReqId>(), Err(ReqIdError::Number(_))));
        assert!(matches!("E.4.0".parse::<ReqId>(), Err(ReqIdError::Number(_))));
        assert!(matches!("E.4.".parse::<ReqId>(), Err(ReqIdError::Number(_))));
        assert!(matches!("E.4.-3".parse::<ReqId>(), Err(ReqIdError::Number(_))));
        assert!(matches!("E.4.3a".parse::<ReqId>(), Err(ReqIdError::Number(_))));
        assert!(matches!("X.1.3".parse::<ReqId>(), Err(ReqIdError::UnknownPrefix(_))));
        assert!(matches!("E.9.3".parse::<ReqId>(), Err(ReqIdError::UnknownPrefix(_))));
    }

    #[test]
    fn serializes_as_a_string() {
        let id = ReqId::new("E.5.", n(3));
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::json!("E.5.3"));
        let back: ReqId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
