use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A typed id failed to parse from user or URL input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {raw:?}")]
pub struct ParseIdError {
    kind: &'static str,
    raw: String,
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            /// Accepts a bare number, optionally prefixed with `#`.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                trimmed
                    .strip_prefix('#')
                    .unwrap_or(trimmed)
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| ParseIdError {
                        kind: $label,
                        raw: s.to_owned(),
                    })
            }
        }
    };
}

numeric_id!(
    /// A question, or the parent of a comprehension group.
    QuestionId,
    "question id"
);

numeric_id!(
    /// A test paper; submissions are keyed by it.
    TestId,
    "test id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_with_optional_hash() {
        assert_eq!("123".parse::<QuestionId>().unwrap(), QuestionId::new(123));
        assert_eq!(" #7 ".parse::<TestId>().unwrap(), TestId::new(7));
        assert_eq!(TestId::new(7).to_string(), "7");
        assert_eq!(format!("{:?}", QuestionId::new(3)), "question id#3");
    }

    #[test]
    fn test_id_rejects_garbage() {
        let err = "mock-1".parse::<TestId>().unwrap_err();
        assert_eq!(err.to_string(), r#"invalid test id: "mock-1""#);
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&QuestionId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
