//! Payload validation mode for message decoding.
//!
//! - Lenient: `Launched` and `Exploded` substitute zero values for missing or
//!   mistyped fields, every other kind rejects them
//! - Strict: every kind rejects missing or mistyped fields

use std::fmt;

/// How tolerant message decoding is of incomplete payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Zero-fill missing fields for `Launched` and `Exploded`
    #[default]
    Lenient,
    /// Require every payload field for every kind
    Strict,
}

impl ValidationMode {
    /// Parse from environment variable value
    pub fn from_env_value(value: &str) -> Result<Self, String> {
        match value.trim().to_lowercase().as_str() {
            "lenient" | "relaxed" | "" => Ok(Self::Lenient),
            "strict" | "enforce" => Ok(Self::Strict),
            other => Err(format!(
                "Invalid validation mode: '{}'. Expected: lenient or strict",
                other
            )),
        }
    }

    /// Load from environment variable VALIDATION_MODE
    pub fn from_env() -> Result<Self, String> {
        match std::env::var("VALIDATION_MODE") {
            Ok(value) => Self::from_env_value(&value),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lenient => write!(f, "lenient"),
            Self::Strict => write!(f, "strict"),
        }
    }
}
