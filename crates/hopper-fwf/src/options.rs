use hopper_core::config::{ErrorPolicy, RunConfig};
use hopper_core::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Knobs shared by the single- and multi-schema decoders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Characters trimmed from both ends of every field.
    pub strip_chars: String,
    pub policy: ErrorPolicy,
    /// Characters skipped after the discriminator window before schema
    /// offsets start counting. Multi-schema only.
    pub skip_leading: usize,
    /// Turn fields that are empty after stripping into nulls.
    pub empty_as_null: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strip_chars: " ".to_string(),
            policy: ErrorPolicy::Strict,
            skip_leading: 0,
            empty_as_null: false,
        }
    }
}

impl DecodeOptions {
    /// Options seeded from a run's defaults.
    pub fn from_run_config(cfg: &RunConfig) -> Self {
        Self {
            strip_chars: cfg.strip_chars.clone(),
            policy: cfg.error_policy,
            ..Self::default()
        }
    }

    pub fn lenient(mut self) -> Self {
        self.policy = ErrorPolicy::Lenient;
        self
    }

    pub fn is_lenient(&self) -> bool {
        self.policy == ErrorPolicy::Lenient
    }

    pub(crate) fn strip<'a>(&self, field: &'a str) -> &'a str {
        if self.strip_chars.is_empty() {
            field
        } else {
            field.trim_matches(|c| self.strip_chars.contains(c))
        }
    }
}

/// Character window `[offset, offset + length)` that selects a line's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discriminator {
    pub offset: usize,
    pub length: usize,
}

impl Discriminator {
    pub fn new(offset: usize, length: usize) -> Result<Self> {
        if length == 0 {
            return Err(Error::config("discriminator window has zero length"));
        }
        if offset.checked_add(length).is_none() {
            return Err(Error::config("discriminator window ends past the addressable range"));
        }
        Ok(Self { offset, length })
    }

    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_uses_every_configured_char() {
        let opts = DecodeOptions {
            strip_chars: " 0".into(),
            ..DecodeOptions::default()
        };
        assert_eq!(opts.strip("0042 "), "42");

        let raw = DecodeOptions {
            strip_chars: String::new(),
            ..DecodeOptions::default()
        };
        assert_eq!(raw.strip("  x "), "  x ");
    }

    #[test]
    fn zero_length_window_is_rejected() {
        assert!(Discriminator::new(3, 0).unwrap_err().is_config());
    }

    #[test]
    fn window_end_must_fit() {
        assert!(Discriminator::new(usize::MAX, 1).unwrap_err().is_config());
    }
}
