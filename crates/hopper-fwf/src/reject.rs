//! Lines set aside by a lenient decode.

use hopper_core::error::Error;
use hopper_core::report::RejectedLine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectKind {
    /// Line shorter than the columns it must cover.
    Truncated { required: usize, actual: usize },
    /// No schema registered for the discriminator.
    Unmatched { discriminator: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reject {
    /// 1-based physical line number.
    pub line: usize,
    pub raw: String,
    #[serde(flatten)]
    pub kind: RejectKind,
}

impl Reject {
    pub fn reason(&self) -> String {
        match &self.kind {
            RejectKind::Truncated { required, actual } => {
                format!("truncated: needs {required} characters, has {actual}")
            }
            RejectKind::Unmatched { discriminator } => {
                format!("unmatched discriminator '{discriminator}'")
            }
        }
    }

    /// Report entry for this line, attributed to `source`.
    pub fn to_record(&self, source: &str) -> RejectedLine {
        RejectedLine {
            source: source.to_string(),
            line: self.line,
            raw: self.raw.clone(),
            reason: self.reason(),
        }
    }

    /// The error a strict decode raises for the same line.
    pub fn to_error(&self) -> Error {
        match &self.kind {
            RejectKind::Truncated { required, actual } => Error::TruncatedRecord {
                line: self.line,
                required: *required,
                actual: *actual,
            },
            RejectKind::Unmatched { discriminator } => Error::UnmatchedDiscriminator {
                line: self.line,
                discriminator: discriminator.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_line_and_names_the_cause() {
        let reject = Reject {
            line: 4,
            raw: "XXXgarbage".into(),
            kind: RejectKind::Unmatched {
                discriminator: "XXX".into(),
            },
        };
        let record = reject.to_record("MultiFixedWidthFile(/tmp/feed.txt)");
        assert_eq!(record.line, 4);
        assert_eq!(record.raw, "XXXgarbage");
        assert_eq!(record.reason, "unmatched discriminator 'XXX'");

        let short = Reject {
            line: 2,
            raw: "ab".into(),
            kind: RejectKind::Truncated {
                required: 8,
                actual: 2,
            },
        };
        assert_eq!(short.reason(), "truncated: needs 8 characters, has 2");
    }
}
