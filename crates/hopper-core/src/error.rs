use thiserror::Error;

/// Canonical result for the workspace.
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing connector/pipeline parameters. Raised at construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown location scheme '{scheme}' in '{location}'")]
    UnknownScheme { location: String, scheme: String },

    #[error("cannot resolve location '{location}': {reason}")]
    UnresolvedLocation { location: String, reason: String },

    /// A backend was asked for a shape it cannot represent, or was handed a
    /// value produced by a different backend.
    #[error("cannot convert {from} to {to}: {reason}")]
    Conversion {
        from: String,
        to: String,
        reason: String,
    },

    #[error("line {line}: record needs {required} characters, found {actual}")]
    TruncatedRecord {
        line: usize,
        required: usize,
        actual: usize,
    },

    #[error("line {line}: no schema registered for discriminator '{discriminator}'")]
    UnmatchedDiscriminator { line: usize, discriminator: String },

    /// I/O failure from the underlying storage, surfaced with the connector
    /// that hit it.
    #[error("{connector}: {source}")]
    Medium {
        connector: String,
        #[source]
        source: BoxError,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn conversion(
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Conversion {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    pub fn medium<E>(connector: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Medium {
            connector: connector.into(),
            source: source.into(),
        }
    }

    /// Errors that belong to construction time rather than to a run.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::UnknownScheme { .. } | Error::UnresolvedLocation { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_error_names_the_connector() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::medium("CsvFile(/tmp/x.csv)", io);
        assert_eq!(err.to_string(), "CsvFile(/tmp/x.csv): no such file");
        assert!(!err.is_config());
    }

    #[test]
    fn scheme_errors_are_configuration_errors() {
        let err = Error::UnknownScheme {
            location: "ftp://host/x".into(),
            scheme: "ftp".into(),
        };
        assert!(err.is_config());
    }
}
