use thiserror::Error;

/// Error type for the valuation pipeline.
///
/// The variants follow how a failure should be treated by the caller:
/// schema and lookup problems in shared setup steps are fatal to a whole run,
/// while alignment problems while monetizing a single ensemble member are
/// fatal to that member only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValuationError {
    /// A required column or field is absent from a source table.
    #[error("Required column '{column}' is missing from {source_name}")]
    Schema { column: String, source_name: String },
    /// A coordinate needed to line up two datasets is missing.
    #[error("Cannot align {dimension}='{label}': {context}")]
    DataAlignment {
        dimension: String,
        label: String,
        context: String,
    },
    /// A requested key is absent from a reference table.
    #[error("{key} is not present in {table}")]
    Lookup { key: String, table: String },
    /// A value is outside the domain required by a computation.
    #[error("Invalid numeric domain: {0}")]
    NumericDomain(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Cache failure: {0}")]
    Cache(String),
}

impl ValuationError {
    pub fn schema(column: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
            source_name: source_name.into(),
        }
    }

    pub fn alignment(
        dimension: impl Into<String>,
        label: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::DataAlignment {
            dimension: dimension.into(),
            label: label.to_string(),
            context: context.into(),
        }
    }

    pub fn lookup(key: impl ToString, table: impl Into<String>) -> Self {
        Self::Lookup {
            key: key.to_string(),
            table: table.into(),
        }
    }
}

/// Convenience type for `Result<T, ValuationError>`.
pub type ValuationResult<T> = Result<T, ValuationError>;
