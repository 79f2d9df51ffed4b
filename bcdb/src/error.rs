use thiserror::Error;

#[derive(Error, Debug)]
pub enum BcdbError {
    /// Malformed schema text, wrong arity, bad names, duplicates.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Uniqueness clash, missing referenced value, self-reference, separator injection.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("invalid table file: {0}")]
    Corrupt(String),

    #[error("invalid table file at row {line}: {reason}")]
    CorruptRow { line: usize, reason: String },

    #[error("failed to add row {index} {row}: {source}")]
    Batch {
        index: usize,
        row: String,
        #[source]
        source: Box<BcdbError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl BcdbError {
    /// Pin a file-level corruption error to a 1-based line of the table file.
    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            BcdbError::Corrupt(reason) => BcdbError::CorruptRow { line, reason },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, BcdbError>;
