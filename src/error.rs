use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemitError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unknown agency: {0}")]
    UnknownAgency(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Unknown statement format: {0}")]
    UnknownFormat(String),

    #[error("Column mapping error: {0}")]
    Mapping(String),

    #[error("Invalid agent assignment: {0}")]
    InvalidAgentAssignment(String),

    #[error("Rows without a resolved agent: {0:?}")]
    UnassignedRows(Vec<usize>),

    #[error("An import is already in progress for agency {0}")]
    ImportInProgress(String),

    #[error("Write failed for {item}: {source}")]
    WriteFailure {
        item: String,
        source: rusqlite::Error,
    },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RemitError>;
