use thiserror::Error;

/// Fatal materialization failures. Whatever the variant, the target schema
/// may be left partially rebuilt; callers retry from scratch.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Invalid materialization input: {0}")]
    InvalidInput(String),
    #[error("Error dropping fact table {table}")]
    DropFact {
        table: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Error processing dimension table {table}")]
    Dimension {
        table: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Error processing fact table {table}")]
    Fact {
        table: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Error linking fact table {table} to {dimension}")]
    Constraint {
        table: String,
        dimension: String,
        #[source]
        source: anyhow::Error,
    },
}

impl LoadError {
    /// Name of the table whose step failed, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            LoadError::InvalidInput(_) => None,
            LoadError::DropFact { table, .. }
            | LoadError::Dimension { table, .. }
            | LoadError::Fact { table, .. }
            | LoadError::Constraint { table, .. } => Some(table),
        }
    }
}
