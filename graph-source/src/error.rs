use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    #[error("Unexpected row shape: {0}")]
    Row(#[from] neo4rs::DeError),

    #[error("Invalid graph config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
