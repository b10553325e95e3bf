use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown source tag: {0}")]
    InvalidSourceTag(String),
    #[error("unknown entity kind: {0}")]
    InvalidEntityKind(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
