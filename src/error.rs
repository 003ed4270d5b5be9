#[derive(Debug, thiserror::Error)]
pub enum JevtError {
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("JSON nesting too deep: {depth} levels > {limit}")]
    TooDeep { depth: usize, limit: usize },

    #[error("Unknown field id: {0}")]
    UnknownField(u32),

    #[error("Invalid field '{spec}': {message}")]
    InvalidFieldSpec { spec: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Output too large: {length} bytes > {capacity} byte buffer")]
    OutputTooLarge { length: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, JevtError>;
