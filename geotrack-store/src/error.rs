use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Device '{0}' not found")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Store responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Invalid store url: {0}")]
    InvalidUrl(String),

    #[error("Invalid document: {0}")]
    Decode(String),

    #[error("Unencodable value: {0}")]
    Encode(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
