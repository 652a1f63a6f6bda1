#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {status} - {body}")]
    HttpError { status: u16, body: String },

    #[error("malformed response from model endpoint: {0}")]
    MalformedResponse(String),

    #[error("no credential configured for provider {0}")]
    MissingCredential(String),
}

impl ProviderError {
    pub fn from_http(status: u16, body: String) -> Self {
        ProviderError::HttpError { status, body }
    }
}
