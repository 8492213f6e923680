use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request could not be built: {0}")]
    Build(#[from] reqwest::Error),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    #[error("logging API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("could not decode entries:list response: {0}")]
    Decode(#[from] serde_json::Error),
}
