use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrialMateError {
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

impl From<TrialMateError> for String {
    fn from(err: TrialMateError) -> Self {
        err.to_string()
    }
}
