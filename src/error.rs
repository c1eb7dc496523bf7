use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobUploadError {
    #[error("MQTT connection failed: {0}")]
    ConnectionError(String),

    #[error("identity response not received within {0} seconds")]
    IdentityTimeout(u64),

    #[error("protocol send failed: {0}")]
    ProtocolError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, BlobUploadError>;
