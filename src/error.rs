use std::io;

use crate::client::ProducerError;

/// Error type returned by plugin setup and by the CLS writer.
#[derive(thiserror::Error, Debug)]
pub enum ClsError {
    #[error("cls log writer decoder empty")]
    DecoderMissing,

    #[error("cls log writer config decode failed: {0}")]
    Decode(#[from] Box<figment::Error>),

    #[error("cls log writer config invalid: {0}")]
    Config(String),

    #[error("log line is not a valid JSON object: {0}")]
    Json(#[from] serde_json::Error),

    /// The ingestion client refused to enqueue the record.
    #[error("cls producer rejected log: {0}")]
    Enqueue(#[source] ProducerError),

    /// Creating or starting the ingestion client failed.
    #[error("cls producer setup failed: {0}")]
    Producer(#[source] ProducerError),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

impl From<figment::Error> for ClsError {
    fn from(err: figment::Error) -> Self {
        ClsError::Decode(Box::new(err))
    }
}

impl From<ClsError> for io::Error {
    fn from(err: ClsError) -> Self {
        let kind = match &err {
            ClsError::Json(_) => io::ErrorKind::InvalidData,
            ClsError::Enqueue(ProducerError::BufferFull { .. }) => io::ErrorKind::WouldBlock,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
