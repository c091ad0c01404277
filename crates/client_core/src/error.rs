use shared::{error::ApiError, protocol::MISSING_FIELDS_MESSAGE};
use thiserror::Error;

use crate::form::FormField;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("{}", MISSING_FIELDS_MESSAGE)]
    MissingField { fields: Vec<FormField> },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server rejected request ({status}): {}", .error.message)]
    Api { status: u16, error: ApiError },
    #[error("server returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}
