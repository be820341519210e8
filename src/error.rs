//! Error taxonomy shared by the store, the upload pipeline and the HTTP layer.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upload aborted at chunk {chunk} of {total}: {source}")]
    UploadAborted {
        chunk: usize,
        total: usize,
        #[source]
        source: Box<AppError>,
    },

    #[error("upload cancelled")]
    Cancelled,

    #[error("media host rejected request ({status}): {body}")]
    MediaHost { status: u16, body: String },

    #[error("backend call failed ({status}): {message}")]
    Rpc { status: u16, message: String },

    #[error("database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field-level detail for form errors, shaped as `{field: [messages]}`.
    /// Empty for every kind except `Validation`.
    pub fn field_errors(&self) -> BTreeMap<String, Vec<String>> {
        let mut errors = BTreeMap::new();
        if let Self::Validation { field, message } = self {
            errors.insert(field.clone(), vec![message.clone()]);
        }
        errors
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
            || matches!(self, Self::Rpc { status: 404, .. })
    }
}
