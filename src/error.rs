use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;
use tract_onnx::prelude::TractError;

use crate::models::ErrorResponse;

/// Errors raised while serving a `/predict` request.
///
/// The `Display` text is what the caller sees, so it never includes the
/// underlying decoder or runtime message. Those go to the log instead.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("No se envió ninguna imagen")]
    MissingFile,

    #[error("Nombre de archivo vacío")]
    EmptyFilename,

    #[error("Formulario multipart inválido")]
    MalformedUpload(String),

    #[error("La imagen supera el tamaño máximo permitido")]
    PayloadTooLarge { limit: usize },

    #[error("No se pudo decodificar la imagen")]
    Decode(#[source] image::ImageError),

    #[error("La salida del modelo no coincide con la lista de clases")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("Error al ejecutar el modelo")]
    Inference(String),
}

impl PredictError {
    /// Internal detail for the log line; never sent to the client.
    pub fn detail(&self) -> String {
        match self {
            PredictError::MalformedUpload(detail) | PredictError::Inference(detail) => {
                detail.clone()
            }
            PredictError::PayloadTooLarge { limit } => format!("upload exceeds {} bytes", limit),
            PredictError::Decode(err) => err.to_string(),
            PredictError::ShapeMismatch { expected, got } => {
                format!("expected {} scores, model produced {}", expected, got)
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::MissingFile
            | PredictError::EmptyFilename
            | PredictError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            PredictError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PredictError::Decode(_)
            | PredictError::ShapeMismatch { .. }
            | PredictError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

/// Fatal errors while bringing the service up.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("failed to load model {path}: {source}")]
    ModelLoad {
        path: String,
        #[source]
        source: TractError,
    },

    #[error("failed to read class names from {path}: {source}")]
    ClassNames {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("class name list is empty")]
    NoClasses,

    #[error("model produces {outputs} scores but {classes} class names are configured")]
    ClassCountMismatch { classes: usize, outputs: usize },

    #[error("model probe failed: {0}")]
    Probe(String),
}
