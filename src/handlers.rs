use std::sync::Arc;

use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{web, HttpResponse, ResponseError};
use futures_util::StreamExt;
use log::{error, info, warn};
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::error::PredictError;
use crate::models::Prediction;

pub const HOME_MESSAGE: &str =
    "🐶 PetScanIA API está funcionando. Usa /predict para enviar imágenes.";

const FILE_FIELD: &str = "file";

pub struct AppState {
    pub classifier: Arc<Classifier>,
    pub max_upload_bytes: usize,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/predict").route(web::post().to(predict)));
}

pub async fn home() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(HOME_MESSAGE)
}

pub async fn predict(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, PredictError> {
    let request_id = Uuid::new_v4();

    let result = classify_upload(&state, &mut payload).await;
    match &result {
        Ok(_) => {}
        Err(e) if e.status_code().is_client_error() => {
            warn!("[{}] rejected upload: {}", request_id, e.detail())
        }
        Err(e) => error!("[{}] prediction failed: {}", request_id, e.detail()),
    }

    let prediction = result?;
    info!(
        "[{}] {} (confidence {:.4})",
        request_id, prediction.diagnosis, prediction.confidence
    );
    Ok(HttpResponse::Ok().json(prediction))
}

async fn classify_upload(
    state: &AppState,
    payload: &mut Multipart,
) -> Result<Prediction, PredictError> {
    let image_bytes = read_upload(payload, state.max_upload_bytes).await?;

    let classifier = Arc::clone(&state.classifier);
    web::block(move || classifier.predict(&image_bytes))
        .await
        .map_err(|e| PredictError::Inference(e.to_string()))?
}

/// Returns the bytes of the first `file` part that carries a filename.
/// Parts without a filename are plain form fields and are skipped.
async fn read_upload(payload: &mut Multipart, limit: usize) -> Result<Vec<u8>, PredictError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(upload_error)?;

        let (name, filename) = {
            let disposition = field.content_disposition();
            (
                disposition.get_name().map(str::to_owned),
                disposition.get_filename().map(str::to_owned),
            )
        };

        match (name.as_deref(), filename) {
            (Some(FILE_FIELD), Some(filename)) if filename.is_empty() => {
                return Err(PredictError::EmptyFilename);
            }
            (Some(FILE_FIELD), Some(_)) => return read_field(&mut field, limit).await,
            _ => drain_field(&mut field).await?,
        }
    }

    Err(PredictError::MissingFile)
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, PredictError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(upload_error)?;
        if bytes.len() + data.len() > limit {
            return Err(PredictError::PayloadTooLarge { limit });
        }
        bytes.extend_from_slice(&data);
    }
    Ok(bytes)
}

async fn drain_field(field: &mut Field) -> Result<(), PredictError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(upload_error)?;
    }
    Ok(())
}

fn upload_error(err: MultipartError) -> PredictError {
    match err {
        // Not a multipart body at all: nothing was uploaded.
        MultipartError::NoContentType
        | MultipartError::ParseContentType
        | MultipartError::Boundary => PredictError::MissingFile,
        other => PredictError::MalformedUpload(other.to_string()),
    }
}
