use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Prediction {
    pub diagnosis: String,
    pub confidence: f32,
    pub message: String,
}

impl Prediction {
    pub fn new(diagnosis: String, confidence: f32) -> Self {
        let message = format!("Diagnóstico IA: {} (Confianza: {:.2})", diagnosis, confidence);
        Self {
            diagnosis,
            confidence,
            message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
