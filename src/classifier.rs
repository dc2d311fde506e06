use std::fs;
use std::path::Path;

use log::{debug, info};
use ndarray::Array4;
use tract_onnx::prelude::*;

use crate::config::{OutputActivation, TensorLayout, CLASS_NAMES};
use crate::error::{PredictError, StartupError};
use crate::models::Prediction;
use crate::preprocess::prepare_image;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Anything that turns a preprocessed image tensor into per-class scores.
pub trait ScoreModel: Send + Sync {
    fn scores(&self, input: Array4<f32>) -> Result<Vec<f32>, PredictError>;
}

/// An ONNX graph loaded and optimized once, with its input shape pinned.
pub struct OnnxModel {
    plan: OnnxPlan,
}

impl OnnxModel {
    pub fn load(
        path: impl AsRef<Path>,
        input_size: u32,
        layout: TensorLayout,
    ) -> Result<Self, StartupError> {
        let path = path.as_ref();
        let [n, d1, d2, d3] = layout.shape(input_size);

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(n, d1, d2, d3)),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|source| StartupError::ModelLoad {
                path: path.display().to_string(),
                source,
            })?;

        info!(
            "Loaded model {} with input [{}, {}, {}, {}] ({})",
            path.display(),
            n,
            d1,
            d2,
            d3,
            layout
        );
        Ok(Self { plan })
    }
}

impl ScoreModel for OnnxModel {
    fn scores(&self, input: Array4<f32>) -> Result<Vec<f32>, PredictError> {
        let outputs = self
            .plan
            .run(tvec!(input.into_tensor().into()))
            .map_err(|e| PredictError::Inference(e.to_string()))?;

        let first = outputs
            .first()
            .ok_or_else(|| PredictError::Inference("model produced no outputs".to_string()))?;
        let view = first
            .to_array_view::<f32>()
            .map_err(|e| PredictError::Inference(e.to_string()))?;

        Ok(view.iter().copied().collect())
    }
}

pub fn default_class_names() -> Vec<String> {
    CLASS_NAMES.iter().map(|name| name.to_string()).collect()
}

/// Reads one label per line; blank lines are skipped.
pub fn load_class_names(path: impl AsRef<Path>) -> Result<Vec<String>, StartupError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| StartupError::ClassNames {
        path: path.display().to_string(),
        source,
    })?;

    let names: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if names.is_empty() {
        return Err(StartupError::NoClasses);
    }
    Ok(names)
}

/// The loaded model together with the labels for its outputs.
pub struct Classifier {
    model: Box<dyn ScoreModel>,
    class_names: Vec<String>,
    input_size: u32,
    layout: TensorLayout,
    activation: OutputActivation,
}

impl Classifier {
    /// Runs one blank image through the model so that a label list that
    /// does not match the output width fails here instead of per request.
    pub fn new(
        model: Box<dyn ScoreModel>,
        class_names: Vec<String>,
        input_size: u32,
        layout: TensorLayout,
        activation: OutputActivation,
    ) -> Result<Self, StartupError> {
        if class_names.is_empty() {
            return Err(StartupError::NoClasses);
        }

        let probe = Array4::zeros(layout.shape(input_size));
        let outputs = model
            .scores(probe)
            .map_err(|e| StartupError::Probe(e.detail()))?
            .len();
        if outputs != class_names.len() {
            return Err(StartupError::ClassCountMismatch {
                classes: class_names.len(),
                outputs,
            });
        }
        debug!("Probe produced {} scores", outputs);

        Ok(Self {
            model,
            class_names,
            input_size,
            layout,
            activation,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn predict(&self, image_bytes: &[u8]) -> Result<Prediction, PredictError> {
        let tensor = prepare_image(image_bytes, self.input_size, self.layout)?;
        let scores = self.model.scores(tensor)?;
        top_prediction(&scores, &self.class_names, self.activation)
    }
}

/// Picks the best class; ties go to the lowest index. The confidence is the
/// winning score after `activation`, clamped to `[0, 1]`.
pub fn top_prediction(
    scores: &[f32],
    class_names: &[String],
    activation: OutputActivation,
) -> Result<Prediction, PredictError> {
    if scores.len() != class_names.len() {
        return Err(PredictError::ShapeMismatch {
            expected: class_names.len(),
            got: scores.len(),
        });
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(PredictError::Inference(
            "model produced non-finite scores".to_string(),
        ));
    }

    let probabilities = match activation {
        OutputActivation::None => scores.to_vec(),
        OutputActivation::Softmax => softmax(scores),
    };

    let (index, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((i, p)),
        })
        .ok_or_else(|| PredictError::Inference("model produced no scores".to_string()))?;

    Ok(Prediction::new(
        class_names[index].clone(),
        confidence.clamp(0.0, 1.0),
    ))
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
