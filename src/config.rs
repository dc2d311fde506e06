use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::StartupError;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MODEL_PATH: &str = "modelo_pet_disease.onnx";
pub const DEFAULT_INPUT_SIZE: u32 = 224;
pub const MAX_INPUT_SIZE: u32 = 4096;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Placeholder labels, index-aligned with the model output.
pub const CLASS_NAMES: [&str; 4] = ["Clase 0", "Clase 1", "Clase 2", "Clase 3"];

/// Memory order of the model's image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, as exported from Keras.
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`, as exported from PyTorch.
    Nchw,
}

impl TensorLayout {
    pub fn shape(&self, size: u32) -> [usize; 4] {
        let size = size as usize;
        match self {
            TensorLayout::Nhwc => [1, size, size, 3],
            TensorLayout::Nchw => [1, 3, size, size],
        }
    }
}

impl FromStr for TensorLayout {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorLayout::Nhwc => write!(f, "nhwc"),
            TensorLayout::Nchw => write!(f, "nchw"),
        }
    }
}

/// What the model's last layer already did to its scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputActivation {
    /// Scores are used as they come out of the model.
    #[default]
    None,
    /// Scores are raw logits and get a softmax before picking a class.
    Softmax,
}

impl FromStr for OutputActivation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(OutputActivation::None),
            "softmax" => Ok(OutputActivation::Softmax),
            _ => Err(()),
        }
    }
}

impl fmt::Display for OutputActivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputActivation::None => write!(f, "none"),
            OutputActivation::Softmax => write!(f, "softmax"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub class_names_path: Option<PathBuf>,
    pub input_size: u32,
    pub layout: TensorLayout,
    pub activation: OutputActivation,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, StartupError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, StartupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_var(&lookup, "PORT", DEFAULT_PORT)?;
        let model_path = lookup("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));
        let class_names_path = lookup("CLASS_NAMES_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        let input_size: u32 = parse_var(&lookup, "INPUT_SIZE", DEFAULT_INPUT_SIZE)?;
        if input_size == 0 || input_size > MAX_INPUT_SIZE {
            return Err(StartupError::InvalidEnv {
                key: "INPUT_SIZE",
                value: input_size.to_string(),
            });
        }
        let layout = parse_var(&lookup, "INPUT_LAYOUT", TensorLayout::default())?;
        let activation = parse_var(&lookup, "OUTPUT_ACTIVATION", OutputActivation::default())?;
        let max_upload_bytes = parse_var(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        Ok(Self {
            host,
            port,
            model_path,
            class_names_path,
            input_size,
            layout,
            activation,
            max_upload_bytes,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, StartupError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| StartupError::InvalidEnv { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, StartupError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.model_path, PathBuf::from("modelo_pet_disease.onnx"));
        assert!(config.class_names_path.is_none());
        assert_eq!(config.input_size, 224);
        assert_eq!(config.layout, TensorLayout::Nhwc);
        assert_eq!(config.activation, OutputActivation::None);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_port_from_env() {
        let config = config_from(&[("PORT", "8080")]).unwrap();
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_invalid_port_names_variable() {
        let err = config_from(&[("PORT", "http")]).unwrap_err();
        match err {
            StartupError::InvalidEnv { key, value } => {
                assert_eq!(key, "PORT");
                assert_eq!(value, "http");
            }
            other => panic!("Expected InvalidEnv, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_input_size_rejected() {
        assert!(config_from(&[("INPUT_SIZE", "0")]).is_err());
    }

    #[test]
    fn test_oversized_input_size_rejected() {
        match config_from(&[("INPUT_SIZE", "224000")]) {
            Err(StartupError::InvalidEnv { key, value }) => {
                assert_eq!(key, "INPUT_SIZE");
                assert_eq!(value, "224000");
            }
            other => panic!("Expected InvalidEnv, got {:?}", other),
        }
        let config = config_from(&[("INPUT_SIZE", "4096")]).unwrap();
        assert_eq!(config.input_size, 4096);
    }

    #[test]
    fn test_activation_parsing() {
        let config = config_from(&[("OUTPUT_ACTIVATION", "Softmax")]).unwrap();
        assert_eq!(config.activation, OutputActivation::Softmax);
        assert!(config_from(&[("OUTPUT_ACTIVATION", "sigmoid")]).is_err());
    }

    #[test]
    fn test_layout_parsing() {
        let config = config_from(&[("INPUT_LAYOUT", "NCHW")]).unwrap();
        assert_eq!(config.layout, TensorLayout::Nchw);
        assert!(config_from(&[("INPUT_LAYOUT", "chw")]).is_err());
    }

    #[test]
    fn test_blank_class_names_path_ignored() {
        let config = config_from(&[("CLASS_NAMES_PATH", "  ")]).unwrap();
        assert!(config.class_names_path.is_none());
    }

    #[test]
    fn test_layout_shape() {
        assert_eq!(TensorLayout::Nhwc.shape(224), [1, 224, 224, 3]);
        assert_eq!(TensorLayout::Nchw.shape(32), [1, 3, 32, 32]);
    }
}
