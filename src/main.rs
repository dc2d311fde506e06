mod classifier;
mod config;
mod error;
mod handlers;
mod models;
mod preprocess;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::info;

use crate::classifier::{default_class_names, load_class_names, Classifier, OnnxModel};
use crate::config::AppConfig;
use crate::handlers::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    info!(
        "Starting with model={} input={}px layout={} activation={} max_upload={}B",
        config.model_path.display(),
        config.input_size,
        config.layout,
        config.activation,
        config.max_upload_bytes
    );

    let class_names = match &config.class_names_path {
        Some(path) => load_class_names(path)?,
        None => default_class_names(),
    };

    // The service is useless without a model, so any failure here aborts start-up.
    let model = OnnxModel::load(&config.model_path, config.input_size, config.layout)?;
    let classifier = Classifier::new(
        Box::new(model),
        class_names,
        config.input_size,
        config.layout,
        config.activation,
    )?;
    info!("Model ready, classes: {:?}", classifier.class_names());

    let state = web::Data::new(AppState {
        classifier: Arc::new(classifier),
        max_upload_bytes: config.max_upload_bytes,
    });

    info!("Server running at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
