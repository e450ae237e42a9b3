// src/main.rs
use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use log::info;

mod config;
mod errors;
mod handlers;
mod models;
mod orchestrator;
mod prompt;
mod services;
mod validation;

use crate::config::AppConfig;
use crate::handlers::{
    delete_transformation, flow_apply, flow_cancel, flow_picker_closed, flow_reset, flow_status,
    get_transformation, list_transformations, proxy_image, save_transformation, start_flow,
};
use crate::orchestrator::{FlowDeps, FlowRegistry};
use crate::services::{
    GeminiClient, GooglePickerClient, GoogleVisionClient, ImageFetchProxy, TransformationStore,
};

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    flow_deps: FlowDeps,
    flows: Arc<FlowRegistry>,
    image_proxy: Arc<ImageFetchProxy>,
    store: Arc<TransformationStore>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Restyle service...");

    let config = Arc::new(AppConfig::from_env()?);

    let store = Arc::new(TransformationStore::new(&config.redis_url).await?);
    let image_proxy = Arc::new(ImageFetchProxy::new(config.limits.clone()));
    let flow_deps = FlowDeps {
        picker: Arc::new(GooglePickerClient::new(&config.picker_base_url)),
        fetcher: image_proxy.clone(),
        vision: Arc::new(GoogleVisionClient::new(
            &config.vision_base_url,
            &config.google_api_key,
            config.limits.vision_timeout,
        )),
        generator: Arc::new(GeminiClient::new(
            &config.generation_base_url,
            &config.google_api_key,
            &config.generation_model,
            config.limits.generation_timeout,
        )),
    };

    let app_state = AppState {
        config: config.clone(),
        flow_deps,
        flows: Arc::new(FlowRegistry::new()),
        image_proxy,
        store,
    };

    info!("Starting HTTP server on {}", config.bind_addr);

    let bind_addr = config.bind_addr.clone();
    HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .service(
                web::scope("/api/v1")
                    .route("/flow", web::post().to(start_flow))
                    .route("/flow/{id}", web::get().to(flow_status))
                    .route("/flow/{id}/picker-closed", web::post().to(flow_picker_closed))
                    .route("/flow/{id}/cancel", web::post().to(flow_cancel))
                    .route("/flow/{id}/apply", web::post().to(flow_apply))
                    .route("/flow/{id}/reset", web::post().to(flow_reset))
                    .route("/photos/proxy-image", web::get().to(proxy_image))
                    .route("/transformations", web::post().to(save_transformation))
                    .route("/transformations", web::get().to(list_transformations))
                    .route("/transformations/{id}", web::get().to(get_transformation))
                    .route(
                        "/transformations/{id}",
                        web::delete().to(delete_transformation),
                    ),
            )
            .route("/health", web::get().to(health_check));

        if std::path::Path::new("./static").is_dir() {
            app = app.service(actix_files::Files::new("/", "./static").index_file("index.html"));
        }

        app
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "restyle",
        "version": "0.1.0"
    }))
}
