// src/handlers.rs
use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::errors::RestyleError;
use crate::models::{AuthContext, Credential};
use crate::orchestrator::TransformFlow;
use crate::services::image_proxy::FetchPurpose;
use crate::services::store::NewTransformation;

/// Pull the auth context out of cookies. The token exchange itself lives in
/// the auth layer; we only require its cookies to be present.
fn auth_context(req: &HttpRequest) -> Result<AuthContext, RestyleError> {
    let access_token = req
        .cookie("access_token")
        .map(|c| c.value().to_string())
        .ok_or(RestyleError::Auth)?;
    let user_id = req
        .cookie("user_id")
        .map(|c| c.value().to_string())
        .ok_or(RestyleError::Auth)?;

    let credential = Credential::new(access_token);
    if credential.is_empty() || user_id.trim().is_empty() {
        return Err(RestyleError::Auth);
    }
    Ok(AuthContext {
        user_id,
        credential,
    })
}

async fn flow_or_404(
    data: &web::Data<AppState>,
    id: &Uuid,
) -> Result<Arc<TransformFlow>, RestyleError> {
    data.flows
        .get(id)
        .await
        .ok_or_else(|| RestyleError::NotFound("Flow".to_string()))
}

pub async fn start_flow(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let auth = auth_context(&req)?;

    let flow = Arc::new(TransformFlow::new(
        data.flow_deps.clone(),
        data.config.poll.clone(),
        data.config.limits.clone(),
    ));
    let started = flow.start_import(&auth.credential).await?;
    let flow_id = data.flows.insert(flow).await;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "flowId": flow_id,
        "sessionId": started.session_id,
        "pickerUri": started.picker_uri,
    })))
}

pub async fn flow_status(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let flow = flow_or_404(&data, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(flow.snapshot().await))
}

pub async fn flow_picker_closed(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let flow = flow_or_404(&data, &path.into_inner()).await?;
    flow.picker_closed();
    Ok(HttpResponse::Ok().json(flow.snapshot().await))
}

pub async fn flow_cancel(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let flow = flow_or_404(&data, &path.into_inner()).await?;
    flow.cancel_picker();
    Ok(HttpResponse::Ok().json(flow.snapshot().await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    #[serde(default)]
    pub hair_color: String,
    #[serde(default)]
    pub hair_style: String,
}

pub async fn flow_apply(
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<ApplyRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let auth = auth_context(&req)?;
    let flow = flow_or_404(&data, &path.into_inner()).await?;

    let snapshot = flow
        .apply(&auth.credential, &body.hair_color, &body.hair_style)
        .await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

pub async fn flow_reset(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let flow = flow_or_404(&data, &path.into_inner()).await?;
    flow.reset().await;
    Ok(HttpResponse::Ok().json(flow.snapshot().await))
}

#[derive(Debug, Deserialize)]
pub struct ProxyImageQuery {
    pub url: String,
}

/// Authenticated pass-through for external image references, so the browser
/// never needs the bearer token.
pub async fn proxy_image(
    req: HttpRequest,
    query: web::Query<ProxyImageQuery>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let auth = auth_context(&req)?;

    let (bytes, content_type) = data
        .image_proxy
        .fetch_bytes(&query.url, &auth.credential, FetchPurpose::Interactive)
        .await?;

    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .insert_header(("Cache-Control", "public, max-age=3600"))
        .body(bytes))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTransformationRequest {
    pub original_image_url: String,
    pub transformed_image_url: String,
    #[serde(default)]
    pub hair_color: Option<String>,
    #[serde(default)]
    pub hair_style: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

pub async fn save_transformation(
    req: HttpRequest,
    body: web::Json<SaveTransformationRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let auth = auth_context(&req)?;
    let body = body.into_inner();

    if body.original_image_url.trim().is_empty() || body.transformed_image_url.trim().is_empty() {
        return Err(RestyleError::InvalidInput(
            "originalImageUrl and transformedImageUrl are required".to_string(),
        ));
    }

    let record = data
        .store
        .save(NewTransformation {
            user_id: auth.user_id,
            original_image_url: body.original_image_url,
            transformed_image_url: body.transformed_image_url,
            hair_color: body.hair_color,
            hair_style: body.hair_style,
            prompt: body.prompt,
        })
        .await?;

    Ok(HttpResponse::Created().json(record))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub last_doc_id: Option<String>,
}

pub async fn list_transformations(
    req: HttpRequest,
    query: web::Query<ListQuery>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let auth = auth_context(&req)?;
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let page = data
        .store
        .list(&auth.user_id, limit, query.last_doc_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn get_transformation(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let auth = auth_context(&req)?;
    let record = data.store.get(&auth.user_id, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(record))
}

pub async fn delete_transformation(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RestyleError> {
    let auth = auth_context(&req)?;
    let id = path.into_inner();
    data.store.delete(&auth.user_id, &id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "id": id })))
}
