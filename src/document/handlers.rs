use actix_files::NamedFile;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{
    HttpRequest, HttpResponse,
    web::{self, Bytes, Path},
};
use log::{debug, info, warn};
use serde_json::Value;

use crate::document::models::{HealthResponse, ServiceIndex, TemplatePayload};
use crate::error::ApiError;
use crate::render::RenderJob;
use crate::AppState;

const ENDPOINTS: [&str; 4] = [
    "POST /create/pdf/templates/{templateName}",
    "GET /api/files",
    "GET /data/{fileName}",
    "GET /health",
];

fn attachment(file_name: &str) -> ContentDisposition {
    ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(file_name.to_string())],
    }
}

fn blocking_failed(err: actix_web::error::BlockingError) -> ApiError {
    ApiError::Internal(format!("Blocking task failed: {}", err))
}

#[utoipa::path(
    post,
    path = "/create/pdf/templates/{template_name}",
    tag = "PDF Generation",
    request_body(content = TemplatePayload, content_type = "application/json"),
    params(
        ("template_name" = String, Path, description = "Template name without extension")
    ),
    responses(
        (status = 200, description = "Generated PDF, also saved to the output directory", content_type = "application/pdf"),
        (status = 400, description = "Invalid JSON payload or missing template fields", body = String, content_type = "text/plain"),
        (status = 404, description = "Template not found", body = String, content_type = "text/plain"),
        (status = 500, description = "Rendering or storage failed", body = String, content_type = "text/plain")
    )
)]
pub async fn create_pdf(
    template_name: Path<String>,
    body: Bytes,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let template_name = template_name.into_inner();
    info!("Executing create_pdf handler for template: {}", template_name);

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejecting payload for {}: {}", template_name, e);
        ApiError::invalid_json()
    })?;

    let template_path = data.resolver.resolve(&template_name)?;
    debug!("Resolved template {} to {}", template_name, template_path.display());

    let job = RenderJob {
        template_name: template_name.clone(),
        template_path,
        payload,
    };
    let pdf = Bytes::from(data.render_pool.run(data.renderer.render(job)).await?);
    debug!("Rendered {} bytes for template {}", pdf.len(), template_name);

    let store = data.store.clone();
    let to_save = pdf.clone();
    let name = template_name.clone();
    let stored = web::block(move || store.save(&name, &to_save))
        .await
        .map_err(blocking_failed)??;
    info!("Generated {} from template {}", stored.file_name, template_name);

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header(attachment(&stored.file_name))
        .body(pdf))
}

#[utoipa::path(
    get,
    path = "/api/files",
    tag = "Files",
    responses(
        (status = 200, description = "Generated PDF names, newest first", body = [String]),
        (status = 500, description = "Output directory could not be read", body = String, content_type = "text/plain")
    )
)]
pub async fn list_files(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    info!("Executing list_files handler");
    let store = data.store.clone();
    let files = web::block(move || store.list())
        .await
        .map_err(blocking_failed)??;
    debug!("Found {} generated files", files.len());
    Ok(HttpResponse::Ok().json(files))
}

#[utoipa::path(
    get,
    path = "/data/{file_name}",
    tag = "Files",
    params(
        ("file_name" = String, Path, description = "Bare name of a generated PDF")
    ),
    responses(
        (status = 200, description = "The stored PDF", content_type = "application/pdf"),
        (status = 400, description = "Invalid file name or extension", body = String, content_type = "text/plain"),
        (status = 404, description = "File not found", body = String, content_type = "text/plain")
    )
)]
pub async fn serve_file(
    req: HttpRequest,
    file_name: Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let file_name = file_name.into_inner();
    info!("Executing serve_file handler for: {}", file_name);

    let store = data.store.clone();
    let name = file_name.clone();
    let path = web::block(move || store.fetch(&name))
        .await
        .map_err(blocking_failed)??;

    let file = NamedFile::open_async(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to open {}: {}", file_name, e)))?
        .set_content_disposition(attachment(&file_name));
    Ok(file.into_response(&req))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Service",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse::healthy())
}

/// Serves the bundled `index.html` when one exists, otherwise a JSON summary.
#[utoipa::path(
    get,
    path = "/",
    tag = "Service",
    responses(
        (status = 200, description = "Static index page or service summary", body = ServiceIndex)
    )
)]
pub async fn index(req: HttpRequest, data: web::Data<AppState>) -> HttpResponse {
    let index_page = data.config.static_root.join("index.html");
    if index_page.is_file() {
        match NamedFile::open_async(&index_page).await {
            Ok(file) => return file.into_response(&req),
            Err(e) => warn!("Failed to open {}: {}", index_page.display(), e),
        }
    }

    HttpResponse::Ok().json(ServiceIndex {
        status: "OK".to_string(),
        renderer: data.config.renderer.to_string(),
        endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
    })
}
