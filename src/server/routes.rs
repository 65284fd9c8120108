use super::{AppContext, download, error::ApiError, upload};
use crate::{
    engine::EngineInfo,
    formats::{Catalog, catalog},
    request::ConversionRequest,
    scratch::Scratch,
    util::safe_stem,
};
use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::HeaderName;
use axum::response::Response;
use tracing::{info, warn};

pub const BATCH_ARCHIVE_NAME: &str = "converted-documents.zip";
pub const CONVERTED_COUNT_HEADER: &str = "x-converted-count";
pub const FAILED_COUNT_HEADER: &str = "x-failed-count";

/// `GET /api/check-pandoc`
pub async fn check_engine(State(ctx): State<AppContext>) -> Json<EngineInfo> {
    let engine = ctx.engine.clone();
    let info = tokio::task::spawn_blocking(move || engine.probe())
        .await
        .unwrap_or_else(|e| EngineInfo::unavailable(format!("probe task aborted: {e}")));
    if !info.available {
        warn!("engine probe: unavailable ({})", info.error.as_deref().unwrap_or("unknown"));
    }
    Json(info)
}

/// `GET /api/formats`
pub async fn list_formats() -> Json<Catalog> {
    Json(catalog())
}

/// `POST /api/convert`
pub async fn convert(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut scratch = Scratch::new();
    let form = upload::read_form(&ctx.config, multipart, "file", 1, &mut scratch).await?;
    let Some(upload) = form.files.into_iter().next() else {
        return Err(ApiError::NoFileProvided);
    };
    let req = parse_request(
        form.from_format.as_deref(),
        form.to_format.as_deref(),
        form.options.as_deref(),
    )?;

    info!("convert {} {}->{}", upload.original_name, req.from, req.to);

    let pipeline = ctx.pipeline();
    let job_upload = upload.clone();
    let (scratch, result) = tokio::task::spawn_blocking(move || {
        let result = pipeline.convert_single(&job_upload, &req, &mut scratch);
        (scratch, result)
    })
    .await?;
    let output = result?;

    let download_name = format!("{}.{}", safe_stem(&upload.original_name), req.to.file_extension());
    download::attachment(&output, &download_name, req.to.content_type(), &[], scratch).await
}

/// `POST /api/convert-batch`
pub async fn convert_batch(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut scratch = Scratch::new();
    let max_files = ctx.config.limits.max_batch_files;
    let form = upload::read_form(&ctx.config, multipart, "files", max_files, &mut scratch).await?;
    if form.files.is_empty() {
        return Err(ApiError::NoFileProvided);
    }
    let req = parse_request(
        form.from_format.as_deref(),
        form.to_format.as_deref(),
        form.options.as_deref(),
    )?;

    info!("convert-batch {} files {}->{}", form.files.len(), req.from, req.to);

    let pipeline = ctx.pipeline();
    let uploads = form.files;
    let (scratch, result) = tokio::task::spawn_blocking(move || {
        let result = pipeline.run_batch(&uploads, &req, &mut scratch);
        (scratch, result)
    })
    .await?;
    let outcome = result?;

    let headers = [
        (
            HeaderName::from_static(CONVERTED_COUNT_HEADER),
            outcome.succeeded().to_string(),
        ),
        (
            HeaderName::from_static(FAILED_COUNT_HEADER),
            outcome.failed().to_string(),
        ),
    ];
    download::attachment(
        &outcome.archive,
        BATCH_ARCHIVE_NAME,
        "application/zip",
        &headers,
        scratch,
    )
    .await
}

fn parse_request(
    from: Option<&str>,
    to: Option<&str>,
    options: Option<&str>,
) -> Result<ConversionRequest, ApiError> {
    let from = from.ok_or_else(|| ApiError::BadRequest("missing fromFormat".into()))?;
    let to = to.ok_or_else(|| ApiError::BadRequest("missing toFormat".into()))?;
    Ok(ConversionRequest::parse(from, to, options)?)
}
