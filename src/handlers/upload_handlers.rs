//! HTTP handlers for the chunked upload protocol.
//!
//! `/merge` and `/verify` parse their JSON body without insisting on a
//! `Content-Type`, since the browser client does not always send one.

use crate::{
    errors::AppError,
    models::upload::{ChunkUpload, MergeRequest, MergeResponse, VerifyRequest, VerifyResponse},
    services::{MergeOutcome, UploadService},
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// `POST /upload` — store one chunk from a multipart form.
pub async fn upload_chunk(
    State(service): State<UploadService>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut upload = ChunkUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), format!("malformed multipart body: {err}")))?
    {
        let name = field.name().map(str::to_string);
        let read_err = |err: axum::extract::multipart::MultipartError| {
            AppError::new(err.status(), format!("failed to read multipart field: {err}"))
        };
        match name.as_deref() {
            Some("chunk") => upload.chunk = Some(field.bytes().await.map_err(read_err)?),
            Some("hash") => upload.chunk_hash = Some(field.text().await.map_err(read_err)?),
            Some("fileHash") => upload.file_hash = Some(field.text().await.map_err(read_err)?),
            Some("filename") => upload.filename = Some(field.text().await.map_err(read_err)?),
            other => debug!("ignoring multipart field {:?}", other),
        }
    }

    let ack = service.receive_chunk(upload).await?;

    let mut response = Response::new(Body::from(ack.message()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// `POST /merge` — assemble the staged chunks into the final file.
pub async fn merge_chunks(
    State(service): State<UploadService>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let req: MergeRequest = parse_json(&body)?;
    match service.merge(req).await? {
        MergeOutcome::Merged { size, chunks } => {
            info!(size, chunks, "merge request completed");
        }
        MergeOutcome::AlreadyComplete => debug!("merge request for completed file"),
    }
    Ok(Json(MergeResponse::merged()))
}

/// `POST /verify` — tell the client whether to upload and what to skip.
pub async fn verify_upload(
    State(service): State<UploadService>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let req: VerifyRequest = parse_json(&body)?;
    let result = service.verify(req).await?;

    Ok(Json(VerifyResponse {
        should_upload: result.should_upload,
        uploaded_list: result
            .uploaded_chunk_labels
            .into_iter()
            .map(|label| label.to_string())
            .collect(),
    }))
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("invalid JSON body: {err}")))
}
