use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::dto::{UploadImageForm, UploadResponse};
use super::service::{ImageKind, ImageService};
use crate::common::response::{ApiSuccess, ErrorBody};
use crate::error::Result;
use crate::state::AppState;

/// Upload an image
/// Stores the file in the raw bucket and queues its downscale.
#[utoipa::path(
    post,
    path = "/upload-image",
    request_body(content = UploadImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Uploaded and queued", body = UploadResponse),
        (status = 400, description = "Missing file or not an image", body = ErrorBody),
        (status = 502, description = "Storage or broker unavailable", body = ErrorBody)
    ),
    tag = "Images"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ApiSuccess<UploadResponse>> {
    let uploaded = ImageService::upload(&state, multipart).await?;
    Ok(ApiSuccess::ok(uploaded))
}

/// Download an image
#[utoipa::path(
    get,
    path = "/retrieve-image/{type}/{file}",
    params(
        ("type" = String, Path, description = "raw or processed"),
        ("file" = String, Path, description = "Object name returned by the upload")
    ),
    responses(
        (status = 200, description = "Image bytes", body = Vec<u8>, content_type = "image/*"),
        (status = 400, description = "Unknown type", body = ErrorBody),
        (status = 404, description = "No such image", body = ErrorBody)
    ),
    tag = "Images"
)]
pub async fn retrieve_image(
    State(state): State<AppState>,
    Path((kind, file)): Path<(String, String)>,
) -> Result<Response> {
    let kind = ImageKind::parse(&kind)?;
    let object = ImageService::retrieve(&state, kind, &file).await?;

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, object.content_type)],
        Body::from_stream(object.stream),
    )
        .into_response();

    if let Some(size) = object.size {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, size.into());
    }

    Ok(response)
}
