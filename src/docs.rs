use crate::common::response::ErrorBody;
use crate::modules::image::dto::{HealthResponse, UploadImageForm, UploadResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::image::handler::upload_image,
        crate::modules::image::handler::retrieve_image,
        crate::routes::healthz,
    ),
    components(
        schemas(UploadResponse, UploadImageForm, HealthResponse, ErrorBody)
    ),
    tags(
        (name = "Images", description = "Raw uploads and transcoded results"),
        (name = "System", description = "Health")
    )
)]
pub struct ApiDoc;
