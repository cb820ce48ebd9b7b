use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::modules::compress::handler::compress_video,
        crate::modules::compress::files::get_compressed,
    ),
    components(
        schemas(
            crate::modules::compress::events::ProgressEvent,
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Compress", description = "Video upload, transcode and publish")
    )
)]
pub struct ApiDoc;
