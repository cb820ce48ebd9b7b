use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use crate::common::response::ApiError;
use crate::infrastructure::storage::local::{expiry_of, unix_now};
use crate::state::AppState;

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

/// Serve Published Video
/// Streams a locally published artifact until its expiry. Only mounted without object storage.
#[utoipa::path(
    get,
    path = "/compressed/{name}",
    params(("name" = String, Path, description = "Published file name")),
    responses(
        (status = 200, description = "File contents", content_type = "video/mp4"),
        (status = 400, description = "Invalid file name"),
        (status = 404, description = "Not Found"),
        (status = 410, description = "Link expired")
    ),
    tag = "Compress"
)]
pub async fn get_compressed(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    if !is_plain_file_name(&name) {
        return Err(ApiError("Invalid file name".to_string(), StatusCode::BAD_REQUEST));
    }

    let Some(expires_at) = expiry_of(&name) else {
        return Err(ApiError("File not found".to_string(), StatusCode::NOT_FOUND));
    };

    let path = state.config.public_dir.join(&name);
    if unix_now() >= expires_at {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!("🧹 Removed expired {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
        return Err(ApiError("Link expired".to_string(), StatusCode::GONE));
    }

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError("File not found".to_string(), StatusCode::NOT_FOUND));
        }
        Err(e) => {
            tracing::error!("Failed to open {}: {}", path.display(), e);
            return Err(ApiError(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR));
        }
    };

    let content_type = mime_guess::from_path(&path).first_or_octet_stream().to_string();
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);

    if let Ok(meta) = file.metadata().await {
        builder = builder.header(header::CONTENT_LENGTH, meta.len());
    }

    let body = Body::from_stream(ReaderStream::new(file));
    Ok(builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;
    use crate::config::settings::AppConfig;
    use crate::infrastructure::storage::local::{LocalPublisher, expiring_name};
    use crate::workers::transcoder::Transcoder;

    fn local_state(root: &std::path::Path) -> AppState {
        local_state_expiring_in(root, Duration::from_secs(3600))
    }

    fn local_state_expiring_in(root: &std::path::Path, url_expiry: Duration) -> AppState {
        let mut config = AppConfig::for_tests(root);
        config.url_expiry = url_expiry;
        std::fs::create_dir_all(&config.public_dir).unwrap();
        let publisher =
            LocalPublisher::new(config.public_dir.clone(), &config.public_base_url, config.url_expiry).unwrap();
        let transcoder = Transcoder::new(&config);
        AppState::new(config, transcoder, Arc::new(publisher))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn file_name_validation() {
        assert!(is_plain_file_name("1700000000-3f2a.mp4"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("..secret"));
        assert!(!is_plain_file_name("a\\b.mp4"));
    }

    #[tokio::test]
    async fn serves_published_file() {
        let tmp = tempfile::tempdir().unwrap();
        let state = local_state(tmp.path());
        let name = expiring_name("clip.mp4", unix_now() + 600);
        std::fs::write(state.config.public_dir.join(&name), b"mp4-bytes").unwrap();
        let app = crate::app::create_app(state);

        let response = app.oneshot(get(&format!("/compressed/{}", name))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"mp4-bytes");
    }

    #[tokio::test]
    async fn unknown_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let app = crate::app::create_app(local_state(tmp.path()));

        let missing = expiring_name("missing.mp4", unix_now() + 600);
        let response = app.clone().oneshot(get(&format!("/compressed/{}", missing))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get("/compressed/unstamped.mp4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn expired_link_is_gone_and_file_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let state = local_state(tmp.path());
        let name = expiring_name("old.mp4", unix_now() - 1);
        let path = state.config.public_dir.join(&name);
        std::fs::write(&path, b"stale").unwrap();
        let app = crate::app::create_app(state);

        let response = app.oneshot(get(&format!("/compressed/{}", name))).await.unwrap();

        assert_eq!(response.status(), StatusCode::GONE);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn published_url_is_denied_after_its_window() {
        let tmp = tempfile::tempdir().unwrap();
        let state = local_state_expiring_in(tmp.path(), Duration::ZERO);
        let artifact = tmp.path().join("out.mp4");
        std::fs::write(&artifact, b"short-lived").unwrap();

        let published = state.publisher.publish(&artifact, "job-3.mp4").await.unwrap();
        let path = url::Url::parse(&published.url).unwrap().path().to_string();
        let app = crate::app::create_app(state);

        let response = app.oneshot(get(&path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let app = crate::app::create_app(local_state(tmp.path()));

        let response = app.oneshot(get("/compressed/..%2Fsecret")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn locally_published_url_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let state = local_state(tmp.path());
        let artifact = tmp.path().join("out.mp4");
        std::fs::write(&artifact, b"fresh").unwrap();

        let published = state.publisher.publish(&artifact, "job-9.mp4").await.unwrap();
        let path = url::Url::parse(&published.url).unwrap().path().to_string();
        let app = crate::app::create_app(state);

        let response = app.oneshot(get(&path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"fresh");
    }
}
