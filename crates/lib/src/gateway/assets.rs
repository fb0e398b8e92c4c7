//! Browser UI embedded at build time and served from `/`.

use axum::{
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use include_dir::{include_dir, Dir};
use serde_json::json;

static WEB_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/web");

const INDEX: &str = "index.html";

/// Paths owned by the JSON API; unknown ones get a JSON 404 instead of the UI.
fn is_api_path(path: &str) -> bool {
    ["/api", "/relay"]
        .iter()
        .any(|p| path == *p || path.starts_with(&format!("{}/", p)))
}

fn asset_response(path: &str, contents: &'static [u8]) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let cache = if path == INDEX {
        "no-cache"
    } else {
        "public, max-age=86400"
    };
    (
        [
            (header::CONTENT_TYPE, mime.essence_str().to_string()),
            (header::CACHE_CONTROL, cache.to_string()),
        ],
        contents,
    )
        .into_response()
}

fn not_found(method: &Method, path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "API endpoint not found",
            "path": path,
            "method": method.as_str(),
        })),
    )
        .into_response()
}

/// Router fallback: embedded file, else `index.html` for client-side routes, else JSON 404.
pub(super) async fn fallback(method: Method, uri: Uri) -> Response {
    let path = uri.path();
    if is_api_path(path) || !(method == Method::GET || method == Method::HEAD) {
        return not_found(&method, path);
    }
    let relative = path.trim_start_matches('/');
    let relative = if relative.is_empty() { INDEX } else { relative };
    if let Some(file) = WEB_ASSETS.get_file(relative) {
        return asset_response(relative, file.contents());
    }
    match WEB_ASSETS.get_file(INDEX) {
        Some(index) => asset_response(INDEX, index.contents()),
        None => not_found(&method, path),
    }
}
