//! HTTP surface: status texts and build artifacts.

use crate::delegate::MessagesDelegate;
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use fob_multi_compiler::{get_mime_type, infer_target, CompilerError, MultiCompiler, Target};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct HttpState {
    pub compiler: Arc<MultiCompiler>,
    pub messages: Arc<dyn MessagesDelegate>,
}

/// `/status`, `/`, the routes in `api` and artifact serving for every other
/// path.
///
/// Every response carries `Cache-Control: no-cache` and permissive CORS
/// headers.
pub fn router(state: HttpState, api: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(status_handler))
        .route("/", get(hello_handler))
        .fallback(artifact_handler)
        .with_state(state)
        .merge(api)
        .layer(map_response(no_cache))
        .layer(cors)
}

async fn no_cache(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

async fn status_handler(State(state): State<HttpState>) -> String {
    state.messages.status()
}

async fn hello_handler(State(state): State<HttpState>) -> String {
    state.messages.hello()
}

/// Serve `GET /<file>?platform=<target>` from the compiler.
///
/// Without `platform` the target is inferred from bundle names such as
/// `index.ios.bundle`. `<bundle>.map` is answered with the bundle's source
/// map.
async fn artifact_handler(State(state): State<HttpState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Ok(path) = percent_decode_str(uri.path()).decode_utf8() else {
        return (StatusCode::BAD_REQUEST, "Request path is not valid UTF-8").into_response();
    };
    let filename = path.trim_start_matches('/');
    if filename.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let query = Query::<HashMap<String, String>>::try_from_uri(&uri)
        .map(|Query(query)| query)
        .unwrap_or_default();
    let bundle = filename.strip_suffix(".map");

    let target = match query.get("platform").filter(|platform| !platform.is_empty()) {
        Some(platform) => Target::from(platform.as_str()),
        None => match infer_target(bundle.unwrap_or(filename), state.compiler.targets()) {
            Some(target) => target,
            None => {
                return (StatusCode::BAD_REQUEST, "Missing platform query parameter")
                    .into_response();
            }
        },
    };

    tracing::debug!(platform = %target, file = %filename, "artifact request");
    let result = match bundle {
        Some(bundle) => state.compiler.get_source_map(bundle, &target).await,
        None => state.compiler.get_artifact(filename, &target).await,
    };

    match result {
        Ok(asset) => (
            [(header::CONTENT_TYPE, get_mime_type(filename))],
            asset.data,
        )
            .into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::warn!(platform = %target, file = %filename, "{}", e);
            }
            (status, e.to_string()).into_response()
        }
    }
}

fn status_for(err: &CompilerError) -> StatusCode {
    match err {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        CompilerError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
