//! Static file serving for [`App::static_files`](crate::App::static_files).

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use crate::context::Context;
use crate::error::{Error, HttpError};
use crate::handler::Handler;
use crate::response::ContentType;

/// A handler serving files under `root` from the `filepath` parameter.
pub(crate) fn handler(root: PathBuf) -> impl Handler {
    let root: Arc<Path> = root.into();
    move |c: Context| {
        let root = Arc::clone(&root);
        async move { serve(c, &root).await }
    }
}

async fn serve(c: Context, root: &Path) -> Result<(), Error> {
    let requested = c.param("filepath").unwrap_or_default();
    let Some(relative) = confine(&requested) else {
        debug!(path = %requested, "static path escapes root, rejected");
        return Err(HttpError::not_found("file not found").into());
    };

    let mut path = root.join(relative);
    if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
        path.push("index.html");
    }
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HttpError::not_found("file not found").into());
        }
        Err(e) => return Err(HttpError::wrap(StatusCode::INTERNAL_SERVER_ERROR, "", e).into()),
    };
    c.blob(StatusCode::OK, ContentType::from_path(&path).as_str(), body)
}

/// The request path as a relative path made only of normal components, or
/// `None` when it contains anything else (`..`, a root, a drive prefix).
fn confine(requested: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(requested.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => out.push(part),
            _ => return None,
        }
    }
    Some(out)
}
