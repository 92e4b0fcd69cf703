//! Pure classification of artifact names.

use crate::target::Target;
use std::path::Path;

/// Suffix of main bundle artifacts.
pub const BUNDLE_SUFFIX: &str = ".bundle";

/// Whether `filename` names a main bundle artifact.
pub fn is_bundle(filename: &str) -> bool {
    filename.ends_with(BUNDLE_SUFFIX)
}

/// Determine the MIME type of an artifact from its name.
///
/// Bundles are always served as JavaScript; anything else is looked up by
/// extension and falls back to `text/plain`.
pub fn get_mime_type(filename: &str) -> &'static str {
    if is_bundle(filename) {
        return "text/javascript";
    }

    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension.to_ascii_lowercase().as_str() {
        "js" | "mjs" | "cjs" => "text/javascript",
        "json" | "map" => "application/json",
        "html" => "text/html",
        "css" => "text/css",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "text/plain",
    }
}

/// Infer the target from a platform-qualified bundle name
/// (`index.android.bundle` → `android`).
pub fn infer_target(filename: &str, targets: &[Target]) -> Option<Target> {
    let stem = filename.strip_suffix(BUNDLE_SUFFIX)?;
    let (_, platform) = stem.rsplit_once('.')?;
    targets.iter().find(|t| t.as_str() == platform).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_mime_type() {
        assert_eq!(get_mime_type("index.bundle"), "text/javascript");
        assert_eq!(get_mime_type("src/App.bundle"), "text/javascript");
    }

    #[test]
    fn test_mime_type_by_extension() {
        assert_eq!(get_mime_type("index.bundle.map"), "application/json");
        assert_eq!(get_mime_type("assets/logo.PNG"), "image/png");
        assert_eq!(get_mime_type("1.chunk.js"), "text/javascript");
    }

    #[test]
    fn test_mime_type_default() {
        assert_eq!(get_mime_type("README"), "text/plain");
        assert_eq!(get_mime_type("data.xyz"), "text/plain");
    }

    #[test]
    fn test_is_bundle() {
        assert!(is_bundle("index.bundle"));
        assert!(!is_bundle("index.bundle.map"));
        assert!(!is_bundle("index.js"));
    }

    #[test]
    fn test_infer_target() {
        let targets = vec![Target::from("android"), Target::from("ios")];
        assert_eq!(
            infer_target("index.android.bundle", &targets),
            Some(Target::from("android"))
        );
        assert_eq!(infer_target("index.web.bundle", &targets), None);
        assert_eq!(infer_target("index.bundle", &targets), None);
        assert_eq!(infer_target("index.ios.js", &targets), None);
    }
}
