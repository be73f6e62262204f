use std::path::Path;

pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for an asset key, judged by its last extension.
///
/// Source maps are served as JSON regardless of what the MIME table says.
pub fn content_type_for(key: &str) -> String {
    let ext = Path::new(key).extension().and_then(|e| e.to_str());
    if ext == Some("map") {
        return "application/json".to_string();
    }
    mime_guess::from_path(key)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}
