//! File naming helpers.

/// Characters that are not allowed in file names on common platforms.
const INVALID_FILE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Strip characters that cannot appear in a file name.
///
/// Falls back to `"output"` when nothing usable is left.
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| !c.is_control() && !INVALID_FILE_NAME_CHARS.contains(c))
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "output".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Per-scene file name, e.g. `scene_007.png`.
pub fn scene_file_name(scene_index: u32, extension: &str) -> String {
    format!("scene_{:03}.{}", scene_index, extension.trim_start_matches('.'))
}
