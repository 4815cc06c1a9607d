use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::config::StorageConfig;

/// Validation outcome; errors list every failed rule
#[derive(Debug, Clone)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Validate an incoming file against size and MIME rules. Pure, no I/O.
pub fn validate(name: &str, mime: &str, size: u64, config: &StorageConfig) -> Validation {
    let mut errors = Vec::new();

    if size > config.max_file_size {
        errors.push(format!(
            "file '{}' size {} bytes exceeds maximum of {} bytes",
            name, size, config.max_file_size
        ));
    }

    if !mime.starts_with("image/") {
        errors.push(format!("file '{}' is not an image (mime: {})", name, mime));
    }

    if !config.allowed_mime.iter().any(|m| m == mime) {
        errors.push(format!(
            "mime type '{}' is not allowed (allowed: {})",
            mime,
            config.allowed_mime.join(", ")
        ));
    }

    Validation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Keep only `[A-Za-z0-9._]`; runs of other characters collapse to one `_`.
/// Leading and trailing dot/underscore runs are trimmed so traversal
/// sequences and hidden-file names cannot survive sanitization.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Storage path: `base/user_id/<unix_ms>-<token>-<sanitized_name>`.
/// Timestamp plus random token gives practical uniqueness; the per-user
/// prefix keeps listing cheap.
pub fn generate_path(base: &str, user_id: &str, file_name: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();

    format!(
        "{}/{}/{}-{}-{}",
        base,
        sanitize_filename(user_id),
        Utc::now().timestamp_millis(),
        token.to_lowercase(),
        sanitize_filename(file_name)
    )
}

/// Deterministic thumbnail location for an object path. Thumbnails live
/// outside the managed base prefix so reconciliation never flags them.
pub fn thumbnail_path(base: &str, path: &str) -> String {
    let rest = path.strip_prefix(base).unwrap_or(path).trim_start_matches('/');
    format!("{}_thumbs/{}", base, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StorageConfig {
        StorageConfig::default()
    }

    #[test]
    fn oversized_file_is_rejected() {
        let result = validate("big.png", "image/png", 21 * 1024 * 1024, &config());
        assert!(!result.valid);
        assert!(!result.errors.is_empty());
        assert!(result.errors[0].contains("exceeds maximum"));
    }

    #[test]
    fn disallowed_mime_is_rejected() {
        let result = validate("doc.pdf", "application/pdf", 100, &config());
        assert!(!result.valid);

        let result = validate("movie.webm", "video/webm", 100, &config());
        assert!(!result.valid);
    }

    #[test]
    fn allowed_images_pass() {
        for mime in ["image/jpeg", "image/png", "image/webp", "image/gif", "image/svg+xml"] {
            let result = validate("pic", mime, 1024, &config());
            assert!(result.valid, "{} should be allowed", mime);
        }
    }

    #[test]
    fn multiple_failures_are_all_reported() {
        let result = validate("huge.bin", "application/octet-stream", u64::MAX, &config());
        assert!(!result.valid);
        assert!(result.errors.len() >= 2);
    }

    #[test]
    fn sanitize_strips_traversal_and_collapses() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("my photo (1).png"), "my_photo_1_.png");
        assert_eq!(sanitize_filename("///"), "file");
        assert_eq!(sanitize_filename("ok_name.jpg"), "ok_name.jpg");
    }

    #[test]
    fn sanitize_trims_edge_dot_and_underscore_runs() {
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("..trick.png"), "trick.png");
        assert_eq!(sanitize_filename("name.png.."), "name.png");
        assert_eq!(sanitize_filename("..._..."), "file");
    }

    #[test]
    fn generated_paths_are_unique_and_prefixed() {
        let a = generate_path("gallery", "user-1", "a.png");
        let b = generate_path("gallery", "user-1", "a.png");
        assert_ne!(a, b);
        assert!(a.starts_with("gallery/user_1/"));
        assert!(a.ends_with("-a.png"));
        assert!(!a.contains(".."));
    }

    #[test]
    fn thumbnail_path_leaves_managed_prefix() {
        let path = "gallery/u1/123-abc-a.png";
        assert_eq!(thumbnail_path("gallery", path), "gallery_thumbs/u1/123-abc-a.png");
    }
}
