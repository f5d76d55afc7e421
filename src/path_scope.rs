use std::path::Path;

pub fn normalize(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }
    normalized
}

pub fn is_within_scope(path: &str, root: &str) -> bool {
    let path = normalize(path);
    let root = normalize(root);

    if path == root {
        return true;
    }

    if root == "/" {
        return path.starts_with('/');
    }

    if cfg!(windows) {
        let path_lower = path.to_ascii_lowercase();
        let root_lower = root.to_ascii_lowercase();
        return path_lower.starts_with(&(root_lower + "/"));
    }

    path.starts_with(&(root + "/"))
}

/// Two roots overlap when either one contains the other.
pub fn scopes_overlap(a: &str, b: &str) -> bool {
    is_within_scope(a, b) || is_within_scope(b, a)
}

/// `absolute` with the location root prefix stripped, keeping the leading
/// separator. Paths outside the root are returned unchanged.
pub fn relative_to_root(absolute: &str, root: &str) -> String {
    if !is_within_scope(absolute, root) {
        return absolute.to_string();
    }
    let absolute = normalize(absolute);
    let root = normalize(root);
    if root == "/" {
        return absolute;
    }
    absolute[root.len()..].to_string()
}

pub fn join_relative(root: &str, relative: &str) -> String {
    let trimmed = relative.trim_start_matches(['/', '\\']);
    Path::new(root).join(trimmed).to_string_lossy().to_string()
}

pub fn is_absolute(path: &str) -> bool {
    !path.is_empty() && Path::new(path).is_absolute()
}

pub fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_trailing_slashes() {
        assert_eq!(normalize("/foo/bar/"), "/foo/bar");
        assert_eq!(normalize("/foo/bar///"), "/foo/bar");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn within_scope_child_path() {
        assert!(is_within_scope("/foo/bar/baz", "/foo/bar"));
        assert!(!is_within_scope("/foo/barbaz", "/foo/bar"));
    }

    #[test]
    fn overlap_detects_parent_and_child() {
        assert!(scopes_overlap("/photos", "/photos/2024"));
        assert!(scopes_overlap("/photos/2024", "/photos"));
        assert!(!scopes_overlap("/photos", "/photos-old"));
    }

    #[test]
    fn relative_path_strips_root_prefix() {
        assert_eq!(relative_to_root("/photos/a/b.jpg", "/photos"), "/a/b.jpg");
        assert_eq!(relative_to_root("/photos/a/b.jpg", "/photos/"), "/a/b.jpg");
        assert_eq!(relative_to_root("/other/b.jpg", "/photos"), "/other/b.jpg");
    }

    #[test]
    fn join_relative_roundtrips_relative_path() {
        let rel = relative_to_root("/photos/a/b.jpg", "/photos");
        assert_eq!(
            normalize(&join_relative("/archive", &rel)),
            "/archive/a/b.jpg"
        );
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(
            extension_lowercase(Path::new("/x/IMG_01.JPG")).as_deref(),
            Some("jpg")
        );
        assert_eq!(extension_lowercase(Path::new("/x/README")), None);
    }
}
