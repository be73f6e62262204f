use crate::StoreError;

/// Reject keys that could escape a bucket root when mapped onto a filesystem.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("empty key".into()));
    }
    if key.contains('\\') {
        return Err(StoreError::InvalidKey(format!("backslash in key: {key}")));
    }
    if key.split('/').any(|seg| seg == ".." || seg == ".") {
        return Err(StoreError::InvalidKey(format!(
            "parent or current directory segment in key: {key}"
        )));
    }
    if key.starts_with('/') || (key.len() > 1 && key.chars().nth(1) == Some(':')) {
        return Err(StoreError::InvalidKey(format!("key appears absolute: {key}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_key;

    #[test]
    fn accepts_nested_relative_keys() {
        assert!(validate_key("assets/app-abc.js").is_ok());
        assert!(validate_key("packs/js/runtime~mobile-1.js.map").is_ok());
        assert!(validate_key("a..b-1.js").is_ok());
    }

    #[test]
    fn rejects_escaping_keys() {
        for bad in ["", "../etc/passwd", "a/../../b", "/abs/key", "C:/x", "a\\b", "./a"] {
            assert!(validate_key(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
