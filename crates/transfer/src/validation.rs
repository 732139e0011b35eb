use crate::TransferError;

/// Longest object key the backend accepts, in bytes.
const MAX_KEY_LEN: usize = 1024;

/// Validates a destination object key.
///
/// Rejects:
/// - Empty keys
/// - Keys starting with `/`
/// - `..` segments
/// - Control characters
/// - Keys longer than 1024 bytes
pub fn validate_object_key(key: &str) -> Result<(), TransferError> {
    let invalid = |reason: &str| {
        Err(TransferError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        })
    };

    if key.is_empty() {
        return invalid("empty key");
    }
    if key.starts_with('/') {
        return invalid("leading slash not allowed");
    }
    if key.split('/').any(|segment| segment == "..") {
        return invalid("parent segment not allowed");
    }
    if key.chars().any(char::is_control) {
        return invalid("control character not allowed");
    }
    if key.len() > MAX_KEY_LEN {
        return invalid("longer than 1024 bytes");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_key() {
        assert!(validate_object_key("").is_err());
    }

    #[test]
    fn rejects_leading_slash() {
        assert!(validate_object_key("/models/a.bin").is_err());
    }

    #[test]
    fn rejects_parent_segments() {
        assert!(validate_object_key("..").is_err());
        assert!(validate_object_key("../a.bin").is_err());
        assert!(validate_object_key("models/../../a.bin").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_object_key("a\nb").is_err());
        assert!(validate_object_key("a\0b").is_err());
        assert!(validate_object_key("tab\there").is_err());
    }

    #[test]
    fn rejects_overlong_key() {
        assert!(validate_object_key(&"k".repeat(1025)).is_err());
        assert!(validate_object_key(&"k".repeat(1024)).is_ok());
    }

    #[test]
    fn accepts_ordinary_keys() {
        for key in [
            "a.bin",
            "org/model/resolve/main/model.safetensors",
            "dir/with space/file name.txt",
            "..hidden/…dots../x",
            "中文/文件.bin",
        ] {
            assert!(validate_object_key(key).is_ok(), "{key}");
        }
    }

    #[test]
    fn error_names_the_key() {
        let err = validate_object_key("/abs").unwrap_err();
        assert!(err.to_string().contains("/abs"));
    }
}
