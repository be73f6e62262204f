//! Mapping between fingerprinted (physical) keys and their stable logical names.
//!
//! A physical key looks like `<base>-<fingerprint>.<ext>[.<ext>...]`. The base may
//! itself contain hyphens and tildes; only the last hyphen segment in front of the
//! extension chain is the fingerprint.

use std::sync::OnceLock;

use regex::Regex;

static FINGERPRINTED_ASSET: OnceLock<Regex> = OnceLock::new();

fn fingerprinted_asset() -> &'static Regex {
    FINGERPRINTED_ASSET.get_or_init(|| {
        // The base is greedy so earlier hyphens stay part of it.
        Regex::new(r"\A(.*)-([[:alnum:]]+)((?:\.[[:alnum:]]+)+)\z")
            .expect("fingerprint pattern is a valid regex")
    })
}

/// Derives a logical name from a physical key.
///
/// Implementations return `None` when the key carries no recognizable fingerprint.
pub trait FingerprintScheme: Send + Sync {
    fn strip(&self, key: &str) -> Option<String>;
}

/// The built-in `<base>-<alnum>.<ext>` scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFingerprint;

impl FingerprintScheme for DefaultFingerprint {
    fn strip(&self, key: &str) -> Option<String> {
        strip_fingerprint(key)
    }
}

/// Adapter for closure-based custom schemes.
pub struct FingerprintFn<F>(pub F);

impl<F> FingerprintScheme for FingerprintFn<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn strip(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }
}

pub fn strip_fingerprint(key: &str) -> Option<String> {
    let caps = fingerprinted_asset().captures(key)?;
    Some(format!("{}{}", &caps[1], &caps[3]))
}

/// Built-in scheme with pass-through: keys without a fingerprint are their own logical name.
pub fn remove_fingerprint(key: &str) -> String {
    strip_fingerprint(key).unwrap_or_else(|| key.to_string())
}

/// Resolve a logical name through `scheme`, logging keys that carry no fingerprint.
pub fn logical_name(scheme: &dyn FingerprintScheme, key: &str) -> String {
    match scheme.strip(key) {
        Some(name) => name,
        None => {
            tracing::warn!("No fingerprint found for {}", key);
            key.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_multiple_extensions() {
        assert_eq!(
            remove_fingerprint("packs/js/0-3e1f1b9c14ca587bae85.chunk.js"),
            "packs/js/0.chunk.js"
        );
    }

    #[test]
    fn keeps_hyphens_in_base() {
        assert_eq!(
            remove_fingerprint("packs/js/pdf-post-previews-bundle-c574a9fdf0c69f19cce8.chunk.js"),
            "packs/js/pdf-post-previews-bundle.chunk.js"
        );
    }

    #[test]
    fn keeps_tilde_in_base() {
        assert_eq!(
            remove_fingerprint("packs/js/runtime~mobile-bundle-298e884ee611bb56b6ca.js.map"),
            "packs/js/runtime~mobile-bundle.js.map"
        );
    }

    #[test]
    fn strips_single_extension() {
        assert_eq!(
            remove_fingerprint(
                "assets/bootstrap/glyphicons-halflings-regular-42f60659d265c1a3c30f9fa42abcbb56bd4a53af4d83d316d6dd7a36903c43e5.svg"
            ),
            "assets/bootstrap/glyphicons-halflings-regular.svg"
        );
    }

    #[test]
    fn passes_through_unfingerprinted_keys() {
        assert_eq!(strip_fingerprint("packs/js/0.chunk.js"), None);
        assert_eq!(remove_fingerprint("packs/js/0.chunk.js"), "packs/js/0.chunk.js");
        assert_eq!(remove_fingerprint("application.css"), "application.css");
        assert_eq!(remove_fingerprint("robots"), "robots");
    }

    #[test]
    fn stripped_name_drops_the_token() {
        let key = "assets/app-9f8e7d6c5b4a.css";
        let name = remove_fingerprint(key);
        assert_eq!(name, "assets/app.css");
        assert!(!name.contains("9f8e7d6c5b4a"));
    }

    #[test]
    fn custom_scheme_is_used() {
        let scheme = FingerprintFn(|key: &str| key.strip_prefix("v1/").map(str::to_string));
        assert_eq!(logical_name(&scheme, "v1/app.js"), "app.js");
        assert_eq!(logical_name(&scheme, "app-abc.js"), "app-abc.js");
    }
}
