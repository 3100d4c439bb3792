use std::path::PathBuf;

use url::Url;

use crate::error::Error;

/// Controls how documents are loaded, indexed, and resolved.
///
/// The defaults are closed: no external lookups are performed unless a
/// scheme is explicitly allowed, which keeps a bundle of untrusted bytes
/// from touching the filesystem or the network.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Root directory for resolving relative file references.
    pub base_path: Option<PathBuf>,
    /// Root URL for resolving relative remote references.
    pub base_url: Option<Url>,
    /// Permit `$ref` targets on the local filesystem.
    pub allow_file_lookup: bool,
    /// Permit `$ref` targets over HTTP(S).
    pub allow_remote_lookup: bool,
    /// Skip eager enumeration of named components while indexing.
    pub avoid_build_index: bool,
    /// Lift externally referenced discriminator variants into the root's
    /// components section instead of leaving their `$ref`s pointing at
    /// files that no longer exist post-bundle.
    pub resolve_discriminator_external_refs: bool,
    /// Lift externally referenced recursive schemas into the root's
    /// components section. Off by default: the historical behavior inlines
    /// them and leaves a dangling local self-reference behind.
    pub resolve_recursive_external_schemas: bool,
    /// Filename globs restricting which files a directory walk loads.
    /// `*` matches any run of characters; an empty list loads every
    /// YAML/JSON file.
    pub file_filters: Vec<String>,
}

impl Config {
    /// A configuration with local file lookups enabled under `base_path`.
    pub fn open_local(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: Some(base_path.into()),
            allow_file_lookup: true,
            ..Self::default()
        }
    }
}

/// Controls composed bundling.
#[derive(Debug, Clone)]
pub struct CompositionConfig {
    /// Separator between a component's name and its collision counter.
    pub delimiter: String,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            delimiter: "__".to_string(),
        }
    }
}

impl CompositionConfig {
    /// # Errors
    ///
    /// Returns `Error::CompositionConflict` if the delimiter is empty or
    /// contains `#`, `/`, or whitespace, any of which would produce
    /// unaddressable component names.
    pub fn validate(&self) -> Result<(), Error> {
        if self.delimiter.is_empty() {
            return Err(Error::CompositionConflict {
                reason: "delimiter cannot be empty".to_string(),
            });
        }
        if self.delimiter.contains('#') || self.delimiter.contains('/') {
            return Err(Error::CompositionConflict {
                reason: "delimiter cannot contain '#' or '/' characters".to_string(),
            });
        }
        if self.delimiter.chars().any(char::is_whitespace) {
            return Err(Error::CompositionConflict {
                reason: "delimiter cannot contain whitespace".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delimiter_is_valid() {
        assert!(CompositionConfig::default().validate().is_ok());
        assert_eq!(CompositionConfig::default().delimiter, "__");
    }

    #[test]
    fn hostile_delimiters_are_rejected() {
        for bad in ["", "#", "a/b", "a b", "\t"] {
            let config = CompositionConfig {
                delimiter: bad.to_string(),
            };
            assert!(config.validate().is_err(), "delimiter {bad:?} should fail");
        }
    }

    #[test]
    fn defaults_are_closed() {
        let config = Config::default();
        assert!(!config.allow_file_lookup);
        assert!(!config.allow_remote_lookup);
    }
}
