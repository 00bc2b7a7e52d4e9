//! Engine to profile resolution.

use crate::error::UnknownEngineError;
use std::collections::HashMap;

/// Default profile for every supported OCR engine, plus the `none` baseline.
pub const DEFAULT_PROFILES: &[(&str, &str)] = &[
    ("tesseract", "ppro-tesseract"),
    ("easyocr", "ppro-easyocr"),
    ("paddleocr", "ppro-paddleocr"),
    ("trocr", "ppro-trocr"),
    ("parseq", "ppro-parseq"),
    ("none", "ppro-none"),
];

/// Maps engine identifiers to profile names.
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    table: HashMap<String, String>,
}

impl Default for ProfileResolver {
    fn default() -> Self {
        Self {
            table: DEFAULT_PROFILES
                .iter()
                .map(|(engine, profile)| (engine.to_string(), profile.to_string()))
                .collect(),
        }
    }
}

impl ProfileResolver {
    /// Register or replace the default profile of an engine
    pub fn with_engine(mut self, engine: &str, profile: impl Into<String>) -> Self {
        self.table.insert(engine.to_lowercase(), profile.into());
        self
    }

    /// Profile name for `engine`. An explicit `profile_override` always wins.
    pub fn resolve(&self, engine: &str, profile_override: Option<&str>) -> Result<String, UnknownEngineError> {
        if let Some(profile) = profile_override {
            return Ok(profile.to_string());
        }
        self.table
            .get(&engine.to_lowercase())
            .cloned()
            .ok_or_else(|| UnknownEngineError(engine.to_string()))
    }

    /// Engine identifiers known to the table, sorted
    pub fn engines(&self) -> Vec<&str> {
        let mut engines: Vec<&str> = self.table.keys().map(String::as_str).collect();
        engines.sort_unstable();
        engines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_profiles;

    #[test]
    fn test_resolve_default_table() {
        let resolver = ProfileResolver::default();
        assert_eq!(resolver.resolve("tesseract", None).unwrap(), "ppro-tesseract");
        assert_eq!(resolver.resolve("PaddleOCR", None).unwrap(), "ppro-paddleocr");
        assert_eq!(resolver.resolve("none", None).unwrap(), "ppro-none");
    }

    #[test]
    fn test_override_wins() {
        let resolver = ProfileResolver::default();
        assert_eq!(resolver.resolve("tesseract", Some("ppro-none")).unwrap(), "ppro-none");
        assert_eq!(resolver.resolve("bogus", Some("my-profile")).unwrap(), "my-profile");
    }

    #[test]
    fn test_unknown_engine() {
        let err = ProfileResolver::default().resolve("bogus", None).unwrap_err();
        assert_eq!(err, UnknownEngineError("bogus".to_string()));
    }

    #[test]
    fn test_with_engine_extends_table() {
        let resolver = ProfileResolver::default().with_engine("Doctr", "ppro-easyocr");
        assert_eq!(resolver.resolve("doctr", None).unwrap(), "ppro-easyocr");
        assert!(resolver.engines().contains(&"doctr"));
    }

    #[test]
    fn test_default_profiles_are_bundled() {
        let bundled: Vec<_> = builtin_profiles().collect();
        for (_, profile) in DEFAULT_PROFILES {
            assert!(bundled.contains(profile), "{} is not bundled", profile);
        }
    }
}
