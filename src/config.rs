//! Profile documents and the validated pipeline configuration built from them.

use crate::error::{ConfigError, ValidationError};
use crate::registry::{self, Params, StageName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

pub use crate::preprocessing::steps::StageOp;

const BUILTIN_PROFILES: &[(&str, &str)] = &[
    ("ppro-none", include_str!("../profiles/ppro-none.json")),
    ("ppro-tesseract", include_str!("../profiles/ppro-tesseract.json")),
    ("ppro-easyocr", include_str!("../profiles/ppro-easyocr.json")),
    ("ppro-paddleocr", include_str!("../profiles/ppro-paddleocr.json")),
    ("ppro-trocr", include_str!("../profiles/ppro-trocr.json")),
    ("ppro-parseq", include_str!("../profiles/ppro-parseq.json")),
];

/// Names of the profiles compiled into the crate
pub fn builtin_profiles() -> impl Iterator<Item = &'static str> {
    BUILTIN_PROFILES.iter().map(|(name, _)| *name)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileDocument {
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    stages: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct StageDocument {
    #[serde(default)]
    enabled: bool,
    method: Option<String>,
    #[serde(flatten)]
    params: Map<String, Value>,
}

/// One stage activation: whether it runs, which method, with which parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSpec {
    pub stage: StageName,
    pub enabled: bool,
    pub method: String,
    pub params: Params,
    /// Bound transform. `None` only for stages the document left out.
    #[serde(skip)]
    op: Option<StageOp>,
}

impl StageSpec {
    fn unlisted(stage: StageName) -> Self {
        let method = registry::default_method(stage).name;
        Self {
            stage,
            enabled: false,
            method: method.to_string(),
            params: Params::unset(stage, method),
            op: None,
        }
    }

    fn from_document(stage: StageName, value: Value) -> Result<Self, ConfigError> {
        let doc: StageDocument = serde_json::from_value(value).map_err(|source| ConfigError::MalformedStage {
            stage: stage.to_string(),
            source,
        })?;
        let method = doc
            .method
            .unwrap_or_else(|| registry::default_method(stage).name.to_string());
        let params = registry::validate(stage, &method, &doc.params)?;
        let op = StageOp::build(stage, &method, &params)?;

        Ok(Self {
            stage,
            enabled: doc.enabled,
            method,
            params,
            op: Some(op),
        })
    }

    pub fn op(&self) -> Option<&StageOp> {
        self.op.as_ref()
    }
}

/// A validated, immutable pipeline configuration.
///
/// Holds exactly one [`StageSpec`] per stage, in canonical order, whatever
/// order the source document listed them in. Safe to share across threads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    stages: Vec<StageSpec>,
}

impl PipelineConfig {
    /// Configuration with every stage disabled
    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            stages: StageName::CANONICAL.into_iter().map(StageSpec::unlisted).collect(),
        }
    }

    /// Parse and validate a profile document.
    pub fn load(source: &str) -> Result<Self, ConfigError> {
        Self::parse(source, None)
    }

    /// Load a profile document from disk. The file stem names the profile
    /// when the document has no `name`.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let stem = path.file_stem().and_then(|s| s.to_str());
        Self::parse(&source, stem)
    }

    /// Load one of the profiles bundled with the crate.
    pub fn load_builtin(name: &str) -> Result<Self, ConfigError> {
        let (_, source) = BUILTIN_PROFILES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;
        Self::parse(source, Some(name))
    }

    /// Load a profile by name, preferring `<dir>/<name>.json` over the
    /// bundled profile of the same name.
    pub fn load_named(name: &str, dir: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(dir) = dir {
            let candidate = dir.join(format!("{}.json", name));
            if candidate.is_file() {
                tracing::debug!(profile = name, path = %candidate.display(), "using profile from directory");
                return Self::load_file(candidate);
            }
        }
        Self::load_builtin(name)
    }

    fn parse(source: &str, fallback_name: Option<&str>) -> Result<Self, ConfigError> {
        let doc: ProfileDocument = serde_json::from_str(source)?;

        if let Some(unknown) = doc.stages.keys().find(|key| StageName::parse(key).is_none()) {
            return Err(ValidationError::UnknownStage(unknown.clone()).into());
        }

        let mut listed = doc.stages;
        let mut stages = Vec::with_capacity(StageName::CANONICAL.len());
        for stage in StageName::CANONICAL {
            let spec = match listed.remove(stage.as_str()) {
                Some(value) => StageSpec::from_document(stage, value)?,
                None => StageSpec::unlisted(stage),
            };
            stages.push(spec);
        }

        registry::validate_preconditions(stages.iter().map(|s| (s.stage, s.method.as_str(), s.enabled)))?;

        let config = Self {
            name: doc
                .name
                .or_else(|| fallback_name.map(str::to_string))
                .unwrap_or_else(|| "custom".to_string()),
            description: doc.description,
            stages,
        };
        tracing::info!(
            profile = %config.name,
            enabled = config.enabled_stages().count(),
            "profile loaded"
        );
        Ok(config)
    }

    /// All stages in canonical order
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn stage(&self, stage: StageName) -> &StageSpec {
        &self.stages[stage.index()]
    }

    pub fn enabled_stages(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter().filter(|s| s.enabled)
    }

    pub fn is_enabled(&self, stage: StageName) -> bool {
        self.stage(stage).enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load(doc: Value) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig::load(&doc.to_string())
    }

    #[test]
    fn test_every_builtin_profile_loads() {
        for name in builtin_profiles() {
            let config = PipelineConfig::load_builtin(name).unwrap_or_else(|e| panic!("{}: {}", name, e));
            assert_eq!(config.name, name);
            assert_eq!(config.stages().len(), StageName::CANONICAL.len());
        }
    }

    #[test]
    fn test_unlisted_stages_are_disabled() {
        let config = load(json!({"stages": {"grayscale": {"enabled": true}}})).unwrap();
        assert!(config.is_enabled(StageName::Grayscale));
        assert_eq!(config.enabled_stages().count(), 1);
        assert_eq!(config.stage(StageName::Resize).method, "cubic");
        assert!(config.stage(StageName::Resize).op().is_none());
        assert_eq!(config.name, "custom");
    }

    #[test]
    fn test_stages_follow_canonical_order() {
        let config = load(json!({
            "stages": {
                "padding": {"enabled": true},
                "threshold": {"enabled": true},
                "grayscale": {"enabled": true}
            }
        }))
        .unwrap();
        let order: Vec<_> = config.stages().iter().map(|s| s.stage).collect();
        assert_eq!(order, StageName::CANONICAL.to_vec());
    }

    #[test]
    fn test_default_method_is_applied() {
        let config = load(json!({"stages": {"denoise": {"enabled": true}}})).unwrap();
        let denoise = config.stage(StageName::Denoise);
        assert_eq!(denoise.method, "bilateral");
        assert_eq!(denoise.params.int("diameter").unwrap(), 5);
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        let err = load(json!({"stages": {"binarize": {"enabled": true}}})).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::UnknownStage(ref s)) if s == "binarize"
        ));
    }

    #[test]
    fn test_disabled_stage_is_still_validated() {
        let err = load(json!({"stages": {"threshold": {"enabled": false, "method": "bogus"}}})).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::UnknownMethod {
                stage: StageName::Threshold,
                ..
            })
        ));
    }

    #[test]
    fn test_first_violation_in_canonical_order() {
        let err = load(json!({
            "stages": {
                "padding": {"enabled": true, "size": -1},
                "resize": {"enabled": true, "min_height": 0, "min_width": 10}
            }
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::OutOfRange {
                stage: StageName::Resize,
                ..
            })
        ));
    }

    #[test]
    fn test_clahe_without_grayscale_fails_validation() {
        let err = load(json!({
            "stages": {
                "grayscale": {"enabled": false},
                "clahe": {"enabled": true}
            }
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::Precondition {
                stage: StageName::Clahe,
                requires: StageName::Grayscale,
                ..
            })
        ));
    }

    #[test]
    fn test_disabled_gray_only_method_needs_no_grayscale() {
        let config = load(json!({"stages": {"threshold": {"enabled": false, "method": "otsu"}}})).unwrap();
        assert!(!config.is_enabled(StageName::Threshold));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(PipelineConfig::load("{not json"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            load(json!({"stages": {}, "extra": 1})),
            Err(ConfigError::Parse(_))
        ));
        let err = load(json!({"stages": {"resize": {"enabled": "yes"}}})).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedStage { ref stage, .. } if stage == "resize"));
    }

    #[test]
    fn test_unknown_builtin_profile() {
        assert!(matches!(
            PipelineConfig::load_builtin("ppro-bogus"),
            Err(ConfigError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_load_named_prefers_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ppro-tesseract.json"),
            json!({"stages": {"grayscale": {"enabled": true}}}).to_string(),
        )
        .unwrap();

        let config = PipelineConfig::load_named("ppro-tesseract", Some(dir.path())).unwrap();
        assert_eq!(config.name, "ppro-tesseract");
        assert_eq!(config.enabled_stages().count(), 1);

        let bundled = PipelineConfig::load_named("ppro-easyocr", Some(dir.path())).unwrap();
        assert!(bundled.is_enabled(StageName::Clahe));
    }

    #[test]
    fn test_config_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PipelineConfig>();
    }
}
