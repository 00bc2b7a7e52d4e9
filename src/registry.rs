//! Static catalogue of pipeline stages, their methods and parameter schemas.
//!
//! Every `(stage, method)` pair is declared here once, together with the
//! parameters it accepts and any precondition it places on the image it
//! receives. Configuration loading validates against these tables; the step
//! modules turn validated [`Params`] into their typed method enums.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Pipeline stage names, declared in canonical execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    NormalizeColors,
    Resize,
    Grayscale,
    Deskew,
    Clahe,
    Sharpen,
    Threshold,
    Denoise,
    Padding,
}

impl StageName {
    /// Fixed execution order. Never reordered by configuration.
    pub const CANONICAL: [StageName; 9] = [
        StageName::NormalizeColors,
        StageName::Resize,
        StageName::Grayscale,
        StageName::Deskew,
        StageName::Clahe,
        StageName::Sharpen,
        StageName::Threshold,
        StageName::Denoise,
        StageName::Padding,
    ];

    /// Parse a stage name as written in profile documents
    pub fn parse(s: &str) -> Option<Self> {
        Self::CANONICAL.into_iter().find(|stage| stage.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NormalizeColors => "normalize_colors",
            Self::Resize => "resize",
            Self::Grayscale => "grayscale",
            Self::Deskew => "deskew",
            Self::Clahe => "clahe",
            Self::Sharpen => "sharpen",
            Self::Threshold => "threshold",
            Self::Denoise => "denoise",
            Self::Padding => "padding",
        }
    }

    /// Position in [`StageName::CANONICAL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    Choice(&'static [&'static str]),
}

impl ParamKind {
    fn describe(&self) -> &'static str {
        match self {
            ParamKind::Int => "an integer",
            ParamKind::Float => "a number",
            ParamKind::Bool => "a boolean",
            ParamKind::Choice(_) => "a string",
        }
    }
}

/// Default for a parameter; `Required` params have none, `Optional` ones may
/// simply be absent from the resolved [`Params`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    Required,
    Optional,
    Int(i64),
    Float(f64),
    Bool(bool),
    Choice(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub min: f64,
    pub max: f64,
    /// Integer must be odd (kernel/block sizes)
    pub odd: bool,
    pub default: ParamDefault,
}

impl ParamSpec {
    const fn int(name: &'static str, min: i64, max: i64, default: ParamDefault) -> Self {
        Self {
            name,
            kind: ParamKind::Int,
            min: min as f64,
            max: max as f64,
            odd: false,
            default,
        }
    }

    const fn odd_int(name: &'static str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name,
            kind: ParamKind::Int,
            min: min as f64,
            max: max as f64,
            odd: true,
            default: ParamDefault::Int(default),
        }
    }

    const fn float(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Float,
            min,
            max,
            odd: false,
            default: ParamDefault::Float(default),
        }
    }

    const fn boolean(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamKind::Bool,
            min: 0.0,
            max: 1.0,
            odd: false,
            default: ParamDefault::Bool(default),
        }
    }

    const fn choice(name: &'static str, options: &'static [&'static str], default: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Choice(options),
            min: 0.0,
            max: 0.0,
            odd: false,
            default: ParamDefault::Choice(default),
        }
    }
}

/// Requirement a method places on its input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    None,
    SingleChannel,
}

impl Precondition {
    pub fn describe(&self) -> &'static str {
        match self {
            Precondition::None => "none",
            Precondition::SingleChannel => "input must be single-channel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodSpec {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    pub precondition: Precondition,
}

const fn method(name: &'static str, params: &'static [ParamSpec]) -> MethodSpec {
    MethodSpec {
        name,
        params,
        precondition: Precondition::None,
    }
}

const fn gray_method(name: &'static str, params: &'static [ParamSpec]) -> MethodSpec {
    MethodSpec {
        name,
        params,
        precondition: Precondition::SingleChannel,
    }
}

const RESIZE_PARAMS: &[ParamSpec] = &[
    ParamSpec::int("min_height", 1, 10_000, ParamDefault::Required),
    ParamSpec::int("min_width", 1, 10_000, ParamDefault::Required),
    ParamSpec::boolean("maintain_aspect", true),
];

const DESKEW_MAX_ANGLE: ParamSpec = ParamSpec::float("max_angle", 0.0, 45.0, 10.0);

const ADAPTIVE_PARAMS: &[ParamSpec] = &[
    ParamSpec::odd_int("block_size", 3, 255, 11),
    ParamSpec::float("c", -64.0, 64.0, 2.0),
];

const CHANNEL_FILL: ParamDefault = ParamDefault::Optional;

// The first method of every stage is its default.
const NORMALIZE_COLORS: &[MethodSpec] = &[
    method("simple_white_balance", &[ParamSpec::float("percentile", 0.0, 49.0, 1.0)]),
    method("gray_world", &[]),
    method(
        "histogram_equalization",
        &[ParamSpec::choice("mode", &["luminance", "per_channel"], "luminance")],
    ),
];

const RESIZE: &[MethodSpec] = &[
    method("cubic", RESIZE_PARAMS),
    method("linear", RESIZE_PARAMS),
    method("nearest", RESIZE_PARAMS),
    method("lanczos", RESIZE_PARAMS),
];

const GRAYSCALE: &[MethodSpec] = &[method("luminance", &[])];

const DESKEW: &[MethodSpec] = &[
    method(
        "projection_profile",
        &[DESKEW_MAX_ANGLE, ParamSpec::float("step", 0.05, 5.0, 0.5)],
    ),
    method("hough", &[DESKEW_MAX_ANGLE]),
    method("min_area_rect", &[DESKEW_MAX_ANGLE]),
];

const CLAHE: &[MethodSpec] = &[gray_method(
    "clahe",
    &[
        ParamSpec::float("clip_limit", 0.1, 40.0, 2.0),
        ParamSpec::int("tile_grid_size", 1, 64, ParamDefault::Int(8)),
    ],
)];

const SHARPEN: &[MethodSpec] = &[
    method(
        "unsharp_mask",
        &[
            ParamSpec::float("strength", 0.0, 5.0, 1.0),
            ParamSpec::float("sigma", 0.1, 10.0, 1.0),
        ],
    ),
    method("laplacian", &[ParamSpec::float("strength", 0.0, 3.0, 1.0)]),
    method("kernel", &[]),
];

const THRESHOLD: &[MethodSpec] = &[
    gray_method("otsu", &[]),
    gray_method("adaptive_gaussian", ADAPTIVE_PARAMS),
    gray_method("adaptive_mean", ADAPTIVE_PARAMS),
    gray_method("binary", &[ParamSpec::int("threshold", 0, 255, ParamDefault::Int(127))]),
    gray_method(
        "sauvola",
        &[
            ParamSpec::odd_int("window_size", 3, 255, 15),
            ParamSpec::float("k", 0.0, 1.0, 0.2),
        ],
    ),
];

const DENOISE: &[MethodSpec] = &[
    method(
        "bilateral",
        &[
            ParamSpec::int("diameter", 1, 15, ParamDefault::Int(5)),
            ParamSpec::float("sigma_color", 1.0, 200.0, 50.0),
            ParamSpec::float("sigma_space", 1.0, 200.0, 50.0),
        ],
    ),
    method("gaussian", &[ParamSpec::float("sigma", 0.1, 10.0, 1.0)]),
    method("median", &[ParamSpec::int("radius", 1, 10, ParamDefault::Int(1))]),
    gray_method(
        "morphological",
        &[
            ParamSpec::choice("operation", &["open", "close"], "open"),
            ParamSpec::int("radius", 1, 10, ParamDefault::Int(1)),
        ],
    ),
    gray_method(
        "non_local_means",
        &[
            ParamSpec::float("h", 1.0, 100.0, 10.0),
            ParamSpec::odd_int("template_window", 3, 11, 7),
            ParamSpec::odd_int("search_window", 5, 35, 21),
        ],
    ),
];

const PADDING: &[MethodSpec] = &[method(
    "constant",
    &[
        ParamSpec::int("size", 0, 1000, ParamDefault::Int(10)),
        ParamSpec::int("value", 0, 255, ParamDefault::Int(255)),
        ParamSpec::int("red", 0, 255, CHANNEL_FILL),
        ParamSpec::int("green", 0, 255, CHANNEL_FILL),
        ParamSpec::int("blue", 0, 255, CHANNEL_FILL),
    ],
)];

/// All methods registered for a stage; the first one is the default.
pub fn methods(stage: StageName) -> &'static [MethodSpec] {
    match stage {
        StageName::NormalizeColors => NORMALIZE_COLORS,
        StageName::Resize => RESIZE,
        StageName::Grayscale => GRAYSCALE,
        StageName::Deskew => DESKEW,
        StageName::Clahe => CLAHE,
        StageName::Sharpen => SHARPEN,
        StageName::Threshold => THRESHOLD,
        StageName::Denoise => DENOISE,
        StageName::Padding => PADDING,
    }
}

/// Method names registered for a stage.
pub fn methods_for(stage: StageName) -> Vec<&'static str> {
    methods(stage).iter().map(|m| m.name).collect()
}

pub fn default_method(stage: StageName) -> &'static MethodSpec {
    // Every table above is non-empty.
    &methods(stage)[0]
}

pub fn method_spec(stage: StageName, method: &str) -> Option<&'static MethodSpec> {
    methods(stage).iter().find(|m| m.name == method)
}

/// Parameter schema of a `(stage, method)` pair, keyed by parameter name.
pub fn schema_for(stage: StageName, method: &str) -> Option<BTreeMap<&'static str, ParamSpec>> {
    method_spec(stage, method).map(|m| m.params.iter().map(|p| (p.name, *p)).collect())
}

/// A validated parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// Validated parameters of one stage with defaults filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Params {
    #[serde(skip)]
    stage: StageName,
    #[serde(skip)]
    method: String,
    #[serde(flatten)]
    values: BTreeMap<String, ParamValue>,
}

impl Params {
    /// Empty parameter set for a stage left out of a profile document
    pub(crate) fn unset(stage: StageName, method: &str) -> Self {
        Self {
            stage,
            method: method.to_string(),
            values: BTreeMap::new(),
        }
    }

    fn missing(&self, name: &str) -> ValidationError {
        ValidationError::MissingParameter {
            stage: self.stage,
            method: self.method.clone(),
            param: name.to_string(),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, ValidationError> {
        self.opt_int(name).ok_or_else(|| self.missing(name))
    }

    pub fn opt_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, ValidationError> {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            _ => Err(self.missing(name)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, ValidationError> {
        match self.values.get(name) {
            Some(ParamValue::Bool(v)) => Ok(*v),
            _ => Err(self.missing(name)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, ValidationError> {
        match self.values.get(name) {
            Some(ParamValue::Text(v)) => Ok(v),
            _ => Err(self.missing(name)),
        }
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

fn check_range(stage: StageName, spec: &ParamSpec, value: f64) -> Result<(), ValidationError> {
    if value < spec.min || value > spec.max || value.is_nan() {
        return Err(ValidationError::OutOfRange {
            stage,
            param: spec.name.to_string(),
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(())
}

fn convert(stage: StageName, spec: &ParamSpec, raw: &Value) -> Result<ParamValue, ValidationError> {
    let wrong_type = || ValidationError::WrongType {
        stage,
        param: spec.name.to_string(),
        expected: spec.kind.describe(),
        found: describe_value(raw),
    };

    match spec.kind {
        ParamKind::Int => {
            let value = raw.as_i64().ok_or_else(wrong_type)?;
            check_range(stage, spec, value as f64)?;
            if spec.odd && value % 2 == 0 {
                return Err(ValidationError::NotOdd {
                    stage,
                    param: spec.name.to_string(),
                    value,
                });
            }
            Ok(ParamValue::Int(value))
        }
        ParamKind::Float => {
            let value = raw.as_f64().ok_or_else(wrong_type)?;
            check_range(stage, spec, value)?;
            Ok(ParamValue::Float(value))
        }
        ParamKind::Bool => raw.as_bool().map(ParamValue::Bool).ok_or_else(wrong_type),
        ParamKind::Choice(options) => {
            let value = raw.as_str().ok_or_else(wrong_type)?;
            if !options.contains(&value) {
                return Err(ValidationError::InvalidChoice {
                    stage,
                    param: spec.name.to_string(),
                    allowed: options,
                    found: value.to_string(),
                });
            }
            Ok(ParamValue::Text(value.to_string()))
        }
    }
}

/// Validate one stage activation against the registry.
///
/// Returns the resolved parameter set (declared defaults filled in). Fails on
/// an unknown method, unknown or missing parameter, wrong type, odd/even or
/// range violation. Cross-stage preconditions are checked separately by
/// [`validate_preconditions`].
pub fn validate(
    stage: StageName,
    method: &str,
    raw: &Map<String, Value>,
) -> Result<Params, ValidationError> {
    let spec = method_spec(stage, method).ok_or_else(|| ValidationError::UnknownMethod {
        stage,
        method: method.to_string(),
        expected: methods_for(stage).join(", "),
    })?;

    if let Some(unknown) = raw.keys().find(|key| !spec.params.iter().any(|p| p.name == key.as_str())) {
        return Err(ValidationError::UnknownParameter {
            stage,
            method: method.to_string(),
            param: unknown.clone(),
        });
    }

    let mut values = BTreeMap::new();
    for param in spec.params {
        let value = match (raw.get(param.name), param.default) {
            (Some(raw_value), _) => Some(convert(stage, param, raw_value)?),
            (None, ParamDefault::Required) => {
                return Err(ValidationError::MissingParameter {
                    stage,
                    method: method.to_string(),
                    param: param.name.to_string(),
                })
            }
            (None, ParamDefault::Optional) => None,
            (None, ParamDefault::Int(v)) => Some(ParamValue::Int(v)),
            (None, ParamDefault::Float(v)) => Some(ParamValue::Float(v)),
            (None, ParamDefault::Bool(v)) => Some(ParamValue::Bool(v)),
            (None, ParamDefault::Choice(v)) => Some(ParamValue::Text(v.to_string())),
        };
        if let Some(value) = value {
            values.insert(param.name.to_string(), value);
        }
    }

    Ok(Params {
        stage,
        method: method.to_string(),
        values,
    })
}

/// Reject stage combinations whose declared preconditions can never hold:
/// a method requiring single-channel input while `grayscale` is disabled.
///
/// `activations` yields `(stage, method, enabled)` for every stage.
pub fn validate_preconditions<'a, I>(activations: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = (StageName, &'a str, bool)>,
{
    let activations: Vec<_> = activations.into_iter().collect();
    let grayscale_enabled = activations
        .iter()
        .any(|(stage, _, enabled)| *stage == StageName::Grayscale && *enabled);

    for (stage, method, enabled) in activations.iter().copied() {
        if !enabled {
            continue;
        }
        let precondition = method_spec(stage, method).map(|m| m.precondition);
        if precondition == Some(Precondition::SingleChannel) && !grayscale_enabled {
            return Err(ValidationError::Precondition {
                stage,
                method: method.to_string(),
                requires: StageName::Grayscale,
                reason: Precondition::SingleChannel.describe(),
            });
        }
    }
    Ok(())
}
