//! Tracer configuration
//!
//! Which value categories are never recorded, and which source origins get
//! full line-level extraction.
//!
//! ```toml
//! skip = ["type", "builtin", "module", "callable"]
//!
//! [origins]
//! interactive = ['^<ipython', '/ipykernel_\d+/\d+\.py$']
//! files = ["/home/student/helpers.py"]
//! ```

use anyhow::{Context, Result};
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::error::ConfigError;
use crate::value::ValueCategory;

/// Interactive-surface patterns used when none are configured: IPython cell
/// pseudo-files and ipykernel 6 temporary cell files
pub const DEFAULT_INTERACTIVE_PATTERNS: [&str; 2] =
    [r"^<ipython", r"/ipykernel_\d+/\d+\.py$"];

/// Value categories that are never recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipSet(BTreeSet<ValueCategory>);

impl SkipSet {
    pub fn new(categories: impl IntoIterator<Item = ValueCategory>) -> Self {
        Self(categories.into_iter().collect())
    }

    /// Record every category
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    #[inline]
    pub fn contains(&self, category: ValueCategory) -> bool {
        self.0.contains(&category)
    }

    pub fn insert(&mut self, category: ValueCategory) -> bool {
        self.0.insert(category)
    }

    pub fn remove(&mut self, category: ValueCategory) -> bool {
        self.0.remove(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = ValueCategory> + '_ {
        self.0.iter().copied()
    }
}

impl Default for SkipSet {
    fn default() -> Self {
        Self::new(ValueCategory::NON_DATA)
    }
}

/// Serialized form of [`TraceOrigins`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOriginsSpec {
    /// Regexes matched against an origin to detect the interactive surface
    pub interactive: Vec<String>,
    /// Exact origins (absolute file paths) traced in addition
    pub files: Vec<String>,
}

impl Default for TraceOriginsSpec {
    fn default() -> Self {
        Self {
            interactive: DEFAULT_INTERACTIVE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            files: Vec::new(),
        }
    }
}

/// Source locations inside which line-level extraction is performed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TraceOriginsSpec", into = "TraceOriginsSpec")]
pub struct TraceOrigins {
    spec: TraceOriginsSpec,
    interactive: RegexSet,
    files: HashSet<String>,
}

impl TraceOrigins {
    pub fn from_spec(spec: TraceOriginsSpec) -> Result<Self, ConfigError> {
        for pattern in &spec.interactive {
            regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        if spec.files.iter().any(|f| f.is_empty()) {
            return Err(ConfigError::EmptyPath);
        }

        let interactive =
            RegexSet::new(&spec.interactive).map_err(|source| ConfigError::InvalidPattern {
                pattern: spec.interactive.join("|"),
                source,
            })?;
        let files = spec.files.iter().cloned().collect();
        Ok(Self {
            spec,
            interactive,
            files,
        })
    }

    /// Default interactive surface plus the given files
    pub fn with_files<I, S>(files: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = TraceOriginsSpec::default();
        spec.files.extend(files.into_iter().map(Into::into));
        Self::from_spec(spec)
    }

    /// Whether `origin` gets full line-level extraction
    #[inline]
    pub fn contains(&self, origin: &str) -> bool {
        self.files.contains(origin) || self.interactive.is_match(origin)
    }

    pub fn spec(&self) -> &TraceOriginsSpec {
        &self.spec
    }
}

impl Default for TraceOrigins {
    fn default() -> Self {
        let spec = TraceOriginsSpec::default();
        let interactive = RegexSet::new(&spec.interactive)
            .unwrap_or_else(|_| RegexSet::empty());
        Self {
            spec,
            interactive,
            files: HashSet::new(),
        }
    }
}

impl TryFrom<TraceOriginsSpec> for TraceOrigins {
    type Error = ConfigError;

    fn try_from(spec: TraceOriginsSpec) -> Result<Self, Self::Error> {
        Self::from_spec(spec)
    }
}

impl From<TraceOrigins> for TraceOriginsSpec {
    fn from(origins: TraceOrigins) -> Self {
        origins.spec
    }
}

impl PartialEq for TraceOrigins {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

/// Configuration for a tracer
///
/// # Example
/// ```
/// use huella::config::TracerConfig;
/// use huella::value::ValueCategory;
///
/// let config = TracerConfig::default();
/// assert!(config.skip.contains(ValueCategory::Module));
/// assert!(config.origins.contains("<ipython-input-3-abc>"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    pub skip: SkipSet,
    pub origins: TraceOrigins,
}

impl TracerConfig {
    pub fn new(skip: SkipSet, origins: TraceOrigins) -> Self {
        Self { skip, origins }
    }

    pub fn with_skip(mut self, skip: SkipSet) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_origins(mut self, origins: TraceOrigins) -> Self {
        self.origins = origins;
        self
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tracer config {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("Invalid tracer config {}", path.display()))?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        TraceOrigins::from_spec(self.origins.spec().clone()).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_skip_set_is_non_data() {
        let skip = SkipSet::default();
        for category in ValueCategory::NON_DATA {
            assert!(skip.contains(category));
        }
        assert!(!skip.contains(ValueCategory::Array));
        assert!(!SkipSet::empty().contains(ValueCategory::Module));
    }

    #[test]
    fn test_default_origins_match_interactive_cells() {
        let origins = TraceOrigins::default();
        assert!(origins.contains("<ipython-input-7-0a1b2c>"));
        assert!(origins.contains("/var/8k/ipykernel_495995/29304985.py"));
        assert!(!origins.contains("/usr/lib/python3/site-packages/numpy/core.py"));
    }

    #[test]
    fn test_file_allow_list() {
        let origins = TraceOrigins::with_files(["/path/to/tracked/file.py"]).unwrap();
        assert!(origins.contains("/path/to/tracked/file.py"));
        assert!(!origins.contains("/path/to/tracked/other.py"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let spec = TraceOriginsSpec {
            interactive: vec!["(unclosed".into()],
            files: vec![],
        };
        assert!(matches!(
            TraceOrigins::from_spec(spec),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(matches!(
            TraceOrigins::with_files([""]),
            Err(ConfigError::EmptyPath)
        ));
    }

    #[test]
    fn test_parse_toml() {
        let config = TracerConfig::from_toml_str(
            r#"
            skip = ["module"]

            [origins]
            interactive = ['^<cell']
            files = ["/srv/grader/lib.py"]
            "#,
        )
        .unwrap();
        assert!(config.skip.contains(ValueCategory::Module));
        assert!(!config.skip.contains(ValueCategory::Type));
        assert!(config.origins.contains("<cell 4>"));
        assert!(config.origins.contains("/srv/grader/lib.py"));
        assert!(!config.origins.contains("<ipython-input-1>"));
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = TracerConfig::from_toml_str("").unwrap();
        assert_eq!(config, TracerConfig::default());
    }

    #[test]
    fn test_bad_toml_pattern_is_parse_error() {
        let err = TracerConfig::from_toml_str("[origins]\ninteractive = ['[']").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[origins]\nfiles = [\"/tmp/helpers.py\"]").unwrap();
        let config = TracerConfig::from_file(file.path()).unwrap();
        assert!(config.origins.contains("/tmp/helpers.py"));
        assert!(config.origins.contains("<ipython-input-2>"));
    }

    #[test]
    fn test_from_missing_file_has_context() {
        let err = TracerConfig::from_file("/nonexistent/huella.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read tracer config"));
    }
}
