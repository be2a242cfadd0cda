//! `group.toml` manifest for template directories
//!
//! ```toml
//! [group]
//! name = "users"
//! delimiters = "$$"
//!
//! [templates.row]
//! params = ["user", "separator"]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::parser::Delimiters;
use crate::template::{FormalParam, TemplateError};

pub const MANIFEST_FILE: &str = "group.toml";

/// Group settings and parameter lists for a template directory
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub name: Option<String>,
    pub delimiters: Option<Delimiters>,
    params: HashMap<String, Vec<String>>,
}

/// TOML structure for deserializing manifests
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlManifest {
    group: Option<TomlGroup>,
    #[serde(default)]
    templates: HashMap<String, TomlTemplate>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlGroup {
    name: Option<String>,
    delimiters: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlTemplate {
    params: Vec<String>,
}

impl Manifest {
    /// Load `group.toml` from `dir` if it exists
    pub fn load(dir: &Path) -> Result<Option<Self>, TemplateError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|source| TemplateError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_str(&content, path).map(Some)
    }

    /// Parse manifest text; `path` is only used in error messages
    pub fn from_str(content: &str, path: PathBuf) -> Result<Self, TemplateError> {
        let parsed: TomlManifest =
            toml::from_str(content).map_err(|e| TemplateError::Manifest {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let group = parsed.group.unwrap_or(TomlGroup {
            name: None,
            delimiters: None,
        });
        let delimiters = match group.delimiters {
            Some(pair) => Some(Delimiters::from_pair(&pair).ok_or_else(|| {
                TemplateError::Manifest {
                    path: path.clone(),
                    message: format!("delimiters must be two characters, got {:?}", pair),
                }
            })?),
            None => None,
        };

        Ok(Manifest {
            name: group.name,
            delimiters,
            params: parsed
                .templates
                .into_iter()
                .map(|(name, template)| (name, template.params))
                .collect(),
        })
    }

    /// Declared parameters for a template, if the manifest lists it
    pub fn params(&self, template: &str) -> Option<Vec<FormalParam>> {
        self.params
            .get(template)
            .map(|names| names.iter().map(FormalParam::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Manifest, TemplateError> {
        Manifest::from_str(content, PathBuf::from("group.toml"))
    }

    #[test]
    fn test_full_manifest() {
        let manifest = parse(
            r#"
            [group]
            name = "users"
            delimiters = "$$"

            [templates.row]
            params = ["user", "sep"]
            "#,
        )
        .unwrap();

        assert_eq!(manifest.name.as_deref(), Some("users"));
        assert_eq!(manifest.delimiters, Some(Delimiters::new('$', '$')));
        let params = manifest.params("row").unwrap();
        assert_eq!(params, vec![FormalParam::new("user"), FormalParam::new("sep")]);
        assert!(manifest.params("other").is_none());
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = parse("").unwrap();
        assert!(manifest.name.is_none());
        assert!(manifest.delimiters.is_none());
    }

    #[test]
    fn test_bad_delimiters() {
        let err = parse("[group]\ndelimiters = \"$\"").unwrap_err();
        assert!(matches!(err, TemplateError::Manifest { .. }));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = parse("[group]\ncolour = \"blue\"").unwrap_err();
        assert!(matches!(err, TemplateError::Manifest { .. }));
    }

    #[test]
    fn test_missing_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::load(dir.path()).unwrap().is_none());
    }
}
