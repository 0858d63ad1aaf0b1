use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Mod identity loaded from `manifest.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ModManifest {
    /// Parse and validate manifest TOML.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(input).context("failed to parse mod manifest TOML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load and validate a manifest from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read mod manifest at {}", path.display()))?;

        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid mod manifest at {}", path.display()))
    }

    /// Check required fields, the id's character set and the semver version.
    pub fn validate(&self) -> Result<()> {
        validate_nonempty("id", &self.id)?;
        validate_nonempty("name", &self.name)?;
        validate_nonempty("version", &self.version)?;

        if self.id.chars().any(|c| c.is_whitespace() || c == '/') {
            bail!("id must not contain whitespace or '/': {:?}", self.id);
        }
        if let Some(author) = &self.author {
            validate_nonempty("author", author)?;
        }

        Version::parse(&self.version)
            .with_context(|| format!("manifest version must be valid semver: {}", self.version))?;

        Ok(())
    }

    /// Parsed semver version. Only fails on a manifest that skipped validation.
    pub fn semver(&self) -> Result<Version> {
        Version::parse(&self.version)
            .with_context(|| format!("manifest version must be valid semver: {}", self.version))
    }

    /// Key prefix for this mod's entries in a shared string dictionary.
    pub fn data_prefix(&self) -> String {
        format!("{}/", self.id)
    }
}

fn validate_nonempty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} must not be empty")
    }
    Ok(())
}
