use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backend::{SharedBackend, SoftwareBackend};
use crate::error::Result;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Real GPU when an adapter is available, software otherwise.
    #[default]
    Auto,
    Wgpu,
    Software,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            "software" | "cpu" => Ok(Self::Software),
            other => Err(ConfigError::Invalid(format!(
                "unknown backend '{other}'; expected auto, wgpu or software"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerPreference {
    #[default]
    Low,
    High,
}

/// Engine settings, usually read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub power: PowerPreference,
    /// Show the alternate composite for images that have one.
    #[serde(default)]
    pub alt_image: bool,
    /// Cap on live textures for the software backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_textures: Option<usize>,
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: EngineConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_textures == Some(0) {
            return Err(ConfigError::Invalid(
                "max_textures must be greater than zero".into(),
            ));
        }
        if self.max_textures.is_some() && self.backend == BackendKind::Wgpu {
            return Err(ConfigError::Invalid(
                "max_textures only applies to the software backend".into(),
            ));
        }
        Ok(())
    }
}

/// Builds the texture backend described by `config`.
///
/// `Auto` falls back to the software backend when no GPU device can be
/// created; an explicit `Wgpu` reports the failure instead.
pub fn create_backend(config: &EngineConfig) -> Result<SharedBackend> {
    match config.backend {
        BackendKind::Software => Ok(software_backend(config)),
        BackendKind::Wgpu => wgpu_backend(config),
        BackendKind::Auto => match wgpu_backend(config) {
            Ok(backend) => Ok(backend),
            Err(error) => {
                tracing::warn!(%error, "GPU unavailable; using the software backend");
                Ok(software_backend(config))
            }
        },
    }
}

fn software_backend(config: &EngineConfig) -> SharedBackend {
    match config.max_textures {
        Some(limit) => Rc::new(SoftwareBackend::with_texture_limit(limit)),
        None => Rc::new(SoftwareBackend::new()),
    }
}

#[cfg(feature = "wgpu-backend")]
fn wgpu_backend(config: &EngineConfig) -> Result<SharedBackend> {
    use crate::backend::{GpuPowerPreference, WgpuBackend, WgpuBackendOptions};

    let power_preference = match config.power {
        PowerPreference::Low => GpuPowerPreference::Low,
        PowerPreference::High => GpuPowerPreference::High,
    };
    let backend = WgpuBackend::new(WgpuBackendOptions { power_preference })?;
    tracing::debug!(adapter = backend.adapter_name(), "using wgpu backend");
    Ok(Rc::new(backend))
}

#[cfg(not(feature = "wgpu-backend"))]
fn wgpu_backend(_config: &EngineConfig) -> Result<SharedBackend> {
    Err(crate::error::ImageError::gpu("texlens was built without the wgpu backend"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.backend, BackendKind::Auto);
        assert_eq!(config.power, PowerPreference::Low);
        assert!(!config.alt_image);
    }

    #[test]
    fn parses_every_field() {
        let config = EngineConfig::from_toml_str(
            r#"
backend = "software"
power = "high"
alt_image = true
max_textures = 8
"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Software);
        assert_eq!(config.power, PowerPreference::High);
        assert!(config.alt_image);
        assert_eq!(config.max_textures, Some(8));
    }

    #[test]
    fn rejects_unknown_keys_and_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("colour = 1"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("backend = \"vulkan\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_textures = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("backend = \"wgpu\"\nmax_textures = 4"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("Software".parse::<BackendKind>().unwrap(), BackendKind::Software);
        assert_eq!(" gpu ".parse::<BackendKind>().unwrap(), BackendKind::Wgpu);
        assert!("metal".parse::<BackendKind>().is_err());
    }

    #[test]
    fn software_backend_honours_the_texture_cap() {
        let config = EngineConfig {
            backend: BackendKind::Software,
            max_textures: Some(1),
            ..EngineConfig::default()
        };
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.name(), "software");
        let first = backend.create_texture().unwrap();
        assert!(backend.create_texture().is_err());
        backend.delete_texture(first);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            EngineConfig::load(&dir.path().join("absent.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
