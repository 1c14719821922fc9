/// Runtime configuration of the converter.
use anyhow::{Context, Result};
use point_cloud_store::{ExportOptions, LasImportOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Conversion settings, loaded from JSON and overridden by command line flags.
/// Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub build_index: bool,
    pub write_vertices: bool,
    pub apply_coordinate_transform: bool,
    pub recenter: bool,
    /// Shader preset (JSON) embedded into the output.
    pub shader_preset: Option<PathBuf>,
    pub write_manifest: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            build_index: true,
            write_vertices: true,
            apply_coordinate_transform: true,
            recenter: true,
            shader_preset: None,
            write_manifest: true,
        }
    }
}

impl ConverterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn import_options(&self) -> LasImportOptions {
        LasImportOptions {
            apply_coordinate_transform: self.apply_coordinate_transform,
            recenter: self.recenter,
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            write_vertices: self.write_vertices,
            ..ExportOptions::default()
        }
    }
}
