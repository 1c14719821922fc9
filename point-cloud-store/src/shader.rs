/// Shader metadata carried alongside a point cloud.
use crate::error::PointCloudError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Expressions the viewer evaluates per point, plus the user data
/// properties they read and the editor's node graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shader {
    pub used_properties: HashSet<String>,
    pub coordinate_expression: String,
    pub color_expression: String,
    pub node_data: String,
}

/// On-disk form of a shader preset.
#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct ShaderPreset {
    used_properties: Vec<String>,
    coordinate_expression: String,
    color_expression: String,
    node_data: String,
}

impl Shader {
    /// Used properties sorted by name.
    pub fn ordered_properties(&self) -> Vec<&str> {
        let mut properties: Vec<&str> = self.used_properties.iter().map(String::as_str).collect();
        properties.sort_unstable();
        properties
    }

    pub fn is_empty(&self) -> bool {
        self.used_properties.is_empty()
            && self.coordinate_expression.is_empty()
            && self.color_expression.is_empty()
            && self.node_data.is_empty()
    }

    /// Newline separated, sorted list of used properties as stored in PCVD
    /// files.
    pub fn used_properties_text(&self) -> String {
        self.ordered_properties().join("\n")
    }

    pub fn parse_used_properties(text: &str) -> HashSet<String> {
        text.split('\n')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Save as a JSON preset.
    pub fn export_to_file(&self, path: &Path) -> Result<(), PointCloudError> {
        let preset = ShaderPreset {
            used_properties: self.ordered_properties().into_iter().map(str::to_string).collect(),
            coordinate_expression: self.coordinate_expression.clone(),
            color_expression: self.color_expression.clone(),
            node_data: self.node_data.clone(),
        };
        fs::write(path, serde_json::to_string_pretty(&preset)?)?;
        log::debug!("Saved shader preset {}", path.display());
        Ok(())
    }

    /// Load a JSON preset. Missing keys default to empty.
    pub fn import_from_file(path: &Path) -> Result<Shader, PointCloudError> {
        let preset: ShaderPreset = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(Shader {
            used_properties: preset.used_properties.into_iter().collect(),
            coordinate_expression: preset.coordinate_expression,
            color_expression: preset.color_expression,
            node_data: preset.node_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Shader {
        Shader {
            used_properties: ["intensity", "classification"].into_iter().map(String::from).collect(),
            coordinate_expression: "vec3(x, y, z)".to_string(),
            color_expression: "vec3(intensity / 65535.0)".to_string(),
            node_data: "{}".to_string(),
        }
    }

    #[test]
    fn properties_are_sorted() {
        assert_eq!(sample().ordered_properties(), vec!["classification", "intensity"]);
        assert_eq!(sample().used_properties_text(), "classification\nintensity");
    }

    #[test]
    fn parse_skips_blank_lines() {
        let parsed = Shader::parse_used_properties("a\n\nb\n");
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains("a") && parsed.contains("b"));
        assert!(Shader::parse_used_properties("").is_empty());
    }

    #[test]
    fn preset_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preset.json");
        sample().export_to_file(&path).unwrap();
        assert_eq!(Shader::import_from_file(&path).unwrap(), sample());
    }

    #[test]
    fn preset_missing_keys_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"color_expression": "vec3(1.0)"}"#).unwrap();
        let shader = Shader::import_from_file(&path).unwrap();
        assert_eq!(shader.color_expression, "vec3(1.0)");
        assert!(shader.used_properties.is_empty());
    }
}
