/// LAS/LAZ to PCVD conversion pipeline.
use crate::config::ConverterConfig;
use crate::manifest::{CloudManifest, manifest_path};
use crate::progress::BarProgress;
use anyhow::{Context, Result, bail};
use point_cloud_store::{Completion, LasCloud, Shader, import_las, write_pcvd_file};
use std::path::{Path, PathBuf};

/// Converts one survey file into a PCVD file with an optional manifest.
pub struct PointCloudConverter {
    /// Source .las/.laz file.
    input_path: PathBuf,
    /// Destination .pcvd file.
    output_path: PathBuf,
    config: ConverterConfig,
}

impl PointCloudConverter {
    /// Output defaults to the input path with a `.pcvd` extension.
    pub fn new(input_path: &Path, output_path: Option<&Path>, config: ConverterConfig) -> Result<Self> {
        if !input_path.exists() {
            bail!("Input file does not exist: {}", input_path.display());
        }
        let output_path = output_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| input_path.with_extension("pcvd"));

        Ok(Self {
            input_path: input_path.to_path_buf(),
            output_path,
            config,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Import, index, embed the shader preset, write and describe.
    pub fn convert(&self) -> Result<()> {
        println!(
            "Converting {} to {}...",
            self.input_path.display(),
            self.output_path.display()
        );

        let mut progress = BarProgress::new("points", "Loading points");
        let imported = import_las(&self.input_path, &self.config.import_options(), &mut progress)
            .with_context(|| format!("importing {}", self.input_path.display()))?;
        let Completion::Finished(LasCloud {
            mut cloud,
            origin,
            has_colour,
        }) = imported
        else {
            bail!("import cancelled");
        };
        progress.finish("Points loaded");

        if has_colour {
            println!("Colour data detected");
        } else {
            println!("No colour data found");
        }
        println!("Bounds: {}", cloud.aabb);

        if let Some(preset) = &self.config.shader_preset {
            cloud.shader = Shader::import_from_file(preset)
                .with_context(|| format!("loading shader preset {}", preset.display()))?;
            println!("Embedded shader preset {}", preset.display());
        }

        if self.config.build_index && cloud.can_build_index() {
            let mut progress = BarProgress::new("points", "Building kd-tree");
            if cloud.build_index(&mut progress).is_cancelled() {
                bail!("index construction cancelled");
            }
            progress.finish("Index built");
            let index = cloud.kdtree_index();
            println!(
                "Index: {} nodes, {} leaves, depth {}",
                index.nodes().len(),
                index.leaves().count(),
                index.depth()
            );
        }

        let mut progress = BarProgress::new("bytes", "Writing PCVD");
        let written = write_pcvd_file(&self.output_path, &cloud, &self.config.export_options(), &mut progress)
            .with_context(|| format!("writing {}", self.output_path.display()))?;
        if written.is_cancelled() {
            bail!("export cancelled");
        }
        progress.finish("Written");

        if self.config.write_manifest {
            let manifest = CloudManifest::describe(&self.input_path, &self.output_path, &cloud, origin, has_colour);
            manifest.write(&manifest_path(&self.output_path))?;
        }

        println!("Conversion complete!");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_defaults_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.laz");
        std::fs::write(&input, b"").unwrap();

        let converter = PointCloudConverter::new(&input, None, ConverterConfig::default()).unwrap();
        assert_eq!(converter.output_path(), dir.path().join("scan.pcvd"));
    }

    #[test]
    fn missing_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = PointCloudConverter::new(&dir.path().join("absent.las"), None, ConverterConfig::default());
        assert!(result.is_err());
    }
}
