/// PCVD binary point cloud format.
///
/// Layout, in order: 64 byte header, field descriptions, packed field names,
/// optional vertex records, user data records, optional kd-tree permutation,
/// optional shader block. All values are little-endian.
mod export;
mod header;
mod import;

pub use export::export_pcvd;
pub use header::{FieldDescription, Header, SectionSizes, ShaderDescription};
pub use import::import_pcvd;

use crate::error::FormatError;
use crate::point_cloud::PointCloud;
use crate::progress::{Completion, ProgressSink};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub type Result<T, E = FormatError> = std::result::Result<T, E>;

/// Large sections are streamed in chunks of this many bytes, reporting
/// progress after each.
pub(crate) const CHUNK_SIZE: usize = 1 << 22;

/// Regions of a PCVD file, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    FieldDescriptions,
    FieldNames,
    Vertices,
    UserData,
    KdTree,
    ShaderDescription,
    ShaderText,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Header => "header",
            Section::FieldDescriptions => "field description",
            Section::FieldNames => "field name",
            Section::Vertices => "vertex",
            Section::UserData => "user data",
            Section::KdTree => "kd-tree",
            Section::ShaderDescription => "shader description",
            Section::ShaderText => "shader text",
        };
        f.write_str(name)
    }
}

/// Optional sections to write. The index is only written when the cloud has
/// one and the shader block only when the shader is not empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub write_vertices: bool,
    pub write_index: bool,
    pub write_shader: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            write_vertices: true,
            write_index: true,
            write_shader: true,
        }
    }
}

/// Import a PCVD file.
///
/// The file length is checked against the sizes the header declares before
/// anything is allocated, so a truncated file fails fast.
pub fn read_pcvd_file(path: &Path, progress: &mut dyn ProgressSink) -> Result<Completion<PointCloud>> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let header = Header::read(&mut reader)?;
    let sizes = header.section_sizes()?;
    let total = sizes.total();
    if file_len < total {
        return Err(FormatError::Truncated {
            section: sizes.section_containing(file_len),
        });
    }
    if file_len > total {
        log::warn!(
            "{} has {} trailing bytes after the last section",
            path.display(),
            file_len - total
        );
    }

    log::info!("Reading {} ({} points)", path.display(), header.number_points);
    import::import_after_header(&mut reader, header, progress)
}

/// Export to `path`.
///
/// The data goes to a `.partial` sibling first which is renamed into place
/// once complete. On cancellation or error it is removed and `path` is left
/// untouched.
pub fn write_pcvd_file(
    path: &Path,
    cloud: &PointCloud,
    options: &ExportOptions,
    progress: &mut dyn ProgressSink,
) -> Result<Completion> {
    let partial = partial_path(path);
    let result = write_partial(&partial, cloud, options, progress);

    match result {
        Ok(Completion::Finished(())) => {
            fs::rename(&partial, path)?;
            log::info!("Wrote {}", path.display());
            Ok(Completion::Finished(()))
        }
        Ok(Completion::Cancelled) => {
            let _ = fs::remove_file(&partial);
            log::info!("Export to {} cancelled", path.display());
            Ok(Completion::Cancelled)
        }
        Err(err) => {
            let _ = fs::remove_file(&partial);
            Err(err)
        }
    }
}

fn write_partial(
    partial: &Path,
    cloud: &PointCloud,
    options: &ExportOptions,
    progress: &mut dyn ProgressSink,
) -> Result<Completion> {
    let mut writer = BufWriter::new(File::create(partial)?);
    let completion = export_pcvd(&mut writer, cloud, options, progress)?;
    writer.flush()?;
    Ok(completion)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
