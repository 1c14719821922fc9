/// Command line front-end of the point cloud store.
mod config;
mod converter;
mod inspect;
mod manifest;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::ConverterConfig;
use converter::PointCloudConverter;
use glam::Vec3;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pcvd", version, about = "Convert, index and inspect PCVD point clouds")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Convert a .las/.laz survey into a PCVD file
    Convert {
        input: PathBuf,
        /// Output file (defaults to the input with a .pcvd extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Skip building the kd-tree
        #[arg(long)]
        no_index: bool,
        /// Leave positions out of the file
        #[arg(long)]
        no_vertices: bool,
        /// Keep the survey's Z-up frame
        #[arg(long)]
        keep_frame: bool,
        /// Keep absolute coordinates instead of recentering
        #[arg(long)]
        no_recenter: bool,
        /// Shader preset to embed
        #[arg(long)]
        shader: Option<PathBuf>,
        /// Skip the JSON manifest
        #[arg(long)]
        no_manifest: bool,
    },

    /// Print header, sections and schema
    Info { input: PathBuf },

    /// Print one point's position, colour and user data
    Point { input: PathBuf, index: usize },

    /// Find the point nearest to a location, or to a ray with --direction
    Nearest {
        input: PathBuf,
        #[arg(allow_negative_numbers = true)]
        x: f32,
        #[arg(allow_negative_numbers = true)]
        y: f32,
        #[arg(allow_negative_numbers = true)]
        z: f32,
        /// Ray direction; the location becomes the ray origin
        #[arg(long, num_args = 3, value_names = ["DX", "DY", "DZ"], allow_negative_numbers = true)]
        direction: Option<Vec<f32>>,
        #[arg(short, long, default_value_t = f32::INFINITY)]
        max_distance: f32,
    },

    /// Build the kd-tree and store it in the file
    Index {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Replace an existing index
        #[arg(long)]
        rebuild: bool,
    },

    /// Embed (--import) or extract (--export) a shader preset
    Shader {
        input: PathBuf,
        #[arg(long)]
        import: Option<PathBuf>,
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.cmd {
        Cmd::Convert {
            input,
            output,
            config,
            no_index,
            no_vertices,
            keep_frame,
            no_recenter,
            shader,
            no_manifest,
        } => {
            let mut config = match config {
                Some(path) => ConverterConfig::load(&path)?,
                None => ConverterConfig::default(),
            };
            config.build_index &= !no_index;
            config.write_vertices &= !no_vertices;
            config.apply_coordinate_transform &= !keep_frame;
            config.recenter &= !no_recenter;
            config.write_manifest &= !no_manifest;
            if shader.is_some() {
                config.shader_preset = shader;
            }

            let converter = PointCloudConverter::new(&input, output.as_deref(), config)?;
            converter.convert()?;
        }
        Cmd::Info { input } => inspect::info(&input)?,
        Cmd::Point { input, index } => inspect::point(&input, index)?,
        Cmd::Nearest {
            input,
            x,
            y,
            z,
            direction,
            max_distance,
        } => {
            let direction = direction.map(|d| Vec3::new(d[0], d[1], d[2]));
            inspect::nearest(&input, Vec3::new(x, y, z), direction, max_distance)?;
        }
        Cmd::Index { input, output, rebuild } => inspect::index(&input, output.as_deref(), rebuild)?,
        Cmd::Shader { input, import, export } => inspect::shader(&input, import.as_deref(), export.as_deref())?,
    }

    Ok(())
}
