use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use glam::{Mat4, Quat, Vec3};
use gsplat_driver::{DriverConfig, FrameDriver};
use gsplat_ply::{AttributeCollection, PropertyKind};
use gsplat_sort::{CpuSortBackend, SortBackend};
use gsplat_sort_wgpu::WgpuSortBackend;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gsplat", about = "Inspect, decode and depth-sort Gaussian splat files")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Print the file header and vertex columns
    Inspect { file: PathBuf },
    /// Decode particles and print channel statistics
    Decode { file: PathBuf },
    /// Load into a frame driver and sort for a camera
    Sort {
        file: PathBuf,
        /// Camera position as x,y,z (render space); framed from bounds when omitted
        #[arg(long, value_parser = parse_vec3)]
        eye: Option<Vec3>,
        /// Look-at point as x,y,z; bounds center when omitted
        #[arg(long, value_parser = parse_vec3)]
        target: Option<Vec3>,
        #[arg(long, value_enum)]
        backend: Option<BackendKind>,
        /// Frames to run
        #[arg(long, default_value = "1")]
        frames: u32,
        /// Degrees the eye orbits the target between frames
        #[arg(long, default_value = "0")]
        orbit: f32,
        /// Sorted indices to print
        #[arg(long, default_value = "10")]
        head: u32,
        /// Vertical field of view in degrees
        #[arg(long, default_value = "60")]
        fov: f32,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
enum BackendKind {
    #[default]
    Cpu,
    Wgpu,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    driver: DriverConfig,
    backend: BackendKind,
}

impl CliConfig {
    fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got {} components", parts.len())),
    }
}

/// Perspective camera looking from `eye` at `target`, far plane past the scene.
fn view_projection(eye: Vec3, target: Vec3, fov_degrees: f32, scene_radius: f32) -> Mat4 {
    let forward = (target - eye).normalize_or_zero();
    let up = if forward.cross(Vec3::Z).length_squared() < 1e-6 {
        Vec3::Y
    } else {
        Vec3::Z
    };
    let far = eye.distance(target) + 2.0 * scene_radius + 1.0;
    let proj = Mat4::perspective_rh(fov_degrees.to_radians(), 1.0, 1.0, far.max(2.0));
    proj * Mat4::look_at_rh(eye, target, up)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = CliConfig::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Info => {
            println!("gsplat v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", gsplat_common::crate_info());
            println!("ply: {}", gsplat_ply::crate_info());
            println!("loader: {}", gsplat_loader::crate_info());
            println!("sort: {}", gsplat_sort::crate_info());
            println!("sort-wgpu: {}", gsplat_sort_wgpu::crate_info());
            println!("driver: {}", gsplat_driver::crate_info());
        }
        Commands::Inspect { file } => {
            let collection = AttributeCollection::load_path(&file)
                .with_context(|| format!("loading {}", file.display()))?;
            let header = collection.header();
            println!("File: {}", file.display());
            println!("Format: {}", header.format.as_str());
            for comment in &header.comments {
                println!("Comment: {comment}");
            }
            for element in &header.elements {
                println!("Element {} ({} records)", element.name, element.count);
                for property in &element.properties {
                    match property.kind {
                        PropertyKind::Scalar(ty) => {
                            println!("  {:<12} {}", property.name, ty.as_str())
                        }
                        PropertyKind::List { count, item } => println!(
                            "  {:<12} list {} {} (skipped)",
                            property.name,
                            count.as_str(),
                            item.as_str()
                        ),
                    }
                }
            }
            println!(
                "Columns: {}, records: {}",
                collection.column_names().count(),
                collection.record_count()
            );
        }
        Commands::Decode { file } => {
            let set = gsplat_loader::load_path(&file)
                .with_context(|| format!("decoding {}", file.display()))?;
            println!("Particles: {}", set.len());
            if let Some((min, max)) = set.bounds() {
                println!("Bounds min: ({:.2}, {:.2}, {:.2})", min.x, min.y, min.z);
                println!("Bounds max: ({:.2}, {:.2}, {:.2})", max.x, max.y, max.z);
                let (lo, hi) = set
                    .position()
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
                        (lo.min(p.w), hi.max(p.w))
                    });
                println!("Opacity: [{lo:.4}, {hi:.4}]");
                let mean_scale = set.scale().iter().map(|s| s.truncate()).sum::<Vec3>()
                    / set.len() as f32;
                println!(
                    "Mean scale: ({:.4}, {:.4}, {:.4})",
                    mean_scale.x, mean_scale.y, mean_scale.z
                );
            }
            println!("Upload streams:");
            for stream in set.upload_streams() {
                println!(
                    "  slot {:>2} {:<9} {} bytes",
                    stream.slot,
                    stream.label,
                    stream.data.len()
                );
            }
        }
        Commands::Sort {
            file,
            eye,
            target,
            backend,
            frames,
            orbit,
            head,
            fov,
        } => {
            let view = SortView {
                eye,
                target,
                frames,
                orbit,
                head,
                fov,
            };
            match backend.unwrap_or(config.backend) {
                BackendKind::Cpu => run_sort(CpuSortBackend::new(), config.driver, &file, &view)?,
                BackendKind::Wgpu => {
                    let backend = WgpuSortBackend::headless()?;
                    run_sort(backend, config.driver, &file, &view)?
                }
            }
        }
    }

    Ok(())
}

struct SortView {
    eye: Option<Vec3>,
    target: Option<Vec3>,
    frames: u32,
    orbit: f32,
    head: u32,
    fov: f32,
}

fn run_sort<B: SortBackend>(
    backend: B,
    config: DriverConfig,
    file: &Path,
    view: &SortView,
) -> anyhow::Result<()> {
    let mut driver = FrameDriver::new(backend, config);
    driver
        .load_path(file)
        .with_context(|| format!("loading {}", file.display()))?;

    let (center, radius) = driver
        .particles()
        .and_then(|p| p.bounds())
        .map(|(min, max)| ((min + max) * 0.5, (max - min).length() * 0.5))
        .unwrap_or((Vec3::ZERO, 0.0));
    let target = view.target.unwrap_or(center);
    let eye = view
        .eye
        .unwrap_or(target + Vec3::Y * (2.0 * radius + 10.0));
    println!(
        "Camera: eye=({:.1}, {:.1}, {:.1}) target=({:.1}, {:.1}, {:.1}) fov={:.0}",
        eye.x, eye.y, eye.z, target.x, target.y, target.z, view.fov
    );

    let mut last = None;
    for frame in 0..view.frames {
        let spin = Quat::from_rotation_z((view.orbit * frame as f32).to_radians());
        let frame_eye = target + spin * (eye - target);
        let view_proj = view_projection(frame_eye, target, view.fov, radius);
        let draw = driver
            .frame(&view_proj)
            .map(|d| (d.side, d.valid_count, d.generation));
        match draw {
            Some((side, valid, generation)) => println!(
                "frame {frame}: side={side:?} valid={valid} generation={generation} sorts={}",
                driver.sort_invocations()
            ),
            None => println!("frame {frame}: nothing to draw"),
        }
        last = draw;
    }

    if let Some((side, valid, _)) = last {
        let pairs = driver.backend().read_back(side, valid.min(view.head))?;
        println!("Back-to-front head: {:?}", pairs.values);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vectors() {
        assert_eq!(parse_vec3("1, 2.5,-3").unwrap(), Vec3::new(1.0, 2.5, -3.0));
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("1,b,3").is_err());
    }

    #[test]
    fn config_from_json() {
        let config: CliConfig =
            serde_json::from_str(r#"{"backend": "wgpu", "driver": {"sort": {"key_mask": 255}}}"#)
                .unwrap();
        assert_eq!(config.backend, BackendKind::Wgpu);
        assert_eq!(config.driver.sort.key_mask, 255);

        let partial: CliConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(partial, CliConfig::default());
    }

    #[test]
    fn config_file_is_optional() {
        assert_eq!(CliConfig::load(None).unwrap(), CliConfig::default());
    }

    #[test]
    fn camera_sees_target() {
        let vp = view_projection(Vec3::new(0.0, 50.0, 0.0), Vec3::ZERO, 60.0, 10.0);
        let clip = vp * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(clip.w > 0.0);
        assert!(clip.z >= 0.0 && clip.z <= clip.w);
    }

    #[test]
    fn cli_parses_sort_flags() {
        let cli = Cli::try_parse_from([
            "gsplat", "sort", "scene.ply", "--eye", "0,10,0", "--backend", "cpu", "--frames", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Sort { eye, frames, backend, .. } => {
                assert_eq!(eye, Some(Vec3::new(0.0, 10.0, 0.0)));
                assert_eq!(frames, 3);
                assert_eq!(backend, Some(BackendKind::Cpu));
            }
            _ => panic!("expected sort"),
        }
    }
}
