//! sph-march: ray-march the surface of a synthetic particle scene
//!
//! Usage:
//!   sph-march --out normals.png
//!   sph-march --scene column --frame 3 --anisotropic --settings settings.json --out column.png

use anyhow::{anyhow, bail, Context};
use log::info;
use nalgebra::Vector3;
use sph_surface_rs::core::{FrameCamera, SurfaceBuffers, VisualizationSettings};
use sph_surface_rs::dataset::{scene, ParticleDataset, ParticleSnapshots};
use sph_surface_rs::render::{
    distance_to_image, normals_to_image, rasterize_particle_depth, MarcherConfig, RayMarcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

struct Args {
    scene: String,
    frame: usize,
    frames: usize,
    spacing: f32,
    settings: Option<PathBuf>,
    anisotropic: bool,
    threads: Option<usize>,
    width: u32,
    height: u32,
    out: PathBuf,
    distance_out: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut parsed = Args {
        scene: "sphere".to_string(),
        frame: 0,
        frames: 8,
        spacing: 0.05,
        settings: None,
        anisotropic: false,
        threads: None,
        width: 320,
        height: 240,
        out: PathBuf::from("normals.png"),
        distance_out: None,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| anyhow!("Missing {} argument", name));
        match arg.as_str() {
            "--scene" => parsed.scene = value("--scene")?,
            "--frame" => parsed.frame = value("--frame")?.parse().context("Invalid --frame")?,
            "--frames" => parsed.frames = value("--frames")?.parse().context("Invalid --frames")?,
            "--spacing" => parsed.spacing = value("--spacing")?.parse().context("Invalid --spacing")?,
            "--settings" => parsed.settings = Some(PathBuf::from(value("--settings")?)),
            "--anisotropic" => parsed.anisotropic = true,
            "--threads" => parsed.threads = Some(value("--threads")?.parse().context("Invalid --threads")?),
            "--width" => parsed.width = value("--width")?.parse().context("Invalid --width")?,
            "--height" => parsed.height = value("--height")?.parse().context("Invalid --height")?,
            "--out" => parsed.out = PathBuf::from(value("--out")?),
            "--distance-out" => parsed.distance_out = Some(PathBuf::from(value("--distance-out")?)),
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                print_help();
                bail!("Unknown argument: {}", other);
            }
        }
    }

    if parsed.width == 0 || parsed.height == 0 {
        bail!("--width and --height must be positive");
    }
    if !(parsed.spacing > 0.0) {
        bail!("--spacing must be positive");
    }
    Ok(parsed)
}

fn build_scene(args: &Args) -> anyhow::Result<Vec<Vec<Vector3<f32>>>> {
    match args.scene.as_str() {
        "sphere" => Ok(vec![scene::particle_sphere(Vector3::zeros(), 0.5, args.spacing)]),
        "block" => Ok(vec![scene::particle_block(
            Vector3::new(-0.4, -0.3, -0.4),
            Vector3::new(0.4, 0.3, 0.4),
            args.spacing,
        )]),
        "column" => Ok(scene::collapsing_column(args.frames.max(1), args.spacing, 0.1)),
        other => bail!("Unknown scene '{}' (expected sphere, block or column)", other),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("sph-march v{}", sph_surface_rs::VERSION);

    let args = parse_args()?;

    // Without a settings file the threshold sits at half the lattice number density.
    let mut settings = match &args.settings {
        Some(path) => VisualizationSettings::from_json_file(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => VisualizationSettings::default().with_iso_density(0.5 / args.spacing.powi(3)),
    };
    settings = settings.with_snapshot(args.frame);
    if args.anisotropic {
        settings = settings.with_anisotropy(true);
    }

    // Kernel support of two particle spacings, anisotropy neighborhood of two supports.
    let radius = 2.0 * args.spacing;
    let frames = build_scene(&args)?;
    let started = Instant::now();
    let dataset = Arc::new(ParticleSnapshots::new(frames, radius, 2.0 * radius));
    if args.frame >= dataset.frame_count() {
        bail!("--frame {} out of range ({} frames)", args.frame, dataset.frame_count());
    }
    info!(
        "Indexed {} frames in {:.1} ms ({} particles in frame {})",
        dataset.frame_count(),
        started.elapsed().as_secs_f64() * 1e3,
        dataset.particle_count(args.frame),
        args.frame
    );

    let eye = Vector3::new(1.2, 1.4, -2.0);
    let camera = FrameCamera::look_at(
        eye,
        Vector3::new(0.0, 0.3, 0.0),
        Vector3::y(),
        0.9,
        0.05,
        20.0,
        args.width,
        args.height,
    )
    .ok_or_else(|| anyhow!("Degenerate camera"))?;

    let depth: Arc<[f32]> = rasterize_particle_depth(&camera, dataset.positions(args.frame), radius).into();
    let outputs = Arc::new(SurfaceBuffers::new(args.width, args.height));

    let mut config = MarcherConfig::default();
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    let mut marcher = RayMarcher::new(config)?;
    marcher.prepare(settings, camera, depth, Arc::clone(&dataset), Arc::clone(&outputs))?;

    let started = Instant::now();
    marcher.march()?;
    info!(
        "Marched {}x{} pixels on {} threads in {:.1} ms, {} hits",
        args.width,
        args.height,
        marcher.thread_count(),
        started.elapsed().as_secs_f64() * 1e3,
        outputs.hit_count()
    );

    normals_to_image(&outputs)
        .save(&args.out)
        .with_context(|| format!("Failed to write {:?}", args.out))?;
    info!("Wrote normals to {:?}", args.out);

    if let Some(path) = &args.distance_out {
        distance_to_image(&outputs, &eye)
            .save(path)
            .with_context(|| format!("Failed to write {:?}", path))?;
        info!("Wrote distances to {:?}", path);
    }

    Ok(())
}

fn print_help() {
    println!("sph-march v{}", sph_surface_rs::VERSION);
    println!();
    println!("Usage: sph-march [options]");
    println!();
    println!("Options:");
    println!("  --scene <name>          sphere | block | column (default: sphere)");
    println!("  --frame <n>             Snapshot to march (default: 0)");
    println!("  --frames <n>            Frames generated for the column scene (default: 8)");
    println!("  --spacing <f>           Particle spacing (default: 0.05)");
    println!("  --settings <path>       Visualization settings JSON");
    println!("  --anisotropic           Use the anisotropic kernel");
    println!("  --threads <n>           Worker threads (default: cores - 1)");
    println!("  --width <px>            Frame width (default: 320)");
    println!("  --height <px>           Frame height (default: 240)");
    println!("  --out <path>            Normal map PNG (default: normals.png)");
    println!("  --distance-out <path>   Optional distance PNG");
    println!("  -h, --help              Show this help");
}
