use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use clap::{Args, Parser, Subcommand};
use pulsefield_core::{
    AnalyserSource, AppConfig, FrameOutcome, Raster, RenderScheduler, SourceKind, ThemePreset,
    VisualizerKind,
};
use tracing_subscriber::EnvFilter;

fn main() -> pulsefield_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(&args),
        Commands::Modes => {
            for kind in VisualizerKind::ALL {
                println!("{kind}");
            }
            Ok(())
        }
    }
}

fn run(args: &RunArgs) -> pulsefield_core::Result<()> {
    let config = load_config(args)?;
    let options = config.render;
    tracing::info!(
        mode = %args.mode,
        frames = args.frames,
        fps = args.fps,
        width = config.canvas.width,
        height = config.canvas.height,
        gain = options.gain,
        performance = options.performance_mode,
        "starting render loop"
    );

    let mut raster = Raster::new(
        config.canvas.width,
        config.canvas.height,
        config.canvas.device_pixel_ratio,
    )?;
    let mut source = AnalyserSource::new(&config.audio);
    let request = source.begin_request();
    source.complete_request(request, Ok(SourceKind::Demo))?;

    let mut kind = VisualizerKind::from_name(&args.mode);
    let mut scheduler = RenderScheduler::new(raster.size());
    scheduler.set_visualizer(Box::new(kind.build(&config.field)));
    scheduler.start();

    let frame_time = Duration::from_secs_f64(1.0 / f64::from(args.fps));
    let cycle_every = args.cycle_every.filter(|&every| every > 0);
    let mut luminance = 0.0f64;
    let mut last = Instant::now();

    for frame in 0..args.frames {
        if let Some(every) = cycle_every {
            if frame > 0 && frame % every == 0 {
                kind = kind.next();
                tracing::info!(frame, visualizer = %kind, "cycling visualizer");
                scheduler.set_visualizer(Box::new(kind.build(&config.field)));
            }
        }

        let now = Instant::now();
        let delta = if frame == 0 {
            frame_time.as_secs_f32()
        } else {
            now.duration_since(last).as_secs_f32()
        };
        last = now;

        source.advance(delta);
        if scheduler.tick(&mut raster, &mut source, &options, delta) == FrameOutcome::Fallback {
            tracing::debug!(frame, "fallback frame");
        }
        luminance += f64::from(raster.mean_luminance());

        let spent = now.elapsed();
        if spent < frame_time {
            thread::sleep(frame_time - spent);
        }
    }
    scheduler.stop();

    let stats = scheduler.stats();
    let mean_luminance = if args.frames > 0 {
        luminance / args.frames as f64
    } else {
        0.0
    };
    tracing::info!(
        frames = stats.total(),
        idle = stats.idle,
        active = stats.active,
        transition = stats.transition,
        fallback = stats.fallback,
        seconds = scheduler.clock().time_seconds,
        mean_luminance,
        "render loop finished"
    );
    Ok(())
}

fn load_config(args: &RunArgs) -> pulsefield_core::Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(width) = args.width {
        config.canvas.width = width;
    }
    if let Some(height) = args.height {
        config.canvas.height = height;
    }
    if let Some(seed) = args.seed {
        config.field.seed = Some(seed);
    }
    if let Some(gain) = args.gain {
        config.render = config.render.with_gain(gain);
    }
    if let Some(theme) = &args.theme {
        config.render = config.render.with_theme(ThemePreset::from_name(theme));
    }
    if args.performance {
        config.render = config.render.with_performance_mode(true);
    }
    Ok(config)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless audio-reactive renderer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the demo tone through the frame scheduler.
    Run(RunArgs),
    /// List the available visualizers.
    Modes,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON configuration file; command line flags take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Visualizer to start with. Unknown names fall back to particles.
    #[arg(short, long, default_value = "particles")]
    mode: String,
    /// Number of frames to render.
    #[arg(long, default_value_t = 600)]
    frames: u64,
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=240))]
    fps: u32,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Sensitivity, clamped to [0.1, 3].
    #[arg(long)]
    gain: Option<f32>,
    /// Theme preset: default, neon or monochrome.
    #[arg(long)]
    theme: Option<String>,
    /// Skip connective edges.
    #[arg(long)]
    performance: bool,
    /// Switch to the next visualizer every N frames.
    #[arg(long)]
    cycle_every: Option<u64>,
    /// Seed for reproducible particle layouts.
    #[arg(long)]
    seed: Option<u64>,
}
