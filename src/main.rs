//! Benchmark driver: ticks a cortex pair under a fixed stimulus and saves the result.
//!
//! Examples:
//!   cortex2d
//!   cortex2d --width 256 --height 128 --ticks 2000 --parallel
//!   cortex2d --config cortex.json --out out/test.c2d
//!
//! `--config` takes a JSON `CortexConfig`; missing fields keep their defaults.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use cortex2d::observer::CortexAdapter;
use cortex2d::prelude::*;
use tracing::{debug, info};

struct Args {
    width: CortexSize,
    height: CortexSize,
    radius: Option<NhRadius>,
    ticks: TicksCount,
    input_width: CortexSize,
    report_every: TicksCount,
    seed: Option<u64>,
    config: Option<PathBuf>,
    out: PathBuf,
    parallel: bool,
    show: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            width: 512,
            height: 256,
            radius: None,
            ticks: 10_000,
            input_width: 32,
            report_every: 100,
            seed: None,
            config: None,
            out: PathBuf::from("out/test.c2d"),
            parallel: false,
            show: false,
        }
    }
}

fn usage() -> ! {
    eprintln!("cortex2d: tick a cortex under a fixed stimulus and save it");
    eprintln!("Usage: cortex2d [options]\n");
    eprintln!("Options:");
    eprintln!("  --width <n>          Cortex width (default 512)");
    eprintln!("  --height <n>         Cortex height (default 256)");
    eprintln!("  --radius <n>         Neighborhood radius, 0-3 (default from config)");
    eprintln!("  --ticks <n>          Ticks to run (default 10000)");
    eprintln!("  --input-width <n>    Width of the input strip (default 32)");
    eprintln!("  --report-every <n>   Ticks between progress reports (default 100)");
    eprintln!("  --seed <n>           Plasticity seed");
    eprintln!("  --config <path>      JSON cortex config");
    eprintln!("  --out <path>         Cortex image path (default out/test.c2d)");
    eprintln!("  --parallel           Tick rows on the rayon pool");
    eprintln!("  --show               Print an ASCII view of the final cortex");
    process::exit(1);
}

fn parse_num<T: std::str::FromStr>(flag: &str, value: Option<String>) -> T {
    match value.as_deref().map(str::parse) {
        Some(Ok(v)) => v,
        _ => {
            eprintln!("invalid or missing value for {flag}");
            usage();
        }
    }
}

fn parse_path(value: Option<String>) -> PathBuf {
    value.map(PathBuf::from).unwrap_or_else(|| usage())
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);

    while let Some(flag) = it.next() {
        match flag.as_str() {
            "--width" => args.width = parse_num(&flag, it.next()),
            "--height" => args.height = parse_num(&flag, it.next()),
            "--radius" => args.radius = Some(parse_num(&flag, it.next())),
            "--ticks" => args.ticks = parse_num(&flag, it.next()),
            "--input-width" => args.input_width = parse_num(&flag, it.next()),
            "--report-every" => args.report_every = parse_num(&flag, it.next()),
            "--seed" => args.seed = Some(parse_num(&flag, it.next())),
            "--config" => args.config = Some(parse_path(it.next())),
            "--out" => args.out = parse_path(it.next()),
            "--parallel" => args.parallel = true,
            "--show" => args.show = true,
            "-h" | "--help" => usage(),
            other => {
                eprintln!("unknown option: {other}");
                usage();
            }
        }
    }

    args
}

fn load_config(args: &Args) -> Result<CortexConfig, Box<dyn std::error::Error>> {
    let mut cfg = match &args.config {
        Some(path) => {
            let reader = BufReader::new(File::open(path)?);
            let cfg: CortexConfig = serde_json::from_reader(reader)?;
            info!("Loaded config from {:?}", path);
            cfg
        }
        None => CortexConfig {
            evol_step: 0x01,
            pulse_mapping: PulseMapping::RoundedProportional,
            ..CortexConfig::default()
        },
    };

    if let Some(radius) = args.radius {
        let touch = cfg.max_syn_count as f32 / cfg.nh_slots().max(1) as f32;
        cfg.nh_radius = radius;
        cfg = cfg.with_max_touch(touch.min(1.0));
    }
    if let Some(seed) = args.seed {
        cfg = cfg.with_seed(seed);
    }

    cfg.validate()?;
    Ok(cfg)
}

fn save_image(cortex: &Cortex, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    cortex.save_image_to(&mut w)?;
    debug!("Saved cortex image to {:?}", path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = parse_args();
    let cfg = load_config(&args)?;

    let mut cortex = Cortex::with_config(args.width, args.height, cfg)?;
    if args.parallel {
        cortex.set_execution_tier(ExecutionTier::Parallel);
    }
    info!(
        "Cortex ready (tier {:?})\n{}",
        cortex.effective_execution_tier(),
        cortex
    );

    // Input strip centered on the top rows.
    let input_width = args.input_width.min(args.width);
    let x0 = args.width / 2 - input_width / 2;
    let mut input = Input2d::new(
        x0,
        0,
        x0 + input_width,
        args.height.min(1),
        DEFAULT_EXC_VALUE * 2,
        PulseMapping::FlooredProportional,
    )?;
    input.set_values(cortex.config().sample_window - 1);

    let mut pair = CortexPair::new(cortex);
    let start = Instant::now();

    for i in 0..args.ticks {
        pair.step(Some(&input));

        if args.report_every > 0 && i % args.report_every == 0 {
            let elapsed = start.elapsed();
            let tps = f64::from(i + 1) / elapsed.as_secs_f64().max(f64::EPSILON);
            let diag = pair.current().diagnostics();
            info!(
                "Performed {} ticks in {}ms; {:.2} ticks per second; {} synapses, {} firing",
                i + 1,
                elapsed.as_millis(),
                tps,
                diag.synapse_count,
                diag.firing_count
            );
        }
    }

    info!(
        "Completed {} ticks in {}ms",
        args.ticks,
        start.elapsed().as_millis()
    );

    let cortex = pair.into_current();
    save_image(&cortex, &args.out)?;
    info!(
        "Wrote {} bytes to {:?}",
        cortex.image_size_bytes()?,
        args.out
    );

    if args.show {
        print!("{}", CortexAdapter::new(&cortex).snapshot().render_ascii());
    }

    Ok(())
}
