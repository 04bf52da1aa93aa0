use std::path::PathBuf;
use std::process;

use clap::Parser;
use vivo::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "vivo-player", version)]
#[command(about = "Runs a rhai sketch and reloads it whenever it is saved")]
struct Cli {
    /// The sketch to run.
    script: PathBuf,

    /// Extra directories searched by `include`. May be repeated.
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// YAML settings file; flags override its values.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[arg(long = "width")]
    width: Option<u32>,

    #[arg(long = "height")]
    height: Option<u32>,

    #[arg(long = "fps")]
    fps: Option<f32>,

    /// Frames between checks for changed files.
    #[arg(long = "watch-interval")]
    watch_interval: Option<u32>,

    /// Echo loader and error details to the console.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Skip the per-user library directory.
    #[arg(long = "no-default-path")]
    no_default_path: bool,
}

impl Cli {
    fn config(&self) -> RuntimeConfig {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path).unwrap_or_else(|err| {
                eprintln!("{}", err);
                process::exit(1);
            }),
            None => RuntimeConfig::default(),
        };

        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if let Some(interval) = self.watch_interval {
            config.watch_interval = interval;
        }
        config.verbose |= self.verbose;
        config.load_paths.extend(self.include.iter().cloned());
        if self.no_default_path {
            config.default_load_path = false;
        }
        config
    }
}

fn main() {
    init_logger();

    let cli = Cli::parse();
    let config = cli.config();
    info!("{:?}", config);

    let console = Console::new();
    let engine = RhaiEngine::new(console.clone());
    let mut interpreter = Interpreter::new(engine, console, &config);

    interpreter
        .initialize(config.load_path())
        .unwrap_or_else(|err| err.exit());
    interpreter
        .load_script(&cli.script)
        .unwrap_or_else(|err| err.exit());

    if let Err(err) = vivo::run(config, interpreter) {
        eprintln!("vivo runtime failed: {}", err);
        process::exit(1);
    }
}
