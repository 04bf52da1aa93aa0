use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;
use termcolor::{Color, ColorSpec, WriteColor};

pub use log::{debug, error, info, trace, warn};

/// Installs the terminal logger. `RUST_LOG` overrides the default
/// `vivo=info` filter; graphics backends stay at `warn` unless asked.
pub fn init_logger() {
    let env = Env::default().default_filter_or("vivo=info,vivo_player=info");
    let mut builder = Builder::from_env(env);
    builder.filter_module("naga", LevelFilter::Warn);
    builder.filter_module("wgpu", LevelFilter::Warn);
    builder.filter_module("wgpu_core", LevelFilter::Warn);
    builder.filter_module("wgpu_hal", LevelFilter::Warn);

    builder.format(|_buf, record| {
        let writer =
            termcolor::BufferWriter::stderr(termcolor::ColorChoice::Auto);
        let mut buffer = writer.buffer();
        let mut spec = ColorSpec::new();

        spec.set_fg(Some(match record.level() {
            log::Level::Trace => Color::Cyan,
            log::Level::Debug => Color::Blue,
            log::Level::Info => Color::Green,
            log::Level::Warn => Color::Yellow,
            log::Level::Error => Color::Red,
        }));

        buffer.set_color(&spec)?;
        let module_path = record
            .module_path()
            .map(|path| path.trim_start_matches("vivo::"))
            .unwrap_or("<unknown>");
        write!(buffer, "[{}][{}]", record.level(), module_path)?;
        buffer.reset()?;
        writeln!(buffer, " {}", record.args())?;
        writer.print(&buffer)?;
        Ok(())
    });

    let _ = builder.try_init();
}
