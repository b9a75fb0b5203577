use anyhow::Result;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

pub use simplelog::LevelFilter;

/// Terminal logger for embedders that do not install their own `log`
/// backend. Hosts with their own logging setup should skip this.
pub fn init(level: LevelFilter) -> Result<()> {
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto)?;
    Ok(())
}
