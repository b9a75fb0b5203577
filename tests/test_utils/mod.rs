use etchtrek_core::logs;

/// Best-effort logger setup so `debug!` output from the core shows up
/// when running tests with `--nocapture`. Only the first caller wins.
pub fn init_logs() {
    let _ = logs::init(logs::LevelFilter::Debug);
}
