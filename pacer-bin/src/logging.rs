use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

use crate::verbosity::Verbosity;

/// Initialize the logging system with the given verbosity level.
pub(crate) fn init_logging(verbose: &Verbosity) {
    // Everything else is kept at `warn`; RUST_LOG overrides both.
    let env = Env::default().filter_or("RUST_LOG", "warn");

    let mut builder = Builder::from_env(env);
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false);

    if std::env::var("RUST_LOG").is_err() {
        let level_filter = verbose.log_level_filter();

        builder.filter_level(LevelFilter::Warn);
        builder
            .filter_module("pacer", level_filter)
            .filter_module("pacer_lib", level_filter);
    }

    // Log lines go to stderr and must not interleave with results on stdout
    builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));

    builder.init();
}
