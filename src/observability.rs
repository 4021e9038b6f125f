// In: src/observability.rs

//! Logger setup for the library.
//!
//! Every module logs through the `log` facade. Nothing is printed until a host
//! installs a logger; `enable_verbose_logging` installs `env_logger` at `Info`
//! with a bare `[LEVEL] message` format, optionally appending to a file.

use std::fs::OpenOptions;
use std::sync::Once;

use log::LevelFilter;

static INIT_LOGGER: Once = Once::new();

/// Installs the logger once per process. Later calls do nothing.
///
/// Fails only if `log_file` cannot be opened for appending, in which case no
/// logger is installed and a later call may try again.
pub fn enable_verbose_logging(log_file: Option<String>) -> std::io::Result<()> {
    let file = match log_file {
        Some(path) => Some(OpenOptions::new().append(true).create(true).open(path)?),
        None => None,
    };

    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(LevelFilter::Info);

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(file) = file {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        // Another logger may already be installed by the host.
        let _ = builder.try_init();
    });
    Ok(())
}
