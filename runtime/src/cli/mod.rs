//! CLI subcommand implementations for the sitecrawl binary.

pub mod crawl_cmd;
pub mod doctor;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` is honored; on top of it the crate logs at `info`, or `debug`
/// with `verbose`. `json` switches to one JSON object per line.
pub fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env().add_directive(
        format!("sitecrawl={level}")
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
