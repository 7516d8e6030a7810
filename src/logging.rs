//! Tracing setup for the binaries
//!
//! Logs always go to stderr so that stdout stays a clean protocol channel for
//! the stdio transport. `RUST_LOG` overrides the verbosity flags.

use tracing_subscriber::{ EnvFilter, layer::SubscriberExt, util::SubscriberInitExt };

/// Filter directive for the given `-v` count and `-q` flag
pub fn default_directive(verbose: u8, quiet: bool) -> String {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    format!("{level},hyper=warn,reqwest=warn,tower_http=warn")
}

/// Install the global subscriber; later calls are ignored
pub fn init(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_|
        EnvFilter::new(default_directive(verbose, quiet))
    );

    let _ = tracing_subscriber
        ::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(filter)
        .try_init();
}
