//! Tracing configuration and initialization.
//!
//! `IPFS_MOUNT_LOG` (or `RUST_LOG`) selects the filter. Setting either switches to plain output.

use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{
    EnvFilter,
    fmt::format::FmtSpan,
    layer::SubscriberExt as _,
    util::{SubscriberInitExt as _, TryInitError},
};

use crate::term::should_use_color;

const LOG_ENV_VAR: &str = "IPFS_MOUNT_LOG";

enum TrcMode {
    /// Spinners and compact lines on stderr.
    Pretty,
    /// Plain lines with span enter/close events.
    Plain,
    /// Plain lines into the daemon log file, no color.
    Daemon,
}

pub struct Trc {
    mode: TrcMode,
    env_filter: EnvFilter,
}

impl Default for Trc {
    fn default() -> Self {
        match EnvFilter::try_from_env(LOG_ENV_VAR).or_else(|_| EnvFilter::try_from_default_env())
        {
            Ok(env_filter) => Self {
                mode: TrcMode::Plain,
                env_filter,
            },
            Err(_) => Self {
                mode: TrcMode::Pretty,
                env_filter: EnvFilter::new("info"),
            },
        }
    }
}

impl Trc {
    /// Logs for a process whose stdio was redirected to a file.
    #[must_use]
    pub fn daemon(mut self) -> Self {
        self.mode = TrcMode::Daemon;
        self
    }

    pub fn init(self) -> Result<(), TryInitError> {
        match self.mode {
            TrcMode::Pretty => self.init_pretty_mode(),
            TrcMode::Plain => {
                let ansi = should_use_color(&std::io::stderr());
                self.init_plain_mode(ansi)
            }
            TrcMode::Daemon => self.init_plain_mode(false),
        }
    }

    fn init_plain_mode(self, ansi: bool) -> Result<(), TryInitError> {
        tracing_subscriber::fmt()
            .with_env_filter(self.env_filter)
            .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
            .with_ansi(ansi)
            .with_writer(std::io::stderr)
            .finish()
            .try_init()
    }

    fn init_pretty_mode(self) -> Result<(), TryInitError> {
        let indicatif_layer = IndicatifLayer::new();
        tracing_subscriber::registry()
            .with(self.env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(indicatif_layer.get_stderr_writer())
                    .with_target(false)
                    .without_time()
                    .compact(),
            )
            .with(indicatif_layer)
            .try_init()
    }
}
