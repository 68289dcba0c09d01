use clap::ValueEnum;
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Verbosity
// -----------------------------------------------------------------------------

/// The output verbosity level, passed to the logger through `RUST_LOG`.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, ValueEnum)]
pub enum Verbosity {
    #[default]
    Info,
    Warn,
    Debug,
    Error,
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let level = match self {
            Verbosity::Info => "info",
            Verbosity::Warn => "warn",
            Verbosity::Debug => "debug",
            Verbosity::Error => "error",
        };
        write!(f, "{level}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_names() {
        assert_eq!(Verbosity::default().to_string(), "info");
        assert_eq!(Verbosity::Debug.to_string(), "debug");
    }
}
