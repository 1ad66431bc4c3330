//! Error types for the engine binary.
//!
//! [`StartupError`] wraps every failure mode of startup and of the main
//! run so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: almanac_core::config::ConfigError,
    },

    /// The journal directory could not be opened.
    #[error("journal sink error: {source}")]
    Sink {
        /// The underlying sink error.
        #[from]
        source: almanac_journal::SinkError,
    },

    /// Persisted history could not be restored.
    #[error("journal error: {source}")]
    Journal {
        /// The underlying journal error.
        #[from]
        source: almanac_journal::JournalError,
    },

    /// Writing the initial world failed.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: almanac_core::EngineError,
    },

    /// Autoplay ended with an error.
    #[error("autoplay error: {source}")]
    Autoplay {
        /// The underlying runner error.
        #[from]
        source: almanac_core::runner::RunnerError,
    },

    /// The boundary server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying server error.
        #[from]
        source: almanac_observer::ServerError,
    },

    /// The logging subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
