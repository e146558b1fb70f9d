//! Leveled diagnostics keyed by the client's `logging` flag.
//!
//! With logging enabled, events go to `tracing` (when the `tracing` feature is
//! on). Warnings and errors that would otherwise be lost are written to
//! stderr instead.

#[cfg(feature = "tracing")]
pub(crate) fn debug(enabled: bool, message: &str) {
    if enabled {
        tracing::debug!(target: "pagefetch_http", "{message}");
    }
}

#[cfg(not(feature = "tracing"))]
pub(crate) fn debug(_enabled: bool, _message: &str) {}

#[cfg(feature = "tracing")]
pub(crate) fn info(enabled: bool, message: &str) {
    if enabled {
        tracing::info!(target: "pagefetch_http", "{message}");
    }
}

#[cfg(not(feature = "tracing"))]
pub(crate) fn info(_enabled: bool, _message: &str) {}

#[cfg(feature = "tracing")]
pub(crate) fn warn(enabled: bool, message: &str) {
    if enabled {
        tracing::warn!(target: "pagefetch_http", "{message}");
    } else {
        eprintln!("{message}");
    }
}

#[cfg(not(feature = "tracing"))]
pub(crate) fn warn(_enabled: bool, message: &str) {
    eprintln!("{message}");
}

#[cfg(feature = "tracing")]
pub(crate) fn error(enabled: bool, message: &str) {
    if enabled {
        tracing::error!(target: "pagefetch_http", "{message}");
    } else {
        eprintln!("{message}");
    }
}

#[cfg(not(feature = "tracing"))]
pub(crate) fn error(_enabled: bool, message: &str) {
    eprintln!("{message}");
}
