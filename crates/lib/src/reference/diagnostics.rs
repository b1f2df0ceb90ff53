//! Non-fatal usage warnings.

use std::fmt::Debug;

/// Sink for warnings about API usage that does not change behavior.
///
/// References report through this trait instead of logging directly so that
/// callers can capture or silence the warnings.
pub trait Diagnostics: Send + Sync + Debug {
    /// `api` was called but is deprecated in favor of `replacement`.
    fn deprecated(&self, api: &'static str, replacement: &'static str);
}

/// Reports diagnostics as `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn deprecated(&self, api: &'static str, replacement: &'static str) {
        tracing::warn!(api, replacement, "{api} is deprecated; use {replacement} instead");
    }
}
