//! Per-call decode configuration.
//!
//! Every decode entry point takes a [`DecodeConfig`]; nothing is read from
//! process-wide state.

use std::fmt;
use std::sync::Arc;

use crate::error::Error;

/// Callback invoked once for every error surfaced by a decode call.
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Options controlling a single decode or probe call.
#[derive(Clone, Default)]
pub struct DecodeConfig {
    /// Accept truncated or streamed PNG data.
    ///
    /// When set, the inflater stops at the first block boundary after 64 KiB
    /// of output and a short IDAT payload is not treated as corrupt.
    /// Interlaced images are always decoded in full.
    pub png_partial: bool,
    error_hook: Option<ErrorHook>,
}

impl DecodeConfig {
    /// Default configuration: strict PNG, errors only logged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with no error hook installed.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Enable or disable partial PNG decoding.
    pub fn with_png_partial(mut self, partial: bool) -> Self {
        self.png_partial = partial;
        self
    }

    /// Install a hook that receives every error returned by a decode call.
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    /// Log `err`, hand it to the hook, and give it back for propagation.
    pub(crate) fn report(&self, err: Error) -> Error {
        log::debug!("decode failed: {err}");
        if let Some(hook) = &self.error_hook {
            hook(&err);
        }
        err
    }
}

impl fmt::Debug for DecodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeConfig")
            .field("png_partial", &self.png_partial)
            .field("error_hook", &self.error_hook.is_some())
            .finish()
    }
}
