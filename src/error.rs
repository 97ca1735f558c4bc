use thiserror::Error;

/// Failure classes crossing the script/host boundary.
///
/// The variants carry their policy: script faults are reported and swallowed,
/// invalid selectors become script-visible exceptions, unknown handles are
/// bridge defects, and bootstrap faults are fatal to the bridge instance.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An exception raised by user script logic (syntax error, runtime type
    /// error, explicit throw). Caught at the script-load and dispatch
    /// boundaries; page execution continues.
    #[error("script fault in {script}: {message}")]
    Script { script: String, message: String },

    /// Selector text the selector engine refused. Translated into an
    /// exception the script can catch; uncaught it degenerates into a
    /// script fault.
    #[error("invalid selector {selector:?}")]
    InvalidSelector { selector: String },

    /// Resolution of a handle that was never allocated in this session.
    /// Scripts cannot forge handles, so this signals a bridge or reflector
    /// defect rather than a recoverable condition.
    #[error("unknown node handle {0}")]
    UnknownHandle(u32),

    /// Failure while installing host exports or evaluating the bootstrap
    /// program. Fatal to the bridge instance; recovery requires a fresh
    /// page session.
    #[error("bootstrap fault: {message}")]
    Bootstrap { message: String },
}
