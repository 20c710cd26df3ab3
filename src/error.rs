use thiserror::Error;

/// The single result code the engine can fail with, per the public contract:
/// contract violations are detected locally and symmetrically (every rank sees
/// the same violation for the same call), invariant violations are detected by
/// an early collective, and transport failures are opaque.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("total input count ({total_in}) does not match total output count ({total_out})")]
    BadInvariant { total_in: u64, total_out: u64 },

    #[error("bad key window: key_bytes={key_bytes} key_offset={key_offset} element_bytes={element_bytes}")]
    BadKey {
        key_bytes: usize,
        key_offset: usize,
        element_bytes: usize,
    },

    #[error("invalid tuning combination: {0}")]
    BadTuning(String),

    #[error("transport error: {0}")]
    TransportError(String),
}

pub type SortResult<T> = Result<T, SortError>;
