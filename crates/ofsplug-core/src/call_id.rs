//! Call identifiers for correlating host procedure calls with their results.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of generated call identifiers (~190 bits over `[A-Za-z0-9]`).
pub const CALL_ID_LEN: usize = 32;

/// Generate an unpredictable alphanumeric call identifier.
///
/// The result is safe to embed in a JSON payload as-is.
pub fn generate_call_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CALL_ID_LEN)
        .map(char::from)
        .collect()
}

/// An outstanding `callProcedure` awaiting its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    id: String,
    procedure: String,
}

impl PendingCall {
    /// Start tracking a new call with a freshly generated identifier.
    pub fn new(procedure: impl Into<String>) -> Self {
        Self {
            id: generate_call_id(),
            procedure: procedure.into(),
        }
    }

    /// The call identifier sent to the host.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The procedure that was called.
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// Whether a result carrying `call_id` answers this call.
    pub fn matches(&self, call_id: Option<&str>) -> bool {
        call_id == Some(self.id.as_str())
    }
}
