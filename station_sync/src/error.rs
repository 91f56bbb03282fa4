//! Error taxonomy of the synchronization core.

use lib_common::retrieve::ApiError;

/// Everything that can go wrong between the collaborators and the published
/// station state. None of these is fatal; each one leaves the station in a
/// well-defined state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// Network or HTTP failure reaching a collaborator.
    #[error("{0}")]
    Transport(String),

    /// The collaborator answered but reported a non-zero `errCode`.
    #[error("{message}")]
    Application {
        /// The `errCode` as reported.
        code: i64,
        /// The `errMsg` as reported, or a generic text when it was empty.
        message: String,
    },

    /// A fetch completed after the station's occupancy moved on.
    #[error("stale response for {station}: container {container} is no longer current")]
    Stale {
        /// Station the fetch was issued for.
        station: String,
        /// Container the fetch was issued for.
        container: String,
    },

    /// A device document failed validation at the registry boundary.
    #[error("malformed device payload for {code}: {reason}")]
    MalformedDevice {
        /// Device code the payload was addressed to.
        code: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The station code is not one of the configured station slots.
    #[error("unknown station {0}")]
    UnknownStation(String),
}

impl SyncError {
    /// Builds an application error from an `errCode`/`errMsg` pair.
    pub fn application(code: i64, message: Option<&str>) -> Self {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("unknown error")
            .to_string();
        SyncError::Application { code, message }
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        SyncError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_error_displays_server_message() {
        assert_eq!(SyncError::application(1, Some("not found")).to_string(), "not found");
        assert_eq!(SyncError::application(3, Some("  ")).to_string(), "unknown error");
        assert_eq!(SyncError::application(3, None).to_string(), "unknown error");
    }
}
