//! Error handling module
//!
//! Domain error kinds for the reconciliation engine. Collaborator failures
//! (transport, storage, filesystem) travel as plain `anyhow::Error`; the kinds
//! below are what the engine itself raises.

use std::io;

/// Error kinds raised by the config model, config manager and driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LbError {
    /// Structural violation in the HAProxy config or a failed fetch/deploy
    Config(String),
    /// Device descriptor lacks the management info needed to reach it
    ManagementInfoMissing(String),
    /// Device reported an error (stats query failed or returned nothing)
    Device(String),
}

impl LbError {
    pub fn message(&self) -> &str {
        match self {
            LbError::Config(msg) | LbError::ManagementInfoMissing(msg) | LbError::Device(msg) => {
                msg
            }
        }
    }
}

impl std::fmt::Display for LbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LbError::Config(msg) => write!(f, "Config error: {}", msg),
            LbError::ManagementInfoMissing(msg) => write!(f, "Haproxy error: {}", msg),
            LbError::Device(msg) => write!(f, "Haproxy error: {}", msg),
        }
    }
}

impl std::error::Error for LbError {}

/// Helper trait for adding context to collaborator errors
pub trait ResultExt<T> {
    /// Add configuration error context
    fn context_config(self, msg: &str) -> anyhow::Result<T>;
    /// Add device error context
    fn context_device(self, msg: &str) -> anyhow::Result<T>;
}

impl<T> ResultExt<T> for anyhow::Result<T> {
    fn context_config(self, msg: &str) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{}: {}", LbError::Config(msg.to_string()), e))
    }

    fn context_device(self, msg: &str) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{}: {}", LbError::Device(msg.to_string()), e))
    }
}

impl<T> ResultExt<T> for io::Result<T> {
    fn context_config(self, msg: &str) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{}: {}", LbError::Config(msg.to_string()), e))
    }

    fn context_device(self, msg: &str) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{}: {}", LbError::Device(msg.to_string()), e))
    }
}

/// Find the engine error kind inside an anyhow chain, if any.
pub fn lb_error(error: &anyhow::Error) -> Option<&LbError> {
    error.chain().find_map(|cause| cause.downcast_ref::<LbError>())
}

/// Generate user-friendly error message
///
/// Converts internal errors into messages operators can act upon.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let error_str = error.to_string();

    if error_str.contains("Connection refused") {
        "Cannot connect to the device. Please check its management address.".to_string()
    } else if error_str.contains("Permission denied") {
        "Permission denied. Please check the SSH key path and its file mode.".to_string()
    } else if error_str.contains("No such file") {
        "File not found. Please check the path.".to_string()
    } else if let Some(lb) = lb_error(error) {
        lb.to_string()
    } else {
        error_str
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lb_error_is_found_through_context_layers() {
        let err = anyhow::Error::new(LbError::Config("No such pool: web".to_string()))
            .context("create member failed");

        assert_eq!(
            lb_error(&err),
            Some(&LbError::Config("No such pool: web".to_string()))
        );
    }

    #[test]
    fn io_context_names_the_error_kind() {
        let result: io::Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = result.context_config("cannot read staged config").unwrap_err();
        assert_eq!(err.to_string(), "Config error: cannot read staged config: gone");
    }

    #[test]
    fn user_error_prefers_transport_hints() {
        let err = anyhow::anyhow!("ssh: connect to host 10.0.0.2 port 22: Connection refused");
        assert!(format_user_error(&err).contains("management address"));
    }
}
