use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecurityError {
    #[error(
        "Missing capability: {capability} in {capability_set} set\n\nRemediation:\n{remediation}"
    )]
    MissingCapability {
        capability: String,
        capability_set: String,
        remediation: String,
    },

    #[error("Capability check failed for {capability}: {message}")]
    CapabilityCheck { capability: String, message: String },

    #[error("ufw only answers root, so netwarden must run as root (effective uid is {euid}); rerun with sudo")]
    NotRoot { euid: u32 },
}

pub type Result<T> = std::result::Result<T, SecurityError>;
