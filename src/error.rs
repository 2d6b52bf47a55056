use thiserror::Error;

// Define our own Result type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] std::io::Error),

    // Module-specific errors that will be converted from module error types
    #[error(transparent)]
    Config(#[from] crate::config::error::ConfigError),

    #[error(transparent)]
    Docker(#[from] crate::docker::error::DockerError),

    #[error(transparent)]
    Bootstrap(#[from] crate::bootstrap::error::BootstrapError),

    #[error(transparent)]
    Ufw(#[from] crate::ufw::error::UfwError),

    #[error(transparent)]
    Policy(#[from] crate::policy::PolicyError),

    #[error(transparent)]
    Reconcile(#[from] crate::reconcile::error::ReconcileError),

    #[error(transparent)]
    Lock(#[from] crate::lock::LockError),

    #[error(transparent)]
    Security(#[from] crate::security::error::SecurityError),
}

impl Error {
    /// Whether the failure happened before any mutation could be attempted:
    /// bad configuration, missing privileges or tools, a held lock, or a host
    /// that does not look the way the policy expects.
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::Config(_) | Self::Policy(_) | Self::Lock(_) | Self::Security(_) => true,
            Self::Ufw(e) => e.is_precondition(),
            Self::Reconcile(e) => e.is_precondition(),
            Self::Io(_) | Self::Docker(_) | Self::Bootstrap(_) => false,
        }
    }

    /// Exit code for the `reconcile` command.
    pub fn reconcile_exit_code(&self) -> u8 {
        if self.is_precondition() { 1 } else { 3 }
    }

    /// Exit code for the `bootstrap` command; every failure there is fatal
    /// for the deploy.
    pub fn bootstrap_exit_code(&self) -> u8 {
        2
    }
}
