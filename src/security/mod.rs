#[cfg(target_os = "linux")]
pub mod capabilities;

pub mod error;

pub use error::{Result, SecurityError};

/// Check that the process may change firewall rules
pub fn check_capabilities() -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        capabilities::check_required_capabilities()?;
    }

    #[cfg(not(target_os = "linux"))]
    {
        tracing::debug!("Capability checking is only available on Linux");
    }

    Ok(())
}

/// ufw refuses every command for anyone but root, `status` included
pub fn check_root() -> Result<()> {
    let euid = nix::unistd::geteuid();
    if !euid.is_root() {
        return Err(SecurityError::NotRoot { euid: euid.as_raw() });
    }
    Ok(())
}
