use caps::{CapSet, Capability, CapsHashSet};
use tracing::{debug, warn};

use super::{Result, SecurityError};

/// ufw drives iptables, which needs CAP_NET_ADMIN even for root
const REQUIRED: Capability = Capability::CAP_NET_ADMIN;

/// The permitted and effective sets of the running process
struct ProcessCaps {
    permitted: CapsHashSet,
    effective: CapsHashSet,
}

impl ProcessCaps {
    fn read() -> Result<Self> {
        Ok(Self {
            permitted: read_set(CapSet::Permitted)?,
            effective: read_set(CapSet::Effective)?,
        })
    }

    /// Which set lacks `cap`, permitted first since effective is a subset of it
    fn missing_from(&self, cap: Capability) -> Option<CapSet> {
        if !self.permitted.contains(&cap) {
            Some(CapSet::Permitted)
        } else if !self.effective.contains(&cap) {
            Some(CapSet::Effective)
        } else {
            None
        }
    }
}

fn read_set(set: CapSet) -> Result<CapsHashSet> {
    caps::read(None, set).map_err(|e| SecurityError::CapabilityCheck {
        capability: REQUIRED.to_string(),
        message: format!("reading the {:?} set: {}", set, e),
    })
}

/// Root alone is not enough inside a container or a hardened unit; the
/// bounding set can still withhold CAP_NET_ADMIN.
pub fn check_required_capabilities() -> Result<()> {
    let current = ProcessCaps::read()?;

    let Some(set) = current.missing_from(REQUIRED) else {
        debug!(capability = %REQUIRED, "Firewall capability present");
        return Ok(());
    };

    warn!("Process capabilities:\n{}", describe_sets());
    let remediation = match set {
        CapSet::Permitted => {
            "Root without CAP_NET_ADMIN usually means a container or systemd unit dropped it.\n\
             Add `--cap-add NET_ADMIN` to the container, or CAP_NET_ADMIN to the unit's \
             CapabilityBoundingSet, and run on the host network namespace."
        }
        _ => {
            "CAP_NET_ADMIN is permitted but not effective.\n\
             Start netwarden with sudo directly instead of through a wrapper that lowers \
             its effective set."
        }
    };

    Err(SecurityError::MissingCapability {
        capability: REQUIRED.to_string(),
        capability_set: format!("{:?}", set),
        remediation: remediation.to_string(),
    })
}

/// One line per capability set, for diagnosing a failed check
pub fn describe_sets() -> String {
    [CapSet::Permitted, CapSet::Effective, CapSet::Inheritable]
        .into_iter()
        .map(|set| {
            let names = match caps::read(None, set) {
                Ok(found) if found.is_empty() => "(none)".to_string(),
                Ok(found) => {
                    let mut names: Vec<String> = found.iter().map(|c| c.to_string()).collect();
                    names.sort();
                    names.join(", ")
                }
                Err(e) => format!("(unreadable: {})", e),
            };
            format!("{:?}: {}", set, names)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
