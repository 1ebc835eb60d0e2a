//! Port selection policy.

use super::PortCandidate;
use crate::config::DevicesConfig;
use tracing::debug;

/// Product names accepted without a prompt.
pub const DEFAULT_NAME_WHITELIST: &[&str] = &["Arduino Mega 2560", "Arduino Uno", "Arduino Due"];

/// Decides which port a fresh authorization request grants, and which
/// devices are trusted without asking.
pub trait PortSelector: Send + Sync {
    /// Pick one of `candidates` by port id, or `None` to decline.
    fn choose(&self, candidates: &[PortCandidate]) -> Option<String>;

    /// Whether `candidate` may be used without an explicit grant.
    fn is_permitted(&self, _candidate: &PortCandidate) -> bool {
        false
    }
}

/// Picks ports by product name or hardware instance id.
///
/// With a single candidate that one is chosen whatever its name. With
/// several, the first whitelisted one wins and the last candidate is the
/// fallback.
#[derive(Debug, Clone, Default)]
pub struct WhitelistSelector {
    names: Vec<String>,
    instance_ids: Vec<String>,
}

impl WhitelistSelector {
    pub fn new(names: Vec<String>, instance_ids: Vec<String>) -> Self {
        Self {
            names,
            instance_ids,
        }
    }

    pub fn from_config(devices: &DevicesConfig) -> Self {
        Self::new(
            devices.name_whitelist.clone(),
            devices.instance_whitelist.clone(),
        )
    }

    /// Whitelist holding the stock Arduino board names.
    pub fn arduino() -> Self {
        Self::new(
            DEFAULT_NAME_WHITELIST.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
        )
    }

    pub fn is_whitelisted(&self, candidate: &PortCandidate) -> bool {
        if self.names.iter().any(|n| n == &candidate.display_name) {
            return true;
        }
        match &candidate.instance_id {
            Some(id) => self.instance_ids.iter().any(|w| w.eq_ignore_ascii_case(id)),
            None => false,
        }
    }
}

impl PortSelector for WhitelistSelector {
    fn choose(&self, candidates: &[PortCandidate]) -> Option<String> {
        match candidates {
            [] => None,
            [only] => Some(only.port_id.clone()),
            [.., last] => {
                let choice = candidates
                    .iter()
                    .find(|c| self.is_whitelisted(c))
                    .unwrap_or(last);
                debug!(
                    "Selected {} out of {} candidate ports",
                    choice.port_id,
                    candidates.len()
                );
                Some(choice.port_id.clone())
            }
        }
    }

    fn is_permitted(&self, candidate: &PortCandidate) -> bool {
        self.is_whitelisted(candidate)
    }
}
