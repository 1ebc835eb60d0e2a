//! Authorizer backed by the host's serial port list.

use super::{AuthorizationError, PortAuthorizer, PortCandidate, PortSelector, WhitelistSelector};
use crate::config::DevicesConfig;
use crate::port::{SerialTransport, TokioSerialTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// List the serial ports currently present on this host.
pub async fn enumerate_ports() -> Result<Vec<PortCandidate>, AuthorizationError> {
    let ports = tokio::task::spawn_blocking(serialport::available_ports)
        .await
        .map_err(|e| AuthorizationError::Enumeration(e.to_string()))?
        .map_err(|e| AuthorizationError::Enumeration(e.to_string()))?;
    Ok(ports.into_iter().map(PortCandidate::from).collect())
}

/// Grants access to enumerated system ports.
///
/// Grants last for the life of the process. Ports named in the configuration
/// and devices the selector permits count as granted from the start.
pub struct SystemPortAuthorizer {
    selector: Arc<dyn PortSelector>,
    granted: Mutex<HashSet<String>>,
    presence_poll: Duration,
}

impl SystemPortAuthorizer {
    pub fn new(selector: Arc<dyn PortSelector>, presence_poll: Duration) -> Self {
        Self {
            selector,
            granted: Mutex::new(HashSet::new()),
            presence_poll,
        }
    }

    pub fn from_config(devices: &DevicesConfig) -> Self {
        Self::new(
            Arc::new(WhitelistSelector::from_config(devices)),
            devices.presence_poll(),
        )
        .with_granted(devices.authorized_ports.iter().cloned())
    }

    /// Pre-grant ports by system name.
    pub fn with_granted<I, S>(self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted.lock().extend(ports.into_iter().map(Into::into));
        self
    }

    pub fn is_granted(&self, candidate: &PortCandidate) -> bool {
        self.granted.lock().contains(&candidate.port_id) || self.selector.is_permitted(candidate)
    }

    fn transport(&self, candidate: PortCandidate) -> Box<dyn SerialTransport> {
        Box::new(TokioSerialTransport::new(candidate, self.presence_poll))
    }
}

#[async_trait]
impl PortAuthorizer for SystemPortAuthorizer {
    async fn is_available(&self) -> bool {
        match enumerate_ports().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Serial port enumeration unavailable: {}", e);
                false
            }
        }
    }

    async fn authorized_ports(&self) -> Result<Vec<Box<dyn SerialTransport>>, AuthorizationError> {
        let mut candidates: Vec<PortCandidate> = enumerate_ports()
            .await?
            .into_iter()
            .filter(|c| self.is_granted(c))
            .collect();

        // Explicit grants ahead of whitelist matches.
        {
            let granted = self.granted.lock();
            candidates.sort_by_key(|c| !granted.contains(&c.port_id));
        }
        debug!("{} previously authorized ports present", candidates.len());

        Ok(candidates.into_iter().map(|c| self.transport(c)).collect())
    }

    async fn request_port(&self) -> Result<Box<dyn SerialTransport>, AuthorizationError> {
        let candidates = enumerate_ports().await?;
        if candidates.is_empty() {
            warn!("Could not find any serial devices");
            return Err(AuthorizationError::NoDevices);
        }

        let chosen = self
            .selector
            .choose(&candidates)
            .and_then(|id| candidates.into_iter().find(|c| c.port_id == id))
            .ok_or_else(|| AuthorizationError::Denied("no port selected".to_string()))?;

        info!(
            "Granted access to {} ({})",
            chosen.port_id, chosen.display_name
        );
        self.granted.lock().insert(chosen.port_id.clone());
        Ok(self.transport(chosen))
    }
}
