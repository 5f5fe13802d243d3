use log::{info, warn};
use std::net::Ipv4Addr;

use crate::config::NodeConfig;
use crate::radio::{AssociationStatus, Clock, Radio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    /// Association requested; `polls` status checks have come back negative.
    Joining { polls: u32 },
    Connected,
}

/// Result of a completed join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    /// Address assigned to the node, for the boot log only.
    pub local_address: Option<Ipv4Addr>,
    /// Negative status checks before the link came up.
    pub polls: u32,
}

/// Brings the node onto the configured network and holds startup until it is
/// there. There is no failed state: a rejected association looks the same as
/// one still in progress, and the controller keeps waiting.
#[derive(Debug)]
pub struct JoinController<'a> {
    config: &'a NodeConfig,
    state: JoinState,
    requested: bool,
    association_errors: u32,
}

impl<'a> JoinController<'a> {
    pub fn new(config: &'a NodeConfig) -> Self {
        Self {
            config,
            state: JoinState::Joining { polls: 0 },
            requested: false,
            association_errors: 0,
        }
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    /// Association requests the radio refused. Informational only.
    pub fn association_errors(&self) -> u32 {
        self.association_errors
    }

    /// Issue the association request. A refusal is logged and counted, and
    /// polling carries on regardless.
    pub fn request_association<R: Radio>(&mut self, radio: &mut R) {
        self.requested = true;
        info!("Connecting to Wi-Fi network: {}", self.config.network_name);
        if let Err(e) = radio.begin_association(
            &self.config.network_name,
            &self.config.network_credential,
        ) {
            self.association_errors += 1;
            warn!("Association request failed: {:?}", e);
        }
    }

    /// One status check. When still not connected, waits one poll interval
    /// before returning.
    pub fn poll<R: Radio, C: Clock>(&mut self, radio: &mut R, clock: &mut C) -> JoinState {
        if !self.requested {
            self.request_association(radio);
        }

        if let JoinState::Joining { polls } = self.state {
            match radio.association_status() {
                AssociationStatus::Connected => self.state = JoinState::Connected,
                AssociationStatus::NotConnected => {
                    clock.sleep(self.config.join_poll_interval);
                    info!("Connecting to Wi-Fi...");
                    self.state = JoinState::Joining { polls: polls + 1 };
                }
            }
        }

        self.state
    }

    /// Block until the radio reports a connection. Never gives up.
    pub fn join<R: Radio, C: Clock>(mut self, radio: &mut R, clock: &mut C) -> Joined {
        let mut polls = 0;
        loop {
            match self.poll(radio, clock) {
                JoinState::Connected => break,
                JoinState::Joining { polls: n } => polls = n,
            }
        }

        let local_address = radio.local_address();
        info!("Connected to Wi-Fi: {}", self.config.network_name);
        info!("Receiver ID: {}", self.config.receiver_id);
        match local_address {
            Some(ip) => info!("IP address: {}", ip),
            None => warn!("Connected but no IP address reported"),
        }

        Joined {
            local_address,
            polls,
        }
    }
}
