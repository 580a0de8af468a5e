use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

/// Owner value a registry reports for a device nobody has claimed.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// External registry that records which account staked a capture device.
#[async_trait]
pub trait OwnershipRegistry {
    /// Returns the registered owner of `device_id`, if the registry knows one.
    ///
    /// Registries that answer with the zero address for unknown devices may
    /// return it as-is; [`check_hardware_ownership`] treats it as unclaimed.
    async fn owner_of_device(&self, device_id: &str) -> Result<Option<String>>;
}

/// Whether a device id has been claimed, and by whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOwnership {
    pub device_id: String,
    pub is_claimed: bool,
    pub owner: Option<String>,
}

fn is_zero_address(owner: &str) -> bool {
    let digits = owner
        .strip_prefix("0x")
        .or_else(|| owner.strip_prefix("0X"))
        .unwrap_or(owner);
    digits.chars().all(|c| c == '0')
}

/// Asks `registry` who owns `device_id`.
///
/// # Arguments
///
/// * `registry` - The registry to consult.
/// * `device_id` - Hardware device id taken from a proof.
///
/// # Returns
///
/// The ownership record; registry failures are propagated, never read as
/// "unclaimed".
pub async fn check_hardware_ownership(
    registry: &(dyn OwnershipRegistry + Send + Sync),
    device_id: &str,
) -> Result<DeviceOwnership> {
    let owner = registry
        .owner_of_device(device_id)
        .await?
        .filter(|owner| !is_zero_address(owner));
    log::debug!("device {device_id} owner: {owner:?}");

    Ok(DeviceOwnership {
        device_id: device_id.to_owned(),
        is_claimed: owner.is_some(),
        owner,
    })
}

/// Registry kept in process memory. Used for testing and development.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    owners: RwLock<HashMap<String, String>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `owner` as the owner of `device_id`, replacing any earlier claim.
    pub async fn claim(&self, device_id: impl Into<String>, owner: impl Into<String>) {
        self.owners
            .write()
            .await
            .insert(device_id.into(), owner.into());
    }
}

#[async_trait]
impl OwnershipRegistry for InMemoryRegistry {
    async fn owner_of_device(&self, device_id: &str) -> Result<Option<String>> {
        log::trace!("owner of {device_id}.");
        Ok(self.owners.read().await.get(device_id).cloned())
    }
}
