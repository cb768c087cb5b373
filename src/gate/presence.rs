use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Device location collaborator. `current_position` may suspend until the
/// platform produces a fix; no timeout is imposed here.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permission(&self) -> Result<PermissionStatus>;
    async fn current_position(&self) -> Result<GeoPoint>;
}

/// Provider with a settable position, for simulators and tests.
pub struct FixedLocationProvider {
    state: Mutex<(PermissionStatus, Option<GeoPoint>)>,
}

impl FixedLocationProvider {
    pub fn new(position: GeoPoint) -> Self {
        Self {
            state: Mutex::new((PermissionStatus::Granted, Some(position))),
        }
    }

    pub fn denied() -> Self {
        Self {
            state: Mutex::new((PermissionStatus::Denied, None)),
        }
    }

    /// Permission granted but no fix ever arrives.
    pub fn without_fix() -> Self {
        Self {
            state: Mutex::new((PermissionStatus::Granted, None)),
        }
    }

    pub async fn move_to(&self, position: GeoPoint) {
        self.state.lock().await.1 = Some(position);
    }

    pub async fn set_permission(&self, permission: PermissionStatus) {
        self.state.lock().await.0 = permission;
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn request_permission(&self) -> Result<PermissionStatus> {
        Ok(self.state.lock().await.0)
    }

    async fn current_position(&self) -> Result<GeoPoint> {
        self.state
            .lock()
            .await
            .1
            .ok_or_else(|| anyhow!("no location fix available"))
    }
}
