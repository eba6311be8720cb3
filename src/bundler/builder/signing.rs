//! Per-run signing identity.
//!
//! The first darwin architecture provisions the ephemeral keychain; later
//! architectures reuse it. Provisioning registers the keychain's disposal
//! with the run's cleanup registry, so a keychain that was created is
//! deleted exactly once.

use super::cleanup::CleanupRegistry;
use crate::bundler::{
    Error, Result,
    platform::macos::{CodeSigningManager, DisposeMode, SigningIdentity},
};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Default)]
pub(super) struct IdentitySlot {
    identity: OnceCell<Arc<SigningIdentity>>,
}

impl IdentitySlot {
    /// The identity provisioned earlier in this run, if any.
    pub(super) fn get(&self) -> Option<Arc<SigningIdentity>> {
        self.identity.get().cloned()
    }

    pub(super) fn is_provisioned(&self) -> bool {
        self.identity.initialized()
    }

    /// Provisions the identity unless that already happened.
    pub(super) async fn provision(
        &self,
        manager: &Arc<CodeSigningManager>,
        cleanup: &CleanupRegistry,
        signing_link: &str,
        password: &str,
    ) -> Result<Arc<SigningIdentity>> {
        self.identity
            .get_or_try_init(|| async {
                let identity = manager.create_identity(signing_link, password).await?;
                if let Some(handle) = identity.store_handle() {
                    let manager = Arc::clone(manager);
                    let handle = handle.to_string();
                    cleanup.register(format!("delete keychain {handle}"), move || async move {
                        manager.dispose_identity(&handle, DisposeMode::Lenient).await
                    });
                }
                Ok::<_, Error>(Arc::new(identity))
            })
            .await
            .cloned()
    }
}
