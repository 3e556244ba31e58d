use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::topics::TenantIdentity;
use crate::error::DynSecError;

/// Broker login issued to one tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Broker username.
    pub username: String,
    /// Broker password, only ever returned to the caller that created it.
    pub password: String,
    /// Human-readable label (broker `textname`).
    pub display_name: String,
    /// The single tenant role assigned to the client.
    pub role_name: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("role_name", &self.role_name)
            .finish()
    }
}

/// Persistence for tenant identities and issued credentials.
///
/// The broker is the authority for what exists; the store is what the
/// application remembers having issued.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Stored identity of a tenant.
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<TenantIdentity>, DynSecError>;
    /// Persist an identity unless the tenant already has one.
    ///
    /// Insert-if-absent: when an identity is already stored for
    /// `identity.tenant_id`, nothing is written and the stored identity is
    /// returned. Otherwise the new identity is stored and returned. Fails with
    /// [`DynSecError::NamespaceTaken`] if another tenant holds the namespace.
    async fn save_tenant(&self, identity: &TenantIdentity) -> Result<TenantIdentity, DynSecError>;
    /// Forget a tenant identity.
    async fn delete_tenant(&self, tenant_id: &str) -> Result<(), DynSecError>;
    /// Whether any tenant holds `namespace`.
    async fn namespace_taken(&self, namespace: &str) -> Result<bool, DynSecError>;
    /// Credentials issued to a tenant, in issue order.
    async fn list_credentials(&self, tenant_id: &str) -> Result<Vec<Credential>, DynSecError>;
    /// Credential by username, with the owning tenant id.
    async fn get_credential(&self, username: &str) -> Result<Option<(String, Credential)>, DynSecError>;
    /// Record an issued credential.
    async fn save_credential(&self, tenant_id: &str, credential: &Credential) -> Result<(), DynSecError>;
    /// Update a credential's display name.
    async fn update_credential_name(&self, username: &str, display_name: &str) -> Result<(), DynSecError>;
    /// Forget a credential.
    async fn delete_credential_record(&self, username: &str) -> Result<(), DynSecError>;
}

#[derive(Debug, Default)]
struct Records {
    tenants: HashMap<String, TenantIdentity>,
    // (tenant_id, credential), issue order
    credentials: Vec<(String, Credential)>,
}

/// In-memory store for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryTenantStore {
    inner: Mutex<Records>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<TenantIdentity>, DynSecError> {
        Ok(self.inner.lock().await.tenants.get(tenant_id).cloned())
    }

    async fn save_tenant(&self, identity: &TenantIdentity) -> Result<TenantIdentity, DynSecError> {
        let mut guard = self.inner.lock().await;
        if let Some(stored) = guard.tenants.get(&identity.tenant_id) {
            return Ok(stored.clone());
        }
        if guard.tenants.values().any(|t| t.namespace == identity.namespace) {
            return Err(DynSecError::NamespaceTaken(identity.namespace.to_string()));
        }
        guard.tenants.insert(identity.tenant_id.clone(), identity.clone());
        Ok(identity.clone())
    }

    async fn delete_tenant(&self, tenant_id: &str) -> Result<(), DynSecError> {
        self.inner.lock().await.tenants.remove(tenant_id);
        Ok(())
    }

    async fn namespace_taken(&self, namespace: &str) -> Result<bool, DynSecError> {
        Ok(self.inner.lock().await.tenants.values().any(|t| t.namespace.as_str() == namespace))
    }

    async fn list_credentials(&self, tenant_id: &str) -> Result<Vec<Credential>, DynSecError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .credentials
            .iter()
            .filter(|(owner, _)| owner == tenant_id)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn get_credential(&self, username: &str) -> Result<Option<(String, Credential)>, DynSecError> {
        let guard = self.inner.lock().await;
        Ok(guard.credentials.iter().find(|(_, c)| c.username == username).cloned())
    }

    async fn save_credential(&self, tenant_id: &str, credential: &Credential) -> Result<(), DynSecError> {
        let mut guard = self.inner.lock().await;
        if guard.credentials.iter().any(|(_, c)| c.username == credential.username) {
            return Err(DynSecError::Store(format!("credential {} already recorded", credential.username)));
        }
        guard.credentials.push((tenant_id.to_string(), credential.clone()));
        Ok(())
    }

    async fn update_credential_name(&self, username: &str, display_name: &str) -> Result<(), DynSecError> {
        let mut guard = self.inner.lock().await;
        match guard.credentials.iter_mut().find(|(_, c)| c.username == username) {
            Some((_, c)) => {
                c.display_name = display_name.to_string();
                Ok(())
            }
            None => Err(DynSecError::Store(format!("no credential {username}"))),
        }
    }

    async fn delete_credential_record(&self, username: &str) -> Result<(), DynSecError> {
        self.inner.lock().await.credentials.retain(|(_, c)| c.username != username);
        Ok(())
    }
}
