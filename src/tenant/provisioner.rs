//! Tenant lifecycle on top of the command executor.
//!
//! Every operation is a short, strictly sequential series of control-plane
//! commands. Re-running an operation after a partial failure is safe: role
//! creation is normalized by the executor, deletions treat "not found" as done,
//! and provisioning skips credentials the store already holds.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::names::{NameGenerator, RandomNames};
use super::store::{Credential, TenantStore};
use super::topics::{RoleKind, TenantIdentity, TopicNamespace};
use crate::config::Generation;
use crate::control::command::{DynSecCommand, RoleRef};
use crate::control::executor::CommandExecutor;
use crate::control::phrases::{CLIENT_ALREADY_EXISTS, CLIENT_NOT_FOUND, ROLE_NOT_FOUND};
use crate::control::transport::BrokerConnector;
use crate::control::types::CommandResult;
use crate::error::DynSecError;
use crate::telemetry::{NullSink, TelemetrySink};

/// Display name of the credential issued for automation tooling.
pub const AUTOMATION_DISPLAY_NAME: &str = "Automation Tool Credentials";
/// Display name of the first device credential.
pub const EXAMPLE_DEVICE_DISPLAY_NAME: &str = "Example Device";

/// Outcome of deleting many credentials. Every deletion is attempted.
#[derive(Debug, Default)]
pub struct BulkDeletion {
    /// Usernames removed from the broker (or already absent).
    pub deleted: Vec<String>,
    /// Usernames that could not be removed, with the reason.
    pub failed: Vec<(String, DynSecError)>,
}

impl BulkDeletion {
    /// Every credential was removed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What a fresh (or re-run) provisioning left in place.
#[derive(Debug)]
pub struct ProvisionedTenant {
    /// Stored tenant identity.
    pub identity: TenantIdentity,
    /// Credential holding the automation role.
    pub automation: Credential,
    /// First credential holding the device role.
    pub device: Credential,
}

/// Outcome of tearing a tenant down.
#[derive(Debug)]
pub struct DeprovisionReport {
    /// Tenant that was torn down.
    pub tenant_id: String,
    /// Outcome of the credential sweep.
    pub credentials: BulkDeletion,
    /// Roles that could not be deleted, with the reason.
    pub roles_failed: Vec<(RoleKind, DynSecError)>,
}

impl DeprovisionReport {
    /// Everything was removed and the tenant record is gone.
    pub fn is_complete(&self) -> bool {
        self.credentials.is_complete() && self.roles_failed.is_empty()
    }
}

/// Creates and removes per-tenant roles and credentials.
pub struct TenantProvisioner<C, S = NullSink> {
    executor: CommandExecutor<C, S>,
    store: Arc<dyn TenantStore>,
    names: Arc<dyn NameGenerator>,
    generation: Generation,
}

impl<C, S: Clone> Clone for TenantProvisioner<C, S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            store: Arc::clone(&self.store),
            names: Arc::clone(&self.names),
            generation: self.generation,
        }
    }
}

impl<C, S> TenantProvisioner<C, S>
where
    C: BrokerConnector,
    S: TelemetrySink + Sync,
    S::Future: Send + 'static,
{
    /// Provisioner using random names and the executor's generation limits.
    pub fn new(executor: CommandExecutor<C, S>, store: Arc<dyn TenantStore>) -> Self {
        let generation = executor.config().generation;
        Self { executor, store, names: Arc::new(RandomNames), generation }
    }

    /// Replace the name generator.
    pub fn with_names(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    pub fn executor(&self) -> &CommandExecutor<C, S> {
        &self.executor
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// Stored identity of a tenant, or a new one with a fresh namespace.
    ///
    /// Concurrent calls for the same tenant all return the identity that was
    /// stored first.
    pub async fn register_tenant(&self, tenant_id: &str) -> Result<TenantIdentity, DynSecError> {
        if let Some(identity) = self.store.get_tenant(tenant_id).await? {
            return Ok(identity);
        }

        let max = self.generation.max_attempts;
        for attempt in 1..=max {
            let candidate = self.names.namespace(self.generation.namespace_len);
            let namespace = match TopicNamespace::new(candidate) {
                Ok(ns) => ns,
                Err(err) => {
                    warn!(tenant = tenant_id, attempt, error = %err, "discarding generated namespace");
                    continue;
                }
            };
            if self.store.namespace_taken(namespace.as_str()).await? {
                debug!(tenant = tenant_id, attempt, %namespace, "namespace taken, regenerating");
                continue;
            }
            let candidate = TenantIdentity::derive(tenant_id, namespace);
            match self.store.save_tenant(&candidate).await {
                Ok(stored) if stored == candidate => {
                    info!(tenant = tenant_id, namespace = %stored.namespace, "tenant registered");
                    return Ok(stored);
                }
                Ok(stored) => {
                    debug!(tenant = tenant_id, namespace = %stored.namespace, "tenant registered concurrently, using stored identity");
                    return Ok(stored);
                }
                Err(DynSecError::NamespaceTaken(ns)) => {
                    debug!(tenant = tenant_id, attempt, namespace = %ns, "namespace claimed on save, regenerating");
                }
                Err(err) => return Err(err),
            }
        }
        Err(DynSecError::GenerationExhausted { what: "topic namespace", attempts: max })
    }

    /// Create one of the tenant's roles with its ACLs. Safe to repeat.
    pub async fn ensure_role(&self, tenant: &TenantIdentity, kind: RoleKind) -> Result<CommandResult, DynSecError> {
        let role = tenant.role_name(kind);
        let command = DynSecCommand::create_role(role, tenant.acls(kind));
        let result = self.executor.run(&command).await.into_result()?;
        info!(tenant = %tenant.tenant_id, role, normalized = result.normalized, "role ensured");
        Ok(result)
    }

    /// Delete one of the tenant's roles. An absent role counts as deleted.
    pub async fn delete_role(&self, tenant: &TenantIdentity, kind: RoleKind) -> Result<(), DynSecError> {
        let role = tenant.role_name(kind);
        match self.executor.run(&DynSecCommand::delete_role(role)).await.into_result() {
            Ok(_) => {
                info!(tenant = %tenant.tenant_id, role, "role deleted");
                Ok(())
            }
            Err(err) if err.broker_message() == Some(ROLE_NOT_FOUND) => {
                warn!(tenant = %tenant.tenant_id, role, "role already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Create a broker client holding one tenant role.
    ///
    /// Usernames are regenerated while the broker reports a collision. The
    /// credential is returned only once the broker has accepted it; persisting
    /// it is up to the caller (see [`issue_credential`](Self::issue_credential)).
    pub async fn create_credential(
        &self,
        tenant: &TenantIdentity,
        kind: RoleKind,
        display_name: &str,
    ) -> Result<Credential, DynSecError> {
        let role = tenant.role_name(kind);
        let max = self.generation.max_attempts;
        for attempt in 1..=max {
            let username = self.names.username(self.generation.username_len);
            let password = self.names.password(self.generation.password_len);
            let command = DynSecCommand::create_client(
                username.clone(),
                password.clone(),
                Some(display_name.to_string()),
                vec![RoleRef::new(role)],
            );
            match self.executor.run(&command).await.into_result() {
                Ok(_) => {
                    info!(tenant = %tenant.tenant_id, %username, role, "credential created");
                    return Ok(Credential {
                        username,
                        password,
                        display_name: display_name.to_string(),
                        role_name: role.to_string(),
                    });
                }
                Err(err) if err.broker_message() == Some(CLIENT_ALREADY_EXISTS) => {
                    debug!(tenant = %tenant.tenant_id, attempt, "username taken, regenerating");
                }
                Err(err) => return Err(err),
            }
        }
        Err(DynSecError::GenerationExhausted { what: "username", attempts: max })
    }

    /// Create a credential and record it in the store.
    ///
    /// If the store refuses the record the broker client is removed again.
    pub async fn issue_credential(
        &self,
        tenant_id: &str,
        kind: RoleKind,
        display_name: &str,
    ) -> Result<Credential, DynSecError> {
        let identity = self.identity(tenant_id).await?;
        let credential = self.create_credential(&identity, kind, display_name).await?;
        if let Err(err) = self.store.save_credential(tenant_id, &credential).await {
            error!(tenant = tenant_id, username = %credential.username, error = %err, "could not record credential");
            if let Err(cleanup) = self.delete_credential(&credential.username).await {
                error!(username = %credential.username, error = %cleanup, "orphaned broker client");
            }
            return Err(err);
        }
        Ok(credential)
    }

    /// Delete a broker client. An absent client counts as deleted.
    pub async fn delete_credential(&self, username: &str) -> Result<(), DynSecError> {
        match self.executor.run(&DynSecCommand::delete_client(username)).await.into_result() {
            Ok(_) => {
                info!(username, "credential deleted");
                Ok(())
            }
            Err(err) if err.broker_message() == Some(CLIENT_NOT_FOUND) => {
                warn!(username, "credential already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Delete a broker client and its store record.
    pub async fn revoke_credential(&self, username: &str) -> Result<(), DynSecError> {
        self.delete_credential(username).await?;
        self.store.delete_credential_record(username).await
    }

    /// Delete every credential the store holds for the tenant.
    ///
    /// Failures do not stop the sweep; they are collected in the result.
    pub async fn delete_all_credentials(&self, tenant: &TenantIdentity) -> Result<BulkDeletion, DynSecError> {
        let credentials = self.store.list_credentials(&tenant.tenant_id).await?;
        let mut outcome = BulkDeletion::default();
        for credential in credentials {
            let username = credential.username;
            match self.revoke_credential(&username).await {
                Ok(()) => outcome.deleted.push(username),
                Err(err) => {
                    warn!(tenant = %tenant.tenant_id, %username, error = %err, "credential deletion failed");
                    outcome.failed.push((username, err));
                }
            }
        }
        Ok(outcome)
    }

    /// Change a credential's display name on the broker, then in the store.
    pub async fn modify_credential(&self, username: &str, display_name: &str) -> Result<(), DynSecError> {
        if self.store.get_credential(username).await?.is_none() {
            return Err(DynSecError::Store(format!("no credential {username}")));
        }
        self.executor.run(&DynSecCommand::rename_client(username, display_name)).await.into_result()?;
        self.store.update_credential_name(username, display_name).await?;
        info!(username, display_name, "credential renamed");
        Ok(())
    }

    /// Bring a tenant to its provisioned state: identity, the three roles, an
    /// automation credential and one device credential.
    pub async fn provision_tenant(&self, tenant_id: &str) -> Result<ProvisionedTenant, DynSecError> {
        info!(tenant = tenant_id, "provisioning tenant");
        let identity = self.register_tenant(tenant_id).await.map_err(|err| log_step(tenant_id, "register", err))?;

        for kind in RoleKind::ALL {
            self.ensure_role(&identity, kind).await.map_err(|err| log_step(tenant_id, "ensure_role", err))?;
        }

        let existing = self.store.list_credentials(tenant_id).await?;
        let automation = match existing.iter().find(|c| c.role_name == identity.automation_role) {
            Some(c) => c.clone(),
            None => self
                .issue_credential(tenant_id, RoleKind::Automation, AUTOMATION_DISPLAY_NAME)
                .await
                .map_err(|err| log_step(tenant_id, "automation_credential", err))?,
        };
        let device = match existing.iter().find(|c| c.role_name == identity.device_role) {
            Some(c) => c.clone(),
            None => self
                .issue_credential(tenant_id, RoleKind::Device, EXAMPLE_DEVICE_DISPLAY_NAME)
                .await
                .map_err(|err| log_step(tenant_id, "device_credential", err))?,
        };

        info!(tenant = tenant_id, namespace = %identity.namespace, "tenant provisioned");
        Ok(ProvisionedTenant { identity, automation, device })
    }

    /// Remove a tenant's credentials and roles, then its identity.
    ///
    /// The identity is kept when anything failed so the call can be repeated.
    pub async fn deprovision_tenant(&self, tenant_id: &str) -> Result<DeprovisionReport, DynSecError> {
        info!(tenant = tenant_id, "deprovisioning tenant");
        let identity = self.identity(tenant_id).await?;
        let credentials = self.delete_all_credentials(&identity).await?;

        let mut roles_failed = Vec::new();
        for kind in RoleKind::ALL {
            if let Err(err) = self.delete_role(&identity, kind).await {
                error!(tenant = tenant_id, role = identity.role_name(kind), error = %err, "role deletion failed");
                roles_failed.push((kind, err));
            }
        }

        let report = DeprovisionReport { tenant_id: tenant_id.to_string(), credentials, roles_failed };
        if report.is_complete() {
            self.store.delete_tenant(tenant_id).await?;
            info!(tenant = tenant_id, "tenant deprovisioned");
        } else {
            warn!(
                tenant = tenant_id,
                credentials_failed = report.credentials.failed.len(),
                roles_failed = report.roles_failed.len(),
                "tenant partially deprovisioned"
            );
        }
        Ok(report)
    }

    /// Device credentials recorded for a tenant.
    pub async fn device_credentials(&self, tenant_id: &str) -> Result<Vec<Credential>, DynSecError> {
        let identity = self.identity(tenant_id).await?;
        let mut credentials = self.store.list_credentials(tenant_id).await?;
        credentials.retain(|c| c.role_name == identity.device_role);
        Ok(credentials)
    }

    /// The automation credential recorded for a tenant, if any.
    pub async fn automation_credential(&self, tenant_id: &str) -> Result<Option<Credential>, DynSecError> {
        let identity = self.identity(tenant_id).await?;
        let credentials = self.store.list_credentials(tenant_id).await?;
        Ok(credentials.into_iter().find(|c| c.role_name == identity.automation_role))
    }

    async fn identity(&self, tenant_id: &str) -> Result<TenantIdentity, DynSecError> {
        self.store
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| DynSecError::UnknownTenant(tenant_id.to_string()))
    }
}

fn log_step(tenant_id: &str, step: &'static str, err: DynSecError) -> DynSecError {
    error!(tenant = tenant_id, step, error = %err, "provisioning step failed");
    err
}
