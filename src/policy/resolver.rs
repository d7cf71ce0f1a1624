use std::collections::BTreeMap;
use std::sync::Arc;

use super::ModelPermissions;
use crate::types::Pk;

/// Permissions of a single role, computed per call from the caller's id
pub trait RolePolicy: Send + Sync {
    fn permissions(&self, caller_id: Option<&Pk>) -> ModelPermissions;
}

impl<F> RolePolicy for F
where
    F: Fn(Option<&Pk>) -> ModelPermissions + Send + Sync,
{
    fn permissions(&self, caller_id: Option<&Pk>) -> ModelPermissions {
        self(caller_id)
    }
}

/// Per-entity strategy mapping (role, caller id) to permissions
pub trait PolicyResolver: Send + Sync {
    fn resolve_policy(&self, role: &str, caller_id: Option<&Pk>) -> Option<ModelPermissions>;

    /// Roles known up front, checked at registration
    fn roles(&self) -> Vec<String> {
        vec![]
    }
}

/// Role name to policy table
#[derive(Clone, Default)]
pub struct RolePolicies {
    policies: BTreeMap<String, Arc<dyn RolePolicy>>,
}

impl RolePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role<F>(self, name: impl Into<String>, policy: F) -> Self
    where
        F: Fn(Option<&Pk>) -> ModelPermissions + Send + Sync + 'static,
    {
        self.role_policy(name, policy)
    }

    pub fn role_policy(mut self, name: impl Into<String>, policy: impl RolePolicy + 'static) -> Self {
        self.policies.insert(name.into(), Arc::new(policy));
        self
    }

    /// Same permissions for the role regardless of caller
    pub fn fixed(self, name: impl Into<String>, permissions: ModelPermissions) -> Self {
        self.role(name, move |_: Option<&Pk>| permissions.clone())
    }
}

impl PolicyResolver for RolePolicies {
    fn resolve_policy(&self, role: &str, caller_id: Option<&Pk>) -> Option<ModelPermissions> {
        self.policies.get(role).map(|policy| policy.permissions(caller_id))
    }

    fn roles(&self) -> Vec<String> {
        self.policies.keys().cloned().collect()
    }
}

impl std::fmt::Debug for RolePolicies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.policies.keys()).finish()
    }
}
