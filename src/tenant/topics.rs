//! Tenant topic namespaces, role names and ACL sets.
//!
//! Everything here is a pure function of the namespace: given the same
//! namespace the role names, topic patterns and ACLs are always identical.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::control::command::{AclEntry, AclType};
use crate::error::DynSecError;

/// Prefix of the automation role name.
pub const AUTOMATION_ROLE_PREFIX: &str = "automation-";
/// Prefix of the device role name.
pub const DEVICE_ROLE_PREFIX: &str = "device-";
/// Prefix of the bidirectional role name.
pub const BIDIRECTIONAL_ROLE_PREFIX: &str = "inout-";

/// Short opaque string that partitions a tenant's topics.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicNamespace(String);

impl TopicNamespace {
    /// Validate a namespace: non-empty, ASCII letters and digits only.
    ///
    /// Anything else could smuggle MQTT wildcards or level separators into
    /// the ACL patterns.
    pub fn new(raw: impl Into<String>) -> Result<Self, DynSecError> {
        let raw = raw.into();
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DynSecError::Config(format!("invalid topic namespace {raw:?}")));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TopicNamespace {
    type Error = DynSecError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<TopicNamespace> for String {
    fn from(ns: TopicNamespace) -> Self {
        ns.0
    }
}

/// The three per-tenant roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    /// Consumes device traffic, commands devices.
    Automation,
    /// Publishes telemetry, receives commands.
    Device,
    /// Symmetric traffic on the shared topic tree.
    Bidirectional,
}

impl RoleKind {
    /// All kinds, in provisioning order.
    pub const ALL: [RoleKind; 3] = [RoleKind::Automation, RoleKind::Device, RoleKind::Bidirectional];

    /// Role name prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            RoleKind::Automation => AUTOMATION_ROLE_PREFIX,
            RoleKind::Device => DEVICE_ROLE_PREFIX,
            RoleKind::Bidirectional => BIDIRECTIONAL_ROLE_PREFIX,
        }
    }

    /// Role name for a namespace.
    pub fn role_name(self, ns: &TopicNamespace) -> String {
        format!("{}{}", self.prefix(), ns)
    }

    /// ACLs granted by this role inside `ns`.
    pub fn acls(self, ns: &TopicNamespace) -> Vec<AclEntry> {
        let topics = TopicPatterns::derive(ns);
        match self {
            RoleKind::Automation => vec![
                AclEntry::allow(AclType::SubscribePattern, topics.inbound),
                AclEntry::allow(AclType::PublishClientSend, topics.outbound),
            ],
            RoleKind::Device => vec![
                AclEntry::allow(AclType::SubscribePattern, topics.outbound),
                AclEntry::allow(AclType::PublishClientSend, topics.inbound),
            ],
            RoleKind::Bidirectional => vec![
                AclEntry::allow(AclType::SubscribePattern, topics.bidirectional.clone()),
                AclEntry::allow(AclType::PublishClientSend, topics.bidirectional),
            ],
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoleKind::Automation => "automation",
            RoleKind::Device => "device",
            RoleKind::Bidirectional => "bidirectional",
        };
        f.write_str(s)
    }
}

/// Topic wildcard patterns of one namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicPatterns {
    /// `in/<ns>/#`: device to automation.
    pub inbound: String,
    /// `out/<ns>/#`: automation to device.
    pub outbound: String,
    /// `inout/<ns>/#`: shared.
    pub bidirectional: String,
}

impl TopicPatterns {
    pub fn derive(ns: &TopicNamespace) -> Self {
        Self {
            inbound: format!("in/{ns}/#"),
            outbound: format!("out/{ns}/#"),
            bidirectional: format!("inout/{ns}/#"),
        }
    }
}

/// A tenant's namespace and derived role names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantIdentity {
    /// Tenant id in the surrounding application.
    pub tenant_id: String,
    /// Topic namespace.
    pub namespace: TopicNamespace,
    /// `automation-<ns>`.
    pub automation_role: String,
    /// `device-<ns>`.
    pub device_role: String,
    /// `inout-<ns>`.
    pub bidirectional_role: String,
}

impl TenantIdentity {
    /// Identity with role names derived from `namespace`.
    pub fn derive(tenant_id: impl Into<String>, namespace: TopicNamespace) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            automation_role: RoleKind::Automation.role_name(&namespace),
            device_role: RoleKind::Device.role_name(&namespace),
            bidirectional_role: RoleKind::Bidirectional.role_name(&namespace),
            namespace,
        }
    }

    pub fn role_name(&self, kind: RoleKind) -> &str {
        match kind {
            RoleKind::Automation => &self.automation_role,
            RoleKind::Device => &self.device_role,
            RoleKind::Bidirectional => &self.bidirectional_role,
        }
    }

    /// Which of this tenant's roles `rolename` is.
    pub fn kind_of(&self, rolename: &str) -> Option<RoleKind> {
        RoleKind::ALL.into_iter().find(|kind| self.role_name(*kind) == rolename)
    }

    pub fn acls(&self, kind: RoleKind) -> Vec<AclEntry> {
        kind.acls(&self.namespace)
    }

    pub fn topics(&self) -> TopicPatterns {
        TopicPatterns::derive(&self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ns(s: &str) -> TopicNamespace {
        TopicNamespace::new(s).unwrap()
    }

    #[test]
    fn namespace_rejects_topic_syntax() {
        for bad in ["", "ab/cd", "ab#", "a+b", "ab cd", "ümlaut"] {
            assert!(TopicNamespace::new(bad).is_err(), "{bad:?}");
        }
        assert_eq!(ns("ab12cd").as_str(), "ab12cd");
    }

    #[test]
    fn role_names_are_disjoint_across_kinds_and_namespaces() {
        let a = TenantIdentity::derive("t1", ns("ab12cd"));
        let b = TenantIdentity::derive("t2", ns("zz99yy"));
        let mut names: Vec<&str> = RoleKind::ALL
            .iter()
            .flat_map(|k| [a.role_name(*k), b.role_name(*k)])
            .collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 6);
        assert_eq!(a.kind_of("device-ab12cd"), Some(RoleKind::Device));
        assert_eq!(a.kind_of("device-zz99yy"), None);
    }

    #[test]
    fn automation_and_device_acls_mirror() {
        let id = TenantIdentity::derive("t", ns("ab12cd"));
        let v = serde_json::to_value(id.acls(RoleKind::Automation)).unwrap();
        assert_eq!(
            v,
            json!([
                {"acltype": "subscribePattern", "topic": "in/ab12cd/#", "priority": -1, "allow": true},
                {"acltype": "publishClientSend", "topic": "out/ab12cd/#", "priority": -1, "allow": true}
            ])
        );
        let device = id.acls(RoleKind::Device);
        assert_eq!(device[0].topic, "out/ab12cd/#");
        assert_eq!(device[1].topic, "in/ab12cd/#");
    }

    #[test]
    fn bidirectional_stays_on_shared_tree() {
        let acls = RoleKind::Bidirectional.acls(&ns("ab12cd"));
        assert!(acls.iter().all(|a| a.topic == "inout/ab12cd/#"));
        assert_eq!(acls.len(), 2);
    }

    #[test]
    fn identity_serde_validates_namespace() {
        let id = TenantIdentity::derive("t", ns("ab12cd"));
        let v = serde_json::to_value(&id).unwrap();
        assert_eq!(v["namespace"], "ab12cd");
        let mut bad = v.clone();
        bad["namespace"] = json!("in/#");
        assert!(serde_json::from_value::<TenantIdentity>(bad).is_err());
    }
}
