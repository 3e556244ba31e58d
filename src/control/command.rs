//! Dynamic-security command catalogue.
//!
//! One variant per command understood by the broker's dynamic-security plugin.
//! Serialization produces exactly the object that goes inside the
//! `{"commands":[...]}` envelope: the variant name becomes the `command` field and
//! optional parameters that are absent (or empty lists) are omitted.

use serde::{Deserialize, Serialize};

/// Priority the plugin uses when none is given.
pub const DEFAULT_PRIORITY: i64 = -1;

/// ACL kinds accepted by the plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AclType {
    /// Subscribe with wildcard pattern matching.
    SubscribePattern,
    /// Subscribe with literal topic matching.
    SubscribeLiteral,
    /// Client may publish to the topic.
    PublishClientSend,
    /// Client may receive messages published to the topic.
    PublishClientReceive,
    /// Default-access subscribe switch.
    Subscribe,
    /// Default-access unsubscribe switch.
    Unsubscribe,
}

impl AclType {
    /// Wire name of the ACL kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AclType::SubscribePattern => "subscribePattern",
            AclType::SubscribeLiteral => "subscribeLiteral",
            AclType::PublishClientSend => "publishClientSend",
            AclType::PublishClientReceive => "publishClientReceive",
            AclType::Subscribe => "subscribe",
            AclType::Unsubscribe => "unsubscribe",
        }
    }
}

/// Role ACL entry. Field order is the wire order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AclEntry {
    /// ACL kind.
    pub acltype: AclType,
    /// Topic or topic pattern.
    pub topic: String,
    /// Priority among the role's ACLs.
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// Allow or deny.
    pub allow: bool,
}

impl AclEntry {
    /// Allow entry with the default priority.
    pub fn allow(acltype: AclType, topic: impl Into<String>) -> Self {
        Self { acltype, topic: topic.into(), priority: DEFAULT_PRIORITY, allow: true }
    }
}

/// Default-access switch used by `setDefaultACLAccess`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultAcl {
    /// ACL kind.
    pub acltype: AclType,
    /// Allow or deny.
    pub allow: bool,
}

/// Role reference inside a client or group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    /// Role name.
    pub rolename: String,
    /// Priority of the role for the holder.
    #[serde(default = "default_priority")]
    pub priority: i64,
}

impl RoleRef {
    /// Reference with the default priority.
    pub fn new(rolename: impl Into<String>) -> Self {
        Self { rolename: rolename.into(), priority: DEFAULT_PRIORITY }
    }
}

/// Group reference inside a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    /// Group name.
    pub groupname: String,
    /// Priority of the group for the client.
    #[serde(default = "default_priority")]
    pub priority: i64,
}

/// Client reference inside a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRef {
    /// Client username.
    pub username: String,
    /// Priority of the group for the client.
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

fn default_count() -> i64 {
    -1
}

/// A single dynamic-security command.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
#[non_exhaustive]
pub enum DynSecCommand {
    /// Set what clients may do when no ACL matches.
    #[serde(rename = "setDefaultACLAccess")]
    SetDefaultAclAccess { acls: Vec<DefaultAcl> },
    /// Read the default access switches.
    #[serde(rename = "getDefaultACLAccess")]
    GetDefaultAclAccess,
    /// Create a client identity.
    CreateClient {
        username: String,
        password: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clientid: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        textname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        textdescription: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        groups: Vec<GroupRef>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        roles: Vec<RoleRef>,
    },
    DeleteClient { username: String },
    EnableClient { username: String },
    /// Disable login and kick connected sessions with this username.
    DisableClient { username: String },
    GetClient { username: String },
    ListClients {
        #[serde(default)]
        verbose: bool,
        #[serde(default = "default_count")]
        count: i64,
        #[serde(default)]
        offset: i64,
    },
    ModifyClient {
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clientid: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        textname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        textdescription: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        roles: Vec<RoleRef>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        groups: Vec<GroupRef>,
    },
    /// Set (or clear, with an empty string) the client id bound to a username.
    SetClientId { username: String, clientid: String },
    SetClientPassword { username: String, password: String },
    AddClientRole {
        username: String,
        rolename: String,
        #[serde(default = "default_priority")]
        priority: i64,
    },
    RemoveClientRole { username: String, rolename: String },
    CreateGroup {
        groupname: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        roles: Vec<RoleRef>,
    },
    DeleteGroup { groupname: String },
    GetGroup { groupname: String },
    ListGroups {
        #[serde(default)]
        verbose: bool,
        #[serde(default = "default_count")]
        count: i64,
        #[serde(default)]
        offset: i64,
    },
    ModifyGroup {
        groupname: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        textname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        textdescription: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        roles: Vec<RoleRef>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        clients: Vec<ClientRef>,
    },
    AddGroupClient {
        groupname: String,
        username: String,
        #[serde(default = "default_priority")]
        priority: i64,
    },
    RemoveGroupClient { groupname: String, username: String },
    AddGroupRole {
        groupname: String,
        rolename: String,
        #[serde(default = "default_priority")]
        priority: i64,
    },
    RemoveGroupRole { groupname: String, rolename: String },
    /// Group applied to unauthenticated clients.
    SetAnonymousGroup { groupname: String },
    GetAnonymousGroup,
    CreateRole {
        rolename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        textname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        textdescription: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        acls: Vec<AclEntry>,
    },
    GetRole { rolename: String },
    ListRoles {
        #[serde(default)]
        verbose: bool,
        #[serde(default = "default_count")]
        count: i64,
        #[serde(default)]
        offset: i64,
    },
    ModifyRole {
        rolename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        textname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        textdescription: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        acls: Vec<AclEntry>,
    },
    DeleteRole { rolename: String },
    #[serde(rename = "addRoleACL")]
    AddRoleAcl {
        rolename: String,
        acltype: AclType,
        topic: String,
        #[serde(default = "default_priority")]
        priority: i64,
        allow: bool,
    },
    #[serde(rename = "removeRoleACL")]
    RemoveRoleAcl { rolename: String, acltype: AclType, topic: String },
}

impl DynSecCommand {
    /// Wire name of the command, as echoed in the response's `command` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetDefaultAclAccess { .. } => "setDefaultACLAccess",
            Self::GetDefaultAclAccess => "getDefaultACLAccess",
            Self::CreateClient { .. } => "createClient",
            Self::DeleteClient { .. } => "deleteClient",
            Self::EnableClient { .. } => "enableClient",
            Self::DisableClient { .. } => "disableClient",
            Self::GetClient { .. } => "getClient",
            Self::ListClients { .. } => "listClients",
            Self::ModifyClient { .. } => "modifyClient",
            Self::SetClientId { .. } => "setClientId",
            Self::SetClientPassword { .. } => "setClientPassword",
            Self::AddClientRole { .. } => "addClientRole",
            Self::RemoveClientRole { .. } => "removeClientRole",
            Self::CreateGroup { .. } => "createGroup",
            Self::DeleteGroup { .. } => "deleteGroup",
            Self::GetGroup { .. } => "getGroup",
            Self::ListGroups { .. } => "listGroups",
            Self::ModifyGroup { .. } => "modifyGroup",
            Self::AddGroupClient { .. } => "addGroupClient",
            Self::RemoveGroupClient { .. } => "removeGroupClient",
            Self::AddGroupRole { .. } => "addGroupRole",
            Self::RemoveGroupRole { .. } => "removeGroupRole",
            Self::SetAnonymousGroup { .. } => "setAnonymousGroup",
            Self::GetAnonymousGroup => "getAnonymousGroup",
            Self::CreateRole { .. } => "createRole",
            Self::GetRole { .. } => "getRole",
            Self::ListRoles { .. } => "listRoles",
            Self::ModifyRole { .. } => "modifyRole",
            Self::DeleteRole { .. } => "deleteRole",
            Self::AddRoleAcl { .. } => "addRoleACL",
            Self::RemoveRoleAcl { .. } => "removeRoleACL",
        }
    }

    /// `createRole` with ACLs and no descriptive text.
    pub fn create_role(rolename: impl Into<String>, acls: Vec<AclEntry>) -> Self {
        Self::CreateRole { rolename: rolename.into(), textname: None, textdescription: None, acls }
    }

    /// `deleteRole`.
    pub fn delete_role(rolename: impl Into<String>) -> Self {
        Self::DeleteRole { rolename: rolename.into() }
    }

    /// `createClient` with a display name and role assignments.
    pub fn create_client(
        username: impl Into<String>,
        password: impl Into<String>,
        textname: Option<String>,
        roles: Vec<RoleRef>,
    ) -> Self {
        Self::CreateClient {
            username: username.into(),
            password: password.into(),
            clientid: None,
            textname,
            textdescription: None,
            groups: Vec::new(),
            roles,
        }
    }

    /// `deleteClient`.
    pub fn delete_client(username: impl Into<String>) -> Self {
        Self::DeleteClient { username: username.into() }
    }

    /// `modifyClient` touching only the display name.
    pub fn rename_client(username: impl Into<String>, textname: impl Into<String>) -> Self {
        Self::ModifyClient {
            username: username.into(),
            clientid: None,
            password: None,
            textname: Some(textname.into()),
            textdescription: None,
            roles: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// `getClient`.
    pub fn get_client(username: impl Into<String>) -> Self {
        Self::GetClient { username: username.into() }
    }

    /// `setDefaultACLAccess` with all four switches.
    pub fn default_acl_access(
        publish_client_send: bool,
        publish_client_receive: bool,
        subscribe: bool,
        unsubscribe: bool,
    ) -> Self {
        Self::SetDefaultAclAccess {
            acls: vec![
                DefaultAcl { acltype: AclType::PublishClientSend, allow: publish_client_send },
                DefaultAcl { acltype: AclType::PublishClientReceive, allow: publish_client_receive },
                DefaultAcl { acltype: AclType::Subscribe, allow: subscribe },
                DefaultAcl { acltype: AclType::Unsubscribe, allow: unsubscribe },
            ],
        }
    }
}

// Passwords travel inside some variants; keep them out of logs.
impl std::fmt::Debug for DynSecCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("DynSecCommand");
        d.field("command", &self.name());
        match self {
            Self::CreateClient { username, textname, roles, .. } => {
                d.field("username", username).field("textname", textname).field("roles", roles);
            }
            Self::ModifyClient { username, textname, .. } => {
                d.field("username", username).field("textname", textname);
            }
            Self::SetClientPassword { username, .. }
            | Self::DeleteClient { username }
            | Self::EnableClient { username }
            | Self::DisableClient { username }
            | Self::GetClient { username } => {
                d.field("username", username);
            }
            Self::CreateRole { rolename, acls, .. } | Self::ModifyRole { rolename, acls, .. } => {
                d.field("rolename", rolename).field("acls", acls);
            }
            Self::DeleteRole { rolename } | Self::GetRole { rolename } => {
                d.field("rolename", rolename);
            }
            _ => {}
        }
        d.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_role_omits_absent_text_fields() {
        let cmd = DynSecCommand::create_role(
            "automation-ab12cd",
            vec![AclEntry::allow(AclType::SubscribePattern, "in/ab12cd/#")],
        );
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            v,
            json!({
                "command": "createRole",
                "rolename": "automation-ab12cd",
                "acls": [{"acltype": "subscribePattern", "topic": "in/ab12cd/#", "priority": -1, "allow": true}]
            })
        );
    }

    #[test]
    fn acl_command_names_keep_uppercase_acl() {
        let cmd = DynSecCommand::AddRoleAcl {
            rolename: "r".into(),
            acltype: AclType::PublishClientSend,
            topic: "t".into(),
            priority: 5,
            allow: false,
        };
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["command"], "addRoleACL");
        assert_eq!(cmd.name(), "addRoleACL");
        assert_eq!(DynSecCommand::default_acl_access(false, true, false, true).name(), "setDefaultACLAccess");
    }

    #[test]
    fn unit_command_serializes_to_name_only() {
        let v = serde_json::to_value(DynSecCommand::GetAnonymousGroup).unwrap();
        assert_eq!(v, json!({"command": "getAnonymousGroup"}));
    }

    #[test]
    fn name_matches_serialized_tag_for_every_builder() {
        let cmds = [
            DynSecCommand::delete_role("r"),
            DynSecCommand::create_client("u", "p", None, vec![]),
            DynSecCommand::delete_client("u"),
            DynSecCommand::rename_client("u", "Kitchen sensor"),
            DynSecCommand::get_client("u"),
            DynSecCommand::ListClients { verbose: false, count: -1, offset: 0 },
        ];
        for cmd in cmds {
            let v = serde_json::to_value(&cmd).unwrap();
            assert_eq!(v["command"], cmd.name());
        }
    }

    #[test]
    fn list_defaults_apply_on_deserialize() {
        let cmd: DynSecCommand = serde_json::from_value(json!({"command": "listRoles"})).unwrap();
        assert_eq!(cmd, DynSecCommand::ListRoles { verbose: false, count: -1, offset: 0 });
    }

    #[test]
    fn debug_never_prints_passwords() {
        let cmd = DynSecCommand::create_client("user", "s3cret-pass", Some("Dev".into()), vec![]);
        assert!(!format!("{cmd:?}").contains("s3cret-pass"));
        let cmd = DynSecCommand::SetClientPassword { username: "user".into(), password: "s3cret-pass".into() };
        assert!(!format!("{cmd:?}").contains("s3cret-pass"));
    }
}
