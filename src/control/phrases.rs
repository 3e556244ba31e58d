//! Error texts reported by the dynamic-security plugin.
//!
//! Matching is exact: these strings are compared verbatim against the
//! `error` field of a response.

/// `createRole` on an existing role name.
pub const ROLE_ALREADY_EXISTS: &str = "Role already exists";
/// Any role lookup that found nothing.
pub const ROLE_NOT_FOUND: &str = "Role not found";
/// `createClient` on an existing username.
pub const CLIENT_ALREADY_EXISTS: &str = "Client already exists";
/// Any client lookup that found nothing.
pub const CLIENT_NOT_FOUND: &str = "Client not found";
/// `createGroup` on an existing group name.
pub const GROUP_ALREADY_EXISTS: &str = "Group already exists";
/// Any group lookup that found nothing.
pub const GROUP_NOT_FOUND: &str = "Group not found";
/// `addRoleACL` for an acltype/topic pair the role already holds.
pub const ACL_ALREADY_EXISTS: &str = "ACL with this topic already exists";
/// `removeRoleACL` for a pair the role does not hold.
pub const ACL_NOT_FOUND: &str = "ACL not found";
/// `addClientRole` for a role the client already holds.
pub const CLIENT_ALREADY_IN_ROLE: &str = "Client is already in this role";
/// `addGroupRole` for a role the group already holds.
pub const GROUP_ALREADY_IN_ROLE: &str = "Group is already in this role";
/// `addGroupClient` for a client already in the group.
pub const CLIENT_ALREADY_IN_GROUP: &str = "Client is already in this group";
/// Request could not be parsed by the plugin.
pub const INVALID_JSON: &str = "Invalid JSON";
/// Command name the plugin does not know.
pub const UNKNOWN_COMMAND: &str = "Unknown command";
