//! In-memory dynamic-security plugin.
//!
//! `InMemoryDynSec` answers the same commands with the same error texts as the
//! broker plugin, keeps roles, clients and groups in ordered maps, and lets
//! tests inject faults per command (and optionally per username, role or group
//! name). Connections made through
//! [`ChannelConnector`](super::transport_channel::ChannelConnector) are counted
//! so tests can check that every session was closed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value as JsonValue};

use super::codec::ResponseEnvelope;
use super::command::{AclEntry, ClientRef, DefaultAcl, DynSecCommand, GroupRef, RoleRef};
use super::phrases::*;
use crate::config::ControlTopics;

/// Misbehaviour injected into the emulator.
#[derive(Clone, Debug, PartialEq)]
pub enum Fault {
    /// Process nothing and never answer.
    DropResponse,
    /// Answer as if a different command had been sent.
    RespondAs(String),
    /// Answer with a payload that is not a valid response envelope.
    Malformed,
    /// Answer with this error text without touching state.
    Error(String),
    /// Process normally but deliver the answer after a delay.
    Delay(Duration),
}

#[derive(Clone, Debug)]
struct FaultRule {
    command: String,
    subject: Option<String>,
    fault: Fault,
    remaining: Option<usize>,
}

#[derive(Clone, Debug, Default)]
struct RoleRecord {
    textname: Option<String>,
    textdescription: Option<String>,
    acls: Vec<AclEntry>,
}

#[derive(Clone, Debug, Default)]
struct ClientRecord {
    password: String,
    clientid: Option<String>,
    textname: Option<String>,
    textdescription: Option<String>,
    roles: Vec<RoleRef>,
    disabled: bool,
}

#[derive(Clone, Debug, Default)]
struct GroupRecord {
    textname: Option<String>,
    textdescription: Option<String>,
    roles: Vec<RoleRef>,
    clients: Vec<ClientRef>,
}

#[derive(Debug, Default)]
struct State {
    roles: BTreeMap<String, RoleRecord>,
    clients: BTreeMap<String, ClientRecord>,
    groups: BTreeMap<String, GroupRecord>,
    anonymous_group: Option<String>,
    default_acl: Vec<DefaultAcl>,
    faults: Vec<FaultRule>,
    received: Vec<String>,
}

/// What the link should do with a processed request.
#[derive(Debug)]
pub(crate) enum Reply {
    Send(Vec<u8>),
    Delayed(Vec<u8>, Duration),
    Drop,
}

#[derive(Debug)]
struct Shared {
    admin_username: String,
    admin_password: String,
    topics: ControlTopics,
    state: Mutex<State>,
    withhold_suback: AtomicBool,
    open: AtomicUsize,
    sessions: AtomicUsize,
}

/// Shared handle to an emulated dynamic-security plugin.
#[derive(Clone, Debug)]
pub struct InMemoryDynSec {
    shared: Arc<Shared>,
}

impl InMemoryDynSec {
    /// Emulator on the default control topics accepting one admin identity.
    pub fn new(admin_username: impl Into<String>, admin_password: impl Into<String>) -> Self {
        Self::with_topics(admin_username, admin_password, ControlTopics::default())
    }

    /// Emulator on custom control topics.
    pub fn with_topics(
        admin_username: impl Into<String>,
        admin_password: impl Into<String>,
        topics: ControlTopics,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                admin_username: admin_username.into(),
                admin_password: admin_password.into(),
                topics,
                state: Mutex::new(State::default()),
                withhold_suback: AtomicBool::new(false),
                open: AtomicUsize::new(0),
                sessions: AtomicUsize::new(0),
            }),
        }
    }

    /// Inject a fault for every matching command until cleared.
    ///
    /// `subject` narrows the rule to one username, role name or group name.
    pub fn inject(&self, command: &str, subject: Option<&str>, fault: Fault) {
        self.push_rule(command, subject, fault, None);
    }

    /// Inject a fault for the next matching command only.
    pub fn inject_once(&self, command: &str, subject: Option<&str>, fault: Fault) {
        self.push_rule(command, subject, fault, Some(1));
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Stop (or resume) acknowledging subscriptions.
    pub fn withhold_subscribe_ack(&self, withhold: bool) {
        self.shared.withhold_suback.store(withhold, Ordering::SeqCst);
    }

    /// Command names received so far, in order.
    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Connections opened since creation.
    pub fn sessions_opened(&self) -> usize {
        self.shared.sessions.load(Ordering::SeqCst)
    }

    /// Role names, sorted.
    pub fn roles(&self) -> Vec<String> {
        self.lock().roles.keys().cloned().collect()
    }

    /// ACLs of a role.
    pub fn role_acls(&self, rolename: &str) -> Option<Vec<AclEntry>> {
        self.lock().roles.get(rolename).map(|r| r.acls.clone())
    }

    /// Usernames, sorted.
    pub fn clients(&self) -> Vec<String> {
        self.lock().clients.keys().cloned().collect()
    }

    /// Role names held by a client.
    pub fn client_roles(&self, username: &str) -> Option<Vec<String>> {
        self.lock()
            .clients
            .get(username)
            .map(|c| c.roles.iter().map(|r| r.rolename.clone()).collect())
    }

    /// Display name of a client.
    pub fn client_textname(&self, username: &str) -> Option<String> {
        self.lock().clients.get(username).and_then(|c| c.textname.clone())
    }

    /// Whether `password` is the client's current password.
    pub fn check_password(&self, username: &str, password: &str) -> bool {
        self.lock().clients.get(username).is_some_and(|c| c.password == password)
    }

    /// Create a client directly, bypassing the control channel.
    pub fn insert_client(&self, username: &str, password: &str) {
        self.lock().clients.insert(
            username.to_string(),
            ClientRecord { password: password.to_string(), ..ClientRecord::default() },
        );
    }

    pub(crate) fn topics(&self) -> &ControlTopics {
        &self.shared.topics
    }

    pub(crate) fn authenticate(&self, username: &str, password: &str) -> bool {
        username == self.shared.admin_username && password == self.shared.admin_password
    }

    pub(crate) fn acks_subscriptions(&self) -> bool {
        !self.shared.withhold_suback.load(Ordering::SeqCst)
    }

    pub(crate) fn connection_opened(&self) {
        self.shared.open.fetch_add(1, Ordering::SeqCst);
        self.shared.sessions.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn connection_closed(&self) {
        self.shared.open.fetch_sub(1, Ordering::SeqCst);
    }

    /// Process one request payload from the control channel.
    pub(crate) fn handle(&self, payload: &[u8]) -> Reply {
        let commands = match serde_json::from_slice::<JsonValue>(payload)
            .ok()
            .and_then(|v| v.get("commands").and_then(JsonValue::as_array).cloned())
        {
            Some(commands) => commands,
            None => return Reply::Send(envelope(vec![json!({"command": "Unknown", "error": INVALID_JSON})])),
        };

        let mut state = self.lock();
        let mut responses = Vec::with_capacity(commands.len());
        let mut delay = None;
        for raw in commands {
            let name = raw.get("command").and_then(JsonValue::as_str).unwrap_or("Unknown").to_string();
            state.received.push(name.clone());
            let command = match serde_json::from_value::<DynSecCommand>(raw) {
                Ok(command) => command,
                Err(_) => {
                    responses.push(json!({"command": name, "error": UNKNOWN_COMMAND}));
                    continue;
                }
            };
            match state.take_fault(&name, subject_of(&command)) {
                Some(Fault::DropResponse) => return Reply::Drop,
                Some(Fault::Malformed) => return Reply::Send(br#"{"responses":"#.to_vec()),
                Some(Fault::RespondAs(other)) => responses.push(json!({"command": other})),
                Some(Fault::Error(message)) => responses.push(json!({"command": name, "error": message})),
                Some(Fault::Delay(d)) => {
                    delay = Some(d);
                    responses.push(state.apply(&command));
                }
                None => responses.push(state.apply(&command)),
            }
        }

        let bytes = envelope(responses);
        match delay {
            Some(d) => Reply::Delayed(bytes, d),
            None => Reply::Send(bytes),
        }
    }

    fn push_rule(&self, command: &str, subject: Option<&str>, fault: Fault, remaining: Option<usize>) {
        self.lock().faults.push(FaultRule {
            command: command.to_string(),
            subject: subject.map(str::to_string),
            fault,
            remaining,
        });
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn envelope(responses: Vec<JsonValue>) -> Vec<u8> {
    serde_json::to_vec(&ResponseEnvelope { responses }).unwrap_or_default()
}

fn subject_of(command: &DynSecCommand) -> Option<&str> {
    use DynSecCommand as C;
    match command {
        C::CreateClient { username, .. }
        | C::DeleteClient { username }
        | C::EnableClient { username }
        | C::DisableClient { username }
        | C::GetClient { username }
        | C::ModifyClient { username, .. }
        | C::SetClientId { username, .. }
        | C::SetClientPassword { username, .. }
        | C::AddClientRole { username, .. }
        | C::RemoveClientRole { username, .. } => Some(username),
        C::CreateRole { rolename, .. }
        | C::GetRole { rolename }
        | C::ModifyRole { rolename, .. }
        | C::DeleteRole { rolename }
        | C::AddRoleAcl { rolename, .. }
        | C::RemoveRoleAcl { rolename, .. } => Some(rolename),
        C::CreateGroup { groupname, .. }
        | C::DeleteGroup { groupname }
        | C::GetGroup { groupname }
        | C::ModifyGroup { groupname, .. }
        | C::AddGroupClient { groupname, .. }
        | C::RemoveGroupClient { groupname, .. }
        | C::AddGroupRole { groupname, .. }
        | C::RemoveGroupRole { groupname, .. }
        | C::SetAnonymousGroup { groupname } => Some(groupname),
        C::SetDefaultAclAccess { .. }
        | C::GetDefaultAclAccess
        | C::ListClients { .. }
        | C::ListGroups { .. }
        | C::GetAnonymousGroup
        | C::ListRoles { .. } => None,
    }
}

fn page<'a>(names: impl Iterator<Item = &'a String>, count: i64, offset: i64) -> Vec<String> {
    let skipped = names.skip(usize::try_from(offset).unwrap_or(0)).cloned();
    match usize::try_from(count) {
        Ok(count) => skipped.take(count).collect(),
        Err(_) => skipped.collect(),
    }
}

type Outcome = Result<Option<JsonValue>, &'static str>;

impl State {
    fn take_fault(&mut self, command: &str, subject: Option<&str>) -> Option<Fault> {
        let idx = self.faults.iter().position(|rule| {
            rule.command == command && (rule.subject.is_none() || rule.subject.as_deref() == subject)
        })?;
        let fault = self.faults[idx].fault.clone();
        if let Some(remaining) = self.faults[idx].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.faults.remove(idx);
            }
        }
        Some(fault)
    }

    fn apply(&mut self, command: &DynSecCommand) -> JsonValue {
        match self.exec(command) {
            Ok(Some(data)) => json!({"command": command.name(), "data": data}),
            Ok(None) => json!({"command": command.name()}),
            Err(message) => json!({"command": command.name(), "error": message}),
        }
    }

    fn require_role(&self, rolename: &str) -> Result<(), &'static str> {
        if self.roles.contains_key(rolename) {
            Ok(())
        } else {
            Err(ROLE_NOT_FOUND)
        }
    }

    fn require_roles(&self, roles: &[RoleRef]) -> Result<(), &'static str> {
        roles.iter().try_for_each(|r| self.require_role(&r.rolename))
    }

    fn require_client(&self, username: &str) -> Result<(), &'static str> {
        if self.clients.contains_key(username) {
            Ok(())
        } else {
            Err(CLIENT_NOT_FOUND)
        }
    }

    fn client_mut(&mut self, username: &str) -> Result<&mut ClientRecord, &'static str> {
        self.clients.get_mut(username).ok_or(CLIENT_NOT_FOUND)
    }

    fn group_mut(&mut self, groupname: &str) -> Result<&mut GroupRecord, &'static str> {
        self.groups.get_mut(groupname).ok_or(GROUP_NOT_FOUND)
    }

    fn client_groups(&self, username: &str) -> Vec<GroupRef> {
        self.groups
            .iter()
            .filter_map(|(name, g)| {
                g.clients
                    .iter()
                    .find(|c| c.username == username)
                    .map(|c| GroupRef { groupname: name.clone(), priority: c.priority })
            })
            .collect()
    }

    fn client_json(&self, username: &str, c: &ClientRecord) -> JsonValue {
        json!({
            "username": username,
            "clientid": c.clientid,
            "textname": c.textname,
            "textdescription": c.textdescription,
            "roles": c.roles,
            "groups": self.client_groups(username),
            "disabled": c.disabled,
        })
    }

    fn role_json(name: &str, r: &RoleRecord) -> JsonValue {
        json!({
            "rolename": name,
            "textname": r.textname,
            "textdescription": r.textdescription,
            "acls": r.acls,
        })
    }

    fn group_json(name: &str, g: &GroupRecord) -> JsonValue {
        json!({
            "groupname": name,
            "textname": g.textname,
            "textdescription": g.textdescription,
            "roles": g.roles,
            "clients": g.clients,
        })
    }

    fn set_memberships(&mut self, username: &str, groups: &[GroupRef]) {
        for group in self.groups.values_mut() {
            group.clients.retain(|c| c.username != username);
        }
        for g in groups {
            if let Some(group) = self.groups.get_mut(&g.groupname) {
                group.clients.push(ClientRef { username: username.to_string(), priority: g.priority });
            }
        }
    }

    fn exec(&mut self, command: &DynSecCommand) -> Outcome {
        use DynSecCommand as C;
        match command {
            C::SetDefaultAclAccess { acls } => {
                for acl in acls {
                    match self.default_acl.iter_mut().find(|d| d.acltype == acl.acltype) {
                        Some(existing) => existing.allow = acl.allow,
                        None => self.default_acl.push(acl.clone()),
                    }
                }
                Ok(None)
            }
            C::GetDefaultAclAccess => Ok(Some(json!({ "acls": self.default_acl }))),
            C::CreateClient { username, password, clientid, textname, textdescription, groups, roles } => {
                if self.clients.contains_key(username) {
                    return Err(CLIENT_ALREADY_EXISTS);
                }
                self.require_roles(roles)?;
                if groups.iter().any(|g| !self.groups.contains_key(&g.groupname)) {
                    return Err(GROUP_NOT_FOUND);
                }
                self.clients.insert(
                    username.clone(),
                    ClientRecord {
                        password: password.clone(),
                        clientid: clientid.clone(),
                        textname: textname.clone(),
                        textdescription: textdescription.clone(),
                        roles: roles.clone(),
                        disabled: false,
                    },
                );
                self.set_memberships(username, groups);
                Ok(None)
            }
            C::DeleteClient { username } => {
                self.clients.remove(username).ok_or(CLIENT_NOT_FOUND)?;
                self.set_memberships(username, &[]);
                Ok(None)
            }
            C::EnableClient { username } => {
                self.client_mut(username)?.disabled = false;
                Ok(None)
            }
            C::DisableClient { username } => {
                self.client_mut(username)?.disabled = true;
                Ok(None)
            }
            C::GetClient { username } => {
                let client = self.clients.get(username).ok_or(CLIENT_NOT_FOUND)?;
                Ok(Some(json!({ "client": self.client_json(username, client) })))
            }
            C::ListClients { verbose, count, offset } => {
                let names = page(self.clients.keys(), *count, *offset);
                let clients: Vec<JsonValue> = if *verbose {
                    names
                        .iter()
                        .filter_map(|n| self.clients.get(n).map(|c| self.client_json(n, c)))
                        .collect()
                } else {
                    names.into_iter().map(JsonValue::from).collect()
                };
                Ok(Some(json!({ "totalCount": self.clients.len(), "clients": clients })))
            }
            C::ModifyClient { username, clientid, password, textname, textdescription, roles, groups } => {
                self.require_client(username)?;
                self.require_roles(roles)?;
                if groups.iter().any(|g| !self.groups.contains_key(&g.groupname)) {
                    return Err(GROUP_NOT_FOUND);
                }
                let client = self.client_mut(username)?;
                if let Some(v) = clientid {
                    client.clientid = Some(v.clone());
                }
                if let Some(v) = password {
                    client.password = v.clone();
                }
                if let Some(v) = textname {
                    client.textname = Some(v.clone());
                }
                if let Some(v) = textdescription {
                    client.textdescription = Some(v.clone());
                }
                if !roles.is_empty() {
                    client.roles = roles.clone();
                }
                if !groups.is_empty() {
                    self.set_memberships(username, groups);
                }
                Ok(None)
            }
            C::SetClientId { username, clientid } => {
                self.client_mut(username)?.clientid =
                    if clientid.is_empty() { None } else { Some(clientid.clone()) };
                Ok(None)
            }
            C::SetClientPassword { username, password } => {
                self.client_mut(username)?.password = password.clone();
                Ok(None)
            }
            C::AddClientRole { username, rolename, priority } => {
                self.require_client(username)?;
                self.require_role(rolename)?;
                let client = self.client_mut(username)?;
                if client.roles.iter().any(|r| &r.rolename == rolename) {
                    return Err(CLIENT_ALREADY_IN_ROLE);
                }
                client.roles.push(RoleRef { rolename: rolename.clone(), priority: *priority });
                Ok(None)
            }
            C::RemoveClientRole { username, rolename } => {
                self.require_client(username)?;
                self.require_role(rolename)?;
                self.client_mut(username)?.roles.retain(|r| &r.rolename != rolename);
                Ok(None)
            }
            C::CreateGroup { groupname, roles } => {
                if self.groups.contains_key(groupname) {
                    return Err(GROUP_ALREADY_EXISTS);
                }
                self.require_roles(roles)?;
                self.groups
                    .insert(groupname.clone(), GroupRecord { roles: roles.clone(), ..GroupRecord::default() });
                Ok(None)
            }
            C::DeleteGroup { groupname } => {
                self.groups.remove(groupname).ok_or(GROUP_NOT_FOUND)?;
                if self.anonymous_group.as_deref() == Some(groupname.as_str()) {
                    self.anonymous_group = None;
                }
                Ok(None)
            }
            C::GetGroup { groupname } => {
                let group = self.groups.get(groupname).ok_or(GROUP_NOT_FOUND)?;
                Ok(Some(json!({ "group": Self::group_json(groupname, group) })))
            }
            C::ListGroups { verbose, count, offset } => {
                let names = page(self.groups.keys(), *count, *offset);
                let groups: Vec<JsonValue> = if *verbose {
                    names
                        .iter()
                        .filter_map(|n| self.groups.get(n).map(|g| Self::group_json(n, g)))
                        .collect()
                } else {
                    names.into_iter().map(JsonValue::from).collect()
                };
                Ok(Some(json!({ "totalCount": self.groups.len(), "groups": groups })))
            }
            C::ModifyGroup { groupname, textname, textdescription, roles, clients } => {
                if !self.groups.contains_key(groupname) {
                    return Err(GROUP_NOT_FOUND);
                }
                self.require_roles(roles)?;
                clients.iter().try_for_each(|c| self.require_client(&c.username))?;
                let group = self.group_mut(groupname)?;
                if let Some(v) = textname {
                    group.textname = Some(v.clone());
                }
                if let Some(v) = textdescription {
                    group.textdescription = Some(v.clone());
                }
                if !roles.is_empty() {
                    group.roles = roles.clone();
                }
                if !clients.is_empty() {
                    group.clients = clients.clone();
                }
                Ok(None)
            }
            C::AddGroupClient { groupname, username, priority } => {
                if !self.groups.contains_key(groupname) {
                    return Err(GROUP_NOT_FOUND);
                }
                self.require_client(username)?;
                let group = self.group_mut(groupname)?;
                if group.clients.iter().any(|c| &c.username == username) {
                    return Err(CLIENT_ALREADY_IN_GROUP);
                }
                group.clients.push(ClientRef { username: username.clone(), priority: *priority });
                Ok(None)
            }
            C::RemoveGroupClient { groupname, username } => {
                if !self.groups.contains_key(groupname) {
                    return Err(GROUP_NOT_FOUND);
                }
                self.require_client(username)?;
                self.group_mut(groupname)?.clients.retain(|c| &c.username != username);
                Ok(None)
            }
            C::AddGroupRole { groupname, rolename, priority } => {
                if !self.groups.contains_key(groupname) {
                    return Err(GROUP_NOT_FOUND);
                }
                self.require_role(rolename)?;
                let group = self.group_mut(groupname)?;
                if group.roles.iter().any(|r| &r.rolename == rolename) {
                    return Err(GROUP_ALREADY_IN_ROLE);
                }
                group.roles.push(RoleRef { rolename: rolename.clone(), priority: *priority });
                Ok(None)
            }
            C::RemoveGroupRole { groupname, rolename } => {
                if !self.groups.contains_key(groupname) {
                    return Err(GROUP_NOT_FOUND);
                }
                self.require_role(rolename)?;
                self.group_mut(groupname)?.roles.retain(|r| &r.rolename != rolename);
                Ok(None)
            }
            C::SetAnonymousGroup { groupname } => {
                if !self.groups.contains_key(groupname) {
                    return Err(GROUP_NOT_FOUND);
                }
                self.anonymous_group = Some(groupname.clone());
                Ok(None)
            }
            C::GetAnonymousGroup => Ok(Some(json!({ "group": { "groupname": self.anonymous_group } }))),
            C::CreateRole { rolename, textname, textdescription, acls } => {
                if self.roles.contains_key(rolename) {
                    return Err(ROLE_ALREADY_EXISTS);
                }
                self.roles.insert(
                    rolename.clone(),
                    RoleRecord {
                        textname: textname.clone(),
                        textdescription: textdescription.clone(),
                        acls: acls.clone(),
                    },
                );
                Ok(None)
            }
            C::GetRole { rolename } => {
                let role = self.roles.get(rolename).ok_or(ROLE_NOT_FOUND)?;
                Ok(Some(json!({ "role": Self::role_json(rolename, role) })))
            }
            C::ListRoles { verbose, count, offset } => {
                let names = page(self.roles.keys(), *count, *offset);
                let roles: Vec<JsonValue> = if *verbose {
                    names
                        .iter()
                        .filter_map(|n| self.roles.get(n).map(|r| Self::role_json(n, r)))
                        .collect()
                } else {
                    names.into_iter().map(JsonValue::from).collect()
                };
                Ok(Some(json!({ "totalCount": self.roles.len(), "roles": roles })))
            }
            C::ModifyRole { rolename, textname, textdescription, acls } => {
                let role = self.roles.get_mut(rolename).ok_or(ROLE_NOT_FOUND)?;
                if let Some(v) = textname {
                    role.textname = Some(v.clone());
                }
                if let Some(v) = textdescription {
                    role.textdescription = Some(v.clone());
                }
                if !acls.is_empty() {
                    role.acls = acls.clone();
                }
                Ok(None)
            }
            C::DeleteRole { rolename } => {
                self.roles.remove(rolename).ok_or(ROLE_NOT_FOUND)?;
                for client in self.clients.values_mut() {
                    client.roles.retain(|r| &r.rolename != rolename);
                }
                for group in self.groups.values_mut() {
                    group.roles.retain(|r| &r.rolename != rolename);
                }
                Ok(None)
            }
            C::AddRoleAcl { rolename, acltype, topic, priority, allow } => {
                let role = self.roles.get_mut(rolename).ok_or(ROLE_NOT_FOUND)?;
                if role.acls.iter().any(|a| a.acltype == *acltype && &a.topic == topic) {
                    return Err(ACL_ALREADY_EXISTS);
                }
                role.acls.push(AclEntry {
                    acltype: *acltype,
                    topic: topic.clone(),
                    priority: *priority,
                    allow: *allow,
                });
                Ok(None)
            }
            C::RemoveRoleAcl { rolename, acltype, topic } => {
                let role = self.roles.get_mut(rolename).ok_or(ROLE_NOT_FOUND)?;
                let idx = role
                    .acls
                    .iter()
                    .position(|a| a.acltype == *acltype && &a.topic == topic)
                    .ok_or(ACL_NOT_FOUND)?;
                role.acls.remove(idx);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::command::AclType;

    fn roundtrip(broker: &InMemoryDynSec, command: DynSecCommand) -> JsonValue {
        let payload = serde_json::to_vec(&json!({ "commands": [command] })).unwrap();
        match broker.handle(&payload) {
            Reply::Send(bytes) => {
                let v: JsonValue = serde_json::from_slice(&bytes).unwrap();
                v["responses"][0].clone()
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn duplicate_role_reports_plugin_phrase() {
        let broker = InMemoryDynSec::new("admin", "pw");
        let create = DynSecCommand::create_role("r1", vec![AclEntry::allow(AclType::SubscribePattern, "in/x/#")]);
        assert!(roundtrip(&broker, create.clone()).get("error").is_none());
        assert_eq!(roundtrip(&broker, create)["error"], ROLE_ALREADY_EXISTS);
        assert_eq!(broker.role_acls("r1").unwrap().len(), 1);
    }

    #[test]
    fn create_client_requires_existing_roles() {
        let broker = InMemoryDynSec::new("admin", "pw");
        let cmd = DynSecCommand::create_client("u1", "p1", None, vec![RoleRef::new("missing")]);
        assert_eq!(roundtrip(&broker, cmd)["error"], ROLE_NOT_FOUND);
        assert!(broker.clients().is_empty());
    }

    #[test]
    fn deleting_a_role_strips_it_from_clients() {
        let broker = InMemoryDynSec::new("admin", "pw");
        roundtrip(&broker, DynSecCommand::create_role("r1", vec![]));
        roundtrip(&broker, DynSecCommand::create_client("u1", "p1", None, vec![RoleRef::new("r1")]));
        assert_eq!(broker.client_roles("u1").unwrap(), vec!["r1".to_string()]);
        roundtrip(&broker, DynSecCommand::delete_role("r1"));
        assert!(broker.client_roles("u1").unwrap().is_empty());
        assert_eq!(roundtrip(&broker, DynSecCommand::delete_role("r1"))["error"], ROLE_NOT_FOUND);
    }

    #[test]
    fn list_roles_pages() {
        let broker = InMemoryDynSec::new("admin", "pw");
        for name in ["a", "b", "c"] {
            roundtrip(&broker, DynSecCommand::create_role(name, vec![]));
        }
        let res = roundtrip(&broker, DynSecCommand::ListRoles { verbose: false, count: 1, offset: 1 });
        assert_eq!(res["data"]["totalCount"], 3);
        assert_eq!(res["data"]["roles"], json!(["b"]));
    }

    #[test]
    fn once_faults_expire_and_subjects_narrow() {
        let broker = InMemoryDynSec::new("admin", "pw");
        broker.insert_client("u1", "p");
        broker.insert_client("u2", "p");
        broker.inject_once("deleteClient", Some("u2"), Fault::Error("Internal error".into()));

        assert!(roundtrip(&broker, DynSecCommand::delete_client("u1")).get("error").is_none());
        assert_eq!(roundtrip(&broker, DynSecCommand::delete_client("u2"))["error"], "Internal error");
        assert!(roundtrip(&broker, DynSecCommand::delete_client("u2")).get("error").is_none());
        assert_eq!(broker.received(), vec!["deleteClient"; 3]);
    }

    #[test]
    fn unknown_commands_and_garbage_are_answered() {
        let broker = InMemoryDynSec::new("admin", "pw");
        match broker.handle(br#"{"commands":[{"command":"frobnicate"}]}"#) {
            Reply::Send(bytes) => {
                let v: JsonValue = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(v["responses"][0]["error"], UNKNOWN_COMMAND);
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert!(matches!(broker.handle(b"garbage"), Reply::Send(_)));
    }
}
