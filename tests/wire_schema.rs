use jsonschema::JSONSchema;
use serde_json::json;

use dynsec_tenancy::control::{AclEntry, AclType, ClientRef, CommandCodec, DynSecCommand, GroupRef, RoleRef};
use dynsec_tenancy::tenant::{RoleKind, TopicNamespace};

fn compiled() -> JSONSchema {
    let raw_schema = include_str!("../schemas/dynsec-command.schema.json");
    let schema_val: serde_json::Value = serde_json::from_str(raw_schema).unwrap();
    JSONSchema::compile(&schema_val).unwrap()
}

fn assert_valid(schema: &JSONSchema, value: &serde_json::Value) {
    if let Err(errs) = schema.validate(value) {
        let msg = errs.map(|e| e.to_string()).collect::<Vec<_>>().join(", ");
        panic!("{value}: {msg}");
    }
}

#[test]
fn encoded_commands_match_schema() {
    let schema = compiled();
    let ns = TopicNamespace::new("ab12cd").unwrap();

    let commands = vec![
        DynSecCommand::default_acl_access(false, true, false, true),
        DynSecCommand::GetDefaultAclAccess,
        DynSecCommand::create_client("u", "p", Some("Example Device".into()), vec![RoleRef::new("device-ab12cd")]),
        DynSecCommand::CreateClient {
            username: "u".into(),
            password: "p".into(),
            clientid: Some("sensor-1".into()),
            textname: None,
            textdescription: Some("kitchen".into()),
            groups: vec![GroupRef { groupname: "g".into(), priority: 3 }],
            roles: vec![],
        },
        DynSecCommand::delete_client("u"),
        DynSecCommand::EnableClient { username: "u".into() },
        DynSecCommand::DisableClient { username: "u".into() },
        DynSecCommand::get_client("u"),
        DynSecCommand::ListClients { verbose: true, count: 10, offset: 20 },
        DynSecCommand::rename_client("u", "Renamed"),
        DynSecCommand::SetClientId { username: "u".into(), clientid: String::new() },
        DynSecCommand::SetClientPassword { username: "u".into(), password: "new".into() },
        DynSecCommand::AddClientRole { username: "u".into(), rolename: "r".into(), priority: -1 },
        DynSecCommand::RemoveClientRole { username: "u".into(), rolename: "r".into() },
        DynSecCommand::CreateGroup { groupname: "g".into(), roles: vec![RoleRef::new("r")] },
        DynSecCommand::DeleteGroup { groupname: "g".into() },
        DynSecCommand::GetGroup { groupname: "g".into() },
        DynSecCommand::ListGroups { verbose: false, count: -1, offset: 0 },
        DynSecCommand::ModifyGroup {
            groupname: "g".into(),
            textname: Some("Group".into()),
            textdescription: None,
            roles: vec![],
            clients: vec![ClientRef { username: "u".into(), priority: 1 }],
        },
        DynSecCommand::AddGroupClient { groupname: "g".into(), username: "u".into(), priority: -1 },
        DynSecCommand::RemoveGroupClient { groupname: "g".into(), username: "u".into() },
        DynSecCommand::AddGroupRole { groupname: "g".into(), rolename: "r".into(), priority: -1 },
        DynSecCommand::RemoveGroupRole { groupname: "g".into(), rolename: "r".into() },
        DynSecCommand::SetAnonymousGroup { groupname: "g".into() },
        DynSecCommand::GetAnonymousGroup,
        DynSecCommand::create_role("automation-ab12cd", RoleKind::Automation.acls(&ns)),
        DynSecCommand::GetRole { rolename: "r".into() },
        DynSecCommand::ListRoles { verbose: false, count: -1, offset: 0 },
        DynSecCommand::ModifyRole {
            rolename: "r".into(),
            textname: None,
            textdescription: Some("desc".into()),
            acls: vec![AclEntry::allow(AclType::PublishClientReceive, "out/ab12cd/#")],
        },
        DynSecCommand::delete_role("r"),
        DynSecCommand::AddRoleAcl {
            rolename: "r".into(),
            acltype: AclType::SubscribeLiteral,
            topic: "in/ab12cd/status".into(),
            priority: 0,
            allow: false,
        },
        DynSecCommand::RemoveRoleAcl {
            rolename: "r".into(),
            acltype: AclType::SubscribeLiteral,
            topic: "in/ab12cd/status".into(),
        },
    ];
    assert_eq!(commands.len(), 32);

    for command in &commands {
        let raw = CommandCodec::encode(command).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_valid(&schema, &value);
    }
}

#[test]
fn schema_rejects_batches_and_missing_fields() {
    let schema = compiled();
    let invalid = [
        json!({"commands": []}),
        json!({"commands": [{"command": "listRoles"}, {"command": "listClients"}]}),
        json!({"commands": [{"command": "createClient", "username": "u"}]}),
        json!({"commands": [{"command": "createRole", "rolename": "r", "acls": [{"acltype": "publish", "topic": "t", "priority": -1, "allow": true}]}]}),
        json!({"commands": [{"command": "frobnicate"}]}),
    ];
    for value in invalid {
        assert!(!schema.is_valid(&value), "{value}");
    }
}
