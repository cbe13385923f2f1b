//! JSON mapping of the DAV ACL shape.
//!
//! ```json
//! {
//!   "base": "https://example.com/cell1/__role/box1/",
//!   "requireSchemaAuthz": "public",
//!   "ace": [
//!     {"principal": {"href": "reader"}, "grant": {"privilege": ["read"]}},
//!     {"principal": {"all": {}}, "grant": {"privilege": ["read-properties"]}},
//!     null
//!   ]
//! }
//! ```
//!
//! An absent or `null` `ace` is the null list. `null` entries are kept as
//! `None` entries.

use serde_json::{json, Map, Value};

use crate::acl::{Ace, Acl, Principal, SchemaRequirement};
use crate::error::AclError;

fn optional_str<'a>(object: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>, AclError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(AclError::format(format!("'{key}' must be a string"))),
    }
}

fn principal_from_json(value: &Value, base: Option<&str>) -> Result<Option<Principal>, AclError> {
    let object = match value {
        Value::Null => return Ok(None),
        Value::Object(object) => object,
        _ => return Err(AclError::format("'principal' must be an object")),
    };
    match (object.get("href"), object.get("all")) {
        (Some(_), Some(_)) => Err(AclError::format("principal has both 'href' and 'all'")),
        (Some(Value::String(href)), None) => Ok(Some(Principal::Href(Acl::resolve_href(
            base,
            href.trim(),
        )))),
        (Some(_), None) => Err(AclError::format("'href' must be a string")),
        (None, Some(_)) => Ok(Some(Principal::All)),
        (None, None) => Ok(None),
    }
}

fn granted_from_json(value: &Value) -> Result<Vec<String>, AclError> {
    let privileges = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(grant) => grant.get("privilege").unwrap_or(&Value::Null),
        _ => return Err(AclError::format("'grant' must be an object")),
    };
    match privileges {
        Value::Null => Ok(Vec::new()),
        Value::String(name) => Ok(vec![name.clone()]),
        Value::Array(names) => names
            .iter()
            .map(|name| {
                name.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| AclError::format("privilege names must be strings"))
            })
            .collect(),
        _ => Err(AclError::format("'privilege' must be a list of names")),
    }
}

fn ace_from_json(value: &Value, base: Option<&str>) -> Result<Option<Ace>, AclError> {
    let object = match value {
        Value::Null => return Ok(None),
        Value::Object(object) => object,
        _ => return Err(AclError::format("ace entries must be objects or null")),
    };
    Ok(Some(Ace {
        principal: principal_from_json(object.get("principal").unwrap_or(&Value::Null), base)?,
        granted: granted_from_json(object.get("grant").unwrap_or(&Value::Null))?,
    }))
}

/// Map a JSON value onto an ACL.
pub fn from_json_value(value: &Value) -> Result<Acl, AclError> {
    let object = value
        .as_object()
        .ok_or_else(|| AclError::format("ACL must be a JSON object"))?;

    let base = optional_str(object, "base")?.map(str::to_string);
    let require_schema_authz =
        optional_str(object, "requireSchemaAuthz")?.and_then(SchemaRequirement::parse);
    let aces = match object.get("ace") {
        None | Some(Value::Null) => None,
        Some(Value::Array(entries)) => Some(
            entries
                .iter()
                .map(|entry| ace_from_json(entry, base.as_deref()))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(_) => return Err(AclError::format("'ace' must be a list")),
    };

    Ok(Acl {
        base,
        require_schema_authz,
        aces,
    })
}

pub fn from_json(json: &str) -> Result<Acl, AclError> {
    let value: Value = serde_json::from_str(json)?;
    from_json_value(&value)
}

pub fn to_json_value(acl: &Acl) -> Value {
    let mut object = Map::new();
    if let Some(base) = &acl.base {
        object.insert("base".into(), json!(base));
    }
    if let Some(requirement) = &acl.require_schema_authz {
        object.insert("requireSchemaAuthz".into(), json!(requirement.as_attribute()));
    }
    if let Some(entries) = &acl.aces {
        let aces: Vec<Value> = entries
            .iter()
            .map(|entry| match entry {
                None => Value::Null,
                Some(ace) => {
                    let mut ace_object = Map::new();
                    match &ace.principal {
                        Some(Principal::All) => {
                            ace_object.insert("principal".into(), json!({"all": {}}));
                        }
                        Some(Principal::Href(href)) => {
                            ace_object.insert("principal".into(), json!({"href": href}));
                        }
                        None => {}
                    }
                    ace_object.insert("grant".into(), json!({"privilege": ace.granted}));
                    Value::Object(ace_object)
                }
            })
            .collect();
        object.insert("ace".into(), Value::Array(aces));
    }
    Value::Object(object)
}

/// Pretty-printed JSON.
pub fn to_json(acl: &Acl) -> String {
    format!("{:#}", to_json_value(acl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::{AclLevel, PrivilegeRegistry};

    #[test]
    fn test_from_json() {
        let acl = from_json(
            r#"{
                "base": "https://example.com/cell1/__role/box1/",
                "requireSchemaAuthz": "https://app.example",
                "ace": [
                    {"principal": {"href": "reader"}, "grant": {"privilege": ["read", "write"]}},
                    null,
                    {"principal": {"all": {}}, "grant": {"privilege": ["read-properties"]}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            acl.require_schema_authz,
            Some(SchemaRequirement::Schema("https://app.example/".into()))
        );
        let aces = acl.aces.as_ref().unwrap();
        assert_eq!(aces.len(), 3);
        assert!(aces[1].is_none());
        assert_eq!(
            aces[0].as_ref().unwrap().principal,
            Some(Principal::Href(
                "https://example.com/cell1/__role/box1/reader".into()
            ))
        );
        assert_eq!(aces[2].as_ref().unwrap().principal, Some(Principal::All));
        assert!(acl.validate(AclLevel::Box, &PrivilegeRegistry::standard()));
    }

    #[test]
    fn test_json_round_trip_keeps_null_entries() {
        let acl = Acl {
            base: None,
            require_schema_authz: Some(SchemaRequirement::Public),
            aces: Some(vec![
                Some(Ace::new(
                    Principal::Href("https://example.com/cell1/__role/__/admin".into()),
                    ["root"],
                )),
                None,
            ]),
        };
        assert_eq!(from_json(&to_json(&acl)).unwrap(), acl);
    }

    #[test]
    fn test_null_ace_list() {
        assert_eq!(from_json("{}").unwrap().aces, None);
        assert_eq!(from_json(r#"{"ace": null}"#).unwrap().aces, None);
        assert_eq!(from_json(r#"{"ace": []}"#).unwrap().aces, Some(vec![]));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        for document in [
            "[]",
            "not json",
            r#"{"ace": {}}"#,
            r#"{"ace": [1]}"#,
            r#"{"ace": [{"principal": "all"}]}"#,
            r#"{"ace": [{"principal": {"href": 3}}]}"#,
            r#"{"ace": [{"principal": {"all": {}, "href": "x"}}]}"#,
            r#"{"ace": [{"grant": {"privilege": [1]}}]}"#,
            r#"{"base": 1}"#,
        ] {
            assert!(
                matches!(from_json(document), Err(AclError::Format(_))),
                "expected format error for {document}"
            );
        }
    }
}
