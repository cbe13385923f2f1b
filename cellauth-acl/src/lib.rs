//! # Cellauth ACL
//!
//! Access control lists for cells and boxes.
//!
//! An [`Acl`] grants privileges to role URLs (or to every principal) and may
//! require requests to come through a particular client schema. Privileges
//! belong to one of two vocabularies, cell-level and box-level, held by a
//! [`PrivilegeRegistry`] that is passed to the evaluator explicitly.
//!
//! ## Usage
//!
//! ```no_run
//! use cellauth_acl::{from_xml, AccessContext, AclEvaluator, AclLevel};
//!
//! fn main() -> Result<(), cellauth_acl::AclError> {
//!     let acl = from_xml(r#"<D:acl xmlns:D="DAV:">
//!         <D:ace>
//!           <D:principal><D:href>https://example.com/cell1/__role/__/reader</D:href></D:principal>
//!           <D:grant><D:privilege><D:read/></D:privilege></D:grant>
//!         </D:ace>
//!       </D:acl>"#)?;
//!
//!     let evaluator = AclEvaluator::default();
//!     evaluator.validate(&acl, AclLevel::Box)?;
//!
//!     let context = AccessContext::new("https://example.com/cell1/#user001", "https://example.com/cell1/")
//!         .with_roles(["https://example.com/cell1/__role/__/reader"]);
//!     assert!(evaluator.authorize(&acl, &context, "read-properties", AclLevel::Box));
//!     Ok(())
//! }
//! ```

mod acl;
mod context;
mod error;
mod json;
mod privilege;
mod xml;

pub use acl::{Ace, Acl, AclEvaluator, Principal, SchemaRequirement};
pub use context::AccessContext;
pub use error::AclError;
pub use json::{from_json, from_json_value, to_json, to_json_value};
pub use privilege::{AclLevel, Privilege, PrivilegeRegistry, Vocabulary, VocabularyBuilder};
pub use xml::{from_xml, to_xml, CELLAUTH_NAMESPACE, DAV_NAMESPACE};

/// Parse an ACL document, choosing XML or JSON by its first character.
pub fn parse_acl(document: &str) -> Result<Acl, AclError> {
    match document.trim_start().chars().next() {
        Some('<') => from_xml(document),
        Some('{') => from_json(document),
        _ => Err(AclError::format("expected an XML or JSON ACL document")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLE1: &str = "https://example.com/cell1/__role/__/role1";
    const ROLE2: &str = "https://example.com/cell1/__role/__/role2";

    fn context(roles: &[&str]) -> AccessContext {
        AccessContext::new("https://example.com/cell1/#user001", "https://example.com/cell1/")
            .with_roles(roles.iter().copied())
    }

    #[test]
    fn test_xml_and_json_are_equivalent() {
        let from_xml_doc = parse_acl(&format!(
            r#"<D:acl xmlns:D="DAV:" xmlns:c="urn:x-cellauth:xmlns" c:requireSchemaAuthz="https://app.example/">
                 <D:ace>
                   <D:principal><D:href>{ROLE1}</D:href></D:principal>
                   <D:grant><D:privilege><D:read/></D:privilege></D:grant>
                 </D:ace>
                 <D:ace>
                   <D:principal><D:href>{ROLE2}</D:href></D:principal>
                   <D:grant><D:privilege><D:write/></D:privilege></D:grant>
                 </D:ace>
                 <D:ace>
                   <D:principal><D:all/></D:principal>
                   <D:grant><D:privilege><D:read/></D:privilege></D:grant>
                 </D:ace>
               </D:acl>"#
        ))
        .unwrap();

        let from_json_doc = parse_acl(&format!(
            r#"{{
                "requireSchemaAuthz": "https://app.example/",
                "ace": [
                    {{"principal": {{"href": "{ROLE1}"}}, "grant": {{"privilege": ["read"]}}}},
                    {{"principal": {{"href": "{ROLE2}"}}, "grant": {{"privilege": ["write"]}}}},
                    {{"principal": {{"all": {{}}}}, "grant": {{"privilege": ["read"]}}}}
                ]
            }}"#
        ))
        .unwrap();

        assert_eq!(from_xml_doc, from_json_doc);
        assert_eq!(parse_acl(&to_json(&from_xml_doc)).unwrap(), from_xml_doc);
        assert_eq!(parse_acl(&to_xml(&from_json_doc).unwrap()).unwrap(), from_json_doc);
    }

    #[test]
    fn test_union_and_schema_gate_end_to_end() {
        let acl = Acl::new(vec![
            Ace::new(Principal::Href(ROLE1.into()), ["read"]),
            Ace::new(Principal::Href(ROLE2.into()), ["write"]),
            Ace::new(Principal::All, ["read"]),
        ]);
        let evaluator = AclEvaluator::default();
        evaluator.validate(&acl, AclLevel::Box).unwrap();

        let role2 = context(&[ROLE2]);
        assert_eq!(
            evaluator
                .granted_privileges(&acl, &role2)
                .into_iter()
                .collect::<Vec<_>>(),
            vec!["read", "write"]
        );
        assert!(evaluator.authorize(&acl, &role2, "write-content", AclLevel::Box));

        let gated = acl.with_schema_requirement(SchemaRequirement::parse("https://app.example/"));
        assert!(!evaluator.authorize(&gated, &role2, "write", AclLevel::Box));
    }

    #[test]
    fn test_custom_registry() {
        let registry = PrivilegeRegistry::new(
            Vocabulary::builder().privilege("admin", ["view"]).build(),
            Vocabulary::builder().privilege("owner", ["edit"]).build(),
        );
        let evaluator = AclEvaluator::new(registry);
        let acl = Acl::new(vec![Ace::new(Principal::All, ["admin"])]);

        assert!(evaluator.validate(&acl, AclLevel::Cell).is_ok());
        assert!(evaluator.validate(&acl, AclLevel::Box).is_err());
        assert!(evaluator.authorize(&acl, &context(&[ROLE1]), "view", AclLevel::Cell));
    }

    #[test]
    fn test_parse_acl_rejects_unknown_format() {
        assert!(matches!(parse_acl("ace: []"), Err(AclError::Format(_))));
    }
}
