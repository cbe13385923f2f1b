//! DAV ACL XML mapping.
//!
//! ```xml
//! <D:acl xmlns:D="DAV:" xmlns:c="urn:x-cellauth:xmlns"
//!        xml:base="https://example.com/cell1/__role/box1/" c:requireSchemaAuthz="public">
//!   <D:ace>
//!     <D:principal><D:href>https://example.com/cell1/__role/box1/reader</D:href></D:principal>
//!     <D:grant><D:privilege><D:read/></D:privilege></D:grant>
//!   </D:ace>
//! </D:acl>
//! ```
//!
//! Elements are matched by local name; prefixes are not resolved. Relative
//! hrefs are resolved against `xml:base` when read and always written absolute.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::acl::{Ace, Acl, Principal, SchemaRequirement};
use crate::error::AclError;

pub const DAV_NAMESPACE: &str = "DAV:";
pub const CELLAUTH_NAMESPACE: &str = "urn:x-cellauth:xmlns";
const REQUIRE_SCHEMA_AUTHZ: &[u8] = b"requireSchemaAuthz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Ace,
    Principal,
    Href,
    Grant,
    Privilege,
}

fn utf8(bytes: &[u8]) -> Result<String, AclError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| AclError::format(format!("xml: {e}")))
}

fn read_acl_attributes(element: &BytesStart<'_>, acl: &mut Acl) -> Result<(), AclError> {
    for attribute in element.attributes() {
        let attribute = attribute?;
        let value = attribute.unescape_value()?;
        if attribute.key.as_ref() == b"xml:base" {
            acl.base = Some(value.into_owned());
        } else if attribute.key.local_name().as_ref() == REQUIRE_SCHEMA_AUTHZ {
            acl.require_schema_authz = SchemaRequirement::parse(&value);
        }
    }
    Ok(())
}

/// Parse an ACL document.
pub fn from_xml(xml: &str) -> Result<Acl, AclError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut acl = Acl::default();
    let mut seen_root = false;
    let mut aces: Vec<Option<Ace>> = Vec::new();
    let mut current: Option<Ace> = None;
    let mut href = String::new();
    let mut section = Section::Outside;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                let name = element.local_name();
                match (section, name.as_ref()) {
                    (Section::Outside, b"acl") if !seen_root => {
                        seen_root = true;
                        read_acl_attributes(&element, &mut acl)?;
                    }
                    (Section::Outside, b"ace") if seen_root => {
                        current = Some(Ace::default());
                        section = Section::Ace;
                    }
                    (Section::Ace, b"principal") => section = Section::Principal,
                    (Section::Ace, b"grant") => section = Section::Grant,
                    (Section::Principal, b"href") => {
                        href.clear();
                        section = Section::Href;
                    }
                    (Section::Principal, b"all") => set_principal(&mut current, Principal::All)?,
                    (Section::Grant, b"privilege") => section = Section::Privilege,
                    (Section::Privilege, privilege) => grant(&mut current, privilege)?,
                    (_, other) => {
                        return Err(AclError::format(format!(
                            "unexpected element <{}>",
                            String::from_utf8_lossy(other)
                        )))
                    }
                }
            }
            Event::Empty(element) => {
                let name = element.local_name();
                match (section, name.as_ref()) {
                    (Section::Outside, b"acl") if !seen_root => {
                        seen_root = true;
                        read_acl_attributes(&element, &mut acl)?;
                    }
                    (Section::Outside, b"ace") if seen_root => aces.push(Some(Ace::default())),
                    (Section::Ace, b"principal" | b"grant") => {}
                    (Section::Principal, b"all") => set_principal(&mut current, Principal::All)?,
                    (Section::Principal, b"href") => {
                        set_principal(&mut current, Principal::Href(String::new()))?
                    }
                    (Section::Grant, b"privilege") => {}
                    (Section::Privilege, privilege) => grant(&mut current, privilege)?,
                    (_, other) => {
                        return Err(AclError::format(format!(
                            "unexpected element <{}/>",
                            String::from_utf8_lossy(other)
                        )))
                    }
                }
            }
            Event::Text(text) => {
                if section == Section::Href {
                    href.push_str(&text.unescape()?);
                }
            }
            Event::End(element) => {
                let name = element.local_name();
                section = match (section, name.as_ref()) {
                    (Section::Href, b"href") => {
                        let resolved = Acl::resolve_href(acl.base.as_deref(), href.trim());
                        set_principal(&mut current, Principal::Href(resolved))?;
                        Section::Principal
                    }
                    (Section::Principal, b"principal") | (Section::Grant, b"grant") => Section::Ace,
                    (Section::Privilege, b"privilege") => Section::Grant,
                    (Section::Privilege, _) | (Section::Principal, b"all") => section,
                    (Section::Ace, b"ace") => {
                        aces.push(current.take());
                        Section::Outside
                    }
                    (Section::Outside, b"acl") => Section::Outside,
                    (_, other) => {
                        return Err(AclError::format(format!(
                            "unexpected </{}>",
                            String::from_utf8_lossy(other)
                        )))
                    }
                };
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(AclError::format("missing <acl> root element"));
    }
    if section != Section::Outside {
        return Err(AclError::format("unterminated <ace>"));
    }
    acl.aces = (!aces.is_empty()).then_some(aces);
    Ok(acl)
}

fn set_principal(current: &mut Option<Ace>, principal: Principal) -> Result<(), AclError> {
    let ace = current
        .as_mut()
        .ok_or_else(|| AclError::format("principal outside <ace>"))?;
    if ace.principal.is_some() {
        return Err(AclError::format("ace has more than one principal"));
    }
    ace.principal = Some(principal);
    Ok(())
}

fn grant(current: &mut Option<Ace>, privilege: &[u8]) -> Result<(), AclError> {
    let ace = current
        .as_mut()
        .ok_or_else(|| AclError::format("privilege outside <ace>"))?;
    ace.granted.push(utf8(privilege)?);
    Ok(())
}

/// Serialize an ACL as an indented DAV ACL document.
///
/// `None` entries and empty aces are not written, so they do not survive a
/// round trip through XML; neither changes what the ACL grants.
pub fn to_xml(acl: &Acl) -> Result<String, AclError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    let mut root = BytesStart::new("D:acl");
    root.push_attribute(("xmlns:D", DAV_NAMESPACE));
    root.push_attribute(("xmlns:c", CELLAUTH_NAMESPACE));
    if let Some(base) = &acl.base {
        root.push_attribute(("xml:base", base.as_str()));
    }
    if let Some(requirement) = &acl.require_schema_authz {
        root.push_attribute(("c:requireSchemaAuthz", requirement.as_attribute()));
    }
    writer.write_event(Event::Start(root))?;

    for (_, ace) in acl.effective_aces() {
        writer.write_event(Event::Start(BytesStart::new("D:ace")))?;

        if let Some(principal) = &ace.principal {
            writer.write_event(Event::Start(BytesStart::new("D:principal")))?;
            match principal {
                Principal::All => writer.write_event(Event::Empty(BytesStart::new("D:all")))?,
                Principal::Href(href) => {
                    writer.write_event(Event::Start(BytesStart::new("D:href")))?;
                    writer.write_event(Event::Text(BytesText::new(href)))?;
                    writer.write_event(Event::End(BytesEnd::new("D:href")))?;
                }
            }
            writer.write_event(Event::End(BytesEnd::new("D:principal")))?;
        }

        writer.write_event(Event::Start(BytesStart::new("D:grant")))?;
        for privilege in &ace.granted {
            if !is_element_name(privilege) {
                return Err(AclError::format(format!(
                    "privilege {privilege:?} cannot be written as an XML element"
                )));
            }
            writer.write_event(Event::Start(BytesStart::new("D:privilege")))?;
            writer.write_event(Event::Empty(BytesStart::new(format!("D:{privilege}"))))?;
            writer.write_event(Event::End(BytesEnd::new("D:privilege")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("D:grant")))?;

        writer.write_event(Event::End(BytesEnd::new("D:ace")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("D:acl")))?;
    String::from_utf8(writer.into_inner()).map_err(|e| AclError::format(e.to_string()))
}

/// Unprefixed XML element name, restricted to ASCII.
fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::{AclLevel, PrivilegeRegistry};

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:acl xmlns:D="DAV:" xmlns:p="urn:x-cellauth:xmlns"
       xml:base="https://example.com/cell1/__role/box1/" p:requireSchemaAuthz="public">
  <D:ace>
    <D:principal><D:href>reader</D:href></D:principal>
    <D:grant>
      <D:privilege><D:read/></D:privilege>
      <D:privilege><D:write-content/></D:privilege>
    </D:grant>
  </D:ace>
  <D:ace>
    <D:principal><D:all/></D:principal>
    <D:grant><D:privilege><D:read-properties/></D:privilege></D:grant>
  </D:ace>
</D:acl>"#;

    #[test]
    fn test_from_xml() {
        let acl = from_xml(DOCUMENT).unwrap();
        assert_eq!(
            acl.base.as_deref(),
            Some("https://example.com/cell1/__role/box1/")
        );
        assert_eq!(acl.require_schema_authz, Some(SchemaRequirement::Public));

        let aces: Vec<&Ace> = acl.effective_aces().map(|(_, ace)| ace).collect();
        assert_eq!(aces.len(), 2);
        assert_eq!(
            aces[0].principal,
            Some(Principal::Href(
                "https://example.com/cell1/__role/box1/reader".into()
            ))
        );
        assert_eq!(aces[0].granted, vec!["read", "write-content"]);
        assert_eq!(aces[1].principal, Some(Principal::All));
        assert!(acl.validate(AclLevel::Box, &PrivilegeRegistry::standard()));
    }

    #[test]
    fn test_xml_round_trip() {
        let acl = from_xml(DOCUMENT).unwrap();
        let written = to_xml(&acl).unwrap();
        assert!(written.contains("xml:base=\"https://example.com/cell1/__role/box1/\""));
        assert!(written.contains("<D:read/>"));
        assert_eq!(from_xml(&written).unwrap(), acl);
    }

    #[test]
    fn test_to_xml_rejects_unwritable_privilege_names() {
        for name in ["read write", "", "1read", "D:read", "<read>"] {
            let acl = Acl::new(vec![Ace::new(Principal::All, [name])]);
            assert!(
                matches!(to_xml(&acl), Err(AclError::Format(_))),
                "expected format error for {name:?}"
            );
        }

        let acl = Acl::new(vec![Ace::new(Principal::All, ["x-custom_1.0"])]);
        assert!(to_xml(&acl).unwrap().contains("<D:x-custom_1.0/>"));
    }

    #[test]
    fn test_empty_acl() {
        let acl = from_xml(r#"<D:acl xmlns:D="DAV:"/>"#).unwrap();
        assert_eq!(acl, Acl::default());

        let acl = from_xml(r#"<D:acl xmlns:D="DAV:"><D:ace/></D:acl>"#).unwrap();
        assert_eq!(acl.aces, Some(vec![Some(Ace::default())]));
        assert_eq!(acl.effective_aces().count(), 0);
    }

    #[test]
    fn test_ace_without_principal_parses_but_fails_validation() {
        let acl = from_xml(
            r#"<D:acl xmlns:D="DAV:"><D:ace><D:grant><D:privilege><D:read/></D:privilege></D:grant></D:ace></D:acl>"#,
        )
        .unwrap();
        assert!(!acl.validate(AclLevel::Box, &PrivilegeRegistry::standard()));
    }

    #[test]
    fn test_rejects_malformed_documents() {
        for document in [
            "",
            "<D:ace xmlns:D=\"DAV:\"/>",
            "<D:acl xmlns:D=\"DAV:\"><D:ace><D:bogus/></D:ace></D:acl>",
            "<D:acl xmlns:D=\"DAV:\"><D:ace><D:principal><D:all/><D:all/></D:principal></D:ace></D:acl>",
            "<D:acl xmlns:D=\"DAV:\"><D:ace>",
        ] {
            assert!(
                matches!(from_xml(document), Err(AclError::Format(_))),
                "expected format error for {document:?}"
            );
        }
    }
}
