use std::collections::BTreeSet;

use cellauth_token::{normalize_cell_url, Role};
use tracing::debug;

use crate::context::AccessContext;
use crate::error::AclError;
use crate::privilege::{AclLevel, PrivilegeRegistry};

/// Whom an ace grants to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Every principal.
    All,
    /// A canonical role URL.
    Href(String),
}

/// Access control entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ace {
    pub principal: Option<Principal>,
    pub granted: Vec<String>,
}

impl Ace {
    pub fn new(principal: Principal, granted: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            principal: Some(principal),
            granted: granted.into_iter().map(Into::into).collect(),
        }
    }

    /// An ace with neither principal nor grants is treated as absent.
    pub fn is_empty(&self) -> bool {
        self.principal.is_none() && self.granted.is_empty()
    }

    fn applies_to(&self, role_url: &str) -> bool {
        match &self.principal {
            Some(Principal::All) => true,
            Some(Principal::Href(href)) => href == role_url,
            None => false,
        }
    }
}

/// Schema precondition of an ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaRequirement {
    /// Any client schema, as long as one is present.
    Public,
    /// Exactly this client schema.
    Schema(String),
}

impl SchemaRequirement {
    pub const PUBLIC: &'static str = "public";

    /// Parse the attribute value. Empty means no requirement.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" => None,
            Self::PUBLIC => Some(SchemaRequirement::Public),
            url => Some(SchemaRequirement::Schema(normalize_cell_url(url))),
        }
    }

    pub fn as_attribute(&self) -> &str {
        match self {
            SchemaRequirement::Public => Self::PUBLIC,
            SchemaRequirement::Schema(url) => url,
        }
    }

    pub fn is_satisfied_by(&self, schema: Option<&str>) -> bool {
        match (self, schema) {
            (_, None) => false,
            (SchemaRequirement::Public, Some(_)) => true,
            (SchemaRequirement::Schema(required), Some(schema)) => {
                normalize_cell_url(required) == normalize_cell_url(schema)
            }
        }
    }
}

/// An access control list.
///
/// `aces: None` and an empty list both grant nothing. A `None` entry inside
/// the list, or an empty [`Ace`], is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acl {
    pub base: Option<String>,
    pub require_schema_authz: Option<SchemaRequirement>,
    pub aces: Option<Vec<Option<Ace>>>,
}

impl Acl {
    pub fn new(aces: Vec<Ace>) -> Self {
        Self {
            base: None,
            require_schema_authz: None,
            aces: Some(aces.into_iter().map(Some).collect()),
        }
    }

    pub fn with_schema_requirement(mut self, requirement: Option<SchemaRequirement>) -> Self {
        self.require_schema_authz = requirement;
        self
    }

    /// Aces that take part in evaluation, with their position in the list.
    pub fn effective_aces(&self) -> impl Iterator<Item = (usize, &Ace)> {
        self.aces
            .iter()
            .flatten()
            .enumerate()
            .filter_map(|(index, ace)| ace.as_ref().map(|ace| (index, ace)))
            .filter(|(_, ace)| !ace.is_empty())
    }

    /// Check structure and privilege names against the vocabulary of `level`.
    /// Reports the first defect found.
    pub fn try_validate(&self, level: AclLevel, registry: &PrivilegeRegistry) -> Result<(), AclError> {
        let vocabulary = registry.vocabulary(level);
        for (index, ace) in self.effective_aces() {
            match &ace.principal {
                None => return Err(AclError::MissingPrincipal { index }),
                Some(Principal::Href(href)) if href.trim().is_empty() => {
                    return Err(AclError::MissingPrincipal { index })
                }
                Some(Principal::Href(href)) if Role::parse(href).is_none() => {
                    return Err(AclError::MalformedAce {
                        index,
                        reason: format!("principal '{href}' is not a role URL"),
                    })
                }
                Some(_) => {}
            }
            if ace.granted.is_empty() {
                return Err(AclError::MalformedAce {
                    index,
                    reason: "no granted privileges".to_string(),
                });
            }
            if let Some(name) = ace.granted.iter().find(|name| !vocabulary.contains(name)) {
                return Err(AclError::UnknownPrivilege {
                    name: name.clone(),
                    level,
                });
            }
        }
        Ok(())
    }

    pub fn validate(&self, level: AclLevel, registry: &PrivilegeRegistry) -> bool {
        self.try_validate(level, registry).is_ok()
    }

    /// Union of the privileges granted to any of the context's roles,
    /// directly or through an all-principals ace. Ace order does not matter.
    pub fn granted_privileges(&self, context: &AccessContext) -> BTreeSet<String> {
        let mut granted = BTreeSet::new();
        for role in &context.roles {
            for (_, ace) in self.effective_aces() {
                if ace.applies_to(role) {
                    granted.extend(ace.granted.iter().cloned());
                }
            }
        }
        granted
    }

    /// Whether the schema precondition, if any, holds for `context`.
    pub fn schema_permits(&self, context: &AccessContext) -> bool {
        self.require_schema_authz
            .as_ref()
            .map_or(true, |requirement| {
                requirement.is_satisfied_by(context.schema.as_deref())
            })
    }

    /// Resolve a principal href against `xml:base`. Absolute URLs are kept as is.
    pub fn resolve_href(base: Option<&str>, href: &str) -> String {
        let Some(base) = base.filter(|_| !href.contains("://")) else {
            return href.to_string();
        };
        let mut prefix = normalize_cell_url(base);
        let root_len = prefix
            .find("://")
            .and_then(|scheme| prefix[scheme + 3..].find('/').map(|p| scheme + 3 + p + 1))
            .unwrap_or(prefix.len());
        let mut rest = href;
        while let Some(stripped) = rest.strip_prefix("../") {
            let without_slash = &prefix[..prefix.len() - 1];
            if let Some(cut) = without_slash.rfind('/') {
                if cut + 1 >= root_len {
                    prefix.truncate(cut + 1);
                }
            }
            rest = stripped;
        }
        format!("{prefix}{rest}")
    }
}

/// Evaluates ACLs against one privilege registry.
#[derive(Debug, Clone, Default)]
pub struct AclEvaluator {
    registry: PrivilegeRegistry,
}

impl AclEvaluator {
    pub fn new(registry: PrivilegeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PrivilegeRegistry {
        &self.registry
    }

    pub fn validate(&self, acl: &Acl, level: AclLevel) -> Result<(), AclError> {
        acl.try_validate(level, &self.registry)
    }

    pub fn granted_privileges(&self, acl: &Acl, context: &AccessContext) -> BTreeSet<String> {
        acl.granted_privileges(context)
    }

    /// Whether `context` holds `requested` under `acl`.
    ///
    /// The schema precondition is checked before any ace. Granted names the
    /// vocabulary does not know grant nothing.
    pub fn authorize(
        &self,
        acl: &Acl,
        context: &AccessContext,
        requested: &str,
        level: AclLevel,
    ) -> bool {
        if !acl.schema_permits(context) {
            debug!(
                subject = %context.subject,
                schema = context.schema.as_deref().unwrap_or("-"),
                "schema requirement not met"
            );
            return false;
        }
        let allowed = acl
            .granted_privileges(context)
            .iter()
            .any(|granted| self.registry.includes(level, granted, requested));
        debug!(subject = %context.subject, requested, %level, allowed, "acl evaluated");
        allowed
    }
}
