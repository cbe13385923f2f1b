use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Which vocabulary an ACL is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclLevel {
    Cell,
    Box,
}

impl fmt::Display for AclLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclLevel::Cell => f.write_str("cell"),
            AclLevel::Box => f.write_str("box"),
        }
    }
}

impl FromStr for AclLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cell" => Ok(AclLevel::Cell),
            "box" => Ok(AclLevel::Box),
            other => Err(format!("unknown ACL level '{other}', expected 'cell' or 'box'")),
        }
    }
}

/// A grantable privilege and the privileges it directly includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Privilege {
    pub name: String,
    pub includes: BTreeSet<String>,
}

/// One level's privilege names and their inclusion relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    privileges: BTreeMap<String, Privilege>,
}

impl Vocabulary {
    pub fn builder() -> VocabularyBuilder {
        VocabularyBuilder::default()
    }

    /// Privileges of cell-level resources.
    pub fn standard_cell() -> Self {
        Self::builder()
            .privilege(
                "root",
                ["auth", "message", "event", "log", "social", "box", "acl", "propfind"],
            )
            .privilege("auth", ["auth-read"])
            .privilege("message", ["message-read"])
            .privilege("event", ["event-read"])
            .privilege("log", ["log-read"])
            .privilege("social", ["social-read"])
            .privilege("box", ["box-read", "box-install"])
            .privilege("acl", ["acl-read"])
            .build()
    }

    /// Privileges of resources inside a box.
    pub fn standard_box() -> Self {
        Self::builder()
            .privilege(
                "all",
                ["read", "write", "read-acl", "write-acl", "exec", "alter-schema"],
            )
            .privilege("read", ["read-properties"])
            .privilege(
                "write",
                ["write-properties", "write-content", "bind", "unbind"],
            )
            .build()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.privileges.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Privilege> {
        self.privileges.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.privileges.keys().map(String::as_str)
    }

    /// Whether holding `granted` implies `requested`.
    ///
    /// Reflexive and transitive over declared inclusions. An undeclared
    /// `granted` includes nothing, not even itself.
    pub fn includes(&self, granted: &str, requested: &str) -> bool {
        if !self.contains(granted) {
            return false;
        }
        let mut stack = vec![granted];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == requested {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(privilege) = self.privileges.get(current) {
                stack.extend(privilege.includes.iter().map(String::as_str));
            }
        }
        false
    }
}

#[derive(Debug, Default)]
pub struct VocabularyBuilder {
    privileges: BTreeMap<String, BTreeSet<String>>,
}

impl VocabularyBuilder {
    /// Declare `name` as including each of `includes`.
    ///
    /// Included names are declared too, as leaves, unless declared elsewhere.
    pub fn privilege<I, S>(mut self, name: &str, includes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let includes: BTreeSet<String> = includes.into_iter().map(Into::into).collect();
        for included in &includes {
            self.privileges.entry(included.clone()).or_default();
        }
        self.privileges
            .entry(name.to_string())
            .or_default()
            .extend(includes);
        self
    }

    pub fn build(self) -> Vocabulary {
        let privileges = self
            .privileges
            .into_iter()
            .map(|(name, includes)| (name.clone(), Privilege { name, includes }))
            .collect();
        Vocabulary { privileges }
    }
}

/// The cell and box vocabularies an evaluator works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeRegistry {
    cell: Vocabulary,
    r#box: Vocabulary,
}

impl PrivilegeRegistry {
    pub fn new(cell: Vocabulary, r#box: Vocabulary) -> Self {
        Self { cell, r#box }
    }

    pub fn standard() -> Self {
        Self::new(Vocabulary::standard_cell(), Vocabulary::standard_box())
    }

    pub fn vocabulary(&self, level: AclLevel) -> &Vocabulary {
        match level {
            AclLevel::Cell => &self.cell,
            AclLevel::Box => &self.r#box,
        }
    }

    pub fn includes(&self, level: AclLevel, granted: &str, requested: &str) -> bool {
        self.vocabulary(level).includes(granted, requested)
    }
}

impl Default for PrivilegeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_includes_is_reflexive_and_transitive() {
        let registry = PrivilegeRegistry::standard();
        assert!(registry.includes(AclLevel::Box, "read", "read"));
        assert!(registry.includes(AclLevel::Box, "all", "write"));
        assert!(registry.includes(AclLevel::Box, "all", "write-content"));
        assert!(registry.includes(AclLevel::Box, "write", "bind"));
        assert!(!registry.includes(AclLevel::Box, "read", "write"));
        assert!(!registry.includes(AclLevel::Box, "read-properties", "read"));

        assert!(registry.includes(AclLevel::Cell, "root", "box-install"));
        assert!(registry.includes(AclLevel::Cell, "acl", "acl-read"));
        assert!(!registry.includes(AclLevel::Cell, "auth", "acl-read"));
    }

    #[test]
    fn test_vocabularies_are_disjoint() {
        let registry = PrivilegeRegistry::standard();
        let cell = registry.vocabulary(AclLevel::Cell);
        let boxed = registry.vocabulary(AclLevel::Box);
        assert!(cell.names().all(|name| !boxed.contains(name)));
        assert!(boxed.contains("read-acl"));
        assert!(!cell.contains("read-acl"));
        assert!(!registry.includes(AclLevel::Cell, "read", "read"));
    }

    #[test]
    fn test_custom_vocabulary_with_cycle() {
        let vocabulary = Vocabulary::builder()
            .privilege("a", ["b"])
            .privilege("b", ["c", "a"])
            .build();
        assert!(vocabulary.includes("a", "c"));
        assert!(vocabulary.includes("b", "a"));
        assert!(!vocabulary.includes("c", "a"));
        assert!(!vocabulary.includes("a", "d"));
        assert_eq!(vocabulary.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("Cell".parse::<AclLevel>(), Ok(AclLevel::Cell));
        assert_eq!("box".parse::<AclLevel>(), Ok(AclLevel::Box));
        assert!("dav".parse::<AclLevel>().is_err());
    }
}
