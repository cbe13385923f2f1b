//! Canonical URL forms for cells, accounts and roles.
//!
//! A cell is identified by its URL with a trailing slash. Everything a cell
//! owns is addressed relative to that root:
//!
//! - accounts: `{cell}#{account}` (the token subject for password grants)
//! - roles: `{cell}__role/{box}/{role}`, with `__` standing in for "no box"

use std::fmt;

const ROLE_SEGMENT: &str = "__role/";
const NO_BOX: &str = "__";

/// Append the trailing slash a canonical cell URL always carries.
pub fn normalize_cell_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// Compare two cell URLs after normalization.
pub fn same_cell(a: &str, b: &str) -> bool {
    normalize_cell_url(a) == normalize_cell_url(b)
}

/// Subject URL for an account of a cell.
pub fn account_subject(cell_url: &str, account: &str) -> String {
    format!("{}#{}", normalize_cell_url(cell_url), account)
}

/// A role, scoped to a cell and optionally to one box inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Role {
    pub cell_url: String,
    pub box_name: Option<String>,
    pub name: String,
}

impl Role {
    pub fn new(cell_url: &str, box_name: Option<&str>, name: &str) -> Self {
        Self {
            cell_url: normalize_cell_url(cell_url),
            box_name: box_name.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// The canonical role URL, the only form ACL principals and tokens carry.
    pub fn url(&self) -> String {
        format!(
            "{}{}{}/{}",
            self.cell_url,
            ROLE_SEGMENT,
            self.box_name.as_deref().unwrap_or(NO_BOX),
            self.name
        )
    }

    /// Parse a canonical role URL. Bare role names and foreign URL shapes yield `None`.
    pub fn parse(url: &str) -> Option<Self> {
        let marker = format!("/{ROLE_SEGMENT}");
        let idx = url.find(&marker)?;
        let cell_url = &url[..=idx];
        let rest = &url[idx + marker.len()..];
        let (box_part, name) = rest.split_once('/')?;
        if box_part.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        if !cell_url.contains("://") {
            return None;
        }
        let box_name = (box_part != NO_BOX).then_some(box_part);
        Some(Self::new(cell_url, box_name, name))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
