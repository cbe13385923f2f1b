//! Accounts, account roles and external role links of one cell.
//!
//! The engine reaches storage only through [`CellDirectory`]. An in-memory
//! implementation is provided for embedding and tests.

use std::fmt;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use cellauth_token::normalize_cell_url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory backend failure: {0}")]
    Backend(String),

    #[error("invalid stored credential: {0}")]
    InvalidCredential(String),
}

/// Argon2id hash of "dummy" under the default parameters. Never matches a
/// real password but costs as much to check as a real hash.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$Y2VsbGF1dGgtZHVtbXk$75VKY5PmAjquZ0/QUKnE99CZniV9rG7izNewitJ92zE";

/// Argon2 hash of an account password, kept as a PHC string.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredCredential {
    phc: String,
}

impl StoredCredential {
    /// Hash `password` with a fresh random salt and the default Argon2 parameters.
    pub fn new(password: &str) -> Result<Self, DirectoryError> {
        let salt = SaltString::generate(&mut OsRng);
        let phc = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| DirectoryError::InvalidCredential(e.to_string()))?
            .to_string();
        Ok(Self { phc })
    }

    /// Wrap a PHC string read back from storage.
    pub fn from_phc(phc: &str) -> Result<Self, DirectoryError> {
        PasswordHash::new(phc).map_err(|e| DirectoryError::InvalidCredential(e.to_string()))?;
        Ok(Self {
            phc: phc.to_string(),
        })
    }

    pub fn as_phc(&self) -> &str {
        &self.phc
    }

    /// Checks `password` against a hash no account has, so an unknown
    /// account costs the same as a wrong password.
    pub fn verify_dummy(password: &str) {
        if let Ok(parsed) = PasswordHash::new(DUMMY_HASH) {
            let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
        }
    }

    pub fn matches(&self, password: &str) -> bool {
        match PasswordHash::new(&self.phc) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoredCredential(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub name: String,
    pub credential: StoredCredential,
    /// Unix seconds of the last successful password grant
    pub last_authenticated: Option<i64>,
}

/// Storage the authentication engine needs from its cell.
///
/// Role values are canonical role URLs.
#[async_trait]
pub trait CellDirectory: Send + Sync {
    async fn find_account(&self, name: &str) -> Result<Option<AccountRecord>, DirectoryError>;

    async fn roles_of_account(&self, name: &str) -> Result<Vec<String>, DirectoryError>;

    /// Local roles linked to `foreign_cell` as a whole (`foreign_role` is
    /// `None`) or to one of its roles.
    async fn linked_roles(
        &self,
        foreign_cell: &str,
        foreign_role: Option<&str>,
    ) -> Result<Vec<String>, DirectoryError>;

    async fn record_authentication(&self, name: &str, at: i64) -> Result<(), DirectoryError>;
}

/// [`CellDirectory`] held in concurrent maps.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    accounts: DashMap<String, AccountRecord>,
    account_roles: DashMap<String, Vec<String>>,
    links: DashMap<(String, Option<String>), Vec<String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, name: &str, password: &str) -> Result<(), DirectoryError> {
        self.insert_account(name, StoredCredential::new(password)?);
        Ok(())
    }

    pub fn insert_account(&self, name: &str, credential: StoredCredential) {
        self.accounts.insert(
            name.to_string(),
            AccountRecord {
                name: name.to_string(),
                credential,
                last_authenticated: None,
            },
        );
    }

    pub fn link_account_role(&self, account: &str, role_url: &str) {
        push_unique(
            self.account_roles.entry(account.to_string()).or_default().value_mut(),
            role_url,
        );
    }

    /// Every token issued by `foreign_cell` also carries `role_url` here.
    pub fn link_external_cell(&self, foreign_cell: &str, role_url: &str) {
        let key = (normalize_cell_url(foreign_cell), None);
        push_unique(self.links.entry(key).or_default().value_mut(), role_url);
    }

    /// `foreign_role` (a role URL of `foreign_cell`) maps to `role_url` here.
    pub fn link_external_role(&self, foreign_cell: &str, foreign_role: &str, role_url: &str) {
        let key = (
            normalize_cell_url(foreign_cell),
            Some(foreign_role.to_string()),
        );
        push_unique(self.links.entry(key).or_default().value_mut(), role_url);
    }

    pub fn last_authenticated(&self, account: &str) -> Option<i64> {
        self.accounts
            .get(account)
            .and_then(|record| record.last_authenticated)
    }
}

fn push_unique(roles: &mut Vec<String>, role_url: &str) {
    if !roles.iter().any(|role| role == role_url) {
        roles.push(role_url.to_string());
    }
}

#[async_trait]
impl CellDirectory for InMemoryDirectory {
    async fn find_account(&self, name: &str) -> Result<Option<AccountRecord>, DirectoryError> {
        Ok(self.accounts.get(name).map(|record| record.clone()))
    }

    async fn roles_of_account(&self, name: &str) -> Result<Vec<String>, DirectoryError> {
        Ok(self
            .account_roles
            .get(name)
            .map(|roles| roles.clone())
            .unwrap_or_default())
    }

    async fn linked_roles(
        &self,
        foreign_cell: &str,
        foreign_role: Option<&str>,
    ) -> Result<Vec<String>, DirectoryError> {
        let key = (normalize_cell_url(foreign_cell), foreign_role.map(str::to_string));
        Ok(self
            .links
            .get(&key)
            .map(|roles| roles.clone())
            .unwrap_or_default())
    }

    async fn record_authentication(&self, name: &str, at: i64) -> Result<(), DirectoryError> {
        match self.accounts.get_mut(name) {
            Some(mut record) => {
                record.last_authenticated = Some(at);
                Ok(())
            }
            None => Err(DirectoryError::Backend(format!("no account named {name}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_matches() {
        let credential = StoredCredential::new("s3cret").unwrap();
        assert!(credential.matches("s3cret"));
        assert!(!credential.matches("s3cret "));
        assert!(!format!("{:?}", credential).contains("argon2"));
    }

    #[test]
    fn test_credential_is_argon2_phc() {
        let credential = StoredCredential::new("pw").unwrap();
        assert!(credential.as_phc().starts_with("$argon2id$v=19$m=19456,t=2,p=1$"));
        assert_ne!(credential, StoredCredential::new("pw").unwrap());

        let restored = StoredCredential::from_phc(credential.as_phc()).unwrap();
        assert!(restored.matches("pw"));
        assert!(!restored.matches("pW"));

        assert!(StoredCredential::from_phc("sha256$00$beef").is_err());
        assert!(!StoredCredential::from_phc(DUMMY_HASH).unwrap().matches("dummy "));
    }

    #[tokio::test]
    async fn test_in_memory_directory() {
        let directory = InMemoryDirectory::new();
        directory.add_account("user001", "pw").unwrap();
        directory.link_account_role("user001", "https://example.com/cell1/__role/__/reader");
        directory.link_account_role("user001", "https://example.com/cell1/__role/__/reader");
        directory.link_external_cell("https://example.com/cell2", "https://example.com/cell1/__role/__/guest");

        assert!(directory.find_account("user001").await.unwrap().is_some());
        assert!(directory.find_account("nobody").await.unwrap().is_none());
        assert_eq!(directory.roles_of_account("user001").await.unwrap().len(), 1);
        assert_eq!(
            directory
                .linked_roles("https://example.com/cell2/", None)
                .await
                .unwrap(),
            vec!["https://example.com/cell1/__role/__/guest".to_string()]
        );

        assert_eq!(directory.last_authenticated("user001"), None);
        directory.record_authentication("user001", 42).await.unwrap();
        assert_eq!(directory.last_authenticated("user001"), Some(42));
        assert!(directory.record_authentication("nobody", 42).await.is_err());
    }
}
