use serde::{Deserialize, Serialize};

use crate::error::{TypesError, TypesResult};
use crate::post::Post;

/// A wallet account able to authorize transactions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    address: String,
}

impl Account {
    /// Create an account, normalizing the address to lowercase
    pub fn new(address: impl AsRef<str>) -> Self {
        Self {
            address: address.as_ref().trim().to_lowercase(),
        }
    }

    /// Create an account from user input, rejecting blank addresses
    pub fn parse(address: &str) -> TypesResult<Self> {
        if address.trim().is_empty() {
            return Err(TypesError::InvalidAddress("address must not be empty".to_string()));
        }
        Ok(Self::new(address))
    }

    /// The lowercase account address
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Connection state of the wallet, passed explicitly into every operation
/// that needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletSession {
    account: Option<Account>,
}

impl WalletSession {
    pub fn disconnected() -> Self {
        Self { account: None }
    }

    pub fn connected(account: Account) -> Self {
        Self {
            account: Some(account),
        }
    }

    /// A session is connected only while it holds an account
    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn set_account(&mut self, account: Account) {
        self.account = Some(account);
    }

    pub fn disconnect(&mut self) {
        self.account = None;
    }
}

/// Whether edit and delete controls should be offered for `post`.
///
/// This is a display gate, not an authorization check.
pub fn is_owner(post: &Post, session: &WalletSession) -> bool {
    match session.account() {
        Some(account) => post.author == account.address().to_lowercase(),
        None => false,
    }
}
