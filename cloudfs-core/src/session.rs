use serde_json::Value;
use tracing::debug;

use crate::client::{AccountDetails, Client};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::filesystem::FileSystem;

/// Authentication lifecycle around one [`Client`].
///
/// A session links at most once. After [`Session::unlink`] it refuses to be
/// used again; create a new one instead.
#[derive(Debug)]
pub struct Session {
    client: Client,
    admin: Option<ClientConfig>,
    unlinked: bool,
}

impl Session {
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        Ok(Self {
            client: Client::new(config)?,
            admin: None,
            unlinked: false,
        })
    }

    /// Credentials of the account allowed to create end users.
    pub fn set_admin_credentials(&mut self, admin: ClientConfig) {
        self.admin = Some(admin);
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> Result<(), Error> {
        self.ensure_usable()?;
        if self.client.has_token() {
            return Err(Error::OperationNotAllowed(
                "session is already linked, create a new session to re-authenticate".to_string(),
            ));
        }
        self.client.authenticate(username, password).await
    }

    pub async fn is_linked(&self) -> bool {
        !self.unlinked && self.client.is_linked().await
    }

    pub fn unlink(&mut self) {
        self.client.unlink();
        self.unlinked = true;
        debug!("session unlinked");
    }

    pub fn filesystem(&self) -> Result<FileSystem, Error> {
        self.ensure_usable()?;
        Ok(FileSystem::new(self.client.clone()))
    }

    pub async fn user_profile(&self) -> Result<Value, Error> {
        self.ensure_usable()?;
        self.client.get_profile().await
    }

    /// Creates an end-user account with the admin credentials. Only allowed
    /// before this session is linked.
    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        details: &AccountDetails<'_>,
    ) -> Result<Value, Error> {
        self.ensure_usable()?;
        if self.client.has_token() {
            return Err(Error::OperationNotAllowed(
                "cannot create an account from a linked session".to_string(),
            ));
        }
        let admin = self
            .admin
            .as_ref()
            .ok_or_else(|| Error::argument("admin credentials are not set"))?;
        Client::new(admin)?
            .create_account(username, password, details)
            .await
    }

    fn ensure_usable(&self) -> Result<(), Error> {
        if self.unlinked {
            return Err(Error::OperationNotAllowed(
                "session has been unlinked, create a new session".to_string(),
            ));
        }
        Ok(())
    }
}
