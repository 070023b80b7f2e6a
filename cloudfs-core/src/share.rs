use tracing::debug;

use crate::client::Client;
use crate::conflict::Exists;
use crate::error::Error;
use crate::item::Item;
use crate::model::{ShareInfo, ShareUpdate};
use crate::path::require;

/// A named alias over a set of item addresses, identified by its share key.
#[derive(Debug, Clone)]
pub struct Share {
    client: Client,
    info: ShareInfo,
    name: Option<String>,
    deleted: bool,
}

impl Share {
    pub(crate) fn from_info(client: Client, info: ShareInfo) -> Result<Self, Error> {
        if info.share_key.trim().is_empty() {
            return Err(Error::InvalidShare("missing share key".to_string()));
        }
        let name = info.share_name.clone();
        Ok(Self {
            client,
            info,
            name,
            deleted: false,
        })
    }

    pub fn share_key(&self) -> &str {
        &self.info.share_key
    }

    /// Current name, including an unsaved rename.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn share_type(&self) -> Option<&str> {
        self.info.share_type.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.info.url.as_deref()
    }

    pub fn short_url(&self) -> Option<&str> {
        self.info.short_url.as_deref()
    }

    pub fn size(&self) -> Option<u64> {
        self.info.share_size
    }

    pub fn date_created(&self) -> Option<i64> {
        self.info.date_created
    }

    pub fn info(&self) -> &ShareInfo {
        &self.info
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Items at the top of the share. They are read-only.
    pub async fn list(&self) -> Result<Vec<Item>, Error> {
        self.ensure_valid()?;
        let key = self.share_key();
        let listing = self.client.browse_share(key, None).await?;
        Ok(Item::from_listing(&self.client, listing, None)
            .into_iter()
            .map(|item| item.shared(key))
            .collect())
    }

    pub async fn delete(&mut self) -> Result<(), Error> {
        self.ensure_valid()?;
        self.client.delete_share(self.share_key()).await?;
        self.deleted = true;
        debug!(share_key = %self.share_key(), "deleted share");
        Ok(())
    }

    pub async fn set_password(
        &mut self,
        password: &str,
        current_password: Option<&str>,
    ) -> Result<(), Error> {
        self.ensure_valid()?;
        require(password, "password")?;
        let update = ShareUpdate {
            current_password,
            password: Some(password),
            name: None,
        };
        let info = self
            .client
            .alter_share_info(self.share_key(), &update)
            .await?;
        self.replace(info);
        Ok(())
    }

    /// Renames locally; [`Share::save`] sends it.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), Error> {
        self.ensure_valid()?;
        self.name = Some(name.into());
        Ok(())
    }

    /// Sends the current name. Password protected shares need `password`.
    pub async fn save(&mut self, password: Option<&str>) -> Result<(), Error> {
        self.ensure_valid()?;
        let update = ShareUpdate {
            current_password: password,
            password: None,
            name: self.name.as_deref(),
        };
        let info = self
            .client
            .alter_share_info(self.share_key(), &update)
            .await?;
        self.replace(info);
        Ok(())
    }

    /// Copies the shared items into `path` (the root for `None`) of the
    /// linked user's filesystem.
    pub async fn receive(&self, path: Option<&str>, exists: Exists) -> Result<Vec<Item>, Error> {
        self.ensure_valid()?;
        let listing = self
            .client
            .receive_share(self.share_key(), path, exists)
            .await?;
        Ok(Item::from_listing(&self.client, listing, path))
    }

    pub async fn unlock(&self, password: &str) -> Result<(), Error> {
        self.ensure_valid()?;
        self.client.unlock_share(self.share_key(), password).await
    }

    fn ensure_valid(&self) -> Result<(), Error> {
        if self.deleted {
            return Err(Error::InvalidShare(format!(
                "share `{}` has been deleted",
                self.info.share_key
            )));
        }
        Ok(())
    }

    fn replace(&mut self, info: ShareInfo) {
        self.name = info.share_name.clone();
        self.info = info;
    }
}
