use serde_json::Value;

use crate::client::Client;
use crate::conflict::{Exists, RestorePolicy};
use crate::error::Error;
use crate::item::{DeleteOptions, Item};
use crate::path::{FolderRef, ItemRef, ROOT};
use crate::share::Share;

/// Per-item outcomes of a batch operation, in input order.
pub type BatchResult<T> = Result<Vec<Result<T, Error>>, Error>;

/// Entry point to the linked user's files, folders, trash and shares.
///
/// Batch operations process every item even when some fail; the outer
/// `Result` only fails for input that was rejected as a whole.
#[derive(Debug, Clone)]
pub struct FileSystem {
    client: Client,
}

impl FileSystem {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn root(&self) -> Result<Item, Error> {
        let meta = self.client.get_folder_meta(ROOT).await?;
        Ok(Item::from_meta(self.client.clone(), meta, None))
    }

    /// Children of a folder given by address or as a folder item.
    pub async fn list<F: FolderRef>(&self, folder: F) -> Result<Vec<Item>, Error> {
        if let Some(item) = folder.as_item() {
            return item.list().await;
        }
        let address = folder.folder_address()?;
        let listing = self.client.list_folder(&address, 1, None, false).await?;
        Ok(Item::from_listing(&self.client, listing, Some(&address)))
    }

    pub async fn move_items<F: FolderRef>(
        &self,
        items: &mut [Item],
        destination: F,
        exists: Exists,
    ) -> BatchResult<()> {
        require_items(items.len())?;
        let mut results = Vec::with_capacity(items.len());
        for item in items.iter_mut() {
            results.push(item.move_to(&destination, None, exists).await);
        }
        Ok(results)
    }

    pub async fn copy_items<F: FolderRef>(
        &self,
        items: &[Item],
        destination: F,
        exists: Exists,
    ) -> BatchResult<Item> {
        require_items(items.len())?;
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            results.push(item.copy_to(&destination, None, exists).await);
        }
        Ok(results)
    }

    pub async fn delete_items(&self, items: &mut [Item], options: DeleteOptions) -> BatchResult<()> {
        require_items(items.len())?;
        let mut results = Vec::with_capacity(items.len());
        for item in items.iter_mut() {
            results.push(item.delete(options).await);
        }
        Ok(results)
    }

    pub async fn restore_items(
        &self,
        items: &mut [Item],
        destination: Option<&dyn FolderRef>,
        policy: RestorePolicy,
    ) -> BatchResult<()> {
        require_items(items.len())?;
        let mut results = Vec::with_capacity(items.len());
        for item in items.iter_mut() {
            results.push(item.restore(destination, policy).await);
        }
        Ok(results)
    }

    /// Restores trash entries known only by their trash address. Nothing is
    /// re-read afterwards since there is no item to update.
    pub async fn restore_paths(
        &self,
        paths: &[&str],
        destination: Option<&str>,
        policy: RestorePolicy,
    ) -> BatchResult<()> {
        require_items(paths.len())?;
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            results.push(
                self.client
                    .recover_trash_item(path, policy, destination)
                    .await,
            );
        }
        Ok(results)
    }

    pub async fn browse_trash(&self) -> Result<Vec<Item>, Error> {
        let listing = self.client.browse_trash(None).await?;
        Ok(Item::from_listing(&self.client, listing, None)
            .into_iter()
            .map(Item::trashed)
            .collect())
    }

    /// Versions of the file at `path`. For an [`Item`] use [`Item::versions`].
    pub async fn list_file_versions(&self, path: &str) -> Result<Vec<Item>, Error> {
        let path = path.item_address()?;
        let listing = self.client.list_file_versions(&path, 0, None, 10).await?;
        let parent = path
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .filter(|parent| !parent.is_empty());
        Ok(Item::from_listing(&self.client, listing, parent))
    }

    pub async fn list_shares(&self) -> Result<Vec<Share>, Error> {
        self.client
            .list_shares()
            .await?
            .into_iter()
            .map(|info| Share::from_info(self.client.clone(), info))
            .collect()
    }

    /// One share covering every item, created in a single request.
    pub async fn create_share<I: ItemRef>(&self, items: &[I]) -> Result<Share, Error> {
        require_items(items.len())?;
        let paths = items
            .iter()
            .map(ItemRef::item_address)
            .collect::<Result<Vec<_>, _>>()?;
        let info = self.client.create_share(&paths).await?;
        Share::from_info(self.client.clone(), info)
    }

    /// Recent actions on the account; `start` is usually negative and counts
    /// back from the latest entry.
    pub async fn action_history(&self, start: i64, stop: i64) -> Result<Value, Error> {
        self.client.list_history(start, stop).await
    }
}

fn require_items(len: usize) -> Result<(), Error> {
    if len == 0 {
        return Err(Error::argument("expected at least one item"));
    }
    Ok(())
}
