use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::changes::ChangeSet;
use crate::client::{Client, Resource};
use crate::conflict::{Exists, Operation, RestorePolicy, VersionConflict};
use crate::error::Error;
use crate::model::{ItemType, Metadata};
use crate::path::{self, FolderRef, ROOT};
use crate::restore;

/// Application data key holding the parent address an item was trashed from.
pub const ORIGINAL_PATH_KEY: &str = "_original_path";
/// Same record as written by the service itself on trashed items.
pub const SERVICE_ORIGINAL_PATH_KEY: &str = "_bitcasa_original_path";

const DEFAULT_VERSION_LIMIT: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileAttrs {
    pub size: u64,
    pub mime: Option<String>,
    pub extension: Option<String>,
    pub blocklist_key: Option<String>,
    pub blocklist_id: Option<String>,
    pub is_mirrored: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    File(FileAttrs),
    Folder,
    Root,
}

/// Lifecycle of an item. Sharing is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Active,
    Trashed,
    Deleted,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Remove permanently instead of moving to the trash.
    pub commit: bool,
    /// Allow deleting a non-empty folder.
    pub force: bool,
}

/// Server properties of an item, replaced wholesale after every round trip.
#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    id: String,
    parent_id: Option<String>,
    name: String,
    version: i64,
    date_created: Option<i64>,
    date_meta_last_modified: Option<i64>,
    date_content_last_modified: Option<i64>,
    application_data: Map<String, Value>,
    kind: Kind,
}

impl From<Metadata> for Snapshot {
    fn from(meta: Metadata) -> Self {
        let kind = match meta.item_type {
            ItemType::Folder => Kind::Folder,
            ItemType::Root => Kind::Root,
            ItemType::File => Kind::File(FileAttrs {
                size: meta.size.unwrap_or_default(),
                mime: meta.mime,
                extension: meta.extension,
                blocklist_key: meta.blocklist_key,
                blocklist_id: meta.blocklist_id,
                is_mirrored: meta.is_mirrored.unwrap_or_default(),
            }),
        };
        Self {
            id: meta.id,
            parent_id: meta.parent_id,
            name: meta.name,
            version: meta.version,
            date_created: meta.date_created,
            date_meta_last_modified: meta.date_meta_last_modified,
            date_content_last_modified: meta.date_content_last_modified,
            application_data: meta.application_data.unwrap_or_default(),
            kind,
        }
    }
}

/// Local handle on a remote file or folder.
///
/// Reads never touch the network. Setters update the local value and record
/// the change for the next [`Item::save`]. Structural operations take
/// `&mut self` and swap in the server's view of the item when they succeed.
#[derive(Debug, Clone)]
pub struct Item {
    client: Client,
    snapshot: Snapshot,
    parent: String,
    placement: Placement,
    share_key: Option<String>,
    changes: ChangeSet,
    offset: u64,
}

impl Item {
    pub(crate) fn from_meta(client: Client, meta: Metadata, parent: Option<&str>) -> Self {
        Self {
            client,
            snapshot: meta.into(),
            parent: parent.map(path::absolute).unwrap_or_else(|| ROOT.to_string()),
            placement: Placement::Active,
            share_key: None,
            changes: ChangeSet::default(),
            offset: 0,
        }
    }

    pub(crate) fn trashed(mut self) -> Self {
        self.placement = Placement::Trashed;
        self
    }

    pub(crate) fn shared(mut self, share_key: &str) -> Self {
        self.share_key = Some(share_key.to_string());
        self
    }

    pub(crate) fn from_listing(
        client: &Client,
        listing: Vec<Metadata>,
        parent: Option<&str>,
    ) -> Vec<Item> {
        listing
            .into_iter()
            .map(|meta| Item::from_meta(client.clone(), meta, parent))
            .collect()
    }

    // --- properties --------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.snapshot.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.snapshot.parent_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.snapshot.name
    }

    pub fn version(&self) -> i64 {
        self.snapshot.version
    }

    pub fn date_created(&self) -> Option<i64> {
        self.snapshot.date_created
    }

    pub fn date_meta_last_modified(&self) -> Option<i64> {
        self.snapshot.date_meta_last_modified
    }

    pub fn date_content_last_modified(&self) -> Option<i64> {
        self.snapshot.date_content_last_modified
    }

    pub fn application_data(&self) -> &Map<String, Value> {
        &self.snapshot.application_data
    }

    pub fn kind(&self) -> &Kind {
        &self.snapshot.kind
    }

    pub fn is_file(&self) -> bool {
        matches!(self.snapshot.kind, Kind::File(_))
    }

    pub fn is_folder(&self) -> bool {
        !self.is_file()
    }

    pub fn is_root(&self) -> bool {
        self.snapshot.kind == Kind::Root
    }

    pub fn file_attrs(&self) -> Option<&FileAttrs> {
        match &self.snapshot.kind {
            Kind::File(attrs) => Some(attrs),
            _ => None,
        }
    }

    pub fn size(&self) -> Option<u64> {
        self.file_attrs().map(|attrs| attrs.size)
    }

    pub fn mime(&self) -> Option<&str> {
        self.file_attrs().and_then(|attrs| attrs.mime.as_deref())
    }

    pub fn extension(&self) -> Option<&str> {
        self.file_attrs().and_then(|attrs| attrs.extension.as_deref())
    }

    /// Server address, always derived from the parent address and id.
    pub fn address(&self) -> String {
        if self.is_root() {
            return ROOT.to_string();
        }
        path::resolve(Some(&self.parent), &self.snapshot.id)
    }

    pub fn parent_address(&self) -> &str {
        &self.parent
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn exists(&self) -> bool {
        self.placement != Placement::Deleted
    }

    pub fn in_trash(&self) -> bool {
        self.placement == Placement::Trashed
    }

    pub fn in_share(&self) -> bool {
        self.share_key.is_some()
    }

    pub fn share_key(&self) -> Option<&str> {
        self.share_key.as_deref()
    }

    pub fn pending_changes(&self) -> &ChangeSet {
        &self.changes
    }

    // --- local edits -------------------------------------------------------

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), Error> {
        self.ensure_mutable()?;
        let name = name.into();
        self.snapshot.name.clone_from(&name);
        self.changes.set_name(name);
        Ok(())
    }

    pub fn set_extension(&mut self, extension: impl Into<String>) -> Result<(), Error> {
        self.ensure_mutable()?;
        let extension = extension.into();
        self.file_attrs_mut("extension")?.extension = Some(extension.clone());
        self.changes.set_extension(extension);
        Ok(())
    }

    pub fn set_mime(&mut self, mime: impl Into<String>) -> Result<(), Error> {
        self.ensure_mutable()?;
        let mime = mime.into();
        self.file_attrs_mut("mime")?.mime = Some(mime.clone());
        self.changes.set_mime(mime);
        Ok(())
    }

    pub fn set_date_created(&mut self, value: i64) -> Result<(), Error> {
        self.ensure_mutable()?;
        self.snapshot.date_created = Some(value);
        self.changes.set_date_created(value);
        Ok(())
    }

    pub fn set_date_meta_last_modified(&mut self, value: i64) -> Result<(), Error> {
        self.ensure_mutable()?;
        self.snapshot.date_meta_last_modified = Some(value);
        self.changes.set_date_meta_last_modified(value);
        Ok(())
    }

    pub fn set_date_content_last_modified(&mut self, value: i64) -> Result<(), Error> {
        self.ensure_mutable()?;
        self.snapshot.date_content_last_modified = Some(value);
        self.changes.set_date_content_last_modified(value);
        Ok(())
    }

    /// Version sent with the next save for the conflict check.
    pub fn set_version(&mut self, version: i64) -> Result<(), Error> {
        self.ensure_mutable()?;
        self.snapshot.version = version;
        self.changes.set_version(version);
        Ok(())
    }

    /// Merges `delta` into the application data; keys not in `delta` keep
    /// their values.
    pub fn merge_application_data(&mut self, delta: Map<String, Value>) -> Result<(), Error> {
        self.ensure_mutable()?;
        self.changes.merge_application_data(&delta);
        self.snapshot.application_data.extend(delta);
        Ok(())
    }

    // --- structural operations ---------------------------------------------

    /// Moves this item into `destination`, keeping `name` or the current name.
    /// Unsaved local edits are discarded.
    pub async fn move_to<F: FolderRef>(
        &mut self,
        destination: F,
        name: Option<&str>,
        exists: Exists,
    ) -> Result<(), Error> {
        self.ensure_mutable()?;
        let target = destination_address(&destination)?;
        let name = self.target_name(name);
        let meta = self
            .client
            .transfer(
                self.resource(),
                Operation::Move,
                &self.address(),
                &target,
                &name,
                exists,
            )
            .await?;
        debug!(id = %self.id(), destination = %target, "moved item");
        self.replace(meta, &target);
        Ok(())
    }

    /// Copies this item into `destination` and returns the copy. Unsaved
    /// local edits stay on this item and are not part of the copy.
    pub async fn copy_to<F: FolderRef>(
        &self,
        destination: F,
        name: Option<&str>,
        exists: Exists,
    ) -> Result<Item, Error> {
        self.ensure_mutable()?;
        let target = destination_address(&destination)?;
        let name = self.target_name(name);
        let meta = self
            .client
            .transfer(
                self.resource(),
                Operation::Copy,
                &self.address(),
                &target,
                &name,
                exists,
            )
            .await?;
        Ok(Item::from_meta(self.client.clone(), meta, Some(&target)))
    }

    /// Moves the item to the trash, or removes it for good with `commit`.
    ///
    /// A trashed item moves into the trash namespace (`/<id>`) and remembers
    /// its former parent under [`ORIGINAL_PATH_KEY`]. Deleting a trashed item
    /// without `commit` does nothing.
    pub async fn delete(&mut self, options: DeleteOptions) -> Result<(), Error> {
        self.ensure_exists()?;
        self.ensure_not_shared()?;

        if self.in_trash() {
            if options.commit {
                self.client.delete_trash_item(&self.address()).await?;
                self.placement = Placement::Deleted;
                self.changes.clear();
                debug!(id = %self.id(), "removed item from trash");
            }
            return Ok(());
        }

        match self.resource() {
            Resource::Folders => {
                self.client
                    .delete_folder(&self.address(), options.commit, options.force)
                    .await?
            }
            Resource::Files => self.client.delete_file(&self.address(), options.commit).await?,
        }

        if options.commit {
            self.placement = Placement::Deleted;
            debug!(id = %self.id(), "deleted item permanently");
        } else {
            let original = std::mem::replace(&mut self.parent, ROOT.to_string());
            self.snapshot
                .application_data
                .insert(ORIGINAL_PATH_KEY.to_string(), Value::String(original));
            self.placement = Placement::Trashed;
            debug!(id = %self.id(), address = %self.address(), "moved item to trash");
        }
        self.changes.clear();
        Ok(())
    }

    /// Like [`Item::delete`] but reports service and transport failures as
    /// `Ok(false)` instead of an error. Local state violations still fail.
    pub async fn delete_suppressed(&mut self, options: DeleteOptions) -> Result<bool, Error> {
        let result = self.delete(options).await;
        suppress(result, "delete", self.id())
    }

    /// Restores a trashed item and re-reads it from wherever it landed.
    ///
    /// `destination` is the rescue folder for [`RestorePolicy::Rescue`] and a
    /// path of folder names for [`RestorePolicy::Recreate`].
    pub async fn restore(
        &mut self,
        destination: Option<&dyn FolderRef>,
        policy: RestorePolicy,
    ) -> Result<(), Error> {
        self.ensure_exists()?;
        if !self.in_trash() {
            return Err(Error::OperationNotAllowed(
                "item needs to be in trash to be restored".to_string(),
            ));
        }
        let destination = match destination {
            Some(destination) => Some(destination_address(destination)?),
            None => None,
        };

        self.client
            .recover_trash_item(&self.address(), policy, destination.as_deref())
            .await?;
        let original = self.original_parent();
        let located = restore::locate(
            &self.client,
            self.resource(),
            self.id(),
            original.as_deref(),
            destination.as_deref(),
            policy,
        )
        .await?;
        debug!(id = %self.id(), parent = %located.parent, "restored item");
        self.replace(located.meta, &located.parent);
        Ok(())
    }

    pub async fn restore_suppressed(
        &mut self,
        destination: Option<&dyn FolderRef>,
        policy: RestorePolicy,
    ) -> Result<bool, Error> {
        let result = self.restore(destination, policy).await;
        suppress(result, "restore", self.id())
    }

    /// Sends pending edits with the current version and adopts the server's
    /// answer.
    pub async fn save(&mut self, conflict: VersionConflict) -> Result<(), Error> {
        self.ensure_mutable()?;
        let meta = self
            .client
            .alter_meta(
                self.resource(),
                &self.address(),
                self.snapshot.version,
                conflict,
                &self.changes,
            )
            .await?;
        let parent = self.parent.clone();
        self.replace(meta, &parent);
        Ok(())
    }

    /// Stored versions of a file, newest first as the service returns them.
    pub async fn versions(&self) -> Result<Vec<Item>, Error> {
        self.ensure_mutable()?;
        self.ensure_file("versions")?;
        let listing = self
            .client
            .list_file_versions(&self.address(), 0, None, DEFAULT_VERSION_LIMIT)
            .await?;
        Ok(Item::from_listing(&self.client, listing, Some(&self.parent)))
    }

    // --- folder operations -------------------------------------------------

    /// Children of this folder, from the trash or a share when the folder
    /// lives there.
    pub async fn list(&self) -> Result<Vec<Item>, Error> {
        self.ensure_exists()?;
        self.ensure_folder("list")?;
        let address = self.address();
        if self.in_trash() {
            let listing = self.client.browse_trash(Some(&address)).await?;
            return Ok(Item::from_listing(&self.client, listing, Some(&address))
                .into_iter()
                .map(Item::trashed)
                .collect());
        }
        if let Some(share_key) = &self.share_key {
            let listing = self.client.browse_share(share_key, Some(&address)).await?;
            return Ok(Item::from_listing(&self.client, listing, Some(&address))
                .into_iter()
                .map(|item| item.shared(share_key))
                .collect());
        }
        let listing = self.client.list_folder(&address, 1, None, false).await?;
        Ok(Item::from_listing(&self.client, listing, Some(&address)))
    }

    pub async fn create_folder(&self, name: &str, exists: Exists) -> Result<Item, Error> {
        path::require(name, "folder name")?;
        self.ensure_mutable()?;
        self.ensure_folder("create folder")?;
        let address = self.address();
        let meta = self.client.create_folder(&address, name, exists).await?;
        Ok(Item::from_meta(self.client.clone(), meta, Some(&address)))
    }

    pub async fn upload(
        &self,
        source: &Path,
        name: Option<&str>,
        exists: Exists,
    ) -> Result<Item, Error> {
        self.ensure_mutable()?;
        self.ensure_folder("upload")?;
        let address = self.address();
        let meta = self.client.upload(&address, source, name, exists).await?;
        Ok(Item::from_meta(self.client.clone(), meta, Some(&address)))
    }

    // --- file content ------------------------------------------------------

    /// Saves the file into `dir`, under `filename` or its own name. Content
    /// goes to a `.partial` file that is renamed once complete.
    pub async fn download(&self, dir: &Path, filename: Option<&str>) -> Result<PathBuf, Error> {
        if !dir.is_dir() {
            return Err(Error::argument(format!(
                "`{}` is not a directory",
                dir.display()
            )));
        }
        self.ensure_mutable()?;
        self.ensure_file("download")?;

        let filename = filename
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(self.snapshot.name.as_str());
        let target = dir.join(filename);
        let partial = partial_path(&target);

        let mut file = File::create(&partial).await?;
        let result = self.write_content(&mut file).await;
        drop(file);
        if let Err(err) = result {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
        tokio::fs::rename(&partial, &target).await?;
        debug!(id = %self.id(), target = %target.display(), "downloaded file");
        Ok(target)
    }

    async fn write_content(&self, file: &mut File) -> Result<(), Error> {
        let response = self.client.open_download(&self.address(), 0, 0).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Reads up to `bytecount` bytes (the rest of the file for `None`) from
    /// the current position, handing chunks to `on_chunk` as they arrive.
    /// Returns the number of bytes delivered.
    pub async fn read<F>(&mut self, bytecount: Option<u64>, mut on_chunk: F) -> Result<u64, Error>
    where
        F: FnMut(&[u8]) -> Result<(), Error>,
    {
        self.ensure_mutable()?;
        let size = self.ensure_file("read")?.size;
        if bytecount == Some(0) || self.offset >= size {
            return Ok(0);
        }
        let remaining = size - self.offset;
        let count = bytecount.map_or(remaining, |count| count.min(remaining));

        let mut delivered = 0u64;
        let result = self
            .client
            .download(&self.address(), self.offset, count, |chunk| {
                delivered += chunk.len() as u64;
                on_chunk(chunk)
            })
            .await;
        self.offset += delivered;
        result.map(|()| delivered)
    }

    pub async fn read_to_vec(&mut self, bytecount: Option<u64>) -> Result<Vec<u8>, Error> {
        let mut buffer = Vec::new();
        self.read(bytecount, |chunk| {
            buffer.extend_from_slice(chunk);
            Ok(())
        })
        .await?;
        Ok(buffer)
    }

    /// Moves the read position. Positions past the end are allowed and read
    /// nothing.
    pub fn seek(&mut self, position: SeekFrom) -> Result<u64, Error> {
        let size = self.ensure_file("seek")?.size;
        let target = match position {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
            SeekFrom::End(delta) => size.checked_add_signed(delta),
        };
        self.offset = target.ok_or_else(|| {
            Error::argument("invalid seek to a negative or overflowing position")
        })?;
        Ok(self.offset)
    }

    pub fn tell(&self) -> u64 {
        self.offset
    }

    pub fn rewind(&mut self) {
        self.offset = 0;
    }

    // --- internals ---------------------------------------------------------

    pub(crate) fn ensure_exists(&self) -> Result<(), Error> {
        if self.placement == Placement::Deleted {
            return Err(Error::InvalidItem(format!(
                "`{}` does not exist anymore",
                self.snapshot.id
            )));
        }
        Ok(())
    }

    /// Exists, not in the trash and not share-sourced.
    pub(crate) fn ensure_mutable(&self) -> Result<(), Error> {
        self.ensure_exists()?;
        if self.in_trash() {
            return Err(Error::OperationNotAllowed(
                "operation not allowed as item is in trash".to_string(),
            ));
        }
        self.ensure_not_shared()
    }

    fn ensure_not_shared(&self) -> Result<(), Error> {
        if self.in_share() {
            return Err(Error::OperationNotAllowed(
                "operation not allowed as item is in share".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_file(&self, operation: &str) -> Result<&FileAttrs, Error> {
        self.file_attrs().ok_or_else(|| {
            Error::OperationNotAllowed(format!("{operation} is only available for files"))
        })
    }

    fn ensure_folder(&self, operation: &str) -> Result<(), Error> {
        if !self.is_folder() {
            return Err(Error::OperationNotAllowed(format!(
                "{operation} is only available for folders"
            )));
        }
        Ok(())
    }

    fn file_attrs_mut(&mut self, property: &str) -> Result<&mut FileAttrs, Error> {
        match &mut self.snapshot.kind {
            Kind::File(attrs) => Ok(attrs),
            _ => Err(Error::OperationNotAllowed(format!(
                "folders have no {property}"
            ))),
        }
    }

    fn resource(&self) -> Resource {
        if self.is_folder() {
            Resource::Folders
        } else {
            Resource::Files
        }
    }

    fn target_name(&self, name: Option<&str>) -> String {
        name.filter(|n| !n.trim().is_empty())
            .unwrap_or(self.snapshot.name.as_str())
            .to_string()
    }

    fn original_parent(&self) -> Option<String> {
        let data = &self.snapshot.application_data;
        data.get(ORIGINAL_PATH_KEY)
            .or_else(|| data.get(SERVICE_ORIGINAL_PATH_KEY))
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string)
    }

    /// Swaps in a fresh snapshot after a successful round trip.
    fn replace(&mut self, meta: Metadata, parent: &str) {
        self.snapshot = meta.into();
        self.parent = path::absolute(parent);
        self.placement = Placement::Active;
        self.changes.clear();
        self.offset = 0;
    }
}

/// Address of a destination folder, rejecting folder items that cannot
/// receive anything.
fn destination_address<F: FolderRef + ?Sized>(destination: &F) -> Result<String, Error> {
    if let Some(item) = destination.as_item() {
        item.ensure_mutable()?;
    }
    destination.folder_address()
}

fn suppress(result: Result<(), Error>, operation: &str, id: &str) -> Result<bool, Error> {
    match result {
        Ok(()) => Ok(true),
        Err(err @ (Error::Service(_) | Error::Transport(_) | Error::UnresolvedPath { .. })) => {
            warn!(%id, error = %err, "{operation} failed");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
