mod changes;
mod client;
mod config;
mod conflict;
mod connection;
mod error;
mod filesystem;
mod item;
mod model;
mod path;
mod restore;
mod session;
mod share;
mod signer;

pub use changes::ChangeSet;
pub use client::{AccountDetails, Client, Resource};
pub use config::ClientConfig;
pub use conflict::{Exists, Operation, RestorePolicy, VersionConflict, validate};
pub use connection::{Body, Connection, RawResponse};
pub use error::{
    Error, ErrorFamily, ResolveFailure, ServerFailure, ServiceError, ServiceErrorKind,
    TransportError, translate,
};
pub use filesystem::{BatchResult, FileSystem};
pub use item::{
    DeleteOptions, FileAttrs, Item, Kind, ORIGINAL_PATH_KEY, Placement,
    SERVICE_ORIGINAL_PATH_KEY,
};
pub use model::{ItemType, Metadata, ShareInfo, ShareUpdate};
pub use path::{FolderRef, ItemRef, ROOT, resolve};
pub use session::Session;
pub use share::Share;
pub use signer::{AUTH_PREFIX, authorization, sign};

pub mod endpoints {
    pub use crate::client::{
        ENDPOINT_CUSTOMERS, ENDPOINT_FILES, ENDPOINT_FOLDERS, ENDPOINT_HISTORY, ENDPOINT_OAUTH,
        ENDPOINT_PING, ENDPOINT_SHARES, ENDPOINT_TRASH, ENDPOINT_USER_PROFILE,
    };
}
