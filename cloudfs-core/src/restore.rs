use tracing::debug;

use crate::client::{Client, Resource};
use crate::conflict::RestorePolicy;
use crate::error::{Error, ResolveFailure};
use crate::model::Metadata;
use crate::path::{self, ROOT};

/// Where a restored item ended up: its parent address and fresh metadata.
#[derive(Debug)]
pub(crate) struct Located {
    pub parent: String,
    pub meta: Metadata,
}

/// Finds a just-restored item.
///
/// The recorded original parent is tried first. When that lookup fails the
/// policy decides: `Fail` propagates the error, `Rescue` looks under
/// `destination`, `Recreate` walks `destination` as a path of folder names
/// and looks under the folder it names.
pub(crate) async fn locate(
    client: &Client,
    resource: Resource,
    id: &str,
    original_parent: Option<&str>,
    destination: Option<&str>,
    policy: RestorePolicy,
) -> Result<Located, Error> {
    let first = match original_parent {
        Some(parent) => fetch(client, resource, parent, id).await,
        None => Err(Error::InvalidItem(format!(
            "no original location recorded for `{id}`"
        ))),
    };
    let err = match first {
        Ok(located) => return Ok(located),
        Err(err) => err,
    };

    let destination = destination
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(ROOT);
    match policy {
        RestorePolicy::Fail => Err(err),
        RestorePolicy::Rescue => {
            debug!(%id, %destination, error = %err, "original location unavailable, trying rescue path");
            fetch(client, resource, &path::absolute(destination), id).await
        }
        RestorePolicy::Recreate => {
            debug!(%id, %destination, error = %err, "original location unavailable, resolving recreate path");
            let parent = resolve_named(client, destination).await?;
            fetch(client, resource, &parent, id).await
        }
    }
}

/// Turns a path of folder names (`/Photos/2019`) into an id address by
/// listing each level filtered by the next name. Every segment must match
/// exactly one folder.
pub(crate) async fn resolve_named(client: &Client, named: &str) -> Result<String, Error> {
    let mut address = ROOT.to_string();
    for segment in named.split('/').filter(|s| !s.is_empty()) {
        let filter = format!("name={segment}");
        let listing = client
            .list_folder(&address, 1, Some(&filter), false)
            .await?;
        let mut matches = listing
            .into_iter()
            .filter(|meta| meta.item_type.is_folder() && meta.name == segment);
        let found = match (matches.next(), matches.next()) {
            (Some(found), None) => found,
            (None, _) => return Err(unresolved(named, segment, ResolveFailure::NotFound)),
            (Some(_), Some(_)) => return Err(unresolved(named, segment, ResolveFailure::Ambiguous)),
        };
        address = path::resolve(Some(&address), &found.id);
        debug!(%segment, %address, "resolved path segment");
    }
    Ok(address)
}

async fn fetch(
    client: &Client,
    resource: Resource,
    parent: &str,
    id: &str,
) -> Result<Located, Error> {
    let meta = client
        .get_meta(resource, &path::resolve(Some(parent), id))
        .await?;
    Ok(Located {
        parent: parent.to_string(),
        meta,
    })
}

fn unresolved(path: &str, segment: &str, reason: ResolveFailure) -> Error {
    Error::UnresolvedPath {
        path: path.to_string(),
        segment: segment.to_string(),
        reason,
    }
}
