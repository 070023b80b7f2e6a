use crate::error::Error;
use crate::item::Item;

pub const ROOT: &str = "/";

/// Address of `id` under `parent`. A root or absent parent yields `/<id>`.
pub fn resolve(parent: Option<&str>, id: &str) -> String {
    match parent {
        None | Some(ROOT) | Some("") => format!("/{id}"),
        Some(parent) => format!("{}/{id}", parent.trim_end_matches('/')),
    }
}

/// Prefixes a leading `/` when missing; blank becomes the root.
pub(crate) fn absolute(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        ROOT.to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

pub(crate) fn require(value: &str, what: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::argument(format!("must pass a valid {what}")));
    }
    Ok(())
}

/// Anything that can name a folder: a raw address or a folder item.
pub trait FolderRef {
    fn folder_address(&self) -> Result<String, Error>;

    /// The item behind the reference, when there is one, for state checks.
    fn as_item(&self) -> Option<&Item> {
        None
    }
}

impl FolderRef for str {
    fn folder_address(&self) -> Result<String, Error> {
        require(self, "folder address")?;
        Ok(self.trim().to_string())
    }
}

impl FolderRef for String {
    fn folder_address(&self) -> Result<String, Error> {
        self.as_str().folder_address()
    }
}

impl FolderRef for Item {
    fn folder_address(&self) -> Result<String, Error> {
        if !self.is_folder() {
            return Err(Error::argument(format!(
                "expected a folder, `{}` is a file",
                self.address()
            )));
        }
        Ok(self.address())
    }

    fn as_item(&self) -> Option<&Item> {
        Some(self)
    }
}

impl<T: FolderRef + ?Sized> FolderRef for &T {
    fn folder_address(&self) -> Result<String, Error> {
        (**self).folder_address()
    }

    fn as_item(&self) -> Option<&Item> {
        (**self).as_item()
    }
}

/// Anything that can name an item of either kind.
pub trait ItemRef {
    fn item_address(&self) -> Result<String, Error>;
}

impl ItemRef for str {
    fn item_address(&self) -> Result<String, Error> {
        require(self, "item address")?;
        Ok(self.trim().to_string())
    }
}

impl ItemRef for String {
    fn item_address(&self) -> Result<String, Error> {
        self.as_str().item_address()
    }
}

impl ItemRef for Item {
    fn item_address(&self) -> Result<String, Error> {
        self.ensure_exists()?;
        Ok(self.address())
    }
}

impl<T: ItemRef + ?Sized> ItemRef for &T {
    fn item_address(&self) -> Result<String, Error> {
        (**self).item_address()
    }
}
