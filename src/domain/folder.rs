//! Folder path helpers
//!
//! Datastores live under the `datastore` root folder of their datacenter, so
//! an inventory path looks like `/<datacenter>/datastore/<folder...>/<name>`.
//! Folder paths handed to the lifecycle are always relative to that root.

use crate::error::{Error, Result};

/// Name of the datacenter root folder that holds datastores
pub const DATASTORE_ROOT: &str = "datastore";

/// Clean a folder path and strip leading/trailing separators.
///
/// `"/dc1//ds-folder/./"` becomes `"dc1/ds-folder"`, and an empty or
/// root-only path becomes `""`.
pub fn normalize_folder_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Check whether a folder path refers to the datastore root itself
pub fn path_is_empty(path: &str) -> bool {
    normalize_folder_path(path).is_empty()
}

/// Extract the root-relative folder from a datastore's inventory path
pub fn split_relative_folder(inventory_path: &str) -> Result<String> {
    let parts: Vec<&str> = inventory_path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    // The datacenter itself may sit inside folders, so search for the root
    // particle rather than assuming a fixed position.
    let root = parts
        .iter()
        .skip(1)
        .position(|p| *p == DATASTORE_ROOT)
        .map(|i| i + 1)
        .ok_or_else(|| Error::InventoryPath {
            path: inventory_path.to_string(),
            reason: format!("no {:?} root folder in path", DATASTORE_ROOT),
        })?;

    if root + 1 >= parts.len() {
        return Err(Error::InventoryPath {
            path: inventory_path.to_string(),
            reason: "path does not name an object below the root folder".into(),
        });
    }

    Ok(parts[root + 1..parts.len() - 1].join("/"))
}

/// Build the inventory path of a datastore named `name` inside `folder`
pub fn datastore_inventory_path(datacenter: &str, folder: &str, name: &str) -> String {
    let folder = normalize_folder_path(folder);
    if folder.is_empty() {
        format!("/{}/{}/{}", datacenter, DATASTORE_ROOT, name)
    } else {
        format!("/{}/{}/{}/{}", datacenter, DATASTORE_ROOT, folder, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_folder_path("/dc1/ds-folder"), "dc1/ds-folder");
        assert_eq!(normalize_folder_path("dc1//ds-folder/./"), "dc1/ds-folder");
        assert_eq!(normalize_folder_path("a/b/../c"), "a/c");
        assert_eq!(normalize_folder_path("/"), "");
        assert!(path_is_empty(""));
        assert!(path_is_empty("/./"));
        assert!(!path_is_empty("/x"));
    }

    #[test]
    fn test_split_relative_folder() {
        assert_eq!(
            split_relative_folder("/dc-a/datastore/dc1/ds-folder/ds1").unwrap(),
            "dc1/ds-folder"
        );
        assert_eq!(split_relative_folder("/dc-a/datastore/ds1").unwrap(), "");
        assert_eq!(
            split_relative_folder("/site/dc-a/datastore/prod/ds1").unwrap(),
            "prod"
        );
        assert!(split_relative_folder("/dc-a/vm/ds1").is_err());
        assert!(split_relative_folder("/dc-a/datastore").is_err());
    }

    #[test]
    fn test_inventory_path_round_trip() {
        let path = datastore_inventory_path("dc-a", "/dc1/ds-folder/", "ds1");
        assert_eq!(path, "/dc-a/datastore/dc1/ds-folder/ds1");
        assert_eq!(split_relative_folder(&path).unwrap(), "dc1/ds-folder");
    }
}
