use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde_json::{Map, Value};

use super::store::{ConfigStore, StoreError, read_key, write_key};
use crate::{
    config::{KEY_IGNORED, KEY_LIBRARY, KEY_USAGE},
    types::{HistoryEntry, LibraryGroup, LibraryItem, LibraryNode, SourceKind},
    utils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Result of trying to mark an item as syncing.
#[derive(Debug)]
pub enum SyncClaim {
    Claimed(LibraryItem),
    Busy,
}

/// Pre-order list of every source in the tree.
pub fn flatten(nodes: &[LibraryNode]) -> Vec<&LibraryItem> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            LibraryNode::Source(item) => out.push(item),
            LibraryNode::Group(group) => out.extend(flatten(&group.items)),
        }
    }
    out
}

/// Pairs each source with the `A > B` path of the groups containing it.
pub fn flatten_with_groups(nodes: &[LibraryNode]) -> Vec<(String, &LibraryItem)> {
    fn walk<'a>(nodes: &'a [LibraryNode], prefix: &str, out: &mut Vec<(String, &'a LibraryItem)>) {
        for node in nodes {
            match node {
                LibraryNode::Source(item) => out.push((prefix.to_string(), item)),
                LibraryNode::Group(group) => {
                    let path = if prefix.is_empty() {
                        group.name.clone()
                    } else {
                        format!("{} > {}", prefix, group.name)
                    };
                    walk(&group.items, &path, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    walk(nodes, "", &mut out);
    out
}

pub fn source_ids(nodes: &[LibraryNode]) -> HashSet<String> {
    flatten(nodes)
        .into_iter()
        .map(|i| i.source_id.clone())
        .collect()
}

pub fn find_item<'a>(nodes: &'a [LibraryNode], source_id: &str) -> Option<&'a LibraryItem> {
    flatten(nodes).into_iter().find(|i| i.source_id == source_id)
}

pub fn find_item_mut<'a>(
    nodes: &'a mut [LibraryNode],
    source_id: &str,
) -> Option<&'a mut LibraryItem> {
    for node in nodes.iter_mut() {
        match node {
            LibraryNode::Source(item) if item.source_id == source_id => return Some(item),
            LibraryNode::Source(_) => {}
            LibraryNode::Group(group) => {
                if let Some(found) = find_item_mut(&mut group.items, source_id) {
                    return Some(found);
                }
            }
        }
    }
    None
}

pub fn find_group_mut<'a>(nodes: &'a mut [LibraryNode], name: &str) -> Option<&'a mut LibraryGroup> {
    for node in nodes.iter_mut() {
        if let LibraryNode::Group(group) = node {
            if group.name == name {
                return Some(group);
            }
            if let Some(found) = find_group_mut(&mut group.items, name) {
                return Some(found);
            }
        }
    }
    None
}

pub fn group_names(nodes: &[LibraryNode]) -> Vec<String> {
    let mut out = Vec::new();
    for node in nodes {
        if let LibraryNode::Group(group) = node {
            out.push(group.name.clone());
            out.extend(group_names(&group.items));
        }
    }
    out
}

/// Detaches a source from wherever it sits in the tree.
pub fn take_item(nodes: &mut Vec<LibraryNode>, source_id: &str) -> Option<LibraryItem> {
    if let Some(pos) = nodes
        .iter()
        .position(|n| matches!(n, LibraryNode::Source(i) if i.source_id == source_id))
    {
        if let LibraryNode::Source(item) = nodes.remove(pos) {
            return Some(item);
        }
    }

    for node in nodes.iter_mut() {
        if let LibraryNode::Group(group) = node {
            if let Some(item) = take_item(&mut group.items, source_id) {
                return Some(item);
            }
        }
    }
    None
}

/// Removes a group, lifting its children into its place.
pub fn dissolve_group(nodes: &mut Vec<LibraryNode>, name: &str) -> bool {
    if let Some(pos) = nodes
        .iter()
        .position(|n| matches!(n, LibraryNode::Group(g) if g.name == name))
    {
        if let LibraryNode::Group(group) = nodes.remove(pos) {
            for (offset, child) in group.items.into_iter().enumerate() {
                nodes.insert(pos + offset, child);
            }
        }
        return true;
    }

    nodes.iter_mut().any(|node| match node {
        LibraryNode::Group(group) => dissolve_group(&mut group.items, name),
        LibraryNode::Source(_) => false,
    })
}

/// Swaps a source with its neighbour inside the list that holds it.
pub fn reorder(nodes: &mut [LibraryNode], source_id: &str, direction: Direction) -> bool {
    if let Some(pos) = nodes
        .iter()
        .position(|n| matches!(n, LibraryNode::Source(i) if i.source_id == source_id))
    {
        let target = match direction {
            Direction::Up if pos > 0 => pos - 1,
            Direction::Down if pos + 1 < nodes.len() => pos + 1,
            _ => return false,
        };
        nodes.swap(pos, target);
        return true;
    }

    nodes.iter_mut().any(|node| match node {
        LibraryNode::Group(group) => reorder(&mut group.items, source_id, direction),
        LibraryNode::Source(_) => false,
    })
}

/// Startup sweep: any item still marked in progress belongs to a run that
/// died mid-sync. Returns how many items were reclassified.
pub fn recover_interrupted(nodes: &mut [LibraryNode]) -> usize {
    let mut recovered = 0;
    for node in nodes.iter_mut() {
        match node {
            LibraryNode::Source(item) if item.sync_in_progress => {
                item.sync_in_progress = false;
                item.sync_interrupted = true;
                recovered += 1;
            }
            LibraryNode::Source(_) => {}
            LibraryNode::Group(group) => recovered += recover_interrupted(&mut group.items),
        }
    }
    recovered
}

fn read_tree(doc: &Map<String, Value>) -> Result<Vec<LibraryNode>, StoreError> {
    read_key(doc, KEY_LIBRARY)
}

/// Strips the `[TAG] ` prefix and `(Up-to-date)` suffix history entries
/// carry, leaving the source's own name.
pub fn history_display_name(name: &str) -> String {
    let name = name.trim();
    let name = match name.strip_prefix('[').and_then(|rest| rest.split_once("] ")) {
        Some((_, rest)) => rest,
        None => name,
    };
    name.trim_end_matches(" (Up-to-date)").trim().to_string()
}

/// The library tree and its companion ignore-list and usage map, stored in
/// the config document.
pub struct LibraryManager {
    store: Arc<ConfigStore>,
}

impl LibraryManager {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub async fn tree(&self) -> Result<Vec<LibraryNode>, StoreError> {
        Ok(self.store.get(KEY_LIBRARY).await?.unwrap_or_default())
    }

    pub async fn items(&self) -> Result<Vec<LibraryItem>, StoreError> {
        let tree = self.tree().await?;
        Ok(flatten(&tree).into_iter().cloned().collect())
    }

    pub async fn get(&self, source_id: &str) -> Result<Option<LibraryItem>, StoreError> {
        let tree = self.tree().await?;
        Ok(find_item(&tree, source_id).cloned())
    }

    pub async fn ignored(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.store.get(KEY_IGNORED).await?.unwrap_or_default())
    }

    pub async fn usage(&self) -> Result<HashMap<String, u64>, StoreError> {
        Ok(self.store.get(KEY_USAGE).await?.unwrap_or_default())
    }

    pub async fn add_item(&self, item: LibraryItem, group: Option<&str>) -> Result<(), StoreError> {
        if utils::source_kind(&item.source_id).is_none() {
            return Err(StoreError::Invalid(format!(
                "'{}' is not a playlist or album URL",
                item.source_id
            )));
        }

        self.store
            .update_document(|doc| {
                let mut tree = read_tree(doc)?;
                if find_item(&tree, &item.source_id).is_some() {
                    return Err(StoreError::Invalid(format!(
                        "'{}' is already in the library",
                        item.source_id
                    )));
                }

                let target = match group {
                    Some(name) => {
                        &mut find_group_mut(&mut tree, name)
                            .ok_or_else(|| StoreError::NotFound(format!("group '{}'", name)))?
                            .items
                    }
                    None => &mut tree,
                };
                target.push(LibraryNode::Source(item.clone()));

                let mut ignored: Vec<String> = read_key(doc, KEY_IGNORED)?;
                ignored.retain(|id| id != &item.source_id);
                write_key(doc, KEY_IGNORED, &ignored)?;
                write_key(doc, KEY_LIBRARY, &tree)
            })
            .await
    }

    /// Removes a source and remembers it so discovery will not bring it back.
    pub async fn remove_item(&self, source_id: &str) -> Result<LibraryItem, StoreError> {
        self.store
            .update_document(|doc| {
                let mut tree = read_tree(doc)?;
                let removed = take_item(&mut tree, source_id)
                    .ok_or_else(|| StoreError::NotFound(source_id.to_string()))?;

                let mut ignored: Vec<String> = read_key(doc, KEY_IGNORED)?;
                if !ignored.iter().any(|id| id == source_id) {
                    ignored.push(source_id.to_string());
                }

                write_key(doc, KEY_IGNORED, &ignored)?;
                write_key(doc, KEY_LIBRARY, &tree)?;
                Ok(removed)
            })
            .await
    }

    pub async fn update_item<F>(&self, source_id: &str, f: F) -> Result<LibraryItem, StoreError>
    where
        F: FnOnce(&mut LibraryItem),
    {
        self.store
            .update(KEY_LIBRARY, |tree: &mut Vec<LibraryNode>| {
                let item = find_item_mut(tree, source_id)
                    .ok_or_else(|| StoreError::NotFound(source_id.to_string()))?;
                f(item);
                Ok(item.clone())
            })
            .await
    }

    /// Atomically checks and sets `sync_in_progress`, persisting before the
    /// download starts so a crash is visible on the next launch.
    pub async fn claim_sync(&self, source_id: &str) -> Result<SyncClaim, StoreError> {
        self.store
            .update(KEY_LIBRARY, |tree: &mut Vec<LibraryNode>| {
                let item = find_item_mut(tree, source_id)
                    .ok_or_else(|| StoreError::NotFound(source_id.to_string()))?;
                if item.sync_in_progress {
                    return Ok(SyncClaim::Busy);
                }
                item.sync_in_progress = true;
                Ok(SyncClaim::Claimed(item.clone()))
            })
            .await
    }

    pub async fn recover_interrupted(&self) -> Result<usize, StoreError> {
        let tree = self.tree().await?;
        if !flatten(&tree).iter().any(|i| i.sync_in_progress) {
            return Ok(0);
        }

        self.store
            .update(KEY_LIBRARY, |tree: &mut Vec<LibraryNode>| {
                Ok(recover_interrupted(tree))
            })
            .await
    }

    pub async fn add_group(&self, name: &str, parent: Option<&str>) -> Result<(), StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("group name cannot be empty".into()));
        }

        self.store
            .update(KEY_LIBRARY, |tree: &mut Vec<LibraryNode>| {
                if group_names(tree).iter().any(|g| g == name) {
                    return Err(StoreError::Invalid(format!("group '{}' already exists", name)));
                }
                let group = LibraryNode::Group(LibraryGroup {
                    name: name.to_string(),
                    items: Vec::new(),
                    collapsed: false,
                });
                match parent {
                    Some(parent) => find_group_mut(tree, parent)
                        .ok_or_else(|| StoreError::NotFound(format!("group '{}'", parent)))?
                        .items
                        .push(group),
                    None => tree.push(group),
                }
                Ok(())
            })
            .await
    }

    pub async fn rename_group(&self, name: &str, new_name: &str) -> Result<(), StoreError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(StoreError::Invalid("group name cannot be empty".into()));
        }

        self.store
            .update(KEY_LIBRARY, |tree: &mut Vec<LibraryNode>| {
                if name != new_name && group_names(tree).iter().any(|g| g == new_name) {
                    return Err(StoreError::Invalid(format!(
                        "group '{}' already exists",
                        new_name
                    )));
                }
                find_group_mut(tree, name)
                    .ok_or_else(|| StoreError::NotFound(format!("group '{}'", name)))?
                    .name = new_name.to_string();
                Ok(())
            })
            .await
    }

    pub async fn remove_group(&self, name: &str) -> Result<(), StoreError> {
        self.store
            .update(KEY_LIBRARY, |tree: &mut Vec<LibraryNode>| {
                if dissolve_group(tree, name) {
                    Ok(())
                } else {
                    Err(StoreError::NotFound(format!("group '{}'", name)))
                }
            })
            .await
    }

    pub async fn toggle_group(&self, name: &str) -> Result<bool, StoreError> {
        self.store
            .update(KEY_LIBRARY, |tree: &mut Vec<LibraryNode>| {
                let group = find_group_mut(tree, name)
                    .ok_or_else(|| StoreError::NotFound(format!("group '{}'", name)))?;
                group.collapsed = !group.collapsed;
                Ok(group.collapsed)
            })
            .await
    }

    /// Moves a source into `group`, or to the root when `group` is `None`.
    pub async fn move_item(&self, source_id: &str, group: Option<&str>) -> Result<(), StoreError> {
        self.store
            .update(KEY_LIBRARY, |tree: &mut Vec<LibraryNode>| {
                let item = take_item(tree, source_id)
                    .ok_or_else(|| StoreError::NotFound(source_id.to_string()))?;
                let node = LibraryNode::Source(item);
                match group {
                    Some(name) => find_group_mut(tree, name)
                        .ok_or_else(|| StoreError::NotFound(format!("group '{}'", name)))?
                        .items
                        .push(node),
                    None => tree.push(node),
                }
                Ok(())
            })
            .await
    }

    pub async fn reorder_item(&self, source_id: &str, direction: Direction) -> Result<bool, StoreError> {
        self.store
            .update(KEY_LIBRARY, |tree: &mut Vec<LibraryNode>| {
                if find_item(tree, source_id).is_none() {
                    return Err(StoreError::NotFound(source_id.to_string()));
                }
                Ok(reorder(tree, source_id, direction))
            })
            .await
    }

    pub async fn increment_usage(&self, id: &str) -> Result<u64, StoreError> {
        self.store
            .update(KEY_USAGE, |usage: &mut HashMap<String, u64>| {
                let count = usage.entry(id.to_string()).or_insert(0);
                *count += 1;
                Ok(*count)
            })
            .await
    }

    /// Re-adds playlists seen in the history that are neither tracked nor
    /// ignored. Returns the number of items added to the root.
    pub async fn discover_from_history(&self, history: &[HistoryEntry]) -> Result<usize, StoreError> {
        self.store
            .update_document(|doc| {
                let mut tree = read_tree(doc)?;
                let ignored: HashSet<String> = read_key::<Vec<String>>(doc, KEY_IGNORED)?
                    .iter()
                    .map(|id| utils::normalize_source_url(id))
                    .collect();
                let mut known = source_ids(&tree);

                let mut added = 0;
                for entry in history {
                    let id = utils::normalize_source_url(&entry.source);
                    if utils::source_kind(&id) != Some(SourceKind::Playlist)
                        || known.contains(&id)
                        || ignored.contains(&id)
                    {
                        continue;
                    }
                    let name = entry
                        .name
                        .as_deref()
                        .map(history_display_name)
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| "Downloaded Playlist".to_string());
                    tree.push(LibraryNode::Source(LibraryItem::new(id.clone(), name)));
                    known.insert(id);
                    added += 1;
                }

                if added > 0 {
                    write_key(doc, KEY_LIBRARY, &tree)?;
                }
                Ok(added)
            })
            .await
    }
}
