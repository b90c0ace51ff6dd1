//! Permission-filtered navigation menu.
//!
//! Modules register flat [`MenuDefinition`]s that reference their parent by id;
//! [`build_menu_tree`] turns them into the tree a given user may see.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::authorize::PermissionSet;

/// Flat menu entry as registered by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuDefinition {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Owning module; stamped at registration.
    #[serde(default)]
    pub domain: String,
    /// Required permission. `None` means always visible.
    #[serde(default)]
    pub permission: Option<String>,
    pub label: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

impl MenuDefinition {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            domain: String::new(),
            permission: None,
            label: label.into(),
            path: None,
            icon: None,
            sort_order: 0,
        }
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    fn visible_to(&self, permissions: &PermissionSet) -> bool {
        self.permission
            .as_deref()
            .is_none_or(|required| permissions.grants(required))
    }
}

/// Computed menu node returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuNode {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuNode>,
}

/// Build the menu forest visible under `permissions`.
///
/// A node is kept when it is visible itself or when any descendant is kept.
/// Siblings are ordered by `sort_order`, ties by position in `definitions`.
/// Entries whose parent is not defined become roots; definitions only
/// reachable through a cycle are dropped.
pub fn build_menu_tree(definitions: &[MenuDefinition], permissions: &PermissionSet) -> Vec<MenuNode> {
    let known: HashSet<&str> = definitions.iter().map(|d| d.id.as_str()).collect();

    let mut roots: Vec<usize> = Vec::new();
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, def) in definitions.iter().enumerate() {
        match def.parent_id.as_deref() {
            Some(parent) if known.contains(parent) => {
                children.entry(parent).or_default().push(idx)
            }
            _ => roots.push(idx),
        }
    }

    let by_order = |idx: &usize| definitions[*idx].sort_order;
    roots.sort_by_key(by_order);
    for siblings in children.values_mut() {
        siblings.sort_by_key(by_order);
    }

    let builder = TreeBuilder {
        definitions,
        children: &children,
        permissions,
    };
    let mut visited = HashSet::new();
    roots
        .into_iter()
        .filter_map(|idx| builder.build(idx, &mut visited))
        .collect()
}

struct TreeBuilder<'a> {
    definitions: &'a [MenuDefinition],
    children: &'a HashMap<&'a str, Vec<usize>>,
    permissions: &'a PermissionSet,
}

impl TreeBuilder<'_> {
    fn build(&self, idx: usize, visited: &mut HashSet<usize>) -> Option<MenuNode> {
        if !visited.insert(idx) {
            return None;
        }
        let def = &self.definitions[idx];

        let children: Vec<MenuNode> = self
            .children
            .get(def.id.as_str())
            .map(|kids| {
                kids.iter()
                    .filter_map(|&kid| self.build(kid, visited))
                    .collect()
            })
            .unwrap_or_default();

        if !def.visible_to(self.permissions) && children.is_empty() {
            return None;
        }

        Some(MenuNode {
            id: def.id.clone(),
            label: def.label.clone(),
            path: def.path.clone(),
            icon: def.icon.clone(),
            children,
        })
    }
}
