//! Permission tree normalization and resolution
//!
//! The server sends grants either as a flat list of delimited paths
//! (`product.create`, `reports:export`) or as a nested object of booleans.
//! Both normalize into one [`PermissionTree`]; resolution walks the tree one
//! path segment at a time.

use backoffice_api::PermissionsPayload;
use std::collections::BTreeMap;

/// Key used inside a branch to grant the branch node itself
const ALLOW_KEY: &str = "allow";

pub type PermissionTree = BTreeMap<String, PermissionNode>;

#[derive(Debug, Clone, PartialEq)]
pub enum PermissionNode {
    /// A leaf grant (or explicit denial)
    Allow(bool),
    /// A namespace of further grants
    Branch(PermissionTree),
}

/// Split a permission path on either supported delimiter. `a.b` and `a:b`
/// name the same grant.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['.', ':']).filter(|s| !s.is_empty())
}

fn insert_path(tree: &mut PermissionTree, path: &str) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut node = tree;
    for part in parents {
        let entry = node
            .entry((*part).to_string())
            .or_insert_with(|| PermissionNode::Branch(PermissionTree::new()));
        // A leaf along the way is widened into a branch granting itself.
        if let PermissionNode::Allow(granted) = entry {
            let mut widened = PermissionTree::new();
            widened.insert(ALLOW_KEY.to_string(), PermissionNode::Allow(*granted));
            *entry = PermissionNode::Branch(widened);
        }
        match entry {
            PermissionNode::Branch(sub) => node = sub,
            PermissionNode::Allow(_) => unreachable!("leaf widened above"),
        }
    }
    node.insert((*last).to_string(), PermissionNode::Allow(true));
}

fn normalize_value(value: &serde_json::Value) -> Option<PermissionNode> {
    match value {
        serde_json::Value::Bool(granted) => Some(PermissionNode::Allow(*granted)),
        serde_json::Value::Array(items) => {
            let mut sub = PermissionTree::new();
            for item in items {
                if let serde_json::Value::String(path) = item {
                    insert_path(&mut sub, path);
                }
            }
            if sub.is_empty() {
                None
            } else {
                Some(PermissionNode::Branch(sub))
            }
        }
        serde_json::Value::Object(map) => {
            let sub = normalize_object(map);
            if sub.is_empty() {
                None
            } else {
                Some(PermissionNode::Branch(sub))
            }
        }
        _ => None,
    }
}

fn normalize_object(map: &serde_json::Map<String, serde_json::Value>) -> PermissionTree {
    let mut tree = PermissionTree::new();
    for (key, value) in map {
        if let Some(node) = normalize_value(value) {
            tree.insert(key.clone(), node);
        }
    }
    tree
}

/// Build a permission tree from either wire shape
pub fn normalize(payload: &PermissionsPayload) -> PermissionTree {
    match payload {
        PermissionsPayload::List(paths) => {
            let mut tree = PermissionTree::new();
            for path in paths {
                insert_path(&mut tree, path);
            }
            tree
        }
        PermissionsPayload::Tree(map) => normalize_object(map),
    }
}

/// Resolve a permission path against the tree.
///
/// Missing segments resolve to `fallback`; a boolean leaf at the final
/// segment resolves to its value; a branch at the final segment resolves to
/// its `allow` key when present, otherwise `fallback`.
pub fn can(tree: &PermissionTree, path: &str, fallback: bool) -> bool {
    let parts: Vec<&str> = segments(path).collect();
    if parts.is_empty() {
        return fallback;
    }

    let mut node = tree;
    for (index, part) in parts.iter().enumerate() {
        let last = index == parts.len() - 1;
        match node.get(*part) {
            None => return fallback,
            Some(PermissionNode::Allow(granted)) => {
                // A leaf before the path is exhausted cannot answer for the
                // deeper segments.
                return if last { *granted } else { fallback };
            }
            Some(PermissionNode::Branch(sub)) => {
                if last {
                    return match sub.get(ALLOW_KEY) {
                        Some(PermissionNode::Allow(granted)) => *granted,
                        _ => fallback,
                    };
                }
                node = sub;
            }
        }
    }
    fallback
}

/// Flatten the tree back into delimited paths for every granted leaf
pub fn flatten(tree: &PermissionTree) -> Vec<String> {
    let mut paths = Vec::new();
    flatten_into(tree, String::new(), &mut paths);
    paths
}

fn flatten_into(tree: &PermissionTree, prefix: String, paths: &mut Vec<String>) {
    for (key, node) in tree {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match node {
            PermissionNode::Allow(true) => paths.push(path),
            PermissionNode::Allow(false) => {}
            PermissionNode::Branch(sub) => flatten_into(sub, path, paths),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_from(value: serde_json::Value) -> PermissionTree {
        normalize(&serde_json::from_value(value).unwrap())
    }

    #[test]
    fn list_payload_builds_nested_tree() {
        let tree = tree_from(serde_json::json!(["product.create", "product.edit", "users:view"]));
        assert!(can(&tree, "product.create", false));
        assert!(can(&tree, "product.edit", false));
        assert!(can(&tree, "users.view", false));
        assert!(!can(&tree, "product.delete", false));
    }

    #[test]
    fn delimiters_are_interchangeable() {
        let tree = tree_from(serde_json::json!(["reports:export"]));
        assert!(can(&tree, "reports.export", false));
        assert!(can(&tree, "reports:export", false));
    }

    #[test]
    fn tree_payload_with_booleans_and_nesting() {
        let tree = tree_from(serde_json::json!({
            "product": {"create": true, "delete": false},
            "billing": true,
        }));
        assert!(can(&tree, "product.create", false));
        assert!(!can(&tree, "product.delete", true));
        assert!(can(&tree, "billing", false));
    }

    #[test]
    fn branch_allow_key_grants_the_branch_itself() {
        let tree = tree_from(serde_json::json!({
            "product": {"allow": true, "create": true},
        }));
        assert!(can(&tree, "product", false));
        assert!(can(&tree, "product.create", false));
    }

    #[test]
    fn missing_paths_resolve_to_fallback() {
        let tree = tree_from(serde_json::json!(["product.create"]));
        assert!(!can(&tree, "nowhere", false));
        assert!(can(&tree, "nowhere", true));
        // Branch without an allow key falls back too.
        assert!(!can(&tree, "product", false));
        assert!(can(&tree, "product", true));
    }

    #[test]
    fn leaf_mid_path_resolves_to_fallback() {
        let tree = tree_from(serde_json::json!({"billing": true}));
        assert!(!can(&tree, "billing.invoices", false));
        assert!(can(&tree, "billing.invoices", true));
    }

    #[test]
    fn array_values_nest_under_their_key() {
        let tree = tree_from(serde_json::json!({
            "reports": ["export", "schedule.weekly"],
        }));
        assert!(can(&tree, "reports.export", false));
        assert!(can(&tree, "reports.schedule.weekly", false));
    }

    #[test]
    fn non_grant_values_are_dropped() {
        let tree = tree_from(serde_json::json!({
            "product": {"create": true},
            "junk": 42,
            "empty": {},
        }));
        assert!(tree.contains_key("product"));
        assert!(!tree.contains_key("junk"));
        assert!(!tree.contains_key("empty"));
    }

    #[test]
    fn flatten_lists_granted_leaves() {
        let tree = tree_from(serde_json::json!({
            "product": {"create": true, "delete": false},
            "billing": true,
        }));
        let mut paths = flatten(&tree);
        paths.sort();
        assert_eq!(paths, vec!["billing", "product.create"]);
    }
}
