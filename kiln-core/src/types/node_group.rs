//! Node group (builder instance) domain types.

use crate::error::{KilnError, Result};
use crate::platform::{self, Platform};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Builder and node names: a letter first, then letters, digits, `.`, `_` or `-`.
static NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9._-]*$").expect("Invalid builder name regex")
});

/// Validate a builder or node name, returning its lower-cased form.
pub fn validate_name(name: &str) -> Result<String> {
    if !NAME_REGEX.is_match(name) {
        return Err(KilnError::InvalidName { name: name.to_string() });
    }
    Ok(name.to_lowercase())
}

/// A single build node inside a node group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node name, unique within its group
    pub name: String,

    /// Connection endpoint, unique within its group
    pub endpoint: String,

    /// Platforms served by this node (empty means unspecified)
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

/// Builder instance: a named, ordered set of nodes realized by one driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroup {
    /// Builder name (lower-cased, globally unique in the store)
    pub name: String,

    /// Driver backend name
    pub driver: String,

    /// Options handed to the driver of every node
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub driver_opts: BTreeMap<String, String>,

    /// Nodes in insertion order
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl NodeGroup {
    /// Create an empty node group.
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            driver_opts: BTreeMap::new(),
            nodes: Vec::new(),
        }
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.find_node(name).map(|i| &self.nodes[i])
    }

    /// Add or modify a node.
    ///
    /// An unknown `node_name` appends a new node when `append` is set or when the
    /// group has no nodes yet. For an existing node the endpoint is only replaced
    /// when `endpoint_set`, and the platforms only when `platforms` is non-empty.
    /// Platforms claimed by the written node are removed from every other node.
    ///
    /// The update is all-or-nothing: on error the group is left untouched.
    pub fn update(
        &mut self,
        node_name: &str,
        endpoint: &str,
        platforms: &[String],
        endpoint_set: bool,
        append: bool,
    ) -> Result<()> {
        let mut nodes = self.nodes.clone();

        let idx = match self.find_node(node_name) {
            Some(i) => {
                let node = &mut nodes[i];
                if endpoint_set {
                    node.endpoint = endpoint.to_string();
                }
                if !platforms.is_empty() {
                    node.platforms = parse_platforms(platforms)?;
                }
                i
            }
            None => {
                if !append && !nodes.is_empty() {
                    return Err(KilnError::NodeNotFound {
                        node: node_name.to_string(),
                        group: self.name.clone(),
                    });
                }
                let name = if node_name.is_empty() {
                    self.next_node_name()
                } else {
                    node_name.to_string()
                };
                let name = validate_name(&name)?;
                let platforms = parse_platforms(platforms)?;
                nodes.push(Node { name, endpoint: endpoint.to_string(), platforms });
                nodes.len() - 1
            }
        };

        claim(&mut nodes, idx)?;
        self.nodes = nodes;
        Ok(())
    }

    /// Remove a node from the group.
    pub fn leave(&mut self, node_name: &str) -> Result<()> {
        let i = self.find_node(node_name).ok_or_else(|| KilnError::NodeNotFound {
            node: node_name.to_string(),
            group: self.name.clone(),
        })?;
        if self.nodes.len() == 1 {
            return Err(KilnError::CannotRemoveLastNode {
                node: node_name.to_string(),
                group: self.name.clone(),
            });
        }
        self.nodes.remove(i);
        Ok(())
    }

    fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name.eq_ignore_ascii_case(name))
    }

    fn next_node_name(&self) -> String {
        (0..)
            .map(|i| format!("{}{}", self.name, i))
            .find(|name| self.find_node(name).is_none())
            .unwrap_or_default()
    }
}

fn parse_platforms(specs: &[String]) -> Result<Vec<Platform>> {
    Ok(platform::dedupe(&platform::parse(specs)?))
}

/// Enforce endpoint uniqueness for `nodes[idx]` and strip its platforms from siblings.
fn claim(nodes: &mut [Node], idx: usize) -> Result<()> {
    let endpoint = nodes[idx].endpoint.clone();
    if nodes.iter().filter(|n| n.endpoint == endpoint).count() > 1 {
        return Err(KilnError::DuplicateEndpoint { endpoint });
    }

    let claimed: HashSet<String> = platform::format(&nodes[idx].platforms).into_iter().collect();
    for (i, node) in nodes.iter_mut().enumerate() {
        if i != idx {
            node.platforms.retain(|p| !claimed.contains(&p.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn formatted(ng: &NodeGroup, i: usize) -> Vec<String> {
        platform::format(&ng.nodes[i].platforms)
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("MyBuilder").unwrap(), "mybuilder");
        assert_eq!(validate_name("a.b_c-d9").unwrap(), "a.b_c-d9");

        for bad in ["9lives", "foo/bar", "", "-x", "a b", "a:b", "_a"] {
            assert!(
                matches!(validate_name(bad), Err(KilnError::InvalidName { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_node_group_update() {
        let mut ng = NodeGroup::new("mybuild", "process");
        ng.update("foo", "foo0", &specs(&["linux/amd64"]), true, false).unwrap();
        ng.update("foo1", "foo1", &specs(&["linux/arm64", "linux/arm/v7"]), true, true).unwrap();
        assert_eq!(ng.nodes.len(), 2);

        ng.update("foo", "foo2", &specs(&["linux/amd64", "linux/arm"]), true, false).unwrap();
        assert_eq!(ng.nodes.len(), 2);
        assert_eq!(formatted(&ng, 0), vec!["linux/amd64", "linux/arm/v7"]);
        assert_eq!(formatted(&ng, 1), vec!["linux/arm64"]);
        assert_eq!(ng.nodes[0].endpoint, "foo2");

        let err = ng.update("foo1", "foo2", &[], true, false).unwrap_err();
        assert!(err.to_string().contains("duplicate endpoint"));

        ng.leave("foo").unwrap();
        assert_eq!(ng.nodes.len(), 1);
        assert_eq!(formatted(&ng, 0), vec!["linux/arm64"]);
    }

    #[test]
    fn test_update_appends_auto_named_node_and_reassigns_platform() {
        let mut ng = NodeGroup::new("mybuild", "process");
        ng.update("foo", "ep0", &specs(&["linux/amd64"]), true, false).unwrap();
        ng.update("", "ep1", &specs(&["linux/arm64"]), true, true).unwrap();
        assert_eq!(ng.nodes[1].name, "mybuild0");

        ng.update("foo", "", &specs(&["linux/amd64", "linux/arm64"]), false, false).unwrap();
        assert_eq!(ng.nodes[0].endpoint, "ep0");
        assert_eq!(formatted(&ng, 0), vec!["linux/amd64", "linux/arm64"]);
        assert!(ng.nodes[1].platforms.is_empty());
    }

    #[test]
    fn test_next_node_name_fills_gaps() {
        let mut ng = NodeGroup::new("b", "process");
        ng.update("b0", "ep0", &[], true, true).unwrap();
        ng.update("b2", "ep2", &[], true, true).unwrap();
        ng.update("", "ep1", &[], true, true).unwrap();
        let names: Vec<&str> = ng.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["b0", "b2", "b1"]);
    }

    #[test]
    fn test_update_unknown_node_without_append() {
        let mut ng = NodeGroup::new("mybuild", "process");
        ng.update("", "ep0", &[], true, false).unwrap();
        assert_eq!(ng.nodes[0].name, "mybuild0");

        let err = ng.update("other", "ep1", &[], true, false).unwrap_err();
        assert!(matches!(err, KilnError::NodeNotFound { .. }));
        assert_eq!(ng.nodes.len(), 1);
    }

    #[test]
    fn test_update_reports_missing_node_before_bad_platform() {
        let mut ng = NodeGroup::new("mybuild", "process");
        ng.update("a", "ep0", &[], true, false).unwrap();

        let err = ng.update("missing", "ep1", &specs(&["bogus"]), true, false).unwrap_err();
        assert!(matches!(err, KilnError::NodeNotFound { .. }), "{}", err);

        let err = ng.update("missing", "ep1", &specs(&["bogus"]), true, true).unwrap_err();
        assert!(matches!(err, KilnError::InvalidPlatform { .. }), "{}", err);
        assert_eq!(ng.nodes.len(), 1);
    }

    #[test]
    fn test_update_keeps_platforms_when_none_given() {
        let mut ng = NodeGroup::new("mybuild", "process");
        ng.update("n", "ep0", &specs(&["linux/amd64"]), true, false).unwrap();
        ng.update("n", "ep9", &[], true, false).unwrap();
        assert_eq!(ng.nodes[0].endpoint, "ep9");
        assert_eq!(formatted(&ng, 0), vec!["linux/amd64"]);
    }

    #[test]
    fn test_update_is_atomic_on_failure() {
        let mut ng = NodeGroup::new("mybuild", "process");
        ng.update("a", "ep-a", &specs(&["linux/amd64"]), true, false).unwrap();
        ng.update("b", "ep-b", &specs(&["linux/arm64"]), true, true).unwrap();
        let before = ng.clone();

        let err = ng.update("b", "ep-a", &specs(&["linux/amd64"]), true, false).unwrap_err();
        assert!(matches!(err, KilnError::DuplicateEndpoint { .. }));
        assert_eq!(ng, before);

        let err = ng.update("b", "ep-c", &specs(&["plan10/amd64"]), true, false).unwrap_err();
        assert!(matches!(err, KilnError::InvalidPlatform { .. }));
        assert_eq!(ng, before);

        let err = ng.update("9bad", "ep-c", &[], true, true).unwrap_err();
        assert!(matches!(err, KilnError::InvalidName { .. }));
        assert_eq!(ng, before);
    }

    #[test]
    fn test_platform_exclusivity_holds_across_updates() {
        let mut ng = NodeGroup::new("x", "process");
        ng.update("a", "1", &specs(&["linux/amd64,linux/arm64"]), true, true).unwrap();
        ng.update("b", "2", &specs(&["linux/arm64,linux/riscv64"]), true, true).unwrap();
        ng.update("c", "3", &specs(&["linux/riscv64,linux/amd64"]), true, true).unwrap();
        ng.update("a", "", &specs(&["linux/s390x"]), false, false).unwrap();

        let mut seen = HashSet::new();
        for node in &ng.nodes {
            for p in &node.platforms {
                assert!(seen.insert(p.to_string()), "{} claimed twice", p);
            }
        }
        assert_eq!(formatted(&ng, 0), vec!["linux/s390x"]);
        assert_eq!(formatted(&ng, 1), vec!["linux/arm64"]);
        assert_eq!(formatted(&ng, 2), vec!["linux/riscv64", "linux/amd64"]);
    }

    #[test]
    fn test_leave() {
        let mut ng = NodeGroup::new("g", "process");
        ng.update("only", "ep0", &[], true, false).unwrap();
        assert!(matches!(ng.leave("only"), Err(KilnError::CannotRemoveLastNode { .. })));
        assert!(matches!(ng.leave("missing"), Err(KilnError::NodeNotFound { .. })));

        ng.update("n1", "ep1", &[], true, true).unwrap();
        ng.update("n2", "ep2", &[], true, true).unwrap();
        ng.leave("n1").unwrap();
        let names: Vec<&str> = ng.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["only", "n2"]);
    }
}
