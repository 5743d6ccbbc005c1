//! Role membership graph
//!
//! Roles live in an index arena with a name → index table, so reachability
//! scans and removals touch only edges and never leave dangling references.
//! An edge `member → role` reads "member is granted role". The graph is kept
//! acyclic: every insertion runs a reachability search before it mutates.

use std::collections::{BTreeSet, HashMap, VecDeque};
use thiserror::Error;

/// Graph-related errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Role name is not present in the graph
    #[error("{0} doesn't exist")]
    UnknownRole(String),

    /// Role name is duplicated
    #[error("{0} already exists")]
    DuplicateRole(String),

    /// `member` already reaches `role`, directly or through other roles
    #[error("{member} is a member of {role}")]
    AlreadyMember { member: String, role: String },

    /// `role` already reaches `member`; the new edge would close a cycle
    #[error("{role} is a member of {member}")]
    CircularMembership { member: String, role: String },
}

/// Arena slot for one role
#[derive(Debug, Clone)]
struct Node {
    name: String,

    /// Roles granted to this role (outgoing edges)
    granted: BTreeSet<usize>,

    /// Roles this role has been granted to (incoming edges)
    members: BTreeSet<usize>,
}

impl Node {
    fn new(name: String) -> Self {
        Self {
            name,
            granted: BTreeSet::new(),
            members: BTreeSet::new(),
        }
    }
}

/// Directed acyclic membership graph over role names
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    nodes: Vec<Option<Node>>,
    index: HashMap<String, usize>,
    free: Vec<usize>,
}

impl RoleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All role names, sorted
    pub fn roles(&self) -> BTreeSet<String> {
        self.index.keys().cloned().collect()
    }

    pub fn add_role(&mut self, name: &str) -> Result<(), GraphError> {
        if self.index.contains_key(name) {
            return Err(GraphError::DuplicateRole(name.to_string()));
        }

        let node = Node::new(name.to_string());
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(name.to_string(), idx);
        Ok(())
    }

    /// Remove a role and every edge incident to it
    pub fn remove_role(&mut self, name: &str) -> Result<(), GraphError> {
        let idx = self.lookup(name)?;
        self.index.remove(name);

        if let Some(node) = self.nodes[idx].take() {
            for granted in node.granted {
                if let Some(other) = self.nodes[granted].as_mut() {
                    other.members.remove(&idx);
                }
            }
            for member in node.members {
                if let Some(other) = self.nodes[member].as_mut() {
                    other.granted.remove(&idx);
                }
            }
        }
        self.free.push(idx);
        Ok(())
    }

    /// Check whether `member → role` may be added without mutating anything.
    ///
    /// Rejects the edge when `member` already reaches `role` (this includes
    /// the self-loop) and when `role` reaches `member`, which would close a
    /// cycle.
    pub fn check_edge(&self, member: &str, role: &str) -> Result<(), GraphError> {
        let from = self.lookup(member)?;
        let to = self.lookup(role)?;

        if self.reachable(from, to) {
            return Err(GraphError::AlreadyMember {
                member: member.to_string(),
                role: role.to_string(),
            });
        }
        if self.reachable(to, from) {
            return Err(GraphError::CircularMembership {
                member: member.to_string(),
                role: role.to_string(),
            });
        }
        Ok(())
    }

    /// Grant `role` to `member`
    pub fn add_edge(&mut self, member: &str, role: &str) -> Result<(), GraphError> {
        self.check_edge(member, role)?;

        let from = self.lookup(member)?;
        let to = self.lookup(role)?;
        if let Some(node) = self.nodes[from].as_mut() {
            node.granted.insert(to);
        }
        if let Some(node) = self.nodes[to].as_mut() {
            node.members.insert(from);
        }
        Ok(())
    }

    /// Revoke `role` from `member`. Returns whether the edge existed.
    pub fn remove_edge(&mut self, member: &str, role: &str) -> Result<bool, GraphError> {
        let from = self.lookup(member)?;
        let to = self.lookup(role)?;

        let removed = self.nodes[from]
            .as_mut()
            .map(|node| node.granted.remove(&to))
            .unwrap_or(false);
        if let Some(node) = self.nodes[to].as_mut() {
            node.members.remove(&from);
        }
        Ok(removed)
    }

    /// Whether `member` holds a direct grant of `role`
    pub fn has_edge(&self, member: &str, role: &str) -> bool {
        match (self.index.get(member), self.index.get(role)) {
            (Some(&from), Some(to)) => self.nodes[from]
                .as_ref()
                .map(|node| node.granted.contains(to))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Whether `role` is reachable from `member`. Every role is a member of itself.
    pub fn is_member(&self, member: &str, role: &str) -> bool {
        match (self.index.get(member), self.index.get(role)) {
            (Some(&from), Some(&to)) => self.reachable(from, to),
            _ => false,
        }
    }

    /// Roles held by `role`, always including itself.
    ///
    /// Recursive returns the full transitive closure, otherwise only the
    /// directly granted roles are added.
    pub fn members_of(&self, role: &str, recursive: bool) -> Result<BTreeSet<String>, GraphError> {
        let start = self.lookup(role)?;

        let indices: Vec<usize> = if recursive {
            self.closure(start)
        } else {
            let mut direct = vec![start];
            if let Some(node) = self.nodes[start].as_ref() {
                direct.extend(node.granted.iter().copied());
            }
            direct
        };

        Ok(indices
            .into_iter()
            .filter_map(|idx| self.nodes[idx].as_ref().map(|n| n.name.clone()))
            .collect())
    }

    /// Roles that have been granted `role`, directly or transitively,
    /// including `role` itself
    pub fn grantees_of(&self, role: &str) -> Result<BTreeSet<String>, GraphError> {
        let start = self.lookup(role)?;
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([start]);
        seen[start] = true;
        let mut out = BTreeSet::new();

        while let Some(idx) = queue.pop_front() {
            if let Some(node) = self.nodes[idx].as_ref() {
                out.insert(node.name.clone());
                for &next in &node.members {
                    if !seen[next] {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }
        Ok(out)
    }

    fn lookup(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownRole(name.to_string()))
    }

    /// Breadth-first search along granted edges
    fn reachable(&self, from: usize, to: usize) -> bool {
        if from == to {
            return true;
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([from]);
        seen[from] = true;

        while let Some(idx) = queue.pop_front() {
            let Some(node) = self.nodes[idx].as_ref() else {
                continue;
            };
            for &next in &node.granted {
                if next == to {
                    return true;
                }
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }
        false
    }

    fn closure(&self, start: usize) -> Vec<usize> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([start]);
        let mut out = Vec::new();
        seen[start] = true;

        while let Some(idx) = queue.pop_front() {
            out.push(idx);
            if let Some(node) = self.nodes[idx].as_ref() {
                for &next in &node.granted {
                    if !seen[next] {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }
        out
    }
}
