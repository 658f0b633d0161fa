//! Query tree model.
//!
//! Nodes live in an arena owned by [`QueryTree`] and are addressed by [`NodeId`].
//! Every node records the id of the group holding it, so a node can be detached
//! or replaced in O(1) by rewriting the owning slot of its parent.

use std::collections::BTreeSet;

use crate::fields::FieldTables;

/// Index of a node inside its [`QueryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// Tri-state negation flag.
///
/// `Unset` means "not negated" for evaluation and rendering. Flipping an unset
/// flag makes it explicitly negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Negation {
    #[default]
    Unset,
    True,
    False,
}

impl Negation {
    /// Unset -> True, True -> False, False -> True
    pub fn negate(self) -> Self {
        match self {
            Negation::Unset | Negation::False => Negation::True,
            Negation::True => Negation::False,
        }
    }

    pub fn is_negated(self) -> bool {
        self == Negation::True
    }

    pub fn from_bool(negated: bool) -> Self {
        if negated {
            Negation::True
        } else {
            Negation::False
        }
    }
}

/// Boolean operator joining the two sides of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupOperator {
    /// Implicit join written as whitespace
    #[default]
    Default,
    And,
    Or,
}

/// Unary comparison form of a range, e.g. `field:>=5`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOperator {
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermNode {
    pub field: Option<String>,
    pub term: String,
    /// Written as a `"phrase"`
    pub quoted: bool,
    pub negation: Negation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermRangeNode {
    pub field: Option<String>,
    /// `None` is an open bound (`*`)
    pub min: Option<String>,
    pub max: Option<String>,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
    /// Set when the range was written in comparison shorthand
    pub operator: Option<RangeOperator>,
    pub negation: Negation,
}

/// `_exists_:field` or `_missing_:field`
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceNode {
    pub field: Option<String>,
    pub negation: Negation,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupNode {
    pub operator: GroupOperator,
    pub has_parens: bool,
    pub negation: Negation,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    /// Set once the rewriter has flipped this group's negation during a run
    pub already_inverted: bool,
}

impl GroupNode {
    pub fn child_count(&self) -> usize {
        usize::from(self.left.is_some()) + usize::from(self.right.is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Term(TermNode),
    TermRange(TermRangeNode),
    Exists(PresenceNode),
    Missing(PresenceNode),
    Group(GroupNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    pub kind: NodeKind,
    /// The group whose `left` or `right` slot holds this node
    pub parent: Option<NodeId>,
}

impl QueryNode {
    /// Field name of a field node; groups have none.
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Term(n) => n.field.as_deref(),
            NodeKind::TermRange(n) => n.field.as_deref(),
            NodeKind::Exists(n) | NodeKind::Missing(n) => n.field.as_deref(),
            NodeKind::Group(_) => None,
        }
    }

    pub fn negation(&self) -> Negation {
        match &self.kind {
            NodeKind::Term(n) => n.negation,
            NodeKind::TermRange(n) => n.negation,
            NodeKind::Exists(n) | NodeKind::Missing(n) => n.negation,
            NodeKind::Group(n) => n.negation,
        }
    }

    fn negation_mut(&mut self) -> &mut Negation {
        match &mut self.kind {
            NodeKind::Term(n) => &mut n.negation,
            NodeKind::TermRange(n) => &mut n.negation,
            NodeKind::Exists(n) | NodeKind::Missing(n) => &mut n.negation,
            NodeKind::Group(n) => &mut n.negation,
        }
    }

    pub fn as_group(&self) -> Option<&GroupNode> {
        match &self.kind {
            NodeKind::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_term(&self) -> Option<&TermNode> {
        match &self.kind {
            NodeKind::Term(t) => Some(t),
            _ => None,
        }
    }
}

/// Which slot of a group holds a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Left,
    Right,
}

/// A parsed filter expression. The root is always a group.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTree {
    nodes: Vec<QueryNode>,
    root: NodeId,
}

impl Default for QueryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryTree {
    /// An empty tree: a root group with no children.
    pub fn new() -> Self {
        Self {
            nodes: vec![QueryNode {
                kind: NodeKind::Group(GroupNode::default()),
                parent: None,
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &QueryNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut QueryNode {
        &mut self.nodes[id.0]
    }

    pub fn group(&self, id: NodeId) -> Option<&GroupNode> {
        self.node(id).as_group()
    }

    pub fn group_mut(&mut self, id: NodeId) -> Option<&mut GroupNode> {
        match &mut self.node_mut(id).kind {
            NodeKind::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Adds a detached node to the arena.
    pub fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(QueryNode { kind, parent: None });
        NodeId(self.nodes.len() - 1)
    }

    /// Puts `child` into `slot` of `group`, linking both directions.
    /// Whatever occupied the slot before is detached.
    pub fn attach(&mut self, group: NodeId, slot: Slot, child: NodeId) {
        let previous = {
            let Some(g) = self.group_mut(group) else {
                return;
            };
            match slot {
                Slot::Left => g.left.replace(child),
                Slot::Right => g.right.replace(child),
            }
        };
        if let Some(previous) = previous {
            self.node_mut(previous).parent = None;
        }
        self.node_mut(child).parent = Some(group);
    }

    /// The slot of its parent currently holding `id`.
    pub fn slot_of(&self, id: NodeId) -> Option<(NodeId, Slot)> {
        let parent = self.parent(id)?;
        let group = self.group(parent)?;
        if group.left == Some(id) {
            Some((parent, Slot::Left))
        } else if group.right == Some(id) {
            Some((parent, Slot::Right))
        } else {
            None
        }
    }

    /// Detaches `id` from its parent, leaving the slot empty.
    /// Returns false for the root or an already detached node.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some((parent, slot)) = self.slot_of(id) else {
            return false;
        };
        if let Some(g) = self.group_mut(parent) {
            match slot {
                Slot::Left => g.left = None,
                Slot::Right => g.right = None,
            }
        }
        self.node_mut(id).parent = None;
        true
    }

    /// Puts `replacement` in the slot held by `id`.
    pub fn replace(&mut self, id: NodeId, replacement: NodeId) -> bool {
        let Some((parent, slot)) = self.slot_of(id) else {
            return false;
        };
        self.attach(parent, slot, replacement);
        true
    }

    /// Flips the negation of any node kind.
    pub fn negate(&mut self, id: NodeId) {
        let negation = self.node_mut(id).negation_mut();
        *negation = negation.negate();
    }

    /// Builds a group from two detached nodes.
    pub fn new_group(
        &mut self,
        operator: GroupOperator,
        has_parens: bool,
        left: Option<NodeId>,
        right: Option<NodeId>,
    ) -> NodeId {
        let id = self.alloc(NodeKind::Group(GroupNode {
            operator,
            has_parens,
            ..GroupNode::default()
        }));
        if let Some(left) = left {
            self.attach(id, Slot::Left, left);
        }
        if let Some(right) = right {
            self.attach(id, Slot::Right, right);
        }
        id
    }

    /// Builds a detached `field:term` node.
    pub fn new_term(&mut self, field: &str, term: &str) -> NodeId {
        self.alloc(NodeKind::Term(TermNode {
            field: Some(field.to_string()),
            term: term.to_string(),
            quoted: false,
            negation: Negation::Unset,
        }))
    }

    /// Makes `group` the root of the tree. Used by the parser.
    pub(crate) fn set_root(&mut self, group: NodeId) {
        self.node_mut(group).parent = None;
        self.root = group;
    }

    /// Ids of every node reachable from `id`, in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(g) = self.group(current) {
                if let Some(right) = g.right {
                    stack.push(right);
                }
                if let Some(left) = g.left {
                    stack.push(left);
                }
            }
        }
        out
    }

    /// Canonical names of every field referenced at or below `id`.
    pub fn referenced_fields(&self, id: NodeId, tables: &FieldTables) -> BTreeSet<String> {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.node(n).field())
            .map(|field| tables.canonical(field))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_term_tree() -> (QueryTree, NodeId, NodeId) {
        let mut tree = QueryTree::new();
        let a = tree.new_term("status", "open");
        let b = tree.new_term("project", "1");
        let root = tree.root();
        tree.attach(root, Slot::Left, a);
        tree.attach(root, Slot::Right, b);
        (tree, a, b)
    }

    #[test]
    fn test_negation_flip() {
        assert_eq!(Negation::Unset.negate(), Negation::True);
        assert_eq!(Negation::True.negate(), Negation::False);
        assert_eq!(Negation::False.negate(), Negation::True);
        assert!(!Negation::Unset.is_negated());
        assert!(!Negation::False.is_negated());
    }

    #[test]
    fn test_attach_links_parent() {
        let (tree, a, b) = two_term_tree();
        assert_eq!(tree.parent(a), Some(tree.root()));
        assert_eq!(tree.slot_of(b), Some((tree.root(), Slot::Right)));
        assert_eq!(tree.group(tree.root()).unwrap().child_count(), 2);
    }

    #[test]
    fn test_remove_clears_both_sides() {
        let (mut tree, a, b) = two_term_tree();
        assert!(tree.remove(a));
        assert_eq!(tree.parent(a), None);
        let root = tree.group(tree.root()).unwrap();
        assert_eq!(root.left, None);
        assert_eq!(root.right, Some(b));

        assert!(!tree.remove(a));
        assert!(!tree.remove(tree.root()));
    }

    #[test]
    fn test_replace_relinks() {
        let (mut tree, a, _) = two_term_tree();
        let c = tree.new_term("status", "fixed");
        assert!(tree.replace(a, c));
        assert_eq!(tree.parent(a), None);
        assert_eq!(tree.parent(c), Some(tree.root()));
        assert_eq!(tree.group(tree.root()).unwrap().left, Some(c));
    }

    #[test]
    fn test_referenced_fields_are_canonical() {
        let (mut tree, _, _) = two_term_tree();
        let c = tree.new_term("Stack", "abc");
        let d = tree.new_term("Custom.Field", "x");
        let nested = tree.new_group(GroupOperator::Or, true, Some(c), Some(d));
        let root = tree.root();
        let e = tree.group(root).unwrap().right.unwrap();
        tree.replace(e, nested);

        let fields = tree.referenced_fields(root, &FieldTables::default());
        let expected: BTreeSet<String> = ["status", "stack_id", "custom.field"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(fields, expected);
    }

    #[test]
    fn test_descendants_preorder() {
        let (tree, a, b) = two_term_tree();
        assert_eq!(tree.descendants(tree.root()), vec![tree.root(), a, b]);
    }
}
