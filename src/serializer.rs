//! Renders a query tree back into filter text.
//!
//! Pruned slots are tolerated: a group with nothing left inside renders as
//! nothing at all, and the operator between two sides is only written when
//! both slots are occupied. A negated group is always parenthesized so the
//! negation covers the whole group when the text is parsed again.
//!
//! The tree is walked with an explicit stack and written into a single
//! buffer; an empty group is dropped by truncating back to where it began.

use crate::ast::{GroupOperator, NodeId, NodeKind, QueryTree, RangeOperator};

enum Frame {
    Node(NodeId),
    /// Left side written; emit the separator and schedule the right side
    AfterLeft {
        group: NodeId,
        start: usize,
        body_start: usize,
    },
    Close {
        start: usize,
        left_empty: bool,
        right_start: usize,
        parens: bool,
    },
}

pub fn serialize(tree: &QueryTree) -> String {
    let mut out = String::new();
    let mut stack = vec![Frame::Node(tree.root())];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Node(id) => {
                let Some(group) = tree.group(id) else {
                    write_field_node(tree, id, &mut out);
                    continue;
                };
                let start = out.len();
                if group.negation.is_negated() {
                    out.push_str("NOT ");
                }
                if needs_parens(tree, id) {
                    out.push('(');
                }
                stack.push(Frame::AfterLeft {
                    group: id,
                    start,
                    body_start: out.len(),
                });
                if let Some(left) = group.left {
                    stack.push(Frame::Node(left));
                }
            }
            Frame::AfterLeft {
                group: id,
                start,
                body_start,
            } => {
                let Some(group) = tree.group(id) else {
                    continue;
                };
                if group.left.is_some() && group.right.is_some() {
                    out.push_str(match group.operator {
                        GroupOperator::And => " AND ",
                        GroupOperator::Or => " OR ",
                        GroupOperator::Default => " ",
                    });
                }
                stack.push(Frame::Close {
                    start,
                    left_empty: out.len() == body_start,
                    right_start: out.len(),
                    parens: needs_parens(tree, id),
                });
                if let Some(right) = group.right {
                    stack.push(Frame::Node(right));
                }
            }
            Frame::Close {
                start,
                left_empty,
                right_start,
                parens,
            } => {
                if left_empty && out.len() == right_start {
                    out.truncate(start);
                } else if parens {
                    out.push(')');
                }
            }
        }
    }

    out
}

fn needs_parens(tree: &QueryTree, id: NodeId) -> bool {
    tree.group(id)
        .is_some_and(|g| g.has_parens || g.negation.is_negated())
}

fn write_field_node(tree: &QueryTree, id: NodeId, out: &mut String) {
    let node = tree.node(id);
    if node.negation().is_negated() {
        out.push_str("NOT ");
    }
    match &node.kind {
        NodeKind::Term(term) => {
            write_field(term.field.as_deref(), out);
            if term.quoted {
                out.push('"');
                out.push_str(&term.term);
                out.push('"');
            } else {
                out.push_str(&term.term);
            }
        }
        NodeKind::TermRange(range) => {
            write_field(range.field.as_deref(), out);
            let bound = |b: &Option<String>| b.clone().unwrap_or_else(|| "*".to_string());
            match range.operator {
                Some(RangeOperator::Gt) => out.push_str(&format!(">{}", bound(&range.min))),
                Some(RangeOperator::Gte) => out.push_str(&format!(">={}", bound(&range.min))),
                Some(RangeOperator::Lt) => out.push_str(&format!("<{}", bound(&range.max))),
                Some(RangeOperator::Lte) => out.push_str(&format!("<={}", bound(&range.max))),
                None => {
                    out.push(if range.min_inclusive { '[' } else { '{' });
                    out.push_str(&format!("{} TO {}", bound(&range.min), bound(&range.max)));
                    out.push(if range.max_inclusive { ']' } else { '}' });
                }
            }
        }
        NodeKind::Exists(presence) => {
            out.push_str("_exists_:");
            out.push_str(presence.field.as_deref().unwrap_or_default());
        }
        NodeKind::Missing(presence) => {
            out.push_str("_missing_:");
            out.push_str(presence.field.as_deref().unwrap_or_default());
        }
        NodeKind::Group(_) => {}
    }
}

fn write_field(field: Option<&str>, out: &mut String) {
    if let Some(field) = field {
        out.push_str(field);
        out.push(':');
    }
}
