//! Splits one filter into stack, inverted-stack and event filters.
//!
//! The rewriter walks the tree once in pre-order. Each field node is checked
//! against the [`FieldTables`] for the selected mode and is kept, expanded or
//! pruned in place. In [`StacksAndEventsQueryMode::InvertedStacks`] every kept
//! node is also negated, either directly or by negating its enclosing group,
//! and the run reports whether every negation could be applied soundly.

use log::{debug, warn};
use serde::Serialize;

use crate::ast::{GroupOperator, Negation, NodeId, NodeKind, QueryTree};
use crate::fields::FieldTables;
use crate::parser::{parse, ParseError};
use crate::serializer::serialize;

const STATUS_FIELD: &str = "status";
const STATUS_OPEN: &str = "open";
const STATUS_FIXED: &str = "fixed";
const STATUS_REGRESSED: &str = "regressed";

/// Which tier the rewritten filter targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StacksAndEventsQueryMode {
    /// Aggregate records
    Stacks,
    /// The complement of the `Stacks` filter
    InvertedStacks,
    /// Raw records
    Events,
}

impl StacksAndEventsQueryMode {
    pub const ALL: [StacksAndEventsQueryMode; 3] = [
        StacksAndEventsQueryMode::Stacks,
        StacksAndEventsQueryMode::InvertedStacks,
        StacksAndEventsQueryMode::Events,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StacksAndEventsQueryResult {
    pub query: String,
    /// False when some negation could not be applied soundly. The inverted
    /// filter must not be trusted in that case.
    pub is_invert_successful: bool,
    /// The input contained a non-negated `status:open` term
    pub has_status_open: bool,
}

impl StacksAndEventsQueryResult {
    /// Nothing survived the rewrite, the filter matches everything
    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }
}

/// Outcome of applying the field policy to one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filtered {
    Kept(NodeId),
    /// Replaced by a synthetic group whose children still need visiting
    Expanded(NodeId),
    Removed,
}

/// Pending work of the pre-order walk
enum Step {
    Node(NodeId),
    /// The left subtree of this group is done; descend into its right slot
    Right(NodeId),
    /// Leaves the children of an expanded virtual field
    EndExpansion,
}

pub struct StacksAndEventsQueryVisitor<'t> {
    mode: StacksAndEventsQueryMode,
    tables: &'t FieldTables,
    is_invert_successful: bool,
    has_status_open: bool,
    /// Non-zero while visiting nodes synthesized by an expansion
    expansion_depth: usize,
}

impl<'t> StacksAndEventsQueryVisitor<'t> {
    pub fn new(mode: StacksAndEventsQueryMode, tables: &'t FieldTables) -> Self {
        Self {
            mode,
            tables,
            is_invert_successful: true,
            has_status_open: false,
            expansion_depth: 0,
        }
    }

    /// Rewrites a parsed tree using the built-in field tables.
    pub fn run(tree: QueryTree, mode: StacksAndEventsQueryMode) -> StacksAndEventsQueryResult {
        StacksAndEventsQueryVisitor::run_with_fields(tree, mode, FieldTables::builtin())
    }

    pub fn run_with_fields(
        mut tree: QueryTree,
        mode: StacksAndEventsQueryMode,
        tables: &FieldTables,
    ) -> StacksAndEventsQueryResult {
        let mut visitor = StacksAndEventsQueryVisitor::new(mode, tables);
        visitor.visit(&mut tree);
        StacksAndEventsQueryResult {
            query: serialize(&tree).trim().to_string(),
            is_invert_successful: visitor.is_invert_successful,
            has_status_open: visitor.has_status_open,
        }
    }

    /// Parses `query` and rewrites it using the built-in field tables.
    pub fn run_query(
        query: &str,
        mode: StacksAndEventsQueryMode,
    ) -> Result<StacksAndEventsQueryResult, ParseError> {
        StacksAndEventsQueryVisitor::run_query_with_fields(query, mode, FieldTables::builtin())
    }

    pub fn run_query_with_fields(
        query: &str,
        mode: StacksAndEventsQueryMode,
        tables: &FieldTables,
    ) -> Result<StacksAndEventsQueryResult, ParseError> {
        let tree = parse(query)?;
        Ok(StacksAndEventsQueryVisitor::run_with_fields(tree, mode, tables))
    }

    pub async fn run_async(
        tree: QueryTree,
        mode: StacksAndEventsQueryMode,
    ) -> StacksAndEventsQueryResult {
        StacksAndEventsQueryVisitor::run(tree, mode)
    }

    pub async fn run_query_async(
        query: &str,
        mode: StacksAndEventsQueryMode,
    ) -> Result<StacksAndEventsQueryResult, ParseError> {
        StacksAndEventsQueryVisitor::run_query(query, mode)
    }

    /// Walks the whole tree once, mutating it in place.
    ///
    /// The walk keeps its own stack, so arbitrarily long chains are fine.
    /// A right slot is read only after the left subtree is done, which lets
    /// the policy prune or replace nodes while the walk is in progress.
    pub fn visit(&mut self, tree: &mut QueryTree) {
        let mut stack = vec![Step::Node(tree.root())];

        while let Some(step) = stack.pop() {
            match step {
                Step::Node(id) if tree.group(id).is_some() => push_children(tree, id, &mut stack),
                Step::Node(id) => {
                    if let Some(group) = self.visit_field_node(tree, id) {
                        self.expansion_depth += 1;
                        stack.push(Step::EndExpansion);
                        push_children(tree, group, &mut stack);
                    }
                }
                Step::Right(id) => {
                    if let Some(right) = tree.group(id).and_then(|g| g.right) {
                        stack.push(Step::Node(right));
                    }
                }
                Step::EndExpansion => self.expansion_depth -= 1,
            }
        }
    }

    /// Applies the field policy; returns a group when the node was expanded.
    fn visit_field_node(&mut self, tree: &mut QueryTree, id: NodeId) -> Option<NodeId> {
        if self.expansion_depth == 0 && is_status_open(tree, id) {
            self.has_status_open = true;
        }

        match self.apply_filter(tree, id) {
            Filtered::Kept(id) => {
                if self.mode == StacksAndEventsQueryMode::InvertedStacks {
                    self.invert(tree, id);
                }
                None
            }
            Filtered::Expanded(group) => Some(group),
            Filtered::Removed => None,
        }
    }

    fn apply_filter(&mut self, tree: &mut QueryTree, id: NodeId) -> Filtered {
        let tables = self.tables;
        let field = tree.node(id).field().map(str::to_string);

        match self.mode {
            StacksAndEventsQueryMode::Stacks | StacksAndEventsQueryMode::InvertedStacks => {
                if let Some(field) = field.as_deref() {
                    if tables.is_shared(field) || tables.is_stack_only(field) {
                        return Filtered::Kept(id);
                    }
                    if tables.is_stack_only_virtual(field) {
                        if let Some(filtered) = self.expand_virtual_field(tree, id, field) {
                            return filtered;
                        }
                    }
                }
                remove(tree, id, field.as_deref())
            }
            StacksAndEventsQueryMode::Events => match field.as_deref() {
                Some(f) if tables.is_stack_only(f) || tables.is_stack_only_virtual(f) => {
                    remove(tree, id, Some(f))
                }
                _ => Filtered::Kept(id),
            },
        }
    }

    /// Rewrites a virtual field into `status` predicates. `None` means the node
    /// cannot be expanded and should be pruned instead.
    fn expand_virtual_field(
        &mut self,
        tree: &mut QueryTree,
        id: NodeId,
        field: &str,
    ) -> Option<Filtered> {
        let canonical = self.tables.canonical(field);
        let value = parse_bool(&tree.node(id).as_term()?.term);

        match canonical.as_str() {
            "is_fixed" | "is_regressed" => {
                let status = if canonical == "is_fixed" {
                    STATUS_FIXED
                } else {
                    STATUS_REGRESSED
                };
                if let NodeKind::Term(term) = &mut tree.node_mut(id).kind {
                    term.field = Some(STATUS_FIELD.to_string());
                    term.term = status.to_string();
                    term.quoted = false;
                    term.negation = Negation::from_bool(!value);
                }
                debug!("expanded {}:{} into status:{}", field, value, status);
                Some(Filtered::Kept(id))
            }
            "is_hidden" => {
                tree.parent(id)?;
                let open = tree.new_term(STATUS_FIELD, STATUS_OPEN);
                let regressed = tree.new_term(STATUS_FIELD, STATUS_REGRESSED);
                let operator = if value {
                    GroupOperator::And
                } else {
                    GroupOperator::Or
                };
                let group = tree.new_group(operator, true, Some(open), Some(regressed));
                if value {
                    tree.negate(group);
                }
                tree.replace(id, group);
                debug!("expanded {}:{} into a status group", field, value);
                Some(Filtered::Expanded(group))
            }
            _ => None,
        }
    }

    /// Negates a kept node so the filter selects the complement.
    fn invert(&mut self, tree: &mut QueryTree, id: NodeId) {
        let tables = self.tables;
        let Some(field) = tree.node(id).field() else {
            return;
        };
        if tables.is_non_invertible(field) {
            return;
        }

        let Some(parent) = tree.parent(id) else {
            tree.negate(id);
            return;
        };
        let Some(group) = tree.group(parent) else {
            return;
        };

        // Top-level expression without explicit grouping: negate the node itself
        if parent == tree.root() && !group.has_parens {
            tree.negate(id);
            return;
        }

        if group.already_inverted {
            return;
        }

        let operator = group.operator;
        let child_count = group.child_count();
        let mixes_non_invertible = tree
            .referenced_fields(parent, tables)
            .iter()
            .any(|f| tables.is_non_invertible(f));

        if mixes_non_invertible {
            if operator == GroupOperator::Or {
                warn!(
                    "cannot invert OR group mixing non-invertible fields around {:?}",
                    tree.node(id).field()
                );
                self.is_invert_successful = false;
            } else {
                tree.negate(id);
            }
            return;
        }

        // A group with one live child needs no wrapping negation, its member is negated instead
        if child_count == 2 {
            tree.negate(parent);
        } else {
            tree.negate(id);
        }
        if let Some(group) = tree.group_mut(parent) {
            group.already_inverted = true;
        }
    }
}

fn push_children(tree: &QueryTree, group: NodeId, stack: &mut Vec<Step>) {
    stack.push(Step::Right(group));
    if let Some(left) = tree.group(group).and_then(|g| g.left) {
        stack.push(Step::Node(left));
    }
}

fn remove(tree: &mut QueryTree, id: NodeId, field: Option<&str>) -> Filtered {
    if tree.remove(id) {
        debug!("removed node with field {:?}", field);
    }
    Filtered::Removed
}

/// `true`/`false` in any case; anything else is false.
fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn is_status_open(tree: &QueryTree, id: NodeId) -> bool {
    tree.node(id).as_term().is_some_and(|term| {
        term.field
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case(STATUS_FIELD))
            && term.term.eq_ignore_ascii_case(STATUS_OPEN)
            && !term.negation.is_negated()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;
    use StacksAndEventsQueryMode::{Events, InvertedStacks, Stacks};

    fn run(query: &str, mode: StacksAndEventsQueryMode) -> StacksAndEventsQueryResult {
        StacksAndEventsQueryVisitor::run_query(query, mode).unwrap()
    }

    fn assert_split(query: &str, stacks: &str, inverted: &str, events: &str) {
        assert_eq!(run(query, Stacks).query, stacks, "stacks filter for {query}");
        assert_eq!(run(query, InvertedStacks).query, inverted, "inverted filter for {query}");
        assert_eq!(run(query, Events).query, events, "events filter for {query}");
    }

    #[test]
    fn test_unknown_bare_term() {
        assert_split("blah", "", "", "blah");
    }

    #[test]
    fn test_stack_only_field() {
        assert_split("status:fixed", "status:fixed", "NOT status:fixed", "");
    }

    #[test]
    fn test_is_fixed_expansion() {
        assert_split("is_fixed:true", "status:fixed", "NOT status:fixed", "");
        assert_eq!(run("is_fixed:false", Stacks).query, "NOT status:fixed");
        assert_eq!(run("IS_FIXED:True", Stacks).query, "status:fixed");
    }

    #[test]
    fn test_is_regressed_expansion() {
        assert_eq!(run("is_regressed:true", Stacks).query, "status:regressed");
        assert_eq!(run("is_regressed:false", Stacks).query, "NOT status:regressed");
        assert_eq!(run("is_regressed:false", InvertedStacks).query, "status:regressed");
    }

    #[test]
    fn test_unparsable_boolean_is_false() {
        assert_eq!(run("is_fixed:maybe", Stacks).query, "NOT status:fixed");
    }

    #[test]
    fn test_is_hidden_expansion() {
        assert_split(
            "is_hidden:true",
            "NOT (status:open AND status:regressed)",
            "(status:open AND status:regressed)",
            "",
        );
        assert_split(
            "is_hidden:false",
            "(status:open OR status:regressed)",
            "NOT (status:open OR status:regressed)",
            "",
        );
    }

    #[test]
    fn test_unknown_field_with_group() {
        assert_split(
            "blah:true (status:fixed OR status:open)",
            "(status:fixed OR status:open)",
            "NOT (status:fixed OR status:open)",
            "blah:true",
        );
    }

    #[test]
    fn test_mixed_shared_and_unknown_fields() {
        assert_split(
            "project:123 (status:open OR status:regressed) (ref.session:5f3dce2668de920001466635 OR project:234)",
            "project:123 (status:open OR status:regressed) (project:234)",
            "project:123 NOT (status:open OR status:regressed) (project:234)",
            "project:123  (ref.session:5f3dce2668de920001466635 OR project:234)",
        );
    }

    #[test]
    fn test_events_keeps_everything_else_untouched() {
        let query = "status:open tag:x first:[1 TO 2] NOT blah is_hidden:true";
        assert_eq!(run(query, Events).query, "tag:x NOT blah");
        assert_eq!(
            run(query, Stacks).query,
            "status:open tag:x first:[1 TO 2] NOT (status:open AND status:regressed)"
        );
    }

    #[test]
    fn test_stacks_is_noop_for_known_fields() {
        let query = "project:1 AND (status:open OR NOT tags:ui) _exists_:title last:<2020";
        assert_eq!(run(query, Stacks).query, query);
    }

    #[test]
    fn test_events_removes_ranges_and_presence_on_stack_fields() {
        assert_eq!(
            run("_exists_:title occurrences:>5 type:error", Events).query,
            "type:error"
        );
    }

    #[test]
    fn test_group_inverted_once() {
        let result = run("(status:open OR status:fixed)", InvertedStacks);
        assert_eq!(result.query, "NOT (status:open OR status:fixed)");
        assert!(result.is_invert_successful);
    }

    #[test]
    fn test_single_child_group_negates_its_member() {
        for (query, inverted) in [
            ("(status:open)", "(NOT status:open)"),
            ("(title:x)", "(NOT title:x)"),
            ("blah:true (status:open)", "(NOT status:open)"),
            // blah is pruned before status:open is inverted
            ("(blah status:open)", "(NOT status:open)"),
        ] {
            let result = run(query, InvertedStacks);
            assert_eq!(result.query, inverted, "inverted filter for {query}");
            assert!(result.is_invert_successful);
            assert_ne!(result.query, run(query, Stacks).query);
        }
    }

    #[test]
    fn test_nested_chain_group_is_negated_as_a_whole() {
        let result = run("status:open status:fixed title:x", InvertedStacks);
        assert_eq!(result.query, "NOT status:open NOT (status:fixed title:x)");
        assert!(result.is_invert_successful);

        let result = run("project:1 status:open title:x", InvertedStacks);
        assert_eq!(result.query, "project:1 NOT (status:open title:x)");
        assert!(result.is_invert_successful);
    }

    #[test]
    fn test_rewritten_filters_parse_back_unchanged() {
        for query in [
            "status:open status:fixed title:x",
            "project:1 status:open title:x",
            "(status:open)",
            "blah:true (status:open)",
            "is_hidden:true tag:x",
            "(stack:1 OR status:open) (status:fixed OR title:x)",
        ] {
            for mode in StacksAndEventsQueryMode::ALL {
                let rendered = run(query, mode).query;
                let reparsed = serialize(&parse(&rendered).unwrap());
                assert_eq!(reparsed.trim(), rendered, "{mode:?} filter for {query}");
            }
        }
    }

    #[test]
    fn test_long_flat_filter() {
        let tags = vec!["tag:x"; 100_000].join(" ");
        assert_eq!(run(&tags, Events).query, tags);
        assert_eq!(run(&tags, Stacks).query, tags);

        let projects = vec!["project:1"; 100_000].join(" OR ");
        let inverted = run(&projects, InvertedStacks);
        assert_eq!(inverted.query, projects);
        assert!(inverted.is_invert_successful);

        let statuses = vec!["status:open"; 100_000].join(" ");
        assert!(run(&statuses, Events).is_empty());
    }

    #[test]
    fn test_non_invertible_or_group_fails() {
        let result = run("(project:123 OR status:open)", InvertedStacks);
        assert!(!result.is_invert_successful);
        assert_eq!(result.query, "(project:123 OR status:open)");

        assert!(run("(project:123 OR status:open)", Stacks).is_invert_successful);
    }

    #[test]
    fn test_non_invertible_and_group_negates_term() {
        let result = run("(project:123 AND status:open)", InvertedStacks);
        assert!(result.is_invert_successful);
        assert_eq!(result.query, "(project:123 AND NOT status:open)");
    }

    #[test]
    fn test_root_terms_are_negated_directly() {
        assert_eq!(
            run("project:1 status:open", InvertedStacks).query,
            "project:1 NOT status:open"
        );
        assert_eq!(run("NOT status:open", InvertedStacks).query, "status:open");
    }

    #[test]
    fn test_failure_does_not_abort_walk() {
        let result = run("(stack:1 OR status:open) (status:fixed OR title:x)", InvertedStacks);
        assert!(!result.is_invert_successful);
        assert_eq!(
            result.query,
            "(stack:1 OR status:open) NOT (status:fixed OR title:x)"
        );
    }

    #[test]
    fn test_has_status_open() {
        for mode in StacksAndEventsQueryMode::ALL {
            assert!(run("status:open", mode).has_status_open);
            assert!(run("blah (STATUS:Open OR tag:x)", mode).has_status_open);
            assert!(!run("NOT status:open", mode).has_status_open);
            assert!(!run("status:fixed", mode).has_status_open);
            assert!(!run("is_hidden:false", mode).has_status_open);
        }
    }

    #[test]
    fn test_custom_field_tables() {
        let mut config = FieldConfig::default();
        config.stack_only.insert("owner".to_string(), vec![]);
        config
            .stack_only_virtual
            .insert("is_hidden".to_string(), vec!["hidden".to_string()]);
        let tables = FieldTables::with_config(&config);

        let result =
            StacksAndEventsQueryVisitor::run_query_with_fields("owner:me hidden:false", Stacks, &tables)
                .unwrap();
        assert_eq!(result.query, "owner:me (status:open OR status:regressed)");

        let events =
            StacksAndEventsQueryVisitor::run_query_with_fields("owner:me blah", Events, &tables)
                .unwrap();
        assert_eq!(events.query, "blah");
    }

    #[test]
    fn test_cloned_tree_runs_per_mode() {
        let tree = parse("tag:x status:open").unwrap();
        let stacks = StacksAndEventsQueryVisitor::run(tree.clone(), Stacks);
        let events = StacksAndEventsQueryVisitor::run(tree, Events);
        assert_eq!(stacks.query, "tag:x status:open");
        assert_eq!(events.query, "tag:x");
        assert!(events.has_status_open);
    }

    #[test]
    fn test_parse_error_is_surfaced() {
        assert!(StacksAndEventsQueryVisitor::run_query("(status:open", Stacks).is_err());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let json = serde_json::to_value(run("status:open", Stacks)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "query": "status:open",
                "isInvertSuccessful": true,
                "hasStatusOpen": true
            })
        );
    }

    #[tokio::test]
    async fn test_async_matches_sync() {
        let query = "blah:true (status:fixed OR status:open)";
        for mode in StacksAndEventsQueryMode::ALL {
            let sync = run(query, mode);
            let from_text = StacksAndEventsQueryVisitor::run_query_async(query, mode)
                .await
                .unwrap();
            let from_tree =
                StacksAndEventsQueryVisitor::run_async(parse(query).unwrap(), mode).await;
            assert_eq!(from_text, sync);
            assert_eq!(from_tree, sync);
        }
    }
}
