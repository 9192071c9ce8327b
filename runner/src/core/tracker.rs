//! Tracker tree used to explore every leaf path of a test case exactly once.
//!
//! The driver re-runs a test body from the top once per cycle. Each section
//! or index loop the body reaches is looked up (or created) in this tree by
//! `(name, parent)`. Nodes remember how far their subtree has been explored,
//! so on later cycles completed blocks are skipped without running their
//! bodies and the first unexplored block is entered instead.
//!
//! Nodes live in an arena owned by [`TrackerContext`] and refer to each other
//! through [`NodeId`] handles. Parent handles are lookup-only; the arena is
//! dropped wholesale when the test case ends.

use std::fmt::Write as _;

use thiserror::Error;

/// Name of the synthetic root that every test case node hangs off.
pub const ROOT_NAME: &str = "{root}";

/// Stable handle to a node in the tracker arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Exploration state of a node within the current test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    NotStarted,
    Executing,
    ExecutingChildren,
    /// A child failed; another cycle must revisit this node for its other children.
    NeedsAnotherRun,
    CompletedSuccessfully,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Section,
    /// Bounded ordinal repeat. `index` is `None` until the first advance.
    Index { size: usize, index: Option<usize> },
}

impl NodeKind {
    fn label(&self) -> &'static str {
        match self {
            NodeKind::Section => "section",
            NodeKind::Index { .. } => "index loop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum RunState {
    #[default]
    NotStarted,
    Executing,
    /// A node closed or failed during this cycle; nothing else may be entered.
    CompletedCycle,
}

/// Violations of the tracker's own invariants. These indicate an engine bug,
/// not a failing test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("illogical {op} of tracker `{name}` in state {state:?}")]
    IllogicalState {
        op: &'static str,
        name: String,
        state: CycleState,
    },
    #[error("tracker `{name}` acquired as {wanted} but already exists as {found}")]
    KindMismatch {
        name: String,
        wanted: &'static str,
        found: &'static str,
    },
    #[error("tracker `{name}` is not on the open path")]
    NotOnOpenPath { name: String },
    #[error("no tracker run in progress")]
    NotRunning,
}

#[derive(Debug, Clone)]
struct TrackerNode {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    state: CycleState,
    kind: NodeKind,
}

/// Outcome of acquiring a node for the block the body just reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired {
    pub node: NodeId,
    /// The node was opened this cycle and its body must run.
    pub entered: bool,
    /// The node was opened from a state with no partially explored children.
    pub fresh: bool,
}

/// Owns the tracker tree of one test case across all of its cycles.
#[derive(Debug, Default)]
pub struct TrackerContext {
    nodes: Vec<TrackerNode>,
    root: Option<NodeId>,
    current: Option<NodeId>,
    run_state: RunState,
}

impl TrackerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the persistent root for a new test case, discarding any old tree.
    pub fn start_run(&mut self) -> NodeId {
        self.nodes.clear();
        let root = self.push_node(ROOT_NAME.to_string(), None, NodeKind::Section);
        self.root = Some(root);
        self.current = None;
        self.run_state = RunState::Executing;
        root
    }

    pub fn end_run(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.current = None;
        self.run_state = RunState::NotStarted;
    }

    pub fn start_cycle(&mut self) -> Result<(), TrackerError> {
        let root = self.root.ok_or(TrackerError::NotRunning)?;
        self.current = Some(root);
        self.run_state = RunState::Executing;
        Ok(())
    }

    pub fn complete_cycle(&mut self) {
        self.run_state = RunState::CompletedCycle;
    }

    pub fn completed_cycle(&self) -> bool {
        self.run_state == RunState::CompletedCycle
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn current(&self) -> Result<NodeId, TrackerError> {
        self.current.ok_or(TrackerError::NotRunning)
    }

    pub fn set_current(&mut self, id: NodeId) {
        self.current = Some(id);
    }

    /// Number of nodes allocated in the arena, detached ones included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ---- queries -------------------------------------------------------

    pub fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    pub fn state(&self, id: NodeId) -> CycleState {
        self.node(id).state
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.node(id).children.is_empty()
    }

    /// Successfully completed, failed, or skipped.
    pub fn is_complete(&self, id: NodeId) -> bool {
        matches!(
            self.state(id),
            CycleState::CompletedSuccessfully | CycleState::Failed | CycleState::Skipped
        )
    }

    pub fn is_successfully_completed(&self, id: NodeId) -> bool {
        self.state(id) == CycleState::CompletedSuccessfully
    }

    /// Started but not complete.
    pub fn is_open(&self, id: NodeId) -> bool {
        self.state(id) != CycleState::NotStarted && !self.is_complete(id)
    }

    /// Current ordinal of an index loop, `None` for sections or before the first advance.
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        match self.kind(id) {
            NodeKind::Index { index, .. } => index,
            NodeKind::Section => None,
        }
    }

    /// Dot-separated path from the test case down to `id`; the root is omitted.
    pub fn full_name(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            let parent = self.parent(node);
            if parent.is_none() {
                break;
            }
            parts.push(self.name(node));
            cursor = parent;
        }
        parts.reverse();
        parts.join(".")
    }

    // ---- acquisition ---------------------------------------------------

    /// Resolve the named section under the current node and open it if this
    /// cycle should run its body.
    pub fn acquire_section(&mut self, name: &str) -> Result<Acquired, TrackerError> {
        let node = self.find_or_create(name, NodeKind::Section)?;
        let mut acquired = Acquired {
            node,
            entered: false,
            fresh: false,
        };
        if !self.completed_cycle() && !self.is_complete(node) {
            acquired.fresh = self.opens_fresh(node);
            self.open(node)?;
            acquired.entered = true;
        }
        Ok(acquired)
    }

    /// Resolve the named index loop under the current node. On a fresh open
    /// the ordinal advances and the previous ordinal's children are dropped.
    ///
    /// A loop of size zero has nothing to explore and completes without
    /// ever being entered.
    pub fn acquire_index(&mut self, name: &str, size: usize) -> Result<Acquired, TrackerError> {
        let node = self.find_or_create(name, NodeKind::Index { size, index: None })?;
        let mut acquired = Acquired {
            node,
            entered: false,
            fresh: false,
        };
        if size == 0 {
            if self.state(node) == CycleState::NotStarted {
                self.node_mut(node).state = CycleState::CompletedSuccessfully;
            }
            return Ok(acquired);
        }
        if !self.completed_cycle() && !self.is_complete(node) {
            acquired.fresh = self.opens_fresh(node);
            if acquired.fresh {
                self.move_next(node);
            }
            self.open(node)?;
            acquired.entered = true;
        }
        Ok(acquired)
    }

    fn opens_fresh(&self, id: NodeId) -> bool {
        !matches!(
            self.state(id),
            CycleState::ExecutingChildren | CycleState::NeedsAnotherRun
        )
    }

    fn find_or_create(&mut self, name: &str, kind: NodeKind) -> Result<NodeId, TrackerError> {
        let parent = self.current()?;
        let existing = self
            .children(parent)
            .iter()
            .copied()
            .find(|child| self.name(*child) == name);
        if let Some(child) = existing {
            let found = self.kind(child);
            if std::mem::discriminant(&found) != std::mem::discriminant(&kind) {
                return Err(TrackerError::KindMismatch {
                    name: name.to_string(),
                    wanted: kind.label(),
                    found: found.label(),
                });
            }
            return Ok(child);
        }
        let child = self.push_node(name.to_string(), Some(parent), kind);
        self.node_mut(parent).children.push(child);
        Ok(child)
    }

    fn move_next(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        if let NodeKind::Index { index, .. } = &mut node.kind {
            *index = Some(index.map_or(0, |i| i + 1));
        }
        // Each ordinal explores a disjoint subtree; the old slots stay in the
        // arena until the run ends.
        node.children.clear();
    }

    // ---- transitions ---------------------------------------------------

    /// Mark `id` executing, make it current, and flag every ancestor as
    /// executing children.
    pub fn open(&mut self, id: NodeId) -> Result<(), TrackerError> {
        if self.is_complete(id) {
            return Err(self.illogical("open", id));
        }
        self.node_mut(id).state = CycleState::Executing;
        self.current = Some(id);
        if let Some(parent) = self.parent(id) {
            self.open_child(parent);
        }
        Ok(())
    }

    fn open_child(&mut self, id: NodeId) {
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            if self.state(node) == CycleState::ExecutingChildren {
                break;
            }
            self.node_mut(node).state = CycleState::ExecutingChildren;
            cursor = self.parent(node);
        }
    }

    /// Normal end of the block guarded by `id`.
    pub fn close(&mut self, id: NodeId) -> Result<(), TrackerError> {
        self.close_descendants(id)?;

        let next = match self.state(id) {
            CycleState::NotStarted
            | CycleState::CompletedSuccessfully
            | CycleState::Failed
            | CycleState::Skipped => return Err(self.illogical("close", id)),
            CycleState::NeedsAnotherRun => CycleState::NeedsAnotherRun,
            CycleState::Executing => CycleState::CompletedSuccessfully,
            CycleState::ExecutingChildren => {
                let last_done = self
                    .children(id)
                    .last()
                    .is_none_or(|child| self.is_complete(*child));
                if last_done {
                    CycleState::CompletedSuccessfully
                } else {
                    CycleState::ExecutingChildren
                }
            }
        };
        self.node_mut(id).state = next;

        if let NodeKind::Index { size, index } = self.kind(id)
            && next == CycleState::CompletedSuccessfully
            && index.is_some_and(|i| i + 1 < size)
        {
            self.node_mut(id).state = CycleState::Executing;
        }

        self.current = self.parent(id);
        self.complete_cycle();
        Ok(())
    }

    /// Exclude `id` from the exploration without requesting another cycle.
    pub fn skip(&mut self, id: NodeId) -> Result<(), TrackerError> {
        self.close_descendants(id)?;
        if self.state(id) != CycleState::Executing {
            return Err(self.illogical("skip", id));
        }
        self.node_mut(id).state = CycleState::Skipped;
        self.current = self.parent(id);
        Ok(())
    }

    /// Abandon the block guarded by `id` after an abort. The parent is asked
    /// to run again so untried siblings still get their cycle.
    pub fn fail(&mut self, id: NodeId) -> Result<(), TrackerError> {
        self.close_descendants(id)?;
        self.node_mut(id).state = CycleState::Failed;
        if let Some(parent) = self.parent(id) {
            self.mark_as_needing_another_run(parent);
        }
        self.current = self.parent(id);
        self.complete_cycle();
        Ok(())
    }

    pub fn mark_as_needing_another_run(&mut self, id: NodeId) {
        self.node_mut(id).state = CycleState::NeedsAnotherRun;
    }

    /// Close nodes that were entered without an explicit end (index loops)
    /// and are still current below `id`.
    fn close_descendants(&mut self, id: NodeId) -> Result<(), TrackerError> {
        loop {
            let current = self.current()?;
            if current == id {
                return Ok(());
            }
            if !self.is_ancestor(id, current) {
                return Err(TrackerError::NotOnOpenPath {
                    name: self.full_name(id),
                });
            }
            self.close(current)?;
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = self.parent(node);
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            cursor = self.parent(parent);
        }
        false
    }

    // ---- diagnostics ---------------------------------------------------

    /// Indented dump of the tree; the current node is marked with `!`.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.render_node(root, 0, &mut out);
        }
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let marker = if self.current == Some(id) { '!' } else { ' ' };
        let _ = write!(out, "{marker}{:indent$}{}", "", self.name(id), indent = depth);
        if let Some(index) = self.index_of(id) {
            let _ = write!(out, "[{index}]");
        }
        let _ = writeln!(out, " ({:?})", self.state(id));
        for child in self.children(id) {
            self.render_node(*child, depth + 1, out);
        }
    }

    // ---- arena ---------------------------------------------------------

    fn push_node(&mut self, name: String, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TrackerNode {
            name,
            parent,
            children: Vec::new(),
            state: CycleState::NotStarted,
            kind,
        });
        id
    }

    fn node(&self, id: NodeId) -> &TrackerNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut TrackerNode {
        &mut self.nodes[id.0]
    }

    fn illogical(&self, op: &'static str, id: NodeId) -> TrackerError {
        TrackerError::IllogicalState {
            op,
            name: self.full_name(id),
            state: self.state(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Start a cycle and acquire the test case node the way the driver does.
    fn begin(ctx: &mut TrackerContext) -> NodeId {
        ctx.start_cycle().expect("start cycle");
        let case = ctx.acquire_section("case").expect("acquire case");
        assert!(case.entered, "case node must be entered every cycle");
        case.node
    }

    #[test]
    fn single_section_completes_in_one_cycle() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();
        let case = begin(&mut ctx);

        let a = ctx.acquire_section("A").expect("acquire A");
        assert!(a.entered && a.fresh);
        assert_eq!(ctx.state(case), CycleState::ExecutingChildren);
        ctx.close(a.node).expect("close A");
        ctx.close(case).expect("close case");

        assert!(ctx.is_successfully_completed(a.node));
        assert!(ctx.is_successfully_completed(case));
    }

    #[test]
    fn sibling_sections_take_one_cycle_each() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();

        let case = begin(&mut ctx);
        let a = ctx.acquire_section("A").expect("A");
        assert!(a.entered);
        ctx.close(a.node).expect("close A");
        let b = ctx.acquire_section("B").expect("B");
        assert!(!b.entered, "a closed node ends what this cycle may enter");
        ctx.close(case).expect("close case");
        assert_eq!(ctx.state(case), CycleState::ExecutingChildren);

        let case = begin(&mut ctx);
        assert!(!ctx.acquire_section("A").expect("A").entered);
        let b = ctx.acquire_section("B").expect("B");
        assert!(b.entered && b.fresh);
        ctx.close(b.node).expect("close B");
        ctx.close(case).expect("close case");
        assert!(ctx.is_successfully_completed(case));
    }

    #[test]
    fn failed_section_requests_another_run_for_siblings() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();

        let case = begin(&mut ctx);
        let a = ctx.acquire_section("A").expect("A");
        ctx.fail(a.node).expect("fail A");
        assert_eq!(ctx.state(a.node), CycleState::Failed);
        assert_eq!(ctx.state(case), CycleState::NeedsAnotherRun);
        ctx.close(case).expect("close case");
        assert_eq!(ctx.state(case), CycleState::NeedsAnotherRun);

        let case = begin(&mut ctx);
        assert!(!ctx.acquire_section("A").expect("A").entered);
        let b = ctx.acquire_section("B").expect("B");
        assert!(b.entered);
        ctx.close(b.node).expect("close B");
        ctx.close(case).expect("close case");
        assert!(ctx.is_successfully_completed(case));
    }

    #[test]
    fn failing_last_child_costs_one_extra_cycle() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();

        let case = begin(&mut ctx);
        let b = ctx.acquire_section("B").expect("B");
        ctx.close(b.node).expect("close B");
        ctx.acquire_section("A").expect("A");
        ctx.close(case).expect("close case");

        let case = begin(&mut ctx);
        ctx.acquire_section("B").expect("B");
        let a = ctx.acquire_section("A").expect("A");
        ctx.fail(a.node).expect("fail A");
        ctx.close(case).expect("close case");
        assert!(!ctx.is_successfully_completed(case));

        let case = begin(&mut ctx);
        assert!(!ctx.acquire_section("B").expect("B").entered);
        assert!(!ctx.acquire_section("A").expect("A").entered);
        ctx.close(case).expect("close case");
        assert!(ctx.is_successfully_completed(case));
    }

    #[test]
    fn index_loop_visits_each_ordinal_with_fresh_children() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();
        let mut seen = Vec::new();

        for cycle in 0..3 {
            let case = begin(&mut ctx);
            let loop_node = ctx.acquire_index("rows", 3).expect("rows");
            assert!(loop_node.entered && loop_node.fresh);
            seen.push(ctx.index_of(loop_node.node).expect("ordinal"));
            assert!(!ctx.has_children(loop_node.node));

            let inner = ctx.acquire_section("inner").expect("inner");
            assert!(inner.entered);
            ctx.close(inner.node).expect("close inner");
            // The index node is still current and is closed by the case.
            ctx.close(case).expect("close case");
            assert_eq!(ctx.is_successfully_completed(case), cycle == 2);
        }

        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn empty_index_loop_is_never_entered() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();
        let case = begin(&mut ctx);
        let empty = ctx.acquire_index("none", 0).expect("none");
        assert!(!empty.entered);
        assert!(ctx.is_successfully_completed(empty.node));
        ctx.close(case).expect("close case");
        assert!(ctx.is_successfully_completed(case));
    }

    #[test]
    fn skipped_sections_do_not_end_the_cycle() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();
        let case = begin(&mut ctx);

        let a = ctx.acquire_section("A").expect("A");
        ctx.skip(a.node).expect("skip A");
        let b = ctx.acquire_section("B").expect("B");
        assert!(b.entered);
        ctx.skip(b.node).expect("skip B");
        ctx.close(case).expect("close case");

        assert_eq!(ctx.state(a.node), CycleState::Skipped);
        assert_eq!(ctx.state(b.node), CycleState::Skipped);
        assert!(ctx.is_successfully_completed(case));
    }

    #[test]
    fn closing_unopened_node_is_illogical() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();
        let case = begin(&mut ctx);
        let a = ctx.acquire_section("A").expect("A");
        ctx.close(a.node).expect("close A");
        let b = ctx.acquire_section("B").expect("B");

        ctx.set_current(b.node);
        let err = ctx.close(b.node).expect_err("B never opened");
        assert!(matches!(
            err,
            TrackerError::IllogicalState {
                op: "close",
                state: CycleState::NotStarted,
                ..
            }
        ));
        assert_eq!(ctx.full_name(case), "case");
    }

    #[test]
    fn skip_requires_executing_state() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();
        let case = begin(&mut ctx);
        let a = ctx.acquire_section("A").expect("A");
        ctx.acquire_section("A.X").expect("A.X");
        ctx.set_current(a.node);
        let err = ctx.skip(a.node).expect_err("A is executing children");
        assert!(matches!(err, TrackerError::IllogicalState { op: "skip", .. }));
        let _ = case;
    }

    #[test]
    fn reacquiring_with_another_kind_is_rejected() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();
        let case = begin(&mut ctx);
        let a = ctx.acquire_section("A").expect("A");
        ctx.close(a.node).expect("close A");
        ctx.set_current(case);
        let err = ctx.acquire_index("A", 2).expect_err("kind mismatch");
        assert!(matches!(err, TrackerError::KindMismatch { .. }));
    }

    #[test]
    fn full_name_and_render_tree_describe_the_open_path() {
        let mut ctx = TrackerContext::new();
        ctx.start_run();
        begin(&mut ctx);
        let a = ctx.acquire_section("A").expect("A");
        let x = ctx.acquire_section("X").expect("X");

        assert_eq!(ctx.full_name(x.node), "case.A.X");
        assert_eq!(ctx.current().expect("current"), x.node);
        let dump = ctx.render_tree();
        assert!(dump.contains("!   X (Executing)"), "{dump}");
        assert!(dump.contains(" A (ExecutingChildren)"), "{dump}");
        let _ = a;
    }

    #[test]
    fn acquire_without_run_reports_not_running() {
        let mut ctx = TrackerContext::new();
        assert_eq!(ctx.start_cycle(), Err(TrackerError::NotRunning));
        assert_eq!(
            ctx.acquire_section("A").expect_err("no run"),
            TrackerError::NotRunning
        );
        ctx.start_run();
        ctx.end_run();
        assert_eq!(ctx.node_count(), 0);
    }
}
