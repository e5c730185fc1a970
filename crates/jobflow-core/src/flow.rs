//! A flow: an ordered, nestable collection of jobs and sub-flows that
//! together form a DAG of data dependencies.
//!
//! A flow owns its children exclusively — a job or sub-flow belongs to
//! exactly one parent. The
//! flow's own output is a symbolic projection: a [`Value`] (typically
//! containing [`OutputReference`]s into its children) describing what a
//! reference to the *flow's* uuid should resolve to, without the flow
//! itself ever executing.

use std::collections::{HashMap, HashSet};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{JobflowError, Result};
use crate::job::Job;
use crate::reference::OutputReference;
use crate::value::Value;

/// A direct member of a [`Flow`]: either a leaf job or a nested flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowChild {
    Job(Job),
    Flow(Flow),
}

impl FlowChild {
    pub fn uuid(&self) -> Uuid {
        match self {
            FlowChild::Job(job) => job.uuid,
            FlowChild::Flow(flow) => flow.uuid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub uuid: Uuid,
    pub name: String,
    pub children: Vec<FlowChild>,
    /// The value a reference to this flow's uuid resolves to. `None` until
    /// the flow's last child completes and the engine derives it (by
    /// default, the output of the last-added child).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default)]
    pub hosts: Vec<Uuid>,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Flow {
            uuid: Uuid::new_v4(),
            name: name.into(),
            children: Vec::new(),
            output: None,
            hosts: Vec::new(),
        }
    }

    /// Append a job as a child of this flow, stamping its `hosts`. Errors
    /// if a job with the same uuid is already a (possibly nested) child of
    /// this flow — the closest static-Rust approximation of the
    /// "a child appears in exactly one Flow" invariant that move semantics
    /// don't already cover (see `DESIGN.md`) — or if adding it would close a
    /// dependency cycle.
    pub fn add_job(&mut self, mut job: Job) -> Result<Uuid> {
        if self.all_uuids().contains(&job.uuid) {
            return Err(JobflowError::GraphConstruction(format!(
                "job {} already belongs to a flow",
                job.uuid
            )));
        }
        job.hosts = self.hosted_path();
        let uuid = job.uuid;
        self.children.push(FlowChild::Job(job));
        if let Err(err) = self.validate_acyclic() {
            self.children.pop();
            return Err(err);
        }
        Ok(uuid)
    }

    /// Append a sub-flow as a child of this flow, stamping its `hosts` and
    /// recursively reprefixing every job it transitively contains — a
    /// sub-flow's children are stamped relative to *it* when they're
    /// added, so nesting the sub-flow itself has to redo their
    /// `hosts` rather than just its own. Errors if adding it would close a
    /// dependency cycle.
    pub fn add_flow(&mut self, mut flow: Flow) -> Result<Uuid> {
        if self.all_uuids().contains(&flow.uuid) {
            return Err(JobflowError::GraphConstruction(format!(
                "flow {} already belongs to a flow",
                flow.uuid
            )));
        }
        flow.reprefix_hosts(&self.hosted_path());
        let uuid = flow.uuid;
        self.children.push(FlowChild::Flow(flow));
        if let Err(err) = self.validate_acyclic() {
            self.children.pop();
            return Err(err);
        }
        Ok(uuid)
    }

    /// Recompute `hosts` for this flow and every job/sub-flow it
    /// transitively contains, as though it had just been nested under a
    /// flow whose own hosts are `prefix`.
    pub fn reprefix_hosts(&mut self, prefix: &[Uuid]) {
        self.hosts = prefix.to_vec();
        let mut child_prefix = prefix.to_vec();
        child_prefix.push(self.uuid);
        reprefix_children(&mut self.children, &child_prefix);
    }

    /// This flow's symbolic output: the explicitly set
    /// projection if any, otherwise the default of "the output of the
    /// last-added child", recursing into a child sub-flow's own default.
    /// `None` for an empty flow.
    pub fn effective_output(&self) -> Option<Value> {
        if let Some(output) = &self.output {
            return Some(output.clone());
        }
        match self.children.last() {
            Some(FlowChild::Job(job)) => Some(Value::Reference(job.output())),
            Some(FlowChild::Flow(flow)) => flow.effective_output(),
            None => None,
        }
    }

    fn hosted_path(&self) -> Vec<Uuid> {
        let mut path = self.hosts.clone();
        path.push(self.uuid);
        path
    }

    /// A reference to this flow's output, for wiring it into a sibling or
    /// parent job's arguments without evaluating it.
    pub fn output_ref(&self) -> OutputReference {
        OutputReference::new(self.uuid)
    }

    /// All job and flow uuids reachable from this flow, in depth-first
    /// insertion order, this flow's own uuid included last as the root.
    pub fn all_uuids(&self) -> Vec<Uuid> {
        let mut out = Vec::new();
        self.collect_uuids(&mut out);
        out
    }

    fn collect_uuids(&self, out: &mut Vec<Uuid>) {
        for child in &self.children {
            match child {
                FlowChild::Job(job) => out.push(job.uuid),
                FlowChild::Flow(flow) => flow.collect_uuids(out),
            }
        }
        out.push(self.uuid);
    }

    /// Every leaf job reachable from this flow, depth-first, each paired
    /// with its depth-first position (used to assign [`Job::index`]).
    pub fn iter_jobs(&self) -> Vec<&Job> {
        let mut out = Vec::new();
        self.collect_jobs(&mut out);
        out
    }

    fn collect_jobs<'a>(&'a self, out: &mut Vec<&'a Job>) {
        for child in &self.children {
            match child {
                FlowChild::Job(job) => out.push(job),
                FlowChild::Flow(flow) => flow.collect_jobs(out),
            }
        }
    }

    /// Mutable, depth-first access to every leaf job. Used by the engine
    /// to assign indices and to splice in detour/addition/replace jobs.
    pub fn iter_jobs_mut(&mut self) -> Vec<&mut Job> {
        let mut out = Vec::new();
        self.collect_jobs_mut(&mut out);
        out
    }

    fn collect_jobs_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Job>) {
        for child in &mut self.children {
            match child {
                FlowChild::Job(job) => out.push(job),
                FlowChild::Flow(flow) => flow.collect_jobs_mut(out),
            }
        }
    }

    /// Build a dependency graph over every job and flow uuid reachable
    /// from this flow and confirm it is acyclic, upholding the invariant that
    /// a flow's dependency graph is always a DAG. An edge runs from a
    /// referenced uuid to the job/flow that references it.
    pub fn validate_acyclic(&self) -> Result<()> {
        let mut graph = DiGraph::<Uuid, ()>::new();
        let mut nodes: HashMap<Uuid, _> = HashMap::new();

        for uuid in self.all_uuids() {
            nodes.entry(uuid).or_insert_with(|| graph.add_node(uuid));
        }

        let mut seen: HashSet<Uuid> = HashSet::new();
        self.collect_edges(&mut graph, &nodes, &mut seen);

        if is_cyclic_directed(&graph) {
            return Err(JobflowError::GraphConstruction(format!(
                "flow {} contains a cyclic dependency",
                self.uuid
            )));
        }
        Ok(())
    }

    fn collect_edges(
        &self,
        graph: &mut DiGraph<Uuid, ()>,
        nodes: &HashMap<Uuid, petgraph::graph::NodeIndex>,
        seen: &mut HashSet<Uuid>,
    ) {
        for child in &self.children {
            match child {
                FlowChild::Job(job) => {
                    if seen.insert(job.uuid) {
                        for r in job.input_refs() {
                            if let (Some(&from), Some(&to)) =
                                (nodes.get(&r.uuid), nodes.get(&job.uuid))
                            {
                                graph.add_edge(from, to, ());
                            }
                        }
                    }
                }
                FlowChild::Flow(flow) => flow.collect_edges(graph, nodes, seen),
            }
        }
    }

    /// Remove the child with the given uuid from wherever it's nested,
    /// returning it. Used by `replace` directive handling to splice
    /// a cancelled job's slot out before the engine inserts its successor.
    pub fn remove_child(&mut self, uuid: Uuid) -> Option<FlowChild> {
        if let Some(pos) = self.children.iter().position(|c| c.uuid() == uuid) {
            return Some(self.children.remove(pos));
        }
        for child in &mut self.children {
            if let FlowChild::Flow(flow) = child {
                if let Some(found) = flow.remove_child(uuid) {
                    return Some(found);
                }
            }
        }
        None
    }
}

/// Recompute `hosts` for every job/flow in `children` as though they had
/// just been nested under a flow whose own hosts are `prefix`. Used both
/// by [`Flow::add_flow`] and, in `jobflow-engine`, to splice a directive's
/// raw [`FlowChild`] list into the running graph at the right depth.
pub fn reprefix_children(children: &mut [FlowChild], prefix: &[Uuid]) {
    for child in children {
        match child {
            FlowChild::Job(job) => job.hosts = prefix.to_vec(),
            FlowChild::Flow(flow) => flow.reprefix_hosts(prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::OutputReference;

    #[test]
    fn add_job_stamps_hosts() {
        let mut flow = Flow::new("root");
        let uuid = flow.add_job(Job::new("a", "noop")).unwrap();
        let job = flow.iter_jobs().into_iter().find(|j| j.uuid == uuid).unwrap();
        assert_eq!(job.hosts, vec![flow.uuid]);
    }

    #[test]
    fn nested_flow_hosts_accumulate() {
        let mut outer = Flow::new("outer");
        let mut inner = Flow::new("inner");
        let inner_uuid = inner.uuid;
        let leaf = inner.add_job(Job::new("leaf", "noop")).unwrap();
        outer.add_flow(inner).unwrap();

        let job = outer.iter_jobs().into_iter().find(|j| j.uuid == leaf).unwrap();
        assert_eq!(job.hosts, vec![outer.uuid, inner_uuid]);
    }

    #[test]
    fn add_job_rejects_duplicate_uuid() {
        let mut flow = Flow::new("root");
        let job = Job::new("a", "noop");
        let dup = job.clone();
        flow.add_job(job).unwrap();
        assert!(flow.add_job(dup).is_err());
    }

    #[test]
    fn effective_output_defaults_to_last_child() {
        let mut flow = Flow::new("root");
        flow.add_job(Job::new("a", "noop")).unwrap();
        let b = flow.add_job(Job::new("b", "noop")).unwrap();
        match flow.effective_output() {
            Some(Value::Reference(r)) => assert_eq!(r.uuid, b),
            other => panic!("expected a reference to the last child, got {other:?}"),
        }
    }

    #[test]
    fn validate_acyclic_accepts_forward_references() {
        let mut flow = Flow::new("root");
        let a = flow.add_job(Job::new("a", "noop")).unwrap();
        flow.add_job(Job::new("b", "noop").with_args(vec![Value::Reference(OutputReference::new(a))]))
            .unwrap();
        assert!(flow.validate_acyclic().is_ok());
    }

    #[test]
    fn add_job_rejects_a_cycle() {
        let mut flow = Flow::new("root");
        let a = Job::new("a", "noop");
        let a_uuid = a.uuid;
        let b = Job::new("b", "noop");
        let b_uuid = b.uuid;
        // `a` referencing `b` before `b` exists is just a forward reference.
        flow.add_job(a.with_args(vec![Value::Reference(OutputReference::new(b_uuid))]))
            .unwrap();
        // Once `b` references `a` back, closing the loop, `add_job` itself rejects it.
        let err = flow
            .add_job(b.with_args(vec![Value::Reference(OutputReference::new(a_uuid))]))
            .unwrap_err();
        assert!(matches!(err, JobflowError::GraphConstruction(_)));
        assert!(flow.validate_acyclic().is_ok());
        assert!(flow.iter_jobs().into_iter().all(|j| j.uuid != b_uuid));
    }

    #[test]
    fn remove_child_finds_nested_job() {
        let mut flow = Flow::new("root");
        let mut sub = Flow::new("sub");
        let target = sub.add_job(Job::new("target", "noop")).unwrap();
        flow.add_flow(sub).unwrap();

        let removed = flow.remove_child(target);
        assert!(removed.is_some());
        assert!(flow.iter_jobs().into_iter().all(|j| j.uuid != target));
    }
}
