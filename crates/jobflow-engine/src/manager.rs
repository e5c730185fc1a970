//! The scheduler: drives every job in a [`Flow`] to completion against a
//! [`FunctionRegistry`] and a [`StoreRouter`], computing readiness from data
//! dependencies alone rather than any fixed queue order, and
//! applying the directives a job's [`Response`] hands back before
//! moving on.
//!
//! The scheduler works over a flattened pool of jobs rather than the
//! nested [`Flow`] tree itself — readiness only cares about which uuids a
//! pending job's args/kwargs reference, not where in the tree that job
//! lives, so the tree is walked once up front (`GraphState::from_flow`) and
//! never touched again. A directive's new children are spliced into that
//! same flat pool (see `DESIGN.md`).

use std::collections::{BTreeMap, HashMap, HashSet};

use jobflow_core::flow::reprefix_children;
use jobflow_core::reference::PathSegment;
use jobflow_core::{
    map_refs, resolve_refs, Detour, Flow, FlowChild, InsertionPoint, Job, JobflowError, OutputReference, Response,
    Value,
};
use jobflow_store::{JobRecord, Load, StoreRouter};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{Config, Parallelism};
use crate::error::{EngineError, Result};
use crate::registry::FunctionRegistry;
use crate::report::{JobStatus, RunReport};
use crate::schema;

/// The callable name the scheduler recognizes itself: an identity function
/// used to give a directive's non-reference output projection an
/// addressable `(uuid, index)`, so downstream reference rewiring can always
/// reduce to a uuid swap (the "materializer identity job" decision — see
/// `DESIGN.md`).
pub const IDENTITY_CALLABLE: &str = "__jobflow_identity__";

/// Per-job result of the resolve/invoke/validate/persist pipeline, before
/// any directive is applied. Computed off the main thread in bounded mode;
/// directive application always happens back on it.
enum Outcome {
    Success(Response),
    Failed(String),
}

/// Drives one [`Flow`] run. Borrows its registry and store rather than
/// owning them so a caller can reuse both across several runs.
pub struct Manager<'a> {
    registry: &'a FunctionRegistry,
    store: &'a StoreRouter,
    config: Config,
}

impl<'a> Manager<'a> {
    pub fn new(registry: &'a FunctionRegistry, store: &'a StoreRouter, config: Config) -> Self {
        Manager { registry, store, config }
    }

    /// Run `flow` to completion, returning every job's outcome. Aborts
    /// (returns `Err`) on graph construction problems, a ready job's own
    /// input failing to resolve, or a persistence failure — every other
    /// failure mode is recorded per-job and the run continues.
    pub fn run(&self, flow: &Flow) -> Result<RunReport> {
        flow.validate_acyclic().map_err(EngineError::from)?;
        let mut state = GraphState::from_flow(flow);
        self.drive(&mut state)?;
        Ok(state.report)
    }

    fn drive(&self, state: &mut GraphState) -> Result<()> {
        loop {
            state.propagate_cancellation();
            if state.stop_jobflow {
                state.cancel_all_pending();
                break;
            }
            if state.jobs.is_empty() {
                break;
            }
            let ready = state.ready_uuids();
            if ready.is_empty() {
                return Err(EngineError::Core(JobflowError::UnresolvableGraph {
                    remaining: state.jobs.len(),
                }));
            }

            match self.config.parallelism {
                Parallelism::Sequential => {
                    let uuid = ready[0];
                    let job = state.jobs.remove(&uuid).expect("ready uuid is pending");
                    debug!(job = %job.qualified_name(), "running job");
                    let outcome = self.execute_job(&job)?;
                    self.apply_outcome(state, job, outcome);
                }
                Parallelism::Bounded(n) => {
                    let batch: Vec<Uuid> = ready.into_iter().take(n.get()).collect();
                    let jobs: Vec<Job> = batch
                        .iter()
                        .map(|uuid| state.jobs.remove(uuid).expect("ready uuid is pending"))
                        .collect();
                    debug!(batch_size = jobs.len(), "running batch");
                    let outcomes = self.execute_batch(&jobs)?;
                    for (job, outcome) in jobs.into_iter().zip(outcomes) {
                        self.apply_outcome(state, job, outcome);
                    }
                }
            }
        }
        Ok(())
    }

    fn execute_batch(&self, jobs: &[Job]) -> Result<Vec<Outcome>> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = jobs.iter().map(|job| scope.spawn(|| self.execute_job(job))).collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::Core(JobflowError::GraphConstruction(
                        "job thread panicked".into(),
                    ))),
                })
                .collect()
        })
    }

    /// Resolve args and kwargs, invoke the callable, validate against the
    /// job's schema if any, and persist the result. Reference resolution
    /// and persistence failures abort the run (propagated as `Err`);
    /// everything else becomes `Outcome::Failed` and is recorded.
    fn execute_job(&self, job: &Job) -> Result<Outcome> {
        let args = job
            .args
            .iter()
            .map(|v| resolve_refs(v, |r| self.store.get_output(r, &Load::All)))
            .collect::<jobflow_core::Result<Vec<_>>>()?;

        let mut kwargs = BTreeMap::new();
        for (key, value) in &job.kwargs {
            kwargs.insert(key.clone(), resolve_refs(value, |r| self.store.get_output(r, &Load::All))?);
        }

        match self.invoke(job, &args, &kwargs) {
            Ok(response) => {
                if let Some(schema) = &job.output_schema {
                    if let Err(reason) = schema::validate(&response.output, schema) {
                        let message = format!("schema violation: {reason}");
                        warn!(job = %job.qualified_name(), reason = %message, "job output rejected");
                        self.persist_failure(job, &message)?;
                        return Ok(Outcome::Failed(message));
                    }
                }
                self.persist_success(job, &response)?;
                Ok(Outcome::Success(response))
            }
            Err(reason) => {
                warn!(job = %job.qualified_name(), reason = %reason, "job failed");
                self.persist_failure(job, &reason)?;
                Ok(Outcome::Failed(reason))
            }
        }
    }

    fn invoke(
        &self,
        job: &Job,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> std::result::Result<Response, String> {
        if job.callable == IDENTITY_CALLABLE {
            return Ok(Response::new(args.first().cloned().unwrap_or(Value::Null)));
        }
        let callable = self
            .registry
            .get(&job.callable)
            .ok_or_else(|| EngineError::UnknownCallable(job.callable.clone()).to_string())?;
        callable.call(args, kwargs).map_err(|e| e.to_string())
    }

    fn persist_success(&self, job: &Job, response: &Response) -> Result<()> {
        let record = JobRecord::success(job.uuid, job.index, job.qualified_name(), response.output.clone())
            .with_hosts(job.hosts.clone())
            .with_metadata(job.metadata.clone())
            .with_stored_data(response.stored_data.clone());
        self.store.save(record, &job.store_names)?;
        Ok(())
    }

    fn persist_failure(&self, job: &Job, reason: &str) -> Result<()> {
        let record = JobRecord::failure(job.uuid, job.index, job.qualified_name(), reason)
            .with_hosts(job.hosts.clone())
            .with_metadata(job.metadata.clone());
        self.store.save(record, &BTreeMap::new())?;
        Ok(())
    }

    /// Record `outcome` and, on success, apply whatever directives the
    /// response carried — self-replace, then true replace, detour, and
    /// addition, then `stop_children`/`stop_jobflow` (see the ordering
    /// decision in `DESIGN.md`). Never fails: directive splicing only
    /// mutates the in-memory graph, nothing here touches the store.
    fn apply_outcome(&self, state: &mut GraphState, job: Job, outcome: Outcome) {
        let uuid = job.uuid;
        let response = match outcome {
            Outcome::Failed(reason) => {
                state.done.insert(uuid);
                state.report.outcomes.insert(uuid, (job.index, JobStatus::Failed(reason)));
                return;
            }
            Outcome::Success(response) => response,
        };

        if response.is_self_replace(&job) {
            self.apply_self_replace(state, &job, response);
            return;
        }

        state.done.insert(uuid);
        state.report.outcomes.insert(uuid, (job.index, JobStatus::Done(response.clone())));

        // Snapshot downstream dependents before splicing any directive's
        // children in, so newly-inserted children are never retroactively
        // cancelled by this same response's `stop_children` (see
        // `DESIGN.md`).
        let downstream_snapshot = response.stop_children.then(|| state.downstream_of(uuid));

        if let Some(replace) = response.replace {
            self.apply_replace(state, &job, replace.child);
        }
        if let Some(detour) = response.detour {
            self.apply_detour(state, &job, detour);
        }
        if let Some(addition) = response.addition {
            collect_children(addition.children, job.hosts.clone(), state);
        }

        if let Some(downstream) = downstream_snapshot {
            for victim in downstream {
                state.cancel(victim);
            }
        }
        if response.stop_jobflow {
            state.stop_jobflow = true;
        }
    }

    /// A self-replace keeps the job's uuid and bumps its index rather than
    /// rewiring any reference — it simply re-enters the pending pool under
    /// the same uuid.
    fn apply_self_replace(&self, state: &mut GraphState, original: &Job, response: Response) {
        let Some(jobflow_core::Replace { child: FlowChild::Job(mut next) }) = response.replace else {
            unreachable!("Response::is_self_replace guarantees a Job child");
        };
        next.uuid = original.uuid;
        next.index = original.index + 1;
        next.hosts = original.hosts.clone();
        debug!(job = %next.qualified_name(), index = next.index, "self-replace");
        state.jobs.insert(original.uuid, next);
    }

    /// A true replace splices `child` in at `original`'s host level, then
    /// rewires every not-yet-run reference to `original.uuid` onto whatever
    /// `child` ultimately projects as its output. If that projection isn't
    /// itself a bare reference, an identity job materializes it under a
    /// fresh uuid first (see `DESIGN.md`).
    fn apply_replace(&self, state: &mut GraphState, original: &Job, child: FlowChild) {
        let mut children = vec![child];
        reprefix_children(&mut children, &original.hosts);
        let projection = directive_projection(&children);
        for child in children {
            collect_child_into_state(child, state, false);
        }

        let redirect = match projection {
            Some(Value::Reference(r)) => r,
            Some(other) => self.materialize(state, original, other),
            None => self.materialize(state, original, Value::Null),
        };
        rewire_references(state, original.uuid, &redirect);
    }

    /// A detour splices `children` in alongside the returning job — which
    /// stays done, not removed — then rewires every not-yet-run reference to
    /// `job.uuid` onto whatever `children` ultimately project as their
    /// output, the same redirection `apply_replace` does for a true replace.
    /// `at` only controls where the new jobs land in the tie-break order
    /// among otherwise-ready jobs: `AfterSelf` puts them ahead of the
    /// returning job's existing siblings, `EndOfFlow` behind them.
    fn apply_detour(&self, state: &mut GraphState, job: &Job, detour: Detour) {
        let mut children = detour.children;
        reprefix_children(&mut children, &job.hosts);
        let projection = directive_projection(&children);
        let front = matches!(detour.at, InsertionPoint::AfterSelf);
        for child in children {
            collect_child_into_state(child, state, front);
        }

        let redirect = match projection {
            Some(Value::Reference(r)) => r,
            Some(other) => self.materialize(state, job, other),
            None => return,
        };
        rewire_references(state, job.uuid, &redirect);
    }

    fn materialize(&self, state: &mut GraphState, original: &Job, value: Value) -> OutputReference {
        let mut job = Job::new(format!("{}.replaced", original.name), IDENTITY_CALLABLE).with_args(vec![value]);
        job.hosts = original.hosts.clone();
        let reference = job.output();
        state.known.insert(job.uuid);
        state.order.push(job.uuid);
        state.jobs.insert(job.uuid, job);
        reference
    }
}

/// This directive's projected output: the same "last child wins" default a
/// [`Flow`]'s own `effective_output` uses, applied to a bare child list
/// rather than a nested flow.
fn directive_projection(children: &[FlowChild]) -> Option<Value> {
    match children.last() {
        Some(FlowChild::Job(job)) => Some(Value::Reference(job.output())),
        Some(FlowChild::Flow(flow)) => flow.effective_output(),
        None => None,
    }
}

fn collect_children(children: Vec<FlowChild>, host_prefix: Vec<Uuid>, state: &mut GraphState) {
    let mut children = children;
    reprefix_children(&mut children, &host_prefix);
    for child in children {
        collect_child_into_state(child, state, false);
    }
}

/// Splice one child into the pending pool. `front` only affects its
/// position in `order`'s tie-break among otherwise-equally-ready jobs —
/// readiness itself is still computed purely from data dependencies.
fn collect_child_into_state(child: FlowChild, state: &mut GraphState, front: bool) {
    let mut insert = |uuid: Uuid, state: &mut GraphState| {
        state.known.insert(uuid);
        if front {
            state.order.insert(0, uuid);
        } else {
            state.order.push(uuid);
        }
    };
    match child {
        FlowChild::Job(job) => {
            insert(job.uuid, state);
            state.jobs.insert(job.uuid, job);
        }
        FlowChild::Flow(flow) => {
            for job in flow.iter_jobs() {
                insert(job.uuid, state);
                state.jobs.insert(job.uuid, job.clone());
            }
        }
    }
}

fn rewire_references(state: &mut GraphState, from: Uuid, to: &OutputReference) {
    for job in state.jobs.values_mut() {
        let mut rewrite = |r: &OutputReference| {
            if r.uuid == from {
                OutputReference {
                    uuid: to.uuid,
                    path: compose_path(&to.path, &r.path),
                    source_stores: r.source_stores.clone(),
                }
            } else {
                r.clone()
            }
        };
        job.args = job.args.iter().map(|v| map_refs(v, &mut rewrite)).collect();
        job.kwargs = job
            .kwargs
            .iter()
            .map(|(k, v)| (k.clone(), map_refs(v, &mut rewrite)))
            .collect();
    }
}

fn compose_path(prefix: &[PathSegment], suffix: &[PathSegment]) -> Vec<PathSegment> {
    prefix.iter().cloned().chain(suffix.iter().cloned()).collect()
}

/// The scheduler's mutable working set: a flat pool of not-yet-run jobs
/// plus enough bookkeeping to compute readiness and record outcomes.
struct GraphState {
    jobs: HashMap<Uuid, Job>,
    /// Insertion order, oldest first — `ready_uuids` walks it so two
    /// equally-ready jobs run in the order they were discovered.
    order: Vec<Uuid>,
    /// Every uuid that belongs to this run's own graph, as opposed to a
    /// reference to a job that ran in a previous, separate run. Only
    /// `known` uuids gate readiness; an unknown uuid is assumed already
    /// resolvable in the store (a "prior" reference into an earlier run).
    known: HashSet<Uuid>,
    done: HashSet<Uuid>,
    cancelled: HashSet<Uuid>,
    stop_jobflow: bool,
    report: RunReport,
}

impl GraphState {
    fn from_flow(flow: &Flow) -> Self {
        let mut jobs = HashMap::new();
        let mut order = Vec::new();
        let mut known = HashSet::new();
        for job in flow.iter_jobs() {
            known.insert(job.uuid);
            order.push(job.uuid);
            jobs.insert(job.uuid, job.clone());
        }
        GraphState {
            jobs,
            order,
            known,
            done: HashSet::new(),
            cancelled: HashSet::new(),
            stop_jobflow: false,
            report: RunReport::default(),
        }
    }

    /// Pending jobs whose every input uuid is either done or not part of
    /// this run's own graph, in discovery order.
    fn ready_uuids(&self) -> Vec<Uuid> {
        self.order
            .iter()
            .copied()
            .filter(|uuid| self.jobs.contains_key(uuid))
            .filter(|uuid| {
                self.jobs[uuid]
                    .input_uuids()
                    .iter()
                    .all(|dep| !self.known.contains(dep) || self.done.contains(dep))
            })
            .collect()
    }

    /// Every uuid whose bookkeeping records it as `cancelled` even though
    /// it was already removed from `jobs` previously; freshly cancels any
    /// still-pending job that depends, directly or transitively, on an
    /// already-cancelled uuid, to a fixed point.
    fn propagate_cancellation(&mut self) {
        loop {
            let newly: Vec<Uuid> = self
                .jobs
                .iter()
                .filter(|(_, job)| job.input_uuids().iter().any(|dep| self.cancelled.contains(dep)))
                .map(|(uuid, _)| *uuid)
                .collect();
            if newly.is_empty() {
                break;
            }
            for uuid in newly {
                self.cancel(uuid);
            }
        }
    }

    /// Every pending job reachable by repeatedly following "depends on
    /// `root`" edges — the set `stop_children` cancels.
    fn downstream_of(&self, root: Uuid) -> HashSet<Uuid> {
        let mut out = HashSet::new();
        let mut frontier = vec![root];
        while let Some(uuid) = frontier.pop() {
            for (candidate, job) in &self.jobs {
                if !out.contains(candidate) && job.input_uuids().contains(&uuid) {
                    out.insert(*candidate);
                    frontier.push(*candidate);
                }
            }
        }
        out
    }

    fn cancel(&mut self, uuid: Uuid) {
        if self.cancelled.contains(&uuid) {
            return;
        }
        self.cancelled.insert(uuid);
        let index = self.jobs.remove(&uuid).map(|job| job.index).unwrap_or(1);
        self.report.outcomes.insert(uuid, (index, JobStatus::Cancelled));
    }

    fn cancel_all_pending(&mut self) {
        let pending: Vec<Uuid> = self.jobs.keys().copied().collect();
        for uuid in pending {
            self.cancel(uuid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_core::InsertionPoint;
    use jobflow_store::MemoryStore;

    type CallResult = std::result::Result<Response, crate::registry::JobError>;

    fn add(args: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
        let a = args[0].as_f64().unwrap_or(0.0);
        let b = args[1].as_f64().unwrap_or(0.0);
        Ok(Response::new(Value::from(a + b)))
    }

    fn sum_numbers(args: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
        let Some(Value::Sequence(items)) = args.first() else {
            return Err("sum_numbers expects a single sequence argument".into());
        };
        let total: f64 = items.iter().filter_map(Value::as_f64).sum();
        Ok(Response::new(Value::from(total)))
    }

    fn constant(value: f64) -> impl Fn(&[Value], &BTreeMap<String, Value>) -> CallResult {
        move |_, _| Ok(Response::new(Value::from(value)))
    }

    fn router() -> StoreRouter {
        StoreRouter::new(Box::new(MemoryStore::new()))
    }

    #[test]
    fn s1_linear_two_step_add() {
        let mut registry = FunctionRegistry::new();
        registry.register("add", add);

        let mut flow = Flow::new("s1");
        let a = flow
            .add_job(Job::new("a", "add").with_args(vec![Value::from(1i64), Value::from(2i64)]))
            .unwrap();
        let b = flow
            .add_job(Job::new("b", "add").with_args(vec![Value::Reference(OutputReference::new(a)), Value::from(10i64)]))
            .unwrap();

        let store = router();
        let report = Manager::new(&registry, &store, Config::default()).run(&flow).unwrap();

        match report.status(b) {
            Some(JobStatus::Done(response)) => assert_eq!(response.output, Value::from(13.0)),
            other => panic!("expected b to be done, got {other:?}"),
        }
    }

    #[test]
    fn s2_fan_in_sum_waits_for_all_three() {
        let mut registry = FunctionRegistry::new();
        registry.register("time_a", constant(0.1));
        registry.register("time_b", constant(0.2));
        registry.register("time_c", constant(0.3));
        registry.register("sum_numbers", sum_numbers);

        let mut flow = Flow::new("s2");
        let t1 = flow.add_job(Job::new("t1", "time_a")).unwrap();
        let t2 = flow.add_job(Job::new("t2", "time_b")).unwrap();
        let t3 = flow.add_job(Job::new("t3", "time_c")).unwrap();
        let sum = flow
            .add_job(Job::new("sum", "sum_numbers").with_args(vec![Value::Sequence(vec![
                Value::Reference(OutputReference::new(t1)),
                Value::Reference(OutputReference::new(t2)),
                Value::Reference(OutputReference::new(t3)),
            ])]))
            .unwrap();

        let store = router();
        let report = Manager::new(&registry, &store, Config::default()).run(&flow).unwrap();

        match report.status(sum) {
            Some(JobStatus::Done(response)) => {
                let total = response.output.as_f64().unwrap();
                assert!((total - 0.6).abs() < 1e-9);
            }
            other => panic!("expected sum to be done, got {other:?}"),
        }
    }

    #[test]
    fn s3_nested_reference_path_dereferences_into_output() {
        fn a_fn(_: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            Ok(Response::new(Value::mapping([(
                "x",
                Value::Sequence(vec![Value::from(10i64), Value::from(20i64), Value::from(30i64)]),
            )])))
        }
        fn double(args: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            Ok(Response::new(Value::from(args[0].as_i64().unwrap() * 2)))
        }

        let mut registry = FunctionRegistry::new();
        registry.register("a_fn", a_fn);
        registry.register("double", double);

        let mut flow = Flow::new("s3");
        let a = flow.add_job(Job::new("a", "a_fn")).unwrap();
        let b = flow
            .add_job(Job::new("b", "double").with_args(vec![Value::Reference(OutputReference::new(a).field("x").index(1))]))
            .unwrap();

        let store = router();
        let report = Manager::new(&registry, &store, Config::default()).run(&flow).unwrap();

        match report.status(b) {
            Some(JobStatus::Done(response)) => assert_eq!(response.output, Value::from(40i64)),
            other => panic!("expected b to be done, got {other:?}"),
        }
    }

    #[test]
    fn s4_self_replace_bumps_index_and_reruns_under_same_uuid() {
        fn first(_args: &[Value], kwargs: &BTreeMap<String, Value>) -> CallResult {
            let uuid = Uuid::parse_str(kwargs["self_uuid"].as_str().unwrap()).unwrap();
            let mut replacement = Job::new("a", "replacement");
            replacement.uuid = uuid;
            Ok(Response::new(Value::Null).with_replace(FlowChild::Job(replacement)))
        }
        fn replacement_fn(_: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            Ok(Response::new(Value::from(99i64)))
        }

        let mut registry = FunctionRegistry::new();
        registry.register("first", first);
        registry.register("replacement", replacement_fn);

        let job = Job::new("a", "first");
        let uuid = job.uuid;
        let job = job.with_kwarg("self_uuid", Value::from(uuid.to_string()));

        let mut flow = Flow::new("s4");
        flow.add_job(job).unwrap();

        let store = router();
        let report = Manager::new(&registry, &store, Config::default()).run(&flow).unwrap();

        match report.status(uuid) {
            Some(JobStatus::Done(response)) => assert_eq!(response.output, Value::from(99i64)),
            other => panic!("expected self-replace to settle at the replacement's output, got {other:?}"),
        }
        assert_eq!(report.index(uuid), Some(2));
    }

    #[test]
    fn s5_stop_children_cancels_downstream_without_running_it() {
        fn seven(_: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            Ok(Response::new(Value::from(7i64)).stopping_children())
        }
        fn never(_: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            panic!("downstream job must not run after stop_children");
        }

        let mut registry = FunctionRegistry::new();
        registry.register("seven", seven);
        registry.register("never", never);

        let mut flow = Flow::new("s5");
        let a = flow.add_job(Job::new("a", "seven")).unwrap();
        let b = flow
            .add_job(Job::new("b", "never").with_args(vec![Value::Reference(OutputReference::new(a))]))
            .unwrap();

        let store = router();
        let report = Manager::new(&registry, &store, Config::default()).run(&flow).unwrap();

        assert!(report.is_cancelled(b));
        let err = store.get_output(&OutputReference::new(b), &Load::All).unwrap_err();
        assert!(matches!(err, JobflowError::OutputNotFound { .. }));
    }

    #[test]
    fn s6_multi_store_routing_extracts_big_key_into_aux_store() {
        fn big(_: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            Ok(Response::new(Value::mapping([("big", Value::from("payload")), ("small", Value::from(1i64))])))
        }

        let mut registry = FunctionRegistry::new();
        registry.register("big", big);

        let mut flow = Flow::new("s6");
        let a = flow.add_job(Job::new("a", "big").with_store_names([("big", "blobs")])).unwrap();

        let store = StoreRouter::new(Box::new(MemoryStore::new())).with_store("blobs", Box::new(MemoryStore::new()));
        Manager::new(&registry, &store, Config::default()).run(&flow).unwrap();

        let reconstructed = store.get_output(&OutputReference::new(a), &Load::All).unwrap();
        assert_eq!(
            reconstructed,
            Value::mapping([("big", Value::from("payload")), ("small", Value::from(1i64))])
        );
    }

    #[test]
    fn detour_rewires_not_yet_run_downstream_references_to_its_own_output() {
        fn flagged(_: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            let inserted = Job::new("inserted", "inserted_fn");
            Ok(Response::new(Value::from(1i64)).with_detour(vec![FlowChild::Job(inserted)], InsertionPoint::AfterSelf))
        }
        fn inserted_fn(_: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            Ok(Response::new(Value::from(2i64)))
        }
        fn echo(args: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            Ok(Response::new(args[0].clone()))
        }

        let mut registry = FunctionRegistry::new();
        registry.register("flagged", flagged);
        registry.register("inserted_fn", inserted_fn);
        registry.register("echo", echo);

        let mut flow = Flow::new("detour");
        let a = flow.add_job(Job::new("a", "flagged")).unwrap();
        let b = flow
            .add_job(Job::new("b", "echo").with_args(vec![Value::Reference(OutputReference::new(a))]))
            .unwrap();

        let store = router();
        let report = Manager::new(&registry, &store, Config::default()).run(&flow).unwrap();

        assert_eq!(report.len(), 3, "the detoured job must also run to completion");
        match report.status(b) {
            Some(JobStatus::Done(response)) => {
                assert_eq!(response.output, Value::from(2i64), "b must echo the detour's output, not a's own")
            }
            other => panic!("expected b to be done, got {other:?}"),
        }
    }

    #[test]
    fn true_replace_rewires_downstream_references_to_the_new_uuid() {
        fn old(_: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            let replacement = Job::new("a2", "new_fn");
            Ok(Response::new(Value::from(1i64)).with_replace(FlowChild::Job(replacement)))
        }
        fn new_fn(_: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            Ok(Response::new(Value::from(42i64)))
        }
        fn echo(args: &[Value], _: &BTreeMap<String, Value>) -> CallResult {
            Ok(Response::new(args[0].clone()))
        }

        let mut registry = FunctionRegistry::new();
        registry.register("old", old);
        registry.register("new_fn", new_fn);
        registry.register("echo", echo);

        let mut flow = Flow::new("replace");
        let a = flow.add_job(Job::new("a", "old")).unwrap();
        let b = flow
            .add_job(Job::new("b", "echo").with_args(vec![Value::Reference(OutputReference::new(a))]))
            .unwrap();

        let store = router();
        let report = Manager::new(&registry, &store, Config::default()).run(&flow).unwrap();

        match report.status(b) {
            Some(JobStatus::Done(response)) => assert_eq!(response.output, Value::from(42i64)),
            other => panic!("expected b to echo the replacement's output, got {other:?}"),
        }
    }

    #[test]
    fn unknown_callable_is_a_per_job_failure_not_an_abort() {
        let registry = FunctionRegistry::new();

        let mut flow = Flow::new("unknown-callable");
        let a = flow.add_job(Job::new("a", "totally_unregistered")).unwrap();

        let store = router();
        let report = Manager::new(&registry, &store, Config::default()).run(&flow).unwrap();
        assert_eq!(report.len(), 1);
        assert!(report.failure(a).is_some());
    }

    #[test]
    fn bounded_parallelism_runs_independent_jobs_concurrently() {
        use std::num::NonZeroUsize;

        let mut registry = FunctionRegistry::new();
        registry.register("time_a", constant(0.1));
        registry.register("time_b", constant(0.2));

        let mut flow = Flow::new("bounded");
        let t1 = flow.add_job(Job::new("t1", "time_a")).unwrap();
        let t2 = flow.add_job(Job::new("t2", "time_b")).unwrap();

        let store = router();
        let config = Config::bounded(NonZeroUsize::new(2).unwrap());
        let report = Manager::new(&registry, &store, config).run(&flow).unwrap();

        assert!(report.is_done(t1));
        assert!(report.is_done(t2));
    }
}
