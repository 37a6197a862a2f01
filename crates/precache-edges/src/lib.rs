//! Edge collector (§4.4): builds the forward edge map the save side needs
//! by inverting the runtime's natural back-edge graph, and decides which
//! newly-inferred external method instances are worth queuing.

use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxHashMap, FxHashSet};

use precache_host::{Host, MethodInstanceId, MethodTableId, ModuleId, Relocatability, TypeId};

/// One distinct dispatch target reachable from the worklist: either a
/// concrete method instance, or an abstract entry recorded against a
/// method table's back-edge list (§4.4 "the callee side is either a
/// method instance or, for abstract dispatch, a signature").
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum CalleeTarget {
    Concrete(MethodInstanceId),
    Abstract {
        table: MethodTableId,
        signature: Vec<TypeId>,
    },
}

/// One entry of the `ext_targets` array: a callee plus its current
/// match-set, recomputed fresh on every save (§4.4).
#[derive(Clone, Debug)]
pub struct ExtTarget {
    pub target: CalleeTarget,
    pub match_set: Vec<MethodInstanceId>,
}

/// A caller and the indices of its direct callees into `ext_targets`.
#[derive(Clone, Debug)]
pub struct EdgeEntry {
    pub caller: MethodInstanceId,
    pub callees: Vec<u32>,
}

/// The two arrays §4.4 describes: `edges` and `ext_targets`.
#[derive(Clone, Debug, Default)]
pub struct EdgeGraph {
    pub edges: Vec<EdgeEntry>,
    pub ext_targets: Vec<ExtTarget>,
}

pub struct EdgeCollector<'a, H: Host> {
    host: &'a H,
    worklist_modules: &'a FxHashSet<ModuleId>,
    /// Method instances queued by `queue_newly_inferred`, which also count
    /// as qualifying callers even though they live outside the worklist
    /// (§4.4 "restricted to callers in the worklist or queued-external-MI
    /// set").
    queued_external: &'a FxHashSet<MethodInstanceId>,
}

impl<'a, H: Host> EdgeCollector<'a, H> {
    pub fn new(
        host: &'a H,
        worklist_modules: &'a FxHashSet<ModuleId>,
        queued_external: &'a FxHashSet<MethodInstanceId>,
    ) -> Self {
        Self {
            host,
            worklist_modules,
            queued_external,
        }
    }

    fn method_instance_is_internal(&self, id: MethodInstanceId) -> bool {
        match self.host.method_instance(id).method {
            Some(m) => self.worklist_modules.contains(&self.host.method(m).module),
            None => true,
        }
    }

    fn is_qualifying_caller(&self, id: MethodInstanceId) -> bool {
        self.method_instance_is_internal(id) || self.queued_external.contains(&id)
    }

    fn target_signature(&self, target: &CalleeTarget) -> Vec<TypeId> {
        match target {
            CalleeTarget::Concrete(mi) => self.host.method_instance(*mi).spec_types.clone(),
            CalleeTarget::Abstract { signature, .. } => signature.clone(),
        }
    }

    /// Builds the forward edge map for the current `world` (§4.4).
    pub fn collect(&self, world: u64) -> EdgeGraph {
        let mut direct: IndexMap<MethodInstanceId, Vec<CalleeTarget>> = IndexMap::new();

        for idx in 0..self.host.method_instance_count() {
            let callee = MethodInstanceId(idx);
            for &caller in &self.host.method_instance(callee).backedges {
                if self.is_qualifying_caller(caller) {
                    let targets = direct.entry(caller).or_default();
                    let target = CalleeTarget::Concrete(callee);
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
        }

        for idx in 0..self.host.method_table_count() {
            let table = MethodTableId(idx);
            for (signature, caller) in &self.host.method_table(table).backedges {
                if self.is_qualifying_caller(*caller) {
                    let targets = direct.entry(*caller).or_default();
                    let target = CalleeTarget::Abstract {
                        table,
                        signature: signature.clone(),
                    };
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
        }

        // Walk the callee list transitively from every qualifying caller,
        // gathering the full reachable target set (§4.4) so a target that
        // is itself a further caller gets its own callees indexed too.
        let mut reachable: IndexSet<CalleeTarget> = IndexSet::new();
        let mut frontier: Vec<MethodInstanceId> = direct.keys().copied().collect();
        let mut seen_callers: FxHashSet<MethodInstanceId> = frontier.iter().copied().collect();
        while let Some(caller) = frontier.pop() {
            let Some(targets) = direct.get(&caller) else {
                continue;
            };
            for target in targets {
                reachable.insert(target.clone());
                if let CalleeTarget::Concrete(mi) = target {
                    if direct.contains_key(mi) && seen_callers.insert(*mi) {
                        frontier.push(*mi);
                    }
                }
            }
        }

        let mut index_of: FxHashMap<CalleeTarget, u32> = FxHashMap::default();
        let mut ext_targets = Vec::with_capacity(reachable.len());
        for target in &reachable {
            let signature = self.target_signature(target);
            let match_set = self.host.method_match(&signature, world);
            index_of.insert(target.clone(), ext_targets.len() as u32);
            ext_targets.push(ExtTarget {
                target: target.clone(),
                match_set,
            });
        }

        let mut edges = Vec::with_capacity(direct.len());
        for (caller, targets) in &direct {
            if targets.is_empty() {
                continue;
            }
            let callees = targets
                .iter()
                .map(|t| *index_of.get(t).expect("target indexed above"))
                .collect();
            edges.push(EdgeEntry {
                caller: *caller,
                callees,
            });
        }

        EdgeGraph { edges, ext_targets }
    }
}

/// Whether `mi` has at least one code instance marked relocatable,
/// anywhere in its code-instance chain (§4.4 "have at least one
/// relocatable code instance").
fn has_relocatable_code_instance(host: &impl Host, mi: MethodInstanceId) -> bool {
    let mut current = host.method_instance(mi).code;
    while let Some(id) = current {
        let def = host.code_instance(id);
        if matches!(def.relocatability, Relocatability::Relocatable) {
            return true;
        }
        current = def.next;
    }
    false
}

/// Whether `mi` transitively back-edges into a worklist module: following
/// `backedges` (callers, then callers-of-callers, ...) eventually reaches
/// a method instance whose defining method lives in `worklist_modules`
/// (§4.4 "transitively back-edge into a worklist module").
fn backedges_into_worklist(
    host: &impl Host,
    worklist_modules: &FxHashSet<ModuleId>,
    mi: MethodInstanceId,
) -> bool {
    let mut visited: FxHashSet<MethodInstanceId> = FxHashSet::default();
    let mut stack = vec![mi];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let def = host.method_instance(id);
        for &caller in &def.backedges {
            let is_worklist = match host.method_instance(caller).method {
                Some(m) => worklist_modules.contains(&host.method(m).module),
                None => false,
            };
            if is_worklist {
                return true;
            }
            stack.push(caller);
        }
    }
    false
}

/// Queues newly-inferred external method instances into the
/// external-MI set: only those that transitively back-edge into the
/// worklist and carry at least one relocatable code instance qualify
/// (§4.4, last paragraph).
pub fn queue_newly_inferred(
    host: &impl Host,
    worklist_modules: &FxHashSet<ModuleId>,
    newly_inferred: &[MethodInstanceId],
) -> FxHashSet<MethodInstanceId> {
    newly_inferred
        .iter()
        .copied()
        .filter(|&mi| {
            backedges_into_worklist(host, worklist_modules, mi)
                && has_relocatable_code_instance(host, mi)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use precache_host::{
        CodeInstanceDef, MethodDef, MethodFlags, MethodInstanceDef, ModuleDef, SimRuntime,
    };
    use precache_common::intern;

    fn fresh_module(host: &mut SimRuntime, name: &str, uuid: u64) -> ModuleId {
        let sym = intern(name);
        host.insert_module(ModuleDef::new(sym, None, (uuid, 0), 1))
    }

    fn fresh_method(host: &mut SimRuntime, module: ModuleId, table: MethodTableId) -> precache_host::MethodId {
        host.insert_method(MethodDef {
            module,
            owner_table: table,
            name: intern("f"),
            signature: vec![],
            specializations: vec![],
            roots: vec![],
            file: intern("f.rs"),
            line: 1,
            nargs: 0,
            flags: MethodFlags::empty(),
        })
    }

    fn fresh_instance(
        host: &mut SimRuntime,
        method: Option<precache_host::MethodId>,
        backedges: Vec<MethodInstanceId>,
    ) -> MethodInstanceId {
        host.insert_method_instance(MethodInstanceDef {
            method,
            spec_types: vec![],
            sparam_values: vec![],
            backedges,
            code: None,
        })
    }

    #[test]
    fn direct_internal_caller_of_external_callee_is_collected() {
        let mut host = SimRuntime::new(1);
        let internal_mod = fresh_module(&mut host, "Internal", 1);
        let external_mod = fresh_module(&mut host, "External", 2);
        let table = host.insert_method_table(Default::default());
        let internal_method = fresh_method(&mut host, internal_mod, table);
        let external_method = fresh_method(&mut host, external_mod, table);

        let caller = fresh_instance(&mut host, Some(internal_method), vec![]);
        let callee = fresh_instance(&mut host, Some(external_method), vec![caller]);

        let mut worklist = FxHashSet::default();
        worklist.insert(internal_mod);
        let queued = FxHashSet::default();

        let collector = EdgeCollector::new(&host, &worklist, &queued);
        let graph = collector.collect(1);

        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].caller, caller);
        assert_eq!(graph.edges[0].callees.len(), 1);
        let idx = graph.edges[0].callees[0];
        assert_eq!(graph.ext_targets[idx as usize].target, CalleeTarget::Concrete(callee));
    }

    #[test]
    fn external_caller_outside_queued_set_is_excluded() {
        let mut host = SimRuntime::new(1);
        let internal_mod = fresh_module(&mut host, "Internal", 1);
        let external_mod = fresh_module(&mut host, "External", 2);
        let table = host.insert_method_table(Default::default());
        let internal_method = fresh_method(&mut host, internal_mod, table);
        let external_method = fresh_method(&mut host, external_mod, table);

        let caller = fresh_instance(&mut host, Some(external_method), vec![]);
        let _callee = fresh_instance(&mut host, Some(internal_method), vec![caller]);

        let mut worklist = FxHashSet::default();
        worklist.insert(internal_mod);
        let queued = FxHashSet::default();

        let collector = EdgeCollector::new(&host, &worklist, &queued);
        let graph = collector.collect(1);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn queued_external_caller_is_included() {
        let mut host = SimRuntime::new(1);
        let internal_mod = fresh_module(&mut host, "Internal", 1);
        let external_mod = fresh_module(&mut host, "External", 2);
        let table = host.insert_method_table(Default::default());
        let internal_method = fresh_method(&mut host, internal_mod, table);
        let external_method = fresh_method(&mut host, external_mod, table);

        let caller = fresh_instance(&mut host, Some(external_method), vec![]);
        let callee = fresh_instance(&mut host, Some(internal_method), vec![caller]);

        let mut worklist = FxHashSet::default();
        worklist.insert(internal_mod);
        let mut queued = FxHashSet::default();
        queued.insert(caller);

        let collector = EdgeCollector::new(&host, &worklist, &queued);
        let graph = collector.collect(1);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].caller, caller);
        let idx = graph.edges[0].callees[0];
        assert_eq!(graph.ext_targets[idx as usize].target, CalleeTarget::Concrete(callee));
    }

    #[test]
    fn newly_inferred_without_worklist_backedge_is_not_queued() {
        let mut host = SimRuntime::new(1);
        let isolated_mod = fresh_module(&mut host, "Isolated", 3);
        let table = host.insert_method_table(Default::default());
        let method = fresh_method(&mut host, isolated_mod, table);
        let mi = fresh_instance(&mut host, Some(method), vec![]);
        let code = host.insert_code_instance(CodeInstanceDef {
            def: mi,
            min_world: 1,
            max_world: precache_host::WORLD_INFINITY,
            inferred: None,
            rettype: TypeId(0),
            relocatability: Relocatability::Relocatable,
            validate: false,
            cacheable: true,
            next: None,
        });
        host.method_instance_mut(mi).code = Some(code);

        let worklist = FxHashSet::default();
        let queued = queue_newly_inferred(&host, &worklist, &[mi]);
        assert!(queued.is_empty());
    }

    #[test]
    fn newly_inferred_with_worklist_backedge_and_relocatable_code_is_queued() {
        let mut host = SimRuntime::new(1);
        let internal_mod = fresh_module(&mut host, "Internal", 1);
        let external_mod = fresh_module(&mut host, "External", 2);
        let table = host.insert_method_table(Default::default());
        let internal_method = fresh_method(&mut host, internal_mod, table);
        let external_method = fresh_method(&mut host, external_mod, table);

        let internal_caller = fresh_instance(&mut host, Some(internal_method), vec![]);
        let mi = fresh_instance(&mut host, Some(external_method), vec![internal_caller]);
        let code = host.insert_code_instance(CodeInstanceDef {
            def: mi,
            min_world: 1,
            max_world: precache_host::WORLD_INFINITY,
            inferred: None,
            rettype: TypeId(0),
            relocatability: Relocatability::Relocatable,
            validate: false,
            cacheable: true,
            next: None,
        });
        host.method_instance_mut(mi).code = Some(code);

        let mut worklist = FxHashSet::default();
        worklist.insert(internal_mod);
        let queued = queue_newly_inferred(&host, &worklist, &[mi]);
        assert!(queued.contains(&mi));
    }
}
