//! §4.6 passes 2 and 4 through 8, run after the materializer has walked the
//! worklist and force-visited `extext_methods`/`external_mis` (passes 1 and
//! 3 are absorbed into the materializer's memoized resolution itself — see
//! its module doc comment). Each pass here is a small, separately testable
//! function over already-materialized host ids.

use rustc_hash::FxHashMap;

use precache_codec::{FinalizerAction, Position};
use precache_common::Symbol;
use precache_edges::{CalleeTarget, ExtTarget};
use precache_host::{
    Binding, BindingFlags, CodeInstanceId, Host, MethodInstanceId, ObjectRef, WORLD_INFINITY,
};

/// §4.6 step 4: append each worklist method's queued new roots, already
/// translated through the uniquing table by the materializer.
pub fn copy_queued_roots<H: Host>(
    host: &mut H,
    queued_roots: Vec<(precache_host::MethodId, Symbol, Vec<ObjectRef>)>,
) {
    for (method, worklist_key, roots) in queued_roots {
        tracing::debug!(?worklist_key, root_count = roots.len(), "copying queued method roots");
        host.method_mut(method).roots.extend(roots);
    }
}

/// §4.6 step 5: an externally queued method instance that no longer
/// dispatches to the same method in the current world has its own code
/// detached, and that invalidation propagates to its back-edge callers.
pub fn reconcile_external_queue<H: Host>(host: &mut H, external_queued: Vec<MethodInstanceId>, world: u64) {
    for mi in external_queued {
        let spec_types = host.method_instance(mi).spec_types.clone();
        let matched = host.method_match(&spec_types, world);
        if matched.contains(&mi) {
            continue;
        }
        tracing::warn!(?mi, "externally queued method instance no longer matches dispatch; invalidating");
        host.method_instance_mut(mi).code = None;
        let callers = host.method_instance(mi).backedges.clone();
        for caller in callers {
            host.method_instance_mut(caller).code = None;
        }
    }
}

/// §4.6 step 6: recompute each callee's match-set in the current world and
/// compare against what was cached at save time. Returns a validity bit
/// per `ext_targets` entry, parallel to the input slice.
pub fn verify_external_edges<H: Host>(host: &H, ext_targets: &[ExtTarget], world: u64) -> Vec<bool> {
    ext_targets
        .iter()
        .map(|target| {
            let signature: Vec<_> = match &target.target {
                CalleeTarget::Concrete(mi) => host.method_instance(*mi).spec_types.clone(),
                CalleeTarget::Abstract { signature, .. } => signature.clone(),
            };
            let mut fresh = host.method_match(&signature, world);
            let mut cached = target.match_set.clone();
            fresh.sort();
            cached.sort();
            let valid = fresh == cached;
            if !valid {
                tracing::warn!(callee = ?target.target, "external edge match-set diverged; invalidating callee");
            }
            valid
        })
        .collect()
}

/// §4.6 step 7: for every caller whose callees all verified, add the
/// back-edges and promote the whole code-instance chain to `max_world =
/// ∞`. A caller with even one invalid callee is left untouched.
pub fn restore_backedges<H: Host>(
    host: &mut H,
    edges: &[(MethodInstanceId, Vec<u32>)],
    ext_targets: &[ExtTarget],
    valid: &[bool],
) {
    for (caller, callee_indices) in edges {
        let all_valid = callee_indices.iter().all(|&i| valid.get(i as usize).copied().unwrap_or(false));
        if !all_valid {
            continue;
        }
        for &idx in callee_indices {
            match &ext_targets[idx as usize].target {
                CalleeTarget::Concrete(callee) => {
                    let backedges = &mut host.method_instance_mut(*callee).backedges;
                    if !backedges.contains(caller) {
                        backedges.push(*caller);
                    }
                }
                CalleeTarget::Abstract { table, signature } => {
                    let backedges = &mut host.method_table_mut(*table).backedges;
                    if !backedges.iter().any(|(sig, c)| sig == signature && c == caller) {
                        backedges.push((signature.clone(), *caller));
                    }
                }
            }
        }
        let mut chain = host.method_instance(*caller).code;
        while let Some(code) = chain {
            host.code_instance_mut(code).max_world = WORLD_INFINITY;
            chain = host.code_instance(code).next;
        }
    }
}

/// §4.6 step 8: any code instance deserialized with `validate` set and not
/// already detached is promoted to `max_world = ∞`.
pub fn promote_validated<H: Host>(host: &mut H, validate_flagged: Vec<CodeInstanceId>) {
    for id in validate_flagged {
        host.code_instance_mut(id).max_world = WORLD_INFINITY;
    }
}

/// §4.5 reinit list replay: failures are caught, logged, and do not abort
/// the load. Only `ReinsertSubmoduleBinding` has any effect in this
/// workspace's simulated host — the other two actions concern identity-hash
/// dictionaries and method-table rehashing this host doesn't model.
pub fn replay_finalizers<H: Host>(
    host: &mut H,
    finalizers: &[(Position, u8)],
    resolved: &FxHashMap<Position, ObjectRef>,
) {
    for &(position, action_code) in finalizers {
        let Some(action) = FinalizerAction::from_code(action_code) else {
            tracing::warn!(action_code, "unrecognized finalizer action; skipping");
            continue;
        };
        match action {
            FinalizerAction::ReinsertSubmoduleBinding => {
                let Some(&ObjectRef::Module(child)) = resolved.get(&position) else {
                    tracing::warn!(?position, "reinit: submodule position did not resolve to a module; skipping");
                    continue;
                };
                let Some(parent) = host.module(child).parent else {
                    continue;
                };
                let name = host.module(child).name;
                host.module_mut(parent).set_binding(Binding {
                    name,
                    value: Some(ObjectRef::Module(child)),
                    owner: parent,
                    flags: BindingFlags::CONSTANT,
                    ty: None,
                });
            }
            FinalizerAction::RehashIdentityDict | FinalizerAction::RehashMethodTable => {
                tracing::debug!(?action, "reinit action has no effect in this simulated host");
            }
        }
    }
}
