//! §6 public operations, composing the GC-disable guard, the reentrancy
//! guard, the payload framing, the materializer, and the §4.6/§4.7
//! pipeline passes into `save_incremental`/`restore_incremental`/
//! `restore_incremental_from_buffer`/`set_newly_inferred`/
//! `init_restored_modules`/`read_verify_header`.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashSet;

use precache_codec::EncodeOptions;
use precache_common::{CacheError, CacheResult};
use precache_edges::{queue_newly_inferred, CalleeTarget, EdgeCollector, ExtTarget};
use precache_host::{GcDisableGuard, Host, MethodInstanceId, ModuleId};

use crate::extext::compute_extending_external_methods;
use crate::materialize::Materializer;
use crate::payload::{decode_payload, encode_payload, RawCalleeTarget};
use crate::pipeline;
use crate::reentrancy::ReentrancyGuard;
use crate::report::{PlatformBanner, RestoreReport};

pub struct CacheEngine {
    reentrancy: ReentrancyGuard,
    newly_inferred: Vec<MethodInstanceId>,
}

impl Default for CacheEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheEngine {
    pub fn new() -> Self {
        Self {
            reentrancy: ReentrancyGuard::new(),
            newly_inferred: Vec::new(),
        }
    }

    /// §6 `set_newly_inferred`: the list of method instances compiled
    /// during this session, candidates for the `external_mis` section the
    /// next `save_incremental` writes.
    pub fn set_newly_inferred(&mut self, list: Vec<MethodInstanceId>) {
        self.newly_inferred = list;
    }

    /// §6 `save_incremental`.
    pub fn save_incremental<H: Host>(
        &mut self,
        host: &H,
        worklist: &[ModuleId],
        identity: &PlatformBanner,
        out_path: &Path,
    ) -> CacheResult<()> {
        let _gc = GcDisableGuard::acquire(host.gc());
        let _token = self.reentrancy.acquire()?;

        let world = host.world().current();
        let worklist_set: FxHashSet<ModuleId> = worklist.iter().copied().collect();

        let extext_methods = compute_extending_external_methods(host, &worklist_set);
        let external_mis = queue_newly_inferred(host, &worklist_set, &self.newly_inferred);
        let edge_graph = EdgeCollector::new(host, &worklist_set, &external_mis).collect(world);

        let (payload, external_top_level_modules) = encode_payload(
            host,
            worklist,
            &worklist_set,
            &extext_methods,
            &external_mis,
            &edge_graph,
            EncodeOptions::default(),
        )?;

        let work_list = worklist
            .iter()
            .map(|&m| manifest_entry(host, m))
            .collect::<Vec<_>>();
        let mod_list = external_top_level_modules
            .iter()
            .map(|&m| manifest_entry(host, m))
            .collect::<Vec<_>>();

        let dependencies = precache_format::DependencyBlock {
            entries: Vec::new(),
            preferences: Vec::new(),
            preferences_hash: host.preferences_hash(),
        };
        let srctext: Vec<precache_format::SrcTextEntry> = Vec::new();

        let header = precache_format::CacheHeader::for_current_process(identity.clone());
        let bytes = precache_format::write_cache_file(
            &header,
            &work_list,
            &dependencies,
            &mod_list,
            &payload,
            &srctext,
        )?;

        fs::write(out_path, bytes)?;
        tracing::debug!(modules = worklist.len(), path = %out_path.display(), "saved incremental cache");
        Ok(())
    }

    /// §6 `restore_incremental`: reads the cache file at `path` and
    /// restores it into `host`.
    pub fn restore_incremental<H: Host>(
        &mut self,
        host: &mut H,
        path: &Path,
        identity: &PlatformBanner,
    ) -> CacheResult<RestoreReport> {
        let bytes = fs::read(path)?;
        self.restore_incremental_from_buffer(host, &bytes, identity)
    }

    /// §6 `restore_incremental_from_buffer`.
    pub fn restore_incremental_from_buffer<H: Host>(
        &mut self,
        host: &mut H,
        bytes: &[u8],
        identity: &PlatformBanner,
    ) -> CacheResult<RestoreReport> {
        let _gc = GcDisableGuard::acquire(host.gc());
        let _token = self.reentrancy.acquire()?;

        let artifact = precache_format::read_cache_file(bytes)?;

        if artifact.header.format_version != precache_common::limits::FORMAT_VERSION
            || artifact.header.byte_order_mark != precache_common::limits::BYTE_ORDER_MARK
            || &artifact.header.identity != identity
        {
            tracing::error!("cache header is incompatible with the running process");
            return Err(CacheError::header(
                "cache header does not match the running process's identity",
            ));
        }

        for entry in &artifact.mod_list {
            match host.find_module(entry.uuid) {
                Some(id) if host.module(id).build_id == entry.build_id => {}
                Some(_) => {
                    tracing::error!(module = %entry.name, "module build-id drift");
                    return Err(CacheError::manifest(format!(
                        "module {} has a different build id than the one this cache was saved against",
                        entry.name
                    )));
                }
                None => {
                    tracing::error!(module = %entry.name, "module not loaded");
                    return Err(CacheError::manifest(format!(
                        "module {} is required by this cache but is not loaded",
                        entry.name
                    )));
                }
            }
        }

        let world = host.world().reserve_fresh();
        let (decoded, backrefs) = decode_payload(&artifact.payload)?;

        let mut materializer = Materializer::new(host, &backrefs, world);

        for pos in &decoded.worklist {
            materializer.resolve_module_ref(*pos)?;
        }
        for (method_pos, _sig_positions) in &decoded.extext_methods {
            materializer.resolve_method_ref(*method_pos)?;
        }
        for pos in &decoded.external_mis {
            materializer.resolve_method_instance_ref(*pos)?;
        }

        let mut edges: Vec<(MethodInstanceId, Vec<u32>)> = Vec::with_capacity(decoded.edges.len());
        for (caller_pos, callees) in &decoded.edges {
            let caller = materializer.resolve_method_instance_ref(*caller_pos)?;
            edges.push((caller, callees.clone()));
        }

        let mut ext_targets: Vec<ExtTarget> = Vec::with_capacity(decoded.ext_targets.len());
        for raw in &decoded.ext_targets {
            let target = match &raw.target {
                RawCalleeTarget::Concrete(pos) => {
                    CalleeTarget::Concrete(materializer.resolve_method_instance_ref(*pos)?)
                }
                RawCalleeTarget::Abstract { table, signature } => {
                    let table = materializer.resolve_method_table_ref(*table)?;
                    let mut sig = Vec::with_capacity(signature.len());
                    for t in signature {
                        sig.push(materializer.resolve_type_ref(*t)?);
                    }
                    CalleeTarget::Abstract { table, signature: sig }
                }
            };
            let mut match_set = Vec::with_capacity(raw.match_set.len());
            for pos in &raw.match_set {
                match_set.push(materializer.resolve_method_instance_ref(*pos)?);
            }
            ext_targets.push(ExtTarget { target, match_set });
        }

        let queued_roots = materializer.take_queued_roots();
        let external_queued = materializer.take_external_queued();
        let validate_flagged = materializer.take_validate_flagged();
        let resolved = materializer.resolved().clone();
        let restored_modules = materializer.take_restored_modules();
        drop(materializer);

        pipeline::copy_queued_roots(host, queued_roots);
        pipeline::reconcile_external_queue(host, external_queued, world);
        let valid = pipeline::verify_external_edges(host, &ext_targets, world);
        pipeline::restore_backedges(host, &edges, &ext_targets, &valid);
        pipeline::promote_validated(host, validate_flagged);
        pipeline::replay_finalizers(host, &decoded.finalizers, &resolved);

        tracing::debug!(modules = restored_modules.len(), "restored incremental cache");
        Ok(RestoreReport {
            restored_modules: restored_modules.clone(),
            init_order: restored_modules,
        })
    }

    /// §6 `init_restored_modules`: drives `__init__` hooks in the order
    /// `restore_incremental` returned. Running user `__init__` code is out
    /// of scope for this workspace's simulated host; this records the
    /// order it would run in.
    pub fn init_restored_modules<H: Host>(&self, host: &H, init_order: &[ModuleId]) {
        for &module in init_order {
            let name = host.module(module).name;
            tracing::debug!(%name, "would run __init__ for module");
        }
    }

    /// §6 `read_verify_header`: true only if `bytes`' header matches
    /// `identity` exactly; never errors except on a truncated/corrupt
    /// stream.
    pub fn read_verify_header(bytes: &[u8], identity: &PlatformBanner) -> CacheResult<bool> {
        precache_format::verify_header_only(bytes, identity)
    }
}

fn manifest_entry<H: Host>(host: &H, module: ModuleId) -> precache_format::ModuleManifestEntry {
    let def = host.module(module);
    precache_format::ModuleManifestEntry {
        name: def.name.as_str().to_string(),
        uuid: def.uuid,
        build_id: def.build_id,
    }
}
