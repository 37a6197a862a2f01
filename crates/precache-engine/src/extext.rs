//! §4.3/§4.6 "extending-external methods": worklist methods inserted into a
//! method table that some external (non-worklist) module also contributes
//! definitions to. These need their own force-listed wire section because
//! ordinary worklist traversal, which walks modules' own bindings, would
//! otherwise never reach a method whose only link back to the worklist is
//! "lives in a table some external type-name owns".

use rustc_hash::FxHashSet;

use precache_host::{Host, MethodId, MethodTableId, ModuleId, TypeId};

pub fn compute_extending_external_methods<H: Host>(
    host: &H,
    worklist_modules: &FxHashSet<ModuleId>,
) -> Vec<(MethodId, Vec<TypeId>)> {
    let mut out = Vec::new();
    for idx in 0..host.method_table_count() {
        let table = MethodTableId(idx);
        let defs = &host.method_table(table).defs;
        for &m in defs {
            let def = host.method(m);
            if !worklist_modules.contains(&def.module) {
                continue;
            }
            let extends_external_table = defs
                .iter()
                .any(|&other| other != m && !worklist_modules.contains(&host.method(other).module));
            if extends_external_table {
                out.push((m, def.signature.clone()));
            }
        }
    }
    out
}
