//! §6 payload framing: `worklist, extext_methods, external_mi_count +
//! external_mis, edges, ext_targets, then the finalizer/reinit trailer`.
//!
//! `Encoder`/`Decoder` only expose tag-stream value encoding
//! (`encode_value`/`encode_object`, `decode_value`) — there is no raw-byte
//! escape hatch into the shared backref-numbered stream. Every count and
//! plain integer this module needs (section lengths, callee indices,
//! finalizer positions/action codes) therefore rides through the stream as
//! `Value::Int64`/`Value::UInt8` on the encode side, read back as the
//! matching `DecodedValue` variant on the decode side. The finalizer
//! trailer is the one exception: it is written after `Encoder::finish`
//! returns its byte buffer, as a plain length-prefixed footer, since by
//! then the shared backref numbering is no longer needed for it (finalizer
//! entries only ever reference positions already visited earlier in the
//! same stream).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashSet;

use precache_codec::{Decoder, DecodedValue, EncodeOptions, Encoder, FinalizerAction, LoadBackrefs, Position};
use precache_common::{CacheError, CacheResult};
use precache_edges::{CalleeTarget, EdgeGraph};
use precache_host::{Host, MethodId, MethodInstanceId, ModuleId, ObjectRef, TypeId, Value};

pub enum RawCalleeTarget {
    Concrete(Position),
    Abstract {
        table: Position,
        signature: Vec<Position>,
    },
}

pub struct RawExtTarget {
    pub target: RawCalleeTarget,
    pub match_set: Vec<Position>,
}

/// The decoded payload, still addressed by backref [`Position`] — the
/// materializer turns these into live host ids.
pub struct DecodedPayload {
    pub worklist: Vec<Position>,
    pub extext_methods: Vec<(Position, Vec<Position>)>,
    pub external_mis: Vec<Position>,
    pub edges: Vec<(Position, Vec<u32>)>,
    pub ext_targets: Vec<RawExtTarget>,
    pub finalizers: Vec<(Position, u8)>,
}

#[allow(clippy::type_complexity)]
pub fn encode_payload<H: Host>(
    host: &H,
    worklist: &[ModuleId],
    worklist_set: &FxHashSet<ModuleId>,
    extext_methods: &[(MethodId, Vec<TypeId>)],
    external_mis: &FxHashSet<MethodInstanceId>,
    edge_graph: &EdgeGraph,
    options: EncodeOptions,
) -> CacheResult<(Vec<u8>, Vec<ModuleId>)> {
    let mut encoder = Encoder::new(host, worklist_set, options);

    encoder.encode_value(&Value::Int64(worklist.len() as i64))?;
    for &m in worklist {
        encoder.encode_object(ObjectRef::Module(m))?;
    }

    encoder.encode_value(&Value::Int64(extext_methods.len() as i64))?;
    for (method, sig) in extext_methods {
        encoder.encode_object(ObjectRef::Method(*method))?;
        encoder.encode_value(&Value::Int64(sig.len() as i64))?;
        for &t in sig {
            encoder.encode_object(ObjectRef::Type(t))?;
        }
    }

    encoder.encode_value(&Value::Int64(external_mis.len() as i64))?;
    for &mi in external_mis {
        encoder.encode_object(ObjectRef::MethodInstance(mi))?;
    }

    encoder.encode_value(&Value::Int64(edge_graph.edges.len() as i64))?;
    for entry in &edge_graph.edges {
        encoder.encode_object(ObjectRef::MethodInstance(entry.caller))?;
        encoder.encode_value(&Value::Int64(entry.callees.len() as i64))?;
        for &c in &entry.callees {
            encoder.encode_value(&Value::Int64(c as i64))?;
        }
    }

    encoder.encode_value(&Value::Int64(edge_graph.ext_targets.len() as i64))?;
    for target in &edge_graph.ext_targets {
        match &target.target {
            CalleeTarget::Concrete(mi) => {
                encoder.encode_value(&Value::UInt8(0))?;
                encoder.encode_object(ObjectRef::MethodInstance(*mi))?;
            }
            CalleeTarget::Abstract { table, signature } => {
                encoder.encode_value(&Value::UInt8(1))?;
                encoder.encode_object(ObjectRef::MethodTable(*table))?;
                encoder.encode_value(&Value::Int64(signature.len() as i64))?;
                for &t in signature {
                    encoder.encode_object(ObjectRef::Type(t))?;
                }
            }
        }
        encoder.encode_value(&Value::Int64(target.match_set.len() as i64))?;
        for &mi in &target.match_set {
            encoder.encode_object(ObjectRef::MethodInstance(mi))?;
        }
    }

    let external_top_level_modules = encoder.external_top_level_modules().to_vec();
    let (mut bytes, finalizers) = encoder.finish();

    let mut trailer = Vec::new();
    trailer.write_u32::<LittleEndian>(finalizers.entries().len() as u32)?;
    for entry in finalizers.entries() {
        trailer.write_u64::<LittleEndian>(entry.position.0)?;
        trailer.write_u8(entry.action.code())?;
    }
    bytes.extend_from_slice(&trailer);
    bytes.write_u64::<LittleEndian>(trailer.len() as u64)?;

    Ok((bytes, external_top_level_modules))
}

fn split_trailer(payload: &[u8]) -> CacheResult<(&[u8], &[u8])> {
    if payload.len() < 8 {
        return Err(CacheError::corrupt(
            "payload shorter than the trailer length footer",
        ));
    }
    let footer_at = payload.len() - 8;
    let trailer_len = (&payload[footer_at..]).read_u64::<LittleEndian>()? as usize;
    if trailer_len > footer_at {
        return Err(CacheError::corrupt("finalizer trailer length out of range"));
    }
    let tag_stream_end = footer_at - trailer_len;
    Ok((&payload[..tag_stream_end], &payload[tag_stream_end..footer_at]))
}

fn decode_finalizer_trailer(mut trailer: &[u8]) -> CacheResult<Vec<(Position, u8)>> {
    let count = trailer.read_u32::<LittleEndian>()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let position = Position(trailer.read_u64::<LittleEndian>()?);
        let action = trailer.read_u8()?;
        if FinalizerAction::from_code(action).is_none() {
            return Err(CacheError::corrupt(format!(
                "unrecognized finalizer action code {action}"
            )));
        }
        out.push((position, action));
    }
    Ok(out)
}

fn expect_count(v: DecodedValue) -> CacheResult<usize> {
    match v {
        DecodedValue::Int64(n) if n >= 0 => Ok(n as usize),
        other => Err(CacheError::corrupt(format!(
            "expected a section count, found {other:?}"
        ))),
    }
}

fn expect_u32(v: DecodedValue) -> CacheResult<u32> {
    match v {
        DecodedValue::Int64(n) if n >= 0 && n <= u32::MAX as i64 => Ok(n as u32),
        other => Err(CacheError::corrupt(format!(
            "expected a callee index, found {other:?}"
        ))),
    }
}

fn expect_u8_tag(v: DecodedValue) -> CacheResult<u8> {
    match v {
        DecodedValue::UInt8(b) => Ok(b),
        other => Err(CacheError::corrupt(format!(
            "expected a discriminant byte, found {other:?}"
        ))),
    }
}

fn expect_position(v: DecodedValue) -> CacheResult<Position> {
    match v {
        DecodedValue::Object(p) => Ok(p),
        other => Err(CacheError::corrupt(format!(
            "expected an object reference, found {other:?}"
        ))),
    }
}

pub fn decode_payload(payload: &[u8]) -> CacheResult<(DecodedPayload, LoadBackrefs)> {
    let (tag_stream, trailer) = split_trailer(payload)?;
    let finalizers = decode_finalizer_trailer(trailer)?;

    let mut decoder = Decoder::new(tag_stream);

    let worklist_count = expect_count(decoder.decode_value()?)?;
    let mut worklist = Vec::with_capacity(worklist_count);
    for _ in 0..worklist_count {
        worklist.push(expect_position(decoder.decode_value()?)?);
    }

    let extext_count = expect_count(decoder.decode_value()?)?;
    let mut extext_methods = Vec::with_capacity(extext_count);
    for _ in 0..extext_count {
        let method = expect_position(decoder.decode_value()?)?;
        let sig_len = expect_count(decoder.decode_value()?)?;
        let mut sig = Vec::with_capacity(sig_len);
        for _ in 0..sig_len {
            sig.push(expect_position(decoder.decode_value()?)?);
        }
        extext_methods.push((method, sig));
    }

    let external_mi_count = expect_count(decoder.decode_value()?)?;
    let mut external_mis = Vec::with_capacity(external_mi_count);
    for _ in 0..external_mi_count {
        external_mis.push(expect_position(decoder.decode_value()?)?);
    }

    let edges_count = expect_count(decoder.decode_value()?)?;
    let mut edges = Vec::with_capacity(edges_count);
    for _ in 0..edges_count {
        let caller = expect_position(decoder.decode_value()?)?;
        let callee_len = expect_count(decoder.decode_value()?)?;
        let mut callees = Vec::with_capacity(callee_len);
        for _ in 0..callee_len {
            callees.push(expect_u32(decoder.decode_value()?)?);
        }
        edges.push((caller, callees));
    }

    let ext_targets_count = expect_count(decoder.decode_value()?)?;
    let mut ext_targets = Vec::with_capacity(ext_targets_count);
    for _ in 0..ext_targets_count {
        let kind = expect_u8_tag(decoder.decode_value()?)?;
        let target = if kind == 0 {
            RawCalleeTarget::Concrete(expect_position(decoder.decode_value()?)?)
        } else {
            let table = expect_position(decoder.decode_value()?)?;
            let sig_len = expect_count(decoder.decode_value()?)?;
            let mut signature = Vec::with_capacity(sig_len);
            for _ in 0..sig_len {
                signature.push(expect_position(decoder.decode_value()?)?);
            }
            RawCalleeTarget::Abstract { table, signature }
        };
        let match_len = expect_count(decoder.decode_value()?)?;
        let mut match_set = Vec::with_capacity(match_len);
        for _ in 0..match_len {
            match_set.push(expect_position(decoder.decode_value()?)?);
        }
        ext_targets.push(RawExtTarget { target, match_set });
    }

    let backrefs = decoder.into_backrefs();
    Ok((
        DecodedPayload {
            worklist,
            extext_methods,
            external_mis,
            edges,
            ext_targets,
            finalizers,
        },
        backrefs,
    ))
}
