//! Load-side half of the backref table (§4.2): "a vector of deserialized
//! objects indexed by position. When a `BACKREF` tag is read, the vector
//! is indexed directly." Paired with the flag-ref list (§4.6): positions
//! whose unique-ing bit was set on save, which the recaching pipeline
//! processes before anything else.
//!
//! Mirrors `SaveBackrefs`: a newly-introduced object's position is never
//! read off the stream as a number, it is simply the next sequential
//! slot — `reserve_next` must be called right before decoding a new
//! object's fields so a cycle back to this object (via an explicit
//! backref tag) resolves to the reserved, still-empty slot instead of
//! indexing out of bounds.

use precache_common::{CacheError, CacheResult};

use crate::decoded::DecodedObject;
use crate::position::Position;

#[derive(Default)]
pub struct LoadBackrefs {
    objects: Vec<Option<DecodedObject>>,
    /// Positions flagged during save as needing unique-ing on load (§4.2),
    /// consumed by recaching pass 1 and pass 3 (§4.6).
    flag_ref_list: Vec<Position>,
}

impl LoadBackrefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next sequential position for an object whose body is
    /// about to be decoded, before recursing into its fields.
    pub fn reserve_next(&mut self) -> Position {
        let pos = Position(self.objects.len() as u64);
        self.objects.push(None);
        pos
    }

    pub fn fill(&mut self, position: Position, object: DecodedObject) {
        self.objects[position.0 as usize] = Some(object);
    }

    pub fn mark_flagged(&mut self, position: Position) {
        self.flag_ref_list.push(position);
    }

    pub fn get(&self, position: Position) -> CacheResult<&DecodedObject> {
        self.objects
            .get(position.0 as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| CacheError::corrupt(format!("dangling backref to position {}", position.0)))
    }

    pub fn flag_ref_list(&self) -> &[Position] {
        &self.flag_ref_list
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoded::{DecodedMethodTable, DecodedObject};

    #[test]
    fn reserve_then_fill_round_trips() {
        let mut table = LoadBackrefs::new();
        let pos = table.reserve_next();
        assert!(table.get(pos).is_err());
        table.fill(
            pos,
            DecodedObject::MethodTable(DecodedMethodTable {
                defs: vec![],
                backedges: vec![],
            }),
        );
        assert!(table.get(pos).is_ok());
    }

    #[test]
    fn positions_are_assigned_sequentially() {
        let mut table = LoadBackrefs::new();
        assert_eq!(table.reserve_next(), Position(0));
        assert_eq!(table.reserve_next(), Position(1));
    }

    #[test]
    fn flagged_positions_are_recorded_in_order() {
        let mut table = LoadBackrefs::new();
        table.mark_flagged(Position(1));
        table.mark_flagged(Position(4));
        assert_eq!(table.flag_ref_list(), &[Position(1), Position(4)]);
    }
}
