//! Save-side half of the backref table (§4.2). Keys on `ObjectRef` since
//! the save side already has canonical, de-duplicated ids from the host —
//! no structural hashing is needed here, unlike the load side.
//!
//! A new object's position is never written to the stream as a number:
//! the encoder and decoder both walk objects in the same order, so
//! "first object encountered" implicitly gets position 0. Only an actual
//! `SHORT_BACKREF`/`BACKREF` occurrence carries an explicit position
//! (§4.2: "the serializer either (a) writes a back-reference tag with
//! the object's existing position ... or (b) assigns the next position
//! and writes the object body" — (b) never mentions writing the position
//! itself). `precache-engine` encodes the top worklist module first, so
//! it is always the object that lands on position 0.

use precache_host::ObjectRef;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::position::Position;

#[derive(Default)]
pub struct SaveBackrefs {
    positions: FxHashMap<ObjectRef, Position>,
    /// Objects whose body has already been written.
    written: FxHashSet<ObjectRef>,
    next: u64,
}

impl SaveBackrefs {
    pub fn new() -> Self {
        Self {
            positions: FxHashMap::default(),
            written: FxHashSet::default(),
            next: 0,
        }
    }

    /// Returns the object's position, assigning the next one if it has
    /// none yet. The `bool` is `true` the first time this object's body
    /// is requested — the caller must encode the body exactly once, on
    /// that call, and a plain backref tag on every later call.
    pub fn position_of_or_assign(&mut self, obj: ObjectRef) -> (Position, bool) {
        let pos = *self.positions.entry(obj).or_insert_with(|| {
            let pos = Position(self.next);
            self.next += 1;
            pos
        });
        let first_write = self.written.insert(obj);
        (pos, first_write)
    }

    pub fn position_of(&self, obj: ObjectRef) -> Option<Position> {
        self.positions.get(&obj).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use precache_host::ids::ModuleId;

    #[test]
    fn first_assignment_reports_new() {
        let mut table = SaveBackrefs::new();
        let obj = ObjectRef::Module(ModuleId(0));
        let (_, is_new) = table.position_of_or_assign(obj);
        assert!(is_new);
    }

    #[test]
    fn repeat_lookup_reuses_position_and_reports_seen() {
        let mut table = SaveBackrefs::new();
        let obj = ObjectRef::Module(ModuleId(0));
        let (first_pos, _) = table.position_of_or_assign(obj);
        let (pos, is_new) = table.position_of_or_assign(obj);
        assert_eq!(pos, first_pos);
        assert!(!is_new);
    }

    #[test]
    fn first_object_encountered_lands_on_position_zero() {
        let mut table = SaveBackrefs::new();
        let top = ObjectRef::Module(ModuleId(7));
        let (pos, is_new) = table.position_of_or_assign(top);
        assert_eq!(pos, Position(0));
        assert!(is_new);

        let other = ObjectRef::Module(ModuleId(8));
        let (other_pos, _) = table.position_of_or_assign(other);
        assert_ne!(other_pos, Position(0));
    }
}
