//! Generational entity handles and the slot allocator behind them.
//!
//! A slot index is reused once its entity is despawned; the generation
//! stored next to it is bumped so handles to the previous occupant stop
//! resolving.

use std::fmt;

/// Generation counter of an entity slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Generation(u32);

impl Generation {
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Raw slot index of an entity.
pub type EntityId = u32;

/// Opaque handle to a row of component data.
///
/// Two handles are equal only when both the slot and its generation match,
/// so a handle kept across a despawn never aliases the slot's next occupant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    id: EntityId,
    generation: Generation,
}

impl Entity {
    #[must_use]
    pub const fn new(id: EntityId, generation: Generation) -> Self {
        Self { id, generation }
    }

    /// Slot index, used to address sparse arrays.
    #[must_use]
    pub const fn id(self) -> EntityId {
        self.id
    }

    #[must_use]
    pub const fn generation(self) -> Generation {
        self.generation
    }

    #[must_use]
    pub(crate) const fn index(self) -> usize {
        self.id as usize
    }

    /// Pack into a `u64` (generation in the high half), mostly for logs.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation.0 as u64) << 32) | (self.id as u64)
    }

    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            id: bits as u32,
            generation: Generation((bits >> 32) as u32),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.id, self.generation.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id, self.generation.0)
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    generation: Generation,
    alive: bool,
}

/// Hands out entity slots and tracks which of them are live.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free_list: Vec<EntityId>,
    alive_count: u32,
}

impl EntityAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            alive_count: 0,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity / 4),
            alive_count: 0,
        }
    }

    pub fn allocate(&mut self) -> Entity {
        self.alive_count += 1;

        if let Some(id) = self.free_list.pop() {
            let slot = &mut self.slots[id as usize];
            slot.alive = true;
            return Entity::new(id, slot.generation);
        }

        let id = self.slots.len() as EntityId;
        self.slots.push(Slot {
            generation: Generation::new(),
            alive: true,
        });
        Entity::new(id, Generation::new())
    }

    /// Release a live entity. Returns `false` for stale or unknown handles.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }

        let slot = &mut self.slots[entity.index()];
        slot.generation = slot.generation.next();
        slot.alive = false;
        self.free_list.push(entity.id());
        self.alive_count -= 1;
        true
    }

    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index())
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation())
    }

    #[must_use]
    pub const fn alive_count(&self) -> u32 {
        self.alive_count
    }

    /// Number of slots ever handed out, live or recycled.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Live entities in slot order.
    pub fn iter_alive(&self) -> AliveIter<'_> {
        AliveIter {
            slots: self.slots.iter().enumerate(),
        }
    }
}

/// Iterator over live entities, skipping free slots as it goes.
#[derive(Clone)]
pub struct AliveIter<'a> {
    slots: std::iter::Enumerate<std::slice::Iter<'a, Slot>>,
}

impl Iterator for AliveIter<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Self::Item> {
        self.slots.find_map(|(id, slot)| {
            slot.alive
                .then(|| Entity::new(id as EntityId, slot.generation))
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.slots.size_hint().1)
    }
}
