// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity identifiers and the entity directory.
//!
//! An [`EntityId`] is a 64-bit handle split into a 32-bit generation and a
//! 32-bit index. The [`EntityDirectory`] owns index recycling: freed slots
//! are returned through a min-priority-queue free list (smallest index
//! first), and a slot whose generation has been exhausted is permanently
//! retired rather than recycled.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::{Error, Result};

/// The highest generation a slot can reach before it is retired instead of
/// recycled.
pub const GEN_MAX: u32 = u32::MAX;

/// Opaque entity handle: 32-bit generation packed above a 32-bit index.
/// Identity is bitwise equality of the packed value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    fn pack(generation: u32, index: u32) -> Self {
        EntityId(((generation as u64) << 32) | index as u64)
    }

    /// The handle's generation half.
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The handle's index half.
    pub fn index(self) -> u32 {
        self.0 as u32
    }
}

impl std::fmt::Debug for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntityId({}#{})", self.index(), self.generation())
    }
}

struct Slot {
    /// The most recently issued handle for this index. While the slot is
    /// alive this is the live handle; once freed, the index half is zeroed
    /// and only the generation half is meaningful (the generation the next
    /// allocation from this slot must exceed).
    handle: EntityId,
    location: Option<(usize, usize)>,
}

/// Owns entity identity: generation/index allocation, recycling, and the
/// `entity -> (archetype index, row)` mapping.
pub struct EntityDirectory {
    slots: Vec<Slot>,
    free_heap: BinaryHeap<Reverse<u32>>,
}

impl EntityDirectory {
    pub fn new() -> Self {
        // Index 0 is pre-reserved and never issued.
        EntityDirectory {
            slots: vec![Slot {
                handle: EntityId::pack(0, 0),
                location: None,
            }],
            free_heap: BinaryHeap::new(),
        }
    }

    /// Allocates a fresh entity handle with no archetype location yet.
    pub fn allocate(&mut self) -> EntityId {
        if let Some(Reverse(index)) = self.free_heap.pop() {
            let next_gen = self.slots[index as usize].handle.generation() + 1;
            let handle = EntityId::pack(next_gen, index);
            self.slots[index as usize] = Slot {
                handle,
                location: None,
            };
            handle
        } else {
            let index = self.slots.len() as u32;
            let handle = EntityId::pack(0, index);
            self.slots.push(Slot {
                handle,
                location: None,
            });
            handle
        }
    }

    /// True if `entity` is the current live handle for its index.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        let index = entity.index() as usize;
        index != 0 && index < self.slots.len() && self.slots[index].handle == entity
    }

    /// The `(archetype index, row)` of a live entity, if it has been placed.
    pub fn location(&self, entity: EntityId) -> Option<(usize, usize)> {
        if self.is_alive(entity) {
            self.slots[entity.index() as usize].location
        } else {
            None
        }
    }

    /// Updates the location of a live entity.
    pub fn set_location(&mut self, entity: EntityId, location: (usize, usize)) {
        debug_assert!(self.is_alive(entity));
        self.slots[entity.index() as usize].location = Some(location);
    }

    /// Frees `entity`. Zeroes the index half of the stored handle and, if
    /// the generation has not reached [`GEN_MAX`], pushes the index onto
    /// the free heap for reuse with a strictly greater generation. If the
    /// generation has reached `GEN_MAX` the index is retired permanently.
    pub fn free(&mut self, entity: EntityId) -> Result<()> {
        if !self.is_alive(entity) {
            return Err(Error::InvalidEntity);
        }
        let index = entity.index();
        let generation = entity.generation();
        let slot = &mut self.slots[index as usize];
        slot.handle = EntityId::pack(generation, 0);
        slot.location = None;
        if generation < GEN_MAX {
            self.free_heap.push(Reverse(index));
        }
        Ok(())
    }

    /// Reserves directory capacity for at least `additional` more entities.
    pub fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
    }
}

impl Default for EntityDirectory {
    fn default() -> Self {
        Self::new()
    }
}
