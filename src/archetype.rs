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

//! Archetype storage: structure-of-arrays columns for one unique component
//! signature, plus the row directory mapping entities to row indices.

use std::alloc::Layout;
use std::ptr::NonNull;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::component::TypeDescriptor;
use crate::entity::EntityId;
use crate::error::{Error, Result};
use crate::hash::fnv1a64_combine;
use crate::utils::{grown_capacity, COLUMN_ALIGN_FLOOR};

/// Sorted list of per-type hashes identifying an archetype.
pub type Signature = SmallVec<[u32; 8]>;

/// The 64-bit FNV-1a combine of a sorted signature.
pub fn signature_hash(sorted_hashes: &[u32]) -> u64 {
    fnv1a64_combine(sorted_hashes)
}

/// Merges two sorted, disjoint (hash, descriptor) lists into their union,
/// still sorted.
pub(crate) fn merge_union(
    a_hashes: &[u32],
    a_descs: &[&'static TypeDescriptor],
    b_hashes: &[u32],
    b_descs: &[&'static TypeDescriptor],
) -> (Signature, SmallVec<[&'static TypeDescriptor; 8]>) {
    let mut hashes = Signature::with_capacity(a_hashes.len() + b_hashes.len());
    let mut descs = SmallVec::with_capacity(a_hashes.len() + b_hashes.len());
    let (mut i, mut j) = (0, 0);
    while i < a_hashes.len() && j < b_hashes.len() {
        if a_hashes[i] == b_hashes[j] {
            hashes.push(a_hashes[i]);
            descs.push(a_descs[i]);
            i += 1;
            j += 1;
        } else if a_hashes[i] < b_hashes[j] {
            hashes.push(a_hashes[i]);
            descs.push(a_descs[i]);
            i += 1;
        } else {
            hashes.push(b_hashes[j]);
            descs.push(b_descs[j]);
            j += 1;
        }
    }
    hashes.extend_from_slice(&a_hashes[i..]);
    descs.extend_from_slice(&a_descs[i..]);
    hashes.extend_from_slice(&b_hashes[j..]);
    descs.extend_from_slice(&b_descs[j..]);
    (hashes, descs)
}

/// Returns `a` with every hash present in `b` removed.
pub(crate) fn merge_difference(
    a_hashes: &[u32],
    a_descs: &[&'static TypeDescriptor],
    b_hashes: &[u32],
) -> (Signature, SmallVec<[&'static TypeDescriptor; 8]>) {
    let mut hashes = Signature::new();
    let mut descs = SmallVec::new();
    for (i, &h) in a_hashes.iter().enumerate() {
        if b_hashes.binary_search(&h).is_err() {
            hashes.push(h);
            descs.push(a_descs[i]);
        }
    }
    (hashes, descs)
}

struct Column {
    /// Base pointer of the backing allocation, valid for `capacity` rows.
    /// Dangling (never dereferenced) when the descriptor's size is zero.
    ptr: NonNull<u8>,
    desc: &'static TypeDescriptor,
}

impl Column {
    fn dangling(desc: &'static TypeDescriptor) -> Self {
        Column {
            ptr: NonNull::new(desc.align.max(1) as *mut u8).unwrap(),
            desc,
        }
    }

    fn layout(&self, capacity: usize) -> Option<Layout> {
        self.desc.array_layout(capacity, COLUMN_ALIGN_FLOOR)
    }

    unsafe fn row_ptr(&self, row: usize) -> *mut u8 {
        if self.desc.size == 0 {
            self.ptr.as_ptr()
        } else {
            self.ptr.as_ptr().add(row * self.desc.size)
        }
    }
}

/// One archetype: a structure-of-arrays column store for every entity
/// sharing an exact component signature, plus that signature's row
/// directory.
pub struct Archetype {
    hashes: Signature,
    descriptors: SmallVec<[&'static TypeDescriptor; 8]>,
    /// Parallel to `hashes`/`descriptors`: index into `columns`, or `None`
    /// for zero-sized component types, which own no storage.
    column_of: SmallVec<[Option<usize>; 8]>,
    columns: Vec<Column>,
    signature_hash: u64,
    size: usize,
    capacity: usize,
    row_of: FxHashMap<EntityId, usize>,
    entity_of: Vec<EntityId>,
}

impl Archetype {
    /// Builds an empty (zero-capacity, zero-row) archetype for a sorted,
    /// deduplicated signature.
    pub fn new(hashes: &[u32], descriptors: &[&'static TypeDescriptor]) -> Self {
        debug_assert_eq!(hashes.len(), descriptors.len());
        debug_assert!(hashes.windows(2).all(|w| w[0] < w[1]));
        let mut columns = Vec::new();
        let mut column_of = SmallVec::with_capacity(hashes.len());
        for &desc in descriptors {
            if desc.size == 0 {
                column_of.push(None);
            } else {
                column_of.push(Some(columns.len()));
                columns.push(Column::dangling(desc));
            }
        }
        Archetype {
            hashes: hashes.iter().copied().collect(),
            descriptors: descriptors.iter().copied().collect(),
            column_of,
            columns,
            signature_hash: signature_hash(hashes),
            size: 0,
            capacity: 0,
            row_of: FxHashMap::default(),
            entity_of: Vec::new(),
        }
    }

    pub fn signature(&self) -> &[u32] {
        &self.hashes
    }

    pub fn descriptors(&self) -> &[&'static TypeDescriptor] {
        &self.descriptors
    }

    pub fn signature_hash(&self) -> u64 {
        self.signature_hash
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entity_of
    }

    pub fn row_of(&self, entity: EntityId) -> Option<usize> {
        self.row_of.get(&entity).copied()
    }

    /// True if `hash` is one of this archetype's component types.
    pub fn has(&self, hash: u32) -> bool {
        self.hashes.binary_search(&hash).is_ok()
    }

    /// True if every hash in the (sorted) query is present.
    pub fn has_all(&self, sorted_hashes: &[u32]) -> bool {
        sorted_hashes.iter().all(|h| self.has(*h))
    }

    fn column_index(&self, hash: u32) -> Option<usize> {
        let pos = self.hashes.binary_search(&hash).ok()?;
        self.column_of[pos]
    }

    /// The type descriptor for a component hash this archetype carries.
    pub fn descriptor_for(&self, hash: u32) -> Option<&'static TypeDescriptor> {
        let pos = self.hashes.binary_search(&hash).ok()?;
        Some(self.descriptors[pos])
    }

    /// Removes `entity` from the row directory without touching its
    /// column bytes or row bookkeeping. Used by cross-archetype migration,
    /// which relocates/destroys column bytes itself before evacuating the
    /// row.
    pub(crate) fn forget_row(&mut self, entity: EntityId) {
        self.row_of.remove(&entity);
    }

    /// Base column pointer (row 0) for `hash`, or `None` if this archetype
    /// does not carry that component.
    pub fn column_base(&self, hash: u32) -> Option<*mut u8> {
        match self.column_index(hash) {
            Some(idx) => Some(self.columns[idx].ptr.as_ptr()),
            None => {
                if self.hashes.binary_search(&hash).is_ok() {
                    // Zero-sized component: any aligned non-null pointer is valid.
                    let pos = self.hashes.binary_search(&hash).unwrap();
                    Some(self.descriptors[pos].align.max(1) as *mut u8)
                } else {
                    None
                }
            }
        }
    }

    /// Row pointer for `hash` at `row`, or `None` if absent.
    ///
    /// # Safety
    /// `row` must be `< self.len()`.
    pub unsafe fn row_ptr(&self, hash: u32, row: usize) -> Option<*mut u8> {
        let pos = self.hashes.binary_search(&hash).ok()?;
        match self.column_of[pos] {
            Some(idx) => Some(self.columns[idx].row_ptr(row)),
            None => Some(self.descriptors[pos].align.max(1) as *mut u8),
        }
    }

    /// Column-pointer tuple for a sorted set of requested hashes, advancing
    /// both cursors in lockstep (amortized O(n+k) for sorted, non-repeating
    /// queries). Returns `None` if any requested hash is absent.
    pub fn column_pointers(&self, sorted_hashes: &[u32]) -> Option<SmallVec<[*mut u8; 8]>> {
        let mut out = SmallVec::with_capacity(sorted_hashes.len());
        let mut cursor = 0usize;
        'outer: for &want in sorted_hashes {
            while cursor < self.hashes.len() {
                if self.hashes[cursor] == want {
                    out.push(match self.column_of[cursor] {
                        Some(idx) => self.columns[idx].ptr.as_ptr(),
                        None => self.descriptors[cursor].align.max(1) as *mut u8,
                    });
                    cursor += 1;
                    continue 'outer;
                } else if self.hashes[cursor] > want {
                    return None;
                }
                cursor += 1;
            }
            return None;
        }
        Some(out)
    }

    /// Grows every non-zero-sized column to hold at least `min_capacity`
    /// rows. All-or-nothing: if any column's allocation fails, none of the
    /// already-grown columns are committed and the archetype is left
    /// exactly as it was.
    pub fn reserve(&mut self, min_capacity: usize) -> Result<()> {
        if min_capacity <= self.capacity {
            return Ok(());
        }
        let mut new_allocations: Vec<(usize, NonNull<u8>, Layout)> = Vec::with_capacity(self.columns.len());
        for (idx, column) in self.columns.iter().enumerate() {
            let new_layout = match column.layout(min_capacity) {
                Some(l) => l,
                None => {
                    free_new_allocations(&new_allocations);
                    return Err(Error::AllocationFailure);
                }
            };
            let raw = unsafe { std::alloc::alloc(new_layout) };
            match NonNull::new(raw) {
                Some(ptr) => new_allocations.push((idx, ptr, new_layout)),
                None => {
                    free_new_allocations(&new_allocations);
                    return Err(Error::AllocationFailure);
                }
            }
        }
        // All allocations succeeded: relocate live rows and swap buffers in.
        for &(idx, new_ptr, _) in &new_allocations {
            let column = &mut self.columns[idx];
            if self.size > 0 {
                unsafe {
                    column
                        .desc
                        .move_construct_n(new_ptr.as_ptr(), column.ptr.as_ptr(), self.size);
                }
            }
            if self.capacity > 0 {
                if let Some(old_layout) = column.layout(self.capacity) {
                    unsafe { std::alloc::dealloc(column.ptr.as_ptr(), old_layout) };
                }
            }
            column.ptr = new_ptr;
        }
        self.capacity = min_capacity;
        Ok(())
    }

    fn ensure_room_for_one(&mut self) -> Result<()> {
        if self.size == self.capacity {
            let target = grown_capacity(self.capacity, self.size + 1);
            self.reserve(target)?;
        }
        Ok(())
    }

    /// Allocates a new row for `entity`. Column bytes at the new row are
    /// uninitialized; the caller must construct every column (via
    /// [`Archetype::default_construct_row`] and/or direct writes) before
    /// the row is considered live.
    pub fn allocate_row(&mut self, entity: EntityId) -> Result<usize> {
        self.ensure_room_for_one()?;
        let row = self.size;
        self.entity_of.push(entity);
        self.row_of.insert(entity, row);
        self.size += 1;
        Ok(row)
    }

    /// Default-constructs every column at `row`.
    ///
    /// # Safety
    /// `row` must have been freshly allocated and not yet constructed.
    pub unsafe fn default_construct_row(&mut self, row: usize) {
        for column in &self.columns {
            column.desc.default_construct_n(column.row_ptr(row), 1);
        }
    }

    /// Runs destructors for every column at `row`.
    ///
    /// # Safety
    /// `row` must hold live values in every column.
    pub unsafe fn destroy_row(&mut self, row: usize) {
        for column in &self.columns {
            column.desc.destroy_n(column.row_ptr(row), 1);
        }
    }

    /// Removes `row` from the bookkeeping (entity/row directory) and, if it
    /// was not the last row, swaps the last row's bytes into it via a
    /// bitwise relocation (no destructor call on the vacated last slot).
    /// The caller must already have disposed of `row`'s old column bytes
    /// (via `destroy_row`, or by having moved them elsewhere) before
    /// calling this. Returns the entity that was swapped into `row`, if any.
    ///
    /// # Safety
    /// `row` must be `< self.len()` and its column bytes must already be
    /// logically dead (destroyed or relocated away).
    pub unsafe fn evacuate_row(&mut self, row: usize) -> Option<EntityId> {
        let last = self.size - 1;
        let swapped = if row != last {
            let last_entity = self.entity_of[last];
            for column in &self.columns {
                let src = column.row_ptr(last);
                let dst = column.row_ptr(row);
                column.desc.move_construct_n(dst, src, 1);
            }
            self.entity_of[row] = last_entity;
            self.row_of.insert(last_entity, row);
            Some(last_entity)
        } else {
            None
        };
        self.entity_of.pop();
        self.size -= 1;
        swapped
    }

    /// Removes `entity`'s row entirely: destroys its component values, then
    /// evacuates the slot. Returns the entity swapped into the vacated row,
    /// if any.
    pub fn erase(&mut self, entity: EntityId) -> Result<Option<EntityId>> {
        let row = self.row_of.remove(&entity).ok_or(Error::InvalidEntity)?;
        unsafe {
            self.destroy_row(row);
            Ok(self.evacuate_row(row))
        }
    }

    /// Destroys every live row, leaving the archetype empty but keeping its
    /// allocated capacity.
    pub fn clear(&mut self) {
        for row in 0..self.size {
            unsafe { self.destroy_row(row) };
        }
        self.size = 0;
        self.entity_of.clear();
        self.row_of.clear();
    }

    /// Builds a new empty archetype whose signature is this archetype's
    /// signature unioned with `added`, without copying any row data.
    pub fn with_added(&self, added_hashes: &[u32], added_descs: &[&'static TypeDescriptor]) -> Archetype {
        let (hashes, descs) = merge_union(&self.hashes, &self.descriptors, added_hashes, added_descs);
        Archetype::new(&hashes, &descs)
    }

    /// Builds a new empty archetype whose signature is this archetype's
    /// signature minus `removed`, without copying any row data.
    pub fn with_removed(&self, removed_hashes: &[u32]) -> Archetype {
        let (hashes, descs) = merge_difference(&self.hashes, &self.descriptors, removed_hashes);
        Archetype::new(&hashes, &descs)
    }
}

fn free_new_allocations(allocations: &[(usize, NonNull<u8>, Layout)]) {
    for &(_, ptr, layout) in allocations {
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        for row in 0..self.size {
            for column in &self.columns {
                unsafe { column.desc.destroy_n(column.row_ptr(row), 1) };
            }
        }
        for column in &self.columns {
            if self.capacity > 0 {
                if let Some(layout) = column.layout(self.capacity) {
                    unsafe { std::alloc::dealloc(column.ptr.as_ptr(), layout) };
                }
            }
        }
    }
}
