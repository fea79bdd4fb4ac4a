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

//! The view/query layer: composable [`Filter`]s over archetype signatures
//! and a [`Fetch`] protocol for lockstep column iteration.
//!
//! This collapses what used to be two near-identical query concepts into
//! one filter protocol (`matches` only — no filter ever derives column
//! pointers) plus a separate fetch protocol that does.

use std::marker::PhantomData;

use smallvec::{smallvec, SmallVec};

use crate::archetype::Archetype;
use crate::component::{descriptor, Component};
use crate::world::World;

const MAX_FETCH_COMPONENTS: usize = 8;

/// An archetype-signature predicate. Implementors only decide whether an
/// archetype matches; they never derive column pointers.
pub trait Filter {
    fn matches(signature: &[u32]) -> bool;
}

/// Matches archetypes carrying component `T`.
pub struct With<T>(PhantomData<T>);

impl<T: Component> Filter for With<T> {
    fn matches(signature: &[u32]) -> bool {
        signature.binary_search(&descriptor::<T>().hash).is_ok()
    }
}

/// Matches archetypes that do not carry component `T`.
pub struct Without<T>(PhantomData<T>);

impl<T: Component> Filter for Without<T> {
    fn matches(signature: &[u32]) -> bool {
        !With::<T>::matches(signature)
    }
}

/// Matches archetypes carrying at least one of the filters in tuple `F`.
pub struct Any<F>(PhantomData<F>);

impl Filter for () {
    fn matches(_signature: &[u32]) -> bool {
        true
    }
}

macro_rules! impl_filter_and {
    ($($T:ident),+) => {
        impl<$($T: Filter),+> Filter for ($($T,)+) {
            fn matches(signature: &[u32]) -> bool {
                $($T::matches(signature))&&+
            }
        }
    };
}

impl_filter_and!(A);
impl_filter_and!(A, B);
impl_filter_and!(A, B, C);
impl_filter_and!(A, B, C, D);
impl_filter_and!(A, B, C, D, E);
impl_filter_and!(A, B, C, D, E, F);
impl_filter_and!(A, B, C, D, E, F, G);
impl_filter_and!(A, B, C, D, E, F, G, H);

macro_rules! impl_filter_any {
    ($($T:ident),+) => {
        impl<$($T: Filter),+> Filter for Any<($($T,)+)> {
            fn matches(signature: &[u32]) -> bool {
                $($T::matches(signature))||+
            }
        }
    };
}

impl_filter_any!(A);
impl_filter_any!(A, B);
impl_filter_any!(A, B, C);
impl_filter_any!(A, B, C, D);
impl_filter_any!(A, B, C, D, E);
impl_filter_any!(A, B, C, D, E, F);
impl_filter_any!(A, B, C, D, E, F, G);
impl_filter_any!(A, B, C, D, E, F, G, H);

/// Derives column pointers for one or more components and fetches typed
/// references from them at a given row. Implemented for `&'w T`, `&'w mut
/// T`, and tuples of those up to [`MAX_FETCH_COMPONENTS`] components.
///
/// # Safety
/// `fetch` trusts that `ptrs` was produced by [`Archetype::column_pointers`]
/// for exactly [`Fetch::hashes`] (same order) against a live row.
pub unsafe trait Fetch<'w> {
    type Item;

    fn hashes() -> SmallVec<[u32; MAX_FETCH_COMPONENTS]>;

    /// # Safety
    /// See the trait-level safety note.
    unsafe fn fetch(ptrs: &[*mut u8], row: usize) -> Self::Item;
}

unsafe impl<'w, T: Component> Fetch<'w> for &'w T {
    type Item = &'w T;

    fn hashes() -> SmallVec<[u32; MAX_FETCH_COMPONENTS]> {
        smallvec![descriptor::<T>().hash]
    }

    unsafe fn fetch(ptrs: &[*mut u8], row: usize) -> Self::Item {
        &*row_ptr::<T>(ptrs[0], row)
    }
}

unsafe impl<'w, T: Component> Fetch<'w> for &'w mut T {
    type Item = &'w mut T;

    fn hashes() -> SmallVec<[u32; MAX_FETCH_COMPONENTS]> {
        smallvec![descriptor::<T>().hash]
    }

    unsafe fn fetch(ptrs: &[*mut u8], row: usize) -> Self::Item {
        &mut *(row_ptr::<T>(ptrs[0], row) as *mut T)
    }
}

unsafe fn row_ptr<T>(base: *mut u8, row: usize) -> *const T {
    if std::mem::size_of::<T>() == 0 {
        base as *const T
    } else {
        base.add(row * std::mem::size_of::<T>()) as *const T
    }
}

macro_rules! impl_fetch_tuple {
    ($($T:ident),+) => {
        unsafe impl<'w, $($T: Fetch<'w>),+> Fetch<'w> for ($($T,)+) {
            type Item = ($($T::Item,)+);

            fn hashes() -> SmallVec<[u32; MAX_FETCH_COMPONENTS]> {
                let mut out = SmallVec::new();
                $(out.extend($T::hashes());)+
                out
            }

            #[allow(non_snake_case)]
            unsafe fn fetch(ptrs: &[*mut u8], row: usize) -> Self::Item {
                let mut offset = 0usize;
                $(
                    let $T = {
                        let n = $T::hashes().len();
                        let item = $T::fetch(&ptrs[offset..offset + n], row);
                        offset += n;
                        item
                    };
                )+
                ($($T,)+)
            }
        }
    };
}

impl_fetch_tuple!(A);
impl_fetch_tuple!(A, B);
impl_fetch_tuple!(A, B, C);
impl_fetch_tuple!(A, B, C, D);
impl_fetch_tuple!(A, B, C, D, E);
impl_fetch_tuple!(A, B, C, D, E, F);
impl_fetch_tuple!(A, B, C, D, E, F, G);
impl_fetch_tuple!(A, B, C, D, E, F, G, H);

/// Sorts `Fe::hashes()` once, for use against [`Archetype::column_pointers`]
/// and [`Archetype::has_all`].
fn sorted_fetch_hashes<'w, Fe: Fetch<'w>>() -> SmallVec<[u32; MAX_FETCH_COMPONENTS]> {
    let mut hashes = Fe::hashes();
    hashes.sort_unstable();
    hashes
}

/// Lockstep iterator over every row of every archetype matching a query.
///
/// Holds raw archetype pointers rather than references so the same code
/// serves both the shared (`&World`) and exclusive (`&mut World`) entry
/// points; in both cases the borrow on `World` that produced this iterator
/// is held for `'w`, so no structural mutation (spawn/kill/migrate) can
/// happen while it is alive. Disjoint rows fetched as `&mut T` never alias
/// each other, since every row belongs to exactly one archetype slot.
pub struct QueryIter<'w, Fe: Fetch<'w>> {
    archetypes: Vec<*const Archetype>,
    /// Ascending order, for the monotonic merge in `Archetype::column_pointers`.
    sorted_hashes: SmallVec<[u32; MAX_FETCH_COMPONENTS]>,
    /// `Fe::hashes()`'s own (tuple declaration) order, which is what
    /// `Fe::fetch` indexes into.
    declared_hashes: SmallVec<[u32; MAX_FETCH_COMPONENTS]>,
    arch_cursor: usize,
    row_cursor: usize,
    current_ptrs: Option<SmallVec<[*mut u8; MAX_FETCH_COMPONENTS]>>,
    _marker: PhantomData<(&'w (), Fe)>,
}

impl<'w, Fe: Fetch<'w>> QueryIter<'w, Fe> {
    fn new(
        archetypes: Vec<*const Archetype>,
        sorted_hashes: SmallVec<[u32; MAX_FETCH_COMPONENTS]>,
        declared_hashes: SmallVec<[u32; MAX_FETCH_COMPONENTS]>,
    ) -> Self {
        QueryIter {
            archetypes,
            sorted_hashes,
            declared_hashes,
            arch_cursor: 0,
            row_cursor: 0,
            current_ptrs: None,
            _marker: PhantomData,
        }
    }
}

impl<'w, Fe: Fetch<'w>> Iterator for QueryIter<'w, Fe> {
    type Item = Fe::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let arch = unsafe { &*(*self.archetypes.get(self.arch_cursor)?) };
            if self.current_ptrs.is_none() {
                if arch.is_empty() {
                    self.arch_cursor += 1;
                    continue;
                }
                // `column_pointers` returns pointers in `sorted_hashes` order;
                // `Fe::fetch` expects them in `declared_hashes` (tuple) order,
                // so reorder before handing them off.
                let sorted_ptrs = arch.column_pointers(&self.sorted_hashes);
                self.current_ptrs = sorted_ptrs.map(|sorted_ptrs| {
                    self.declared_hashes
                        .iter()
                        .map(|h| {
                            let pos = self
                                .sorted_hashes
                                .binary_search(h)
                                .expect("declared hash missing from its own sorted set");
                            sorted_ptrs[pos]
                        })
                        .collect::<SmallVec<[*mut u8; MAX_FETCH_COMPONENTS]>>()
                });
                self.row_cursor = 0;
            }
            if self.row_cursor >= arch.len() {
                self.current_ptrs = None;
                self.arch_cursor += 1;
                continue;
            }
            let ptrs = self.current_ptrs.as_ref().expect("just populated above");
            let row = self.row_cursor;
            self.row_cursor += 1;
            return Some(unsafe { Fe::fetch(ptrs, row) });
        }
    }
}

fn matching_archetypes<'w, Fe: Fetch<'w>, Fi: Filter>(
    world: &'w World,
) -> (Vec<*const Archetype>, SmallVec<[u32; MAX_FETCH_COMPONENTS]>, SmallVec<[u32; MAX_FETCH_COMPONENTS]>) {
    let sorted_hashes = sorted_fetch_hashes::<Fe>();
    let declared_hashes = Fe::hashes();
    let archetypes = world
        .archetypes_raw()
        .iter()
        .filter(|a| Fi::matches(a.signature()) && a.has_all(&sorted_hashes))
        .map(|a| a as *const Archetype)
        .collect();
    (archetypes, sorted_hashes, declared_hashes)
}

impl World {
    /// Iterates every (entity-implicit) row matching `Fe`'s component set
    /// and `Fi`'s filter, across every matching archetype, in stable
    /// archetype-creation order for as long as the world's archetype set
    /// does not change.
    pub fn query<'w, Fe: Fetch<'w>, Fi: Filter>(&'w self) -> QueryIter<'w, Fe> {
        let (archetypes, sorted_hashes, declared_hashes) = matching_archetypes::<Fe, Fi>(self);
        QueryIter::new(archetypes, sorted_hashes, declared_hashes)
    }

    /// Like [`World::query`], but for fetch tuples containing `&mut T`.
    pub fn query_mut<'w, Fe: Fetch<'w>, Fi: Filter>(&'w mut self) -> QueryIter<'w, Fe> {
        let (archetypes, sorted_hashes, declared_hashes) = matching_archetypes::<Fe, Fi>(self);
        QueryIter::new(archetypes, sorted_hashes, declared_hashes)
    }
}
