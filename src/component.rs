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

//! Component type descriptors, the process-wide type registry, and Bundles.
//!
//! A component's [`TypeDescriptor`] is the type-erased vtable an archetype
//! column uses to construct, relocate and destroy its rows without ever
//! naming the concrete type again. Descriptors are produced once per type
//! (on first use) and live for the life of the process.

use std::alloc::Layout;
use std::any::type_name;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, OnceLock};

use smallvec::{smallvec, SmallVec};

use crate::error::{Error, Result};
use crate::hash::type_name_hash;

/// Maximum number of components supported by [`Bundle`] implementations.
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for component types.
///
/// Components are `'static` (no borrowed data) and implement `Default` so
/// an archetype column can default-construct a row when a structural
/// operation adds a component without a supplied value.
pub trait Component: 'static + Send + Sync + Default {}

impl<T: 'static + Send + Sync + Default> Component for T {}

/// Type-erased construct/relocate/destroy vtable for one component type.
///
/// Every Rust value can be relocated with a bitwise copy followed by
/// forgetting the source (this is how `Vec` reallocates), so unlike a
/// C++ move constructor, `move_construct_n` here can never observe a
/// thrown exception; the only failure mode a migration can hit is the
/// allocator itself.
pub struct TypeDescriptor {
    pub hash: u32,
    pub name: &'static str,
    pub size: usize,
    pub align: usize,
    pub trivially_copyable: bool,
    /// Always `true` under Rust's ownership model: every type here is
    /// relocated with `ptr::copy_nonoverlapping` + forget.
    pub trivially_relocatable: bool,
    pub trivially_move_assignable: bool,
    default_construct_n: unsafe fn(*mut u8, usize),
    move_construct_n: unsafe fn(*mut u8, *const u8, usize),
    destroy_n: unsafe fn(*mut u8, usize),
}

impl TypeDescriptor {
    /// Builds (but does not register) the descriptor for `T`.
    fn of<T: Component>() -> Self {
        let name = type_name::<T>();
        TypeDescriptor {
            hash: type_name_hash(name),
            name,
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            trivially_copyable: !std::mem::needs_drop::<T>(),
            trivially_relocatable: true,
            trivially_move_assignable: !std::mem::needs_drop::<T>(),
            default_construct_n: default_construct_n::<T>,
            move_construct_n: move_construct_n::<T>,
            destroy_n: destroy_n::<T>,
        }
    }

    /// Default-constructs `count` rows starting at `dst`.
    ///
    /// # Safety
    /// `dst` must point to `count` uninitialized, correctly aligned slots
    /// of this descriptor's `size`.
    pub unsafe fn default_construct_n(&self, dst: *mut u8, count: usize) {
        (self.default_construct_n)(dst, count)
    }

    /// Bitwise-relocates `count` rows from `src` to `dst`. The source bytes
    /// must be treated as moved-from afterward: never dropped, never read.
    ///
    /// # Safety
    /// `dst`/`src` must point to `count` correctly aligned, non-overlapping
    /// slots of this descriptor's `size`; `src` must hold live values.
    pub unsafe fn move_construct_n(&self, dst: *mut u8, src: *const u8, count: usize) {
        (self.move_construct_n)(dst, src, count)
    }

    /// Runs destructors over `count` live rows starting at `dst`.
    ///
    /// # Safety
    /// `dst` must point to `count` live, correctly aligned slots of this
    /// descriptor's `size`.
    pub unsafe fn destroy_n(&self, dst: *mut u8, count: usize) {
        (self.destroy_n)(dst, count)
    }

    /// The layout of a buffer holding `count` rows, floored to the
    /// archetype column alignment.
    pub fn array_layout(&self, count: usize, align_floor: usize) -> Option<Layout> {
        let align = self.align.max(align_floor);
        Layout::from_size_align(self.size.checked_mul(count)?, align).ok()
    }
}

unsafe fn default_construct_n<T: Component>(dst: *mut u8, count: usize) {
    let dst = dst as *mut T;
    for i in 0..count {
        std::ptr::write(dst.add(i), T::default());
    }
}

unsafe fn move_construct_n<T: Component>(dst: *mut u8, src: *const u8, count: usize) {
    std::ptr::copy_nonoverlapping(src as *const T, dst as *mut T, count);
}

unsafe fn destroy_n<T: Component>(dst: *mut u8, count: usize) {
    let dst = dst as *mut T;
    for i in 0..count {
        std::ptr::drop_in_place(dst.add(i));
    }
}

struct Registry {
    by_hash: std::collections::HashMap<u32, &'static str>,
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn registry() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| {
        Mutex::new(Registry {
            by_hash: std::collections::HashMap::new(),
        })
    })
}

/// Registers `name`/`hash` globally, returning an error if a different type
/// name already claimed this hash.
fn check_collision(hash: u32, name: &'static str) -> Result<()> {
    let mut reg = registry().lock().unwrap();
    match reg.by_hash.entry(hash) {
        Entry::Occupied(existing) => {
            if *existing.get() == name {
                Ok(())
            } else {
                Err(Error::HashCollision)
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(name);
            Ok(())
        }
    }
}

/// Returns the process-wide [`TypeDescriptor`] for `T`, computing and
/// registering it on first use. Synchronized via a per-type `OnceLock`, so
/// concurrent first use from multiple threads is safe.
///
/// # Panics
/// Panics if `T`'s type hash collides with a previously registered,
/// differently-named type. This is the "fail fast" default; callers that
/// need to detect the collision without aborting should call
/// [`try_descriptor`] before any other use of `T` in this process.
pub fn descriptor<T: Component>() -> &'static TypeDescriptor {
    struct Cell<T>(std::marker::PhantomData<T>);
    impl<T: Component> Cell<T> {
        fn get() -> &'static TypeDescriptor {
            static ONCE: OnceLock<TypeDescriptor> = OnceLock::new();
            ONCE.get_or_init(|| {
                let desc = TypeDescriptor::of::<T>();
                check_collision(desc.hash, desc.name)
                    .unwrap_or_else(|_| panic!("type hash collision for {}", desc.name));
                desc
            })
        }
    }
    Cell::<T>::get()
}

/// Fallible variant of [`descriptor`] for callers that want to detect a
/// hash collision instead of panicking.
pub fn try_descriptor<T: Component>() -> Result<&'static TypeDescriptor> {
    let desc = TypeDescriptor::of::<T>();
    check_collision(desc.hash, desc.name)?;
    Ok(descriptor::<T>())
}

/// A statically-typed set of components that can be spawned or migrated
/// together.
///
/// Implemented for tuples of 1 to [`MAX_BUNDLE_COMPONENTS`] component types.
/// `type_hashes`/`type_descriptors` return entries in tuple-declaration
/// order; `write_components` expects destination pointers in that same
/// order, matched by the caller via each entry's hash.
pub trait Bundle: Send + Sync + 'static {
    /// Per-type hashes, in tuple-declaration order (not sorted).
    fn type_hashes() -> SmallVec<[u32; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Type descriptors, parallel to [`Bundle::type_hashes`].
    fn type_descriptors() -> SmallVec<[&'static TypeDescriptor; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Moves each tuple field into the pointer at the matching position.
    ///
    /// # Safety
    /// Each pointer must be valid, correctly aligned for its type, and
    /// point to uninitialized memory; there must be exactly as many
    /// pointers as fields, in the same order as [`Bundle::type_hashes`].
    unsafe fn write_components(self, ptrs: &[*mut u8]);
}

impl Bundle for () {
    fn type_hashes() -> SmallVec<[u32; MAX_BUNDLE_COMPONENTS]> {
        SmallVec::new()
    }

    fn type_descriptors() -> SmallVec<[&'static TypeDescriptor; MAX_BUNDLE_COMPONENTS]> {
        SmallVec::new()
    }

    unsafe fn write_components(self, _ptrs: &[*mut u8]) {}
}

macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn type_hashes() -> SmallVec<[u32; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(descriptor::<$T>().hash),*]
            }

            fn type_descriptors() -> SmallVec<[&'static TypeDescriptor; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(descriptor::<$T>()),*]
            }

            #[allow(non_snake_case)]
            unsafe fn write_components(self, ptrs: &[*mut u8]) {
                let ($($T,)*) = self;
                let mut i = 0;
                $(
                    std::ptr::write(ptrs[i] as *mut $T, $T);
                    #[allow(unused_assignments)]
                    { i += 1; }
                )*
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
