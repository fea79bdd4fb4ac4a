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

//! Tunable constants and small helpers shared across the crate.

/// Row capacity an archetype grows to on its first allocation.
pub const INITIAL_CAPACITY: usize = 64;

/// Minimum alignment every archetype column buffer is allocated to,
/// regardless of a component type's own alignment requirement.
pub const COLUMN_ALIGN_FLOOR: usize = 32;

/// Generate a process-unique id (used for worker/buffer tagging).
pub fn next_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Rounds `value` up to the next multiple of `alignment`, which must be a
/// power of two.
pub fn align_to(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// The next row capacity an archetype should grow to in order to hold at
/// least `required` rows: doubling from [`INITIAL_CAPACITY`], or `required`
/// itself if that's larger than one doubling step.
pub fn grown_capacity(current: usize, required: usize) -> usize {
    if current == 0 {
        return required.max(INITIAL_CAPACITY);
    }
    let mut next = current;
    while next < required {
        next = next.checked_mul(2).unwrap_or(required);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_is_unique() {
        let id1 = next_id();
        let id2 = next_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn align_to_rounds_up_to_power_of_two() {
        assert_eq!(align_to(0, 8), 0);
        assert_eq!(align_to(1, 8), 8);
        assert_eq!(align_to(7, 8), 8);
        assert_eq!(align_to(8, 8), 8);
        assert_eq!(align_to(9, 8), 16);
    }

    #[test]
    fn grown_capacity_starts_at_initial_capacity() {
        assert_eq!(grown_capacity(0, 1), INITIAL_CAPACITY);
        assert_eq!(grown_capacity(0, 1000), 1000);
    }

    #[test]
    fn grown_capacity_doubles() {
        assert_eq!(grown_capacity(64, 65), 128);
        assert_eq!(grown_capacity(64, 200), 256);
    }
}
