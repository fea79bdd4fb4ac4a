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

//! FNV-1a hashing used for per-type hashes and archetype signature hashes.
//!
//! Constants and folding order match the reflection hashing the rest of this
//! engine's tooling has always used, so hashes computed here are stable
//! across the ecosystem rather than an ad-hoc reinvention.

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

const FNV64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 32-bit FNV-1a over a byte string. Used to hash a component type's fully
/// qualified name into its per-type hash.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV32_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV32_PRIME);
    }
    hash
}

/// 64-bit FNV-1a combine over a sequence of 32-bit per-type hashes, folding
/// each element as four little-endian bytes. Used to derive an archetype's
/// signature hash from its sorted per-type hash list.
pub fn fnv1a64_combine(words: &[u32]) -> u64 {
    let mut hash = FNV64_OFFSET_BASIS;
    for &word in words {
        for shift in [0u32, 8, 16, 24] {
            let byte = ((word >> shift) & 0xff) as u64;
            hash ^= byte;
            hash = hash.wrapping_mul(FNV64_PRIME);
        }
    }
    hash
}

/// Hashes a type's fully qualified name (`std::any::type_name::<T>()`) into
/// its 32-bit per-type hash.
pub fn type_name_hash(name: &str) -> u32 {
    fnv1a32(name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv32_empty_is_offset_basis() {
        assert_eq!(fnv1a32(&[]), FNV32_OFFSET_BASIS);
    }

    #[test]
    fn fnv32_is_deterministic_and_sensitive_to_input() {
        let a = fnv1a32(b"loom_ecs::Position");
        let b = fnv1a32(b"loom_ecs::Position");
        let c = fnv1a32(b"loom_ecs::Velocity");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fnv64_combine_empty_is_offset_basis() {
        assert_eq!(fnv1a64_combine(&[]), FNV64_OFFSET_BASIS);
    }

    #[test]
    fn fnv64_combine_order_sensitive() {
        let a = fnv1a64_combine(&[1, 2, 3]);
        let b = fnv1a64_combine(&[3, 2, 1]);
        assert_ne!(a, b);
    }

    #[test]
    fn fnv64_combine_deterministic() {
        let hashes = [type_name_hash("A"), type_name_hash("B"), type_name_hash("C")];
        assert_eq!(fnv1a64_combine(&hashes), fnv1a64_combine(&hashes));
    }
}
