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

//! System trait and access metadata.
//!
//! A [`System`] only ever sees the world by shared reference. Structural
//! mutation is recorded into the [`CommandBuffer`] it is handed and applied
//! by the executor at the stage boundary; this is what lets systems in the
//! same conflict-free group run on separate worker threads without any
//! unsafe aliasing of the world.

use crate::command::CommandBuffer;
use crate::error::Result;
use crate::world::World;
use std::any::TypeId;

/// Identifies a system within the stage it was registered to. Not unique
/// across stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub u32);

/// Declared component-level read/write set for a system, used for conflict
/// detection when grouping systems within a stage.
#[derive(Debug, Clone, Default)]
pub struct SystemAccess {
    pub reads: Vec<TypeId>,
    pub writes: Vec<TypeId>,
}

impl SystemAccess {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn reading<T: 'static>(mut self) -> Self {
        self.reads.push(TypeId::of::<T>());
        self
    }

    pub fn writing<T: 'static>(mut self) -> Self {
        self.writes.push(TypeId::of::<T>());
        self
    }

    /// True if `self` and `other` cannot safely run at the same time:
    /// either both write the same type, or one writes what the other reads.
    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        for w1 in &self.writes {
            if other.writes.contains(w1) {
                return true;
            }
        }
        for w in &self.writes {
            if other.reads.contains(w) {
                return true;
            }
        }
        for r in &self.reads {
            if other.writes.contains(r) {
                return true;
            }
        }
        false
    }
}

/// A unit of scheduled work. Implementors declare their access pattern via
/// [`System::access`] so the scheduler can decide which systems may share a
/// stage group, and run with a shared world borrow plus a private command
/// buffer for deferred mutation.
pub trait System: Send + Sync {
    fn access(&self) -> SystemAccess;

    fn name(&self) -> &'static str;

    fn run(&mut self, world: &World, commands: &mut CommandBuffer) -> Result<()>;
}

pub type BoxedSystem = Box<dyn System>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_write_conflicts() {
        let a = SystemAccess::empty().writing::<i32>();
        let b = SystemAccess::empty().writing::<i32>();
        assert!(a.conflicts_with(&b));
    }

    #[test]
    fn read_read_does_not_conflict() {
        let a = SystemAccess::empty().reading::<i32>();
        let b = SystemAccess::empty().reading::<i32>();
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn write_read_conflicts_either_direction() {
        let writer = SystemAccess::empty().writing::<i32>();
        let reader = SystemAccess::empty().reading::<i32>();
        assert!(writer.conflicts_with(&reader));
        assert!(reader.conflicts_with(&writer));
    }

    #[test]
    fn disjoint_types_never_conflict() {
        let a = SystemAccess::empty().writing::<i32>();
        let b = SystemAccess::empty().writing::<f32>();
        assert!(!a.conflicts_with(&b));
    }
}
