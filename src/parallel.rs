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

//! Work-stealing execution of one conflict-free system group.
//!
//! Every system in a group only borrows the world immutably and records its
//! mutations into its own [`CommandBuffer`]; the executor applies the
//! buffers afterwards in system-id order. Because no system touches the
//! world mutably here, running a group across threads needs no unsafe
//! aliasing tricks — `SystemGraph`'s conflict analysis already guarantees
//! the group's declared read/write sets don't overlap, which is what makes
//! deferring writes through per-system buffers sound to parallelize.

use crate::command::CommandBuffer;
use crate::error::Result;
use crate::system::{BoxedSystem, SystemId};
use crate::world::World;

pub(crate) type GroupOutcome = (SystemId, CommandBuffer, Result<()>);

fn run_one(id: SystemId, system: &mut BoxedSystem, world: &World) -> GroupOutcome {
    let mut commands = CommandBuffer::new();
    let result = system.run(world, &mut commands);
    (id, commands, result)
}

#[cfg(feature = "parallel")]
pub(crate) fn run_group(slots: &mut [(SystemId, BoxedSystem)], world: &World) -> Vec<GroupOutcome> {
    use rayon::prelude::*;
    slots.par_iter_mut().map(|(id, system)| run_one(*id, system, world)).collect()
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn run_group(slots: &mut [(SystemId, BoxedSystem)], world: &World) -> Vec<GroupOutcome> {
    slots.iter_mut().map(|(id, system)| run_one(*id, system, world)).collect()
}
