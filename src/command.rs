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

//! Deferred command buffers.
//!
//! A [`CommandBuffer`] records world mutations as boxed closures instead of
//! applying them immediately, so they can be recorded from inside a system
//! that only borrows the world immutably and applied later at a stage
//! boundary. [`FutureEntity`] lets a buffer spawn an entity and reference it
//! in later commands within the same buffer, before the spawn has actually
//! run against a `World`.

use crate::component::Bundle;
use crate::entity::EntityId;
use crate::error::{Error, Result};
use crate::world::World;

/// A placeholder for an entity that a [`CommandBuffer`] has not spawned
/// yet. Wraps an in-frame counter local to the buffer that created it; it
/// is not an [`EntityId`] and cannot be used to address a `World` directly
/// — it only resolves once the buffer that produced it is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FutureEntity(u32);

/// Either a real entity or a same-buffer future entity. Commands recorded
/// against a `FutureEntity` are resolved to the real spawned `EntityId`
/// when the buffer is applied.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef {
    Real(EntityId),
    Future(FutureEntity),
}

impl From<EntityId> for EntityRef {
    fn from(e: EntityId) -> Self {
        EntityRef::Real(e)
    }
}

impl From<FutureEntity> for EntityRef {
    fn from(f: FutureEntity) -> Self {
        EntityRef::Future(f)
    }
}

type SpawnClosure = Box<dyn FnOnce(&mut World) -> Result<EntityId> + Send>;
type MutateClosure = Box<dyn FnOnce(&mut World, EntityId) -> Result<()> + Send>;

enum Command {
    Spawn { future: u32, exec: SpawnClosure },
    Mutate { target: EntityRef, exec: MutateClosure },
    Kill { target: EntityRef },
}

/// A deferred log of world mutations, applied later with [`CommandBuffer::apply`].
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    next_future: u32,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        CommandBuffer {
            commands: Vec::with_capacity(capacity),
            next_future: 0,
        }
    }

    /// Records a spawn of `B`'s default values, returning a handle other
    /// commands in this buffer can reference before it actually runs.
    pub fn spawn<B: Bundle + Default>(&mut self) -> FutureEntity {
        self.spawn_with(B::default())
    }

    /// Records a spawn carrying `bundle`'s values.
    pub fn spawn_with<B: Bundle>(&mut self, bundle: B) -> FutureEntity {
        let future = self.next_future;
        self.next_future += 1;
        self.commands.push(Command::Spawn {
            future,
            exec: Box::new(move |world| world.spawn_with(bundle)),
        });
        FutureEntity(future)
    }

    /// Records adding `B`'s default values to `entity`.
    pub fn add_components<B: Bundle + Default>(&mut self, entity: impl Into<EntityRef>) {
        self.add_components_with(entity, B::default());
    }

    /// Records adding `bundle`'s values to `entity`.
    pub fn add_components_with<B: Bundle>(&mut self, entity: impl Into<EntityRef>, bundle: B) {
        self.commands.push(Command::Mutate {
            target: entity.into(),
            exec: Box::new(move |world, e| world.add_components_with(e, bundle)),
        });
    }

    /// Records removing `B`'s component types from `entity`.
    pub fn remove_components<B: Bundle>(&mut self, entity: impl Into<EntityRef>) {
        self.commands.push(Command::Mutate {
            target: entity.into(),
            exec: Box::new(|world, e| world.remove_components::<B>(e)),
        });
    }

    /// Records a custom world mutation applied to the resolved entity.
    pub fn add<F>(&mut self, entity: impl Into<EntityRef>, f: F)
    where
        F: FnOnce(&mut World, EntityId) -> Result<()> + Send + 'static,
    {
        self.commands.push(Command::Mutate {
            target: entity.into(),
            exec: Box::new(f),
        });
    }

    /// Records destroying `entity`.
    pub fn kill(&mut self, entity: impl Into<EntityRef>) {
        self.commands.push(Command::Kill { target: entity.into() });
    }

    /// Applies every recorded command to `world`, in recorded order, then
    /// clears the buffer (retaining its allocated storage). A command that
    /// fails aborts the remaining commands in this buffer; other buffers
    /// are unaffected.
    pub fn apply(&mut self, world: &mut World) -> Result<()> {
        let mut resolved: Vec<Option<EntityId>> = vec![None; self.next_future as usize];
        for command in self.commands.drain(..) {
            match command {
                Command::Spawn { future, exec } => {
                    let entity = exec(world)?;
                    resolved[future as usize] = Some(entity);
                }
                Command::Mutate { target, exec } => {
                    let entity = resolve(target, &resolved)?;
                    exec(world, entity)?;
                }
                Command::Kill { target } => {
                    let entity = resolve(target, &resolved)?;
                    world.kill(entity)?;
                }
            }
        }
        self.next_future = 0;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Clears the buffer, retaining its allocated storage.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.next_future = 0;
    }
}

fn resolve(target: EntityRef, resolved: &[Option<EntityId>]) -> Result<EntityId> {
    match target {
        EntityRef::Real(e) => Ok(e),
        EntityRef::Future(f) => resolved
            .get(f.0 as usize)
            .copied()
            .flatten()
            .ok_or(Error::UnresolvedFutureEntity),
    }
}

/// Applies a set of command buffers to `world` in a fixed, deterministic
/// order keyed by `worker_id` rather than buffer arrival order, so a
/// multi-threaded frame drains identically on every run. A buffer whose
/// drain fails does not stop the others from draining; the first error
/// seen is returned after every buffer has had a chance to apply.
pub fn apply_all(world: &mut World, buffers: &mut [(u64, &mut CommandBuffer)]) -> Result<()> {
    buffers.sort_by_key(|(worker_id, _)| *worker_id);
    let mut first_err = None;
    for (_, buffer) in buffers.iter_mut() {
        if let Err(e) = buffer.apply(world) {
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
