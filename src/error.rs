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

//! Error types

use std::fmt;

/// Core ECS error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Operation targeted an entity whose handle does not match the
    /// directory: freed, never allocated, or a stale generation.
    InvalidEntity,

    /// `remove_components` targeted a component the entity does not carry.
    /// The entity itself was alive, otherwise `InvalidEntity` applies.
    MissingComponent,

    /// Two distinct component types hashed to the same 32-bit type hash.
    HashCollision,

    /// A column or auxiliary allocation failed. Structural operations that
    /// hit this leave the world in its pre-operation state.
    AllocationFailure,

    /// A user component's constructor panicked during relocation or
    /// migration.
    ConstructorThrew,

    /// A system dependency graph contains a cycle.
    SystemCycleDetected,

    /// The named stage does not exist in the fixed lifecycle.
    StageNotFound,

    /// A named system does not exist in the schedule.
    SystemNotFound,

    /// A command buffer referenced a future-entity handle that was never
    /// resolved; its defining spawn command never ran in this buffer.
    UnresolvedFutureEntity,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidEntity => write!(f, "invalid or dead entity handle"),
            Error::MissingComponent => write!(f, "entity does not have the requested component"),
            Error::HashCollision => write!(f, "two component types share the same type hash"),
            Error::AllocationFailure => write!(f, "archetype column allocation failed"),
            Error::ConstructorThrew => write!(f, "component constructor panicked during relocation"),
            Error::SystemCycleDetected => write!(f, "system dependency cycle detected"),
            Error::StageNotFound => write!(f, "stage not found in the scheduler"),
            Error::SystemNotFound => write!(f, "system not found in the schedule"),
            Error::UnresolvedFutureEntity => {
                write!(f, "future-entity handle referenced before its spawn command ran")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
