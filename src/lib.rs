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

//! loom_ecs - an archetype-based Entity Component System core.
//!
//! Entities are packed `(generation, index)` handles recycled through a
//! min-priority free list. Components live in per-archetype
//! structure-of-arrays column storage, keyed by the sorted 64-bit FNV hash
//! of their type signature. Structural changes migrate a row between
//! archetypes via a cached transition table. Queries run over a `Filter` +
//! `Fetch` split, and a fixed-stage scheduler drives systems through a
//! conflict-free, optionally rayon-parallel intra-stage execution plan.

pub mod archetype;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod hash;
pub mod query;
pub mod utils;
pub mod world;

pub mod app;
pub mod executor;
pub mod parallel;
pub mod schedule;
pub mod system;

pub mod prelude;

pub use app::App;
pub use archetype::Archetype;
pub use command::{CommandBuffer, EntityRef, FutureEntity};
pub use component::{Bundle, Component, TypeDescriptor};
pub use entity::EntityId;
pub use error::{Error, Result};
pub use executor::{Executor, SystemProfiler};
pub use query::{Any, Fetch, Filter, With, Without};
pub use schedule::{Schedule, StageId};
pub use system::{BoxedSystem, System, SystemAccess, SystemId};
pub use world::World;
