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

//! Convenient re-exports of commonly used types.
//!
//! ```
//! use loom_ecs::prelude::*;
//! ```

pub use crate::app::App;
pub use crate::command::{CommandBuffer, EntityRef, FutureEntity};
pub use crate::component::{Bundle, Component};
pub use crate::entity::EntityId;
pub use crate::error::{Error, Result};
pub use crate::executor::Executor;
pub use crate::query::{Any, Fetch, Filter, With, Without};
pub use crate::schedule::{Schedule, StageId};
pub use crate::system::{System, SystemAccess};
pub use crate::world::World;
