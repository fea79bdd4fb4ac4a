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

//! Host contract: the thin glue a host game loop calls into.
//!
//! `App` owns the `World` and `Schedule` and exposes exactly the three
//! calls a host needs: one-time startup, a per-frame update, and shutdown.
//! It does not decide when a frame happens — that's the host's loop.

use crate::error::Result;
use crate::executor::Executor;
use crate::schedule::{Schedule, StageId};
use crate::system::BoxedSystem;
use crate::world::World;

pub struct App {
    pub world: World,
    executor: Executor,
    started: bool,
}

impl App {
    pub fn new() -> Self {
        Self { world: World::new(), executor: Executor::new(Schedule::new()), started: false }
    }

    pub fn add_system(&mut self, stage: StageId, system: BoxedSystem) -> &mut Self {
        self.executor.schedule.add_system(stage, system);
        self
    }

    pub fn add_system_before(&mut self, stage: StageId, system: BoxedSystem, before: &str) -> &mut Self {
        self.executor.schedule.add_system_before(stage, system, before);
        self
    }

    pub fn add_system_after(&mut self, stage: StageId, system: BoxedSystem, after: &str) -> &mut Self {
        self.executor.schedule.add_system_after(stage, system, after);
        self
    }

    /// Runs `pre_startup`, `startup`, `post_startup`, once. A second call is
    /// a no-op.
    pub fn call_startup(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.executor.run_startup(&mut self.world)?;
        self.started = true;
        Ok(())
    }

    /// Runs one frame (`first` through `last`), starting up first if this
    /// is the first call.
    pub fn call_update(&mut self) -> Result<()> {
        self.call_startup()?;
        self.executor.run_frame(&mut self.world)
    }

    /// Runs the `shutdown` stage. The host calls this once, when tearing
    /// the application down.
    pub fn call_shutdown(&mut self) -> Result<()> {
        self.executor.run_shutdown(&mut self.world)
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBuffer;
    use crate::system::{System, SystemAccess};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingSystem(Arc<AtomicU32>);
    impl System for CountingSystem {
        fn access(&self) -> SystemAccess {
            SystemAccess::empty()
        }
        fn name(&self) -> &'static str {
            "counting_system"
        }
        fn run(&mut self, _world: &World, _commands: &mut CommandBuffer) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn startup_runs_exactly_once_across_several_updates() {
        let startup_calls = Arc::new(AtomicU32::new(0));
        let mut app = App::new();
        app.add_system(StageId::Startup, Box::new(CountingSystem(startup_calls.clone())));

        app.call_update().unwrap();
        app.call_update().unwrap();
        app.call_update().unwrap();

        assert_eq!(startup_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_runs_frame_systems_every_call() {
        let frame_calls = Arc::new(AtomicU32::new(0));
        let mut app = App::new();
        app.add_system(StageId::Update, Box::new(CountingSystem(frame_calls.clone())));

        app.call_update().unwrap();
        app.call_update().unwrap();

        assert_eq!(frame_calls.load(Ordering::SeqCst), 2);
    }
}
