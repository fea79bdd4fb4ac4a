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

//! Drives a [`Schedule`] through the fixed stage lifecycle.
//!
//! Each stage runs its conflict-free groups in order; within a group every
//! system's deferred commands are applied afterwards in ascending
//! [`SystemId`] order, so a frame's outcome never depends on thread
//! scheduling even when the `parallel` feature runs the group across
//! worker threads.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;
use crate::parallel;
use crate::schedule::{Schedule, StageId};
use crate::system::SystemId;
use crate::world::World;

#[cfg(feature = "profiling")]
use tracing::trace_span;

/// Aggregated timing for one system across every frame it has run in.
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub call_count: u64,
}

/// Per-(stage, system) execution timing, keyed loosely since `SystemId` is
/// only unique within its own stage.
#[derive(Default)]
pub struct SystemProfiler {
    timings: HashMap<(usize, SystemId), Vec<Duration>>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, stage: StageId, id: SystemId, duration: Duration) {
        self.timings.entry((stage.index(), id)).or_default().push(duration);
    }

    pub fn stats(&self, stage: StageId, id: SystemId) -> Option<SystemStats> {
        let timings = self.timings.get(&(stage.index(), id))?;
        if timings.is_empty() {
            return None;
        }
        let min = *timings.iter().min().unwrap();
        let max = *timings.iter().max().unwrap();
        let avg = timings.iter().sum::<Duration>() / timings.len() as u32;
        Some(SystemStats { min, max, avg, call_count: timings.len() as u64 })
    }

    pub fn clear(&mut self) {
        self.timings.clear();
    }
}

/// Runs a [`Schedule`]'s stages against a [`World`].
pub struct Executor {
    pub schedule: Schedule,
    pub profiler: SystemProfiler,
}

impl Executor {
    pub fn new(schedule: Schedule) -> Self {
        Self { schedule, profiler: SystemProfiler::new() }
    }

    /// Runs every group of one stage, applying each group's deferred
    /// commands before moving to the next.
    pub fn run_stage(&mut self, stage: StageId, world: &mut World) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = trace_span!("stage", name = stage.name()).entered();

        let stage_schedule = self.schedule.stage_mut(stage);
        stage_schedule.ensure_built()?;
        let group_count = stage_schedule.groups().len();

        for group_idx in 0..group_count {
            let ids: Vec<SystemId> = {
                let stage_schedule = self.schedule.stage_mut(stage);
                stage_schedule.groups()[group_idx].systems.clone()
            };
            let mut slots: Vec<(SystemId, _)> = ids
                .iter()
                .map(|&id| (id, self.schedule.stage_mut(stage).take_system(id)))
                .collect();

            let started = std::time::Instant::now();
            let outcomes = parallel::run_group(&mut slots, world);
            let elapsed = started.elapsed();

            for (id, system) in slots {
                self.schedule.stage_mut(stage).put_system(id, system);
            }

            let mut sorted = outcomes;
            sorted.sort_by_key(|(id, _, _)| id.0);

            let mut first_err = None;
            for (id, mut commands, run_result) in sorted {
                self.profiler.record(stage, id, elapsed);
                if let Err(e) = run_result {
                    first_err.get_or_insert(e);
                }
                if let Err(e) = commands.apply(world) {
                    first_err.get_or_insert(e);
                }
            }
            if let Some(e) = first_err {
                return Err(e);
            }
        }

        Ok(())
    }

    /// Runs the one-time startup stages, in order.
    pub fn run_startup(&mut self, world: &mut World) -> Result<()> {
        for &stage in &StageId::STARTUP {
            self.run_stage(stage, world)?;
        }
        Ok(())
    }

    /// Runs the per-frame stages, in order.
    pub fn run_frame(&mut self, world: &mut World) -> Result<()> {
        for &stage in &StageId::FRAME {
            self.run_stage(stage, world)?;
        }
        Ok(())
    }

    /// Runs the shutdown stage.
    pub fn run_shutdown(&mut self, world: &mut World) -> Result<()> {
        self.run_stage(StageId::Shutdown, world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBuffer;
    use crate::system::{System, SystemAccess};

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position {
        x: f32,
    }

    struct Spawner;
    impl System for Spawner {
        fn access(&self) -> SystemAccess {
            SystemAccess::empty()
        }
        fn name(&self) -> &'static str {
            "spawner"
        }
        fn run(&mut self, _world: &World, commands: &mut CommandBuffer) -> Result<()> {
            commands.spawn_with((Position { x: 1.0 },));
            Ok(())
        }
    }

    #[test]
    fn stage_applies_deferred_spawns() {
        let mut world = World::new();
        let mut schedule = Schedule::new();
        schedule.add_system(StageId::Update, Box::new(Spawner));
        let mut executor = Executor::new(schedule);
        executor.run_stage(StageId::Update, &mut world).unwrap();
        assert_eq!(world.query::<&Position, ()>().count(), 1);
    }

    #[test]
    fn startup_runs_before_frame_stages_without_error() {
        let mut world = World::new();
        let schedule = Schedule::new();
        let mut executor = Executor::new(schedule);
        executor.run_startup(&mut world).unwrap();
        executor.run_frame(&mut world).unwrap();
        executor.run_shutdown(&mut world).unwrap();
    }
}
