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

//! Stage-scheduler contract: a fixed lifecycle of stages, each holding an
//! intra-stage dependency DAG that groups systems into conflict-free,
//! parallelizable batches via topological sort.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::system::{BoxedSystem, System, SystemAccess, SystemId};

/// The fixed set of points in the frame lifecycle a system can run at,
/// in their execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(usize)]
pub enum StageId {
    PreStartup = 0,
    Startup = 1,
    PostStartup = 2,
    First = 3,
    PreUpdate = 4,
    Update = 5,
    PostUpdate = 6,
    Render = 7,
    Last = 8,
    Shutdown = 9,
}

impl StageId {
    pub const ALL: [StageId; 10] = [
        StageId::PreStartup,
        StageId::Startup,
        StageId::PostStartup,
        StageId::First,
        StageId::PreUpdate,
        StageId::Update,
        StageId::PostUpdate,
        StageId::Render,
        StageId::Last,
        StageId::Shutdown,
    ];

    /// Stages run once, before the first frame.
    pub const STARTUP: [StageId; 3] = [StageId::PreStartup, StageId::Startup, StageId::PostStartup];

    /// Stages run once per frame, in order.
    pub const FRAME: [StageId; 6] = [
        StageId::First,
        StageId::PreUpdate,
        StageId::Update,
        StageId::PostUpdate,
        StageId::Render,
        StageId::Last,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            StageId::PreStartup => "pre_startup",
            StageId::Startup => "startup",
            StageId::PostStartup => "post_startup",
            StageId::First => "first",
            StageId::PreUpdate => "pre_update",
            StageId::Update => "update",
            StageId::PostUpdate => "post_update",
            StageId::Render => "render",
            StageId::Last => "last",
            StageId::Shutdown => "shutdown",
        }
    }
}

/// A `before`/`after` name-based ordering request recorded against a system
/// at registration time.
#[derive(Debug, Clone, Default)]
struct OrderingConstraint {
    before: Vec<String>,
    after: Vec<String>,
}

#[derive(Debug, Clone)]
struct SystemNode {
    id: SystemId,
    access: SystemAccess,
}

/// Intra-stage dependency graph: explicit `before`/`after` edges plus an
/// implicit edge for every declared access conflict between an
/// earlier-registered and a later-registered system, so two systems that
/// touch the same component never land in the same parallel group even
/// without an explicit ordering constraint.
struct SystemGraph {
    nodes: Vec<SystemNode>,
    edges: FxHashMap<SystemId, Vec<SystemId>>,
    reverse_edges: FxHashMap<SystemId, Vec<SystemId>>,
}

impl SystemGraph {
    fn build(systems: &[(String, SystemAccess)], constraints: &[OrderingConstraint]) -> Self {
        let mut nodes = Vec::with_capacity(systems.len());
        let mut edges: FxHashMap<SystemId, Vec<SystemId>> = FxHashMap::default();
        let mut reverse_edges: FxHashMap<SystemId, Vec<SystemId>> = FxHashMap::default();
        let name_index: FxHashMap<&str, usize> = systems
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.as_str(), i))
            .collect();

        for (i, (_, access)) in systems.iter().enumerate() {
            let id = SystemId(i as u32);
            nodes.push(SystemNode { id, access: access.clone() });
            edges.insert(id, Vec::new());
            reverse_edges.insert(id, Vec::new());
        }

        let mut add_edge = |from: usize, to: usize| {
            if from == to {
                return;
            }
            let from_id = SystemId(from as u32);
            let to_id = SystemId(to as u32);
            let out = edges.get_mut(&from_id).unwrap();
            if !out.contains(&to_id) {
                out.push(to_id);
                reverse_edges.get_mut(&to_id).unwrap().push(from_id);
            }
        };

        for (i, constraint) in constraints.iter().enumerate() {
            for before in &constraint.before {
                if let Some(&j) = name_index.get(before.as_str()) {
                    add_edge(i, j);
                }
            }
            for after in &constraint.after {
                if let Some(&j) = name_index.get(after.as_str()) {
                    add_edge(j, i);
                }
            }
        }

        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                if nodes[i].access.conflicts_with(&nodes[j].access) {
                    add_edge(i, j);
                }
            }
        }

        Self { nodes, edges, reverse_edges }
    }

    fn topological_sort(&self) -> Result<Vec<SystemId>> {
        let mut in_degree: FxHashMap<SystemId, usize> = FxHashMap::default();
        let mut queue = VecDeque::new();
        let mut result = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            in_degree.insert(node.id, self.reverse_edges.get(&node.id).map_or(0, |v| v.len()));
        }
        for node in &self.nodes {
            if in_degree[&node.id] == 0 {
                queue.push_back(node.id);
            }
        }

        while let Some(id) = queue.pop_front() {
            result.push(id);
            if let Some(neighbors) = self.edges.get(&id) {
                for &neighbor in neighbors {
                    let degree = in_degree.get_mut(&neighbor).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            return Err(Error::SystemCycleDetected);
        }
        Ok(result)
    }
}

/// A batch of systems with no access conflicts among them; an executor may
/// run every system in a group on a separate worker thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct Group {
    pub systems: Vec<SystemId>,
}

impl Group {
    fn try_add(&mut self, system_id: SystemId, access: &SystemAccess, graph: &SystemGraph) -> bool {
        for &existing_id in &self.systems {
            let existing = graph.nodes.iter().find(|n| n.id == existing_id).unwrap();
            if access.conflicts_with(&existing.access) {
                return false;
            }
        }
        self.systems.push(system_id);
        true
    }
}

/// Per-stage system registry: the systems assigned to one [`StageId`] plus
/// their cached group plan.
#[derive(Default)]
pub(crate) struct StageSchedule {
    names: Vec<String>,
    systems: Vec<Option<BoxedSystem>>,
    constraints: Vec<OrderingConstraint>,
    groups: Vec<Group>,
    dirty: bool,
}

impl StageSchedule {
    fn add(&mut self, system: BoxedSystem) -> SystemId {
        let id = SystemId(self.systems.len() as u32);
        self.names.push(system.name().to_string());
        self.systems.push(Some(system));
        self.constraints.push(OrderingConstraint::default());
        self.dirty = true;
        id
    }

    fn add_before(&mut self, system: BoxedSystem, before: &str) -> SystemId {
        let id = self.add(system);
        self.constraints[id.0 as usize].before.push(before.to_string());
        self.dirty = true;
        id
    }

    fn add_after(&mut self, system: BoxedSystem, after: &str) -> SystemId {
        let id = self.add(system);
        self.constraints[id.0 as usize].after.push(after.to_string());
        self.dirty = true;
        id
    }

    fn rebuild(&mut self) -> Result<()> {
        let descriptors: Vec<(String, SystemAccess)> = self
            .names
            .iter()
            .zip(self.systems.iter())
            .map(|(name, system)| {
                let access = system.as_ref().expect("system taken during rebuild").access();
                (name.clone(), access)
            })
            .collect();

        let graph = SystemGraph::build(&descriptors, &self.constraints);
        let sorted = graph.topological_sort()?;

        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        for system_id in sorted {
            let node = graph.nodes.iter().find(|n| n.id == system_id).unwrap();
            if !current.try_add(system_id, &node.access, &graph) {
                if !current.systems.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
                current.systems.push(system_id);
            }
        }
        if !current.systems.is_empty() {
            groups.push(current);
        }

        self.groups = groups;
        self.dirty = false;
        Ok(())
    }

    pub(crate) fn ensure_built(&mut self) -> Result<()> {
        if self.dirty {
            self.rebuild()?;
        }
        Ok(())
    }

    pub(crate) fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub(crate) fn take_system(&mut self, id: SystemId) -> BoxedSystem {
        self.systems[id.0 as usize].take().expect("system slot already taken")
    }

    pub(crate) fn put_system(&mut self, id: SystemId, system: BoxedSystem) {
        self.systems[id.0 as usize] = Some(system);
    }

    pub fn get_system_mut(&mut self, name: &str) -> Option<&mut (dyn System + 'static)> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.systems[idx].as_deref_mut()
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn group_count(&mut self) -> Result<usize> {
        self.ensure_built()?;
        Ok(self.groups.len())
    }
}

/// The full, fixed-lifecycle schedule: one [`StageSchedule`] per [`StageId`].
pub struct Schedule {
    stages: [StageSchedule; 10],
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self { stages: std::array::from_fn(|_| StageSchedule::default()) }
    }

    pub fn add_system(&mut self, stage: StageId, system: BoxedSystem) -> SystemId {
        self.stages[stage.index()].add(system)
    }

    pub fn add_system_before(&mut self, stage: StageId, system: BoxedSystem, before: &str) -> SystemId {
        self.stages[stage.index()].add_before(system, before)
    }

    pub fn add_system_after(&mut self, stage: StageId, system: BoxedSystem, after: &str) -> SystemId {
        self.stages[stage.index()].add_after(system, after)
    }

    pub fn get_system_mut(&mut self, stage: StageId, name: &str) -> Option<&mut (dyn System + 'static)> {
        self.stages[stage.index()].get_system_mut(name)
    }

    pub fn system_count(&self, stage: StageId) -> usize {
        self.stages[stage.index()].system_count()
    }

    pub(crate) fn stage_mut(&mut self, stage: StageId) -> &mut StageSchedule {
        &mut self.stages[stage.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBuffer;
    use crate::world::World;

    struct Named {
        name: &'static str,
        access: SystemAccess,
    }

    impl System for Named {
        fn access(&self) -> SystemAccess {
            self.access.clone()
        }
        fn name(&self) -> &'static str {
            self.name
        }
        fn run(&mut self, _world: &World, _commands: &mut CommandBuffer) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn disjoint_systems_share_one_group() {
        let mut schedule = Schedule::new();
        schedule.add_system(
            StageId::Update,
            Box::new(Named { name: "a", access: SystemAccess::empty().writing::<i32>() }),
        );
        schedule.add_system(
            StageId::Update,
            Box::new(Named { name: "b", access: SystemAccess::empty().writing::<f32>() }),
        );
        let stage = schedule.stage_mut(StageId::Update);
        assert_eq!(stage.group_count().unwrap(), 1);
    }

    #[test]
    fn conflicting_systems_land_in_separate_groups() {
        let mut schedule = Schedule::new();
        schedule.add_system(
            StageId::Update,
            Box::new(Named { name: "a", access: SystemAccess::empty().writing::<i32>() }),
        );
        schedule.add_system(
            StageId::Update,
            Box::new(Named { name: "b", access: SystemAccess::empty().writing::<i32>() }),
        );
        let stage = schedule.stage_mut(StageId::Update);
        assert_eq!(stage.group_count().unwrap(), 2);
    }

    #[test]
    fn explicit_before_constraint_orders_disjoint_systems() {
        let mut schedule = Schedule::new();
        schedule.add_system(
            StageId::Update,
            Box::new(Named { name: "a", access: SystemAccess::empty() }),
        );
        schedule.add_system_before(
            StageId::Update,
            Box::new(Named { name: "b", access: SystemAccess::empty() }),
            "a",
        );
        let stage = schedule.stage_mut(StageId::Update);
        stage.ensure_built().unwrap();
        // b must come before a even though they don't conflict.
        let b_group = stage.groups.iter().position(|g| g.systems.contains(&SystemId(1))).unwrap();
        let a_group = stage.groups.iter().position(|g| g.systems.contains(&SystemId(0))).unwrap();
        assert!(b_group <= a_group);
    }

    #[test]
    fn cycle_is_detected() {
        let mut schedule = Schedule::new();
        schedule.add_system_before(
            StageId::Update,
            Box::new(Named { name: "a", access: SystemAccess::empty() }),
            "b",
        );
        schedule.add_system_before(
            StageId::Update,
            Box::new(Named { name: "b", access: SystemAccess::empty() }),
            "a",
        );
        let stage = schedule.stage_mut(StageId::Update);
        assert_eq!(stage.ensure_built(), Err(Error::SystemCycleDetected));
    }

    #[test]
    fn stage_ids_are_ordered() {
        assert!(StageId::PreStartup < StageId::Startup);
        assert!(StageId::Update < StageId::Render);
        assert!(StageId::Last < StageId::Shutdown);
    }
}
