//! Dirty-gated full rebuild of the top-level acceleration structure.
//!
//! ```text
//! Idle --activation changed--> Dirty --active set non-empty--> Rebuilding --submitted--> Idle
//!                              Dirty --active set empty------> Idle (previous structure kept)
//! ```
//!
//! The ray-tracing stage of the previous frame may still read the structure, so
//! the build is bracketed by an execution barrier in front and a memory barrier
//! behind it. The submission is not waited for; it is handed to a
//! [`FrameLifetime`] which keeps it alive as long as frames are in flight.

use std::collections::VecDeque;

use crate::{
    data_structures::instance::GeometryInstance,
    error::GpuError,
    gpu::{Access, Barrier, Command, Gpu, Stage},
    scene::registry::SceneRegistry,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RebuildState {
    #[default]
    Idle,
    Dirty,
    Rebuilding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Nothing changed since the last rebuild.
    Unchanged,
    /// The active set changed but is empty; the previous structure stays bound.
    SkippedEmpty,
    Submitted { instance_count: usize },
}

/// Receives the submission of each rebuild.
pub trait FrameLifetime<S> {
    fn handle_lifetime(&mut self, submission: S);
}

/// Keeps the submissions of the last `frames_in_flight` rebuilds.
#[derive(Debug)]
pub struct InFlightFrames<S> {
    submissions: VecDeque<S>,
    frames_in_flight: usize,
}

impl<S> InFlightFrames<S> {
    pub fn new(frames_in_flight: usize) -> Self {
        let frames_in_flight = frames_in_flight.max(1);
        Self {
            submissions: VecDeque::with_capacity(frames_in_flight + 1),
            frames_in_flight,
        }
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }

    pub fn latest(&self) -> Option<&S> {
        self.submissions.back()
    }
}

impl<S> FrameLifetime<S> for InFlightFrames<S> {
    fn handle_lifetime(&mut self, submission: S) {
        self.submissions.push_back(submission);
        while self.submissions.len() > self.frames_in_flight {
            self.submissions.pop_front();
        }
    }
}

/// The ordered commands of one full rebuild.
pub fn rebuild_commands<'a, G: Gpu>(
    tlas: &'a mut G::Tlas,
    instances: Vec<GeometryInstance<G>>,
) -> Vec<Command<'a, G>> {
    vec![
        // The previous frame's ray tracing must be done reading before the build writes
        Command::Barrier(Barrier::execution(
            Stage::RayTracingShader,
            Stage::AccelerationStructureBuild,
        )),
        Command::BuildTlas { tlas, instances },
        Command::Barrier(Barrier::memory(
            (Stage::AccelerationStructureBuild, Access::AccelerationStructureWrite),
            (Stage::RayTracingShader, Access::AccelerationStructureRead),
        )),
    ]
}

#[derive(Debug, Default)]
pub struct RebuildProtocol {
    state: RebuildState,
}

impl RebuildProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RebuildState {
        self.state
    }

    /// `Idle -> Dirty` when the registry reports a changed active set.
    pub fn observe<G: Gpu>(&mut self, registry: &SceneRegistry<G>) -> RebuildState {
        if self.state == RebuildState::Idle && registry.has_updated_geometry() {
            self.state = RebuildState::Dirty;
        }
        self.state
    }

    /// `Dirty -> Rebuilding` with the instances to build from, or `Dirty -> Idle`
    /// when nothing is active.
    pub fn take_work<G: Gpu>(
        &mut self,
        registry: &mut SceneRegistry<G>,
    ) -> Option<Vec<GeometryInstance<G>>> {
        if self.state != RebuildState::Dirty {
            return None;
        }
        match registry.materialize_active_set() {
            Some(instances) if !instances.is_empty() => {
                self.state = RebuildState::Rebuilding;
                Some(instances)
            }
            _ => {
                self.state = RebuildState::Idle;
                None
            }
        }
    }

    /// `Rebuilding -> Idle`.
    pub fn finish(&mut self) {
        assert_eq!(
            self.state,
            RebuildState::Rebuilding,
            "finish without a rebuild in progress"
        );
        self.state = RebuildState::Idle;
    }

    /// Runs one frame's worth of the protocol.
    pub fn update<G, F>(
        &mut self,
        gpu: &G,
        registry: &mut SceneRegistry<G>,
        tlas: &mut G::Tlas,
        frames: &mut F,
    ) -> Result<RebuildOutcome, GpuError>
    where
        G: Gpu,
        F: FrameLifetime<G::Submission>,
    {
        if self.observe(registry) == RebuildState::Idle {
            return Ok(RebuildOutcome::Unchanged);
        }
        let Some(instances) = self.take_work(registry) else {
            log::debug!("active set is empty, keeping the previous top-level structure");
            return Ok(RebuildOutcome::SkippedEmpty);
        };

        let instance_count = instances.len();
        log::trace!("rebuilding top-level structure from {instance_count} instances");
        let submitted = gpu.submit(rebuild_commands(tlas, instances));
        // Either way there is no rebuild in progress any more
        self.finish();
        frames.handle_lifetime(submitted?);
        Ok(RebuildOutcome::Submitted { instance_count })
    }
}
