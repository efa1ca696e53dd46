//! Pass ordering as a dependency graph.
//!
//! Each pass declares the attachments it reads and writes. A pass may only
//! read an attachment some earlier pass in the same frame wrote. The graph
//! checks the declared order once at startup and the order passes are
//! actually recorded in every frame.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

/// The render passes, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassId {
    DepthPrepass,
    Shadow,
    Geometry,
    Lighting,
    Volumetric,
    Forward,
    Blit,
}

impl PassId {
    pub const ALL: [PassId; 7] = [
        PassId::DepthPrepass,
        PassId::Shadow,
        PassId::Geometry,
        PassId::Lighting,
        PassId::Volumetric,
        PassId::Forward,
        PassId::Blit,
    ];

    /// Debug label shown in GPU captures.
    pub fn label(self) -> &'static str {
        match self {
            PassId::DepthPrepass => "Depth prepass",
            PassId::Shadow => "Shadow",
            PassId::Geometry => "Geometry",
            PassId::Lighting => "Lighting",
            PassId::Volumetric => "Volumetric",
            PassId::Forward => "Forward",
            PassId::Blit => "Blit",
        }
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Images passed between passes within a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attachment {
    SceneDepth,
    ShadowMap,
    GBufferAlbedo,
    GBufferNormal,
    GBufferSpecular,
    GBufferPosition,
    /// Output of the lighting resolve
    LitColor,
    /// Lit colour plus scattering, then transparent geometry
    HdrColor,
    Swapchain,
}

/// Implemented by every pass so the graph can be built from the passes
/// themselves.
pub trait PassIo {
    fn id(&self) -> PassId;
    fn reads(&self) -> &'static [Attachment];
    fn writes(&self) -> &'static [Attachment];
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("{pass} reads {attachment:?} before any earlier pass writes it")]
    MissingProducer { pass: PassId, attachment: Attachment },

    #[error("{0} declared twice")]
    DuplicatePass(PassId),

    #[error("{0} recorded but never declared")]
    Undeclared(PassId),

    #[error("{0} recorded twice in one frame")]
    RecordedTwice(PassId),
}

#[derive(Clone, Debug)]
struct PassNode {
    id: PassId,
    reads: Vec<Attachment>,
    writes: Vec<Attachment>,
}

/// Declared passes plus the current frame's recording progress.
#[derive(Debug, Default)]
pub struct PassGraph {
    nodes: Vec<PassNode>,
    produced: HashSet<Attachment>,
    recorded: Vec<PassId>,
}

impl PassGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pass. Declaration order is the intended execution order.
    pub fn declare(
        &mut self,
        id: PassId,
        reads: &[Attachment],
        writes: &[Attachment],
    ) -> Result<(), GraphError> {
        if self.node(id).is_some() {
            return Err(GraphError::DuplicatePass(id));
        }
        self.nodes.push(PassNode {
            id,
            reads: reads.to_vec(),
            writes: writes.to_vec(),
        });
        Ok(())
    }

    pub fn declare_pass(&mut self, pass: &dyn PassIo) -> Result<(), GraphError> {
        self.declare(pass.id(), pass.reads(), pass.writes())
    }

    /// Checks that the declared order is a topological order.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut produced = HashSet::new();
        for node in &self.nodes {
            Self::check_reads(node, &produced)?;
            produced.extend(node.writes.iter().copied());
        }
        Ok(())
    }

    /// For each pass, the passes it depends on: the most recent earlier
    /// writer of each attachment it reads.
    pub fn dependencies(&self, id: PassId) -> Vec<PassId> {
        let Some(position) = self.nodes.iter().position(|n| n.id == id) else {
            return Vec::new();
        };
        let mut deps: Vec<PassId> = self.nodes[position]
            .reads
            .iter()
            .filter_map(|attachment| {
                self.nodes[..position]
                    .iter()
                    .rev()
                    .find(|n| n.writes.contains(attachment))
                    .map(|n| n.id)
            })
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }

    pub fn order(&self) -> Vec<PassId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    /// Starts tracking a new frame's recording.
    pub fn begin_frame(&mut self) {
        self.produced.clear();
        self.recorded.clear();
    }

    /// Notes that `id` is about to be recorded. Fails if something it reads
    /// has not been produced earlier this frame.
    pub fn record(&mut self, id: PassId) -> Result<(), GraphError> {
        if self.recorded.contains(&id) {
            return Err(GraphError::RecordedTwice(id));
        }
        let node = self.node(id).ok_or(GraphError::Undeclared(id))?;
        Self::check_reads(node, &self.produced)?;
        let writes = node.writes.clone();
        self.produced.extend(writes);
        self.recorded.push(id);
        Ok(())
    }

    /// Passes recorded so far this frame.
    pub fn recorded(&self) -> &[PassId] {
        &self.recorded
    }

    fn node(&self, id: PassId) -> Option<&PassNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn check_reads(node: &PassNode, produced: &HashSet<Attachment>) -> Result<(), GraphError> {
        match node.reads.iter().find(|a| !produced.contains(a)) {
            Some(&attachment) => Err(GraphError::MissingProducer {
                pass: node.id,
                attachment,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Attachment::*;

    fn io(id: PassId) -> (&'static [Attachment], &'static [Attachment]) {
        match id {
            PassId::DepthPrepass => (&[], &[SceneDepth]),
            PassId::Shadow => (&[], &[ShadowMap]),
            PassId::Geometry => (
                &[SceneDepth],
                &[GBufferAlbedo, GBufferNormal, GBufferSpecular, GBufferPosition],
            ),
            PassId::Lighting => (
                &[GBufferAlbedo, GBufferNormal, GBufferSpecular, GBufferPosition, ShadowMap],
                &[LitColor],
            ),
            PassId::Volumetric => (&[LitColor, SceneDepth, ShadowMap], &[HdrColor]),
            PassId::Forward => (&[HdrColor, SceneDepth], &[HdrColor]),
            PassId::Blit => (&[HdrColor], &[Swapchain]),
        }
    }

    fn graph(order: &[PassId]) -> PassGraph {
        let mut graph = PassGraph::new();
        for &id in order {
            let (reads, writes) = io(id);
            graph.declare(id, reads, writes).unwrap();
        }
        graph
    }

    #[test]
    fn test_frame_order_is_topological() {
        let graph = graph(&PassId::ALL);
        assert!(graph.validate().is_ok());
        assert_eq!(graph.order(), PassId::ALL.to_vec());
    }

    #[test]
    fn test_lighting_before_geometry_rejected() {
        let graph = graph(&[
            PassId::DepthPrepass,
            PassId::Shadow,
            PassId::Lighting,
            PassId::Geometry,
        ]);
        assert_eq!(
            graph.validate(),
            Err(GraphError::MissingProducer {
                pass: PassId::Lighting,
                attachment: GBufferAlbedo,
            })
        );
    }

    #[test]
    fn test_dependencies() {
        let graph = graph(&PassId::ALL);
        assert_eq!(
            graph.dependencies(PassId::Lighting),
            vec![PassId::Shadow, PassId::Geometry]
        );
        assert_eq!(
            graph.dependencies(PassId::Volumetric),
            vec![PassId::DepthPrepass, PassId::Shadow, PassId::Lighting]
        );
        // Blit reads the forward pass's in-place result, not the volumetric one.
        assert_eq!(graph.dependencies(PassId::Blit), vec![PassId::Forward]);
        assert!(graph.dependencies(PassId::DepthPrepass).is_empty());
    }

    #[test]
    fn test_every_dependency_precedes_its_consumer() {
        let graph = graph(&PassId::ALL);
        let order = graph.order();
        for (k, &pass) in order.iter().enumerate() {
            for dep in graph.dependencies(pass) {
                let j = order.iter().position(|&p| p == dep).unwrap();
                assert!(j < k, "{dep} must come before {pass}");
            }
        }
    }

    #[test]
    fn test_recording_in_order() {
        let mut graph = graph(&PassId::ALL);
        graph.begin_frame();
        for id in PassId::ALL {
            graph.record(id).unwrap();
        }
        assert_eq!(graph.recorded(), &PassId::ALL);

        // Each frame starts from nothing produced.
        graph.begin_frame();
        assert!(matches!(
            graph.record(PassId::Blit),
            Err(GraphError::MissingProducer { .. })
        ));
    }

    #[test]
    fn test_recording_errors() {
        let mut graph = graph(&[PassId::DepthPrepass]);
        graph.begin_frame();
        graph.record(PassId::DepthPrepass).unwrap();
        assert_eq!(
            graph.record(PassId::DepthPrepass),
            Err(GraphError::RecordedTwice(PassId::DepthPrepass))
        );
        assert_eq!(
            graph.record(PassId::Shadow),
            Err(GraphError::Undeclared(PassId::Shadow))
        );
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut graph = graph(&[PassId::Shadow]);
        assert_eq!(
            graph.declare(PassId::Shadow, &[], &[ShadowMap]),
            Err(GraphError::DuplicatePass(PassId::Shadow))
        );
    }
}
