//! Render pass graph.
//!
//! Passes declare the attachments they touch and how ([`Access`]); ordering
//! between passes is declared explicitly with
//! [`GraphBuilder::add_dependency`]. [`GraphBuilder::compile`] checks that
//! every hazard on a shared resource is covered by a declared edge, orders
//! the passes, and derives the image barriers each pass needs.
//!
//! ```text
//!   shadow ──(shadow_map: depth write → sampled read)──▶ scene ──▶ ui ──▶ present
//! ```
//!
//! Barrier derivation tracks one state per resource. A resource enters the
//! frame in the state its last access of the previous frame left it in, so
//! the first pass of frame `k + 1` is ordered after the last use in frame `k`.
//! An access that clears the attachment transitions from `UNDEFINED`.
//!
//! Recording is abstracted by [`PassRecorder`], so ordering and barriers are
//! testable without a device.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use ash::vk;
use tracing::debug;

use vkdemo_rhi::{RhiError, RhiResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(usize);

impl PassId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Color,
    Depth,
}

impl ResourceKind {
    pub fn aspect(self) -> vk::ImageAspectFlags {
        match self {
            Self::Color => vk::ImageAspectFlags::COLOR,
            Self::Depth => vk::ImageAspectFlags::DEPTH,
        }
    }
}

/// How a pass uses an attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Cleared and written as the depth attachment.
    DepthAttachmentWrite,
    /// Cleared and written as a color attachment.
    ColorAttachmentWrite,
    /// Loaded and written as a color attachment (overlays).
    ColorAttachmentLoad,
    /// Sampled from a fragment shader.
    ShaderSampledRead,
    /// Handed to the presentation engine after the last pass.
    Present,
}

impl Access {
    pub fn stages(self) -> vk::PipelineStageFlags2 {
        match self {
            Self::DepthAttachmentWrite => {
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
            }
            Self::ColorAttachmentWrite | Self::ColorAttachmentLoad | Self::Present => {
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
            }
            Self::ShaderSampledRead => vk::PipelineStageFlags2::FRAGMENT_SHADER,
        }
    }

    /// Every memory access the use performs.
    pub fn access_flags(self) -> vk::AccessFlags2 {
        match self {
            Self::DepthAttachmentWrite => {
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            Self::ColorAttachmentWrite => vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            Self::ColorAttachmentLoad => {
                vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
            }
            Self::ShaderSampledRead => vk::AccessFlags2::SHADER_SAMPLED_READ,
            Self::Present => vk::AccessFlags2::NONE,
        }
    }

    /// The writes a later use must wait on; reads need no availability.
    pub fn write_flags(self) -> vk::AccessFlags2 {
        match self {
            Self::DepthAttachmentWrite => vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            Self::ColorAttachmentWrite | Self::ColorAttachmentLoad => {
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
            }
            Self::ShaderSampledRead | Self::Present => vk::AccessFlags2::NONE,
        }
    }

    pub fn layout(self, kind: ResourceKind) -> vk::ImageLayout {
        match (self, kind) {
            (Self::DepthAttachmentWrite, _) => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            (Self::ColorAttachmentWrite | Self::ColorAttachmentLoad, _) => {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            }
            (Self::ShaderSampledRead, ResourceKind::Depth) => {
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            }
            (Self::ShaderSampledRead, ResourceKind::Color) => {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            }
            (Self::Present, _) => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::DepthAttachmentWrite | Self::ColorAttachmentWrite | Self::ColorAttachmentLoad
        )
    }

    /// Whether the use clears the previous contents.
    pub fn discards(self) -> bool {
        matches!(self, Self::DepthAttachmentWrite | Self::ColorAttachmentWrite)
    }

    pub fn is_attachment(self) -> bool {
        self.is_write()
    }

    fn valid_for(self, kind: ResourceKind) -> bool {
        match self {
            Self::DepthAttachmentWrite => kind == ResourceKind::Depth,
            Self::ColorAttachmentWrite | Self::ColorAttachmentLoad | Self::Present => {
                kind == ResourceKind::Color
            }
            Self::ShaderSampledRead => true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResourceInfo {
    pub name: String,
    pub kind: ResourceKind,
}

/// A pass as declared by its owner.
#[derive(Clone, Debug)]
pub struct PassDesc {
    name: String,
    accesses: Vec<(ResourceId, Access)>,
}

impl PassDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accesses: Vec::new(),
        }
    }

    pub fn access(mut self, resource: ResourceId, access: Access) -> Self {
        self.accesses.push((resource, access));
        self
    }
}

/// Collects resources, passes and ordering edges for one frame.
#[derive(Default)]
pub struct GraphBuilder {
    resources: Vec<ResourceInfo>,
    passes: Vec<PassDesc>,
    edges: Vec<(PassId, PassId)>,
    exports: Vec<(ResourceId, Access)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(&mut self, name: impl Into<String>, kind: ResourceKind) -> ResourceId {
        self.resources.push(ResourceInfo {
            name: name.into(),
            kind,
        });
        ResourceId(self.resources.len() - 1)
    }

    pub fn add_pass(&mut self, pass: PassDesc) -> PassId {
        self.passes.push(pass);
        PassId(self.passes.len() - 1)
    }

    /// `before` must finish its accesses before `after` starts.
    pub fn add_dependency(&mut self, before: PassId, after: PassId) {
        self.edges.push((before, after));
    }

    /// Leave `resource` in the state `access` requires at the end of the frame.
    pub fn export(&mut self, resource: ResourceId, access: Access) {
        self.exports.push((resource, access));
    }

    pub fn compile(self) -> RhiResult<RenderGraph> {
        self.validate()?;
        let order = self.topological_order()?;
        let ancestors = self.ancestors(&order);
        self.check_hazards(&ancestors)?;
        let graph = self.derive_barriers(order);
        debug!(
            passes = ?graph.passes.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            dependencies = graph.dependencies.len(),
            "Render graph compiled"
        );
        Ok(graph)
    }

    fn resource_info(&self, id: ResourceId) -> RhiResult<&ResourceInfo> {
        self.resources
            .get(id.0)
            .ok_or_else(|| RhiError::InvalidPassDependency(format!("unknown resource {id:?}")))
    }

    fn validate(&self) -> RhiResult<()> {
        for pass in &self.passes {
            let mut seen = HashSet::new();
            for &(resource, access) in &pass.accesses {
                let info = self.resource_info(resource)?;
                if !access.valid_for(info.kind) || access == Access::Present {
                    return Err(RhiError::InvalidPassDependency(format!(
                        "pass '{}' cannot use {:?} resource '{}' as {access:?}",
                        pass.name, info.kind, info.name
                    )));
                }
                if !seen.insert(resource) {
                    return Err(RhiError::InvalidPassDependency(format!(
                        "pass '{}' uses '{}' more than once",
                        pass.name, info.name
                    )));
                }
            }
        }
        for &(before, after) in &self.edges {
            if before.0 >= self.passes.len() || after.0 >= self.passes.len() {
                return Err(RhiError::InvalidPassDependency(format!(
                    "edge {before:?} -> {after:?} names an unknown pass"
                )));
            }
            if before == after {
                return Err(RhiError::InvalidPassDependency(format!(
                    "pass '{}' cannot depend on itself",
                    self.passes[before.0].name
                )));
            }
        }
        for &(resource, access) in &self.exports {
            let info = self.resource_info(resource)?;
            if !access.valid_for(info.kind) {
                return Err(RhiError::InvalidPassDependency(format!(
                    "cannot export {:?} resource '{}' as {access:?}",
                    info.kind, info.name
                )));
            }
        }
        for (index, info) in self.resources.iter().enumerate() {
            let id = ResourceId(index);
            let uses: Vec<Access> = self
                .passes
                .iter()
                .flat_map(|p| p.accesses.iter())
                .filter(|(r, _)| *r == id)
                .map(|&(_, a)| a)
                .collect();
            if !uses.is_empty() && !uses.iter().any(|a| a.is_write()) {
                return Err(RhiError::InvalidPassDependency(format!(
                    "'{}' is read but no pass writes it",
                    info.name
                )));
            }
        }
        Ok(())
    }

    /// Kahn's algorithm, always taking the lowest declared pass that is ready.
    fn topological_order(&self) -> RhiResult<Vec<usize>> {
        let n = self.passes.len();
        let mut indegree = vec![0usize; n];
        let mut successors = vec![Vec::new(); n];
        for &(before, after) in &self.edges {
            indegree[after.0] += 1;
            successors[before.0].push(after.0);
        }
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &succ in &successors[next] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    ready.insert(succ);
                }
            }
        }
        if order.len() != n {
            let stuck = (0..n).find(|i| !order.contains(i)).unwrap_or_default();
            return Err(RhiError::CyclicPassGraph(self.passes[stuck].name.clone()));
        }
        Ok(order)
    }

    /// For each pass, every pass that must run before it.
    fn ancestors(&self, order: &[usize]) -> Vec<BTreeSet<usize>> {
        let mut ancestors = vec![BTreeSet::new(); self.passes.len()];
        for &pass in order {
            let mut set = BTreeSet::new();
            for &(before, after) in &self.edges {
                if after.0 == pass {
                    set.insert(before.0);
                    set.extend(ancestors[before.0].iter().copied());
                }
            }
            ancestors[pass] = set;
        }
        ancestors
    }

    fn check_hazards(&self, ancestors: &[BTreeSet<usize>]) -> RhiResult<()> {
        for (index, info) in self.resources.iter().enumerate() {
            let users: Vec<(usize, Access)> = self
                .passes
                .iter()
                .enumerate()
                .filter_map(|(p, pass)| {
                    pass.accesses
                        .iter()
                        .find(|(r, _)| r.0 == index)
                        .map(|&(_, a)| (p, a))
                })
                .collect();
            for (i, &(a, access_a)) in users.iter().enumerate() {
                for &(b, access_b) in &users[i + 1..] {
                    if !access_a.is_write() && !access_b.is_write() {
                        continue;
                    }
                    if ancestors[b].contains(&a) || ancestors[a].contains(&b) {
                        continue;
                    }
                    let (producer, consumer) = if access_a.is_write() { (a, b) } else { (b, a) };
                    return Err(RhiError::MissingPassDependency {
                        producer: self.passes[producer].name.clone(),
                        consumer: self.passes[consumer].name.clone(),
                        resource: info.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn derive_barriers(self, order: Vec<usize>) -> RenderGraph {
        #[derive(Clone, Copy)]
        struct State {
            access: Access,
            pass: Option<PassId>,
        }

        // Every resource starts where the previous frame left it.
        let mut state: Vec<Option<State>> = vec![None; self.resources.len()];
        for &p in &order {
            for &(resource, access) in &self.passes[p].accesses {
                state[resource.0] = Some(State { access, pass: None });
            }
        }
        for &(resource, access) in &self.exports {
            state[resource.0] = Some(State { access, pass: None });
        }

        let transition = |resource: ResourceId,
                          prev: State,
                          access: Access,
                          kind: ResourceKind|
         -> Option<ImageBarrier> {
            let old_layout = if access.discards() {
                vk::ImageLayout::UNDEFINED
            } else {
                prev.access.layout(kind)
            };
            let new_layout = access.layout(kind);
            let hazard = prev.access.is_write() || access.is_write();
            if !hazard && old_layout == new_layout {
                return None;
            }
            Some(ImageBarrier {
                resource,
                producer: prev.pass,
                src_stage: prev.access.stages(),
                src_access: prev.access.write_flags(),
                dst_stage: access.stages(),
                dst_access: access.access_flags(),
                old_layout,
                new_layout,
            })
        };

        let mut passes = Vec::with_capacity(order.len());
        let mut dependencies = Vec::new();
        for (position, &p) in order.iter().enumerate() {
            let desc = &self.passes[p];
            let id = PassId(p);
            let mut barriers = Vec::new();
            let mut attachments = Vec::new();
            for &(resource, access) in &desc.accesses {
                let kind = self.resources[resource.0].kind;
                if let Some(prev) = state[resource.0] {
                    if let Some(barrier) = transition(resource, prev, access, kind) {
                        if let Some(producer) = barrier.producer {
                            dependencies.push(Dependency {
                                producer,
                                consumer: id,
                                resource,
                                src_stage: barrier.src_stage,
                                src_access: barrier.src_access,
                                dst_stage: barrier.dst_stage,
                                dst_access: barrier.dst_access,
                            });
                        }
                        barriers.push(barrier);
                    }
                }
                state[resource.0] = Some(State {
                    access,
                    pass: Some(id),
                });
                if access.is_attachment() {
                    let used_later = order[position + 1..].iter().any(|&q| {
                        self.passes[q].accesses.iter().any(|(r, _)| *r == resource)
                    }) || self.exports.iter().any(|(r, _)| *r == resource);
                    attachments.push(AttachmentUse {
                        resource,
                        kind,
                        access,
                        store: used_later,
                    });
                }
            }
            passes.push(CompiledPass {
                id,
                name: desc.name.clone(),
                accesses: desc.accesses.clone(),
                attachments,
                barriers,
            });
        }

        let mut final_barriers = Vec::new();
        for &(resource, access) in &self.exports {
            let kind = self.resources[resource.0].kind;
            if let Some(prev) = state[resource.0] {
                // An export never clears; keep the contents the passes produced.
                let barrier = ImageBarrier {
                    resource,
                    producer: prev.pass,
                    src_stage: prev.access.stages(),
                    src_access: prev.access.write_flags(),
                    dst_stage: access.stages(),
                    dst_access: access.access_flags(),
                    old_layout: prev.access.layout(kind),
                    new_layout: access.layout(kind),
                };
                if barrier.old_layout != barrier.new_layout || prev.access.is_write() {
                    final_barriers.push(barrier);
                }
            }
            state[resource.0] = Some(State { access, pass: None });
        }

        RenderGraph {
            resources: self.resources,
            passes,
            final_barriers,
            dependencies,
        }
    }
}

/// An image memory barrier between two uses of a graph resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBarrier {
    pub resource: ResourceId,
    /// Pass that performed the previous use; `None` for the previous frame.
    pub producer: Option<PassId>,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

impl ImageBarrier {
    pub fn to_vk(
        &self,
        image: vk::Image,
        subresource: vk::ImageSubresourceRange,
    ) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource)
    }
}

/// A must-happen-before edge between two passes of the same frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub producer: PassId,
    pub consumer: PassId,
    pub resource: ResourceId,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

/// An attachment bound while a pass records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentUse {
    pub resource: ResourceId,
    pub kind: ResourceKind,
    pub access: Access,
    /// Whether a later pass or the export reads the result.
    pub store: bool,
}

#[derive(Clone, Debug)]
pub struct CompiledPass {
    id: PassId,
    name: String,
    accesses: Vec<(ResourceId, Access)>,
    attachments: Vec<AttachmentUse>,
    barriers: Vec<ImageBarrier>,
}

impl CompiledPass {
    #[inline]
    pub fn id(&self) -> PassId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accesses(&self) -> &[(ResourceId, Access)] {
        &self.accesses
    }

    pub fn attachments(&self) -> &[AttachmentUse] {
        &self.attachments
    }

    /// Barriers recorded before the pass begins.
    pub fn barriers(&self) -> &[ImageBarrier] {
        &self.barriers
    }
}

/// Receives the commands of a compiled graph.
pub trait PassRecorder {
    fn barriers(&mut self, barriers: &[ImageBarrier]) -> RhiResult<()>;

    fn begin_pass(&mut self, pass: &CompiledPass) -> RhiResult<()>;

    fn end_pass(&mut self, pass: &CompiledPass) -> RhiResult<()>;
}

/// Passes in execution order with their barriers.
#[derive(Clone, Debug)]
pub struct RenderGraph {
    resources: Vec<ResourceInfo>,
    passes: Vec<CompiledPass>,
    final_barriers: Vec<ImageBarrier>,
    dependencies: Vec<Dependency>,
}

impl RenderGraph {
    /// Passes in execution order.
    pub fn passes(&self) -> &[CompiledPass] {
        &self.passes
    }

    pub fn order(&self) -> Vec<PassId> {
        self.passes.iter().map(CompiledPass::id).collect()
    }

    pub fn pass(&self, id: PassId) -> Option<&CompiledPass> {
        self.passes.iter().find(|p| p.id == id)
    }

    pub fn pass_by_name(&self, name: &str) -> Option<&CompiledPass> {
        self.passes.iter().find(|p| p.name == name)
    }

    pub fn resource(&self, id: ResourceId) -> Option<&ResourceInfo> {
        self.resources.get(id.0)
    }

    /// Barriers recorded after the last pass (exports).
    pub fn final_barriers(&self) -> &[ImageBarrier] {
        &self.final_barriers
    }

    /// Intra-frame edges derived from resource hazards.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Record every pass in order, calling `draw` inside each pass scope.
    pub fn record<R, F>(&self, recorder: &mut R, mut draw: F) -> RhiResult<()>
    where
        R: PassRecorder,
        F: FnMut(&CompiledPass, &mut R) -> RhiResult<()>,
    {
        for pass in &self.passes {
            if !pass.barriers.is_empty() {
                recorder.barriers(&pass.barriers)?;
            }
            recorder.begin_pass(pass)?;
            draw(pass, recorder)?;
            recorder.end_pass(pass)?;
        }
        if !self.final_barriers.is_empty() {
            recorder.barriers(&self.final_barriers)?;
        }
        Ok(())
    }
}

impl fmt::Display for RenderGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.passes.iter().map(|p| p.name.as_str()).collect();
        write!(f, "{}", names.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShadowGraph {
        builder: GraphBuilder,
        shadow_map: ResourceId,
        color: ResourceId,
        depth: ResourceId,
        shadow: PassId,
        scene: PassId,
        ui: PassId,
    }

    /// The shadow demo's frame, with the scene pass declared first.
    fn shadow_graph() -> ShadowGraph {
        let mut builder = GraphBuilder::new();
        let color = builder.resource("swapchain", ResourceKind::Color);
        let depth = builder.resource("scene_depth", ResourceKind::Depth);
        let shadow_map = builder.resource("shadow_map", ResourceKind::Depth);
        let scene = builder.add_pass(
            PassDesc::new("scene")
                .access(shadow_map, Access::ShaderSampledRead)
                .access(color, Access::ColorAttachmentWrite)
                .access(depth, Access::DepthAttachmentWrite),
        );
        let shadow =
            builder.add_pass(PassDesc::new("shadow").access(shadow_map, Access::DepthAttachmentWrite));
        let ui = builder.add_pass(PassDesc::new("ui").access(color, Access::ColorAttachmentLoad));
        builder.add_dependency(shadow, scene);
        builder.add_dependency(scene, ui);
        builder.export(color, Access::Present);
        ShadowGraph {
            builder,
            shadow_map,
            color,
            depth,
            shadow,
            scene,
            ui,
        }
    }

    #[test]
    fn test_producer_runs_before_consumer() {
        let g = shadow_graph();
        let graph = g.builder.compile().unwrap();
        assert_eq!(graph.order(), vec![g.shadow, g.scene, g.ui]);
        assert_eq!(graph.to_string(), "shadow -> scene -> ui");
    }

    #[test]
    fn test_shadow_dependency_access_masks() {
        let g = shadow_graph();
        let graph = g.builder.compile().unwrap();
        let dep = graph
            .dependencies()
            .iter()
            .find(|d| d.resource == g.shadow_map)
            .unwrap();
        assert_eq!((dep.producer, dep.consumer), (g.shadow, g.scene));
        assert_eq!(dep.src_access, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE);
        assert_eq!(dep.dst_access, vk::AccessFlags2::SHADER_SAMPLED_READ);
        assert_eq!(dep.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert!(dep.src_stage.contains(vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS));

        let scene = graph.pass(g.scene).unwrap();
        let barrier = scene
            .barriers()
            .iter()
            .find(|b| b.resource == g.shadow_map)
            .unwrap();
        assert_eq!(barrier.old_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_previous_frame_read_orders_next_shadow_write() {
        let g = shadow_graph();
        let graph = g.builder.compile().unwrap();
        let shadow = graph.pass(g.shadow).unwrap();
        let [barrier] = shadow.barriers() else {
            panic!("expected one barrier, got {:?}", shadow.barriers());
        };
        assert_eq!(barrier.producer, None);
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(barrier.src_access, vk::AccessFlags2::NONE);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_overlay_loads_and_present_is_exported() {
        let g = shadow_graph();
        let graph = g.builder.compile().unwrap();

        let ui = graph.pass(g.ui).unwrap();
        let barrier = ui.barriers()[0];
        assert_eq!(barrier.producer, Some(g.scene));
        assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);

        let [present] = graph.final_barriers() else {
            panic!("expected one final barrier");
        };
        assert_eq!(present.resource, g.color);
        assert_eq!(present.producer, Some(g.ui));
        assert_eq!(present.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        // The scene pass clears the image the presentation engine released.
        let scene = graph.pass(g.scene).unwrap();
        let color = scene.barriers().iter().find(|b| b.resource == g.color).unwrap();
        assert_eq!(color.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(color.src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn test_store_ops_follow_later_use() {
        let g = shadow_graph();
        let graph = g.builder.compile().unwrap();
        let store = |pass: PassId, resource: ResourceId| {
            graph
                .pass(pass)
                .unwrap()
                .attachments()
                .iter()
                .find(|a| a.resource == resource)
                .unwrap()
                .store
        };
        assert!(store(g.shadow, g.shadow_map));
        assert!(store(g.scene, g.color));
        assert!(!store(g.scene, g.depth));
        assert!(store(g.ui, g.color));
    }

    #[test]
    fn test_missing_edge_is_rejected() {
        let mut builder = GraphBuilder::new();
        let map = builder.resource("shadow_map", ResourceKind::Depth);
        builder.add_pass(PassDesc::new("shadow").access(map, Access::DepthAttachmentWrite));
        builder.add_pass(PassDesc::new("scene").access(map, Access::ShaderSampledRead));
        match builder.compile() {
            Err(RhiError::MissingPassDependency {
                producer,
                consumer,
                resource,
            }) => {
                assert_eq!(producer, "shadow");
                assert_eq!(consumer, "scene");
                assert_eq!(resource, "shadow_map");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_transitive_edge_covers_hazard() {
        let mut builder = GraphBuilder::new();
        let map = builder.resource("map", ResourceKind::Depth);
        let a = builder.add_pass(PassDesc::new("a").access(map, Access::DepthAttachmentWrite));
        let b = builder.add_pass(PassDesc::new("b"));
        let c = builder.add_pass(PassDesc::new("c").access(map, Access::ShaderSampledRead));
        builder.add_dependency(a, b);
        builder.add_dependency(b, c);
        let graph = builder.compile().unwrap();
        assert_eq!(graph.order(), vec![a, b, c]);
        assert!(graph.pass(b).unwrap().barriers().is_empty());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut builder = GraphBuilder::new();
        let a = builder.add_pass(PassDesc::new("a"));
        let b = builder.add_pass(PassDesc::new("b"));
        builder.add_dependency(a, b);
        builder.add_dependency(b, a);
        assert!(matches!(builder.compile(), Err(RhiError::CyclicPassGraph(_))));
    }

    #[test]
    fn test_invalid_declarations() {
        let mut builder = GraphBuilder::new();
        let color = builder.resource("color", ResourceKind::Color);
        builder.add_pass(PassDesc::new("bad").access(color, Access::DepthAttachmentWrite));
        assert!(matches!(builder.compile(), Err(RhiError::InvalidPassDependency(_))));

        let mut builder = GraphBuilder::new();
        let a = builder.add_pass(PassDesc::new("a"));
        builder.add_dependency(a, a);
        assert!(matches!(builder.compile(), Err(RhiError::InvalidPassDependency(_))));

        let mut builder = GraphBuilder::new();
        let map = builder.resource("map", ResourceKind::Depth);
        builder.add_pass(PassDesc::new("reader").access(map, Access::ShaderSampledRead));
        assert!(matches!(builder.compile(), Err(RhiError::InvalidPassDependency(_))));
    }

    #[derive(Default)]
    struct Log(Vec<String>);

    impl PassRecorder for Log {
        fn barriers(&mut self, barriers: &[ImageBarrier]) -> RhiResult<()> {
            self.0.push(format!("barriers:{}", barriers.len()));
            Ok(())
        }

        fn begin_pass(&mut self, pass: &CompiledPass) -> RhiResult<()> {
            self.0.push(format!("begin:{}", pass.name()));
            Ok(())
        }

        fn end_pass(&mut self, pass: &CompiledPass) -> RhiResult<()> {
            self.0.push(format!("end:{}", pass.name()));
            Ok(())
        }
    }

    #[test]
    fn test_record_emits_barriers_then_scopes() {
        let g = shadow_graph();
        let graph = g.builder.compile().unwrap();
        let mut log = Log::default();
        graph
            .record(&mut log, |pass, log| {
                log.0.push(format!("draw:{}", pass.name()));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            log.0,
            [
                "barriers:1",
                "begin:shadow",
                "draw:shadow",
                "end:shadow",
                "barriers:3",
                "begin:scene",
                "draw:scene",
                "end:scene",
                "barriers:1",
                "begin:ui",
                "draw:ui",
                "end:ui",
                "barriers:1",
            ]
        );
    }
}
