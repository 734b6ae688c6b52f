//! Textured mesh viewed through the quaternion free camera.

use std::mem::size_of;

use ash::vk;
use glam::Vec3;
use tracing::{debug, info};

use vkdemo_platform::FrameInput;
use vkdemo_renderer::{
    Access, AttachmentBindings, CompiledPass, Demo, DemoContext, DynamicUniformBuffer,
    FrameContext, FrameListener, FrameTargets, GraphBuilder, PassDesc, PassId, UiFrame,
};
use vkdemo_resources::MeshData;
use vkdemo_rhi::command::CommandBuffer;
use vkdemo_rhi::descriptor::{
    DescriptorBinding, DescriptorPool, DescriptorSetLayout, DescriptorWrite, pool_sizes_for,
    write_descriptor_set,
};
use vkdemo_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vkdemo_rhi::sampler::Sampler;
use vkdemo_rhi::texture::Texture2D;
use vkdemo_rhi::vertex::Vertex;
use vkdemo_rhi::{RhiError, RhiResult};
use vkdemo_scene::{Camera, FreeCamera, ModelPushConstants, Transform};

use crate::common::{
    CameraUniform, GpuMesh, aspect_ratio, load_mesh_or, load_shader_pair,
    load_texture_or_checkerboard,
};

pub struct MeshDemo {
    camera: FreeCamera,
    transform: Transform,
    scene_pass: Option<PassId>,

    pipeline: Pipeline,
    layout: PipelineLayout,
    descriptor_sets: Vec<vk::DescriptorSet>,
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,

    camera_uniforms: DynamicUniformBuffer<CameraUniform>,
    _sampler: Sampler,
    _texture: Texture2D,
    mesh: GpuMesh,
}

impl Demo for MeshDemo {
    fn init(ctx: &DemoContext<'_>) -> RhiResult<Self> {
        let device = ctx.device;
        let config = ctx.config;

        let data = load_mesh_or(config.demo.model_path().as_deref(), || MeshData::cube(4.0))?;
        let mesh = GpuMesh::upload(device, ctx.upload_pool, &data)?;
        let pixels = load_texture_or_checkerboard(config.demo.texture_path().as_deref())?;
        let texture = Texture2D::from_rgba8(
            device.clone(),
            ctx.upload_pool,
            pixels.width,
            pixels.height,
            &pixels.pixels,
        )?;
        let sampler = Sampler::linear_repeat(device.clone())?;

        let camera_uniforms =
            DynamicUniformBuffer::<CameraUniform>::new(device.clone(), ctx.frames_in_flight)?;

        let bindings = [
            DescriptorBinding::dynamic_uniform(0, vk::ShaderStageFlags::VERTEX),
            DescriptorBinding::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
        ];
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
        let sets = ctx.frames_in_flight as u32;
        let descriptor_pool =
            DescriptorPool::new(device.clone(), sets, &pool_sizes_for(&bindings, sets))?;
        let descriptor_sets =
            descriptor_pool.allocate(&vec![set_layout.handle(); ctx.frames_in_flight])?;
        for &set in &descriptor_sets {
            write_descriptor_set(
                device,
                set,
                &[
                    (
                        0,
                        DescriptorWrite::DynamicUniform {
                            buffer: camera_uniforms.handle(),
                            range: camera_uniforms.range(),
                        },
                    ),
                    (
                        1,
                        DescriptorWrite::SampledImage {
                            sampler: sampler.handle(),
                            view: texture.view(),
                            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        },
                    ),
                ],
            );
        }

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .size(size_of::<ModelPushConstants>() as u32);
        let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[push_range])?;
        let (vert, frag) = load_shader_pair(device, &config.demo.shader_dir(), "mesh")?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .vertex_input(Vertex::binding_description(), &Vertex::attribute_descriptions())
            .color_format(ctx.color_format)
            .depth_format(ctx.depth_format)
            .build(device.clone(), &layout)?;

        let mut camera =
            FreeCamera::from_config(&config.camera).with_position(Vec3::new(0.0, 0.0, -12.0));
        if let Some(aspect) = aspect_ratio(ctx.extent) {
            camera.set_aspect(aspect);
        }

        info!(
            "Mesh demo ready: {} indices, texture {}x{}",
            mesh.index_count(),
            pixels.width,
            pixels.height
        );
        Ok(Self {
            camera,
            transform: Transform::new(),
            scene_pass: None,
            pipeline,
            layout,
            descriptor_sets,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            camera_uniforms,
            _sampler: sampler,
            _texture: texture,
            mesh,
        })
    }

    fn name(&self) -> &'static str {
        "mesh"
    }

    fn declare_passes(&mut self, graph: &mut GraphBuilder, targets: FrameTargets) -> PassId {
        let scene = declare_scene_pass(graph, targets);
        self.scene_pass = Some(scene);
        scene
    }

    fn bind_attachments(&self, _bindings: &mut AttachmentBindings) {}

    fn update(&mut self, dt: f32) -> RhiResult<()> {
        self.transform.rotate_y(dt * 0.25);
        Ok(())
    }

    fn draw_pass(
        &self,
        pass: &CompiledPass,
        cmd: &CommandBuffer,
        frame: &FrameContext,
    ) -> RhiResult<()> {
        if Some(pass.id()) != self.scene_pass {
            return Ok(());
        }
        let set = *self
            .descriptor_sets
            .get(frame.slot)
            .ok_or(RhiError::SlotOutOfRange {
                index: frame.slot,
                count: self.descriptor_sets.len(),
            })?;
        cmd.bind_graphics_pipeline(self.pipeline.handle());
        cmd.bind_descriptor_sets(
            self.layout.handle(),
            0,
            &[set],
            &[self.camera_uniforms.dynamic_offset(frame.slot)?],
        );
        cmd.push_constants(
            self.layout.handle(),
            vk::ShaderStageFlags::VERTEX,
            &self.transform.push_constants(),
        );
        self.mesh.draw(cmd, 1);
        Ok(())
    }

    fn draw_ui(&mut self, ui: &mut UiFrame) {
        let p = self.camera.position();
        let (axis, angle) = self.camera.rotation().to_axis_angle();
        ui.text("mesh");
        ui.value("pos", format_args!("({:.1}, {:.1}, {:.1})", p.x, p.y, p.z));
        ui.value(
            "rot",
            format_args!(
                "{:.0}° about ({:.2}, {:.2}, {:.2})",
                angle.to_degrees(),
                axis.x,
                axis.y,
                axis.z
            ),
        );
    }

    fn on_resize(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        if let Some(aspect) = aspect_ratio(extent) {
            self.camera.set_aspect(aspect);
            debug!("Mesh demo aspect set to {aspect:.3}");
        }
        Ok(())
    }

    fn dispose(self: Box<Self>) {
        info!("Disposing mesh demo");
        drop(self);
    }
}

impl FrameListener for MeshDemo {
    fn on_frame_input(&mut self, input: &FrameInput, slot: usize) -> RhiResult<()> {
        self.camera.apply_frame_input(input);
        self.camera_uniforms
            .upload(slot, &CameraUniform::from_camera(&self.camera))
    }
}

/// The single pass of this demo: lit mesh into the swapchain image.
pub fn declare_scene_pass(graph: &mut GraphBuilder, targets: FrameTargets) -> PassId {
    graph.add_pass(
        PassDesc::new("scene")
            .access(targets.color, Access::ColorAttachmentWrite)
            .access(targets.depth, Access::DepthAttachmentWrite),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use vkdemo_renderer::ResourceKind;

    fn targets(graph: &mut GraphBuilder) -> FrameTargets {
        FrameTargets {
            color: graph.resource("swapchain", ResourceKind::Color),
            depth: graph.resource("scene_depth", ResourceKind::Depth),
        }
    }

    #[test]
    fn test_scene_then_ui() {
        let mut graph = GraphBuilder::new();
        let targets = targets(&mut graph);
        let scene = declare_scene_pass(&mut graph, targets);
        let ui = graph.add_pass(PassDesc::new("ui").access(targets.color, Access::ColorAttachmentLoad));
        graph.add_dependency(scene, ui);
        graph.export(targets.color, Access::Present);
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.to_string(), "scene -> ui");

        let scene = compiled.pass(scene).unwrap();
        let color = scene
            .attachments()
            .iter()
            .find(|a| a.resource == targets.color)
            .unwrap();
        // The overlay loads the color target afterwards.
        assert!(color.store);
        let ui = compiled.pass_by_name("ui").unwrap();
        assert!(ui.attachments().iter().all(|a| a.access == Access::ColorAttachmentLoad));
    }

    #[test]
    fn test_ui_without_edge_is_rejected() {
        let mut graph = GraphBuilder::new();
        let targets = targets(&mut graph);
        declare_scene_pass(&mut graph, targets);
        graph.add_pass(PassDesc::new("ui").access(targets.color, Access::ColorAttachmentLoad));
        assert!(matches!(
            graph.compile(),
            Err(RhiError::MissingPassDependency { .. })
        ));
    }
}
