//! Directional-light shadow mapping.
//!
//! Two passes per frame: a depth-only pass renders the scene from the light
//! into a 2048² shadow map, then the scene pass samples it. The graph orders
//! them and narrows the shadow map's access from depth write to sampled read.
//! Lamps marking the light are drawn instanced from a storage buffer.

use std::mem::size_of;
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3};
use tracing::{debug, info};

use vkdemo_platform::FrameInput;
use vkdemo_renderer::{
    Access, AttachmentBindings, CompiledPass, Demo, DemoContext, DynamicUniformBuffer,
    FrameContext, FrameListener, FrameTargets, GraphBuilder, PassDesc, PassId, ResourceId,
    ResourceKind, UiFrame,
};
use vkdemo_resources::MeshData;
use vkdemo_rhi::buffer::{Buffer, BufferUsage};
use vkdemo_rhi::command::CommandBuffer;
use vkdemo_rhi::descriptor::{
    DescriptorBinding, DescriptorPool, DescriptorSetLayout, DescriptorWrite, pool_sizes_for,
    write_descriptor_set,
};
use vkdemo_rhi::device::Device;
use vkdemo_rhi::image::Image;
use vkdemo_rhi::pipeline::{DepthBias, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vkdemo_rhi::sampler::Sampler;
use vkdemo_rhi::shader::ShaderStage;
use vkdemo_rhi::vertex::Vertex;
use vkdemo_rhi::{RhiError, RhiResult};
use vkdemo_scene::{Camera, DirectionalLight, FpsCamera, LampInstance, ModelPushConstants, Transform};

use crate::common::{
    CameraUniform, GpuMesh, aspect_ratio, load_mesh_or, load_shader, load_shader_pair,
};

pub const SHADOW_MAP_SIZE: u32 = 2048;

const SPIN_RADIANS_PER_SEC: f32 = 0.4;

const SHADOW_BIAS: DepthBias = DepthBias {
    constant_factor: 1.25,
    slope_factor: 1.75,
};

struct SceneObject {
    mesh: usize,
    transform: Transform,
    spins: bool,
}

#[derive(Clone, Copy)]
struct ShadowPasses {
    shadow_map: ResourceId,
    shadow: PassId,
    scene: PassId,
}

/// Lamps drawn at the light's position and target.
pub fn lamp_instances(light: &DirectionalLight) -> [LampInstance; 2] {
    let scale = Mat4::from_scale(Vec3::splat(0.5));
    [
        LampInstance::new(
            Mat4::from_translation(light.position) * scale,
            Vec3::splat(0.9),
        ),
        LampInstance::new(
            Mat4::from_translation(light.target) * scale,
            Vec3::splat(0.1),
        ),
    ]
}

pub struct ShadowDemo {
    camera: FpsCamera,
    light: DirectionalLight,
    objects: Vec<SceneObject>,
    passes: Option<ShadowPasses>,

    shadow_pipeline: Pipeline,
    scene_pipeline: Pipeline,
    lamp_pipeline: Pipeline,
    layout: PipelineLayout,
    descriptor_sets: Vec<vk::DescriptorSet>,
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,

    camera_uniforms: DynamicUniformBuffer<CameraUniform>,
    _light_buffer: Buffer,
    _lamp_buffer: Buffer,
    lamp_count: u32,
    shadow_map: Image,
    _shadow_sampler: Sampler,
    meshes: Vec<GpuMesh>,
    lamp_mesh: GpuMesh,
}

impl ShadowDemo {
    fn create_pipelines(
        device: &Arc<Device>,
        ctx: &DemoContext<'_>,
        layout: &PipelineLayout,
    ) -> RhiResult<(Pipeline, Pipeline, Pipeline)> {
        let shader_dir = ctx.config.demo.shader_dir();
        let shadow_vert = load_shader(device, &shader_dir, "shadow", ShaderStage::Vertex)?;
        let (scene_vert, scene_frag) = load_shader_pair(device, &shader_dir, "scene")?;
        let (lamp_vert, lamp_frag) = load_shader_pair(device, &shader_dir, "lamp")?;

        let shadow = GraphicsPipelineBuilder::new()
            .vertex_shader(&shadow_vert)
            .vertex_input(Vertex::binding_description(), &Vertex::attribute_descriptions())
            .depth_bias(SHADOW_BIAS)
            .depth_format(ctx.depth_format)
            .build(device.clone(), layout)?;
        let scene = GraphicsPipelineBuilder::new()
            .vertex_shader(&scene_vert)
            .fragment_shader(&scene_frag)
            .vertex_input(Vertex::binding_description(), &Vertex::attribute_descriptions())
            .color_format(ctx.color_format)
            .depth_format(ctx.depth_format)
            .build(device.clone(), layout)?;
        let lamp = GraphicsPipelineBuilder::new()
            .vertex_shader(&lamp_vert)
            .fragment_shader(&lamp_frag)
            .vertex_input(Vertex::binding_description(), &Vertex::attribute_descriptions())
            .color_format(ctx.color_format)
            .depth_format(ctx.depth_format)
            .build(device.clone(), layout)?;
        Ok((shadow, scene, lamp))
    }

    fn draw_objects(&self, cmd: &CommandBuffer) {
        for object in &self.objects {
            cmd.push_constants(
                self.layout.handle(),
                vk::ShaderStageFlags::VERTEX,
                &object.transform.push_constants(),
            );
            if let Some(mesh) = self.meshes.get(object.mesh) {
                mesh.draw(cmd, 1);
            }
        }
    }

    fn bind_frame_set(&self, cmd: &CommandBuffer, slot: usize) -> RhiResult<()> {
        let set = *self
            .descriptor_sets
            .get(slot)
            .ok_or(RhiError::SlotOutOfRange {
                index: slot,
                count: self.descriptor_sets.len(),
            })?;
        let offsets = [self.camera_uniforms.dynamic_offset(slot)?];
        cmd.bind_descriptor_sets(self.layout.handle(), 0, &[set], &offsets);
        Ok(())
    }
}

impl Demo for ShadowDemo {
    fn init(ctx: &DemoContext<'_>) -> RhiResult<Self> {
        let device = ctx.device;
        let config = ctx.config;

        let model = load_mesh_or(config.demo.model_path().as_deref(), || {
            MeshData::uv_sphere(3.0, 48, 24)
        })?;
        let meshes = vec![
            GpuMesh::upload(device, ctx.upload_pool, &model)?,
            GpuMesh::upload(device, ctx.upload_pool, &MeshData::cube(4.0))?,
            GpuMesh::upload(device, ctx.upload_pool, &MeshData::plane(100.0, 10.0))?,
        ];
        let objects = vec![
            SceneObject {
                mesh: 0,
                transform: Transform::new().with_position(Vec3::new(0.0, 3.0, 0.0)),
                spins: true,
            },
            SceneObject {
                mesh: 1,
                transform: Transform::new().with_position(Vec3::new(-9.0, 2.0, 6.0)),
                spins: false,
            },
            SceneObject {
                mesh: 2,
                transform: Transform::new(),
                spins: false,
            },
        ];
        let lamp_mesh = GpuMesh::upload(device, ctx.upload_pool, &MeshData::uv_sphere(1.0, 16, 8))?;

        let light = DirectionalLight::default();
        let light_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Uniform,
            bytemuck::bytes_of(&light.uniform()),
        )?;
        light_buffer.flush(0, light_buffer.size())?;
        let lamps = lamp_instances(&light);
        let lamp_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Storage,
            bytemuck::cast_slice(&lamps),
        )?;
        lamp_buffer.flush(0, lamp_buffer.size())?;

        let camera_uniforms =
            DynamicUniformBuffer::<CameraUniform>::new(device.clone(), ctx.frames_in_flight)?;

        let shadow_map = Image::depth(
            device.clone(),
            vk::Extent2D {
                width: SHADOW_MAP_SIZE,
                height: SHADOW_MAP_SIZE,
            },
            ctx.depth_format,
        )?;
        let shadow_sampler = Sampler::shadow(device.clone())?;

        let bindings = [
            DescriptorBinding::dynamic_uniform(
                0,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            ),
            DescriptorBinding::uniform_buffer(
                1,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            ),
            DescriptorBinding::combined_image_sampler(2, vk::ShaderStageFlags::FRAGMENT),
            DescriptorBinding::storage_buffer(3, vk::ShaderStageFlags::VERTEX),
        ];
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
        let sets = ctx.frames_in_flight as u32;
        let descriptor_pool =
            DescriptorPool::new(device.clone(), sets, &pool_sizes_for(&bindings, sets))?;
        let layouts = vec![set_layout.handle(); ctx.frames_in_flight];
        let descriptor_sets = descriptor_pool.allocate(&layouts)?;
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
                        DescriptorWrite::Uniform {
                            buffer: light_buffer.handle(),
                            range: light_buffer.size(),
                        },
                    ),
                    (
                        2,
                        DescriptorWrite::SampledImage {
                            sampler: shadow_sampler.handle(),
                            view: shadow_map.view(),
                            layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                        },
                    ),
                    (
                        3,
                        DescriptorWrite::Storage {
                            buffer: lamp_buffer.handle(),
                        },
                    ),
                ],
            );
        }

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .size(size_of::<ModelPushConstants>() as u32);
        let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[push_range])?;
        let (shadow_pipeline, scene_pipeline, lamp_pipeline) =
            Self::create_pipelines(device, ctx, &layout)?;

        let mut camera = FpsCamera::from_config(&config.camera);
        if let Some(aspect) = aspect_ratio(ctx.extent) {
            camera.set_aspect(aspect);
        }

        info!(
            "Shadow demo ready: {} objects, shadow map {SHADOW_MAP_SIZE}x{SHADOW_MAP_SIZE}",
            objects.len()
        );
        Ok(Self {
            camera,
            light,
            objects,
            passes: None,
            shadow_pipeline,
            scene_pipeline,
            lamp_pipeline,
            layout,
            descriptor_sets,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            camera_uniforms,
            _light_buffer: light_buffer,
            _lamp_buffer: lamp_buffer,
            lamp_count: lamps.len() as u32,
            shadow_map,
            _shadow_sampler: shadow_sampler,
            meshes,
            lamp_mesh,
        })
    }

    fn name(&self) -> &'static str {
        "shadow"
    }

    fn declare_passes(&mut self, graph: &mut GraphBuilder, targets: FrameTargets) -> PassId {
        let shadow_map = graph.resource("shadow_map", ResourceKind::Depth);
        let shadow =
            graph.add_pass(PassDesc::new("shadow").access(shadow_map, Access::DepthAttachmentWrite));
        let scene = graph.add_pass(
            PassDesc::new("scene")
                .access(shadow_map, Access::ShaderSampledRead)
                .access(targets.color, Access::ColorAttachmentWrite)
                .access(targets.depth, Access::DepthAttachmentWrite),
        );
        graph.add_dependency(shadow, scene);
        self.passes = Some(ShadowPasses {
            shadow_map,
            shadow,
            scene,
        });
        scene
    }

    fn bind_attachments(&self, bindings: &mut AttachmentBindings) {
        if let Some(passes) = self.passes {
            bindings.bind_image(passes.shadow_map, &self.shadow_map);
        }
    }

    fn update(&mut self, dt: f32) -> RhiResult<()> {
        for object in self.objects.iter_mut().filter(|o| o.spins) {
            object.transform.rotate_y(dt * SPIN_RADIANS_PER_SEC);
        }
        Ok(())
    }

    fn draw_pass(
        &self,
        pass: &CompiledPass,
        cmd: &CommandBuffer,
        frame: &FrameContext,
    ) -> RhiResult<()> {
        let Some(passes) = self.passes else {
            return Ok(());
        };
        if pass.id() == passes.shadow {
            cmd.bind_graphics_pipeline(self.shadow_pipeline.handle());
            self.bind_frame_set(cmd, frame.slot)?;
            self.draw_objects(cmd);
        } else if pass.id() == passes.scene {
            cmd.bind_graphics_pipeline(self.scene_pipeline.handle());
            self.bind_frame_set(cmd, frame.slot)?;
            self.draw_objects(cmd);

            cmd.bind_graphics_pipeline(self.lamp_pipeline.handle());
            self.lamp_mesh.draw(cmd, self.lamp_count);
        }
        Ok(())
    }

    fn draw_ui(&mut self, ui: &mut UiFrame) {
        let p = self.camera.position();
        ui.text("shadow");
        ui.value("pos", format_args!("({:.1}, {:.1}, {:.1})", p.x, p.y, p.z));
        ui.value(
            "pitch/yaw",
            format_args!("{:.0}/{:.0}", self.camera.pitch_deg(), self.camera.yaw_deg()),
        );
        let d = self.light.direction();
        ui.value("light", format_args!("({:.2}, {:.2}, {:.2})", d.x, d.y, d.z));
    }

    fn on_resize(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        if let Some(aspect) = aspect_ratio(extent) {
            self.camera.set_aspect(aspect);
            debug!("Shadow demo aspect set to {aspect:.3}");
        }
        Ok(())
    }

    fn dispose(self: Box<Self>) {
        info!("Disposing shadow demo");
        drop(self);
    }
}

impl FrameListener for ShadowDemo {
    fn on_frame_input(&mut self, input: &FrameInput, slot: usize) -> RhiResult<()> {
        self.camera.apply_frame_input(input);
        self.camera_uniforms
            .upload(slot, &CameraUniform::from_camera(&self.camera))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lamps_mark_light_and_target() {
        let light = DirectionalLight::default();
        let [bright, dim] = lamp_instances(&light);
        assert!(bright.model.w_axis.truncate().abs_diff_eq(light.position, 1e-6));
        assert!(dim.model.w_axis.truncate().abs_diff_eq(light.target, 1e-6));
        assert!(bright.color.x > dim.color.x);
    }

    #[test]
    fn test_lamp_buffer_layout() {
        assert_eq!(size_of::<[LampInstance; 2]>(), 160);
    }
}
