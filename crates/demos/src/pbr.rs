//! Cook-Torrance shading of a sphere under one point light.
//!
//! The camera uniform slots are packed at a power-of-two stride; the material
//! is re-uploaded into its own per-slot uniform every frame.

use std::mem::size_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use tracing::{debug, info};

use vkdemo_platform::FrameInput;
use vkdemo_renderer::{
    AttachmentBindings, CompiledPass, Demo, DemoContext, DynamicUniformBuffer, FrameContext,
    FrameListener, FrameTargets, GraphBuilder, PassId, UiFrame,
};
use vkdemo_resources::MeshData;
use vkdemo_rhi::buffer::{Buffer, BufferUsage};
use vkdemo_rhi::command::CommandBuffer;
use vkdemo_rhi::descriptor::{
    DescriptorBinding, DescriptorPool, DescriptorSetLayout, DescriptorWrite, pool_sizes_for,
    write_descriptor_set,
};
use vkdemo_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vkdemo_rhi::vertex::Vertex;
use vkdemo_rhi::{RhiError, RhiResult};
use vkdemo_scene::{Camera, FpsCamera, ModelPushConstants, Transform};

use crate::common::{GpuMesh, aspect_ratio, load_mesh_or, load_shader_pair};
use crate::mesh::declare_scene_pass;

/// `pbr.vert`/`pbr.frag` binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PbrCameraUniform {
    pub view_projection: Mat4,
    /// World-space eye position; `w` is unused.
    pub position: Vec4,
}

impl PbrCameraUniform {
    pub fn from_camera(camera: &dyn Camera) -> Self {
        Self {
            view_projection: camera.view_projection(),
            position: camera.position().extend(1.0),
        }
    }
}

/// Binding 1.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLightUniform {
    pub position: Vec4,
    /// Linear RGB radiance; `w` is unused.
    pub color: Vec4,
}

impl Default for PointLightUniform {
    fn default() -> Self {
        Self {
            position: Vec4::new(20.0, 20.0, 20.0, 1.0),
            color: Vec4::new(1.0, 1.0, 1.0, 0.0),
        }
    }
}

/// Binding 2.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    pub albedo: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub ao: f32,
    pub _pad: f32,
}

impl Default for MaterialUniform {
    fn default() -> Self {
        Self {
            albedo: Vec4::new(0.5, 0.0, 0.0, 1.0),
            metallic: 0.3,
            roughness: 1.0,
            ao: 1.0,
            _pad: 0.0,
        }
    }
}

impl MaterialUniform {
    /// Keeps the parameters inside the ranges the BRDF is defined on.
    pub fn clamped(self) -> Self {
        Self {
            metallic: self.metallic.clamp(0.0, 1.0),
            // Zero roughness turns the GGX lobe into a delta.
            roughness: self.roughness.clamp(0.05, 1.0),
            ao: self.ao.clamp(0.0, 1.0),
            ..self
        }
    }
}

pub struct PbrDemo {
    camera: FpsCamera,
    transform: Transform,
    material: MaterialUniform,
    light: PointLightUniform,
    scene_pass: Option<PassId>,

    pipeline: Pipeline,
    layout: PipelineLayout,
    descriptor_sets: Vec<vk::DescriptorSet>,
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,

    camera_uniforms: DynamicUniformBuffer<PbrCameraUniform>,
    material_uniforms: DynamicUniformBuffer<MaterialUniform>,
    _light_buffer: Buffer,
    sphere: GpuMesh,
}

impl Demo for PbrDemo {
    fn init(ctx: &DemoContext<'_>) -> RhiResult<Self> {
        let device = ctx.device;
        let config = ctx.config;

        let data = load_mesh_or(config.demo.model_path().as_deref(), || {
            MeshData::uv_sphere(2.0, 64, 32)
        })?;
        let sphere = GpuMesh::upload(device, ctx.upload_pool, &data)?;

        let camera_uniforms =
            DynamicUniformBuffer::<PbrCameraUniform>::new_packed(device.clone(), ctx.frames_in_flight)?;
        let material_uniforms =
            DynamicUniformBuffer::<MaterialUniform>::new(device.clone(), ctx.frames_in_flight)?;
        let light = PointLightUniform::default();
        let light_buffer =
            Buffer::new_with_data(device.clone(), BufferUsage::Uniform, bytemuck::bytes_of(&light))?;
        light_buffer.flush(0, light_buffer.size())?;

        let bindings = [
            DescriptorBinding::dynamic_uniform(
                0,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            ),
            DescriptorBinding::uniform_buffer(1, vk::ShaderStageFlags::FRAGMENT),
            DescriptorBinding::dynamic_uniform(2, vk::ShaderStageFlags::FRAGMENT),
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
                        DescriptorWrite::Uniform {
                            buffer: light_buffer.handle(),
                            range: size_of::<PointLightUniform>() as u64,
                        },
                    ),
                    (
                        2,
                        DescriptorWrite::DynamicUniform {
                            buffer: material_uniforms.handle(),
                            range: material_uniforms.range(),
                        },
                    ),
                ],
            );
        }

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .size(size_of::<ModelPushConstants>() as u32);
        let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[push_range])?;
        let (vert, frag) = load_shader_pair(device, &config.demo.shader_dir(), "pbr")?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .vertex_input(Vertex::binding_description(), &Vertex::attribute_descriptions())
            .cull_mode(vk::CullModeFlags::NONE)
            .depth(true, true, vk::CompareOp::LESS)
            .color_format(ctx.color_format)
            .depth_format(ctx.depth_format)
            .build(device.clone(), &layout)?;

        let mut camera =
            FpsCamera::from_config(&config.camera).with_position(Vec3::new(0.0, 0.0, -8.0));
        if let Some(aspect) = aspect_ratio(ctx.extent) {
            camera.set_aspect(aspect);
        }

        info!(
            "PBR demo ready: {} indices, camera stride {} bytes",
            sphere.index_count(),
            camera_uniforms.stride()
        );
        Ok(Self {
            camera,
            transform: Transform::new(),
            material: MaterialUniform::default(),
            light,
            scene_pass: None,
            pipeline,
            layout,
            descriptor_sets,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            camera_uniforms,
            material_uniforms,
            _light_buffer: light_buffer,
            sphere,
        })
    }

    fn name(&self) -> &'static str {
        "pbr"
    }

    fn declare_passes(&mut self, graph: &mut GraphBuilder, targets: FrameTargets) -> PassId {
        let scene = declare_scene_pass(graph, targets);
        self.scene_pass = Some(scene);
        scene
    }

    fn bind_attachments(&self, _bindings: &mut AttachmentBindings) {}

    fn update(&mut self, _dt: f32) -> RhiResult<()> {
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
            &[
                self.camera_uniforms.dynamic_offset(frame.slot)?,
                self.material_uniforms.dynamic_offset(frame.slot)?,
            ],
        );
        cmd.push_constants(
            self.layout.handle(),
            vk::ShaderStageFlags::VERTEX,
            &self.transform.push_constants(),
        );
        self.sphere.draw(cmd, 1);
        Ok(())
    }

    fn draw_ui(&mut self, ui: &mut UiFrame) {
        describe_camera(&self.camera, ui);
        describe_material(&self.material, &self.light, ui);
    }

    fn on_resize(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        if let Some(aspect) = aspect_ratio(extent) {
            self.camera.set_aspect(aspect);
            debug!("PBR demo aspect set to {aspect:.3}");
        }
        Ok(())
    }

    fn dispose(self: Box<Self>) {
        info!("Disposing PBR demo");
        drop(self);
    }
}

impl FrameListener for PbrDemo {
    fn on_frame_input(&mut self, input: &FrameInput, slot: usize) -> RhiResult<()> {
        self.camera.apply_frame_input(input);
        self.camera_uniforms
            .upload(slot, &PbrCameraUniform::from_camera(&self.camera))?;
        self.material_uniforms.upload(slot, &self.material.clamped())
    }
}

fn describe_camera(camera: &dyn Camera, ui: &mut UiFrame) {
    let fmt = |v: Vec3| format!("({:.2}, {:.2}, {:.2})", v.x, v.y, v.z);
    ui.text("camera");
    ui.value("pos", fmt(camera.position()));
    ui.value("up", fmt(camera.up()));
    ui.value("right", fmt(camera.right()));
    ui.value("front", fmt(camera.forward()));
}

fn describe_material(material: &MaterialUniform, light: &PointLightUniform, ui: &mut UiFrame) {
    ui.text("material");
    ui.value("metallic", format_args!("{:.2}", material.metallic));
    ui.value("roughness", format_args!("{:.2}", material.roughness));
    let p = light.position;
    ui.value("light", format_args!("({:.0}, {:.0}, {:.0})", p.x, p.y, p.z));
}

#[cfg(test)]
mod tests {
    use super::*;

    use vkdemo_renderer::{Widget, compute_packed_stride, compute_stride};

    #[test]
    fn test_uniform_sizes_match_shader_blocks() {
        assert_eq!(size_of::<PbrCameraUniform>(), 80);
        assert_eq!(size_of::<PointLightUniform>(), 32);
        assert_eq!(size_of::<MaterialUniform>(), 32);
        assert_eq!(std::mem::offset_of!(MaterialUniform, roughness), 20);
    }

    #[test]
    fn test_camera_slots_are_packed_to_power_of_two() {
        let size = size_of::<PbrCameraUniform>() as u64;
        // Tighter than the plain alignment policy on small alignments.
        assert_eq!(compute_stride(size, 16), 80);
        assert_eq!(compute_packed_stride(size, 16), 128);
        // Never below the device alignment.
        assert_eq!(compute_packed_stride(size, 256), 256);
    }

    #[test]
    fn test_material_defaults_and_clamp() {
        let material = MaterialUniform::default();
        assert_eq!((material.metallic, material.roughness), (0.3, 1.0));

        let wild = MaterialUniform {
            metallic: 1.5,
            roughness: 0.0,
            ao: -1.0,
            ..material
        }
        .clamped();
        assert_eq!(wild.metallic, 1.0);
        assert_eq!(wild.roughness, 0.05);
        assert_eq!(wild.ao, 0.0);
        assert_eq!(wild.albedo, material.albedo);
    }

    #[test]
    fn test_material_panel_lists_parameters() {
        let mut ui = UiFrame::new();
        describe_material(&MaterialUniform::default(), &PointLightUniform::default(), &mut ui);
        assert_eq!(
            ui.widgets(),
            &[
                Widget::Text("material".to_string()),
                Widget::Value {
                    label: "metallic".to_string(),
                    value: "0.30".to_string()
                },
                Widget::Value {
                    label: "roughness".to_string(),
                    value: "1.00".to_string()
                },
                Widget::Value {
                    label: "light".to_string(),
                    value: "(20, 20, 20)".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_camera_uniform_carries_eye_position() {
        let camera = FpsCamera::default().with_position(Vec3::new(1.0, 2.0, 3.0));
        let uniform = PbrCameraUniform::from_camera(&camera);
        assert_eq!(uniform.position, Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(uniform.view_projection, camera.view_projection());
    }
}
