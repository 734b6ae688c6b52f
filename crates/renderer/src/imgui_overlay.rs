//! Dear ImGui overlay drawn in the UI pass.
//!
//! [`UiPanel`] lays a [`UiFrame`] out as an imgui window and flattens the
//! draw lists into one [`UiGeometry`]. [`ImguiOverlay`] uploads that geometry
//! into the frame slot's vertex and index buffers and records one scissored
//! draw per imgui command.

use std::mem::{offset_of, size_of};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use imgui::{Condition, DrawCmd, DrawCmdParams, DrawData, DrawIdx, DrawVert, TextureId};
use tracing::{debug, info};

use vkdemo_rhi::buffer::{Buffer, BufferUsage};
use vkdemo_rhi::command::{CommandBuffer, CommandPool};
use vkdemo_rhi::descriptor::{
    DescriptorBinding, DescriptorPool, DescriptorSetLayout, DescriptorWrite, pool_sizes_for,
    write_descriptor_set,
};
use vkdemo_rhi::device::Device;
use vkdemo_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vkdemo_rhi::sampler::Sampler;
use vkdemo_rhi::shader::{Shader, ShaderStage, spirv_file_name};
use vkdemo_rhi::texture::Texture2D;
use vkdemo_rhi::{RhiError, RhiResult};

use crate::demo::FrameContext;
use crate::overlay::{UiFrame, UiOverlay, Widget};

/// Smallest vertex or index buffer a slot allocates.
const MIN_BUFFER_SIZE: u64 = 64 * 1024;

/// imgui rejects a zero frame delta.
const MIN_DELTA: f32 = 1.0 / 10_000.0;

const FONT_TEXTURE_ID: usize = 0;

/// One imgui vertex as the `ui.vert` input expects it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UiVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    /// RGBA8, unpacked to `vec4` by the vertex fetch.
    pub color: [u8; 4],
}

impl From<&DrawVert> for UiVertex {
    fn from(vertex: &DrawVert) -> Self {
        Self {
            position: vertex.pos,
            uv: vertex.uv,
            color: vertex.col,
        }
    }
}

impl UiVertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, uv) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R8G8B8A8_UNORM,
                offset: offset_of!(Self, color) as u32,
            },
        ]
    }
}

/// Maps imgui display coordinates to clip space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UiPushConstants {
    pub scale: [f32; 2],
    pub translate: [f32; 2],
}

impl UiPushConstants {
    pub fn for_display(position: [f32; 2], size: [f32; 2]) -> Self {
        let scale = [2.0 / size[0], 2.0 / size[1]];
        Self {
            scale,
            translate: [
                -1.0 - position[0] * scale[0],
                -1.0 - position[1] * scale[1],
            ],
        }
    }
}

/// Scissor for an imgui clip rectangle `[min_x, min_y, max_x, max_y]`,
/// clamped to the render area. `None` when nothing is left.
pub fn clip_to_scissor(
    clip_rect: [f32; 4],
    display_pos: [f32; 2],
    extent: vk::Extent2D,
) -> Option<vk::Rect2D> {
    let min_x = (clip_rect[0] - display_pos[0]).max(0.0);
    let min_y = (clip_rect[1] - display_pos[1]).max(0.0);
    let max_x = (clip_rect[2] - display_pos[0]).min(extent.width as f32);
    let max_y = (clip_rect[3] - display_pos[1]).min(extent.height as f32);
    if max_x <= min_x || max_y <= min_y {
        return None;
    }
    Some(vk::Rect2D {
        offset: vk::Offset2D {
            x: min_x as i32,
            y: min_y as i32,
        },
        extent: vk::Extent2D {
            width: (max_x - min_x) as u32,
            height: (max_y - min_y) as u32,
        },
    })
}

/// Index type matching imgui's `DrawIdx`.
pub const fn ui_index_type() -> vk::IndexType {
    if size_of::<DrawIdx>() == 2 {
        vk::IndexType::UINT16
    } else {
        vk::IndexType::UINT32
    }
}

/// Byte size a slot buffer grows to when `needed` does not fit.
pub fn grown_capacity(needed: u64) -> u64 {
    needed.max(MIN_BUFFER_SIZE).next_power_of_two()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiDraw {
    pub scissor: vk::Rect2D,
    pub index_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
}

/// Every draw list of one imgui frame, concatenated.
#[derive(Debug, Default)]
pub struct UiGeometry {
    pub vertices: Vec<UiVertex>,
    pub indices: Vec<DrawIdx>,
    pub draws: Vec<UiDraw>,
    pub push: UiPushConstants,
}

impl UiGeometry {
    pub fn from_draw_data(draw_data: &DrawData, extent: vk::Extent2D) -> Self {
        let mut geometry = Self {
            push: UiPushConstants::for_display(draw_data.display_pos, draw_data.display_size),
            ..Self::default()
        };
        for list in draw_data.draw_lists() {
            geometry.append_list(
                list.vtx_buffer(),
                list.idx_buffer(),
                list.commands(),
                draw_data.display_pos,
                extent,
            );
        }
        geometry
    }

    /// Append one draw list; its offsets are rebased onto what is already
    /// here.
    pub fn append_list(
        &mut self,
        vertices: &[DrawVert],
        indices: &[DrawIdx],
        commands: impl IntoIterator<Item = DrawCmd>,
        display_pos: [f32; 2],
        extent: vk::Extent2D,
    ) {
        let base_vertex = self.vertices.len();
        let base_index = self.indices.len();
        self.vertices.extend(vertices.iter().map(UiVertex::from));
        self.indices.extend_from_slice(indices);

        for command in commands {
            match command {
                DrawCmd::Elements {
                    count,
                    cmd_params:
                        DrawCmdParams {
                            clip_rect,
                            vtx_offset,
                            idx_offset,
                            ..
                        },
                } => {
                    let Some(scissor) = clip_to_scissor(clip_rect, display_pos, extent) else {
                        continue;
                    };
                    self.draws.push(UiDraw {
                        scissor,
                        index_count: count as u32,
                        first_index: (base_index + idx_offset) as u32,
                        vertex_offset: (base_vertex + vtx_offset) as i32,
                    });
                }
                // Pipeline state is bound once per frame.
                DrawCmd::ResetRenderState => {}
                DrawCmd::RawCallback { .. } => {}
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

/// RGBA8 pixels of imgui's font atlas.
#[derive(Debug, Clone)]
pub struct FontAtlas {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Host side of the overlay: the imgui context and the panel layout.
pub struct UiPanel {
    context: imgui::Context,
    title: String,
}

impl UiPanel {
    /// Creates the imgui context and builds its font atlas.
    ///
    /// Only one imgui context may exist at a time.
    pub fn new(title: impl Into<String>) -> (Self, FontAtlas) {
        let mut context = imgui::Context::create();
        context.set_ini_filename(None);
        context
            .io_mut()
            .backend_flags
            .insert(imgui::BackendFlags::RENDERER_HAS_VTX_OFFSET);

        let fonts = context.fonts();
        let texture = fonts.build_rgba32_texture();
        let atlas = FontAtlas {
            width: texture.width,
            height: texture.height,
            pixels: texture.data.to_vec(),
        };
        fonts.tex_id = TextureId::new(FONT_TEXTURE_ID);

        let panel = Self {
            context,
            title: title.into(),
        };
        (panel, atlas)
    }

    /// Lay out `frame` in a window at the top-left corner.
    pub fn build(&mut self, frame: &UiFrame, extent: vk::Extent2D, dt: f32) -> UiGeometry {
        let io = self.context.io_mut();
        io.display_size = [extent.width as f32, extent.height as f32];
        io.display_framebuffer_scale = [1.0, 1.0];
        io.delta_time = dt.max(MIN_DELTA);

        let ui = self.context.new_frame();
        ui.window(&self.title)
            .position([10.0, 10.0], Condition::FirstUseEver)
            .always_auto_resize(true)
            .build(|| {
                for widget in frame.widgets() {
                    match widget {
                        Widget::Text(text) => ui.text(text),
                        Widget::Value { label, value } => ui.text(format!("{label}: {value}")),
                    }
                }
            });
        UiGeometry::from_draw_data(self.context.render(), extent)
    }
}

#[derive(Default)]
struct SlotBuffers {
    vertices: Option<Buffer>,
    indices: Option<Buffer>,
}

/// Write `bytes` to the start of `slot`, replacing the buffer when it is too
/// small. The slot's previous frame has retired, so the old buffer is idle.
fn upload_into(
    device: &Arc<Device>,
    slot: &mut Option<Buffer>,
    usage: BufferUsage,
    bytes: &[u8],
) -> RhiResult<vk::Buffer> {
    let needed = bytes.len() as u64;
    let buffer = match slot.take() {
        Some(buffer) if buffer.size() >= needed => slot.insert(buffer),
        _ => {
            let size = grown_capacity(needed);
            debug!(usage = usage.name(), size, "Growing UI buffer");
            slot.insert(Buffer::new(device.clone(), usage, size)?)
        }
    };
    buffer.write(0, bytes)?;
    if !buffer.is_coherent() {
        buffer.flush(0, needed)?;
    }
    Ok(buffer.handle())
}

/// Overlay that draws the UI panel on the GPU.
pub struct ImguiOverlay {
    device: Arc<Device>,
    panel: UiPanel,
    frame: UiFrame,
    slots: Vec<SlotBuffers>,
    last_frame: Instant,

    pipeline: Pipeline,
    layout: PipelineLayout,
    descriptor_set: vk::DescriptorSet,
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,
    _sampler: Sampler,
    _font: Texture2D,
}

impl ImguiOverlay {
    /// Uploads the font atlas and builds the `ui` pipeline for `color_format`.
    pub fn new(
        device: &Arc<Device>,
        upload_pool: &CommandPool,
        color_format: vk::Format,
        frames_in_flight: usize,
        shader_dir: &Path,
        title: &str,
    ) -> RhiResult<Self> {
        let vert = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join(spirv_file_name("ui", ShaderStage::Vertex)),
            ShaderStage::Vertex,
        )?;
        let frag = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join(spirv_file_name("ui", ShaderStage::Fragment)),
            ShaderStage::Fragment,
        )?;

        let (panel, atlas) = UiPanel::new(title);
        let font = Texture2D::from_rgba8(
            device.clone(),
            upload_pool,
            atlas.width,
            atlas.height,
            &atlas.pixels,
        )?;
        let sampler = Sampler::linear_repeat(device.clone())?;

        let bindings = [DescriptorBinding::combined_image_sampler(
            0,
            vk::ShaderStageFlags::FRAGMENT,
        )];
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
        let descriptor_pool = DescriptorPool::new(device.clone(), 1, &pool_sizes_for(&bindings, 1))?;
        let descriptor_set = descriptor_pool
            .allocate(&[set_layout.handle()])?
            .first()
            .copied()
            .ok_or(RhiError::ResourceCreation {
                what: "UI descriptor set",
                source: vk::Result::ERROR_OUT_OF_POOL_MEMORY,
            })?;
        write_descriptor_set(
            device,
            descriptor_set,
            &[(
                0,
                DescriptorWrite::SampledImage {
                    sampler: sampler.handle(),
                    view: font.view(),
                    layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                },
            )],
        );

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .size(size_of::<UiPushConstants>() as u32);
        let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[push_range])?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .vertex_input(UiVertex::binding_description(), &UiVertex::attribute_descriptions())
            .cull_mode(vk::CullModeFlags::NONE)
            .alpha_blend(true)
            .color_format(color_format)
            .build(device.clone(), &layout)?;

        info!(
            "ImGui overlay ready: font atlas {}x{}",
            atlas.width, atlas.height
        );
        Ok(Self {
            device: device.clone(),
            panel,
            frame: UiFrame::new(),
            slots: (0..frames_in_flight).map(|_| SlotBuffers::default()).collect(),
            last_frame: Instant::now(),
            pipeline,
            layout,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            _sampler: sampler,
            _font: font,
        })
    }
}

impl UiOverlay for ImguiOverlay {
    fn begin_frame(&mut self) -> &mut UiFrame {
        self.frame.clear();
        &mut self.frame
    }

    fn render(&mut self, cmd: &CommandBuffer, frame: &FrameContext) -> RhiResult<()> {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        let geometry = self.panel.build(&self.frame, frame.extent, dt);
        if geometry.is_empty() {
            return Ok(());
        }
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(frame.slot)
            .ok_or(RhiError::SlotOutOfRange {
                index: frame.slot,
                count,
            })?;
        let vertices = upload_into(
            &self.device,
            &mut slot.vertices,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&geometry.vertices),
        )?;
        let indices = upload_into(
            &self.device,
            &mut slot.indices,
            BufferUsage::Index,
            bytemuck::cast_slice(&geometry.indices),
        )?;

        cmd.set_viewport_and_scissor(frame.extent);
        cmd.bind_graphics_pipeline(self.pipeline.handle());
        cmd.bind_descriptor_sets(self.layout.handle(), 0, &[self.descriptor_set], &[]);
        cmd.bind_vertex_buffer(0, vertices);
        cmd.bind_index_buffer(indices, ui_index_type());
        cmd.push_constants(
            self.layout.handle(),
            vk::ShaderStageFlags::VERTEX,
            &geometry.push,
        );
        for draw in &geometry.draws {
            cmd.set_scissor(draw.scissor);
            cmd.draw_indexed_at(draw.index_count, draw.first_index, draw.vertex_offset);
        }
        cmd.set_viewport_and_scissor(frame.extent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn vert(x: f32, y: f32) -> DrawVert {
        DrawVert {
            pos: [x, y],
            uv: [0.0, 0.0],
            col: [255, 255, 255, 255],
        }
    }

    fn elements(count: usize, clip_rect: [f32; 4], vtx_offset: usize, idx_offset: usize) -> DrawCmd {
        DrawCmd::Elements {
            count,
            cmd_params: DrawCmdParams {
                clip_rect,
                texture_id: TextureId::new(FONT_TEXTURE_ID),
                vtx_offset,
                idx_offset,
            },
        }
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(size_of::<UiVertex>(), 20);
        let attributes = UiVertex::attribute_descriptions();
        assert_eq!(attributes[1].offset, 8);
        assert_eq!(attributes[2].offset, 16);
        assert_eq!(attributes[2].format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(UiVertex::binding_description().stride, 20);
        assert_eq!(ui_index_type(), vk::IndexType::UINT16);
    }

    #[test]
    fn test_push_constants_map_display_to_clip_space() {
        let push = UiPushConstants::for_display([0.0, 0.0], [800.0, 600.0]);
        let clip = |x: f32, y: f32| {
            [
                x * push.scale[0] + push.translate[0],
                y * push.scale[1] + push.translate[1],
            ]
        };
        assert_eq!(clip(0.0, 0.0), [-1.0, -1.0]);
        assert_eq!(clip(800.0, 600.0), [1.0, 1.0]);
        assert_eq!(clip(400.0, 300.0), [0.0, 0.0]);

        let shifted = UiPushConstants::for_display([100.0, 50.0], [800.0, 600.0]);
        assert_eq!(100.0 * shifted.scale[0] + shifted.translate[0], -1.0);
    }

    #[test]
    fn test_clip_rect_is_clamped_to_render_area() {
        let inside = clip_to_scissor([10.0, 20.0, 110.0, 70.0], [0.0, 0.0], EXTENT).unwrap();
        assert_eq!(inside.offset, vk::Offset2D { x: 10, y: 20 });
        assert_eq!(
            inside.extent,
            vk::Extent2D {
                width: 100,
                height: 50
            }
        );

        let spill = clip_to_scissor([-30.0, 580.0, 50.0, 900.0], [0.0, 0.0], EXTENT).unwrap();
        assert_eq!(spill.offset, vk::Offset2D { x: 0, y: 580 });
        assert_eq!(
            spill.extent,
            vk::Extent2D {
                width: 50,
                height: 20
            }
        );

        assert_eq!(clip_to_scissor([900.0, 0.0, 950.0, 10.0], [0.0, 0.0], EXTENT), None);
        assert_eq!(clip_to_scissor([5.0, 5.0, 5.0, 40.0], [0.0, 0.0], EXTENT), None);
    }

    #[test]
    fn test_draw_lists_are_rebased() {
        let mut geometry = UiGeometry::default();
        let full = [0.0, 0.0, 800.0, 600.0];
        geometry.append_list(
            &[vert(0.0, 0.0), vert(1.0, 0.0), vert(0.0, 1.0)],
            &[0, 1, 2],
            [elements(3, full, 0, 0)],
            [0.0, 0.0],
            EXTENT,
        );
        geometry.append_list(
            &[vert(0.0, 0.0), vert(1.0, 0.0), vert(0.0, 1.0), vert(1.0, 1.0)],
            &[0, 1, 2, 2, 1, 3],
            [
                elements(3, full, 0, 0),
                DrawCmd::ResetRenderState,
                elements(3, [0.0, 0.0, 0.0, 0.0], 0, 3),
                elements(3, full, 1, 3),
            ],
            [0.0, 0.0],
            EXTENT,
        );

        assert_eq!(geometry.vertices.len(), 7);
        assert_eq!(geometry.indices.len(), 9);
        let offsets: Vec<(u32, i32)> = geometry
            .draws
            .iter()
            .map(|d| (d.first_index, d.vertex_offset))
            .collect();
        // The empty clip rect is dropped.
        assert_eq!(offsets, [(0, 0), (3, 3), (6, 4)]);
        assert_eq!(geometry.vertices[4].position, [1.0, 0.0]);
        assert_eq!(geometry.vertices[4].color, [255; 4]);
    }

    #[test]
    fn test_buffers_grow_to_powers_of_two() {
        assert_eq!(grown_capacity(1), MIN_BUFFER_SIZE);
        assert_eq!(grown_capacity(MIN_BUFFER_SIZE + 1), MIN_BUFFER_SIZE * 2);
        assert_eq!(grown_capacity(300_000), 512 * 1024);
    }

    // The only test that creates an imgui context; imgui allows one at a time.
    #[test]
    fn test_panel_draws_every_widget() {
        let (mut panel, atlas) = UiPanel::new("vkdemo");
        assert!(atlas.width > 0 && atlas.height > 0);
        assert_eq!(
            atlas.pixels.len() as u64,
            u64::from(atlas.width) * u64::from(atlas.height) * 4
        );

        let mut frame = UiFrame::new();
        let empty = panel.build(&frame, EXTENT, 1.0 / 60.0);

        frame.text("pbr");
        frame.value("metallic", "0.30");
        frame.value("roughness", "1.00");
        // imgui auto-sizes new windows over their first frames.
        for _ in 0..3 {
            panel.build(&frame, EXTENT, 1.0 / 60.0);
        }
        let geometry = panel.build(&frame, EXTENT, 1.0 / 60.0);

        assert!(!geometry.is_empty());
        assert!(geometry.indices.len() > empty.indices.len());
        for draw in &geometry.draws {
            let end = draw.first_index + draw.index_count;
            assert!(end as usize <= geometry.indices.len());
            let indices = &geometry.indices[draw.first_index as usize..end as usize];
            for &index in indices {
                assert!((draw.vertex_offset as usize + index as usize) < geometry.vertices.len());
            }
            assert!(draw.scissor.offset.x >= 0 && draw.scissor.offset.y >= 0);
            assert!(draw.scissor.offset.x as u32 + draw.scissor.extent.width <= EXTENT.width);
            assert!(draw.scissor.offset.y as u32 + draw.scissor.extent.height <= EXTENT.height);
        }
        assert_eq!(geometry.push, UiPushConstants::for_display([0.0, 0.0], [800.0, 600.0]));
    }
}
