//! Pipeline layouts and graphics pipelines for dynamic rendering.
//!
//! Viewport and scissor are always dynamic, so pipelines survive swapchain
//! recreation untouched.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;

pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = unsafe {
            device
                .handle()
                .create_pipeline_layout(&create_info, None)
                .map_err(RhiError::creation("pipeline layout"))?
        };
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None)
        };
    }
}

pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline(self.pipeline, None) };
    }
}

/// Constant and slope depth bias, used by shadow-map passes against acne.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub slope_factor: f32,
}

/// Builder for graphics pipelines.
///
/// A pipeline without color formats is depth-only; its fragment shader is
/// optional.
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth_test: bool,
    depth_write: bool,
    depth_compare_op: vk::CompareOp,
    depth_bias: Option<DepthBias>,
    alpha_blend: bool,
    color_formats: Vec<vk::Format>,
    depth_format: Option<vk::Format>,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            depth_bias: None,
            alpha_blend: false,
            color_formats: Vec::new(),
            depth_format: None,
        }
    }

    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    pub fn vertex_input(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_bindings = vec![binding];
        self.vertex_attributes = attributes.to_vec();
        self
    }

    pub fn cull_mode(mut self, mode: vk::CullModeFlags) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: vk::FrontFace) -> Self {
        self.front_face = face;
        self
    }

    pub fn depth(mut self, test: bool, write: bool, compare_op: vk::CompareOp) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare_op = compare_op;
        self
    }

    pub fn depth_bias(mut self, bias: DepthBias) -> Self {
        self.depth_bias = Some(bias);
        self
    }

    pub fn alpha_blend(mut self, enable: bool) -> Self {
        self.alpha_blend = enable;
        self
    }

    pub fn color_format(mut self, format: vk::Format) -> Self {
        self.color_formats.push(format);
        self
    }

    pub fn depth_format(mut self, format: vk::Format) -> Self {
        self.depth_format = Some(format);
        self
    }

    fn validate(&self) -> RhiResult<&'a Shader> {
        let vertex = self
            .vertex_shader
            .ok_or_else(|| RhiError::Shader("pipeline needs a vertex shader".to_string()))?;
        if !self.color_formats.is_empty() && self.fragment_shader.is_none() {
            return Err(RhiError::Shader(
                "color output requires a fragment shader".to_string(),
            ));
        }
        if self.color_formats.is_empty() && self.depth_format.is_none() {
            return Err(RhiError::Shader(
                "pipeline has neither color nor depth attachments".to_string(),
            ));
        }
        Ok(vertex)
    }

    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let vertex_shader = self.validate()?;

        let mut stages = vec![vertex_shader.stage_create_info()];
        if let Some(fragment) = self.fragment_shader {
            stages.push(fragment.stage_create_info());
        }

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let mut rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face);
        if let Some(bias) = self.depth_bias {
            rasterization = rasterization
                .depth_bias_enable(true)
                .depth_bias_constant_factor(bias.constant_factor)
                .depth_bias_slope_factor(bias.slope_factor);
        }

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let has_depth = self.depth_format.is_some();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth && self.depth_test)
            .depth_write_enable(has_depth && self.depth_write)
            .depth_compare_op(self.depth_compare_op);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = self
            .color_formats
            .iter()
            .map(|_| blend_attachment(self.alpha_blend))
            .collect();
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&self.color_formats);
        if let Some(format) = self.depth_format {
            rendering = rendering.depth_attachment_format(format);
        }

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout.handle())
            .push_next(&mut rendering);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| RhiError::creation("graphics pipeline")(e))?
        };
        let Some(&pipeline) = pipeline.first() else {
            return Err(RhiError::ResourceCreation {
                what: "graphics pipeline",
                source: vk::Result::ERROR_UNKNOWN,
            });
        };
        debug!(
            colors = self.color_formats.len(),
            depth = ?self.depth_format,
            "Graphics pipeline created"
        );
        Ok(Pipeline { device, pipeline })
    }
}

fn blend_attachment(alpha_blend: bool) -> vk::PipelineColorBlendAttachmentState {
    let state = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA);
    if !alpha_blend {
        return state;
    }
    state
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(builder.depth_compare_op, vk::CompareOp::LESS);
        assert!(builder.depth_bias.is_none());
        assert!(builder.color_formats.is_empty());
    }

    #[test]
    fn test_builder_requires_vertex_shader() {
        let builder = GraphicsPipelineBuilder::new().depth_format(vk::Format::D32_SFLOAT);
        assert!(matches!(builder.validate(), Err(RhiError::Shader(_))));
    }

    #[test]
    fn test_builder_depth_bias() {
        let bias = DepthBias {
            constant_factor: 1.25,
            slope_factor: 1.75,
        };
        let builder = GraphicsPipelineBuilder::new().depth_bias(bias);
        assert_eq!(builder.depth_bias, Some(bias));
    }

    #[test]
    fn test_blend_attachment() {
        let opaque = blend_attachment(false);
        assert_eq!(opaque.blend_enable, vk::FALSE);
        let blended = blend_attachment(true);
        assert_eq!(blended.blend_enable, vk::TRUE);
        assert_eq!(blended.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
    }
}
