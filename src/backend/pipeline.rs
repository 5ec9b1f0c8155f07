// Graphics pipeline creation
//
// One render pass with a single cleared color attachment, and a pipeline
// that draws a triangle generated entirely in the vertex shader. Viewport
// and scissor are dynamic, so the pipeline does not depend on the extent.

use super::gpu::Gpu;
use super::handle::Owned;
use super::shader::{create_shader_module, ShaderSource, ShaderStage};
use crate::error::{Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

pub struct DrawPipeline<G: Gpu> {
    // Reverse creation order
    pipeline: Owned<G, vk::Pipeline>,
    layout: Owned<G, vk::PipelineLayout>,
    render_pass: Owned<G, vk::RenderPass>,
}

impl<G: Gpu> DrawPipeline<G> {
    pub fn new(gpu: &Arc<G>, format: vk::Format, shaders: &dyn ShaderSource) -> Result<Self> {
        let render_pass = create_render_pass(gpu, format)?;

        log::info!("Creating graphics pipeline");

        // Transient: dropped at the end of this function, after the pipeline exists
        let vert_module = create_shader_module(gpu, shaders, ShaderStage::Vertex)?;
        let frag_module = create_shader_module(gpu, shaders, ShaderStage::Fragment)?;

        let entry_point = c"main";
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(ShaderStage::Vertex.flags())
                .module(vert_module.handle())
                .name(entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(ShaderStage::Fragment.flags())
                .module(frag_module.handle())
                .name(entry_point)
                .build(),
        ];

        // No vertex buffers: positions come from gl_VertexIndex
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the actual rectangles are set while recording
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments)
            .blend_constants([0.0; 4]);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

        // No descriptor sets, no push constants
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = gpu
            .create_pipeline_layout(&layout_info)
            .creating("pipeline layout")?;
        let layout = Owned::new(gpu, layout);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0)
            .base_pipeline_handle(vk::Pipeline::null())
            .base_pipeline_index(-1);

        let pipeline = gpu
            .create_graphics_pipeline(&pipeline_info)
            .creating("graphics pipeline")?;

        Ok(Self {
            pipeline: Owned::new(gpu, pipeline),
            layout,
            render_pass,
        })
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }
}

/// Single color attachment: cleared on load, stored, handed to presentation.
fn create_render_pass<G: Gpu>(
    gpu: &Arc<G>,
    format: vk::Format,
) -> Result<Owned<G, vk::RenderPass>> {
    log::info!("Creating render pass");

    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = [color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachments)
        .build();

    let attachments = [color_attachment];
    let subpasses = [subpass];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses);

    let render_pass = gpu
        .create_render_pass(&render_pass_info)
        .creating("render pass")?;
    Ok(Owned::new(gpu, render_pass))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{Call, FakeGpu};
    use crate::backend::gpu::DeviceObject;
    use crate::backend::shader::tests::stub_shaders;
    use crate::backend::shader::InMemoryShaders;
    use crate::error::RenderError;
    use pretty_assertions::assert_eq;

    #[test]
    fn fixed_function_state_matches_the_triangle() {
        let gpu = Arc::new(FakeGpu::new());
        let _pipeline =
            DrawPipeline::new(&gpu, vk::Format::B8G8R8A8_SRGB, &stub_shaders()).unwrap();

        let summary = gpu.pipeline.borrow().clone().unwrap();
        assert_eq!(summary.stage_count, 2);
        assert_eq!(summary.vertex_bindings, 0);
        assert_eq!(summary.vertex_attributes, 0);
        assert_eq!(summary.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(summary.dynamic_states, DYNAMIC_STATES.to_vec());
        assert_eq!(summary.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(summary.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(summary.front_face, vk::FrontFace::CLOCKWISE);
        assert!(!summary.depth_bias);
        assert_eq!(summary.samples, vk::SampleCountFlags::TYPE_1);
        assert!(!summary.blend_enable);
        assert_eq!(summary.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn render_pass_clears_and_hands_the_image_to_presentation() {
        let gpu = Arc::new(FakeGpu::new());
        let _pipeline =
            DrawPipeline::new(&gpu, vk::Format::B8G8R8A8_SRGB, &stub_shaders()).unwrap();

        let render_pass = gpu.render_pass.borrow().clone().unwrap();
        assert_eq!(render_pass.attachment_count, 1);
        assert_eq!(render_pass.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(render_pass.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(render_pass.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(render_pass.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(render_pass.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(render_pass.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(render_pass.subpass_count, 1);
        assert_eq!(render_pass.bind_point, vk::PipelineBindPoint::GRAPHICS);
        assert_eq!(
            render_pass.color_refs,
            vec![(0, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)]
        );
    }

    #[test]
    fn shader_modules_do_not_outlive_construction() {
        let gpu = Arc::new(FakeGpu::new());
        let pipeline = DrawPipeline::new(&gpu, vk::Format::B8G8R8A8_SRGB, &stub_shaders()).unwrap();

        let shader_modules_destroyed = gpu
            .destroyed()
            .iter()
            .filter(|o| matches!(o, DeviceObject::ShaderModule(_)))
            .count();
        assert_eq!(shader_modules_destroyed, 2);

        // render pass, layout, pipeline
        assert_eq!(gpu.live_count(), 3);
        drop(pipeline);
        assert_eq!(gpu.live_count(), 0);
    }

    #[test]
    fn pipeline_failure_releases_everything_built_so_far() {
        let gpu = Arc::new(FakeGpu::new());
        gpu.fail_creating.set(Some("pipeline"));
        let err = DrawPipeline::new(&gpu, vk::Format::B8G8R8A8_SRGB, &stub_shaders())
            .err()
            .unwrap();
        assert!(matches!(err, RenderError::Creation { what: "graphics pipeline", .. }));
        assert_eq!(gpu.live_count(), 0);
    }

    #[test]
    fn bad_shader_aborts_before_the_pipeline() {
        let gpu = Arc::new(FakeGpu::new());
        let shaders = InMemoryShaders {
            vertex: vec![1, 2, 3],
            fragment: vec![1, 2, 3],
        };
        let err = DrawPipeline::new(&gpu, vk::Format::B8G8R8A8_SRGB, &shaders)
            .err()
            .unwrap();
        assert!(matches!(err, RenderError::InvalidSpirv { .. }));
        assert!(!gpu.calls().contains(&Call::Create("pipeline")));
        assert_eq!(gpu.live_count(), 0);
    }
}
