/// Graphics pipelines for the three draw kinds
///
/// Every pipeline renders into the swapchain render pass with dynamic
/// viewport and scissor and no depth attachment. The kind picks the rest:
///
/// | kind             | vertex input | cull | blend          | set 0   |
/// |------------------|--------------|------|----------------|---------|
/// | Opaque           | MeshVertex   | back | off            | uniform |
/// | Translucent      | MeshVertex   | none | src alpha over | uniform |
/// | CameraBackground | none         | none | off            | planes  |

use ash::vk;
use krakatoa_engine::krakatoa::gpu::{PipelineDesc, PipelineKind};
use krakatoa_engine::krakatoa::resource::MeshVertex;
use krakatoa_engine::krakatoa::{Error, Result};
use krakatoa_engine::{engine_bail, engine_err, engine_error};

use crate::vulkan_descriptors::SetLayoutKind;

/// Fixed-function choices that depend on the pipeline kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KindState {
    pub vertex_input: bool,
    pub cull_mode: vk::CullModeFlags,
    pub blend: bool,
    pub set_layout: SetLayoutKind,
}

impl KindState {
    pub(crate) fn for_kind(kind: PipelineKind) -> Self {
        match kind {
            PipelineKind::Opaque => Self {
                vertex_input: true,
                cull_mode: vk::CullModeFlags::BACK,
                blend: false,
                set_layout: SetLayoutKind::Uniform,
            },
            PipelineKind::Translucent => Self {
                vertex_input: true,
                cull_mode: vk::CullModeFlags::NONE,
                blend: true,
                set_layout: SetLayoutKind::Uniform,
            },
            PipelineKind::CameraBackground => Self {
                vertex_input: false,
                cull_mode: vk::CullModeFlags::NONE,
                blend: false,
                set_layout: SetLayoutKind::Plane,
            },
        }
    }

    pub(crate) fn blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(self.blend);
        if !self.blend {
            return attachment;
        }
        attachment
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    }
}

/// Binding 0, per vertex, laid out as [`MeshVertex`]
pub(crate) fn mesh_vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: MeshVertex::STRIDE,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

/// Position, normal and uv at locations 0, 1 and 2
pub(crate) fn mesh_vertex_attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: MeshVertex::POSITION_OFFSET,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: MeshVertex::NORMAL_OFFSET,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: MeshVertex::UV_OFFSET,
        },
    ]
}

/// Build a pipeline and its layout. The shader modules only live for the
/// duration of the call.
pub(crate) fn create_graphics_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    set_layout: vk::DescriptorSetLayout,
    desc: &PipelineDesc,
) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
    if desc.vertex_spirv.is_empty() || desc.fragment_spirv.is_empty() {
        engine_bail!("krakatoa::vulkan", "Pipeline '{}' has empty shader bytecode", desc.name);
    }
    let state = KindState::for_kind(desc.kind);

    unsafe {
        let vertex_module = create_shader_module(device, &desc.vertex_spirv, &desc.name)?;
        let fragment_module = match create_shader_module(device, &desc.fragment_spirv, &desc.name) {
            Ok(module) => module,
            Err(e) => {
                device.destroy_shader_module(vertex_module, None);
                return Err(e);
            }
        };

        let result = build(device, render_pass, set_layout, &state, vertex_module, fragment_module, &desc.name);

        device.destroy_shader_module(vertex_module, None);
        device.destroy_shader_module(fragment_module, None);
        result
    }
}

unsafe fn build(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    set_layout: vk::DescriptorSetLayout,
    state: &KindState,
    vertex_module: vk::ShaderModule,
    fragment_module: vk::ShaderModule,
    name: &str,
) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_module)
            .name(c"main"),
    ];

    let bindings = [mesh_vertex_binding()];
    let attributes = mesh_vertex_attributes();
    let vertex_input_state = if state.vertex_input {
        vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes)
    } else {
        vk::PipelineVertexInputStateCreateInfo::default()
    };

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport state (dynamic)
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(state.cull_mode)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let color_blend_attachment = state.blend_attachment();
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(std::slice::from_ref(&color_blend_attachment));

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let set_layouts = [set_layout];
    let layout = device
        .create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts), None)
        .map_err(|e| engine_err!("krakatoa::vulkan", "Failed to create pipeline layout for '{}': {:?}", name, e))?;

    let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    match device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None) {
        Ok(pipelines) => Ok((pipelines[0], layout)),
        Err((_, e)) => {
            device.destroy_pipeline_layout(layout, None);
            engine_error!("krakatoa::vulkan", "Failed to create graphics pipeline '{}': {:?}", name, e);
            Err(Error::BackendError(format!("Failed to create graphics pipeline '{}': {:?}", name, e)))
        }
    }
}

unsafe fn create_shader_module(device: &ash::Device, code: &[u32], name: &str) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    device
        .create_shader_module(&create_info, None)
        .map_err(|e| engine_err!("krakatoa::vulkan", "Failed to create shader module for '{}': {:?}", name, e))
}
