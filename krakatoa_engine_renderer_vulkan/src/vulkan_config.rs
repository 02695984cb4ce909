/// Vulkan backend configuration
///
/// Validation layers and the debug messenger are only compiled in with the
/// `vulkan-validation` feature; without it `enable_validation` is ignored
/// with a warning.

use ash::vk;

/// Which validation messages reach the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

impl DebugSeverity {
    /// Severities the messenger is created with
    pub fn message_severity_flags(self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        match self {
            DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            DebugSeverity::ErrorsAndWarnings => {
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            }
            DebugSeverity::All => {
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            }
        }
    }

    /// Whether a message of `severity` passes this filter
    pub fn allows(self, severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> bool {
        self.message_severity_flags().intersects(severity)
    }
}

/// Where validation messages are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    Console,
    File(String),
    Both(String),
}

/// Message categories shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self { show_general: false, show_validation: true, show_performance: true }
    }
}

impl DebugMessageFilter {
    pub fn allows(&self, message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> bool {
        if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
            self.show_validation
        } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
            self.show_performance
        } else {
            self.show_general
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugConfig {
    pub severity: DebugSeverity,
    pub output: DebugOutput,
    pub message_filter: DebugMessageFilter,
    /// Abort the process on the first validation error
    pub break_on_error: bool,
    /// Count messages per severity (see `validation_stats`)
    pub enable_stats: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            severity: DebugSeverity::ErrorsAndWarnings,
            output: DebugOutput::Console,
            message_filter: DebugMessageFilter::default(),
            break_on_error: false,
            enable_stats: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulkanConfig {
    pub app_name: String,
    /// Enable `VK_LAYER_KHRONOS_validation` and debug object names
    pub enable_validation: bool,
    pub debug: DebugConfig,
    /// Swapchain images requested; clamped to the surface limits
    pub min_image_count: u32,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            app_name: "Krakatoa Application".to_string(),
            enable_validation: cfg!(debug_assertions),
            debug: DebugConfig::default(),
            min_image_count: 3,
        }
    }
}
