/// Per-object uniform block shared with the mesh shaders

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Stable identity of a drawable object, the uniform cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// std140-compatible uniform block for one draw.
///
/// `display_rotation` is the camera image rotation in quarter turns, used by
/// the background shader to match the display orientation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub color: Vec4,
    pub display_rotation: i32,
    _padding: [i32; 3],
}

impl ObjectUniforms {
    pub fn new(model: Mat4, view: Mat4, projection: Mat4, color: Vec4) -> Self {
        Self { model, view, projection, color, display_rotation: 0, _padding: [0; 3] }
    }

    pub fn with_display_rotation(mut self, quarter_turns: i32) -> Self {
        self.display_rotation = quarter_turns.rem_euclid(4);
        self
    }

    /// Combined transform applied to vertex positions
    pub fn model_view_projection(&self) -> Mat4 {
        self.projection * self.view * self.model
    }
}

impl Default for ObjectUniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY, Vec4::ONE)
    }
}
