//! Per-object GPU resources
//!
//! Uniform blocks cached per object with idle eviction, and the mesh
//! buffers draws bind.

pub mod uniforms;
pub mod mesh_binding;
pub mod resource_cache;

pub use uniforms::{ObjectId, ObjectUniforms};
pub use mesh_binding::{MeshBinding, MeshBuffers, MeshVertex};
pub use resource_cache::{ResourceCache, UniformEntry, UNIFORM_SET_INDEX};
