/// Draw pipelines and shader loading

pub mod draw_pipeline;

pub use draw_pipeline::{
    CameraBackgroundPipeline, DrawPipeline, DrawRequest, MeshPipeline, PassInputs, ShaderSource,
    CAMERA_SET_INDEX,
};
