/// Camera image ingestion (YUV luma + interleaved chroma planes)

pub mod camera_frame;
pub mod plane_copy;
pub mod plane_ingestor;

pub use camera_frame::CameraFrame;
pub use plane_copy::{copy_plane, PlaneLayout};
pub use plane_ingestor::{CameraPlaneIngestor, IngestOutcome};
