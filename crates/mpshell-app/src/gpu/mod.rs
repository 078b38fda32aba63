pub mod context;
pub mod video_layer;

pub use context::GpuContext;
pub use video_layer::VideoLayer;
