pub mod decoder;
pub mod frame;
#[cfg(feature = "gstreamer-source")]
pub mod gst_source;
pub mod source;
pub mod synthetic;

pub use frame::Frame;
pub use frame::FrameMetadata;
pub use frame::PixelFormat;
pub use source::{DefaultConnector, FrameSource, SourceConnector};
