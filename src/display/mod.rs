pub mod mosaic;
pub mod overlay;

pub use mosaic::{compose_mosaic, CellSize, Mosaic, MosaicLayout, Tile};
pub use overlay::FrameAnnotator;
