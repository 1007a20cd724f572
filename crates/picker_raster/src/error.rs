use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Cannot allocate a {width}x{height} canvas")]
    EmptyCanvas { width: u32, height: u32 },

    #[error("Base canvas is {found_width}x{found_height}, expected {width}x{height}")]
    CanvasSize {
        width: u32,
        height: u32,
        found_width: u32,
        found_height: u32,
    },
}

pub type Result<T> = std::result::Result<T, RasterError>;
