/// Errors raised while reading or rasterizing a document
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("encrypted PDFs are not supported by the default source")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("raster error: {0}")]
    Raster(String),
    #[error("rendering backend error: {0}")]
    Backend(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
