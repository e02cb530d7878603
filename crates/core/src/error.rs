use crate::config::ConfigError;
use crate::pdf_export::ExportError;
use page_editor_cache::SessionError;
use page_editor_render::RenderError;
use page_editor_scheduler::Cancelled;

/// Engine-level errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The document itself could not be read; nothing can be shown
    #[error("failed to parse document: {0}")]
    DocumentParse(#[source] RenderError),

    /// One page failed; it is marked Failed and can be retried
    #[error("page {page} failed to render: {source}")]
    PageRender {
        page: u32,
        #[source]
        source: RenderError,
    },

    #[error("page {0} is not loaded")]
    PageNotLoaded(u32),

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Cancelled> for EngineError {
    fn from(_: Cancelled) -> Self {
        EngineError::Cancelled
    }
}

impl EngineError {
    /// Fatal errors abort the operation that raised them; the rest leave the
    /// engine usable
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::DocumentParse(_)
            | EngineError::Export(_)
            | EngineError::Config(_)
            | EngineError::Io(_) => true,
            EngineError::Session(SessionError::Failed(_)) => true,
            EngineError::Session(_) => false,
            EngineError::PageRender { .. }
            | EngineError::PageNotLoaded(_)
            | EngineError::PageOutOfRange { .. }
            | EngineError::Cancelled => false,
        }
    }

    /// Cancellation is never shown to the user
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            EngineError::Cancelled | EngineError::Session(SessionError::Cancelled)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_classification() {
        assert!(EngineError::DocumentParse(RenderError::NoPages).is_fatal());
        assert!(!EngineError::PageRender {
            page: 2,
            source: RenderError::Raster("decode".into())
        }
        .is_fatal());
        assert!(!EngineError::Cancelled.is_fatal());
        assert!(EngineError::Session(SessionError::Failed("x".into())).is_fatal());
        assert!(EngineError::from(Cancelled).is_cancellation());
        assert!(EngineError::Session(SessionError::Cancelled).is_cancellation());
    }

    #[test]
    fn test_messages_name_the_page() {
        let error = EngineError::PageRender {
            page: 4,
            source: RenderError::Raster("bad stream".into()),
        };
        assert_eq!(error.to_string(), "page 4 failed to render: raster error: bad stream");
    }
}
