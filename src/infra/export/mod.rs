use std::path::PathBuf;

use thiserror::Error;

use crate::usecase::ports::layer::LayerError;

pub mod csv;
pub mod sidecar;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported code page: {0}")]
    UnsupportedCodePage(u32),

    #[error("invalid code page text: {0}")]
    InvalidCodePage(String),

    #[error("exported text is not valid UTF-8")]
    NotUtf8,

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error(transparent)]
    Layer(#[from] LayerError),
}
