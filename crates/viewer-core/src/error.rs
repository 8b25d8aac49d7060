use pdf_engine::PdfEngineError;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("failed to load {target}: {source}")]
    Load {
        target: String,
        #[source]
        source: PdfEngineError,
    },
    #[error("failed to render page {page}: {source}")]
    Render {
        page: u32,
        #[source]
        source: PdfEngineError,
    },
    #[error("failed to export annotated document: {0}")]
    Export(#[source] PdfEngineError),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("no page has been rendered yet")]
    NoDocument,
    #[error("invalid search pattern: {0}")]
    Search(#[from] regex::Error),
}

impl ViewerError {
    /// A superseded load or render. Never shown to the user.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Load { source, .. } | Self::Render { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Banner category for failures the user should see; `None` for caller
    /// mistakes and cancellations.
    pub fn kind(&self) -> Option<ErrorKind> {
        if self.is_cancellation() {
            return None;
        }
        match self {
            Self::Load { .. } => Some(ErrorKind::Load),
            Self::Render { .. } => Some(ErrorKind::Render),
            Self::Export(_) => Some(ErrorKind::Export),
            Self::PageOutOfRange { .. } | Self::NoDocument | Self::Search(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Load,
    Render,
    Export,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Render => "render",
            Self::Export => "export",
        })
    }
}

/// Dismissable message shown for the most recent user-visible failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBanner {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorBanner {
    pub fn from_error(error: &ViewerError) -> Option<Self> {
        error.kind().map(|kind| Self { kind, message: error.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_renders_never_reach_the_banner() {
        let cancelled = ViewerError::Render { page: 2, source: PdfEngineError::Cancelled };
        assert!(cancelled.is_cancellation());
        assert_eq!(ErrorBanner::from_error(&cancelled), None);

        let failed = ViewerError::Render {
            page: 2,
            source: PdfEngineError::Backend("bad stream".to_owned()),
        };
        let banner = ErrorBanner::from_error(&failed).expect("render failures should be shown");
        assert_eq!(banner.kind, ErrorKind::Render);
        assert!(banner.message.contains("page 2"));
    }
}
