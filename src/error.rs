//! Error types for story resolution and snapshot loading.

use core::fmt;

/// Data-source query that produced an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceQuery {
    ListRevisions,
    ListChapters,
    ListSegments,
    ListTokens,
}

impl SourceQuery {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            Self::ListRevisions => "SOURCE_LIST_REVISIONS",
            Self::ListChapters => "SOURCE_LIST_CHAPTERS",
            Self::ListSegments => "SOURCE_LIST_SEGMENTS",
            Self::ListTokens => "SOURCE_LIST_TOKENS",
        }
    }
}

impl fmt::Display for SourceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListRevisions => "list_revisions",
            Self::ListChapters => "list_chapters",
            Self::ListSegments => "list_segments",
            Self::ListTokens => "list_tokens",
        };
        f.write_str(name)
    }
}

/// Failure of a story load.
///
/// The data-source error is kept unchanged; `query` records which fetch
/// failed. No partial block list accompanies an error.
#[derive(Debug)]
pub struct ResolveError<E> {
    /// Failing fetch.
    pub query: SourceQuery,
    /// Error returned by the data source.
    pub source: E,
}

impl<E> ResolveError<E> {
    pub(crate) fn new(query: SourceQuery, source: E) -> Self {
        Self { query, source }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        self.query.code()
    }

    /// Unwrap the data-source error.
    pub fn into_source(self) -> E {
        self.source
    }
}

impl<E: fmt::Display> fmt::Display for ResolveError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} failed: {}", self.code(), self.query, self.source)
    }
}

impl<E> std::error::Error for ResolveError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Failure while loading a story snapshot.
#[derive(Debug)]
pub enum SnapshotError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl SnapshotError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "SNAPSHOT_IO",
            Self::Json(_) => "SNAPSHOT_JSON",
        }
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{}: {}", self.code(), err),
            Self::Json(err) => write!(f, "{}: {}", self.code(), err),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}
