//! Error taxonomy for linking

/// Result type alias for linker operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Every way a build can fail. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("configuration error: no entry packages were configured")]
    MissingEntries,

    #[error("configuration error: no package descriptors were supplied")]
    MissingDescriptors,

    #[error("configuration error: entry `{0}` has no package descriptor")]
    UnknownEntry(String),

    #[error("configuration error: no resolver registered for import kind `{0}`")]
    NoResolverForKind(String),

    #[error("configuration error: resolver for `{0}` implements neither resolve nor resolve_later")]
    MissingResolverMethod(String),

    #[error(
        "cannot resolve `{importee}` imported by `{importer}`: declare it as a dependency of `{package}`"
    )]
    UnresolvableImport {
        importee: String,
        importer: String,
        package: String,
    },

    #[error("cannot merge `{package}` into `{target}`: it is already merged into `{existing}`")]
    ConflictingMerge {
        package: String,
        target: String,
        existing: String,
    },

    #[error("failed to resolve `{import}` imported by `{importer}` in package `{package}`: {source}")]
    ResolutionFailure {
        import: String,
        importer: String,
        package: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LinkError {
    /// Wrap a strategy failure with enough context to find the offending import.
    pub fn resolution(
        import: impl Into<String>,
        importer: impl Into<String>,
        package: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        LinkError::ResolutionFailure {
            import: import.into(),
            importer: importer.into(),
            package: package.into(),
            source,
        }
    }

    /// Errors raised at construction or first use rather than mid-build.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LinkError::MissingEntries
                | LinkError::MissingDescriptors
                | LinkError::UnknownEntry(_)
                | LinkError::NoResolverForKind(_)
                | LinkError::MissingResolverMethod(_)
        )
    }
}
