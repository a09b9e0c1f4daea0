use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Page sizes must be strictly positive.
    #[error("page size must be greater than 0, got {0}")]
    InvalidPageSize(i64),
    /// Page sizes must fit the platform's address space.
    #[error("page size {0} exceeds the maximum supported page size")]
    PageSizeTooLarge(i64),
    /// The retry policy needs at least one attempt.
    #[error("`page_failure.max_attempts` cannot be zero")]
    RetryMaxAttemptsZero,
    /// The unbounded pipeline needs a non-zero shutdown wait.
    #[error("`shutdown_timeout_ms` cannot be zero")]
    ShutdownTimeoutZero,
    /// The Postgres cursor cannot fetch empty chunks.
    #[error("`fetch_size` cannot be zero")]
    FetchSizeZero,
    /// A connection pool needs at least one connection.
    #[error("`max_connections` cannot be zero")]
    MaxConnectionsZero,
    /// Seeded records must be spread over at least one username bucket.
    #[error("`seed_buckets` cannot be zero when `seed_records` is set")]
    SeedBucketsZero,
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
}
