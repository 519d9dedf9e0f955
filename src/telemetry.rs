//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider tag (e.g. "openai", "ollama")
//! - `operation`: capability invoked (e.g. "complete", "embed")
//! - `status`: outcome: "ok" or "error"

/// Total requests dispatched through the gateway.
///
/// Labels: `provider`, `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// Request duration in seconds.
///
/// Labels: `provider`, `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "huginn_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`, `operation`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Total rate-limit signals received from providers.
///
/// Labels: `provider`.
pub const RATE_LIMITS_TOTAL: &str = "huginn_rate_limits_total";

/// Total providers skipped without being called.
///
/// Labels: `provider`, `operation`, `reason` ("unavailable" | "unsupported").
pub const PROVIDER_SKIPS_TOTAL: &str = "huginn_provider_skips_total";

/// Total embedding cache hits.
///
/// Labels: `model`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total embedding cache misses.
///
/// Labels: `model`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Total embedding cache evictions.
///
/// Labels: `strategy`.
pub const CACHE_EVICTIONS_TOTAL: &str = "huginn_cache_evictions_total";
