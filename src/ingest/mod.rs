/// Page retrieval for the monitor.
///
/// Submodules:
/// - `page` — the `PageFetcher` capability and its blocking HTTP client.

pub mod page;
