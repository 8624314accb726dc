/// Data layer: core types, loading, and persistence.
///
/// Architecture:
/// ```text
///  .txt / .csv / .json / .parquet        header file (key: value)
///        │                                      │
///        ▼                                      ▼
///   ┌──────────┐                          ┌──────────┐
///   │  loader  │  parse file → Matrix     │  loader  │  → HeaderMap
///   └──────────┘                          └──────────┘
///        │                                      │
///        └──────────────┬───────────────────────┘
///                       ▼
///               ┌───────────────┐
///               │   Waveform    │  Vec<Trace>, per-trace stats
///               └───────────────┘
///                       │
///                       ▼
///               ┌───────────────┐
///               │     store     │  json / txt (sac, mseed: unsupported)
///               └───────────────┘
/// ```
pub mod loader;
pub mod model;
pub mod store;
