/// Data layer: core types, reading, membership filtering and export.
///
/// Architecture:
/// ```text
///  .fits / .txt
///        │
///        ▼
///   ┌──────────┐   ┌──────────┐
///   │  loader   │──▶│  layout   │  classify array stack, synthesize axis
///   └──────────┘   └──────────┘
///        │
///        ▼
///   ┌────────────────────┐
///   │ SpectrumCollection  │  Vec<Option<Spectrum>>, one slot per file
///   └────────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  pair optical/NIR slots, template membership
///   └──────────┘
///        │  (process::*)
///        ▼
///   ┌──────────┐
///   │  export   │  Template → .txt / .parquet
///   └──────────┘
/// ```

pub mod export;
pub mod filter;
pub mod layout;
pub mod loader;
pub mod model;
