// src/fetch/mod.rs
pub mod download;
pub mod urls;

pub use download::{download_bulletin, Downloaded, HttpTransport, Transport};
pub use urls::{source_layout, source_url, SourceLayout};
