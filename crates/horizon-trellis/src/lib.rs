//! Horizon Trellis - reactive data binding over a document tree.
//!
//! This is the main umbrella crate that re-exports all public APIs.
//!
//! # Example
//!
//! ```
//! use horizon_trellis::prelude::*;
//!
//! fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::from_html(r#"<h1 sb-mark="title"></h1>"#, TrellisConfig::default())?;
//!     store.set("title", "hello");
//!     assert_eq!(store.document().to_html(), r#"<h1 sb-mark="title">hello</h1>"#);
//!     Ok(())
//! }
//! ```

pub use horizon_trellis_core::*;

pub mod prelude;
