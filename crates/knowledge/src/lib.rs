//! Knowledge base for ShopDesk.
//!
//! Product, policy, and FAQ snippets live in a Chroma collection. The
//! [`ChromaClient`] embeds a query with the configured provider, runs a
//! nearest-neighbour search, and can bulk-load documents for the `ingest`
//! command.

pub mod chroma;

pub use chroma::ChromaClient;
