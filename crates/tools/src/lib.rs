//! Tool gateway for ShopDesk.
//!
//! Order operations (create, query, cancel, product search) are served by an
//! external sidecar speaking MCP: JSON-RPC 2.0, one message per line, over
//! the child's stdin/stdout.
//!
//! Layers, bottom-up:
//! - [`protocol`]: message types and line framing
//! - [`rpc`]: request/response correlation over any async stream pair
//! - [`session`]: the MCP handshake and `tools/*` methods
//! - [`sidecar`]: spawning, stderr forwarding, and shutdown of the child

pub mod protocol;
pub mod rpc;
pub mod session;
pub mod sidecar;

pub use rpc::RpcClient;
pub use session::{ClientIdentity, McpSession};
pub use sidecar::Sidecar;
