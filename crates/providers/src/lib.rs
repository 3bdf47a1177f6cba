//! LLM provider implementations for ShopDesk.
//!
//! All providers implement the `shopdesk_core::Provider` trait. The service
//! ships one backend, the DashScope text-generation and text-embedding API.

pub mod dashscope;

pub use dashscope::DashScopeProvider;
