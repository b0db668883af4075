//! tandem-adapter-memory - 本地内存缓存适配器
//!
//! 基于 Moka 的 L1 实现，支持按条目 TTL 和容量上限逐出

mod store;

pub use store::*;
