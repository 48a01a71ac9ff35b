//! # Twelvify Library
//!
//! 一个"选中即简化"的文本简化工具库：捕获页面选区，流式调用简化
//! 代理，把困难文本就地替换为更易读的版本，并支持精确撤销。
//!
//! ## 模块组织
//!
//! - `dom` - 内存文档模型与选区原语
//! - `simplify` - 简化管线（选区、流式客户端、变更、撤销、编排）
//! - `web` - 代理服务（可选）

pub mod dom;
pub mod simplify;
#[cfg(feature = "web")]
pub mod web;

// Re-export commonly used items for convenience
pub use simplify::*;
