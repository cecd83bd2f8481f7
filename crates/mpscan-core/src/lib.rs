//! # mpscan-core
//!
//! mpscan 核心库, 提供错误类型与各 crate 共用的小工具.

pub mod error;
pub mod syncsafe;

// 重导出常用类型
pub use error::{ScanError, ScanResult};
