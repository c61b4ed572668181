//! 配置管理
//!
//! 配置按 默认值 → TOML文件 → 环境变量 的顺序合并，加载后统一校验。

pub mod models;

pub use models::*;
