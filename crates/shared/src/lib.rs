//! 共享库
//!
//! 包含规则引擎及其周边工具共用的配置加载与日志初始化代码。

pub mod config;
pub mod observability;
