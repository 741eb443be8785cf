//! Vela 工具集
//!
//! 提供日志初始化、资源路径管理、引擎配置等通用工具。
//!
//! # VelaPath
//! 基于工作区根目录的统一路径管理，避免硬编码相对路径。
//!
//! # EngineConfig
//! 从 `vela.toml` 读取的引擎配置，缺省字段使用默认值。

pub mod engine_config;
pub mod init_log;
pub mod resource;
