// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含系统的技术实现细节，依赖于领域层的抽象接口：
/// - 数据库（database）：连接池、迁移和实体映射
/// - 指标（metrics）：Prometheus 指标导出
/// - 仓库实现（repositories）：运行登记表与内容记录的SeaORM实现
/// - 存储（storage）：本地、S3 和内存对象存储
pub mod database;
pub mod metrics;
pub mod repositories;
pub mod storage;
