// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 结构化存储
///
/// 连接池、迁移入口，以及 runs / run_transitions / task_attempts / content_records 四张表的实体
pub mod connection;
pub mod entities;
