// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 数据源（source）：爬取目标及其提取规则
/// - 运行（run）：对一个数据源的一次爬取及其状态机
/// - 尝试（attempt）：运行中的单次执行及其结果
/// - 内容（content）：提取出的内容单元与持久化记录
pub mod attempt;
pub mod content;
pub mod run;
pub mod source;
