// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置、环境变量和数据源目录
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 引擎模块
///
/// 实现数据源抓取引擎
pub mod engines;

/// 抽取器模块
///
/// 内置的内容抽取插件
pub mod extractors;

/// 基础设施模块
///
/// 提供外部服务集成，如数据库、对象存储和指标
pub mod infrastructure;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 实现运行生命周期、任务执行和后台工作器
pub mod workers;
