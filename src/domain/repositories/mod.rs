// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 定义运行登记表、内容记录和对象存储的数据访问抽象
pub mod content_repository;
pub mod run_repository;
pub mod storage_repository;
