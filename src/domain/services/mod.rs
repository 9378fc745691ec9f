// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 指纹（fingerprint）：内容身份的确定性计算
/// - 去重索引（dedup_service）：按指纹查询已存储内容
/// - 持久化协调器（persistence_service）：跨两个存储的幂等写入
/// - 提取服务（extraction_service）：提取器插件表
pub mod dedup_service;
pub mod extraction_service;
pub mod fingerprint;
pub mod persistence_service;
