// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// crawlkeeper 表结构的迁移命令行
///
/// 例如 `DATABASE_URL=sqlite://crawlkeeper.db?mode=rwc cargo run -p migration -- up`
#[async_std::main]
async fn main() {
    cli::run_cli(migration::Migrator).await;
}
