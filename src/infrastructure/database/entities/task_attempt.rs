// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "task_attempts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub run_id: Uuid,
    pub attempt: i32,
    pub started_at: DateTimeUtc,
    pub ended_at: DateTimeUtc,
    pub outcome: String,
    pub failure_class: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub retry_cause: Option<String>,
    pub units_stored: i32,
    pub units_duplicate: i32,
    pub units_pending: i32,
    pub units_failed: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
