use sea_orm_migration::prelude::*;

use crate::m20250301_000002_create_master_data_tables::{Locations, Pieces};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The ledger itself: one immutable row per signed quantity change.
        manager
            .create_table(
                Table::create()
                    .table(StockMovements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockMovements::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockMovements::PieceId).uuid().not_null())
                    .col(ColumnDef::new(StockMovements::LocationId).uuid().not_null())
                    .col(ColumnDef::new(StockMovements::Quantity).integer().not_null())
                    .col(
                        ColumnDef::new(StockMovements::MovementType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockMovements::Notes).text().null())
                    .col(ColumnDef::new(StockMovements::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(StockMovements::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .check(Expr::cust(
                        "(movement_type = 'entrada' AND quantity > 0) OR (movement_type = 'saida' AND quantity < 0)",
                    ))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stock_movements_piece")
                            .from(StockMovements::Table, StockMovements::PieceId)
                            .to(Pieces::Table, Pieces::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stock_movements_location")
                            .from(StockMovements::Table, StockMovements::LocationId)
                            .to(Locations::Table, Locations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_movements_piece_location")
                    .table(StockMovements::Table)
                    .col(StockMovements::PieceId)
                    .col(StockMovements::LocationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_movements_created_at")
                    .table(StockMovements::Table)
                    .col(StockMovements::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockMovements::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockMovements {
    Table,
    Id,
    PieceId,
    LocationId,
    Quantity,
    MovementType,
    Notes,
    CreatedBy,
    CreatedAt,
}
