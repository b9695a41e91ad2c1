use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Suppliers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Suppliers::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Suppliers::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Suppliers::ContactInfo).string().null())
                    .col(
                        ColumnDef::new(Suppliers::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Suppliers::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Suppliers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Suppliers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Locations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Locations::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Locations::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Locations::Description).string().null())
                    .col(
                        ColumnDef::new(Locations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Locations::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Locations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Pieces::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Pieces::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Pieces::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Pieces::Name).string().not_null())
                    .col(ColumnDef::new(Pieces::QrCode).string().null().unique_key())
                    .col(ColumnDef::new(Pieces::SupplierId).uuid().null())
                    .col(ColumnDef::new(Pieces::LocationId).uuid().null())
                    .col(
                        ColumnDef::new(Pieces::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Pieces::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Pieces::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Pieces::UpdatedBy).string().null())
                    .col(
                        ColumnDef::new(Pieces::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pieces_supplier")
                            .from(Pieces::Table, Pieces::SupplierId)
                            .to(Suppliers::Table, Suppliers::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pieces_primary_location")
                            .from(Pieces::Table, Pieces::LocationId)
                            .to(Locations::Table, Locations::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Pieces::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Locations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Suppliers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Suppliers {
    Table,
    Id,
    Name,
    ContactInfo,
    IsActive,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Locations {
    Table,
    Id,
    Code,
    Description,
    IsActive,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Pieces {
    Table,
    Id,
    Code,
    Name,
    QrCode,
    SupplierId,
    LocationId,
    IsActive,
    CreatedBy,
    CreatedAt,
    UpdatedBy,
    UpdatedAt,
}
