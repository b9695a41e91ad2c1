use sea_orm_migration::prelude::*;

use crate::m20250301_000002_create_master_data_tables::Suppliers;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Vehicles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Vehicles::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Vehicles::Branch).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Vehicles::Plate)
                            .string_len(16)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Vehicles::Chassis).string().not_null())
                    .col(ColumnDef::new(Vehicles::Brand).string().not_null())
                    .col(ColumnDef::new(Vehicles::Model).string().not_null())
                    .col(ColumnDef::new(Vehicles::Fleet).string().not_null())
                    .col(ColumnDef::new(Vehicles::VehicleGroup).string().not_null())
                    .col(
                        ColumnDef::new(Vehicles::ManufactureYear)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Vehicles::Status).string_len(32).not_null())
                    .col(ColumnDef::new(Vehicles::QrCode).string().null().unique_key())
                    .col(ColumnDef::new(Vehicles::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Vehicles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vehicles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Priced catalogue used to fill maintenance line items.
        manager
            .create_table(
                Table::create()
                    .table(MaintenanceParts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MaintenanceParts::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaintenanceParts::Branch)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(MaintenanceParts::Name).string().not_null())
                    .col(
                        ColumnDef::new(MaintenanceParts::UnitPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaintenanceParts::Kind)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaintenanceParts::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(MaintenanceParts::Description).text().null())
                    .col(ColumnDef::new(MaintenanceParts::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(MaintenanceParts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaintenanceParts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .check(Expr::cust("unit_price >= 0"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_maintenance_parts_branch_name")
                    .table(MaintenanceParts::Table)
                    .col(MaintenanceParts::Branch)
                    .col(MaintenanceParts::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Maintenances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Maintenances::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Maintenances::Branch).string_len(64).not_null())
                    .col(ColumnDef::new(Maintenances::Title).string().not_null())
                    .col(
                        ColumnDef::new(Maintenances::MaintenanceType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Maintenances::Status).string().null())
                    .col(
                        ColumnDef::new(Maintenances::MaintenanceDate)
                            .date()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Maintenances::VehicleId).uuid().not_null())
                    .col(ColumnDef::new(Maintenances::Odometer).integer().null())
                    .col(ColumnDef::new(Maintenances::SupplierId).uuid().null())
                    .col(ColumnDef::new(Maintenances::Nfe).string().null())
                    .col(ColumnDef::new(Maintenances::Nfse).string().null())
                    .col(ColumnDef::new(Maintenances::ServiceOrder).string().null())
                    .col(ColumnDef::new(Maintenances::Description).text().null())
                    .col(
                        ColumnDef::new(Maintenances::TotalValue)
                            .decimal_len(14, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Maintenances::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Maintenances::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_maintenances_vehicle")
                            .from(Maintenances::Table, Maintenances::VehicleId)
                            .to(Vehicles::Table, Vehicles::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_maintenances_supplier")
                            .from(Maintenances::Table, Maintenances::SupplierId)
                            .to(Suppliers::Table, Suppliers::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_maintenances_date")
                    .table(Maintenances::Table)
                    .col(Maintenances::MaintenanceDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MaintenanceItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MaintenanceItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaintenanceItems::MaintenanceId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MaintenanceItems::Quantity).integer().not_null())
                    .col(ColumnDef::new(MaintenanceItems::ItemName).string().not_null())
                    .col(
                        ColumnDef::new(MaintenanceItems::UnitPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaintenanceItems::Total)
                            .decimal_len(14, 2)
                            .not_null(),
                    )
                    .check(Expr::cust("quantity > 0 AND unit_price > 0"))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_maintenance_items_maintenance")
                            .from(MaintenanceItems::Table, MaintenanceItems::MaintenanceId)
                            .to(Maintenances::Table, Maintenances::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MaintenanceItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Maintenances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MaintenanceParts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Vehicles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Vehicles {
    Table,
    Id,
    Branch,
    Plate,
    Chassis,
    Brand,
    Model,
    Fleet,
    VehicleGroup,
    ManufactureYear,
    Status,
    QrCode,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum MaintenanceParts {
    Table,
    Id,
    Branch,
    Name,
    UnitPrice,
    Kind,
    IsActive,
    Description,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Maintenances {
    Table,
    Id,
    Branch,
    Title,
    MaintenanceType,
    Status,
    MaintenanceDate,
    VehicleId,
    Odometer,
    SupplierId,
    Nfe,
    Nfse,
    ServiceOrder,
    Description,
    TotalValue,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum MaintenanceItems {
    Table,
    Id,
    MaintenanceId,
    Quantity,
    ItemName,
    UnitPrice,
    Total,
}
