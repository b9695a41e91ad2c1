use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::{
    sea_query::{Condition, Expr, Func},
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::ledger::{describe_movements, sum_quantities, MovementView};
use crate::{
    entities::{
        piece,
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
};

const MAX_PAGE_SIZE: u64 = 100;

/// Filters of the movement report. Every field is optional; dates are
/// inclusive calendar days in UTC.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MovementReportFilter {
    /// Fragment of the piece code or name
    pub piece: Option<String>,
    pub location_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSummary {
    pub total: u64,
    pub entradas: u64,
    pub saidas: u64,
    /// Sum of signed quantities
    pub balance: i64,
}

impl MovementSummary {
    pub fn from_quantities<I>(quantities: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        let quantities: Vec<i32> = quantities.into_iter().collect();
        Self {
            total: quantities.len() as u64,
            entradas: quantities.iter().filter(|q| **q > 0).count() as u64,
            saidas: quantities.iter().filter(|q| **q < 0).count() as u64,
            balance: sum_quantities(quantities),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementReport {
    pub rows: Vec<MovementView>,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
    pub summary: MovementSummary,
}

/// Row offset of a 1-based page. Pages whose offset does not fit a signed
/// 64-bit SQL offset are rejected.
fn page_offset(page: u64, per_page: u64) -> Result<u64, ServiceError> {
    page.saturating_sub(1)
        .checked_mul(per_page)
        .filter(|offset| *offset <= i64::MAX as u64)
        .ok_or_else(|| ServiceError::ValidationError(format!("page {} is out of range", page)))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

#[derive(Clone)]
pub struct ReportService {
    db: Arc<DatabaseConnection>,
    default_page_size: u64,
}

impl ReportService {
    pub fn new(db: Arc<DatabaseConnection>, default_page_size: u64) -> Self {
        Self {
            db,
            default_page_size,
        }
    }

    /// Filtered movements, newest first, one page at a time. The summary
    /// always covers the whole filtered set.
    #[instrument(skip(self))]
    pub async fn movement_report(
        &self,
        filter: MovementReportFilter,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Result<MovementReport, ServiceError> {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page
            .unwrap_or(self.default_page_size)
            .clamp(1, MAX_PAGE_SIZE);
        page_offset(page, per_page)?;

        let query = match self.filtered(&filter).await? {
            Some(query) => query,
            None => {
                return Ok(MovementReport {
                    rows: Vec::new(),
                    page,
                    per_page,
                    total_pages: 0,
                    summary: MovementSummary::default(),
                })
            }
        };

        let db = &*self.db;
        let quantities: Vec<i32> = query
            .clone()
            .select_only()
            .column(stock_movement::Column::Quantity)
            .into_tuple()
            .all(db)
            .await?;
        let summary = MovementSummary::from_quantities(quantities);

        let paginator = query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .order_by_desc(stock_movement::Column::Id)
            .paginate(db, per_page);
        let total_pages = paginator.num_pages().await?;
        let movements = if page > total_pages {
            Vec::new()
        } else {
            paginator.fetch_page(page - 1).await?
        };
        debug!(rows = movements.len(), total = summary.total, "movement report built");

        Ok(MovementReport {
            rows: describe_movements(db, movements).await?,
            page,
            per_page,
            total_pages,
            summary,
        })
    }

    /// Builds the filtered query, or `None` when the piece text matches no
    /// piece at all.
    async fn filtered(
        &self,
        filter: &MovementReportFilter,
    ) -> Result<Option<Select<stock_movement::Entity>>, ServiceError> {
        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(ServiceError::ValidationError(
                    "date_from must not be after date_to".to_string(),
                ));
            }
        }

        let mut query = stock_movement::Entity::find();

        if let Some(term) = filter
            .piece
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            let pattern = format!("%{}%", term.to_lowercase());
            let piece_ids: Vec<Uuid> = piece::Entity::find()
                .select_only()
                .column(piece::Column::Id)
                .filter(
                    Condition::any()
                        .add(
                            Expr::expr(Func::lower(Expr::col(piece::Column::Code)))
                                .like(pattern.as_str()),
                        )
                        .add(
                            Expr::expr(Func::lower(Expr::col(piece::Column::Name)))
                                .like(pattern.as_str()),
                        ),
                )
                .into_tuple()
                .all(&*self.db)
                .await?;
            if piece_ids.is_empty() {
                return Ok(None);
            }
            query = query.filter(stock_movement::Column::PieceId.is_in(piece_ids));
        }

        if let Some(location_id) = filter.location_id {
            query = query.filter(stock_movement::Column::LocationId.eq(location_id));
        }
        if let Some(movement_type) = filter.movement_type {
            query = query.filter(stock_movement::Column::MovementType.eq(movement_type));
        }
        if let Some(from) = filter.date_from {
            query = query.filter(stock_movement::Column::CreatedAt.gte(start_of_day(from)));
        }
        if let Some(to) = filter.date_to {
            // A missing successor means the end of the calendar; no upper bound.
            if let Some(next) = to.succ_opt() {
                query = query.filter(stock_movement::Column::CreatedAt.lt(start_of_day(next)));
            }
        }

        Ok(Some(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_by_sign() {
        let summary = MovementSummary::from_quantities(vec![10, -4, 3, -1]);
        assert_eq!(
            summary,
            MovementSummary {
                total: 4,
                entradas: 2,
                saidas: 2,
                balance: 8,
            }
        );
    }

    #[test]
    fn empty_summary_is_zero() {
        assert_eq!(
            MovementSummary::from_quantities(Vec::new()),
            MovementSummary::default()
        );
    }

    #[test]
    fn page_offsets_stay_in_range() {
        assert_eq!(page_offset(1, 25).unwrap(), 0);
        assert_eq!(page_offset(3, 100).unwrap(), 200);
        assert!(matches!(
            page_offset(u64::MAX, 100),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            page_offset(i64::MAX as u64, 2),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn start_of_day_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert_eq!(start_of_day(date).to_rfc3339(), "2025-03-14T00:00:00+00:00");
    }
}
