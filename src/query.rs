use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, postgres::PgRow};
use uuid::Uuid;

use crate::{
    error::RepoError,
    pagination::{PageRequest, PageResult},
};

/// Collection
///
/// The named tables this service reads from. Table names come only from this enum,
/// never from request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Appointments,
    Patients,
    Doctors,
    HealthMetrics,
    Predictions,
    RiskPredictions,
    MedicalImaging,
    ClinicalCases,
    CaseArtifacts,
    CaseAuditLog,
    ReferenceImages,
    UserProfiles,
    EnvironmentalData,
}

impl Collection {
    pub fn table(self) -> &'static str {
        match self {
            Collection::Appointments => "appointments",
            Collection::Patients => "patients",
            Collection::Doctors => "doctors",
            Collection::HealthMetrics => "health_metrics",
            Collection::Predictions => "predictions",
            Collection::RiskPredictions => "health_risk_predictions",
            Collection::MedicalImaging => "medical_imaging",
            Collection::ClinicalCases => "clinical_cases",
            Collection::CaseArtifacts => "case_artifacts",
            Collection::CaseAuditLog => "case_audit_log",
            Collection::ReferenceImages => "medical_reference_images",
            Collection::UserProfiles => "user_profiles",
            Collection::EnvironmentalData => "environmental_data",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Uuid(Uuid),
    Text(String),
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        FilterValue::Uuid(value)
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq {
        column: &'static str,
        value: FilterValue,
    },
    Contains {
        column: &'static str,
        term: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Escapes `LIKE` wildcards so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// PaginatedQuery
///
/// A filtered, ordered, sliced read against one collection. `run` issues two
/// statements with identical filters: a `COUNT(*)` for the total and a
/// `LIMIT/OFFSET` select for the page. All filter values are bound parameters.
///
/// ```ignore
/// let page = PaginatedQuery::new(Collection::Appointments, request)
///     .eq("doctor_id", filter.doctor_id)
///     .order_by("appointment_date", Direction::Desc)
///     .run::<Appointment>(&pool)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct PaginatedQuery {
    source: &'static str,
    columns: &'static str,
    conditions: Vec<Condition>,
    sort: Option<(&'static str, Direction)>,
    page: PageRequest,
}

impl PaginatedQuery {
    pub fn new(collection: Collection, page: PageRequest) -> Self {
        Self::from_source(collection.table(), "*", page)
    }

    /// For reads that need a join. `source` and `columns` must be static SQL.
    pub fn from_source(source: &'static str, columns: &'static str, page: PageRequest) -> Self {
        Self {
            source,
            columns,
            conditions: Vec::new(),
            sort: None,
            page,
        }
    }

    /// Exact match on `column`. `None` and blank text leave the query unfiltered.
    pub fn eq<V: Into<FilterValue>>(mut self, column: &'static str, value: Option<V>) -> Self {
        let value = value.map(Into::into).and_then(|value| match value {
            FilterValue::Text(text) if text.trim().is_empty() => None,
            FilterValue::Text(text) => Some(FilterValue::Text(text.trim().to_string())),
            other => Some(other),
        });
        if let Some(value) = value {
            self.conditions.push(Condition::Eq { column, value });
        }
        self
    }

    /// Case-insensitive substring match on `column`. Blank terms are ignored.
    pub fn contains(mut self, column: &'static str, term: Option<String>) -> Self {
        if let Some(term) = term.filter(|t| !t.trim().is_empty()) {
            self.conditions.push(Condition::Contains {
                column,
                term: term.trim().to_string(),
            });
        }
        self
    }

    pub fn order_by(mut self, column: &'static str, direction: Direction) -> Self {
        self.sort = Some((column, direction));
        self
    }

    pub fn page(&self) -> PageRequest {
        self.page
    }

    fn push_conditions(&self, builder: &mut QueryBuilder<'static, Postgres>) {
        for (i, condition) in self.conditions.iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            match condition {
                Condition::Eq { column, value } => {
                    builder.push(*column).push(" = ");
                    match value {
                        FilterValue::Uuid(id) => builder.push_bind(*id),
                        FilterValue::Text(text) => builder.push_bind(text.clone()),
                    };
                }
                Condition::Contains { column, term } => {
                    builder.push(*column).push(" ILIKE ");
                    builder.push_bind(format!("%{}%", escape_like(term)));
                }
            }
        }
    }

    pub fn count_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", self.source));
        self.push_conditions(&mut builder);
        builder
    }

    pub fn select_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder =
            QueryBuilder::new(format!("SELECT {} FROM {}", self.columns, self.source));
        self.push_conditions(&mut builder);
        if let Some((column, direction)) = self.sort {
            builder
                .push(" ORDER BY ")
                .push(column)
                .push(" ")
                .push(direction.keyword());
        }
        builder.push(" LIMIT ");
        builder.push_bind(self.page.limit());
        builder.push(" OFFSET ");
        builder.push_bind(self.page.offset());
        builder
    }

    /// Executes the count and the page select. Any database error is `QueryFailed`;
    /// there is no retry.
    pub async fn run<T>(self, pool: &PgPool) -> Result<PageResult<T>, RepoError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut count = self.count_query();
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        if total == 0 {
            return Ok(PageResult::empty(self.page));
        }

        let mut select = self.select_query();
        let items = select.build_query_as::<T>().fetch_all(pool).await?;

        tracing::debug!(
            source = self.source,
            total,
            returned = items.len(),
            offset = self.page.offset(),
            "paginated read"
        );

        Ok(PageResult::new(items, total, self.page))
    }

    /// Executes only the page select, for callers that never report a total.
    pub async fn fetch<T>(self, pool: &PgPool) -> Result<Vec<T>, RepoError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut select = self.select_query();
        let items = select.build_query_as::<T>().fetch_all(pool).await?;
        tracing::debug!(source = self.source, returned = items.len(), "bounded read");
        Ok(items)
    }
}
