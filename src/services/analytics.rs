// src/services/analytics.rs

use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    models::prediction::{AnalyticsParams, PredictionLabel, StudentPrediction, parse_date_param},
    store::cache::{Cache, get_json, set_json},
};

/// Cache key of the unfiltered staff overview. Writes that change its counts delete it.
pub const GLOBAL_OVERVIEW_KEY: &str = "analytics:global";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    User(i64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsFilter {
    pub result: Option<PredictionLabel>,
    /// Inclusive bounds on the creation date (UTC).
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl AnalyticsFilter {
    /// Unknown labels and unparseable dates are ignored rather than rejected.
    pub fn from_params(params: &AnalyticsParams) -> Self {
        Self {
            result: params.result.as_deref().and_then(|r| r.parse().ok()),
            start: parse_date_param(params.start.as_deref()),
            end: parse_date_param(params.end.as_deref()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_none() && self.start.is_none() && self.end.is_none()
    }

    fn cache_key(&self, scope: Scope) -> String {
        let scope = match scope {
            Scope::Global => "global".to_string(),
            Scope::User(id) => format!("user:{}", id),
        };
        if self.is_empty() {
            return format!("analytics:{}", scope);
        }
        let fmt_date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        format!(
            "analytics:{}:result={}:start={}:end={}",
            scope,
            self.result.map(PredictionLabel::as_str).unwrap_or(""),
            fmt_date(self.start),
            fmt_date(self.end),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionStats {
    pub totals: i64,
    pub pass_count: i64,
    pub fail_count: i64,
    /// Percentage of PASS predictions, 0 when there are none at all.
    /// Rounded to 2 decimals, halves to even.
    pub pass_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffOverview {
    #[serde(flatten)]
    pub stats: PredictionStats,
    pub user_count: i64,
    pub contact_count: i64,
}

pub fn pass_rate(pass_count: i64, totals: i64) -> f64 {
    if totals == 0 {
        return 0.0;
    }
    (pass_count as f64 / totals as f64 * 100.0 * 100.0).round_ties_even() / 100.0
}

/// Deletes the unfiltered staff overview so the next dashboard read recomputes it.
pub async fn invalidate_global(cache: &dyn Cache) {
    cache.delete(GLOBAL_OVERVIEW_KEY).await;
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, scope: Scope, filter: &AnalyticsFilter) {
    builder.push(" WHERE 1 = 1");
    if let Scope::User(user_id) = scope {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(label) = filter.result {
        builder.push(" AND prediction = ").push_bind(label.as_str());
    }
    // Timestamps are stored as RFC 3339 UTC text, so the first 10 chars are the date.
    if let Some(start) = filter.start {
        builder
            .push(" AND substr(created_at, 1, 10) >= ")
            .push_bind(start.format("%Y-%m-%d").to_string());
    }
    if let Some(end) = filter.end {
        builder
            .push(" AND substr(created_at, 1, 10) <= ")
            .push_bind(end.format("%Y-%m-%d").to_string());
    }
}

/// Aggregate counts over stored predictions, cached for a short TTL.
#[derive(Clone)]
pub struct Analytics {
    pool: SqlitePool,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl Analytics {
    pub fn new(pool: SqlitePool, cache: Arc<dyn Cache>, ttl_seconds: u64) -> Self {
        Self {
            pool,
            cache,
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    pub async fn staff_overview(
        &self,
        filter: &AnalyticsFilter,
    ) -> Result<StaffOverview, sqlx::Error> {
        let key = filter.cache_key(Scope::Global);
        if let Some(hit) = get_json::<StaffOverview>(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let stats = self.compute(Scope::Global, filter).await?;
        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let contact_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contact_messages")
            .fetch_one(&self.pool)
            .await?;

        let overview = StaffOverview {
            stats,
            user_count,
            contact_count,
        };
        set_json(self.cache.as_ref(), &key, &overview, self.ttl).await;
        Ok(overview)
    }

    pub async fn student_stats(
        &self,
        user_id: i64,
        filter: &AnalyticsFilter,
    ) -> Result<PredictionStats, sqlx::Error> {
        let scope = Scope::User(user_id);
        let key = filter.cache_key(scope);
        if let Some(hit) = get_json::<PredictionStats>(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let stats = self.compute(scope, filter).await?;
        set_json(self.cache.as_ref(), &key, &stats, self.ttl).await;
        Ok(stats)
    }

    async fn compute(
        &self,
        scope: Scope,
        filter: &AnalyticsFilter,
    ) -> Result<PredictionStats, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN prediction = 'PASS' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN prediction = 'FAIL' THEN 1 ELSE 0 END), 0)
            FROM student_predictions"#,
        );
        push_filters(&mut builder, scope, filter);

        let (totals, pass_count, fail_count): (i64, i64, i64) =
            builder.build_query_as().fetch_one(&self.pool).await?;

        Ok(PredictionStats {
            totals,
            pass_count,
            fail_count,
            pass_rate: pass_rate(pass_count, totals),
        })
    }

    /// Newest predictions in scope. Not cached.
    pub async fn recent(
        &self,
        scope: Scope,
        filter: &AnalyticsFilter,
        limit: i64,
    ) -> Result<Vec<StudentPrediction>, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM student_predictions");
        push_filters(&mut builder, scope, filter);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit);

        builder.build_query_as().fetch_all(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cache::MemoryCache;
    use crate::test_support::{create_user, insert_prediction, memory_pool};
    use chrono::{TimeZone, Utc};

    async fn setup() -> (SqlitePool, Arc<MemoryCache>, Analytics) {
        let pool = memory_pool().await;
        let cache = Arc::new(MemoryCache::new());
        let analytics = Analytics::new(pool.clone(), cache.clone(), 30);
        (pool, cache, analytics)
    }

    #[test]
    fn pass_rate_is_zero_without_data() {
        assert_eq!(pass_rate(0, 0), 0.0);
        assert_eq!(pass_rate(1, 3), 33.33);
        assert_eq!(pass_rate(2, 3), 66.67);
    }

    #[test]
    fn pass_rate_halves_round_to_even() {
        // 1 / 32 is exactly 3.125%.
        assert_eq!(pass_rate(1, 32), 3.12);
        // 3 / 32 is exactly 9.375%.
        assert_eq!(pass_rate(3, 32), 9.38);
    }

    #[tokio::test]
    async fn empty_dashboard_reports_zero_rate() {
        let (_, _, analytics) = setup().await;
        let overview = analytics
            .staff_overview(&AnalyticsFilter::default())
            .await
            .unwrap();
        assert_eq!(overview.stats.totals, 0);
        assert_eq!(overview.stats.pass_rate, 0.0);
    }

    #[tokio::test]
    async fn per_user_stats_apply_label_and_date_filters() {
        let (pool, _, analytics) = setup().await;
        let user = create_user(&pool, "alice", false).await;
        let other = create_user(&pool, "bob", false).await;

        let jan = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2024, 2, 10, 23, 59, 0).unwrap();
        insert_prediction(&pool, Some(user), "PASS", jan).await;
        insert_prediction(&pool, Some(user), "FAIL", feb).await;
        insert_prediction(&pool, Some(user), "PASS", feb).await;
        insert_prediction(&pool, Some(other), "PASS", feb).await;

        let all = analytics
            .student_stats(user, &AnalyticsFilter::default())
            .await
            .unwrap();
        assert_eq!((all.totals, all.pass_count, all.fail_count), (3, 2, 1));
        assert_eq!(all.pass_rate, 66.67);

        let february = AnalyticsFilter {
            start: NaiveDate::from_ymd_opt(2024, 2, 1),
            end: NaiveDate::from_ymd_opt(2024, 2, 10),
            ..Default::default()
        };
        let stats = analytics.student_stats(user, &february).await.unwrap();
        assert_eq!((stats.totals, stats.pass_count, stats.fail_count), (2, 1, 1));

        let passes = AnalyticsFilter {
            result: Some(PredictionLabel::Pass),
            ..Default::default()
        };
        let stats = analytics.student_stats(user, &passes).await.unwrap();
        assert_eq!((stats.totals, stats.fail_count), (2, 0));

        let recent = analytics
            .recent(Scope::User(user), &AnalyticsFilter::default(), 8)
            .await
            .unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent.last().unwrap().created_at, jan);
    }

    #[tokio::test]
    async fn global_overview_is_cached_until_invalidated() {
        let (pool, cache, analytics) = setup().await;
        let now = Utc::now();
        insert_prediction(&pool, None, "PASS", now).await;

        let first = analytics
            .staff_overview(&AnalyticsFilter::default())
            .await
            .unwrap();
        assert_eq!(first.stats.totals, 1);

        insert_prediction(&pool, None, "FAIL", now).await;
        let cached = analytics
            .staff_overview(&AnalyticsFilter::default())
            .await
            .unwrap();
        assert_eq!(cached.stats.totals, 1);

        invalidate_global(cache.as_ref()).await;
        let fresh = analytics
            .staff_overview(&AnalyticsFilter::default())
            .await
            .unwrap();
        assert_eq!(fresh.stats.totals, 2);
        assert_eq!(fresh.stats.pass_rate, 50.0);
    }

    #[test]
    fn filtered_keys_differ_from_the_global_key() {
        assert_eq!(
            AnalyticsFilter::default().cache_key(Scope::Global),
            GLOBAL_OVERVIEW_KEY
        );
        let filtered = AnalyticsFilter {
            result: Some(PredictionLabel::Fail),
            ..Default::default()
        };
        assert_ne!(filtered.cache_key(Scope::Global), GLOBAL_OVERVIEW_KEY);
        assert_ne!(
            AnalyticsFilter::default().cache_key(Scope::User(1)),
            AnalyticsFilter::default().cache_key(Scope::User(2))
        );
    }
}
