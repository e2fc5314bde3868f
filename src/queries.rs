//! Central SQL definitions for the canned analytics paths.
//!
//! All rolling windows anchor on the last available date in the dataset
//! (as_of), never on the wall clock, so a stale dataset still answers with
//! its own most recent period. National numbers re-aggregate numerators and
//! denominators; UF-level percentages are never averaged. UF-scoped variants
//! take a `$uf` named parameter.
//!
//! No trailing semicolons: every statement here still goes through the guard
//! like any generated SQL.

/// Last available day and month in the mart.
pub const SQL_AS_OF_DATES: &str = "\
WITH last_day AS (
  SELECT MAX(day) AS max_day FROM gold.fct_daily_uf
),
last_month AS (
  SELECT date(MAX(month), 'start of month') AS max_month FROM gold.fct_monthly_uf
)
SELECT
  (SELECT max_day   FROM last_day)   AS as_of_day,
  (SELECT max_month FROM last_month) AS as_of_month";

/// Growth: last 7 days vs the 7 before, Brazil-wide. NULL growth when the
/// previous window had zero cases.
pub const SQL_GROWTH_7D_BR: &str = "\
WITH as_of AS (
  SELECT COALESCE(MAX(day), date('now')) AS d
  FROM gold.fct_daily_uf
),
d AS (
  SELECT day, SUM(cases) AS cases
  FROM gold.fct_daily_uf
  GROUP BY day
),
w AS (
  SELECT
    COALESCE(SUM(CASE WHEN d.day > date(a.d, '-7 day')
                      AND d.day <= a.d THEN d.cases END), 0) AS cases_7d,
    COALESCE(SUM(CASE WHEN d.day > date(a.d, '-14 day')
                      AND d.day <= date(a.d, '-7 day') THEN d.cases END), 0) AS cases_prev_7d
  FROM d
  CROSS JOIN as_of a
)
SELECT
  cases_7d,
  cases_prev_7d,
  CASE WHEN cases_prev_7d > 0
       THEN 100.0 * (cases_7d - cases_prev_7d) / cases_prev_7d
       ELSE NULL
  END AS growth_7d_pct
FROM w";

pub const SQL_GROWTH_7D_UF: &str = "\
WITH as_of AS (
  SELECT COALESCE(MAX(day), date('now')) AS d
  FROM gold.fct_daily_uf
),
d AS (
  SELECT day, SUM(cases) AS cases
  FROM gold.fct_daily_uf
  WHERE uf = $uf
  GROUP BY day
),
w AS (
  SELECT
    COALESCE(SUM(CASE WHEN d.day > date(a.d, '-7 day')
                      AND d.day <= a.d THEN d.cases END), 0) AS cases_7d,
    COALESCE(SUM(CASE WHEN d.day > date(a.d, '-14 day')
                      AND d.day <= date(a.d, '-7 day') THEN d.cases END), 0) AS cases_prev_7d
  FROM d
  CROSS JOIN as_of a
)
SELECT
  cases_7d,
  cases_prev_7d,
  CASE WHEN cases_prev_7d > 0
       THEN 100.0 * (cases_7d - cases_prev_7d) / cases_prev_7d
       ELSE NULL
  END AS growth_7d_pct
FROM w";

/// 30-day KPIs: CFR over closed cases, ICU share, vaccinated share.
/// Guarded divisions: a zero denominator yields NULL, never a crash or a 0.
pub const SQL_KPIS_30D_BR: &str = "\
WITH as_of AS (
  SELECT COALESCE(MAX(day), date('now')) AS d
  FROM gold.fct_daily_uf
),
agg AS (
  SELECT
    COALESCE(SUM(closed_cases_30d), 0)  AS closed_cases_30d,
    COALESCE(SUM(deaths_30d), 0)        AS deaths_30d,
    COALESCE(SUM(cases), 0)             AS cases_30d,
    COALESCE(SUM(icu_cases), 0)         AS icu_cases_30d,
    COALESCE(SUM(vaccinated_cases), 0)  AS vaccinated_cases_30d
  FROM gold.fct_daily_uf t
  CROSS JOIN as_of a
  WHERE t.day > date(a.d, '-30 day') AND t.day <= a.d
)
SELECT
  agg.cases_30d,
  agg.icu_cases_30d,
  agg.vaccinated_cases_30d,
  agg.closed_cases_30d,
  agg.deaths_30d,
  CASE WHEN agg.closed_cases_30d > 0
       THEN 100.0 * agg.deaths_30d / agg.closed_cases_30d
       ELSE NULL END AS cfr_closed_30d_pct,
  CASE WHEN agg.cases_30d > 0
       THEN 100.0 * agg.icu_cases_30d / agg.cases_30d
       ELSE NULL END AS icu_rate_30d_pct,
  CASE WHEN agg.cases_30d > 0
       THEN 100.0 * agg.vaccinated_cases_30d / agg.cases_30d
       ELSE NULL END AS vaccinated_rate_30d_pct
FROM agg";

pub const SQL_KPIS_30D_UF: &str = "\
WITH as_of AS (
  SELECT COALESCE(MAX(day), date('now')) AS d
  FROM gold.fct_daily_uf
),
agg AS (
  SELECT
    COALESCE(SUM(closed_cases_30d), 0)  AS closed_cases_30d,
    COALESCE(SUM(deaths_30d), 0)        AS deaths_30d,
    COALESCE(SUM(cases), 0)             AS cases_30d,
    COALESCE(SUM(icu_cases), 0)         AS icu_cases_30d,
    COALESCE(SUM(vaccinated_cases), 0)  AS vaccinated_cases_30d
  FROM gold.fct_daily_uf t
  CROSS JOIN as_of a
  WHERE t.uf = $uf
    AND t.day > date(a.d, '-30 day') AND t.day <= a.d
)
SELECT
  agg.cases_30d,
  agg.icu_cases_30d,
  agg.vaccinated_cases_30d,
  agg.closed_cases_30d,
  agg.deaths_30d,
  CASE WHEN agg.closed_cases_30d > 0
       THEN 100.0 * agg.deaths_30d / agg.closed_cases_30d
       ELSE NULL END AS cfr_closed_30d_pct,
  CASE WHEN agg.cases_30d > 0
       THEN 100.0 * agg.icu_cases_30d / agg.cases_30d
       ELSE NULL END AS icu_rate_30d_pct,
  CASE WHEN agg.cases_30d > 0
       THEN 100.0 * agg.vaccinated_cases_30d / agg.cases_30d
       ELSE NULL END AS vaccinated_rate_30d_pct
FROM agg";

/// Daily national series over the trailing 30 days.
pub const SQL_DAILY_30D_BR: &str = "\
WITH as_of AS (
  SELECT COALESCE(MAX(day), date('now')) AS d
  FROM gold.fct_daily_uf
)
SELECT t.day, SUM(t.cases) AS cases
FROM gold.fct_daily_uf t
CROSS JOIN as_of a
WHERE t.day > date(a.d, '-30 day') AND t.day <= a.d
GROUP BY t.day
ORDER BY t.day";

pub const SQL_DAILY_30D_UF: &str = "\
WITH as_of AS (
  SELECT COALESCE(MAX(day), date('now')) AS d
  FROM gold.fct_daily_uf
)
SELECT t.day, SUM(t.cases) AS cases
FROM gold.fct_daily_uf t
CROSS JOIN as_of a
WHERE t.uf = $uf
  AND t.day > date(a.d, '-30 day') AND t.day <= a.d
GROUP BY t.day
ORDER BY t.day";

/// Monthly national series over the trailing 12 months.
pub const SQL_MONTHLY_12M_BR: &str = "\
WITH as_of AS (
  SELECT COALESCE(date(MAX(month), 'start of month'), date('now', 'start of month')) AS m
  FROM gold.fct_monthly_uf
)
SELECT t.month, SUM(t.cases) AS cases
FROM gold.fct_monthly_uf t
CROSS JOIN as_of a
WHERE t.month >= date(a.m, '-11 month')
  AND t.month <= a.m
GROUP BY t.month
ORDER BY t.month";

pub const SQL_MONTHLY_12M_UF: &str = "\
WITH as_of AS (
  SELECT COALESCE(date(MAX(month), 'start of month'), date('now', 'start of month')) AS m
  FROM gold.fct_monthly_uf
)
SELECT t.month, SUM(t.cases) AS cases
FROM gold.fct_monthly_uf t
CROSS JOIN as_of a
WHERE t.uf = $uf
  AND t.month >= date(a.m, '-11 month')
  AND t.month <= a.m
GROUP BY t.month
ORDER BY t.month";

/// Ranking of states by cases over the trailing 30 days.
pub const SQL_TOP_UF_CASES_30D: &str = "\
WITH as_of AS (
  SELECT COALESCE(MAX(day), date('now')) AS d FROM gold.fct_daily_uf
)
SELECT t.uf, SUM(t.cases) AS cases_30d
FROM gold.fct_daily_uf t
CROSS JOIN as_of a
WHERE t.day > date(a.d, '-30 day') AND t.day <= a.d
GROUP BY t.uf
ORDER BY cases_30d DESC";

/// Per-state CFR over closed cases, 90-day window.
pub const SQL_CFR_UF_90D: &str = "\
WITH as_of AS (
  SELECT COALESCE(MAX(day), date('now')) AS d FROM gold.fct_daily_uf
),
agg AS (
  SELECT uf,
         COALESCE(SUM(closed_cases_30d), 0) AS closed_cases_30d,
         COALESCE(SUM(deaths_30d), 0)       AS deaths_30d
  FROM gold.fct_daily_uf t
  CROSS JOIN as_of a
  WHERE t.day > date(a.d, '-90 day') AND t.day <= a.d
  GROUP BY uf
)
SELECT uf,
       CASE WHEN closed_cases_30d > 0
            THEN 100.0 * deaths_30d / closed_cases_30d
            ELSE NULL END AS cfr_closed_30d_pct
FROM agg
ORDER BY cfr_closed_30d_pct DESC NULLS LAST";

/// Every canned statement, for guard conformance checks.
pub const ALL_CANNED: &[(&str, &str)] = &[
    ("as_of_dates", SQL_AS_OF_DATES),
    ("growth_7d_br", SQL_GROWTH_7D_BR),
    ("growth_7d_uf", SQL_GROWTH_7D_UF),
    ("kpis_30d_br", SQL_KPIS_30D_BR),
    ("kpis_30d_uf", SQL_KPIS_30D_UF),
    ("daily_30d_br", SQL_DAILY_30D_BR),
    ("daily_30d_uf", SQL_DAILY_30D_UF),
    ("monthly_12m_br", SQL_MONTHLY_12M_BR),
    ("monthly_12m_uf", SQL_MONTHLY_12M_UF),
    ("top_uf_cases_30d", SQL_TOP_UF_CASES_30D),
    ("cfr_uf_90d", SQL_CFR_UF_90D),
];
