//! Canonical registry of the metrics the agent can explain and reference.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    Pct,
    Count,
}

/// Describes a metric: what it is, which canned query computes it, and bounds.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub id: &'static str,
    pub label: &'static str,
    pub description_pt: &'static str,
    pub window: &'static str,
    pub unit: MetricUnit,
    pub notes_pt: Option<&'static str>,
    pub min_val: Option<f64>,
    pub max_val: Option<f64>,
}

lazy_static! {
    pub static ref METRICS: HashMap<&'static str, Metric> = {
        let mut m = HashMap::new();
        m.insert(
            "growth_7d",
            Metric {
                id: "growth_7d",
                label: "Taxa de aumento (7 dias)",
                description_pt: "Variação percentual dos últimos 7 dias em relação aos 7 dias \
                                 anteriores, ancorada no último dia disponível (as_of).",
                window: "7d",
                unit: MetricUnit::Pct,
                notes_pt: Some("Se o período anterior tiver 0 casos, o crescimento é 'indisponível'."),
                min_val: Some(-100.0),
                max_val: Some(1000.0),
            },
        );
        m.insert(
            "cfr_30d_closed",
            Metric {
                id: "cfr_30d_closed",
                label: "CFR (30 dias, casos encerrados)",
                description_pt: "Óbitos divididos por casos encerrados nos últimos 30 dias, em %. \
                                 Não é taxa de mortalidade populacional.",
                window: "30d",
                unit: MetricUnit::Pct,
                notes_pt: Some("Usa apenas casos encerrados em até 30 dias."),
                min_val: Some(0.0),
                max_val: Some(100.0),
            },
        );
        m.insert(
            "icu_rate_30d",
            Metric {
                id: "icu_rate_30d",
                label: "% casos com UTI (30 dias)",
                description_pt: "Percentual de casos com passagem por UTI nos últimos 30 dias. \
                                 Não representa ocupação de leitos hospitalares.",
                window: "30d",
                unit: MetricUnit::Pct,
                notes_pt: Some("Substituto operacional por ausência de denominador de leitos."),
                min_val: Some(0.0),
                max_val: Some(100.0),
            },
        );
        m.insert(
            "vaccinated_rate_30d",
            Metric {
                id: "vaccinated_rate_30d",
                label: "% casos vacinados (30 dias)",
                description_pt: "Percentual de casos com vacinação registrada nos últimos 30 dias. \
                                 Não é cobertura vacinal da população.",
                window: "30d",
                unit: MetricUnit::Pct,
                notes_pt: Some("Não confundir com cobertura populacional."),
                min_val: Some(0.0),
                max_val: Some(100.0),
            },
        );
        m
    };

    /// Synonyms (accent-folded, lowercase) to canonical metric ids. Longest
    /// phrases must be tried first by callers.
    pub static ref METRIC_ALIASES: Vec<(&'static str, &'static str)> = {
        let mut aliases = vec![
            // growth
            ("taxa de aumento", "growth_7d"),
            ("crescimento 7d", "growth_7d"),
            ("aumento 7 dias", "growth_7d"),
            ("growth", "growth_7d"),
            // cfr
            ("taxa de mortalidade de casos", "cfr_30d_closed"),
            ("case fatality rate", "cfr_30d_closed"),
            ("taxa de letalidade", "cfr_30d_closed"),
            ("letalidade", "cfr_30d_closed"),
            // icu
            ("percentual de casos com uti", "icu_rate_30d"),
            ("internacao em uti", "icu_rate_30d"),
            ("admissao em uti", "icu_rate_30d"),
            ("taxa de uti", "icu_rate_30d"),
            ("icu rate", "icu_rate_30d"),
            ("uti", "icu_rate_30d"),
            // vaccinated
            ("percentual de vacinados", "vaccinated_rate_30d"),
            ("taxa de vacinacao", "vaccinated_rate_30d"),
            ("taxa de vacinados", "vaccinated_rate_30d"),
            ("vaccinated rate", "vaccinated_rate_30d"),
        ];
        // Phrase-first matching: longest alias wins.
        aliases.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.len()));
        aliases
    };
}

/// Resolve an accent-folded text fragment to a canonical metric id.
pub fn resolve_metric(folded_text: &str) -> Option<&'static str> {
    for (alias, id) in METRIC_ALIASES.iter() {
        if folded_text.contains(alias) {
            return Some(id);
        }
    }
    // Token-level fallback for the acronym spellings; punctuation does not
    // count as part of a token.
    let mut tokens = folded_text.split(|c: char| !c.is_alphanumeric());
    if tokens.any(|t| t == "cfr" || t == "crf") {
        return Some("cfr_30d_closed");
    }
    None
}
