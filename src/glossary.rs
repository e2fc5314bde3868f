//! PT-BR glossary of data terms: derived metrics plus the silver-layer
//! columns the marts are built from. Lookup resolves aliases first, then
//! exact keys, then a fuzzy fallback for typos.

use crate::intent::fold_text;
use crate::metrics::METRICS;
use lazy_static::lazy_static;
use std::collections::HashMap;
use strsim::jaro_winkler;

/// Similarity floor for the fuzzy fallback. Below this, guessing would
/// misexplain more often than it helps.
const FUZZY_CUTOFF: f64 = 0.84;

lazy_static! {
    /// Canonical term -> PT-BR description. Metric entries come from the
    /// registry; the rest documents silver columns operators ask about.
    static ref GLOSSARY_PT: HashMap<&'static str, String> = {
        let mut g: HashMap<&'static str, String> = HashMap::new();
        for metric in METRICS.values() {
            let mut text = format!("{}: {}", metric.label, metric.description_pt);
            if let Some(notes) = metric.notes_pt {
                text.push(' ');
                text.push_str(notes);
            }
            g.insert(metric.id, text);
        }
        let mut col = |k: &'static str, v: &str| {
            g.insert(k, v.to_string());
        };
        col("dt_notific", "Data de notificação do caso (DATE).");
        col("dt_sin_pri", "Data de início dos sintomas (DATE).");
        col("dt_evoluca", "Data do desfecho (alta ou óbito), pode ser nula (DATE).");
        col("dt_encerra", "Data de encerramento do caso no sistema (DATE).");
        col("sem_not", "Semana epidemiológica da notificação (INTEGER).");
        col(
            "evolucao_code",
            "Código do desfecho {1=CURA, 2=ÓBITO, 3=ÓBITO OUTRAS, 9=IGNORADO}.",
        );
        col("evolucao_label", "Rótulo do desfecho a partir de 'evolucao_code'.");
        col("classi_fin", "Classificação final (etiologia) do caso.");
        col("uti_bool", "Indicador de passagem por UTI (BOOLEAN).");
        col("vacinado_bool", "Indicador de vacinação registrada no caso (BOOLEAN).");
        col("idade", "Idade em anos (INTEGER).");
        col(
            "faixa_etaria",
            "Faixa etária derivada da idade (0-4, 5-17, 18-39, 40-59, 60+).",
        );
        col("sexo", "Sexo (M/F/...).");
        col("uf", "UF de notificação (sigla de 2 letras).");
        col("is_obito", "Flag para óbito (evolucao_code = 2).");
        col(
            "pendente_60d",
            "Provável pendência após 60 dias sem desfecho/encerramento (BOOLEAN).",
        );
        g
    };

    /// Accent-folded synonym -> canonical key.
    static ref ALIASES_PT: HashMap<&'static str, &'static str> = {
        let mut a = HashMap::new();
        // CFR
        a.insert("cfr", "cfr_30d_closed");
        a.insert("crf", "cfr_30d_closed");
        a.insert("case fatality rate", "cfr_30d_closed");
        a.insert("taxa de letalidade", "cfr_30d_closed");
        a.insert("letalidade", "cfr_30d_closed");
        a.insert("taxa de mortalidade de casos", "cfr_30d_closed");
        // ICU rate
        a.insert("icu", "icu_rate_30d");
        a.insert("icu rate", "icu_rate_30d");
        a.insert("taxa de uti", "icu_rate_30d");
        a.insert("percentual de casos com uti", "icu_rate_30d");
        a.insert("uti", "icu_rate_30d");
        a.insert("internacao em uti", "icu_rate_30d");
        a.insert("admissao em uti", "icu_rate_30d");
        // Vaccinated rate
        a.insert("taxa de vacinacao", "vaccinated_rate_30d");
        a.insert("taxa de vacinados", "vaccinated_rate_30d");
        a.insert("percentual de vacinados", "vaccinated_rate_30d");
        a.insert("vaccinated rate", "vaccinated_rate_30d");
        // Growth
        a.insert("taxa de aumento", "growth_7d");
        a.insert("crescimento 7d", "growth_7d");
        a.insert("aumento 7 dias", "growth_7d");
        a
    };
}

/// PT-BR description for a data term. Alias hit first, then exact canonical
/// key, then the closest fuzzy candidate above the cutoff (flagged as an
/// interpretation). Unknown terms get a fixed fallback message.
pub fn glossary_lookup(term: &str) -> String {
    let raw = term.trim();
    if raw.is_empty() {
        return "Informe o termo que deseja explicar.".to_string();
    }
    let folded = fold_text(raw);

    if let Some(key) = ALIASES_PT.get(folded.as_str()) {
        if let Some(text) = GLOSSARY_PT.get(key) {
            return text.clone();
        }
    }
    if let Some(text) = GLOSSARY_PT.get(folded.as_str()) {
        return text.clone();
    }

    // Fuzzy over canonical keys and aliases.
    let mut best: Option<(&str, f64)> = None;
    for candidate in GLOSSARY_PT.keys().copied().chain(ALIASES_PT.keys().copied()) {
        let score = jaro_winkler(&folded, candidate);
        if score >= FUZZY_CUTOFF && best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    if let Some((matched, _)) = best {
        let key = ALIASES_PT.get(matched).copied().unwrap_or(matched);
        if let Some(text) = GLOSSARY_PT.get(key) {
            return format!("{} *(interpretei como '{}')*", text, matched);
        }
    }

    "Termo não encontrado no glossário do projeto.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolves_before_fuzzy() {
        let text = glossary_lookup("letalidade");
        assert!(text.contains("CFR"), "got: {text}");
        assert!(!text.contains("interpretei"));
    }

    #[test]
    fn exact_column_lookup() {
        let text = glossary_lookup("dt_notific");
        assert!(text.contains("notificação"));
    }

    #[test]
    fn accents_do_not_matter() {
        let text = glossary_lookup("internação em UTI");
        assert!(text.contains("UTI"));
    }

    #[test]
    fn close_typo_is_interpreted() {
        let text = glossary_lookup("dt_notifik");
        assert!(text.contains("interpretei"), "got: {text}");
    }

    #[test]
    fn unknown_term_gets_the_fallback() {
        let text = glossary_lookup("batatinha frita");
        assert!(text.contains("não encontrado"));
    }

    #[test]
    fn empty_term_asks_for_input() {
        assert!(glossary_lookup("  ").contains("Informe o termo"));
    }
}
