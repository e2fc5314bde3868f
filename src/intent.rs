//! Two-tier intent classification: deterministic PT-first rules, with an
//! optional model-assisted fallback through the provider router.
//!
//! The rule tier covers the common unambiguous traffic at zero network cost.
//! The model tier only runs when no rule fires and the feature flag enables
//! it; any answer outside the closed set resolves to `Unknown`. Ambiguous
//! input is never an error.

use crate::error::Result;
use crate::metrics::resolve_metric;
use crate::prompt::INTENT_SYSTEM_PROMPT;
use crate::provider::{GenerationOptions, ProviderRouter};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Closed intent set. Exactly one is assigned per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Greet,
    News,
    Report,
    Explain,
    DataQa,
    NlQuery,
    Trend,
    Compare,
    Chitchat,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greet => "greet",
            Intent::News => "news",
            Intent::Report => "report",
            Intent::Explain => "explain",
            Intent::DataQa => "dataqa",
            Intent::NlQuery => "nlquery",
            Intent::Trend => "trend",
            Intent::Compare => "compare",
            Intent::Chitchat => "chitchat",
            Intent::Unknown => "unknown",
        }
    }

    /// Parse a model answer; anything outside the set is `None`.
    pub fn parse(token: &str) -> Option<Intent> {
        match token.trim().to_lowercase().as_str() {
            "greet" => Some(Intent::Greet),
            "news" => Some(Intent::News),
            "report" => Some(Intent::Report),
            "explain" => Some(Intent::Explain),
            "dataqa" => Some(Intent::DataQa),
            "nlquery" => Some(Intent::NlQuery),
            "trend" => Some(Intent::Trend),
            "compare" => Some(Intent::Compare),
            "chitchat" => Some(Intent::Chitchat),
            "unknown" => Some(Intent::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Br,
    Uf,
}

/// Extraction hints carried beside the intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentHints {
    pub scope: Scope,
    pub uf: Option<String>,
    pub metric: Option<String>,
    pub days_back: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub hints: IntentHints,
    /// Heuristic 0..1; rule hits over total hits.
    pub confidence: f64,
    /// True when the rule tier decided without a provider call.
    pub rule_based: bool,
}

/// Lowercase, strip accents, collapse whitespace. Mirrors how the upstream
/// data pipeline normalizes PT-BR text.
pub fn fold_text(s: &str) -> String {
    let folded: String = s
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            _ => c,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

lazy_static! {
    static ref UF_BY_NAME: Vec<(&'static str, &'static str)> = vec![
        ("mato grosso do sul", "MS"),
        ("rio grande do norte", "RN"),
        ("rio grande do sul", "RS"),
        ("distrito federal", "DF"),
        ("espirito santo", "ES"),
        ("rio de janeiro", "RJ"),
        ("santa catarina", "SC"),
        ("minas gerais", "MG"),
        ("mato grosso", "MT"),
        ("sao paulo", "SP"),
        ("pernambuco", "PE"),
        ("maranhao", "MA"),
        ("tocantins", "TO"),
        ("rondonia", "RO"),
        ("amazonas", "AM"),
        ("alagoas", "AL"),
        ("roraima", "RR"),
        ("sergipe", "SE"),
        ("paraiba", "PB"),
        ("parana", "PR"),
        ("goias", "GO"),
        ("bahia", "BA"),
        ("ceara", "CE"),
        ("piaui", "PI"),
        ("amapa", "AP"),
        ("acre", "AC"),
        ("para", "PA"),
    ];
    static ref UF_CODES: Vec<&'static str> = UF_BY_NAME.iter().map(|(_, c)| *c).collect();
    static ref UF_NAME_RES: Vec<(Regex, &'static str)> = UF_BY_NAME
        .iter()
        .map(|(name, code)| (Regex::new(&format!(r"\b{}\b", name)).unwrap(), *code))
        .collect();
    static ref SIGLA_RE: Regex = Regex::new(r"\b([A-Z]{2})\b").unwrap();

    /// Rule tables keyed by intent, applied to the folded text. Priority
    /// order below breaks score ties.
    static ref RULES: Vec<(Intent, Vec<Regex>)> = {
        fn rx(patterns: &[&str]) -> Vec<Regex> {
            patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
        }
        vec![
            (Intent::Greet, rx(&[
                r"\b(oi|ola)\b",
                r"\b(bom dia|boa tarde|boa noite)\b",
                r"\b(eai|e ai|alo)\b",
                r"\b(tudo bem|tudo bom)\b",
                r"\b(quem (e|eh) voce|o que voce faz|como voce funciona)\b",
                r"\b(ajuda|help)\b",
            ])),
            (Intent::News, rx(&[
                r"\bnoticias?\b",
                r"\bultimas? noticias?\b",
                r"\bnovidades?\b",
                r"\batualizac(ao|oes)\b",
                r"\bnews\b",
                r"\b(o que saiu|que saiu)\b",
            ])),
            (Intent::Report, rx(&[
                r"\brelatorios?\b",
                r"\brelatorio padrao\b",
                r"\breport\b",
                r"\bsumario\b",
                r"\bresumo\b",
                r"\bgerar? analise\b",
            ])),
            (Intent::Explain, rx(&[
                r"\bexplicar?\b",
                r"\bexplica\b",
                r"\bo que (e|eh) \b",
                r"\bdefinicao\b",
                r"\b(glossario|glossary)\b",
                r"\bsignifica\b",
                r"\bmeaning\b",
            ])),
            (Intent::DataQa, rx(&[
                r"\b(quais|que) (colunas|tabelas|campos|dados)\b",
                r"\bdicionario de dados\b",
                r"\bcomo (e|eh|sao) calculad[oa]s?\b",
                r"\bde onde (vem|vieram) os dados\b",
            ])),
            (Intent::NlQuery, rx(&[
                r"\bquant[oa]s?\b",
                r"\bqual (o|a) (total|numero|quantidade|media|soma)\b",
                r"\bhow many\b",
                r"\bmedia de\b",
                r"\bsoma de\b",
                r"\bnumero de (casos|obitos|mortes|internacoes)\b",
            ])),
            (Intent::Trend, rx(&[
                r"\btendencias?\b",
                r"\bevolucao\b",
                r"\bultimos? (7|30|12) (dias|mes(es)?)\b",
                r"\bcurva\b",
                r"\bseries? tempora(l|is)\b",
                r"\btrend\b",
            ])),
            (Intent::Compare, rx(&[
                r"\bcomparar?\b",
                r"\bcompare\b",
                r"\branking\b",
                r"\b(maiores|menores|piores|melhores|top)\b",
            ])),
            (Intent::Chitchat, rx(&[
                r"\b(obrigad[oa]|valeu|legal|show)\b",
                r"\b(tchau|ate mais|ate logo)\b",
                r"\b(haha|kkk+|rs)\b",
            ])),
        ]
    };
}

/// Detect a UF scope from the original (case-preserving) text: two-letter
/// sigla first, full state name second.
pub fn detect_uf(original: &str) -> (Scope, Option<String>) {
    for cap in SIGLA_RE.captures_iter(original) {
        let sigla = &cap[1];
        if UF_CODES.contains(&sigla) {
            return (Scope::Uf, Some(sigla.to_string()));
        }
    }
    let folded = fold_text(original);
    for (re, code) in UF_NAME_RES.iter() {
        if re.is_match(&folded) {
            return (Scope::Uf, Some((*code).to_string()));
        }
    }
    (Scope::Br, None)
}

/// Parse a days-back window hint from natural PT text. Defaults to 14.
pub fn parse_days_back(original: &str) -> u32 {
    let t = fold_text(original);
    if t.contains("hoje") || t.contains("agora") {
        return 1;
    }
    if t.contains("ontem") {
        return 2;
    }
    lazy_static! {
        static ref SEVEN: Regex = Regex::new(r"\b(7|sete)\b.*\bdias\b").unwrap();
        static ref THIRTY: Regex = Regex::new(r"\b(30|trinta)\b.*\bdias\b").unwrap();
        static ref NINETY: Regex = Regex::new(r"\b(90|noventa)\b.*\bdias\b").unwrap();
    }
    if SEVEN.is_match(&t) || t.contains("semana") {
        return 7;
    }
    if THIRTY.is_match(&t) || t.contains(" mes") || t.starts_with("mes") {
        return 30;
    }
    if NINETY.is_match(&t) || t.contains("trimestre") {
        return 90;
    }
    14
}

/// Extract the term after an "explain" trigger; falls back to the last
/// clause without terminal punctuation.
pub fn extract_explain_term(original: &str) -> String {
    let trimmed = original.trim();
    let folded = fold_text(trimmed);
    for trigger in ["explicar", "explica", "o que e ", "o que eh "] {
        if folded.starts_with(trigger) {
            // Folding is char-to-char, so char offsets line up with the
            // original text even when it carries accents.
            let rest: String = trimmed.chars().skip(trigger.chars().count()).collect();
            let rest = rest.trim_matches(|c: char| c.is_whitespace() || ":?.,;".contains(c));
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    trimmed
        .rsplit(['?', '.', ',', ';', ':'])
        .find(|part| !part.trim().is_empty())
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

pub struct IntentClassifier {
    use_model_fallback: bool,
    model_timeout: Duration,
}

impl IntentClassifier {
    pub fn new(use_model_fallback: bool, model_timeout: Duration) -> Self {
        Self {
            use_model_fallback,
            model_timeout,
        }
    }

    fn hints(&self, original: &str) -> IntentHints {
        let (scope, uf) = detect_uf(original);
        IntentHints {
            scope,
            uf,
            metric: resolve_metric(&fold_text(original)).map(str::to_string),
            days_back: parse_days_back(original),
        }
    }

    /// Rule tier only. Returns `Unknown` with zero confidence when nothing
    /// fires.
    pub fn classify_rules(&self, message: &str) -> Classification {
        let folded = fold_text(message);
        let mut scores: HashMap<Intent, usize> = HashMap::new();
        for (intent, patterns) in RULES.iter() {
            let hits = patterns.iter().filter(|re| re.is_match(&folded)).count();
            if hits > 0 {
                scores.insert(*intent, hits);
            }
        }

        let mut top = Intent::Unknown;
        let mut top_score = 0usize;
        // RULES is ordered by priority; strict `>` keeps the earlier intent
        // on ties.
        for (intent, _) in RULES.iter() {
            let score = scores.get(intent).copied().unwrap_or(0);
            if score > top_score {
                top = *intent;
                top_score = score;
            }
        }

        let total: usize = scores.values().sum();
        let confidence = if total > 0 {
            top_score as f64 / total as f64
        } else {
            0.0
        };
        debug!(intent = top.as_str(), confidence, "rule-tier classification");
        Classification {
            intent: top,
            hints: self.hints(message),
            confidence,
            rule_based: true,
        }
    }

    /// Full two-tier classification. The model tier is consulted only when
    /// no rule fires and the feature flag enabled it at startup; classifier
    /// failure resolves to `Unknown`, never an error.
    pub async fn classify(&self, message: &str, router: &ProviderRouter) -> Result<Classification> {
        let ruled = self.classify_rules(message);
        if ruled.intent != Intent::Unknown {
            return Ok(ruled);
        }
        if !self.use_model_fallback || router.is_empty() {
            return Ok(ruled);
        }

        let opts = GenerationOptions {
            system: INTENT_SYSTEM_PROMPT.to_string(),
            max_tokens: 8,
            temperature: 0.0,
            timeout: self.model_timeout,
        };
        match router.generate(message, &opts).await {
            Ok(answer) => {
                let intent = Intent::parse(&answer).unwrap_or(Intent::Unknown);
                info!(intent = intent.as_str(), "model-tier classification");
                Ok(Classification {
                    intent,
                    confidence: if intent == Intent::Unknown { 0.0 } else { 0.5 },
                    rule_based: false,
                    hints: ruled.hints,
                })
            }
            // Unknown is a valid terminal outcome, not an error.
            Err(_) => Ok(ruled),
        }
    }
}
