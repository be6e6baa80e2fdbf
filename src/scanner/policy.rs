//! Classification policy: engine detections + lists + keyword heuristic → clean/infected.
//!
//! Precedence per detection is allow-list > deny-list > malicious keyword >
//! safe keyword > ambiguous. Ambiguous labels fail closed; empty labels are
//! not judged. The first deny-list hit settles the artifact and stops evaluation.

use regex::Regex;

use crate::core::config::PolicyConfig;
use crate::core::errors::{ArsError, Result};
use crate::scanner::lists::DetectionLists;
use crate::scanner::model::{
    AnalysisStats, Disposition, EngineVerdict, JudgedDetection, Judgement,
};

// ──────────────────── keyword sets ────────────────────

/// Case-insensitive substring keyword matcher.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    keywords: Vec<String>,
    matcher: Option<Regex>,
}

impl KeywordSet {
    /// Compile `keywords` into a single alternation. Blank entries are dropped.
    ///
    /// # Errors
    /// [`ArsError::InvalidPattern`] if the compiled alternation is rejected.
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Ok(Self {
                keywords,
                matcher: None,
            });
        }
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let matcher = Regex::new(&format!("(?i)(?:{alternation})")).map_err(|err| {
            ArsError::InvalidPattern {
                details: format!("keyword set {keywords:?}: {err}"),
            }
        })?;
        Ok(Self {
            keywords,
            matcher: Some(matcher),
        })
    }

    #[must_use]
    pub fn is_match(&self, label: &str) -> bool {
        self.matcher.as_ref().is_some_and(|re| re.is_match(label))
    }

    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

// ──────────────────── policy ────────────────────

/// Outcome of classifying one found artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Always `Clean` or `Infected`.
    pub disposition: Disposition,
    pub detections: Vec<JudgedDetection>,
    /// Both aggregate counts were zero; no detection was inspected.
    pub short_circuited: bool,
}

impl Classification {
    /// Number of detections judged infecting.
    #[must_use]
    pub fn infecting_count(&self) -> usize {
        self.detections
            .iter()
            .filter(|d| d.judgement.is_infecting())
            .count()
    }
}

/// Keyword heuristic plus list overrides.
#[derive(Debug, Clone)]
pub struct ClassificationPolicy {
    malicious: KeywordSet,
    safe: KeywordSet,
}

impl ClassificationPolicy {
    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        Ok(Self {
            malicious: KeywordSet::new(&config.malicious_keywords)?,
            safe: KeywordSet::new(&config.safe_keywords)?,
        })
    }

    /// Heuristic judgement of a bare label, ignoring lists.
    #[must_use]
    pub fn judge_label(&self, label: &str) -> Judgement {
        if self.malicious.is_match(label) {
            Judgement::Malicious
        } else if self.safe.is_match(label) {
            Judgement::Safe
        } else {
            Judgement::Ambiguous
        }
    }

    /// Judge one detection with list overrides applied.
    #[must_use]
    pub fn judge(&self, verdict: &EngineVerdict, lists: &DetectionLists) -> Judgement {
        let detection = verdict.detection_string();
        if lists.allow.matches(&detection) {
            Judgement::Allowed
        } else if lists.deny.matches(&detection) {
            Judgement::Denied
        } else {
            self.judge_label(verdict.effective_label())
        }
    }

    /// Classify a found artifact.
    ///
    /// Only malicious and suspicious verdicts are considered, in the order given.
    /// Verdicts with an empty label are recorded but not judged.
    #[must_use]
    pub fn classify(
        &self,
        stats: &AnalysisStats,
        verdicts: &[EngineVerdict],
        lists: &DetectionLists,
    ) -> Classification {
        let flagging = verdicts.iter().filter(|v| v.category.is_flagging());

        if stats.is_quiet() {
            return Classification {
                disposition: Disposition::Clean,
                detections: flagging
                    .map(|v| JudgedDetection {
                        verdict: v.clone(),
                        judgement: Judgement::NotEvaluated,
                    })
                    .collect(),
                short_circuited: true,
            };
        }

        let mut detections = Vec::new();
        let mut infected = false;
        let mut stopped = false;
        for verdict in flagging {
            // An engine that flagged without naming anything is not judged.
            let judgement = if stopped || verdict.label.trim().is_empty() {
                Judgement::NotEvaluated
            } else {
                self.judge(verdict, lists)
            };
            if judgement == Judgement::Denied {
                stopped = true;
            }
            infected |= judgement.is_infecting();
            detections.push(JudgedDetection {
                verdict: verdict.clone(),
                judgement,
            });
        }

        Classification {
            disposition: if infected {
                Disposition::Infected
            } else {
                Disposition::Clean
            },
            detections,
            short_circuited: false,
        }
    }
}
