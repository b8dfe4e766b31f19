//! Keyword classifier: task description -> TaskType + QueryType
//!
//! Each task type owns a keyword table. A type's strength is its most
//! specific match (more words first, then longer text), with the total
//! number of hits as a tiebreak. No match means `general`.

use std::cmp::Ordering;

use recommender_types::{QueryType, TaskType};
use serde::Serialize;

use crate::embedding::tokenize;

const KEYWORDS: &[(TaskType, &[&str])] = &[
    (
        TaskType::Coding,
        &[
            "code", "coding", "program", "programming", "python", "javascript", "typescript", "rust",
            "java", "golang", "c++", "c#", "sql", "api", "debug", "debugging", "bug", "script",
            "scraper", "scraping", "web scraper", "compile", "refactor", "deploy", "backend",
            "frontend", "git", "github", "pull request", "unit test", "unit tests", "software",
            "function", "regex", "database query", "web app", "mobile app",
        ],
    ),
    (
        TaskType::Math,
        &[
            "math", "mathematics", "equation", "equations", "calculus", "algebra", "linear algebra",
            "geometry", "statistics", "probability", "integral", "derivative", "theorem", "proof",
            "calculate", "formula", "matrix", "solve equation", "differential equation",
        ],
    ),
    (
        TaskType::Analysis,
        &[
            "analyze", "analyse", "analysis", "analytics", "data", "dataset", "data analysis",
            "data visualization", "insights", "report", "dashboard", "trend", "trends", "forecast",
            "research", "market research", "spreadsheet", "excel", "visualize", "metrics", "kpi",
            "survey results", "compare",
        ],
    ),
    (
        TaskType::Design,
        &[
            "design", "logo", "ui", "ux", "user interface", "mockup", "wireframe", "prototype",
            "illustration", "graphic", "graphic design", "icon", "banner", "poster", "figma",
            "color palette", "image", "photo", "photo editing", "brand identity", "animation",
        ],
    ),
    (
        TaskType::Writing,
        &[
            "write", "writing", "blog", "blog post", "article", "essay", "copy", "copywriting",
            "story", "content", "proofread", "grammar", "edit text", "summarize", "summary",
            "translate", "novel", "cover letter", "resume", "documentation",
        ],
    ),
    (
        TaskType::Communication,
        &[
            "email", "emails", "message", "messages", "chat", "meeting", "meetings",
            "schedule meeting", "presentation", "slides", "video call", "newsletter",
            "social media", "reply", "respond", "customer support", "team collaboration",
            "announcement", "slack",
        ],
    ),
];

// Below this many tokens a query is always ambiguous
const MIN_SPECIFIC_TOKENS: usize = 3;
const SPECIFIC_DENSITY: f64 = 0.3;

/// Output of the classifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub task_type: TaskType,
    pub query_type: QueryType,
    /// Strength of the winning match, 0..1
    pub confidence: f64,
    pub matched_keywords: Vec<&'static str>,
    /// Set when nothing usable was found in the input
    pub low_confidence: bool,
}

impl Classification {
    fn fallback(query_type: QueryType) -> Self {
        Self {
            task_type: TaskType::General,
            query_type,
            confidence: 0.2,
            matched_keywords: Vec::new(),
            low_confidence: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct MatchStrength {
    words: usize,
    chars: usize,
    hits: usize,
}

impl MatchStrength {
    fn cmp_rank(&self, other: &Self) -> Ordering {
        (self.words, self.chars, self.hits).cmp(&(other.words, other.chars, other.hits))
    }
}

/// Stateless keyword classifier
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryClassifier;

impl QueryClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, description: &str) -> Classification {
        let tokens = tokenize(description);
        if tokens.is_empty() {
            return Classification {
                confidence: 0.0,
                ..Classification::fallback(QueryType::Ambiguous)
            };
        }

        // Pad so phrase matching respects word boundaries
        let haystack = format!(" {} ", tokens.join(" "));

        let mut best: Option<(TaskType, MatchStrength, Vec<&'static str>)> = None;
        for (task_type, keywords) in KEYWORDS {
            let matched: Vec<&'static str> = keywords
                .iter()
                .copied()
                .filter(|keyword| haystack.contains(&format!(" {} ", keyword)))
                .collect();
            if matched.is_empty() {
                continue;
            }

            let strength = matched.iter().fold(
                MatchStrength {
                    hits: matched.len(),
                    ..MatchStrength::default()
                },
                |acc, keyword| {
                    let words = keyword.split(' ').count();
                    if (words, keyword.len()) > (acc.words, acc.chars) {
                        MatchStrength {
                            words,
                            chars: keyword.len(),
                            hits: acc.hits,
                        }
                    } else {
                        acc
                    }
                },
            );

            let stronger = match &best {
                Some((_, current, _)) => strength.cmp_rank(current) == Ordering::Greater,
                None => true,
            };
            if stronger {
                best = Some((*task_type, strength, matched));
            }
        }

        let query_type = Self::query_type(&tokens, best.as_ref().map(|(_, _, m)| m.as_slice()));
        match best {
            Some((task_type, strength, matched_keywords)) => {
                let confidence = (0.4 + 0.15 * strength.hits as f64 + 0.1 * (strength.words - 1) as f64).min(1.0);
                Classification {
                    task_type,
                    query_type,
                    confidence,
                    matched_keywords,
                    low_confidence: false,
                }
            }
            None => Classification::fallback(query_type),
        }
    }

    fn query_type(tokens: &[String], matched: Option<&[&'static str]>) -> QueryType {
        let matched_words: usize = matched
            .unwrap_or_default()
            .iter()
            .map(|keyword| keyword.split(' ').count())
            .sum();

        if tokens.len() < MIN_SPECIFIC_TOKENS || matched_words == 0 {
            return QueryType::Ambiguous;
        }

        let density = matched_words as f64 / tokens.len() as f64;
        if matched_words >= 2 && density >= SPECIFIC_DENSITY {
            QueryType::Specific
        } else {
            QueryType::Broad
        }
    }
}
