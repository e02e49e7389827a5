//! Rule-based multi-label intent classification (SPEC_FULL.md §4.H). Ported from the
//! original's `IntentClassifierV3`: per-intent `(regex, weight)` lists accumulate a raw
//! score, heuristics adjust it, then a temperature-1 softmax turns the five raw scores
//! into a probability distribution. Static-pattern compilation follows the
//! compiled-pattern-plus-weight idiom used elsewhere in the corpus for regex fallback
//! extraction, adapted to an instance field (built once per classifier) rather than a
//! process-wide static.

use regex::Regex;

/// The five intent classes a query can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Symbol,
    Flow,
    Concept,
    Code,
    Balanced,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Intent::Symbol => "symbol",
            Intent::Flow => "flow",
            Intent::Concept => "concept",
            Intent::Code => "code",
            Intent::Balanced => "balanced",
        };
        write!(f, "{s}")
    }
}

/// Softmax-normalized probability over the five intents; always sums to ~1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntentProbability {
    pub symbol: f64,
    pub flow: f64,
    pub concept: f64,
    pub code: f64,
    pub balanced: f64,
}

impl IntentProbability {
    /// The argmax intent.
    pub fn dominant(&self) -> Intent {
        let mut best = (Intent::Balanced, self.balanced);
        for (intent, value) in [
            (Intent::Symbol, self.symbol),
            (Intent::Flow, self.flow),
            (Intent::Concept, self.concept),
            (Intent::Code, self.code),
        ] {
            if value > best.1 {
                best = (intent, value);
            }
        }
        best.0
    }

    pub fn of(&self, intent: Intent) -> f64 {
        match intent {
            Intent::Symbol => self.symbol,
            Intent::Flow => self.flow,
            Intent::Concept => self.concept,
            Intent::Code => self.code,
            Intent::Balanced => self.balanced,
        }
    }
}

/// Hints extracted from the query in the same pass as classification: candidate symbol
/// names, file paths, and dotted module paths, used by scope selection (§4.I) and
/// post-fusion boosting (§4.K), never for ranking directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentHints {
    pub symbol_names: Vec<String>,
    pub file_paths: Vec<String>,
    pub module_paths: Vec<String>,
}

/// Seam for a future ML-backed classifier; the only implementation here is rule-based.
pub trait IntentClassifier {
    fn classify(&self, query: &str) -> (IntentProbability, IntentHints);
}

struct WeightedPattern {
    regex: Regex,
    weight: f64,
}

fn compile(patterns: &[(&str, f64)]) -> Vec<WeightedPattern> {
    patterns
        .iter()
        .map(|(pattern, weight)| WeightedPattern {
            regex: Regex::new(&format!("(?i){pattern}")).expect("static intent pattern is valid"),
            weight: *weight,
        })
        .collect()
}

const BALANCED_BASELINE: f64 = 0.3;

pub struct RuleBasedClassifier {
    symbol_patterns: Vec<WeightedPattern>,
    flow_patterns: Vec<WeightedPattern>,
    concept_patterns: Vec<WeightedPattern>,
    code_patterns: Vec<WeightedPattern>,
    single_identifier: Regex,
    camel_case: Regex,
    snake_case: Regex,
    file_extension: Regex,
    file_path: Regex,
    module_path: Regex,
    from_x_to_y: Regex,
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedClassifier {
    pub fn new() -> Self {
        Self {
            symbol_patterns: compile(&[
                (r"\b(class|function|method|def)\s+\w+", 0.4),
                (r"\b(find|locate|show)\s+\w+", 0.3),
                (r"^[\w.]+$", 0.5),
                (r"::", 0.4),
                (r"\w+\.\w+", 0.3),
                (r"[A-Z][a-z]+(?:[A-Z][a-z]+)+", 0.3),
                (r"\w+_\w+", 0.2),
                (r"\b(enum|interface|type|protocol|struct)\s+\w+", 0.4),
                (r"\b(enum|interface|type)\b", 0.3),
            ]),
            flow_patterns: compile(&[
                (r"\b(call|trace|flow)\b", 0.5),
                (r"\bwho\s+calls?\b", 0.6),
                (r"\bwhere\s+used\b", 0.4),
                (r"\bcall\s+(chain|graph|path)\b", 0.5),
                (r"\bexecution\s+flow\b", 0.5),
                (r"\bdata\s+flow\b", 0.4),
                (r"\bfrom\s+\w+\s+to\s+\w+", 0.5),
                (r"\bcalls?\s+\w+", 0.4),
                (r"\bused\s+by\b", 0.4),
                (r"\bdepends?\s+on\b", 0.4),
            ]),
            concept_patterns: compile(&[
                (r"\bhow\s+(does|do|is)\b", 0.5),
                (r"\bwhat\s+(is|are)\b", 0.5),
                (r"\bexplain\b", 0.6),
                (r"\barchitecture\b", 0.5),
                (r"\bdesign\b", 0.4),
                (r"\bconcept\b", 0.5),
                (r"\bpattern\b", 0.3),
                (r"\bworks?\b", 0.3),
            ]),
            code_patterns: compile(&[
                (r"\bexample\b", 0.5),
                (r"\bimplement(ation)?\b", 0.5),
                (r"\bcode\s+(for|that)\b", 0.5),
                (r"\bloop\b", 0.3),
                (r"\bconditional\b", 0.3),
                (r"\balgorithm\b", 0.4),
                (r"\blogic\b", 0.3),
            ]),
            single_identifier: Regex::new(r"^[\w.]+$").unwrap(),
            camel_case: Regex::new(r"\b[A-Z][a-z]+(?:[A-Z][a-z]+)+\b").unwrap(),
            snake_case: Regex::new(r"\b[a-z_]+[a-z]\b").unwrap(),
            file_extension: Regex::new(r"\.(py|ts|js|go|java|rs)\b").unwrap(),
            file_path: Regex::new(r"([\w/]+\.(?:py|ts|js|go|java|rs|cpp|c|h))\b").unwrap(),
            module_path: Regex::new(r"\b[a-z_]+(?:\.[a-z_]+)+\b").unwrap(),
            from_x_to_y: Regex::new(r"\bfrom\s+\w+\s+to\s+\w+").unwrap(),
        }
    }

    fn score(patterns: &[WeightedPattern], query: &str) -> f64 {
        let total: f64 = patterns.iter().filter(|p| p.regex.is_match(query)).map(|p| p.weight).sum();
        total.min(1.0)
    }

    fn apply_heuristics(&self, query: &str, scores: &mut RawScores) {
        let query_lower = query.to_lowercase();
        let words: Vec<&str> = query_lower.split_whitespace().collect();

        if words.len() <= 2 && self.single_identifier.is_match(query) {
            scores.symbol += 0.5;
        }

        const QUESTION_WORDS: [&str; 5] = ["how", "what", "why", "when", "where"];
        if words.iter().any(|w| QUESTION_WORDS.contains(w)) {
            scores.concept += 0.3;
        }

        const VERBS: [&str; 6] = ["get", "set", "create", "delete", "update", "find"];
        let verb_count = words.iter().filter(|w| VERBS.contains(w)).count();
        if verb_count >= 2 {
            scores.code += 0.3;
        }

        if self.file_extension.is_match(query) {
            scores.code += 0.4;
        }

        if words.len() > 8 {
            scores.concept += 0.3;
        }

        if self.from_x_to_y.is_match(&query_lower) {
            scores.flow += 0.5;
        }
    }

    fn extract_hints(&self, query: &str) -> IntentHints {
        const STOPWORDS: [&str; 10] = ["the", "and", "for", "from", "with", "how", "what", "why", "when", "where"];

        let mut symbol_names: Vec<String> = self.camel_case.find_iter(query).map(|m| m.as_str().to_string()).collect();
        for m in self.snake_case.find_iter(query) {
            let s = m.as_str();
            if s.len() > 2 && !STOPWORDS.contains(&s) && !symbol_names.contains(&s.to_string()) {
                symbol_names.push(s.to_string());
            }
        }
        symbol_names.sort();
        symbol_names.dedup();
        symbol_names.truncate(5);

        let mut file_paths: Vec<String> = self.file_path.captures_iter(query).map(|c| c[1].to_string()).collect();
        file_paths.sort();
        file_paths.dedup();
        file_paths.truncate(3);

        let mut module_paths: Vec<String> = self.module_path.find_iter(query).map(|m| m.as_str().to_string()).collect();
        module_paths.sort();
        module_paths.dedup();
        module_paths.truncate(3);

        IntentHints { symbol_names, file_paths, module_paths }
    }
}

struct RawScores {
    symbol: f64,
    flow: f64,
    concept: f64,
    code: f64,
    balanced: f64,
}

fn softmax(scores: RawScores) -> IntentProbability {
    let values = [scores.symbol, scores.flow, scores.concept, scores.code, scores.balanced];
    let exp: Vec<f64> = values.iter().map(|v| v.exp()).collect();
    let total: f64 = exp.iter().sum();
    IntentProbability {
        symbol: exp[0] / total,
        flow: exp[1] / total,
        concept: exp[2] / total,
        code: exp[3] / total,
        balanced: exp[4] / total,
    }
}

impl IntentClassifier for RuleBasedClassifier {
    fn classify(&self, query: &str) -> (IntentProbability, IntentHints) {
        let mut scores = RawScores {
            symbol: Self::score(&self.symbol_patterns, query),
            flow: Self::score(&self.flow_patterns, query),
            concept: Self::score(&self.concept_patterns, query),
            code: Self::score(&self.code_patterns, query),
            balanced: BALANCED_BASELINE,
        };
        self.apply_heuristics(query, &mut scores);

        (softmax(scores), self.extract_hints(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RuleBasedClassifier {
        RuleBasedClassifier::new()
    }

    #[test]
    fn probabilities_sum_to_one() {
        let (probs, _) = classifier().classify("how does authentication work?");
        let total = probs.symbol + probs.flow + probs.concept + probs.code + probs.balanced;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn single_identifier_query_is_dominantly_symbol() {
        let (probs, _) = classifier().classify("LoginHandler");
        assert_eq!(probs.dominant(), Intent::Symbol);
    }

    #[test]
    fn who_calls_query_is_dominantly_flow() {
        let (probs, _) = classifier().classify("who calls authenticate");
        assert_eq!(probs.dominant(), Intent::Flow);
    }

    #[test]
    fn how_does_question_is_dominantly_concept() {
        let (probs, _) = classifier().classify("how does the authentication flow work in this codebase overall");
        assert_eq!(probs.dominant(), Intent::Concept);
    }

    #[test]
    fn camel_case_hint_is_extracted() {
        let (_, hints) = classifier().classify("where is LoginHandler used");
        assert!(hints.symbol_names.contains(&"LoginHandler".to_string()));
    }

    #[test]
    fn file_path_hint_is_extracted() {
        let (_, hints) = classifier().classify("show me src/auth.py");
        assert!(hints.file_paths.iter().any(|p| p.ends_with("auth.py")));
    }

    #[test]
    fn module_path_hint_is_extracted() {
        let (_, hints) = classifier().classify("explain pkg.auth.handlers");
        assert!(hints.module_paths.contains(&"pkg.auth.handlers".to_string()));
    }
}
