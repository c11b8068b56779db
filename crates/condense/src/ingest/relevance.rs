//! Relevance filtering for technical documents.
//!
//! Keeps only sentences about fault codes and plain instructions, dropping
//! everything else before the text reaches the token budget. The heuristics
//! are deliberately crude — a sentence survives if any fault-code or
//! instruction pattern matches — and a chunk may legitimately reduce to
//! nothing.

use regex::Regex;

/// Patterns recognizing fault-code-like tokens.
const FAULT_CODE_PATTERNS: &[&str] = &[
    r"\b[A-Z]{1,4}[0-9]{1,4}[A-Z]?\b", // ABC123, AB12, A1B2, etc.
    r"\b[Ff]ault\s+[Cc]ode\s*[A-Z0-9]+\b",
    r"\b[Dd]iagnostic\s+[Tt]rouble\s+[Cc]ode\b",
    r"\bDTC\s*[A-Z0-9]+\b",
    r"\b[Ee]rror\s+[Cc]ode\s*[A-Z0-9]+\b",
    r"\b[Pp]roblem\s+[Cc]ode\s*[A-Z0-9]+\b",
];

/// Patterns recognizing imperative maintenance instructions.
const INSTRUCTION_PATTERNS: &[&str] = &[
    r"\b[Ss]tep\s+\d+",
    r"\b[Ff]irst\b.*\b[Tt]hen\b",
    r"\b[Mm]ust\b",
    r"\b[Ss]hould\b",
    r"\b[Cc]heck\b",
    r"\b[Vv]erify\b",
    r"\b[Ii]nspect\b",
    r"\b[Rr]eplace\b",
    r"\b[Rr]emove\b",
    r"\b[Ii]nstall\b",
    r"\b[Cc]onnect\b",
    r"\b[Dd]isconnect\b",
    r"\b[Tt]est\b",
    r"\b[Mm]easure\b",
];

/// Split text into rough sentences at `.`, `!`, `?` boundaries.
///
/// Good enough for a keep/drop heuristic; decimal numbers occasionally
/// split a sentence in two, which only makes the filter slightly more
/// eager to keep both halves.
fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Sentence-level keep/drop filter over fault-code and instruction patterns.
pub struct RelevanceFilter {
    fault_codes: Vec<Regex>,
    instructions: Vec<Regex>,
}

impl RelevanceFilter {
    pub fn new() -> Result<Self, String> {
        Ok(Self {
            fault_codes: compile(FAULT_CODE_PATTERNS)?,
            instructions: compile(INSTRUCTION_PATTERNS)?,
        })
    }

    /// Reduce text to its relevant sentences, joined with single spaces.
    /// Returns an empty string when nothing survives.
    pub fn reduce(&self, text: &str) -> String {
        let kept: Vec<&str> = split_sentences(text)
            .filter(|sentence| self.is_relevant(sentence))
            .collect();
        kept.join(" ")
    }

    fn is_relevant(&self, sentence: &str) -> bool {
        self.fault_codes.iter().any(|re| re.is_match(sentence))
            || self.instructions.iter().any(|re| re.is_match(sentence))
    }
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, String> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| format!("invalid relevance pattern {p:?}: {e}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> RelevanceFilter {
        RelevanceFilter::new().unwrap()
    }

    #[test]
    fn keeps_fault_code_sentences() {
        let reduced = filter().reduce(
            "The catalyst degrades over many years. The ECU stores code P0420 \
             when efficiency drops.",
        );
        assert_eq!(
            reduced,
            "The ECU stores code P0420 when efficiency drops."
        );
    }

    #[test]
    fn keeps_instruction_sentences() {
        let reduced = filter().reduce(
            "Replace the gasket before reassembly. The gasket was introduced \
             in 1998.",
        );
        assert_eq!(reduced, "Replace the gasket before reassembly.");
    }

    #[test]
    fn keeps_numbered_steps() {
        let reduced = filter().reduce("Step 3: torque the bolts evenly.");
        assert_eq!(reduced, "Step 3: torque the bolts evenly.");
    }

    #[test]
    fn drops_narrative_entirely() {
        let reduced = filter().reduce(
            "Early engines were simpler. Enthusiasts admired their sound.",
        );
        assert_eq!(reduced, "");
    }

    #[test]
    fn joins_survivors_in_order() {
        let reduced = filter().reduce(
            "Check the pressure. Many owners ignore it. Verify the reading \
             twice.",
        );
        assert_eq!(
            reduced,
            "Check the pressure. Verify the reading twice."
        );
    }

    #[test]
    fn dtc_and_spelled_out_codes_match() {
        let f = filter();
        assert!(!f.reduce("A diagnostic trouble code appears on the display.").is_empty());
        assert!(!f.reduce("See DTC P1234 before proceeding.").is_empty());
        assert!(!f.reduce("Fault code E42 indicates a sensor issue.").is_empty());
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert_eq!(filter().reduce(""), "");
    }
}
