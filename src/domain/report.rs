//! Aggregate report built from one batch of visitor decisions

use crate::domain::types::{Decision, VisitorId};
use rustc_hash::FxHashMap;
use serde::Serialize;

const DEBUG_TEXT_ON: &str = "[DEBUG: Feature \x1b[36mON\x1b[0m]";
const DEBUG_TEXT_OFF: &str = "[DEBUG: Feature \x1b[33mOFF\x1b[0m]";
const DEBUG_TEXT_ON_PLAIN: &str = "[DEBUG: Feature ON]";
const DEBUG_TEXT_OFF_PLAIN: &str = "[DEBUG: Feature OFF]";

/// Trailing line printed after every report
pub const SEPARATOR: &str = "-------";

/// Lines printed ahead of every batch on stdout
pub const BANNER: [&str; 5] = [
    "",
    "",
    "Welcome to our product catalog!",
    "Let's see what product sorting the visitors experience!",
    "",
];

/// What one visitor experienced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Experience {
    pub visitor_id: VisitorId,
    pub decision: Decision,
    /// Text shown to the visitor (variable value or off text)
    pub text: String,
}

impl Experience {
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.decision.enabled
    }

    fn debug_marker(&self, color: bool) -> &'static str {
        match (self.is_enabled(), color) {
            (true, true) => DEBUG_TEXT_ON,
            (false, true) => DEBUG_TEXT_OFF,
            (true, false) => DEBUG_TEXT_ON_PLAIN,
            (false, false) => DEBUG_TEXT_OFF_PLAIN,
        }
    }
}

/// Percentage of `count` in `total`, rounded half up
#[inline]
pub fn rounded_percentage(count: usize, total: usize) -> u64 {
    if total == 0 {
        return 0;
    }
    // floor(count / total * 100 + 0.5) in integer arithmetic
    (count as u64 * 200 + total as u64) / (2 * total as u64)
}

/// Counts derived from a sequence of experiences, in generation order
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateReport {
    experiences: Vec<Experience>,
    enrolled_count: usize,
    enabled_count: usize,
    /// Distinct texts with their counts, in first-seen order
    frequencies: Vec<(String, usize)>,
}

impl AggregateReport {
    pub fn from_experiences(experiences: Vec<Experience>) -> Self {
        let enrolled_count = experiences.iter().filter(|e| e.decision.enrolled).count();
        let enabled_count = experiences.iter().filter(|e| e.is_enabled()).count();

        let mut index: FxHashMap<&str, usize> = FxHashMap::default();
        let mut frequencies: Vec<(String, usize)> = Vec::new();
        for experience in &experiences {
            match index.get(experience.text.as_str()) {
                Some(&i) => frequencies[i].1 += 1,
                None => {
                    index.insert(experience.text.as_str(), frequencies.len());
                    frequencies.push((experience.text.clone(), 1));
                }
            }
        }

        Self { experiences, enrolled_count, enabled_count, frequencies }
    }

    pub fn total(&self) -> usize {
        self.experiences.len()
    }

    pub fn enrolled_count(&self) -> usize {
        self.enrolled_count
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled_count
    }

    pub fn experiences(&self) -> &[Experience] {
        &self.experiences
    }

    pub fn frequencies(&self) -> &[(String, usize)] {
        &self.frequencies
    }

    /// Debug markers are shown once at least one visitor has the feature on
    pub fn debug_mode(&self) -> bool {
        self.enabled_count > 0
    }

    /// Render the console report, one entry per line
    pub fn render(&self, color: bool) -> Vec<String> {
        let debug = self.debug_mode();
        let mut lines = Vec::with_capacity(self.experiences.len() + self.frequencies.len() + 3);

        for (index, experience) in self.experiences.iter().enumerate() {
            let line = if debug {
                format!(
                    "Visitor #{}: {} {}",
                    index,
                    experience.debug_marker(color),
                    experience.text
                )
            } else {
                format!("Visitor #{}: {}", index, experience.text)
            };
            lines.push(line);
        }

        lines.push(String::new());

        let total = self.total();
        for (text, count) in &self.frequencies {
            lines.push(format!(
                "{} visitors (~{}%) got the experience: '{}'",
                count,
                rounded_percentage(*count, total),
                text
            ));
        }

        lines.push(String::new());
        lines.push(SEPARATOR.to_string());
        lines
    }

    /// Full stdout output for one batch: banner followed by the report
    pub fn render_console(&self, color: bool) -> Vec<String> {
        BANNER.iter().map(|line| line.to_string()).chain(self.render(color)).collect()
    }
}
