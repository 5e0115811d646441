//! Keyword-based question classification.
//!
//! Questions are mapped to exactly one context category by testing the rule
//! table top-down; the first matching pattern wins. Unmatched questions fall
//! into [`Intent::All`], which includes every fetched context source in the
//! prompt. Patterns carry both the Japanese keywords of the deployed
//! frontend and English equivalents.

use once_cell::sync::Lazy;
use regex::Regex;

/// Context category a question resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Occupancy right now
    Current,
    /// Anomalous after-hours presence
    Suspicious,
    /// Daily entry and exit times
    EntryExit,
    /// Busiest / quietest extremes
    Extremes,
    /// Forecast occupancy
    Prediction,
    /// No keyword match; include everything
    All,
}

/// Ordered rule table. Order is the priority order; do not sort.
static RULES: Lazy<Vec<(Regex, Intent)>> = Lazy::new(|| {
    [
        (r"現在|今|current|right now", Intent::Current),
        (r"不審|suspicious", Intent::Suspicious),
        (r"入り|帰り|entry|exit|arrival|leave", Intent::EntryExit),
        (
            r"最大|最小|多い|少ない|max|min|most|fewest|busiest|quietest",
            Intent::Extremes,
        ),
        (r"予測|予想|prediction|forecast", Intent::Prediction),
    ]
    .into_iter()
    .map(|(pattern, intent)| {
        (
            Regex::new(&format!("(?i){pattern}")).expect("invalid intent pattern"),
            intent,
        )
    })
    .collect()
});

/// Classify a question into exactly one [`Intent`].
pub fn classify(question: &str) -> Intent {
    for (pattern, intent) in RULES.iter() {
        if pattern.is_match(question) {
            return *intent;
        }
    }
    Intent::All
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_each_category() {
        assert_eq!(classify("今何人いますか"), Intent::Current);
        assert_eq!(classify("不審者はいましたか"), Intent::Suspicious);
        assert_eq!(classify("何時に帰りましたか"), Intent::EntryExit);
        assert_eq!(classify("一番多い時間は"), Intent::Extremes);
        assert_eq!(classify("明日の予測は"), Intent::Prediction);
    }

    #[test]
    fn english_keywords_match() {
        assert_eq!(classify("Was there suspicious activity?"), Intent::Suspicious);
        assert_eq!(classify("What is the forecast for tomorrow?"), Intent::Prediction);
        assert_eq!(classify("When was it busiest?"), Intent::Extremes);
    }

    #[test]
    fn first_match_wins_over_later_rules() {
        // Both a suspicious and a prediction keyword: suspicious is higher
        // priority, so it must win.
        assert_eq!(
            classify("Any suspicious activity in the prediction data?"),
            Intent::Suspicious
        );
        assert_eq!(classify("今の予測は"), Intent::Current);
    }

    #[test]
    fn unmatched_falls_back_to_all() {
        assert_eq!(classify("tell me about the building"), Intent::All);
    }

    #[test]
    fn classification_is_deterministic() {
        let question = "予測と不審者について";
        let first = classify(question);
        for _ in 0..10 {
            assert_eq!(classify(question), first);
        }
    }
}
