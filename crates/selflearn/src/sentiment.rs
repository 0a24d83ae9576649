//! Heuristic sentiment classification for a user's reply to the bot,
//! following the same keyword-list approach used elsewhere for content
//! valence, but producing one of the five outcome labels plus a value from
//! a fixed confidence table rather than a continuous score alone.

const PRAISE_PHRASES: &[&str] = &[
    "thank you", "thanks", "perfect", "exactly right", "well done", "amazing",
    "you're the best", "love this", "so helpful", "dyakuyu", "дякую", "молодець",
    "супер", "чудово", "ідеально",
];

const POSITIVE_WORDS: &[&str] = &[
    "good", "nice", "works", "helpful", "yes", "great", "cool", "correct",
    "ok", "okay", "добре", "гарно", "працює", "так", "норм",
];

const NEGATIVE_WORDS: &[&str] = &[
    "wrong", "bad", "useless", "broken", "doesn't work", "not working",
    "stupid", "annoying", "awful", "погано", "не працює", "дурня", "зламано",
];

const CORRECTION_MARKERS: &[&str] = &[
    "no, i meant", "i said", "that's not what i asked", "actually,",
    "correction:", "i meant", "not that", "no that's wrong",
    "я мав на увазі", "не це", "я сказав", "не те",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    Praised,
    Positive,
    Neutral,
    Negative,
    Corrected,
}

impl ReactionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionOutcome::Praised => "praised",
            ReactionOutcome::Positive => "positive",
            ReactionOutcome::Neutral => "neutral",
            ReactionOutcome::Negative => "negative",
            ReactionOutcome::Corrected => "corrected",
        }
    }

    /// Fixed confidence table: how sure the heuristic is in the label it
    /// assigned, not how positive/negative the interaction was.
    pub fn confidence(&self) -> f64 {
        match self {
            ReactionOutcome::Praised => 0.9,
            ReactionOutcome::Positive => 0.7,
            ReactionOutcome::Neutral => 0.5,
            ReactionOutcome::Negative => 0.7,
            ReactionOutcome::Corrected => 0.85,
        }
    }

    pub fn sentiment_score(&self) -> f64 {
        match self {
            ReactionOutcome::Praised => 1.0,
            ReactionOutcome::Positive => 0.5,
            ReactionOutcome::Neutral => 0.0,
            ReactionOutcome::Negative => -0.5,
            ReactionOutcome::Corrected => -0.7,
        }
    }

    /// Weight used by the effectiveness mix over a recent window.
    pub fn effectiveness_weight(&self) -> f64 {
        match self {
            ReactionOutcome::Praised => 1.0,
            ReactionOutcome::Positive => 0.8,
            ReactionOutcome::Neutral => 0.5,
            ReactionOutcome::Negative => 0.2,
            ReactionOutcome::Corrected => 0.1,
        }
    }
}

/// Classifies a reply directed at the bot. Correction markers take
/// precedence over plain negative wording since a correction is a more
/// specific and actionable signal than general negativity.
pub fn classify_reaction(text: &str) -> ReactionOutcome {
    let lower = text.to_lowercase();

    if CORRECTION_MARKERS.iter().any(|m| lower.contains(m)) {
        return ReactionOutcome::Corrected;
    }
    if PRAISE_PHRASES.iter().any(|p| lower.contains(p)) {
        return ReactionOutcome::Praised;
    }
    if NEGATIVE_WORDS.iter().any(|w| lower.contains(w)) {
        return ReactionOutcome::Negative;
    }
    if POSITIVE_WORDS.iter().any(|w| lower.contains(w)) {
        return ReactionOutcome::Positive;
    }
    ReactionOutcome::Neutral
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thanks_is_praised() {
        assert_eq!(classify_reaction("thank you so much!"), ReactionOutcome::Praised);
    }

    #[test]
    fn correction_beats_negative_wording() {
        let outcome = classify_reaction("no, i meant the other one, this is wrong");
        assert_eq!(outcome, ReactionOutcome::Corrected);
    }

    #[test]
    fn plain_negative_is_negative() {
        assert_eq!(classify_reaction("that's broken"), ReactionOutcome::Negative);
    }

    #[test]
    fn plain_positive_is_positive() {
        assert_eq!(classify_reaction("yes, works great"), ReactionOutcome::Positive);
    }

    #[test]
    fn unrelated_text_is_neutral() {
        assert_eq!(classify_reaction("what time is it in tokyo"), ReactionOutcome::Neutral);
    }

    #[test]
    fn ukrainian_praise_is_recognized() {
        assert_eq!(classify_reaction("дякую, супер!"), ReactionOutcome::Praised);
    }
}
