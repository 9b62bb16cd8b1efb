//! Canned responses substituted when live generation fails or times out.
//!
//! Total over the three stances; the paragraphs are topic-neutral so they
//! read naturally in any session.

use crate::condition::Stance;

const FALLBACK_SUPPORT: &str = "I keep coming back to the practical upside here. \
Even if it isn't perfect, the benefits for the people affected seem real to me, \
and most of the objections I've heard feel like problems we could work around. \
So overall I'm still in favour of it.";

const FALLBACK_OPPOSE: &str = "Honestly, the more I think about it the less \
convinced I am. The costs and the side effects look bigger than the promised \
gains, and once something like this is in place it's very hard to roll back. \
I'd rather we didn't go down that road.";

const FALLBACK_NEUTRAL: &str = "I can see merit on both sides of this one. \
Some of the arguments in favour are genuinely strong, but so are some of the \
concerns, and I don't think the evidence settles it either way. For now I'm \
staying on the fence.";

/// Pre-authored response for a stance. Total function, no failure mode.
pub fn fallback_for(stance: Stance) -> &'static str {
    match stance {
        Stance::Support => FALLBACK_SUPPORT,
        Stance::Oppose => FALLBACK_OPPOSE,
        Stance::Neutral => FALLBACK_NEUTRAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_over_stances() {
        for stance in [Stance::Support, Stance::Oppose, Stance::Neutral] {
            assert!(!fallback_for(stance).is_empty());
        }
    }

    #[test]
    fn test_fallbacks_are_distinct() {
        assert_ne!(fallback_for(Stance::Support), fallback_for(Stance::Oppose));
        assert_ne!(fallback_for(Stance::Support), fallback_for(Stance::Neutral));
        assert_ne!(fallback_for(Stance::Oppose), fallback_for(Stance::Neutral));
    }
}
