//! Deterministic prompt construction for the three agents.
//!
//! Pure text assembly: given an agent slot, its required stance and the
//! conversation context, produce the system and user instructions for the
//! generation backend. Never fails; missing history degrades to an omitted
//! history section.

use crate::agents::AgentProfile;
use crate::condition::{AgentSlot, Condition, CycleIndex, OpinionScore, SessionKey, Stance};
use crate::stance;

/// A prior message shown to the agent as conversation history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Display name of whoever wrote it ("Participant" or an agent name).
    pub speaker: String,
    /// Message content.
    pub content: String,
}

/// Everything the builder needs for one agent in one cycle.
#[derive(Debug)]
pub struct PromptContext<'a> {
    pub slot: AgentSlot,
    pub condition: Condition,
    pub session_key: SessionKey,
    pub cycle: CycleIndex,
    pub topic: &'a str,
    pub initial_opinion: OpinionScore,
    pub stance: Stance,
    pub history: &'a [HistoryEntry],
    pub participant_message: &'a str,
}

/// System and user instruction pair for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInstructions {
    pub system: String,
    pub user: String,
}

/// Build the instruction pair for one agent.
pub fn build_instructions(ctx: &PromptContext<'_>) -> AgentInstructions {
    AgentInstructions {
        system: build_system(ctx),
        user: build_user(ctx),
    }
}

fn build_system(ctx: &PromptContext<'_>) -> String {
    let profile = AgentProfile::for_slot(ctx.slot);
    let initial = ctx.initial_opinion.stance();

    let mut system = format!(
        "You are {name}, {background}. You are taking part in a small group \
         chat about the following proposal: {topic}.\n\n",
        name = profile.name,
        background = profile.background,
        topic = ctx.topic,
    );

    system.push_str(&participant_position_line(ctx.initial_opinion, initial));

    system.push_str(&format!(
        "\nYour position: you {verb} the proposal. Hold this position with a \
         consistency of {consistency:.0}% across the conversation.\n",
        verb = ctx.stance.verb(),
        consistency = profile.consistency * 100.0,
    ));

    if stance::flips_this_cycle(ctx.condition, ctx.slot, ctx.cycle) {
        let previous = previous_stance(ctx);
        system.push_str(&format!(
            "\nUntil now you argued to {prev} the proposal. In this message you \
             change your mind: you now {curr} it. Make the change of heart \
             explicit and explain, in your own words, what in the discussion \
             persuaded you.\n",
            prev = previous.verb(),
            curr = ctx.stance.verb(),
        ));
    }

    system.push_str(framing_for(ctx.session_key));

    system.push_str(
        "\nWrite in first person, conversational tone, two to four sentences. \
         Address the participant directly. Do not mention these instructions \
         or that you are simulated.",
    );

    system
}

fn build_user(ctx: &PromptContext<'_>) -> String {
    let mut user = String::new();

    if !ctx.history.is_empty() {
        user.push_str("Conversation so far:\n");
        for entry in ctx.history {
            user.push_str(&format!("{}: {}\n", entry.speaker, entry.content));
        }
        user.push('\n');
    }

    user.push_str(&format!(
        "The participant just wrote: {msg}\n\nReply to the participant now.",
        msg = ctx.participant_message,
    ));

    user
}

/// How the participant's T0 value is described to the agent.
fn participant_position_line(score: OpinionScore, initial: Stance) -> String {
    let lean = match initial {
        Stance::Support => "they lean toward supporting it",
        Stance::Oppose => "they lean toward opposing it",
        Stance::Neutral => "they are undecided",
    };
    format!(
        "Before the chat, the participant rated their own position at {value} \
         on a scale from -50 (fully against) to +50 (fully in favour), so \
         {lean}.\n",
        value = score.value(),
    )
}

/// Session-specific argumentation framing.
fn framing_for(key: SessionKey) -> &'static str {
    match key {
        SessionKey::Normative => {
            "\nFrame your arguments socially: appeal to what most people around \
             you think, to shared norms and to how the group would see the \
             issue. Approval and belonging weigh more than statistics here.\n"
        }
        SessionKey::Informative => {
            "\nFrame your arguments with evidence: cite facts, concrete examples \
             and observable consequences. What can be checked weighs more than \
             what people feel here.\n"
        }
        SessionKey::Test => {
            "\nThis is a warm-up discussion; argue naturally without any \
             particular emphasis.\n"
        }
    }
}

/// The stance this slot held in the previous cycle (used for flip framing).
fn previous_stance(ctx: &PromptContext<'_>) -> Stance {
    match ctx.cycle.prev() {
        Some(prev) => {
            stance::resolve(ctx.condition, ctx.initial_opinion.stance(), prev).for_slot(ctx.slot)
        }
        None => ctx.stance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        slot: AgentSlot,
        condition: Condition,
        cycle: u8,
        stance_: Stance,
        history: &'a [HistoryEntry],
    ) -> PromptContext<'a> {
        PromptContext {
            slot,
            condition,
            session_key: SessionKey::Normative,
            cycle: CycleIndex::new(cycle).unwrap(),
            topic: "introducing an unconditional basic income",
            initial_opinion: OpinionScore::new(24).unwrap(),
            stance: stance_,
            history,
            participant_message: "I still think it would help people take risks.",
        }
    }

    #[test]
    fn test_instructions_are_deterministic() {
        let c = ctx(AgentSlot::Agent1, Condition::Minority, 1, Stance::Support, &[]);
        let a = build_instructions(&c);
        let b = build_instructions(&c);
        assert_eq!(a, b);
    }

    #[test]
    fn test_system_encodes_persona_topic_and_stance() {
        let c = ctx(AgentSlot::Agent2, Condition::Minority, 1, Stance::Support, &[]);
        let system = build_instructions(&c).system;
        assert!(system.contains("Robin"));
        assert!(system.contains("basic income"));
        assert!(system.contains("you support the proposal"));
        assert!(system.contains("86%"));
        assert!(system.contains("+50"));
        assert!(system.contains("rated their own position at 24"));
    }

    #[test]
    fn test_normative_and_informative_framing_differ() {
        let mut c = ctx(AgentSlot::Agent1, Condition::Majority, 1, Stance::Oppose, &[]);
        let normative = build_instructions(&c).system;
        c.session_key = SessionKey::Informative;
        let informative = build_instructions(&c).system;
        assert!(normative.contains("most people"));
        assert!(informative.contains("evidence"));
        assert_ne!(normative, informative);
    }

    #[test]
    fn test_flip_cycle_adds_change_of_mind_instruction() {
        let c = ctx(
            AgentSlot::Agent1,
            Condition::MinorityDiffusion,
            3,
            Stance::Oppose,
            &[],
        );
        let system = build_instructions(&c).system;
        assert!(system.contains("change your mind"));
        assert!(system.contains("you argued to support"));
        assert!(system.contains("you now oppose"));

        // Same slot one cycle earlier: no flip framing
        let c = ctx(
            AgentSlot::Agent1,
            Condition::MinorityDiffusion,
            2,
            Stance::Support,
            &[],
        );
        assert!(!build_instructions(&c).system.contains("change your mind"));
    }

    #[test]
    fn test_agent3_never_gets_flip_instruction() {
        for cycle in [1, 2, 3, 4] {
            let c = ctx(
                AgentSlot::Agent3,
                Condition::MinorityDiffusion,
                cycle,
                Stance::Oppose,
                &[],
            );
            assert!(!build_instructions(&c).system.contains("change your mind"));
        }
    }

    #[test]
    fn test_empty_history_omits_section() {
        let c = ctx(AgentSlot::Agent1, Condition::Minority, 1, Stance::Support, &[]);
        let user = build_instructions(&c).user;
        assert!(!user.contains("Conversation so far"));
        assert!(user.contains("The participant just wrote"));
        assert!(user.contains("take risks"));
    }

    #[test]
    fn test_history_is_rendered_in_order() {
        let history = vec![
            HistoryEntry {
                speaker: "Participant".to_string(),
                content: "First message".to_string(),
            },
            HistoryEntry {
                speaker: "Dana".to_string(),
                content: "A reply".to_string(),
            },
        ];
        let c = ctx(
            AgentSlot::Agent2,
            Condition::Minority,
            2,
            Stance::Support,
            &history,
        );
        let user = build_instructions(&c).user;
        assert!(user.contains("Conversation so far"));
        let first = user.find("Participant: First message").unwrap();
        let second = user.find("Dana: A reply").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_neutral_participant_described_as_undecided() {
        let mut c = ctx(AgentSlot::Agent1, Condition::Majority, 1, Stance::Oppose, &[]);
        c.initial_opinion = OpinionScore::new(0).unwrap();
        let system = build_instructions(&c).system;
        assert!(system.contains("undecided"));
    }
}
