//! Fixed personas for the three simulated agents.
//!
//! Each slot carries its own expertise background, creativity parameter and
//! displayed consistency probability. These are properties of the agent
//! identity, not of any individual request.

use serde::Serialize;

use crate::condition::AgentSlot;

/// Persona of one simulated agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentProfile {
    /// Slot this profile belongs to.
    pub slot: AgentSlot,
    /// Display name used in the chat and in prompt text.
    pub name: &'static str,
    /// One-line expertise/perspective persona.
    pub background: &'static str,
    /// Sampling temperature for this agent's generation calls.
    pub temperature: f32,
    /// Displayed probability with which the agent is told to hold its
    /// assigned stance. A description in the prompt, not a stochastic gate.
    pub consistency: f32,
}

const PROFILES: [AgentProfile; 3] = [
    AgentProfile {
        slot: AgentSlot::Agent1,
        name: "Dana",
        background: "a public-policy researcher who follows the topic professionally",
        temperature: 0.6,
        consistency: 0.82,
    },
    AgentProfile {
        slot: AgentSlot::Agent2,
        name: "Robin",
        background: "a community worker who sees the practical side of the issue every day",
        temperature: 0.75,
        consistency: 0.86,
    },
    AgentProfile {
        slot: AgentSlot::Agent3,
        name: "Sasha",
        background: "an economics postgraduate with a sceptical, analytical bent",
        temperature: 0.9,
        consistency: 0.93,
    },
];

impl AgentProfile {
    /// The fixed profile for a slot.
    pub fn for_slot(slot: AgentSlot) -> &'static AgentProfile {
        match slot {
            AgentSlot::Agent1 => &PROFILES[0],
            AgentSlot::Agent2 => &PROFILES[1],
            AgentSlot::Agent3 => &PROFILES[2],
        }
    }

    /// All three profiles in slot order.
    pub fn all() -> &'static [AgentProfile; 3] {
        &PROFILES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_cover_all_slots() {
        for slot in AgentSlot::all() {
            assert_eq!(AgentProfile::for_slot(*slot).slot, *slot);
        }
    }

    #[test]
    fn test_temperatures_are_distinct_per_slot() {
        let temps: Vec<f32> = AgentProfile::all().iter().map(|p| p.temperature).collect();
        assert!(temps[0] != temps[1] && temps[1] != temps[2] && temps[0] != temps[2]);
    }

    #[test]
    fn test_consistency_is_a_probability() {
        for profile in AgentProfile::all() {
            assert!(profile.consistency > 0.0 && profile.consistency <= 1.0);
        }
    }
}
