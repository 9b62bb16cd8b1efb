//! Stance resolver — pure mapping from (condition, initial stance, cycle)
//! to the stance each agent slot must take.
//!
//! This is the only place the raw condition is branched on. The resolver
//! never emits `Neutral`: a neutral starting point resolves to oppose on the
//! dissenting side (via `Stance::opposite`) and to support on the agreeing
//! side, so downstream agents always have a determinate instruction.

use serde::{Deserialize, Serialize};

use crate::condition::{AgentSlot, Condition, CycleIndex, Stance};

/// Stance assignment for the three agent slots in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanceAssignment {
    pub agent1: Stance,
    pub agent2: Stance,
    pub agent3: Stance,
}

impl StanceAssignment {
    /// Stance for a given slot.
    pub fn for_slot(&self, slot: AgentSlot) -> Stance {
        match slot {
            AgentSlot::Agent1 => self.agent1,
            AgentSlot::Agent2 => self.agent2,
            AgentSlot::Agent3 => self.agent3,
        }
    }

    /// Iterate (slot, stance) pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentSlot, Stance)> + '_ {
        AgentSlot::all().iter().map(|s| (*s, self.for_slot(*s)))
    }
}

impl std::fmt::Display for StanceAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "1:{} 2:{} 3:{}",
            self.agent1, self.agent2, self.agent3
        )
    }
}

/// Resolve the per-slot stances for one cycle.
///
/// Rules:
/// - `Majority`: all three agents take the counter-stance every cycle.
/// - `Minority`: agents 1 and 2 agree with the participant; agent 3
///   dissents. Stable across all four cycles.
/// - `MinorityDiffusion`: cycles 1-2 behave like `Minority`; agent 1 joins
///   the dissent at cycle 3 and agent 2 at cycle 4. Flips are one-way: an
///   agent that has flipped stays flipped for the rest of the session.
pub fn resolve(condition: Condition, initial: Stance, cycle: CycleIndex) -> StanceAssignment {
    let dissent = initial.opposite();
    // Agreement side of a neutral start resolves to support, the complement
    // of the designated counter-stance. The resolver never emits neutral.
    let agree = if initial == Stance::Neutral {
        Stance::Support
    } else {
        initial
    };

    match condition {
        Condition::Majority => StanceAssignment {
            agent1: dissent,
            agent2: dissent,
            agent3: dissent,
        },
        Condition::Minority => StanceAssignment {
            agent1: agree,
            agent2: agree,
            agent3: dissent,
        },
        Condition::MinorityDiffusion => StanceAssignment {
            agent1: if cycle.get() >= 3 { dissent } else { agree },
            agent2: if cycle.get() >= 4 { dissent } else { agree },
            agent3: dissent,
        },
    }
}

/// Whether a slot changes sides in this cycle (relative to the previous one).
///
/// Only the diffusion condition ever flips: agent 1 at cycle 3, agent 2 at
/// cycle 4. The prompt builder uses this to instruct the agent to narrate
/// its change of mind.
pub fn flips_this_cycle(condition: Condition, slot: AgentSlot, cycle: CycleIndex) -> bool {
    condition == Condition::MinorityDiffusion
        && matches!(
            (slot, cycle.get()),
            (AgentSlot::Agent1, 3) | (AgentSlot::Agent2, 4)
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(n: u8) -> CycleIndex {
        CycleIndex::new(n).unwrap()
    }

    #[test]
    fn test_majority_contradicts_every_cycle() {
        for c in CycleIndex::all() {
            let a = resolve(Condition::Majority, Stance::Support, c);
            assert_eq!(a.agent1, Stance::Oppose);
            assert_eq!(a.agent2, Stance::Oppose);
            assert_eq!(a.agent3, Stance::Oppose);

            let a = resolve(Condition::Majority, Stance::Oppose, c);
            assert_eq!(a.agent1, Stance::Support);
            assert_eq!(a.agent2, Stance::Support);
            assert_eq!(a.agent3, Stance::Support);
        }
    }

    #[test]
    fn test_minority_is_stable() {
        for c in CycleIndex::all() {
            let a = resolve(Condition::Minority, Stance::Support, c);
            assert_eq!(a.agent1, Stance::Support);
            assert_eq!(a.agent2, Stance::Support);
            assert_eq!(a.agent3, Stance::Oppose);
        }
    }

    #[test]
    fn test_diffusion_spreads_the_dissent() {
        // Cycles 1-2 match the minority pattern
        for n in [1, 2] {
            let a = resolve(Condition::MinorityDiffusion, Stance::Support, cycle(n));
            assert_eq!(
                a,
                StanceAssignment {
                    agent1: Stance::Support,
                    agent2: Stance::Support,
                    agent3: Stance::Oppose,
                }
            );
        }
        // Cycle 3: agent 1 flips
        let a = resolve(Condition::MinorityDiffusion, Stance::Support, cycle(3));
        assert_eq!(
            a,
            StanceAssignment {
                agent1: Stance::Oppose,
                agent2: Stance::Support,
                agent3: Stance::Oppose,
            }
        );
        // Cycle 4: agent 2 flips as well
        let a = resolve(Condition::MinorityDiffusion, Stance::Support, cycle(4));
        assert_eq!(
            a,
            StanceAssignment {
                agent1: Stance::Oppose,
                agent2: Stance::Oppose,
                agent3: Stance::Oppose,
            }
        );
    }

    #[test]
    fn test_diffusion_flips_are_monotonic() {
        // Once a slot has joined the dissent it never reverts
        for initial in [Stance::Support, Stance::Oppose] {
            let dissent = initial.opposite();
            for slot in AgentSlot::all() {
                let mut flipped = false;
                for c in CycleIndex::all() {
                    let stance =
                        resolve(Condition::MinorityDiffusion, initial, c).for_slot(*slot);
                    if flipped {
                        assert_eq!(stance, dissent, "slot {slot} reverted at cycle {c}");
                    }
                    flipped = flipped || stance == dissent;
                }
            }
        }
    }

    #[test]
    fn test_resolver_never_emits_neutral() {
        for condition in Condition::all() {
            for initial in [Stance::Support, Stance::Oppose, Stance::Neutral] {
                for c in CycleIndex::all() {
                    let a = resolve(*condition, initial, c);
                    for (_, stance) in a.iter() {
                        assert_ne!(stance, Stance::Neutral);
                    }
                }
            }
        }
    }

    #[test]
    fn test_neutral_start_coerces_to_oppose_dissent() {
        // A neutral T0 gets oppose as the counter-stance and support as the
        // agreeing stance in the minority patterns
        let a = resolve(Condition::Majority, Stance::Neutral, cycle(1));
        assert_eq!(a.agent1, Stance::Oppose);

        let a = resolve(Condition::Minority, Stance::Neutral, cycle(1));
        assert_eq!(a.agent1, Stance::Support);
        assert_eq!(a.agent3, Stance::Oppose);
    }

    #[test]
    fn test_worked_examples() {
        assert_eq!(
            resolve(Condition::MinorityDiffusion, Stance::Support, cycle(1)),
            StanceAssignment {
                agent1: Stance::Support,
                agent2: Stance::Support,
                agent3: Stance::Oppose,
            }
        );
        assert_eq!(
            resolve(Condition::MinorityDiffusion, Stance::Support, cycle(3)),
            StanceAssignment {
                agent1: Stance::Oppose,
                agent2: Stance::Support,
                agent3: Stance::Oppose,
            }
        );
        assert_eq!(
            resolve(Condition::MinorityDiffusion, Stance::Support, cycle(4)),
            StanceAssignment {
                agent1: Stance::Oppose,
                agent2: Stance::Oppose,
                agent3: Stance::Oppose,
            }
        );
        assert_eq!(
            resolve(Condition::Majority, Stance::Oppose, cycle(2)),
            StanceAssignment {
                agent1: Stance::Support,
                agent2: Stance::Support,
                agent3: Stance::Support,
            }
        );
    }

    #[test]
    fn test_flip_cycles() {
        assert!(flips_this_cycle(
            Condition::MinorityDiffusion,
            AgentSlot::Agent1,
            cycle(3)
        ));
        assert!(flips_this_cycle(
            Condition::MinorityDiffusion,
            AgentSlot::Agent2,
            cycle(4)
        ));
        assert!(!flips_this_cycle(
            Condition::MinorityDiffusion,
            AgentSlot::Agent1,
            cycle(4)
        ));
        assert!(!flips_this_cycle(
            Condition::MinorityDiffusion,
            AgentSlot::Agent3,
            cycle(3)
        ));
        for slot in AgentSlot::all() {
            for c in CycleIndex::all() {
                assert!(!flips_this_cycle(Condition::Majority, *slot, c));
                assert!(!flips_this_cycle(Condition::Minority, *slot, c));
            }
        }
    }
}
