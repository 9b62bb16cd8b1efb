//! Turn orchestrator — runs one conversational cycle end to end.
//!
//! One `run_cycle` call replays an already-generated cycle verbatim, or:
//! validates sequencing, resolves the three stances, builds the prompts,
//! fans the generation calls out concurrently, substitutes fallbacks for
//! failed branches, persists the turn best-effort and returns the merged
//! result. Generation failures never surface to the caller; only
//! sequencing and rate-limit violations do.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agents::AgentProfile;
use crate::condition::{AgentSlot, CycleIndex, MessageRole, SessionKey, Stance};
use crate::fallback::fallback_for;
use crate::gateway::{GenerationGateway, GenerationOutcome};
use crate::prompt::{self, AgentInstructions, HistoryEntry, PromptContext};
use crate::rate_limit::{CycleRateLimiter, RateLimitError};
use crate::stance;
use crate::stance::StanceAssignment;
use crate::store::{MessageRecord, Participant, SessionRecord, StoreError, StudyStore};

use super::state::{SequenceError, SessionPhase};

/// Error type for cycle execution.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// One agent's contribution to a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub content: String,
    pub latency_ms: u64,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub fallback_used: bool,
}

/// Cycle-level metadata returned alongside the three replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleMeta {
    pub participant_id: String,
    pub session_key: SessionKey,
    pub cycle: CycleIndex,
    pub stances: StanceAssignment,
    pub latencies_ms: [u64; 3],
    /// True when the result was served from the store without generation.
    pub replayed: bool,
}

/// Structured result of one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub agent1: AgentReply,
    pub agent2: AgentReply,
    pub agent3: AgentReply,
    pub meta: CycleMeta,
}

impl CycleOutcome {
    /// Reply for a given slot.
    pub fn reply_for(&self, slot: AgentSlot) -> &AgentReply {
        match slot {
            AgentSlot::Agent1 => &self.agent1,
            AgentSlot::Agent2 => &self.agent2,
            AgentSlot::Agent3 => &self.agent3,
        }
    }
}

/// Coordinates stance resolution, prompt construction, parallel generation,
/// fallback substitution and persistence for one cycle at a time.
pub struct TurnOrchestrator {
    store: Arc<StudyStore>,
    gateway: GenerationGateway,
    limiter: CycleRateLimiter,
}

impl TurnOrchestrator {
    pub fn new(store: Arc<StudyStore>, gateway: GenerationGateway, limiter: CycleRateLimiter) -> Self {
        Self {
            store,
            gateway,
            limiter,
        }
    }

    /// Run one conversational cycle.
    ///
    /// At-most-once generation per (participant, session, cycle): if the
    /// cycle's three agent messages already exist, they are returned
    /// verbatim and the backend is not contacted. Otherwise the cycle must
    /// be the next one in sequence (and cycle 1 requires T0).
    pub async fn run_cycle(
        &self,
        participant_id: &str,
        session_key: SessionKey,
        cycle: CycleIndex,
        user_message: &str,
    ) -> Result<CycleOutcome, CycleError> {
        let participant = self
            .store
            .get_participant(participant_id)?
            .ok_or_else(|| CycleError::UnknownParticipant(participant_id.to_string()))?;
        let session = self.store.get_or_create_session(&participant, session_key)?;

        // Idempotent replay before any guard: a client retry of a finished
        // cycle must succeed even though the phase has moved on.
        if let Some(outcome) = self.try_replay(&participant, &session, cycle)? {
            info!(
                participant_id,
                session = %session_key,
                cycle = %cycle,
                "cycle replayed from store"
            );
            return Ok(outcome);
        }

        // Sequencing guard: prior cycle's response must be recorded.
        let last = self.store.last_response_index(participant_id, session_key)?;
        let phase = SessionPhase::derive(session.initial_opinion, last);
        phase.validate(cycle)?;
        let t0 = session.initial_opinion.ok_or(SequenceError::OpinionMissing)?;

        self.limiter.check(participant_id, session_key)?;

        let stances = stance::resolve(participant.condition, t0.stance(), cycle);
        let history = self.history_before(participant_id, session_key, cycle)?;

        let build = |slot: AgentSlot| -> AgentInstructions {
            prompt::build_instructions(&PromptContext {
                slot,
                condition: participant.condition,
                session_key,
                cycle,
                topic: &session.topic,
                initial_opinion: t0,
                stance: stances.for_slot(slot),
                history: &history,
                participant_message: user_message,
            })
        };
        let instructions1 = build(AgentSlot::Agent1);
        let instructions2 = build(AgentSlot::Agent2);
        let instructions3 = build(AgentSlot::Agent3);

        // All three generation calls run concurrently and are joined after
        // every branch settles; one agent's timeout or failure leaves the
        // other two untouched.
        let (outcome1, outcome2, outcome3) = tokio::join!(
            self.gateway.generate(AgentSlot::Agent1, &instructions1),
            self.gateway.generate(AgentSlot::Agent2, &instructions2),
            self.gateway.generate(AgentSlot::Agent3, &instructions3),
        );

        let agent1 = merge(outcome1, stances.agent1);
        let agent2 = merge(outcome2, stances.agent2);
        let agent3 = merge(outcome3, stances.agent3);

        let outcome = CycleOutcome {
            meta: CycleMeta {
                participant_id: participant_id.to_string(),
                session_key,
                cycle,
                stances,
                latencies_ms: [agent1.latency_ms, agent2.latency_ms, agent3.latency_ms],
                replayed: false,
            },
            agent1,
            agent2,
            agent3,
        };

        // Best-effort persistence: the in-memory result is authoritative for
        // the response. A crash between here and the writes loses message
        // rows for this cycle, never the reply the participant sees.
        self.persist(&participant, session_key, cycle, user_message, &outcome);

        Ok(outcome)
    }

    /// Reconstruct a finished cycle from the store, if all three agent
    /// messages exist.
    fn try_replay(
        &self,
        participant: &Participant,
        session: &SessionRecord,
        cycle: CycleIndex,
    ) -> Result<Option<CycleOutcome>, CycleError> {
        let existing =
            self.store
                .messages_for_cycle(&participant.id, session.session_key, cycle)?;
        if existing.is_empty() {
            return Ok(None);
        }

        let mut replies: [Option<AgentReply>; 3] = [None, None, None];
        for message in &existing {
            if let Some(slot) = message.role.agent_slot() {
                replies[(slot.number() - 1) as usize] = Some(AgentReply {
                    content: message.content.clone(),
                    latency_ms: message.latency_ms,
                    tokens_in: message.tokens_in,
                    tokens_out: message.tokens_out,
                    fallback_used: message.fallback_used,
                });
            }
        }
        let [Some(agent1), Some(agent2), Some(agent3)] = replies else {
            // Partial persist from an earlier crash: re-run the cycle; the
            // INSERT OR IGNORE writes keep the first-written rows.
            return Ok(None);
        };
        let Some(t0) = session.initial_opinion else {
            return Ok(None);
        };

        let stances = stance::resolve(participant.condition, t0.stance(), cycle);
        Ok(Some(CycleOutcome {
            meta: CycleMeta {
                participant_id: participant.id.clone(),
                session_key: session.session_key,
                cycle,
                stances,
                latencies_ms: [agent1.latency_ms, agent2.latency_ms, agent3.latency_ms],
                replayed: true,
            },
            agent1,
            agent2,
            agent3,
        }))
    }

    fn history_before(
        &self,
        participant_id: &str,
        session_key: SessionKey,
        cycle: CycleIndex,
    ) -> Result<Vec<HistoryEntry>, CycleError> {
        let rows = self.store.prior_messages(participant_id, session_key, cycle)?;
        Ok(rows
            .into_iter()
            .map(|message| HistoryEntry {
                speaker: match message.role.agent_slot() {
                    Some(slot) => AgentProfile::for_slot(slot).name.to_string(),
                    None => "Participant".to_string(),
                },
                content: message.content,
            })
            .collect())
    }

    fn persist(
        &self,
        participant: &Participant,
        session_key: SessionKey,
        cycle: CycleIndex,
        user_message: &str,
        outcome: &CycleOutcome,
    ) {
        if let Err(err) =
            self.store
                .upsert_turn(&participant.id, session_key, cycle, user_message)
        {
            warn!(cycle = %cycle, error = %err, "turn write failed");
        }

        let user_row = MessageRecord {
            participant_id: participant.id.clone(),
            session_key,
            cycle,
            role: MessageRole::User,
            content: user_message.to_string(),
            latency_ms: 0,
            tokens_in: None,
            tokens_out: None,
            fallback_used: false,
        };
        if let Err(err) = self.store.insert_message(&user_row) {
            warn!(cycle = %cycle, error = %err, "user message write failed");
        }

        for slot in AgentSlot::all() {
            let reply = outcome.reply_for(*slot);
            let row = MessageRecord {
                participant_id: participant.id.clone(),
                session_key,
                cycle,
                role: slot.role(),
                content: reply.content.clone(),
                latency_ms: reply.latency_ms,
                tokens_in: reply.tokens_in,
                tokens_out: reply.tokens_out,
                fallback_used: reply.fallback_used,
            };
            if let Err(err) = self.store.insert_message(&row) {
                warn!(slot = %slot, cycle = %cycle, error = %err, "agent message write failed");
            }
        }

        if let Err(err) = self.store.record_cycle(&participant.id, session_key, cycle) {
            warn!(cycle = %cycle, error = %err, "cycle counter write failed");
        }

        if cycle == CycleIndex::LAST {
            if let Err(err) = self.store.complete_session(&participant.id, session_key) {
                warn!(error = %err, "session completion write failed");
            }
        }
    }
}

/// Convert one settled generation branch into a displayable reply,
/// substituting the canned response when the branch failed or timed out.
fn merge(outcome: GenerationOutcome, stance: Stance) -> AgentReply {
    if outcome.needs_fallback() {
        AgentReply {
            content: fallback_for(stance).to_string(),
            latency_ms: outcome.latency_ms,
            tokens_in: None,
            tokens_out: None,
            fallback_used: true,
        }
    } else {
        AgentReply {
            content: outcome.text,
            latency_ms: outcome.latency_ms,
            tokens_in: outcome.tokens_in,
            tokens_out: outcome.tokens_out,
            fallback_used: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(text: &str, timed_out: bool) -> GenerationOutcome {
        GenerationOutcome {
            text: text.to_string(),
            tokens_in: Some(200),
            tokens_out: Some(40),
            latency_ms: 950,
            timed_out,
        }
    }

    #[test]
    fn test_merge_keeps_generated_text() {
        let reply = merge(generated("a real answer", false), Stance::Support);
        assert_eq!(reply.content, "a real answer");
        assert!(!reply.fallback_used);
        assert_eq!(reply.tokens_out, Some(40));
    }

    #[test]
    fn test_merge_substitutes_fallback_on_timeout() {
        let reply = merge(generated("", true), Stance::Oppose);
        assert_eq!(reply.content, fallback_for(Stance::Oppose));
        assert!(reply.fallback_used);
        assert_eq!(reply.tokens_in, None);
    }

    #[test]
    fn test_merge_substitutes_fallback_on_empty_text() {
        let reply = merge(generated("", false), Stance::Support);
        assert_eq!(reply.content, fallback_for(Stance::Support));
        assert!(reply.fallback_used);
    }
}
