//! Core enumerations for the experiment domain
//!
//! These types cross every component boundary: the experimental condition a
//! participant is assigned to, the scoped conversational sessions, the
//! rhetorical stances, and the bounded cycle index. Conditions are matched
//! exhaustively only inside the stance resolver; everything downstream
//! consumes resolved stances.

use serde::{Deserialize, Serialize};

/// Error type for parsing and validating domain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("unknown condition: {0}")]
    UnknownCondition(String),

    #[error("unknown session key: {0}")]
    UnknownSessionKey(String),

    #[error("unknown task order: {0}")]
    UnknownTaskOrder(String),

    #[error("unknown message role: {0}")]
    UnknownMessageRole(String),

    #[error("cycle index {0} out of range (valid: 1..=4)")]
    CycleOutOfRange(u8),

    #[error("opinion score {0} out of range (valid: -50..=50)")]
    OpinionOutOfRange(i32),
}

/// Experimental-group assignment controlling which stance pattern is used.
///
/// Fixed for the lifetime of a participant; never reassigned mid-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// All three agents contradict the participant in every cycle.
    Majority,
    /// Agents 1 and 2 agree with the participant; agent 3 dissents throughout.
    Minority,
    /// Starts like `Minority`; the dissenting stance spreads to agent 1 at
    /// cycle 3 and to agent 2 at cycle 4.
    MinorityDiffusion,
}

impl Condition {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Majority => "majority",
            Condition::Minority => "minority",
            Condition::MinorityDiffusion => "minority_diffusion",
        }
    }

    /// All conditions, in assignment-pool order.
    pub fn all() -> &'static [Condition] {
        &[
            Condition::Majority,
            Condition::Minority,
            Condition::MinorityDiffusion,
        ]
    }
}

impl std::str::FromStr for Condition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "majority" => Ok(Condition::Majority),
            "minority" => Ok(Condition::Minority),
            "minority_diffusion" | "minorityDiffusion" => Ok(Condition::MinorityDiffusion),
            other => Err(DomainError::UnknownCondition(other.to_string())),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the three scoped conversational contexts.
///
/// The legacy naming `main1`/`main2` maps 1:1 onto `normative`/`informative`
/// and is accepted at all parse boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKey {
    /// Practice session before the counterbalanced main sessions.
    Test,
    /// Main session biased toward social-approval framing.
    #[serde(alias = "main1")]
    Normative,
    /// Main session biased toward evidence framing.
    #[serde(alias = "main2")]
    Informative,
}

impl SessionKey {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::Test => "test",
            SessionKey::Normative => "normative",
            SessionKey::Informative => "informative",
        }
    }

    /// All session keys, practice session first.
    pub fn all() -> &'static [SessionKey] {
        &[
            SessionKey::Test,
            SessionKey::Normative,
            SessionKey::Informative,
        ]
    }
}

impl std::str::FromStr for SessionKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(SessionKey::Test),
            "normative" | "main1" => Ok(SessionKey::Normative),
            "informative" | "main2" => Ok(SessionKey::Informative),
            other => Err(DomainError::UnknownSessionKey(other.to_string())),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counterbalancing of the two main sessions.
///
/// Swaps both the ordinal position and the discussion topic of the
/// normative and informative sessions between participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrder {
    /// Normative session first, with the income topic.
    Standard,
    /// Informative session first, topics swapped.
    Reversed,
}

/// Practice topic for the test session.
const TOPIC_TEST: &str = "switching to a four-day work week";
/// First main topic.
const TOPIC_INCOME: &str = "introducing an unconditional basic income";
/// Second main topic.
const TOPIC_CROPS: &str = "allowing gene-edited crops in agriculture";

impl TaskOrder {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOrder::Standard => "standard",
            TaskOrder::Reversed => "reversed",
        }
    }

    /// Ordinal position of a session for this ordering (test is always 0).
    pub fn ordinal_of(&self, key: SessionKey) -> u8 {
        match (self, key) {
            (_, SessionKey::Test) => 0,
            (TaskOrder::Standard, SessionKey::Normative) => 1,
            (TaskOrder::Standard, SessionKey::Informative) => 2,
            (TaskOrder::Reversed, SessionKey::Informative) => 1,
            (TaskOrder::Reversed, SessionKey::Normative) => 2,
        }
    }

    /// Discussion topic presented in a session for this ordering.
    pub fn topic_of(&self, key: SessionKey) -> &'static str {
        match (self, key) {
            (_, SessionKey::Test) => TOPIC_TEST,
            (TaskOrder::Standard, SessionKey::Normative) => TOPIC_INCOME,
            (TaskOrder::Standard, SessionKey::Informative) => TOPIC_CROPS,
            (TaskOrder::Reversed, SessionKey::Normative) => TOPIC_CROPS,
            (TaskOrder::Reversed, SessionKey::Informative) => TOPIC_INCOME,
        }
    }
}

impl std::str::FromStr for TaskOrder {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(TaskOrder::Standard),
            "reversed" => Ok(TaskOrder::Reversed),
            other => Err(DomainError::UnknownTaskOrder(other.to_string())),
        }
    }
}

impl std::fmt::Display for TaskOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rhetorical position on the debate topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Support,
    Oppose,
    Neutral,
}

impl Stance {
    /// The counter-stance used for dissenting agents.
    ///
    /// Neutral has no opposite; the system treats oppose as the default
    /// counter-stance for a neutral starting point. This asymmetry is
    /// intentional and must be preserved.
    pub fn opposite(self) -> Stance {
        match self {
            Stance::Support => Stance::Oppose,
            Stance::Oppose => Stance::Support,
            Stance::Neutral => Stance::Oppose,
        }
    }

    /// Stance word for prompt text ("support" / "oppose" / "stay undecided on").
    pub fn verb(&self) -> &'static str {
        match self {
            Stance::Support => "support",
            Stance::Oppose => "oppose",
            Stance::Neutral => "stay undecided on",
        }
    }

    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stance::Support => "support",
            Stance::Oppose => "oppose",
            Stance::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Stance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// T0 opinion score in [-50, +50], captured once per session before any
/// chat cycle. Sign maps to a stance: positive supports, negative opposes,
/// zero is neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpinionScore(i32);

impl OpinionScore {
    pub const MIN: i32 = -50;
    pub const MAX: i32 = 50;

    /// Validate and wrap a raw score.
    pub fn new(value: i32) -> Result<Self, DomainError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(OpinionScore(value))
        } else {
            Err(DomainError::OpinionOutOfRange(value))
        }
    }

    /// Raw scale value.
    pub fn value(&self) -> i32 {
        self.0
    }

    /// Stance implied by the sign of the score.
    pub fn stance(&self) -> Stance {
        match self.0 {
            v if v > 0 => Stance::Support,
            v if v < 0 => Stance::Oppose,
            _ => Stance::Neutral,
        }
    }
}

/// Cycle index within a session, 1..=4. A session runs exactly four
/// conversational cycles after the T0 capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleIndex(u8);

impl CycleIndex {
    pub const FIRST: CycleIndex = CycleIndex(1);
    pub const LAST: CycleIndex = CycleIndex(4);

    /// Validate and wrap a raw index.
    pub fn new(value: u8) -> Result<Self, DomainError> {
        if (1..=4).contains(&value) {
            Ok(CycleIndex(value))
        } else {
            Err(DomainError::CycleOutOfRange(value))
        }
    }

    /// Raw 1-based index.
    pub fn get(&self) -> u8 {
        self.0
    }

    /// The preceding cycle, if any.
    pub fn prev(&self) -> Option<CycleIndex> {
        (self.0 > 1).then(|| CycleIndex(self.0 - 1))
    }

    /// The following cycle, if any.
    pub fn next(&self) -> Option<CycleIndex> {
        (self.0 < 4).then(|| CycleIndex(self.0 + 1))
    }

    /// All four cycles in order.
    pub fn all() -> [CycleIndex; 4] {
        [CycleIndex(1), CycleIndex(2), CycleIndex(3), CycleIndex(4)]
    }
}

impl std::fmt::Display for CycleIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the three simulated-agent positions in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSlot {
    Agent1,
    Agent2,
    Agent3,
}

impl AgentSlot {
    /// All slots in order.
    pub fn all() -> &'static [AgentSlot] {
        &[AgentSlot::Agent1, AgentSlot::Agent2, AgentSlot::Agent3]
    }

    /// 1-based slot number.
    pub fn number(&self) -> u8 {
        match self {
            AgentSlot::Agent1 => 1,
            AgentSlot::Agent2 => 2,
            AgentSlot::Agent3 => 3,
        }
    }

    /// Message role for this slot.
    pub fn role(&self) -> MessageRole {
        match self {
            AgentSlot::Agent1 => MessageRole::Agent1,
            AgentSlot::Agent2 => MessageRole::Agent2,
            AgentSlot::Agent3 => MessageRole::Agent3,
        }
    }
}

impl std::fmt::Display for AgentSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentSlot::Agent1 => write!(f, "agent1"),
            AgentSlot::Agent2 => write!(f, "agent2"),
            AgentSlot::Agent3 => write!(f, "agent3"),
        }
    }
}

/// Author of a persisted message within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Agent1,
    Agent2,
    Agent3,
}

impl MessageRole {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Agent1 => "agent1",
            MessageRole::Agent2 => "agent2",
            MessageRole::Agent3 => "agent3",
        }
    }

    /// Agent slot for agent roles, None for the participant.
    pub fn agent_slot(&self) -> Option<AgentSlot> {
        match self {
            MessageRole::User => None,
            MessageRole::Agent1 => Some(AgentSlot::Agent1),
            MessageRole::Agent2 => Some(AgentSlot::Agent2),
            MessageRole::Agent3 => Some(AgentSlot::Agent3),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "agent1" => Ok(MessageRole::Agent1),
            "agent2" => Ok(MessageRole::Agent2),
            "agent3" => Ok(MessageRole::Agent3),
            other => Err(DomainError::UnknownMessageRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
