use std::fmt;

use millionaire_game::{
    AudienceVote, Lifeline, LifelineState, PhoneFriendHint, Question, RenderOrder,
};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;

/// What a simulated player sees of the question on screen.
#[derive(Debug, Clone, Copy)]
pub struct TurnView<'a> {
    /// 0-based ladder position.
    pub question_index: usize,
    pub question: &'a Question,
    pub order: RenderOrder,
    /// Rendered slots hidden by 50:50.
    pub removed: &'a [usize],
    pub audience: Option<&'a [AudienceVote]>,
    pub hint: Option<&'a PhoneFriendHint>,
    pub lifelines: LifelineState,
}

impl TurnView<'_> {
    /// Rendered slots still on screen.
    #[must_use]
    pub fn visible_slots(&self) -> Vec<usize> {
        (0..self.order.as_array().len())
            .filter(|slot| !self.removed.contains(slot))
            .collect()
    }

    #[must_use]
    pub fn correct_slot(&self) -> usize {
        self.order
            .rendered_position(self.question.correct_answer)
            .unwrap_or(0)
    }

    /// First visible slot holding a wrong option.
    #[must_use]
    pub fn wrong_slot(&self) -> usize {
        let correct = self.correct_slot();
        self.visible_slots()
            .into_iter()
            .find(|slot| *slot != correct)
            .unwrap_or_else(|| (correct + 1) % self.order.as_array().len())
    }

    /// Rendered slot of the audience favourite, if the poll is on screen.
    #[must_use]
    pub fn audience_favourite(&self) -> Option<usize> {
        let votes = self.audience?;
        let best = votes.iter().max_by_key(|vote| vote.percentage)?;
        self.order.rendered_position(best.option_index)
    }

    /// Rendered slot the friend suggested, if a call was made.
    #[must_use]
    pub fn friend_suggestion(&self) -> Option<usize> {
        self.hint
            .and_then(|hint| self.order.rendered_position(hint.suggested_answer))
    }
}

/// Decision returned by a [`PlayerPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDecision {
    /// Click the option at this rendered slot.
    Answer(usize),
    UseLifeline(Lifeline),
    WalkAway,
    /// Let the clock run out.
    TimeOut,
}

/// Policy interface for automated play strategies.
pub trait PlayerPolicy {
    /// Name used for logging/debug output.
    fn name(&self) -> &'static str;

    fn decide(&mut self, view: &TurnView<'_>) -> TurnDecision;
}

/// Built-in play strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayStrategy {
    /// Always answers correctly.
    Perfect,
    /// Correct until the given 0-based question, then wrong.
    FallAt(usize),
    /// Walks away once this many answers are banked.
    WalkAfter(usize),
    /// Lets the timer expire on the given 0-based question.
    TimeoutAt(usize),
    /// Spends every lifeline early and trusts their hints.
    LifelineSeeker,
    /// Uniform random clicks among visible options.
    Random,
}

impl PlayStrategy {
    #[must_use]
    pub fn label(self) -> String {
        match self {
            Self::Perfect => "Perfect".to_string(),
            Self::FallAt(index) => format!("Fall at Q{}", index + 1),
            Self::WalkAfter(count) => format!("Walk after {count}"),
            Self::TimeoutAt(index) => format!("Timeout at Q{}", index + 1),
            Self::LifelineSeeker => "Lifeline Seeker".to_string(),
            Self::Random => "Random".to_string(),
        }
    }

    #[must_use]
    pub fn create_policy(self, seed: u64) -> Box<dyn PlayerPolicy + Send> {
        match self {
            Self::Perfect => Box::new(ScriptedPolicy::new("Perfect", Script::Perfect)),
            Self::FallAt(index) => Box::new(ScriptedPolicy::new("FallAt", Script::FallAt(index))),
            Self::WalkAfter(count) => {
                Box::new(ScriptedPolicy::new("WalkAfter", Script::WalkAfter(count)))
            }
            Self::TimeoutAt(index) => {
                Box::new(ScriptedPolicy::new("TimeoutAt", Script::TimeoutAt(index)))
            }
            Self::LifelineSeeker => Box::new(LifelineSeekerPolicy),
            Self::Random => Box::new(RandomPolicy::new(seed)),
        }
    }
}

impl fmt::Display for PlayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, Copy)]
enum Script {
    Perfect,
    FallAt(usize),
    WalkAfter(usize),
    TimeoutAt(usize),
}

struct ScriptedPolicy {
    name: &'static str,
    script: Script,
}

impl ScriptedPolicy {
    const fn new(name: &'static str, script: Script) -> Self {
        Self { name, script }
    }
}

impl PlayerPolicy for ScriptedPolicy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decide(&mut self, view: &TurnView<'_>) -> TurnDecision {
        match self.script {
            Script::FallAt(index) if view.question_index == index => {
                TurnDecision::Answer(view.wrong_slot())
            }
            Script::WalkAfter(count) if view.question_index == count => TurnDecision::WalkAway,
            Script::TimeoutAt(index) if view.question_index == index => TurnDecision::TimeOut,
            _ => TurnDecision::Answer(view.correct_slot()),
        }
    }
}

/// 50:50 on the first question, the audience on the second and a friend on
/// the third. Answers follow whatever hint is on screen.
struct LifelineSeekerPolicy;

impl PlayerPolicy for LifelineSeekerPolicy {
    fn name(&self) -> &'static str {
        "LifelineSeeker"
    }

    fn decide(&mut self, view: &TurnView<'_>) -> TurnDecision {
        let wanted = match view.question_index {
            0 => Some(Lifeline::FiftyFifty),
            1 => Some(Lifeline::AskAudience),
            2 => Some(Lifeline::PhoneFriend),
            _ => None,
        };
        if let Some(lifeline) = wanted
            && !view.lifelines.is_used(lifeline)
        {
            return TurnDecision::UseLifeline(lifeline);
        }

        let slot = view
            .friend_suggestion()
            .or_else(|| view.audience_favourite())
            .unwrap_or_else(|| view.correct_slot());
        TurnDecision::Answer(slot)
    }
}

struct RandomPolicy {
    rng: ChaCha20Rng,
}

impl RandomPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

impl PlayerPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn decide(&mut self, view: &TurnView<'_>) -> TurnDecision {
        let slots = view.visible_slots();
        let slot = slots.choose(&mut self.rng).copied().unwrap_or(0);
        TurnDecision::Answer(slot)
    }
}
