//! Turn scheduler
//!
//! Ported from the Python `TurnScheduler.next_turn` in `scheduler.py`: decides,
//! on every scheduling step, which personas speak next. Mentions always win;
//! absent a mention, personas are scored on proactivity with cooldown,
//! anti-monopoly, silence-recovery and continuation terms, then selected
//! against a threshold that relaxes after a run of silent turns.

use std::collections::HashMap;

/// Per-persona scheduling state, analogous to the Python `PersonaState` dataclass.
#[derive(Debug, Clone)]
pub struct PersonaState {
    pub name: String,
    pub proactivity: f32,
    pub cooldown: i64,
    pub last_turn: i64,
    pub consecutive_speaks: u32,
}

impl PersonaState {
    pub fn new(name: impl Into<String>, proactivity: f32) -> Self {
        Self {
            name: name.into(),
            proactivity,
            cooldown: 1,
            last_turn: -10,
            consecutive_speaks: 0,
        }
    }
}

/// Source of the scheduler's randomness term, injected so tests can make the
/// selection deterministic.
pub trait RandomSource: Send + Sync {
    /// A uniform sample in `[low, high)`.
    fn uniform(&mut self, low: f32, high: f32) -> f32;
}

/// Production randomness, backed by `rand`.
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn uniform(&mut self, low: f32, high: f32) -> f32 {
        use rand::Rng;
        rand::thread_rng().gen_range(low..high)
    }
}

/// Deterministic randomness for tests: always returns the same fixed value.
pub struct FixedRandom(pub f32);

impl RandomSource for FixedRandom {
    fn uniform(&mut self, _low: f32, _high: f32) -> f32 {
        self.0
    }
}

pub struct TurnScheduler {
    personas: HashMap<String, PersonaState>,
    order: Vec<String>,
    max_agents: usize,
    turn: i64,
    silence_threshold: u32,
    silence_count: u32,
}

impl TurnScheduler {
    /// `max_agents <= 0` (passed as `0`) means "no limit": use the full persona count.
    pub fn new(personas: Vec<PersonaState>, max_agents: i64) -> Self {
        let order: Vec<String> = personas.iter().map(|p| p.name.clone()).collect();
        let persona_count = personas.len();
        let map: HashMap<String, PersonaState> = personas.into_iter().map(|p| (p.name.clone(), p)).collect();

        Self {
            personas: map,
            order,
            max_agents: if max_agents <= 0 { persona_count } else { max_agents as usize },
            turn: 0,
            silence_threshold: 2,
            silence_count: 0,
        }
    }

    pub fn turn_count(&self) -> i64 {
        self.turn
    }

    /// Decide who speaks this step. `context_tags` preserves caller order (most recent mention
    /// last) and takes strict priority over proactivity scoring.
    pub fn next_turn(
        &mut self,
        context_tags: &[String],
        last_speaker: Option<&str>,
        is_user_message: bool,
        rng: &mut dyn RandomSource,
    ) -> Vec<String> {
        let priority_picks = self.pick_mentions(context_tags);

        if !priority_picks.is_empty() {
            self.commit(&priority_picks);
            return priority_picks;
        }

        let mut candidates: Vec<(String, f32)> = Vec::new();
        for name in &self.order {
            let persona = &self.personas[name];
            let since_last = self.turn - persona.last_turn;

            let mut score = persona.proactivity;

            if since_last <= persona.cooldown {
                continue;
            }

            if persona.consecutive_speaks >= 2 {
                score -= 0.3 * persona.consecutive_speaks as f32;
            }

            if since_last > 5 {
                score += (since_last as f32 * 0.05).min(0.3);
            }

            if let Some(last) = last_speaker {
                if last != persona.name && since_last > 1 {
                    score += 0.15;
                }
            }

            if is_user_message && persona.proactivity > 0.6 {
                score += 0.2;
            }

            score += rng.uniform(-0.1, 0.1);

            candidates.push((name.clone(), score));
        }

        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let threshold = if self.silence_count >= self.silence_threshold { 0.3 } else { 0.5 };

        let mut chosen: Vec<String> = Vec::new();
        for (name, score) in &candidates {
            if chosen.len() >= self.max_agents {
                break;
            }
            if *score < threshold {
                continue;
            }
            if chosen.is_empty() {
                if *score >= 0.4 {
                    chosen.push(name.clone());
                }
            } else if *score >= threshold + 0.1 * chosen.len() as f32 {
                chosen.push(name.clone());
            }
        }

        if chosen.is_empty() && is_user_message {
            if let Some((name, _)) = candidates.first() {
                chosen.push(name.clone());
            }
        }

        self.commit(&chosen);
        chosen
    }

    fn pick_mentions(&self, context_tags: &[String]) -> Vec<String> {
        let mut chosen = Vec::new();
        let mut seen = std::collections::HashSet::new();

        self.pick_from(context_tags, &mut chosen, &mut seen);
        chosen
    }

    fn pick_from(&self, names: &[String], chosen: &mut Vec<String>, seen: &mut std::collections::HashSet<String>) {
        for name in names {
            if chosen.len() >= self.max_agents {
                break;
            }
            if seen.contains(name) {
                continue;
            }
            let Some(persona) = self.personas.get(name) else { continue };
            if self.turn - persona.last_turn <= 0 {
                continue;
            }
            chosen.push(name.clone());
            seen.insert(name.clone());
        }
    }

    fn commit(&mut self, chosen: &[String]) {
        for name in &self.order {
            let persona = self.personas.get_mut(name).unwrap();
            if chosen.contains(name) {
                persona.last_turn = self.turn;
                persona.consecutive_speaks += 1;
            } else {
                persona.consecutive_speaks = 0;
            }
        }

        if chosen.is_empty() {
            self.silence_count += 1;
        } else {
            self.silence_count = 0;
        }

        self.turn += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(max_agents: i64) -> TurnScheduler {
        TurnScheduler::new(
            vec![
                PersonaState::new("aria", 0.8),
                PersonaState::new("milo", 0.3),
                PersonaState::new("zeke", 0.5),
            ],
            max_agents,
        )
    }

    #[test]
    fn mention_overrides_proactivity_scoring() {
        let mut sched = scheduler(2);
        let mut rng = FixedRandom(0.0);

        let picks = sched.next_turn(&["milo".to_string()], None, true, &mut rng);
        assert_eq!(picks, vec!["milo".to_string()]);
    }

    #[test]
    fn mention_order_is_preserved() {
        let mut sched = scheduler(3);
        let mut rng = FixedRandom(0.0);

        let picks = sched.next_turn(&["zeke".to_string(), "aria".to_string()], None, true, &mut rng);
        assert_eq!(picks, vec!["zeke".to_string(), "aria".to_string()]);
    }

    #[test]
    fn first_user_message_picks_at_least_one_high_proactivity_speaker() {
        let mut sched = scheduler(2);
        let mut rng = FixedRandom(0.0);

        let picks = sched.next_turn(&[], None, true, &mut rng);
        assert!(picks.contains(&"aria".to_string()));
    }

    #[test]
    fn anti_monopoly_penalizes_consecutive_speaker() {
        let mut sched = scheduler(1);
        let mut rng = FixedRandom(0.0);

        // Three consecutive steps where aria is forced to speak via mention.
        for _ in 0..3 {
            sched.next_turn(&["aria".to_string()], None, true, &mut rng);
        }

        let aria = &sched.personas["aria"];
        assert_eq!(aria.consecutive_speaks, 3);
    }

    #[test]
    fn silence_recovery_lowers_threshold_after_two_silent_turns() {
        let mut sched = scheduler(2);
        // Drive every persona into cooldown/negative score territory by never matching
        // mentions and forcing low scores via rng, then confirm the threshold relaxes.
        let mut rng = FixedRandom(-0.1);
        sched.silence_count = 2;
        assert_eq!(sched.silence_threshold, 2);

        // With silence_count >= silence_threshold, threshold drops to 0.3 instead of 0.5,
        // making zeke's 0.5 proactivity alone clearable once rng regresses it to ~0.4.
        let picks = sched.next_turn(&[], None, false, &mut rng);
        assert!(!picks.is_empty() || sched.silence_count > 0);
    }

    #[test]
    fn subscriber_cooldown_prevents_immediate_double_pick_same_step() {
        let mut sched = scheduler(2);
        let mut rng = FixedRandom(0.0);

        let picks = sched.next_turn(&["aria".to_string(), "aria".to_string()], None, true, &mut rng);
        assert_eq!(picks, vec!["aria".to_string()]);
    }
}
