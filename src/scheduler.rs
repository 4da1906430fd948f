// WHY: Staggered delivery of matches; whichever timer fires first surfaces first
// A min-heap of (fire time, ticket) stands in for a race over independent timers

use futures::stream::{self, Stream};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::document::NodeKey;
use crate::matcher::Match;
use crate::state::SentenceId;

/// `d_i = base + i * step + jitter`, jitter uniform in `[0, jitter_max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    pub base: Duration,
    pub step: Duration,
    pub jitter_max: Duration,
}

impl DelayPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            step: Duration::from_millis(config.step_delay_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
        }
    }

    fn delay_for(&self, index: usize, rng: &mut StdRng) -> Duration {
        let jitter = if self.jitter_max.is_zero() {
            Duration::ZERO
        } else {
            let max_ms = u64::try_from(self.jitter_max.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(rng.gen_range(0..=max_ms))
        };
        let steps = u32::try_from(index).unwrap_or(u32::MAX);
        self.base + self.step.saturating_mul(steps) + jitter
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Where a sentence sat when its matches were computed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledSentence {
    pub block: NodeKey,
    pub stable_key: String,
    pub identity: SentenceId,
    /// Block-relative character range at computation time
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketId(u64);

impl TicketId {
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) const fn for_tests(raw: u64) -> Self {
        TicketId(raw)
    }
}

/// A match whose delay has elapsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub ticket: TicketId,
    pub sentence: ScheduledSentence,
    pub matched: Match,
    pub fire_at: Duration,
}

impl Delivery {
    /// Block-relative start of the match
    pub fn absolute_start(&self) -> usize {
        self.sentence.start + self.matched.start
    }

    pub fn absolute_end(&self) -> usize {
        self.sentence.start + self.matched.end
    }
}

pub struct Scheduler {
    policy: DelayPolicy,
    rng: StdRng,
    heap: BinaryHeap<Reverse<(Duration, TicketId)>>,
    pending: HashMap<TicketId, Delivery>,
    by_sentence: HashMap<String, Vec<TicketId>>,
    next_ticket: u64,
}

impl Scheduler {
    /// Scheduler with a fixed jitter seed, or entropy when `seed` is `None`
    pub fn new(policy: DelayPolicy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            policy,
            rng,
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            by_sentence: HashMap::new(),
            next_ticket: 0,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(DelayPolicy::from_config(config), config.jitter_seed)
    }

    pub fn policy(&self) -> DelayPolicy {
        self.policy
    }

    /// Give each match of one sentence its delay and start its timer at `now`
    pub fn register_sentence(&mut self, sentence: ScheduledSentence, matches: Vec<Match>, now: Duration) -> Vec<TicketId> {
        let mut tickets = Vec::with_capacity(matches.len());

        for (index, mut matched) in matches.into_iter().enumerate() {
            matched.assigned_delay = self.policy.delay_for(index, &mut self.rng);
            let fire_at = now + matched.assigned_delay;

            let ticket = TicketId(self.next_ticket);
            self.next_ticket += 1;

            debug!(
                word = %matched.word,
                delay_ms = matched.assigned_delay.as_millis() as u64,
                sentence = %sentence.identity,
                "Scheduled match"
            );

            self.heap.push(Reverse((fire_at, ticket)));
            self.pending.insert(
                ticket,
                Delivery {
                    ticket,
                    sentence: sentence.clone(),
                    matched,
                    fire_at,
                },
            );
            tickets.push(ticket);
        }

        if !tickets.is_empty() {
            self.by_sentence
                .entry(sentence.stable_key)
                .or_default()
                .extend(tickets.iter().copied());
        }
        tickets
    }

    /// Drop every pending delay of one sentence; returns how many were cancelled
    pub fn cancel_sentence(&mut self, stable_key: &str) -> usize {
        let Some(tickets) = self.by_sentence.remove(stable_key) else {
            return 0;
        };
        let cancelled = tickets
            .iter()
            .filter(|ticket| self.pending.remove(*ticket).is_some())
            .count();
        debug!(stable_key, cancelled, "Cancelled sentence deliveries");
        cancelled
    }

    /// Drop every pending delay; returns the cancelled count per stable key
    pub fn shutdown(&mut self) -> HashMap<String, usize> {
        let mut cancelled: HashMap<String, usize> = HashMap::new();
        for delivery in self.pending.values() {
            *cancelled.entry(delivery.sentence.stable_key.clone()).or_default() += 1;
        }
        self.pending.clear();
        self.by_sentence.clear();
        self.heap.clear();
        cancelled
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_for(&self, stable_key: &str) -> usize {
        self.by_sentence.get(stable_key).map_or(0, Vec::len)
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fire time of the earliest live timer
    pub fn next_deadline(&mut self) -> Option<Duration> {
        while let Some(Reverse((fire_at, ticket))) = self.heap.peek().copied() {
            if self.pending.contains_key(&ticket) {
                return Some(fire_at);
            }
            // Cancelled timers are discarded lazily
            self.heap.pop();
        }
        None
    }

    fn pop_one_due(&mut self, now: Duration) -> Option<Delivery> {
        while let Some(Reverse((fire_at, ticket))) = self.heap.peek().copied() {
            if fire_at > now {
                return None;
            }
            self.heap.pop();
            if let Some(delivery) = self.pending.remove(&ticket) {
                self.forget(&delivery.sentence.stable_key, ticket);
                return Some(delivery);
            }
        }
        None
    }

    fn forget(&mut self, stable_key: &str, ticket: TicketId) {
        if let Some(tickets) = self.by_sentence.get_mut(stable_key) {
            tickets.retain(|t| *t != ticket);
            if tickets.is_empty() {
                self.by_sentence.remove(stable_key);
            }
        }
    }

    /// Every delivery due at `now`, in firing order
    pub fn pop_due(&mut self, now: Duration) -> Vec<Delivery> {
        let mut due = Vec::new();
        while let Some(delivery) = self.pop_one_due(now) {
            due.push(delivery);
        }
        due
    }

    /// Wait for the next timer to fire and yield its match; `None` once nothing is pending
    pub async fn next_due<C: Clock>(&mut self, clock: &C) -> Option<Delivery> {
        loop {
            let deadline = self.next_deadline()?;
            if clock.now() < deadline {
                clock.sleep_until(deadline).await;
            }
            if let Some(delivery) = self.pop_one_due(clock.now()) {
                return Some(delivery);
            }
        }
    }

    /// All pending matches as a stream in completion order
    pub fn deliveries<'a, C: Clock>(&'a mut self, clock: &'a C) -> impl Stream<Item = Delivery> + 'a {
        stream::unfold(self, move |scheduler| async move {
            let delivery = scheduler.next_due(clock).await?;
            Some((delivery, scheduler))
        })
    }
}
