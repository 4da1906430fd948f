// WHY: One editing session over one document; owns every timer and all per-session state
// Hosts drive it with change notifications and clock ticks, or let run_until_quiescent sleep for them

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::document::{Document, MarkerView, NodeKey, NodeKind};
use crate::error::SessionError;
use crate::matcher::Trie;
use crate::rewrite::{self, RewriteOutcome};
use crate::scheduler::{Delivery, ScheduledSentence, Scheduler};
use crate::segmenter::SentenceSegmenter;
use crate::state::{ReplacementRecord, SessionState};

/// Whether incomplete or in-flight sentences are processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    Normal,
    Forced,
}

/// What a change notification did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Text ended on a terminator: changed blocks were processed at once
    Terminator { scheduled: usize },
    /// Idle timer (re)armed for the given deadline
    IdleArmed { deadline: Duration },
}

/// Everything one `tick` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub idle_fired: bool,
    /// Matches newly scheduled by an idle pass
    pub scheduled: usize,
    pub outcomes: Vec<RewriteOutcome>,
}

impl TickReport {
    pub fn marked(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_marked()).count()
    }

    fn absorb(&mut self, other: TickReport) {
        self.idle_fired |= other.idle_fired;
        self.scheduled += other.scheduled;
        self.outcomes.extend(other.outcomes);
    }
}

pub struct Session {
    config: SessionConfig,
    trie: Trie,
    segmenter: SentenceSegmenter,
    scheduler: Scheduler,
    state: SessionState,
    idle_deadline: Option<Duration>,
    /// Full text as of the last terminator-triggered pass
    last_trigger_text: String,
    /// Block text as of its last forced pass; a normal pass skips incomplete sentences
    processed_blocks: HashMap<NodeKey, String>,
}

impl Session {
    /// Bind a session to a document
    ///
    /// Fails when the document cannot hold marker spans or the terminator pattern
    /// does not compile.
    pub fn attach(doc: &Document, config: SessionConfig, trie: Trie) -> Result<Self> {
        if !doc.has_kind(NodeKind::Marker) {
            return Err(SessionError::MarkerKindNotRegistered(NodeKind::Marker).into());
        }
        let segmenter = SentenceSegmenter::new(&config.terminator_pattern)?;
        let scheduler = Scheduler::from_config(&config);

        info!(
            words = trie.len(),
            blocks = doc.blocks().len(),
            idle_timeout_ms = config.idle_timeout_ms,
            "Attached foreign-word session"
        );

        Ok(Self {
            config,
            trie,
            segmenter,
            scheduler,
            state: SessionState::new(),
            idle_deadline: None,
            last_trigger_text: String::new(),
            processed_blocks: HashMap::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn idle_deadline(&self) -> Option<Duration> {
        self.idle_deadline
    }

    /// React to a committed document change
    pub fn on_document_change(&mut self, doc: &mut Document, now: Duration) -> Trigger {
        let text = doc.full_text();

        if self.segmenter.is_sentence_complete(&text) && text != self.last_trigger_text {
            self.idle_deadline = None;
            self.prune_processed(doc);
            let changed: Vec<NodeKey> = doc
                .blocks()
                .into_iter()
                .filter(|block| self.processed_blocks.get(block) != Some(&doc.text_content(*block)))
                .collect();
            info!(blocks = changed.len(), "Sentence terminator typed, processing changed blocks");

            let scheduled = changed
                .into_iter()
                .map(|block| self.process_block(doc, block, ProcessMode::Forced, now))
                .sum();
            self.last_trigger_text = text;
            return Trigger::Terminator { scheduled };
        }

        let deadline = now + self.config.idle_timeout();
        self.idle_deadline = Some(deadline);
        debug!(?deadline, "Idle timer armed");
        Trigger::IdleArmed { deadline }
    }

    /// Process complete sentences of every block that are not already in flight
    pub fn scan(&mut self, doc: &mut Document, now: Duration) -> usize {
        self.process_all(doc, ProcessMode::Normal, now)
    }

    fn process_all(&mut self, doc: &mut Document, mode: ProcessMode, now: Duration) -> usize {
        doc.blocks()
            .into_iter()
            .map(|block| self.process_block(doc, block, mode, now))
            .sum()
    }

    /// Segment one block, tag its spans and schedule its matches; returns how many were scheduled
    pub fn process_block(&mut self, doc: &mut Document, block: NodeKey, mode: ProcessMode, now: Duration) -> usize {
        let text = doc.text_content(block);
        let forced = mode == ProcessMode::Forced;
        if forced {
            self.processed_blocks.insert(block, text.clone());
        }
        let mut scheduled = 0;

        for sentence in self.segmenter.split(&text) {
            if sentence.stable_key.is_empty() {
                continue;
            }
            let identity = self.state.identity_for(&sentence.stable_key);

            if !forced && (self.state.is_in_flight(&sentence.stable_key) || !sentence.is_complete) {
                continue;
            }

            let spans = doc.text_spans_in_range(block, sentence.start, sentence.end);
            debug!(
                %identity,
                text = %sentence.stable_key,
                start = sentence.start,
                end = sentence.end,
                complete = sentence.is_complete,
                spans = spans.len(),
                "Processing sentence"
            );
            doc.update(|tx| {
                for span in spans.iter().filter(|span| !span.is_marker) {
                    if let Err(e) = tx.tag_sentence(span.key, identity) {
                        warn!("Failed to tag span {}: {}", span.key, e);
                    }
                }
            });

            let matches = self
                .state
                .filter_overrides(identity, self.trie.find_all_matches(&sentence.text));
            if matches.is_empty() {
                continue;
            }

            self.state.begin_processing(&sentence.stable_key, matches.len());
            scheduled += matches.len();
            self.scheduler.register_sentence(
                ScheduledSentence {
                    block,
                    stable_key: sentence.stable_key,
                    identity,
                    start: sentence.start,
                    end: sentence.end,
                },
                matches,
                now,
            );
        }

        scheduled
    }

    fn prune_processed(&mut self, doc: &Document) {
        let live: HashSet<NodeKey> = doc.blocks().into_iter().collect();
        self.processed_blocks.retain(|block, _| live.contains(block));
    }

    /// Blocks remembered from earlier forced passes
    pub fn tracked_block_count(&self) -> usize {
        self.processed_blocks.len()
    }

    /// Earliest instant at which `tick` has work to do
    pub fn next_wake(&mut self) -> Option<Duration> {
        match (self.idle_deadline, self.scheduler.next_deadline()) {
            (Some(idle), Some(due)) => Some(idle.min(due)),
            (idle, due) => idle.or(due),
        }
    }

    /// Fire the idle timer if due, then apply every delivery due at `now`
    pub fn tick(&mut self, doc: &mut Document, now: Duration) -> TickReport {
        let mut report = TickReport::default();

        if self.idle_deadline.is_some_and(|deadline| deadline <= now) {
            self.idle_deadline = None;
            info!("Idle timeout elapsed, processing all blocks");
            report.idle_fired = true;
            self.prune_processed(doc);
            report.scheduled = self.process_all(doc, ProcessMode::Forced, now);
            self.last_trigger_text = doc.full_text();
        }

        for delivery in self.scheduler.pop_due(now) {
            report.outcomes.push(self.deliver(doc, &delivery));
        }

        report
    }

    fn deliver(&mut self, doc: &mut Document, delivery: &Delivery) -> RewriteOutcome {
        let outcome = rewrite::apply_delivery(doc, delivery);
        self.state.settle(&delivery.sentence.stable_key, 1);
        match &outcome {
            RewriteOutcome::Stale(reason) => debug!(
                word = %delivery.matched.word,
                ?reason,
                "Dropped stale match"
            ),
            _ => debug!(word = %delivery.matched.word, ?outcome, "Delivered match"),
        }
        outcome
    }

    /// Sleep through every armed timer until nothing is pending
    pub async fn run_until_quiescent<C: Clock>(&mut self, doc: &mut Document, clock: &C) -> TickReport {
        let mut total = TickReport::default();
        while let Some(wake) = self.next_wake() {
            if clock.now() < wake {
                clock.sleep_until(wake).await;
            }
            total.absorb(self.tick(doc, clock.now()));
        }
        info!(marked = total.marked(), "Session quiescent");
        total
    }

    /// Accept a marker's suggestion and remember not to re-flag the word
    pub fn confirm_replacement(&mut self, doc: &mut Document, marker_key: NodeKey) -> Result<ReplacementRecord> {
        let confirmed = rewrite::replace_marker(doc, marker_key)?;

        let offset = confirmed.absolute_offset;
        let relative_index = self
            .segmenter
            .split(&confirmed.block_text_before)
            .into_iter()
            .find(|sentence| sentence.contains(offset))
            .map_or(offset, |sentence| offset - sentence.start);

        let record = ReplacementRecord {
            node: confirmed.node,
            sentence: confirmed.sentence,
            original_word: confirmed.original_word,
            replacement: confirmed.replacement,
            relative_index,
        };
        info!(
            word = %record.original_word,
            replacement = %record.replacement,
            sentence = %record.sentence,
            "Replacement confirmed"
        );
        self.state.record_replacement(record.clone());
        Ok(record)
    }

    /// Drop every pending match of a sentence; returns how many were dropped
    pub fn cancel_sentence(&mut self, stable_key: &str) -> usize {
        let cancelled = self.scheduler.cancel_sentence(stable_key);
        self.state.settle(stable_key, cancelled);
        cancelled
    }

    pub fn markers(&self, doc: &Document) -> Vec<MarkerView> {
        doc.markers()
    }

    pub fn replacements(&self) -> &[ReplacementRecord] {
        self.state.replacements()
    }

    /// Cancel all timers; nothing is delivered afterwards
    pub fn shutdown(&mut self) {
        let cancelled = self.scheduler.shutdown();
        let count: usize = cancelled.values().sum();
        self.state.clear_in_flight();
        self.idle_deadline = None;
        info!(cancelled = count, "Session shut down");
    }
}
