// End-to-end session behaviour on simulated time
// WHY: Timers, rewrites and overrides interact; only a full session exercises the interleavings

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures::StreamExt;
use wordrefine::scheduler::ScheduledSentence;
use wordrefine::{
    Clock, Document, ManualClock, RewriteOutcome, Scheduler, SessionConfig, SentenceId, SentenceSegmenter, Trigger,
};

#[path = "integration/mod.rs"]
mod test_utils;
use test_utils::{attach, dictionary_trie, fixtures};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Test the full pipeline on a multi-paragraph document with one unfinished paragraph
#[tokio::test]
async fn test_multi_paragraph_document_reaches_expected_markers() {
    let mut doc = Document::from_paragraphs(fixtures::MULTI_PARAGRAPH_TEXT.lines()).expect("Failed to build document");
    let mut session = attach(&doc);
    let clock = ManualClock::new();

    session.scan(&mut doc, clock.now());
    session.on_document_change(&mut doc, clock.now());
    let report = session.run_until_quiescent(&mut doc, &clock).await;

    let markers: Vec<(String, String)> = session
        .markers(&doc)
        .into_iter()
        .map(|marker| (marker.original_word, marker.replacement))
        .collect();
    let expected: Vec<(String, String)> = fixtures::MULTI_PARAGRAPH_MARKERS
        .iter()
        .map(|(word, replacement)| (word.to_string(), replacement.to_string()))
        .collect();
    assert_eq!(markers, expected);
    assert!(report.idle_fired, "Unfinished paragraph should wait for the idle timer");

    // Markers never change the visible text
    assert_eq!(doc.full_text(), fixtures::MULTI_PARAGRAPH_TEXT);
}

/// Test that accepting every suggestion yields the rewritten text
#[tokio::test]
async fn test_accepting_all_suggestions() {
    let mut doc = Document::from_paragraphs(fixtures::MULTI_PARAGRAPH_TEXT.lines()).expect("Failed to build document");
    let mut session = attach(&doc);
    let clock = ManualClock::new();

    session.scan(&mut doc, clock.now());
    session.on_document_change(&mut doc, clock.now());
    session.run_until_quiescent(&mut doc, &clock).await;

    for marker in session.markers(&doc) {
        session.confirm_replacement(&mut doc, marker.key).expect("Failed to confirm marker");
    }

    assert_eq!(doc.full_text(), fixtures::MULTI_PARAGRAPH_APPLIED);
    assert_eq!(session.replacements().len(), fixtures::MULTI_PARAGRAPH_MARKERS.len());
    assert!(session.markers(&doc).is_empty());

    // Indexes are relative to each sentence, not the block
    let indexes: Vec<usize> = session.replacements().iter().map(|r| r.relative_index).collect();
    assert_eq!(indexes, vec![0, 6, 0, 0]);
}

/// Test typing a sentence one character at a time
#[test]
fn test_incremental_typing_triggers_on_terminator() {
    let mut doc = Document::new();
    let (block, text) = doc.update(|tx| {
        let block = tx.append_block(wordrefine::ElementKind::Paragraph).unwrap();
        let text = tx.append_text(block, "").unwrap();
        (block, text)
    });
    let mut session = attach(&doc);

    let typed = fixtures::SIMPLE_TEXT;
    let mut now = ms(0);
    let mut last_trigger = None;
    for (i, ch) in typed.chars().enumerate() {
        doc.update(|tx| tx.insert_text(text, i, &ch.to_string())).unwrap();
        now += ms(150);
        last_trigger = Some(session.on_document_change(&mut doc, now));
        session.tick(&mut doc, now);
    }

    assert_eq!(last_trigger, Some(Trigger::Terminator { scheduled: 1 }));
    assert_eq!(doc.text_content(block), typed);

    let report = session.tick(&mut doc, now + ms(500));
    assert_eq!(report.marked(), 1);
    assert_eq!(session.markers(&doc)[0].original_word, "커피");
}

/// Test that a pending match survives edits elsewhere in the document
#[test]
fn test_edit_in_other_block_keeps_pending_match() {
    let mut doc = Document::from_paragraphs(["첫 문장. 오늘 커피를 마셨다."]).unwrap();
    let mut session = attach(&doc);
    session.on_document_change(&mut doc, ms(0));

    doc.update(|tx| {
        let block = tx.append_block(wordrefine::ElementKind::Paragraph).unwrap();
        tx.append_text(block, "새 문단").unwrap();
    });
    session.on_document_change(&mut doc, ms(100));

    let report = session.tick(&mut doc, ms(500));
    assert_eq!(report.marked(), 1);
    let block = doc.blocks()[0];
    let marker = doc.text_spans(block).into_iter().find(|span| span.is_marker).unwrap();
    assert_eq!((marker.start, marker.end), (9, 11));
}

/// Test that deleting the sentence drops its pending matches quietly
#[test]
fn test_deleted_block_drops_pending_matches() {
    let mut doc = Document::from_paragraphs([fixtures::SIMPLE_TEXT]).unwrap();
    let mut session = attach(&doc);
    session.on_document_change(&mut doc, ms(0));

    let block = doc.blocks()[0];
    doc.update(|tx| tx.remove(block)).unwrap();

    let report = session.tick(&mut doc, ms(1000));
    assert_eq!(report.outcomes.len(), 1);
    assert!(matches!(report.outcomes[0], RewriteOutcome::Stale(_)));
    assert_eq!(session.state().in_flight_count(), 0);
}

/// Test that listeners see marker insertions as committed changes
#[test]
fn test_listeners_observe_rewrites() {
    let mut doc = Document::from_paragraphs([fixtures::SIMPLE_TEXT]).unwrap();
    let revisions = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&revisions);
    doc.subscribe(move |change| seen.borrow_mut().push(change.revision));

    let mut session = attach(&doc);
    session.on_document_change(&mut doc, ms(0));
    assert!(revisions.borrow().is_empty(), "Tagging should not count as a content change");

    session.tick(&mut doc, ms(500));
    assert_eq!(revisions.borrow().len(), 1, "One rewrite is one transaction");
}

/// Test that the same seed reproduces the same delivery order
#[tokio::test]
async fn test_seeded_jitter_is_reproducible() {
    async fn delivery_order(seed: u64) -> Vec<String> {
        let config = SessionConfig {
            jitter_seed: Some(seed),
            ..SessionConfig::default()
        };
        let mut scheduler = Scheduler::from_config(&config);
        let segmenter = SentenceSegmenter::with_default_terminators().unwrap();
        let trie = dictionary_trie();
        let sentence = &segmenter.split("커피와 인터넷과 컴퓨터와 이메일.")[0];

        scheduler.register_sentence(
            ScheduledSentence {
                block: wordrefine::NodeKey::from_raw(1),
                stable_key: sentence.stable_key.clone(),
                identity: SentenceId::new(0),
                start: sentence.start,
                end: sentence.end,
            },
            trie.find_all_matches(&sentence.text),
            Duration::ZERO,
        );

        let clock = ManualClock::new();
        scheduler
            .deliveries(&clock)
            .map(|delivery| delivery.matched.word)
            .collect()
            .await
    }

    let first = delivery_order(7).await;
    assert_eq!(first.len(), 4);
    assert_eq!(first, delivery_order(7).await);
}
