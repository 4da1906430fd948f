// WHY: Turns a delivered match into a marker span in the live tree
// The tree may have changed since the match was computed; every step re-reads it

use anyhow::Result;
use tracing::{debug, warn};

use crate::document::{Document, MarkerSpan, NodeKey, NodeKind, SelectionPoint, SpanNode, TextSpan, Transaction};
use crate::error::SessionError;
use crate::scheduler::Delivery;
use crate::state::SentenceId;

/// Why a delivered match was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The sentence's block is gone
    BlockRemoved,
    /// No text-bearing span covers the match start any more
    SpanMissing,
    /// The covering span no longer holds the matched word
    TextChanged,
    /// The word now straddles a span boundary
    CrossesSpan,
    /// The start falls inside a marker that is not this match
    OverlapsMarker,
    /// The document does not accept marker spans
    MarkerUnsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    Marked {
        marker: NodeKey,
        before: Option<NodeKey>,
        after: Option<NodeKey>,
    },
    /// An identical marker already covers the match
    AlreadyMarked(NodeKey),
    Stale(StaleReason),
}

impl RewriteOutcome {
    pub fn is_marked(&self) -> bool {
        matches!(self, RewriteOutcome::Marked { .. })
    }
}

/// The pieces a text span was cut into around a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitParts {
    pub before: Option<NodeKey>,
    pub marker: NodeKey,
    pub after: Option<NodeKey>,
}

/// Where a caret that sat at `offset` in the original span ends up
///
/// `rel_start..rel_end` is the matched range inside the original span. The after-span
/// begins at `rel_end`, so offsets past the match are re-based there.
pub fn remap_selection(offset: usize, rel_start: usize, rel_end: usize, parts: SplitParts) -> SelectionPoint {
    let match_len = rel_end - rel_start;

    if offset <= rel_start {
        return match parts.before {
            Some(before) => SelectionPoint::new(before, offset),
            None => SelectionPoint::new(parts.marker, 0),
        };
    }

    if offset >= rel_end {
        return match parts.after {
            Some(after) => SelectionPoint::new(after, offset - rel_end),
            None => SelectionPoint::new(parts.marker, match_len),
        };
    }

    match (parts.after, parts.before) {
        (Some(after), _) => SelectionPoint::new(after, 0),
        (None, Some(before)) => SelectionPoint::new(before, rel_start),
        (None, None) => SelectionPoint::new(parts.marker, match_len),
    }
}

/// Revalidate one delivered match and mark it, inside a single transaction
pub fn apply_delivery(doc: &mut Document, delivery: &Delivery) -> RewriteOutcome {
    doc.update(|tx| rewrite_in(tx, delivery))
}

fn rewrite_in(tx: &mut Transaction<'_>, delivery: &Delivery) -> RewriteOutcome {
    let block = delivery.sentence.block;
    if !tx.contains(block) {
        return RewriteOutcome::Stale(StaleReason::BlockRemoved);
    }

    let abs_start = delivery.absolute_start();
    let abs_end = delivery.absolute_end();
    let spans = tx.text_spans_in_range(block, delivery.sentence.start, delivery.sentence.end);

    let Some(span) = spans.iter().find(|span| span.contains(abs_start)).copied() else {
        return RewriteOutcome::Stale(StaleReason::SpanMissing);
    };

    if span.is_marker {
        let same_word = tx
            .marker(span.key)
            .is_some_and(|marker| marker.original_word == delivery.matched.word);
        return if span.start == abs_start && span.end == abs_end && same_word {
            RewriteOutcome::AlreadyMarked(span.key)
        } else {
            RewriteOutcome::Stale(StaleReason::OverlapsMarker)
        };
    }

    if abs_end > span.end {
        return RewriteOutcome::Stale(StaleReason::CrossesSpan);
    }

    let rel_start = abs_start - span.start;
    let rel_end = abs_end - span.start;
    let still_matches = tx.text_span(span.key).is_some_and(|text| {
        let live: String = text.text.chars().skip(rel_start).take(rel_end - rel_start).collect();
        live == delivery.matched.word
    });
    if !still_matches {
        return RewriteOutcome::Stale(StaleReason::TextChanged);
    }

    // Transactions have no rollback: everything split_and_mark relies on is checked above
    if !tx.has_kind(NodeKind::Marker) {
        return RewriteOutcome::Stale(StaleReason::MarkerUnsupported);
    }

    match split_and_mark(tx, span.key, rel_start, rel_end, delivery) {
        Ok(parts) => RewriteOutcome::Marked {
            marker: parts.marker,
            before: parts.before,
            after: parts.after,
        },
        Err(e) => {
            warn!("Dropping match {:?}: {}", delivery.matched.word, e);
            RewriteOutcome::Stale(StaleReason::SpanMissing)
        }
    }
}

fn split_and_mark(
    tx: &mut Transaction<'_>,
    key: NodeKey,
    rel_start: usize,
    rel_end: usize,
    delivery: &Delivery,
) -> Result<SplitParts> {
    let caret = tx.selection().filter(|selection| selection.key == key);
    let len = tx.node(key).and_then(SpanNode::text_len).unwrap_or(0);

    let mut target = key;
    let mut before = None;
    let mut after = None;

    if rel_start > 0 {
        let (head, tail) = tx.split_text(target, rel_start)?;
        before = Some(head);
        target = tail;
    }

    if rel_end < len {
        let (matched, rest) = tx.split_text(target, rel_end - rel_start)?;
        target = matched;
        after = Some(rest);
    }

    let marker = tx.replace(
        target,
        SpanNode::Marker(MarkerSpan {
            original_word: delivery.matched.word.clone(),
            replacement: delivery.matched.replacement.clone(),
            sentence: delivery.sentence.identity,
        }),
    )?;

    let parts = SplitParts { before, marker, after };
    if let Some(caret) = caret {
        tx.set_selection(Some(remap_selection(caret.offset, rel_start, rel_end, parts)));
    }

    debug!(
        word = %delivery.matched.word,
        replacement = %delivery.matched.replacement,
        %marker,
        "Marked foreign word"
    );
    Ok(parts)
}

/// Result of accepting a marker's suggestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedReplacement {
    /// Text span now holding the replacement
    pub node: NodeKey,
    pub block: NodeKey,
    pub original_word: String,
    pub replacement: String,
    pub sentence: SentenceId,
    /// Block-relative offset the marker started at
    pub absolute_offset: usize,
    /// Block text as it read before the replacement
    pub block_text_before: String,
}

/// Swap a marker for a plain text span carrying its replacement
pub fn replace_marker(doc: &mut Document, marker_key: NodeKey) -> Result<ConfirmedReplacement> {
    doc.update(|tx| -> Result<ConfirmedReplacement> {
        if !tx.contains(marker_key) {
            return Err(SessionError::UnknownNode(marker_key).into());
        }
        let marker = tx.marker(marker_key).cloned().ok_or(SessionError::NotAMarker(marker_key))?;
        let block = tx.block_of(marker_key).ok_or(SessionError::UnknownNode(marker_key))?;
        let block_text_before = tx.text_content(block);
        let absolute_offset = tx
            .text_spans(block)
            .into_iter()
            .find(|span| span.key == marker_key)
            .map_or(0, |span| span.start);

        let node = tx.replace(
            marker_key,
            SpanNode::Text(TextSpan {
                text: marker.replacement.clone(),
                sentence: Some(marker.sentence),
            }),
        )?;

        Ok(ConfirmedReplacement {
            node,
            block,
            original_word: marker.original_word,
            replacement: marker.replacement,
            sentence: marker.sentence,
            absolute_offset,
            block_text_before,
        })
    })
}
