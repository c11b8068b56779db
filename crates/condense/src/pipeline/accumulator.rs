//! Token budget accumulation: decides per chunk whether the pending batch
//! can still absorb it or must be flushed first.
//!
//! The threshold test is a strict would-exceed check run *before* a chunk is
//! admitted, never after. That keeps every request under the backend's hard
//! ceiling including the seed prompt and the carried-over summary. The one
//! exception is the final chunk of a document, which always forces a flush —
//! the job terminates even when the last chunk alone would bust a naive
//! per-chunk budget.

use super::job::JobState;

/// One unit of source text with a known token cost. Immutable once
/// produced; consumed exactly once, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the document's chunk sequence, starting at 0.
    pub sequence_index: usize,
    /// Chunk text, possibly already reduced by the relevance filter. May be
    /// empty — an empty chunk still counts toward progress at zero cost.
    pub text: String,
    /// Estimated cost in the backend's accounting units.
    pub token_cost: u32,
}

impl Chunk {
    pub fn new(sequence_index: usize, text: impl Into<String>, token_cost: u32) -> Self {
        Self {
            sequence_index,
            text: text.into(),
            token_cost,
        }
    }
}

/// What the accumulator decided for one offered chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The chunk fits: it was appended to the pending batch.
    Append,
    /// The pending batch must be flushed first. The offered chunk was NOT
    /// appended — it opens the next accumulation window after the flush.
    FlushThenAppend,
    /// This was the document's last chunk: it was appended, and a flush is
    /// forced regardless of the threshold.
    FlushThenDone,
}

/// Per-chunk admission control against a fixed flush threshold.
#[derive(Debug, Clone, Copy)]
pub struct BudgetAccumulator {
    flush_threshold: u32,
}

impl BudgetAccumulator {
    pub fn new(flush_threshold: u32) -> Self {
        Self { flush_threshold }
    }

    /// Offer one chunk, in sequence order.
    ///
    /// Always consumes the chunk for progress accounting (`chunks_done`
    /// advances on every offer). On [`Decision::Append`] and
    /// [`Decision::FlushThenDone`] the chunk's message is appended to the
    /// pending batch in place; on [`Decision::FlushThenAppend`] the caller
    /// must append it after resetting the window.
    pub fn offer(&self, state: &mut JobState, chunk: &Chunk) -> Decision {
        let projected = state.token_sum.saturating_add(chunk.token_cost);
        let is_last = state.chunks_done + 1 == state.chunks_total;
        state.chunks_done += 1;

        if is_last {
            state.append_chunk(chunk);
            Decision::FlushThenDone
        } else if projected >= self.flush_threshold {
            Decision::FlushThenAppend
        } else {
            state.append_chunk(chunk);
            Decision::Append
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenEstimator;

    fn make_state(seed_cost_chars: usize, chunks_total: usize) -> JobState {
        // Default ratio is 3.5 chars/token, so 35 chars => cost 10.
        let seed = "x".repeat(seed_cost_chars);
        JobState::new(&seed, &TokenEstimator::default(), chunks_total)
    }

    fn chunk(index: usize, cost: u32) -> Chunk {
        Chunk::new(index, "c".repeat(cost as usize * 35 / 10), cost)
    }

    #[test]
    fn three_chunks_under_threshold_forced_final_flush() {
        // Costs [100, 100, 100], threshold 250, seed cost 10.
        let mut state = make_state(35, 3);
        let acc = BudgetAccumulator::new(250);
        assert_eq!(state.token_sum, 10);

        assert_eq!(acc.offer(&mut state, &chunk(0, 100)), Decision::Append);
        assert_eq!(state.token_sum, 110);
        assert_eq!(acc.offer(&mut state, &chunk(1, 100)), Decision::Append);
        assert_eq!(state.token_sum, 210);

        // Last chunk: appended first, then an unconditional flush.
        assert_eq!(
            acc.offer(&mut state, &chunk(2, 100)),
            Decision::FlushThenDone
        );
        assert_eq!(state.token_sum, 310);
        assert_eq!(state.chunks_done, 3);
        assert_eq!(state.pending_messages.len(), 4); // seed + 3 chunks
    }

    #[test]
    fn last_chunk_forces_flush_even_over_threshold() {
        // Costs [200, 200], threshold 250, seed cost 10: the second chunk
        // projects to 410 >= 250, but being last it is appended and flushed
        // rather than deferred.
        let mut state = make_state(35, 2);
        let acc = BudgetAccumulator::new(250);

        assert_eq!(acc.offer(&mut state, &chunk(0, 200)), Decision::Append);
        assert_eq!(state.token_sum, 210);
        assert_eq!(
            acc.offer(&mut state, &chunk(1, 200)),
            Decision::FlushThenDone
        );
        assert_eq!(state.token_sum, 410);
    }

    #[test]
    fn over_threshold_defers_the_offered_chunk() {
        let mut state = make_state(35, 3);
        let acc = BudgetAccumulator::new(150);

        assert_eq!(acc.offer(&mut state, &chunk(0, 100)), Decision::Append);
        let before = state.token_sum;
        let messages_before = state.pending_messages.len();

        // Projected 210 >= 150: flush what's accumulated, defer this chunk.
        assert_eq!(
            acc.offer(&mut state, &chunk(1, 100)),
            Decision::FlushThenAppend
        );
        assert_eq!(state.token_sum, before, "deferred chunk must not be admitted");
        assert_eq!(state.pending_messages.len(), messages_before);
        assert_eq!(state.chunks_done, 2, "deferred chunk still counts as consumed");
    }

    #[test]
    fn exact_threshold_triggers_flush() {
        // >= comparison: projecting exactly to the threshold flushes.
        let mut state = make_state(35, 3);
        let acc = BudgetAccumulator::new(110);
        assert_eq!(
            acc.offer(&mut state, &chunk(0, 100)),
            Decision::FlushThenAppend
        );
    }

    #[test]
    fn empty_chunk_is_consumed_at_zero_cost() {
        let mut state = make_state(35, 3);
        let acc = BudgetAccumulator::new(250);

        let empty = Chunk::new(0, "", 0);
        assert_eq!(acc.offer(&mut state, &empty), Decision::Append);
        assert_eq!(state.token_sum, 10);
        assert_eq!(state.chunks_done, 1);
    }

    #[test]
    fn token_sum_matches_pending_messages() {
        let est = TokenEstimator::default();
        let mut state = make_state(35, 4);
        let acc = BudgetAccumulator::new(1_000);

        for i in 0..3 {
            acc.offer(&mut state, &chunk(i, 50));
        }
        assert_eq!(state.token_sum, est.cost_of_messages(&state.pending_messages));
    }

    #[test]
    fn single_chunk_document_is_immediately_final() {
        let mut state = make_state(35, 1);
        let acc = BudgetAccumulator::new(250);
        assert_eq!(
            acc.offer(&mut state, &chunk(0, 5)),
            Decision::FlushThenDone
        );
    }
}
