//! Row cursor implementations over in-memory and chunk-fetching sources.

use rowgraph_core::{Result, Row, RowCursor};
use std::collections::VecDeque;

/// Cursor over rows already in memory.
#[derive(Debug, Default)]
pub struct VecCursor {
    rows: VecDeque<Row>,
    closed: bool,
}

impl VecCursor {
    /// Create a cursor over the given rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into(),
            closed: false,
        }
    }

    /// Whether the cursor has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl RowCursor for VecCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) {
        self.rows.clear();
        self.closed = true;
    }
}

/// Source that yields rows in chunks, typically a driver statement.
pub trait RowSource {
    /// Fetch up to `max` rows. An empty batch means end of stream.
    fn fetch(&mut self, max: usize) -> Result<Vec<Row>>;

    /// Release the underlying statement. Idempotent.
    fn close(&mut self);
}

/// Adapts a chunk-fetching [`RowSource`] to the pull-one [`RowCursor`]
/// contract, buffering one batch at a time.
pub struct FetchCursor<S: RowSource> {
    source: S,
    fetch_size: usize,
    buffer: VecDeque<Row>,
    exhausted: bool,
    closed: bool,
}

impl<S: RowSource> FetchCursor<S> {
    /// Wrap a source with the given batch size (clamped to at least 1).
    pub fn new(source: S, fetch_size: usize) -> Self {
        Self {
            source,
            fetch_size: fetch_size.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
            closed: false,
        }
    }
}

impl<S: RowSource> RowCursor for FetchCursor<S> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        if self.buffer.is_empty() && !self.exhausted {
            let batch = self.source.fetch(self.fetch_size)?;
            if batch.is_empty() {
                self.exhausted = true;
            } else {
                self.buffer.extend(batch);
            }
        }
        Ok(self.buffer.pop_front())
    }

    fn close(&mut self) {
        if !self.closed {
            self.source.close();
            self.buffer.clear();
            self.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::Value;

    fn row(id: i64) -> Row {
        Row::from_pairs(vec![("id", Value::Int(id))])
    }

    struct ChunkSource {
        remaining: Vec<Row>,
        fetches: usize,
        closed: bool,
    }

    impl RowSource for ChunkSource {
        fn fetch(&mut self, max: usize) -> Result<Vec<Row>> {
            self.fetches += 1;
            let take = max.min(self.remaining.len());
            Ok(self.remaining.drain(..take).collect())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn vec_cursor_drains_then_ends() {
        let mut cursor = VecCursor::new(vec![row(1), row(2)]);
        assert!(cursor.next_row().unwrap().is_some());
        assert!(cursor.next_row().unwrap().is_some());
        assert!(cursor.next_row().unwrap().is_none());

        cursor.close();
        assert!(cursor.is_closed());
        assert!(cursor.next_row().unwrap().is_none());
    }

    #[test]
    fn fetch_cursor_batches() {
        let source = ChunkSource {
            remaining: (0..5).map(row).collect(),
            fetches: 0,
            closed: false,
        };
        let mut cursor = FetchCursor::new(source, 2);

        let mut seen = 0;
        while cursor.next_row().unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 5);

        cursor.close();
        assert!(cursor.source.closed);
        // 2 + 2 + 1, plus the empty batch that signals exhaustion.
        assert_eq!(cursor.source.fetches, 4);
    }

    #[test]
    fn fetch_cursor_close_is_idempotent() {
        let source = ChunkSource {
            remaining: vec![row(1)],
            fetches: 0,
            closed: false,
        };
        let mut cursor = FetchCursor::new(source, 8);
        cursor.close();
        cursor.close();
        assert!(cursor.next_row().unwrap().is_none());
        assert_eq!(cursor.source.fetches, 0);
    }
}
