use crate::errors::Result;

use super::{BatchSource, RecordBatch};

/// Iterator over every record of a decoder, copied out of its batch.
///
/// Each batch is released before the next one is requested, so a single
/// arena is held at a time. Stops after the first error.
pub struct Records<S> {
    decoder: S,
    batch: Option<RecordBatch>,
    pos: usize,
    done: bool,
}

impl<S: BatchSource> Records<S> {
    pub(crate) fn new(decoder: S) -> Self {
        Self { decoder, batch: None, pos: 0, done: false }
    }

    /// Get the underlying decoder.
    pub fn decoder(&self) -> &S {
        &self.decoder
    }
}

impl<S: BatchSource> Iterator for Records<S> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = &self.batch {
                if self.pos < batch.len() {
                    let record = batch.record(self.pos).to_vec();
                    self.pos += 1;
                    return Some(Ok(record));
                }
            }
            if self.done {
                return None;
            }

            self.batch = None;
            self.pos = 0;
            match self.decoder.next_batch() {
                Ok(Some(batch)) => {
                    self.done = batch.is_final();
                    self.batch = Some(batch);
                }
                Ok(None) => {
                    self.done = true;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
