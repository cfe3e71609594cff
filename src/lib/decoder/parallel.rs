//! Multi-threaded decoder.
//!
//! Every worker runs the same loop:
//!
//! 1. Check out a compressed and a decompressed block slot.
//! 2. Under the reader lock, read the next block and assign its sequence
//!    number. Slots are taken first so every numbered block can finish.
//! 3. Inflate with a pooled engine, held only for that call.
//! 4. Insert the block into the reorder buffer.
//! 5. Try to take the framing lock. The holder frames ready blocks in
//!    sequence order, sends full arenas to the consumer and, after releasing
//!    the lock, checks again for blocks that arrived meanwhile.
//!
//! The first error is sent to the consumer, all pools are closed and the
//! workers wind down. Dropping the decoder does the same and joins them.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};
use parking_lot::Mutex;

use crate::arena::PackingArena;
use crate::block::CompressedBlock;
use crate::errors::{DecodeError, Result};
use crate::header::RawHeader;
use crate::inflate::{DecompressedBlock, Inflater};
use crate::pool::{BoundedPool, Pooled};
use crate::reorder_buffer::ReorderBuffer;

use super::packer::Packer;
use super::{BatchSource, DecoderOptions, RecordBatch};

/// Messages from the framing stage to the consumer.
enum Delivery {
    Header(RawHeader),
    Batch(RecordBatch),
}

struct Input {
    reader: Box<dyn BufRead + Send>,
    next_seq: u64,
    exhausted: bool,
}

struct FramingStage {
    packer: Packer,
    /// Block that filled an arena before it was fully framed.
    active: Option<Pooled<DecompressedBlock>>,
    header_sent: bool,
}

struct Shared {
    input: Mutex<Input>,
    compressed: BoundedPool<CompressedBlock>,
    decompressed: BoundedPool<DecompressedBlock>,
    engines: BoundedPool<Box<dyn Inflater>>,
    arenas: BoundedPool<PackingArena>,
    ready: Mutex<ReorderBuffer<Pooled<DecompressedBlock>>>,
    framing: Mutex<FramingStage>,
    framing_done: AtomicBool,
    aborted: AtomicBool,
    blocks_read: AtomicU64,
    verify_crc: bool,
}

fn aborted(what: &str) -> DecodeError {
    DecodeError::Aborted(format!("{what} pool closed"))
}

impl Shared {
    /// Record the first failure, tell the consumer and stop every worker.
    fn fail(&self, error: DecodeError, tx: &Sender<Result<Delivery>>) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            debug!("Decoding failed: {error}");
            let _ = tx.send(Err(error));
        }
        self.shutdown();
    }

    fn shutdown(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.input.lock().exhausted = true;
        self.compressed.close();
        self.decompressed.close();
        self.engines.close();
        self.arenas.close();
    }

    fn run_worker(&self, tx: &Sender<Result<Delivery>>) -> Result<()> {
        while !self.aborted.load(Ordering::SeqCst) {
            let Some(mut compressed) = self.compressed.acquire() else {
                return Ok(());
            };
            let Some(mut decompressed) = self.decompressed.acquire() else {
                return Ok(());
            };

            let (seq, has_block) = {
                let mut input = self.input.lock();
                if input.exhausted {
                    return Ok(());
                }
                let seq = input.next_seq;
                let has_block = match compressed.read_from(&mut input.reader, seq) {
                    Ok(has_block) => has_block,
                    Err(e) => {
                        input.exhausted = true;
                        return Err(e);
                    }
                };
                input.next_seq += 1;
                if !has_block || compressed.is_terminal() {
                    input.exhausted = true;
                }
                (seq, has_block)
            };

            if has_block {
                self.blocks_read.fetch_add(1, Ordering::Relaxed);
                let mut engine = self.engines.acquire().ok_or_else(|| aborted("engine"))?;
                decompressed.inflate_from(&compressed, &mut **engine, self.verify_crc)?;
            } else {
                warn!("Stream ended without an EOF marker block after {seq} blocks");
                decompressed.end_of_stream(seq);
            }
            drop(compressed);

            self.ready.lock().insert(seq, decompressed);
            self.drain(tx)?;
        }
        Ok(())
    }

    /// Frame ready blocks if no other worker is doing so.
    fn drain(&self, tx: &Sender<Result<Delivery>>) -> Result<()> {
        loop {
            let Some(mut stage) = self.framing.try_lock() else {
                return Ok(());
            };
            self.frame_ready(&mut stage, tx)?;
            drop(stage);

            // A block may have arrived after the last check but before unlock
            if self.framing_done.load(Ordering::SeqCst) || !self.ready.lock().can_pop() {
                return Ok(());
            }
        }
    }

    fn frame_ready(&self, stage: &mut FramingStage, tx: &Sender<Result<Delivery>>) -> Result<()> {
        while !self.framing_done.load(Ordering::SeqCst) && !self.aborted.load(Ordering::SeqCst) {
            let mut block = match stage.active.take() {
                Some(block) => block,
                None => match self.ready.lock().try_pop_next() {
                    Some(block) => block,
                    None => return Ok(()),
                },
            };

            let batch = stage.packer.feed(&mut block)?;
            Self::send_header(stage, tx);
            if let Some(batch) = batch {
                stage.active = Some(block);
                if tx.send(Ok(Delivery::Batch(batch))).is_err() {
                    return Err(DecodeError::Aborted("consumer went away".to_string()));
                }
                continue;
            }

            if block.is_terminal() {
                let batch = stage.packer.finish()?;
                Self::send_header(stage, tx);
                self.framing_done.store(true, Ordering::SeqCst);
                let _ = tx.send(Ok(Delivery::Batch(batch)));
            }
        }
        Ok(())
    }

    fn send_header(stage: &mut FramingStage, tx: &Sender<Result<Delivery>>) {
        if stage.header_sent {
            return;
        }
        if let Some(header) = stage.packer.header() {
            stage.header_sent = true;
            let _ = tx.send(Ok(Delivery::Header(header.clone())));
        }
    }
}

/// Decoder running a fixed set of worker threads.
///
/// Batches are delivered in stream order. At most
/// [`DecoderOptions::arena_count`] batches exist at any time; holding them
/// stalls the workers until one is dropped.
pub struct ParallelDecoder {
    receiver: Option<Receiver<Result<Delivery>>>,
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    expect_header: bool,
    header: Option<RawHeader>,
    /// Batch received while waiting for the header.
    ready: Option<RecordBatch>,
    finished: bool,
}

impl ParallelDecoder {
    /// Start decoding `reader` with `options.threads` workers.
    ///
    /// # Errors
    ///
    /// Returns an error if `options` is invalid or a thread cannot be spawned.
    pub fn new<R>(reader: R, options: DecoderOptions) -> Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        options.validate()?;
        let workers = options.worker_count();
        let slots = options.block_slots();
        let arenas = options.arena_pool();

        let shared = Arc::new(Shared {
            input: Mutex::new(Input { reader: Box::new(reader), next_seq: 0, exhausted: false }),
            compressed: BoundedPool::with_items(slots, CompressedBlock::new),
            decompressed: BoundedPool::with_items(slots, DecompressedBlock::new),
            engines: BoundedPool::with_items(workers, || options.inflater.create()),
            arenas: arenas.clone(),
            ready: Mutex::new(ReorderBuffer::new()),
            framing: Mutex::new(FramingStage {
                packer: Packer::new(arenas, options.expect_header, options.keep_runs_together, true),
                active: None,
                header_sent: false,
            }),
            framing_done: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            blocks_read: AtomicU64::new(0),
            verify_crc: options.verify_crc,
        });

        // Arenas bound the batches in flight; one extra slot each for the header and an error
        let (tx, rx) = bounded(options.arena_count + 2);
        let mut decoder = Self {
            receiver: Some(rx),
            shared: Arc::clone(&shared),
            handles: Vec::with_capacity(workers),
            expect_header: options.expect_header,
            header: None,
            ready: None,
            finished: false,
        };

        for i in 0..workers {
            let shared = Arc::clone(&shared);
            let tx = tx.clone();
            let handle = thread::Builder::new()
                .name(format!("parbam-worker-{i}"))
                .spawn(move || {
                    if let Err(e) = shared.run_worker(&tx) {
                        shared.fail(e, &tx);
                    }
                })?;
            decoder.handles.push(handle);
        }
        debug!("Started {workers} decoding workers with {slots} block slots");

        Ok(decoder)
    }

    /// Receive the next message, translating a closed channel into an error.
    fn receive(&mut self) -> Result<Option<Delivery>> {
        if self.finished {
            return Ok(None);
        }
        let Some(receiver) = self.receiver.as_ref() else {
            return Ok(None);
        };
        match receiver.recv() {
            Ok(Ok(delivery)) => Ok(Some(delivery)),
            Ok(Err(e)) => {
                self.finished = true;
                Err(e)
            }
            Err(_) => {
                self.finished = true;
                Err(DecodeError::Aborted("workers stopped before the final batch".to_string()))
            }
        }
    }
}

impl BatchSource for ParallelDecoder {
    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if let Some(batch) = self.ready.take() {
            return Ok(Some(batch));
        }
        while let Some(delivery) = self.receive()? {
            match delivery {
                Delivery::Header(header) => self.header = Some(header),
                Delivery::Batch(batch) => {
                    if batch.is_final() {
                        self.finished = true;
                    }
                    return Ok(Some(batch));
                }
            }
        }
        Ok(None)
    }

    fn header(&mut self) -> Result<Option<&RawHeader>> {
        if !self.expect_header {
            return Ok(None);
        }
        while self.header.is_none() && self.ready.is_none() {
            match self.receive()? {
                Some(Delivery::Header(header)) => self.header = Some(header),
                Some(Delivery::Batch(batch)) => {
                    if batch.is_final() {
                        self.finished = true;
                    }
                    self.ready = Some(batch);
                }
                None => break,
            }
        }
        Ok(self.header.as_ref())
    }

    fn blocks_read(&self) -> u64 {
        self.shared.blocks_read.load(Ordering::Relaxed)
    }
}

impl Drop for ParallelDecoder {
    fn drop(&mut self) {
        // Unblock workers waiting on pools or on a full channel before joining
        self.shared.shutdown();
        drop(self.receiver.take());
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
