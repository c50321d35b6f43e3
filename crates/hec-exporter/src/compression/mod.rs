use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use flate2::{Compress, Compression, Crc, FlushCompress, Status};

/// Bodies up to one Ethernet frame are sent as-is.
pub const COMPRESSION_THRESHOLD: usize = 1500;

/// Idle engines kept around once returned to the pool.
const MAX_IDLE_ENGINES: usize = 16;

/// Minimal gzip member header: no name, no mtime, unknown OS.
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xff];

const OUTPUT_STEP: usize = 4096;

/// Whether a body of `len` bytes goes out gzip-compressed.
pub fn should_compress(len: usize, disable_compression: bool) -> bool {
    !disable_compression && len > COMPRESSION_THRESHOLD
}

/// A reusable gzip compressor.
///
/// Each `compress` call produces one complete gzip member. The deflate state
/// is reset, not reallocated, between members.
pub struct GzipEngine {
    deflate: Compress,
    crc: Crc,
    out: Vec<u8>,
}

impl GzipEngine {
    pub fn new(level: Compression) -> Self {
        Self {
            deflate: Compress::new(level, false),
            crc: Crc::new(),
            out: Vec::new(),
        }
    }

    /// Discard any partial member and start a new one.
    pub fn reset(&mut self) {
        self.deflate.reset();
        self.crc.reset();
        self.out.clear();
        self.out.extend_from_slice(&GZIP_HEADER);
    }

    /// Feed more uncompressed bytes into the current member.
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.crc.update(data);
        self.run(data, false)
    }

    /// Flush the deflate stream, write the trailer and hand back the member.
    /// The engine must be reset before it is used again.
    pub fn finish(&mut self) -> io::Result<Bytes> {
        self.run(&[], true)?;
        let (sum, amount) = (self.crc.sum(), self.crc.amount());
        self.out.extend_from_slice(&sum.to_le_bytes());
        self.out.extend_from_slice(&amount.to_le_bytes());
        Ok(Bytes::from(std::mem::take(&mut self.out)))
    }

    /// Compress `data` as a single gzip member.
    pub fn compress(&mut self, data: &[u8]) -> io::Result<Bytes> {
        self.reset();
        self.append(data)?;
        self.finish()
    }

    fn run(&mut self, mut input: &[u8], finish: bool) -> io::Result<()> {
        let flush = if finish {
            FlushCompress::Finish
        } else {
            FlushCompress::None
        };
        loop {
            if self.out.capacity() - self.out.len() < OUTPUT_STEP / 4 {
                self.out.reserve(OUTPUT_STEP.max(input.len() / 2));
            }
            let before = self.deflate.total_in();
            let status = self
                .deflate
                .compress_vec(input, &mut self.out, flush)
                .map_err(io::Error::other)?;
            let consumed = (self.deflate.total_in() - before) as usize;
            input = &input[consumed..];

            match status {
                Status::StreamEnd => return Ok(()),
                _ if !finish && input.is_empty() => return Ok(()),
                Status::BufError => self.out.reserve(OUTPUT_STEP),
                Status::Ok => {}
            }
        }
    }
}

/// Concurrency-safe pool of gzip engines.
///
/// Any idle engine can serve any caller; engines come back reset-on-acquire,
/// so nothing from a previous borrower is observable.
pub struct CompressorPool {
    idle: Mutex<Vec<GzipEngine>>,
    level: Compression,
}

impl CompressorPool {
    pub fn new(level: Compression) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            level,
        }
    }

    /// Borrow an engine; it goes back to the pool when the guard drops.
    pub fn acquire(&self) -> PooledEngine<'_> {
        let idle = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let mut engine = idle.unwrap_or_else(|| GzipEngine::new(self.level));
        engine.reset();
        PooledEngine {
            pool: self,
            engine: Some(engine),
        }
    }

    /// Number of engines currently waiting to be borrowed.
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, engine: GzipEngine) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_ENGINES {
            idle.push(engine);
        }
    }
}

impl Default for CompressorPool {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

/// Scoped borrow of a [`GzipEngine`].
pub struct PooledEngine<'a> {
    pool: &'a CompressorPool,
    engine: Option<GzipEngine>,
}

impl Deref for PooledEngine<'_> {
    type Target = GzipEngine;

    fn deref(&self) -> &GzipEngine {
        self.engine.as_ref().expect("engine is only taken on drop")
    }
}

impl DerefMut for PooledEngine<'_> {
    fn deref_mut(&mut self) -> &mut GzipEngine {
        self.engine.as_mut().expect("engine is only taken on drop")
    }
}

impl Drop for PooledEngine<'_> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.release(engine);
        }
    }
}
