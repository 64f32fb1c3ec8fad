//! COBS framer and the double-buffered log sink.
//!
//! Mirrors `IMU_G3/sd.h` + the `WriteRawDataToSDCard`/
//! `WriteCalibratedDataToSDCard` staging-buffer loop in `main.c`: every
//! encoded frame is appended byte-by-byte to a fixed staging buffer,
//! flushing to the storage sink whenever the buffer fills, with a
//! trailing zero delimiter written after each frame.

use crate::cobs;
use crate::config::{CAL_CHUNK_LEN, LOG_BUFFER_SIZE, RAW_CHUNK_1_LEN, RAW_CHUNK_2_LEN};
use crate::frame::RawFrame;
use crate::pipeline::ProcessedRecord;

/// The filesystem boundary: mass storage mount/open/close/read/write,
/// matching `IMU_G3/sd.h`'s `SDFileOpenWrite`/`SDFileOpenRead`/
/// `SDCloseFile`/`SDWrite`/`SDRead`/`IsFileOpen` one-for-one. The
/// concrete filesystem (and its block device) is an external
/// collaborator; this crate only ever calls through the trait.
pub trait StorageSink {
    type Error;

    /// Opens `LOG_FILE_NAME` for writing. `truncate` selects overwrite
    /// (`true`) vs. append (`false`), per the DAQ-control overwrite bit.
    fn open_write(&mut self, truncate: bool) -> Result<(), Self::Error>;
    /// Opens `LOG_FILE_NAME` for reading, from the start.
    fn open_read(&mut self) -> Result<(), Self::Error>;
    /// Closes whatever file is currently open. A no-op if none is.
    fn close(&mut self) -> Result<(), Self::Error>;
    /// Appends `data` to the open file.
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;
    /// Reads up to `buf.len()` bytes, returning the count actually read.
    /// A short read (less than `buf.len()`) signals end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
    fn is_open(&self) -> bool;
}

/// Encodes raw frames and processed records into the on-wire COBS
/// stream and stages the result for the storage sink, flushing whenever
/// the staging buffer fills. One [`LogSink`] lives for the process
/// lifetime; it is reused across BulkLogWrite sessions.
pub struct LogSink {
    staging: [u8; LOG_BUFFER_SIZE],
    len: usize,
}

impl LogSink {
    pub const fn new() -> Self {
        LogSink {
            staging: [0; LOG_BUFFER_SIZE],
            len: 0,
        }
    }

    /// Appends `bytes` to the staging buffer, flushing to `storage`
    /// whenever it fills, exactly as the original firmware's per-byte
    /// loop does. A storage error aborts the remainder of this append
    /// and is propagated; already-staged bytes before the error are not
    /// un-staged (the original firmware doesn't retry either).
    fn stage<S: StorageSink>(&mut self, storage: &mut S, bytes: &[u8]) -> Result<(), S::Error> {
        for &b in bytes {
            if self.len >= LOG_BUFFER_SIZE {
                storage.write(&self.staging[..self.len])?;
                self.len = 0;
            }
            self.staging[self.len] = b;
            self.len += 1;
        }
        Ok(())
    }

    /// Flushes any partially filled staging buffer to `storage`. Called
    /// when closing the log file so the tail of the stream isn't lost.
    pub fn flush<S: StorageSink>(&mut self, storage: &mut S) -> Result<(), S::Error> {
        if self.len > 0 {
            storage.write(&self.staging[..self.len])?;
            self.len = 0;
        }
        Ok(())
    }

    /// Encodes and stages one raw frame as two independent COBS frames
    /// (chunk 1: timestamp + sensors `[0, 17)`; chunk 2: sensors
    /// `[17, 32)`), each terminated by its own zero delimiter.
    pub fn write_raw_frame<S: StorageSink>(
        &mut self,
        storage: &mut S,
        frame: &RawFrame,
    ) -> Result<(), S::Error> {
        let mut payload1 = [0u8; RAW_CHUNK_1_LEN];
        frame.write_chunk1(&mut payload1);
        let mut encoded1 = [0u8; RAW_CHUNK_1_LEN + cobs::ENCODED_OVERHEAD];
        let n1 = cobs::encode(&payload1, &mut encoded1).expect("buffer sized for payload");
        self.stage(storage, &encoded1[..n1])?;
        self.stage(storage, &[0])?;

        let mut payload2 = [0u8; RAW_CHUNK_2_LEN];
        frame.write_chunk2(&mut payload2);
        let mut encoded2 = [0u8; RAW_CHUNK_2_LEN + cobs::ENCODED_OVERHEAD];
        let n2 = cobs::encode(&payload2, &mut encoded2).expect("buffer sized for payload");
        self.stage(storage, &encoded2[..n2])?;
        self.stage(storage, &[0])?;
        Ok(())
    }

    /// Encodes and stages one processed record as a single COBS frame.
    pub fn write_calibrated_record<S: StorageSink>(
        &mut self,
        storage: &mut S,
        record: &ProcessedRecord,
    ) -> Result<(), S::Error> {
        let mut payload = [0u8; CAL_CHUNK_LEN];
        record.write_cal_chunk(&mut payload);
        let mut encoded = [0u8; CAL_CHUNK_LEN + cobs::ENCODED_OVERHEAD];
        let n = cobs::encode(&payload, &mut encoded).expect("buffer sized for payload");
        self.stage(storage, &encoded[..n])?;
        self.stage(storage, &[0])
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}
