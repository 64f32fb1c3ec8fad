//! Decodes a `data.txt` bulk log stream written by `imu-core::framer::LogSink`.
//!
//! The stream is a flat sequence of zero-delimited COBS frames. Raw
//! frames are split across two chunks (`RAW_CHUNK_1_LEN`,
//! `RAW_CHUNK_2_LEN`); a calibrated record, when the output divider
//! publishes one, follows as a third, shorter frame
//! (`CAL_CHUNK_LEN`). The three lengths never collide, so a decoded
//! frame's length alone identifies which kind it is.

use imu_core::config::{CAL_CHUNK_LEN, NUM_SENSORS, RAW_CHUNK_1_LEN, RAW_CHUNK_1_SENSORS, RAW_CHUNK_2_LEN};
use imu_core::cobs;

#[derive(Debug)]
pub struct RawChunk1 {
    pub time_stamp: u32,
    pub sensors: [[i16; 7]; RAW_CHUNK_1_SENSORS],
}

#[derive(Debug)]
pub struct RawChunk2 {
    pub sensors: [[i16; 7]; NUM_SENSORS - RAW_CHUNK_1_SENSORS],
}

#[derive(Debug)]
pub struct CalibratedRecord {
    pub delta_theta: [f32; 3],
    pub delta_v: [f32; 3],
    pub accum_v: [f32; 3],
    pub attitude: [f32; 4],
    pub avg_temp_c: f32,
}

#[derive(Debug)]
pub enum Frame {
    Raw1(RawChunk1),
    Raw2(RawChunk2),
    Calibrated(CalibratedRecord),
}

#[derive(Debug)]
pub enum DecodeError {
    Cobs,
    UnexpectedLength(usize),
}

/// Splits `stream` on zero delimiters and decodes each non-empty frame,
/// skipping delimiter-only gaps. Stops at the first malformed frame and
/// reports how many bytes of `stream` were consumed successfully.
pub fn decode_stream(stream: &[u8]) -> (Vec<Frame>, usize) {
    let mut frames = Vec::new();
    let mut consumed = 0;
    for piece in stream.split(|&b| b == 0) {
        consumed += piece.len() + 1;
        if piece.is_empty() {
            continue;
        }
        match decode_frame(piece) {
            Ok(frame) => frames.push(frame),
            Err(_) => {
                consumed -= piece.len() + 1;
                break;
            }
        }
    }
    (frames, consumed.min(stream.len()))
}

fn decode_frame(encoded: &[u8]) -> Result<Frame, DecodeError> {
    let mut buf = vec![0u8; encoded.len()];
    let n = cobs::decode(encoded, &mut buf).ok_or(DecodeError::Cobs)?;
    let payload = &buf[..n];
    match n {
        RAW_CHUNK_1_LEN => Ok(Frame::Raw1(parse_raw_chunk1(payload))),
        RAW_CHUNK_2_LEN => Ok(Frame::Raw2(parse_raw_chunk2(payload))),
        CAL_CHUNK_LEN => Ok(Frame::Calibrated(parse_calibrated(payload))),
        other => Err(DecodeError::UnexpectedLength(other)),
    }
}

fn read_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn parse_raw_chunk1(payload: &[u8]) -> RawChunk1 {
    let time_stamp = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let mut sensors = [[0i16; 7]; RAW_CHUNK_1_SENSORS];
    for (i, sensor) in sensors.iter_mut().enumerate() {
        let base = 4 + i * 14;
        for (w, word) in sensor.iter_mut().enumerate() {
            *word = read_i16(payload, base + w * 2);
        }
    }
    RawChunk1 { time_stamp, sensors }
}

fn parse_raw_chunk2(payload: &[u8]) -> RawChunk2 {
    let mut sensors = [[0i16; 7]; NUM_SENSORS - RAW_CHUNK_1_SENSORS];
    for (i, sensor) in sensors.iter_mut().enumerate() {
        let base = i * 14;
        for (w, word) in sensor.iter_mut().enumerate() {
            *word = read_i16(payload, base + w * 2);
        }
    }
    RawChunk2 { sensors }
}

fn parse_calibrated(payload: &[u8]) -> CalibratedRecord {
    CalibratedRecord {
        delta_theta: [read_f32(payload, 0), read_f32(payload, 4), read_f32(payload, 8)],
        delta_v: [read_f32(payload, 12), read_f32(payload, 16), read_f32(payload, 20)],
        accum_v: [read_f32(payload, 24), read_f32(payload, 28), read_f32(payload, 32)],
        attitude: [
            read_f32(payload, 36),
            read_f32(payload, 40),
            read_f32(payload, 44),
            read_f32(payload, 48),
        ],
        avg_temp_c: read_f32(payload, 52),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imu_core::frame::RawFrame;
    use imu_core::framer::{LogSink, StorageSink};

    struct VecStorage(Vec<u8>);
    impl StorageSink for VecStorage {
        type Error = ();
        fn open_write(&mut self, _truncate: bool) -> Result<(), ()> {
            Ok(())
        }
        fn open_read(&mut self) -> Result<(), ()> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), ()> {
            Ok(())
        }
        fn write(&mut self, data: &[u8]) -> Result<(), ()> {
            self.0.extend_from_slice(data);
            Ok(())
        }
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
            Ok(0)
        }
        fn is_open(&self) -> bool {
            true
        }
    }

    #[test]
    fn round_trips_a_raw_frame_written_by_the_log_sink() {
        let mut sink = LogSink::new();
        let mut storage = VecStorage(Vec::new());
        let mut frame = RawFrame::zeroed();
        frame.time_stamp = 0xDEAD_BEEF;
        frame.sensors[0].data[0] = -123;
        sink.write_raw_frame(&mut storage, &frame).unwrap();
        sink.flush(&mut storage).unwrap();

        let (frames, consumed) = decode_stream(&storage.0);
        assert_eq!(consumed, storage.0.len());
        assert_eq!(frames.len(), 2);
        match &frames[0] {
            Frame::Raw1(chunk) => {
                assert_eq!(chunk.time_stamp, 0xDEAD_BEEF);
                assert_eq!(chunk.sensors[0][0], -123);
            }
            other => panic!("expected Raw1, got {:?}", other),
        }
        assert!(matches!(frames[1], Frame::Raw2(_)));
    }

    #[test]
    fn stops_cleanly_on_a_truncated_trailing_frame() {
        let mut sink = LogSink::new();
        let mut storage = VecStorage(Vec::new());
        let frame = RawFrame::zeroed();
        sink.write_raw_frame(&mut storage, &frame).unwrap();
        sink.flush(&mut storage).unwrap();
        storage.0.truncate(storage.0.len() - 3);

        let (frames, consumed) = decode_stream(&storage.0);
        assert_eq!(frames.len(), 1);
        assert!(consumed < storage.0.len());
    }
}
