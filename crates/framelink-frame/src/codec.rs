use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::crc::{checksum, Crc16};
use crate::error::{FrameError, Result};
use crate::frame::{
    declared_payload_len, Frame, FrameHeader, CRC_LEN, HEADER_LEN, MAX_PAYLOAD_LEN, SOF1, SOF2,
    SOF_LEN,
};

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Largest payload accepted by the decoder. Clamped to [`MAX_PAYLOAD_LEN`].
    pub max_payload_len: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_payload_len: MAX_PAYLOAD_LEN,
        }
    }
}

/// Where the decoder currently is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Scanning for the first marker byte; everything else is discarded.
    SeekSof1,
    /// First marker seen, the next byte must be the second marker.
    SeekSof2,
    /// Accumulating the 8 header bytes.
    ReadHeader,
    /// Accumulating exactly `payload_len` bytes.
    ReadPayload,
    /// Accumulating the 2 checksum bytes.
    ReadCrc,
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬──────────────────────────────────────────┬──────────┬──────────┐
/// │ SOF (2B)  │ Header (8B, LE)                          │ Payload  │ CRC16    │
/// │ 0xA5 0x5A │ ver │ type │ msg id │ seq │ payload len │ (len B)  │ (2B LE)  │
/// └───────────┴──────────────────────────────────────────┴──────────┴──────────┘
/// ```
///
/// The checksum covers header and payload.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    let header = frame.header().to_bytes();
    let crc = Crc16::new()
        .update(&header)
        .update(frame.payload())
        .finish();

    dst.reserve(frame.wire_size());
    dst.put_u8(SOF1);
    dst.put_u8(SOF2);
    dst.put_slice(&header);
    dst.put_slice(frame.payload());
    dst.put_u16_le(crc);
}

/// Incremental, self-resynchronizing frame decoder and encoder.
///
/// The decoder is a byte-at-a-time automaton: chunks may be fragmented
/// arbitrarily (a single byte, or several frames at once) and the only state
/// kept between calls is the partially read frame. After any corruption the
/// offending frame is dropped and scanning resumes at the next marker, so
/// callers never need to [`reset`](FrameCodec::reset) to keep going.
#[derive(Debug)]
pub struct FrameCodec {
    config: CodecConfig,
    state: DecodeState,
    header: [u8; HEADER_LEN],
    header_pos: usize,
    payload_len: usize,
    payload: BytesMut,
    crc: [u8; CRC_LEN],
    crc_pos: usize,
}

impl FrameCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(mut config: CodecConfig) -> Self {
        config.max_payload_len = config.max_payload_len.min(MAX_PAYLOAD_LEN);
        Self {
            config,
            state: DecodeState::SeekSof1,
            header: [0u8; HEADER_LEN],
            header_pos: 0,
            payload_len: 0,
            payload: BytesMut::new(),
            crc: [0u8; CRC_LEN],
            crc_pos: 0,
        }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Current decoder state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Discard any partially read frame and go back to scanning for a marker.
    pub fn reset(&mut self) {
        self.state = DecodeState::SeekSof1;
        self.header_pos = 0;
        self.payload_len = 0;
        self.payload = BytesMut::new();
        self.crc_pos = 0;
    }

    /// Encode a frame (see [`encode_frame`]).
    pub fn encode(&self, frame: &Frame) -> Bytes {
        let mut dst = BytesMut::with_capacity(frame.wire_size());
        encode_frame(frame, &mut dst);
        dst.freeze()
    }

    /// Consume a chunk of bytes.
    ///
    /// Returns the outcome of every frame boundary reached during this call,
    /// in arrival order: `Ok` for each verified frame, `Err` for each frame
    /// rejected as corrupt. Bytes after a rejected frame are still processed.
    /// The result is empty when no frame boundary was reached.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Result<Frame>> {
        let mut out = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            if self.state == DecodeState::ReadPayload {
                let take = (self.payload_len - self.payload.len()).min(data.len() - pos);
                self.payload.put_slice(&data[pos..pos + take]);
                pos += take;
                if self.payload.len() == self.payload_len {
                    self.enter_read_crc();
                }
                continue;
            }

            if let Some(outcome) = self.feed_byte(data[pos]) {
                out.push(outcome);
            }
            pos += 1;
        }

        out
    }

    /// Step the automaton by one byte.
    ///
    /// Returns `Some` when the byte completes (or aborts) a frame.
    pub fn feed_byte(&mut self, byte: u8) -> Option<Result<Frame>> {
        match self.state {
            DecodeState::SeekSof1 => {
                if byte == SOF1 {
                    self.state = DecodeState::SeekSof2;
                }
                None
            }
            DecodeState::SeekSof2 => {
                if byte == SOF2 {
                    self.state = DecodeState::ReadHeader;
                    self.header_pos = 0;
                } else if byte != SOF1 {
                    // A repeated SOF1 is a new candidate start; stay put.
                    self.state = DecodeState::SeekSof1;
                }
                None
            }
            DecodeState::ReadHeader => {
                self.header[self.header_pos] = byte;
                self.header_pos += 1;
                if self.header_pos == HEADER_LEN {
                    return self.on_header_complete();
                }
                None
            }
            DecodeState::ReadPayload => {
                self.payload.put_u8(byte);
                if self.payload.len() == self.payload_len {
                    self.enter_read_crc();
                }
                None
            }
            DecodeState::ReadCrc => {
                self.crc[self.crc_pos] = byte;
                self.crc_pos += 1;
                if self.crc_pos == CRC_LEN {
                    return Some(self.on_crc_complete());
                }
                None
            }
        }
    }

    fn on_header_complete(&mut self) -> Option<Result<Frame>> {
        let declared = usize::from(declared_payload_len(&self.header));
        if declared > self.config.max_payload_len {
            debug!(
                declared,
                max = self.config.max_payload_len,
                "rejecting oversized frame header"
            );
            self.reset();
            return Some(Err(FrameError::PayloadTooLarge {
                size: declared,
                max: self.config.max_payload_len,
            }));
        }

        self.payload_len = declared;
        self.payload = BytesMut::with_capacity(declared);
        if declared == 0 {
            self.enter_read_crc();
        } else {
            self.state = DecodeState::ReadPayload;
        }
        None
    }

    fn enter_read_crc(&mut self) {
        self.state = DecodeState::ReadCrc;
        self.crc_pos = 0;
    }

    fn on_crc_complete(&mut self) -> Result<Frame> {
        let expected = u16::from_le_bytes(self.crc);
        let actual = Crc16::new()
            .update(&self.header)
            .update(&self.payload)
            .finish();

        if actual != expected {
            debug!(
                expected = format_args!("{expected:#06x}"),
                actual = format_args!("{actual:#06x}"),
                "dropping frame with bad checksum"
            );
            self.reset();
            return Err(FrameError::CrcMismatch { expected, actual });
        }

        let header = FrameHeader::from_bytes(&self.header);
        let payload = std::mem::take(&mut self.payload).freeze();
        self.reset();
        Ok(Frame::from_wire(header?, payload))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Checksum of an already encoded frame's covered region, for diagnostics.
pub fn wire_checksum(wire: &[u8]) -> Option<u16> {
    let covered = wire.len().checked_sub(SOF_LEN + CRC_LEN)?;
    Some(checksum(&wire[SOF_LEN..SOF_LEN + covered]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg_type::MsgType;

    fn telemetry(seq: u16, payload: &[u8]) -> Frame {
        Frame::new(MsgType::Telemetry, payload.to_vec())
            .unwrap()
            .with_seq(seq)
    }

    fn decoded(outcomes: Vec<Result<Frame>>) -> Vec<Frame> {
        outcomes.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let codec_out = FrameCodec::new();
        let frame = Frame::new(MsgType::Response, b"hello, device".to_vec())
            .unwrap()
            .with_msg_id(0x0102)
            .with_seq(77);
        let wire = codec_out.encode(&frame);
        assert_eq!(wire.len(), frame.wire_size());

        let mut codec = FrameCodec::new();
        let frames = decoded(codec.feed(&wire));
        assert_eq!(frames, vec![frame]);
        assert_eq!(codec.state(), DecodeState::SeekSof1);
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::alive(1).with_seq(0x0203);
        let wire = FrameCodec::new().encode(&frame);

        assert_eq!(
            &wire[..10],
            &[0xA5, 0x5A, 0x01, 0x01, 0x00, 0x00, 0x03, 0x02, 0x00, 0x00]
        );
        let crc = checksum(&wire[2..10]);
        assert_eq!(&wire[10..], &crc.to_le_bytes());
        assert_eq!(wire_checksum(&wire), Some(crc));
    }

    #[test]
    fn test_empty_payload() {
        let frame = Frame::alive(1);
        let wire = FrameCodec::new().encode(&frame);
        let mut codec = FrameCodec::new();
        let frames = decoded(codec.feed(&wire));
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload().is_empty());
        assert_eq!(frames[0].msg_type(), MsgType::Alive);
    }

    #[test]
    fn test_max_payload_roundtrip() {
        let payload: Vec<u8> = (0..MAX_PAYLOAD_LEN).map(|i| (i % 251) as u8).collect();
        let frame = telemetry(1, &payload);
        let wire = FrameCodec::new().encode(&frame);
        let mut codec = FrameCodec::new();
        assert_eq!(decoded(codec.feed(&wire)), vec![frame]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let frame = telemetry(5, b"slow link");
        let wire = FrameCodec::new().encode(&frame);

        let mut codec = FrameCodec::new();
        let mut frames = Vec::new();
        for &byte in wire.iter() {
            frames.extend(decoded(codec.feed(&[byte])));
        }
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_every_split_point() {
        let frame = telemetry(9, b"split me anywhere");
        let wire = FrameCodec::new().encode(&frame);

        for split in 0..=wire.len() {
            let mut codec = FrameCodec::new();
            let mut frames = decoded(codec.feed(&wire[..split]));
            frames.extend(decoded(codec.feed(&wire[split..])));
            assert_eq!(frames, vec![frame.clone()], "split at {split}");
        }
    }

    #[test]
    fn test_irregular_chunking_matches_whole_feed() {
        let mut wire = BytesMut::new();
        let mut expected = Vec::new();
        for seq in 0..20u16 {
            let payload = vec![seq as u8; usize::from(seq) * 13];
            let frame = telemetry(seq, &payload);
            encode_frame(&frame, &mut wire);
            expected.push(frame);
        }
        // Noise between frames must be skipped.
        wire.put_slice(&[0x00, 0xFF, 0x5A]);
        let trailing = Frame::alive(1);
        encode_frame(&trailing, &mut wire);
        expected.push(trailing);

        let mut whole = FrameCodec::new();
        assert_eq!(decoded(whole.feed(&wire)), expected);

        // Deterministic pseudo-random chunk sizes between 1 and 64.
        let mut rng: u32 = 0x1234_5678;
        let mut chunked = FrameCodec::new();
        let mut frames = Vec::new();
        let mut pos = 0;
        while pos < wire.len() {
            rng = rng.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let len = ((rng >> 16) as usize % 64 + 1).min(wire.len() - pos);
            frames.extend(decoded(chunked.feed(&wire[pos..pos + len])));
            pos += len;
        }
        assert_eq!(frames, expected);
    }

    #[test]
    fn test_leading_garbage_is_discarded() {
        let frame = telemetry(1, b"data");
        let mut wire = BytesMut::from(&[0x00, 0x13, 0x5A, 0xA5, 0x00, 0x37][..]);
        encode_frame(&frame, &mut wire);

        let mut codec = FrameCodec::new();
        assert_eq!(decoded(codec.feed(&wire)), vec![frame]);
    }

    #[test]
    fn test_repeated_sof1_is_tolerated() {
        let frame = telemetry(1, b"data");
        let mut wire = BytesMut::from(&[SOF1, SOF1, SOF1][..]);
        encode_frame(&frame, &mut wire);

        let mut codec = FrameCodec::new();
        codec.feed(&wire[..3]);
        assert_eq!(codec.state(), DecodeState::SeekSof2);
        assert_eq!(decoded(codec.feed(&wire[3..])), vec![frame]);
    }

    #[test]
    fn test_crc_mismatch_then_resync_in_same_chunk() {
        let codec_out = FrameCodec::new();
        let bad = telemetry(1, b"corrupt me");
        let good = telemetry(2, b"intact");

        let mut wire = BytesMut::from(codec_out.encode(&bad).as_ref());
        wire[SOF_LEN + HEADER_LEN + 3] ^= 0xFF;
        wire.put_slice(&codec_out.encode(&good));

        let mut codec = FrameCodec::new();
        let outcomes = codec.feed(&wire);
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], Err(FrameError::CrcMismatch { .. })));
        assert_eq!(outcomes[1].as_ref().unwrap(), &good);
    }

    #[test]
    fn test_crc_mismatch_then_resync_across_feeds() {
        let codec_out = FrameCodec::new();
        let bad = telemetry(1, b"corrupt me");
        let good = telemetry(2, b"intact");

        let mut corrupted = BytesMut::from(codec_out.encode(&bad).as_ref());
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0x01;

        let mut codec = FrameCodec::new();
        let outcomes = codec.feed(&corrupted);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].as_ref().unwrap_err().is_stream_corruption());
        assert_eq!(codec.state(), DecodeState::SeekSof1);

        assert_eq!(decoded(codec.feed(&codec_out.encode(&good))), vec![good]);
    }

    #[test]
    fn test_oversized_header_rejected_before_allocation() {
        let mut wire = BytesMut::new();
        wire.put_slice(&[SOF1, SOF2]);
        wire.put_u8(1);
        wire.put_u8(MsgType::Telemetry.as_u8());
        wire.put_u16_le(0);
        wire.put_u16_le(0);
        wire.put_u16_le(5000);

        let mut codec = FrameCodec::new();
        let outcomes = codec.feed(&wire);
        assert_eq!(
            outcomes,
            vec![Err(FrameError::PayloadTooLarge {
                size: 5000,
                max: MAX_PAYLOAD_LEN
            })]
        );
        assert_eq!(codec.state(), DecodeState::SeekSof1);
        assert_eq!(codec.payload.capacity(), 0);

        let good = telemetry(3, b"after");
        assert_eq!(
            decoded(codec.feed(&FrameCodec::new().encode(&good))),
            vec![good]
        );
    }

    #[test]
    fn test_configured_limit_below_wire_maximum() {
        let frame = telemetry(1, &[0u8; 64]);
        let wire = FrameCodec::new().encode(&frame);

        let mut codec = FrameCodec::with_config(CodecConfig {
            max_payload_len: 32,
        });
        let outcomes = codec.feed(&wire);
        assert!(matches!(
            outcomes.as_slice(),
            [Err(FrameError::PayloadTooLarge { size: 64, max: 32 })]
        ));
    }

    #[test]
    fn test_configured_limit_is_clamped() {
        let codec = FrameCodec::with_config(CodecConfig {
            max_payload_len: usize::MAX,
        });
        assert_eq!(codec.config().max_payload_len, MAX_PAYLOAD_LEN);
    }

    #[test]
    fn test_unknown_type_with_valid_crc_is_reported() {
        let mut wire = BytesMut::new();
        let header = [0x01, 0x7F, 0, 0, 0, 0, 0, 0];
        wire.put_slice(&[SOF1, SOF2]);
        wire.put_slice(&header);
        wire.put_u16_le(checksum(&header));

        let mut codec = FrameCodec::new();
        assert_eq!(
            codec.feed(&wire),
            vec![Err(FrameError::UnknownMsgType(0x7F))]
        );
        assert_eq!(codec.state(), DecodeState::SeekSof1);
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let frame = telemetry(4, b"partial");
        let wire = FrameCodec::new().encode(&frame);

        let mut codec = FrameCodec::new();
        assert!(codec.feed(&wire[..wire.len() - 3]).is_empty());
        assert_eq!(codec.state(), DecodeState::ReadPayload);

        codec.reset();
        assert_eq!(codec.state(), DecodeState::SeekSof1);
        assert!(codec.feed(&wire[wire.len() - 3..]).is_empty());
        assert_eq!(decoded(codec.feed(&wire)), vec![frame]);
    }
}
