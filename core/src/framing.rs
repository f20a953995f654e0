use crate::error::{AudioLinkError, Result};
use crate::{FRAME_HEADER_SIZE, FRAME_TRAILER_SIZE, SYNC_WORD};

/// CRC-16-CCITT for payload integrity verification
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u32 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u32) << 8;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x10000 != 0 {
                crc ^= 0x1021;
            }
        }
    }
    (crc & 0xFFFF) as u16
}

/// CRC-8 with polynomial 0xD5, guards the header so a corrupted length is
/// rejected before the decoder waits for a frame that never ends
pub fn crc8(data: &[u8]) -> u8 {
    const POLYNOMIAL: u8 = 0xD5;
    let mut crc = 0u8;

    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ POLYNOMIAL;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Checksum carried in the frame trailer, over length byte and payload
pub fn payload_checksum(payload: &[u8]) -> u16 {
    let mut covered = Vec::with_capacity(payload.len() + 1);
    covered.push(payload.len() as u8);
    covered.extend_from_slice(payload);
    crc16(&covered)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub marker: u8,
    pub payload_len: u8,
    pub payload: Vec<u8>,
    pub checksum: u16,
}

impl Frame {
    /// Wrap `payload` in a frame, rejecting it before any work if it does not fit
    pub fn build(payload: &[u8], capacity: usize) -> Result<Self> {
        let capacity = capacity.min(u8::MAX as usize);
        if payload.len() > capacity {
            return Err(AudioLinkError::PayloadTooLarge {
                len: payload.len(),
                capacity,
            });
        }

        Ok(Self {
            marker: SYNC_WORD,
            payload_len: payload.len() as u8,
            payload: payload.to_vec(),
            checksum: payload_checksum(payload),
        })
    }

    /// Bytes on the air for this frame
    pub fn encoded_len(&self) -> usize {
        encoded_len(self.payload_len as usize)
    }

    pub fn bit_len(&self) -> usize {
        self.encoded_len() * 8
    }
}

/// Frame size in bytes for a payload of `payload_len` bytes
pub fn encoded_len(payload_len: usize) -> usize {
    FRAME_HEADER_SIZE + payload_len + FRAME_TRAILER_SIZE
}

pub struct FrameEncoder;
pub struct FrameDecoder;

impl FrameEncoder {
    /// Serialize: sync word, length, header CRC-8, payload, CRC-16 (big-endian)
    pub fn encode(frame: &Frame) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(frame.encoded_len());
        encoded.push(frame.marker);
        encoded.push(frame.payload_len);
        let header_crc = crc8(&encoded[..2]);
        encoded.push(header_crc);

        encoded.extend_from_slice(&frame.payload);

        encoded.push((frame.checksum >> 8) as u8);
        encoded.push(frame.checksum as u8);
        encoded
    }
}

impl FrameDecoder {
    /// Validate the header and return the declared payload length
    pub fn decode_header(data: &[u8], capacity: usize) -> Result<usize> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(AudioLinkError::InvalidFrameSize);
        }

        if data[0] != SYNC_WORD {
            return Err(AudioLinkError::PreambleNotFound);
        }

        if crc8(&data[..2]) != data[2] {
            return Err(AudioLinkError::HeaderCrcMismatch);
        }

        let payload_len = data[1] as usize;
        if payload_len > capacity {
            return Err(AudioLinkError::InvalidFrameSize);
        }

        Ok(payload_len)
    }

    /// Decode complete frame (header + payload + CRC-16)
    pub fn decode(data: &[u8], capacity: usize) -> Result<Frame> {
        let payload_len = Self::decode_header(data, capacity)?;

        let payload_end = FRAME_HEADER_SIZE + payload_len;
        if data.len() < payload_end + FRAME_TRAILER_SIZE {
            return Err(AudioLinkError::InvalidFrameSize);
        }

        let payload = data[FRAME_HEADER_SIZE..payload_end].to_vec();
        let received = ((data[payload_end] as u16) << 8) | (data[payload_end + 1] as u16);
        let computed = payload_checksum(&payload);

        if received != computed {
            return Err(AudioLinkError::ChecksumMismatch);
        }

        Ok(Frame {
            marker: data[0],
            payload_len: payload_len as u8,
            payload,
            checksum: computed,
        })
    }
}

/// Expand bytes into bits, most significant bit first
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<bool> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for i in (0..8).rev() {
            bits.push((byte >> i) & 1 == 1);
        }
    }
    bits
}

/// Pack bits back into bytes; a trailing partial byte is dropped
pub fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u8, |byte, &bit| (byte << 1) | bit as u8)
        })
        .collect()
}

/// Parse a frame from a demodulated bitstream that starts at the sync word
pub fn parse_frame(bits: &[bool], capacity: usize) -> Result<Frame> {
    FrameDecoder::decode(&bits_to_bytes(bits), capacity)
}
