//! Packet framing and payload primitives
//!
//! A frame is a 3-byte little-endian payload length, a sequence id, then the
//! payload. Payloads of 2^24 - 1 bytes or more span several frames; a frame
//! shorter than that ends the packet, so an exact multiple is followed by an
//! empty frame.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{ProtocolError, ProtocolResult};

/// Largest payload a single frame carries
pub const MAX_PACKET_SIZE: usize = 0xff_ff_ff;

/// Largest reassembled packet accepted from a client (64 MB)
pub const MAX_TOTAL_PAYLOAD_SIZE: usize = 64 << 20;

const NULL_MARKER: u8 = 0xfb;

fn frame_header(len: usize, seq: u8) -> [u8; 4] {
    let [a, b, c, _] = (len as u32).to_le_bytes();
    [a, b, c, seq]
}

/// Reads packets, checking sequence ids
pub struct PacketReader<R> {
    inner: R,
    next_seq: u8,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, next_seq: 0 }
    }

    /// Start of a new command: the client restarts at 0
    pub fn reset_sequence(&mut self) {
        self.next_seq = 0;
    }

    pub fn set_sequence(&mut self, seq: u8) {
        self.next_seq = seq;
    }

    /// Read one packet, joining continuation frames
    pub async fn read_packet(&mut self) -> ProtocolResult<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let len = self.read_frame_header().await?;
            if payload.len() + len > MAX_TOTAL_PAYLOAD_SIZE {
                return Err(ProtocolError::invalid(format!(
                    "packet larger than {} bytes",
                    MAX_TOTAL_PAYLOAD_SIZE
                )));
            }
            let start = payload.len();
            payload.resize(start + len, 0);
            self.inner.read_exact(&mut payload[start..]).await?;

            if len < MAX_PACKET_SIZE {
                return Ok(payload);
            }
        }
    }

    async fn read_frame_header(&mut self) -> ProtocolResult<usize> {
        let mut header = [0u8; 4];
        if let Err(e) = self.inner.read_exact(&mut header).await {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
                _ => e.into(),
            });
        }

        let [a, b, c, seq] = header;
        if seq != self.next_seq {
            return Err(ProtocolError::invalid(format!(
                "sequence id {} where {} was expected",
                seq, self.next_seq
            )));
        }
        self.next_seq = seq.wrapping_add(1);
        Ok(u32::from_le_bytes([a, b, c, 0]) as usize)
    }
}

/// Writes packets, numbering frames from the current sequence id
pub struct PacketWriter<W> {
    inner: W,
    next_seq: u8,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, next_seq: 0 }
    }

    pub fn sequence_id(&self) -> u8 {
        self.next_seq
    }

    pub fn set_sequence(&mut self, seq: u8) {
        self.next_seq = seq;
    }

    pub async fn write_packet(&mut self, payload: &[u8]) -> ProtocolResult<()> {
        let mut last_len = 0;
        for frame in payload.chunks(MAX_PACKET_SIZE) {
            self.write_frame(frame).await?;
            last_len = frame.len();
        }
        // empty payloads and exact multiples need a terminating short frame
        if payload.is_empty() || last_len == MAX_PACKET_SIZE {
            self.write_frame(&[]).await?;
        }
        Ok(())
    }

    async fn write_frame(&mut self, frame: &[u8]) -> ProtocolResult<()> {
        self.inner
            .write_all(&frame_header(frame.len(), self.next_seq))
            .await?;
        self.inner.write_all(frame).await?;
        self.next_seq = self.next_seq.wrapping_add(1);
        Ok(())
    }

    pub async fn flush(&mut self) -> ProtocolResult<()> {
        self.inner.flush().await?;
        Ok(())
    }
}

// ============ Payload encoding ============

/// Append a length-encoded integer
pub fn put_lenenc_int(buf: &mut Vec<u8>, value: u64) {
    match value {
        0..=250 => buf.push(value as u8),
        251..=0xffff => {
            buf.push(0xfc);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xff_ffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
        }
        _ => {
            buf.push(0xfe);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Append length-prefixed bytes
pub fn put_lenenc_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    put_lenenc_int(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

pub fn put_lenenc_str(buf: &mut Vec<u8>, s: &str) {
    put_lenenc_bytes(buf, s.as_bytes());
}

/// Append a NUL-terminated string
pub fn put_nul_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Append the NULL marker used in text rows
pub fn put_null(buf: &mut Vec<u8>) {
    buf.push(NULL_MARKER);
}

// ============ Payload decoding ============

/// Forward-only reader over a received payload
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    pub fn bytes(&mut self, n: usize, what: &str) -> ProtocolResult<&'a [u8]> {
        let rest = self.remaining();
        if rest.len() < n {
            return Err(ProtocolError::invalid(format!("{} truncated", what)));
        }
        self.pos += n;
        Ok(&rest[..n])
    }

    pub fn skip(&mut self, n: usize, what: &str) -> ProtocolResult<()> {
        self.bytes(n, what).map(|_| ())
    }

    pub fn u8(&mut self, what: &str) -> ProtocolResult<u8> {
        Ok(self.bytes(1, what)?[0])
    }

    pub fn u32_le(&mut self, what: &str) -> ProtocolResult<u32> {
        let b = self.bytes(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn lenenc_int(&mut self, what: &str) -> ProtocolResult<u64> {
        let width = match self.u8(what)? {
            small @ 0..=250 => return Ok(small as u64),
            0xfc => 2,
            0xfd => 3,
            0xfe => 8,
            other => {
                return Err(ProtocolError::invalid(format!(
                    "{}: 0x{:02x} is not a length prefix",
                    what, other
                )))
            }
        };
        let mut le = [0u8; 8];
        le[..width].copy_from_slice(self.bytes(width, what)?);
        Ok(u64::from_le_bytes(le))
    }

    pub fn lenenc_bytes(&mut self, what: &str) -> ProtocolResult<&'a [u8]> {
        let len = self.lenenc_int(what)?;
        let len = usize::try_from(len).map_err(|_| ProtocolError::invalid(format!("{} too long", what)))?;
        self.bytes(len, what)
    }

    /// Bytes up to the next NUL, consuming the terminator
    pub fn nul_bytes(&mut self, what: &str) -> ProtocolResult<&'a [u8]> {
        let rest = self.remaining();
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ProtocolError::invalid(format!("{} is not NUL-terminated", what)))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    pub fn nul_str(&mut self, what: &str) -> ProtocolResult<String> {
        let raw = self.nul_bytes(what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| ProtocolError::invalid(format!("{} is not UTF-8", what)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenenc_int_widths() {
        for (value, width) in [(0u64, 1), (250, 1), (251, 3), (65_535, 3), (65_536, 4), (16_777_216, 9)] {
            let mut buf = Vec::new();
            put_lenenc_int(&mut buf, value);
            assert_eq!(buf.len(), width, "width of {}", value);
            assert_eq!(PayloadReader::new(&buf).lenenc_int("n").unwrap(), value);
        }

        let mut buf = Vec::new();
        put_lenenc_int(&mut buf, 1000);
        assert_eq!(buf, vec![0xfc, 0xe8, 0x03]);
    }

    #[test]
    fn test_reader_fields() {
        let mut buf = Vec::new();
        put_nul_str(&mut buf, "root");
        put_lenenc_bytes(&mut buf, &[0xff, 0x00, 0x9c]);
        buf.extend_from_slice(&7u32.to_le_bytes());

        let mut r = PayloadReader::new(&buf);
        assert_eq!(r.nul_str("user").unwrap(), "root");
        assert_eq!(r.lenenc_bytes("auth").unwrap(), &[0xff, 0x00, 0x9c]);
        assert_eq!(r.u32_le("flags").unwrap(), 7);
        assert!(r.is_empty());
        assert!(r.u8("extra").is_err());
    }

    #[test]
    fn test_reader_rejects_bad_input() {
        assert!(PayloadReader::new(b"abc").nul_str("name").is_err());
        assert!(PayloadReader::new(&[0xff]).lenenc_int("n").is_err());
        assert!(PayloadReader::new(&[5, b'a']).lenenc_bytes("s").is_err());
    }

    #[tokio::test]
    async fn test_sequence_continues_across_packets() {
        let mut buf = Vec::new();
        {
            let mut writer = PacketWriter::new(&mut buf);
            writer.set_sequence(1);
            writer.write_packet(b"one").await.unwrap();
            writer.write_packet(b"two").await.unwrap();
            assert_eq!(writer.sequence_id(), 3);
        }
        assert_eq!(&buf[..4], &[3, 0, 0, 1]);
        assert_eq!(&buf[7..11], &[3, 0, 0, 2]);

        let mut reader = PacketReader::new(&buf[..]);
        reader.set_sequence(1);
        assert_eq!(reader.read_packet().await.unwrap(), b"one");
        assert_eq!(reader.read_packet().await.unwrap(), b"two");
        assert!(matches!(
            reader.read_packet().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_empty_packet_has_one_frame() {
        let mut buf = Vec::new();
        PacketWriter::new(&mut buf).write_packet(&[]).await.unwrap();
        assert_eq!(buf, vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_sequence_mismatch_rejected() {
        let buf = vec![1u8, 0, 0, 5, 0x0e];
        let mut reader = PacketReader::new(&buf[..]);
        assert!(matches!(
            reader.read_packet().await,
            Err(ProtocolError::InvalidPacket(_))
        ));
    }
}
