//! 섹션 헤더 와이어 포맷과 프레임 인덱스 순서 연산
//!
//! 헤더는 8바이트 고정, 패딩 없음, 리틀 엔디언:
//!
//! ```text
//! 0        2          4                8
//! +--------+----------+----------------+
//! | frame  | section  | frame_length   |
//! | u16 LE | u16 LE   | u32 LE         |
//! +--------+----------+----------------+
//! ```

use bytes::BufMut;

/// 헤더 크기 (바이트)
pub const HEADER_LEN: usize = 8;

/// 프레임 인덱스 (65536에서 순환)
pub type FrameIndex = u16;

/// 섹션 인덱스 (프레임 내 0부터)
pub type SectionIndex = u16;

/// 섹션 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    /// 전송 중인 프레임 식별자
    pub frame_index: FrameIndex,

    /// 프레임 내 섹션 인덱스
    pub section_index: SectionIndex,

    /// 조립 완료된 프레임의 전체 길이 (같은 프레임의 모든 섹션에서 동일)
    pub frame_length: u32,
}

impl SectionHeader {
    pub fn new(frame_index: FrameIndex, section_index: SectionIndex, frame_length: u32) -> Self {
        Self {
            frame_index,
            section_index,
            frame_length,
        }
    }

    /// 바이트에서 헤더 파싱
    ///
    /// 8바이트 미만이면 해석하지 않고 `None`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let raw: &[u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;

        Some(Self {
            frame_index: u16::from_le_bytes([raw[0], raw[1]]),
            section_index: u16::from_le_bytes([raw[2], raw[3]]),
            frame_length: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        })
    }

    /// 헤더를 8바이트로 직렬화
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.frame_index.to_le_bytes());
        out[2..4].copy_from_slice(&self.section_index.to_le_bytes());
        out[4..8].copy_from_slice(&self.frame_length.to_le_bytes());
        out
    }

    /// 버퍼 뒤에 헤더 기록
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.frame_index);
        buf.put_u16_le(self.section_index);
        buf.put_u32_le(self.frame_length);
    }
}

/// 순환을 고려한 프레임 인덱스 차이 (`a - b`)
///
/// 부호 있는 16비트 뺄셈. `a`가 `b`보다 뒤면 양수, 앞이면 음수, 같으면 0.
pub fn seq_diff(a: FrameIndex, b: FrameIndex) -> i16 {
    a.wrapping_sub(b) as i16
}

/// `a`가 `b`보다 뒤의 프레임인지
pub fn is_after(a: FrameIndex, b: FrameIndex) -> bool {
    seq_diff(a, b) > 0
}

/// `a`가 `b`보다 앞의 프레임인지
pub fn is_before(a: FrameIndex, b: FrameIndex) -> bool {
    seq_diff(a, b) < 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_header_roundtrip() {
        let header = SectionHeader::new(7, 3, 4096);
        let bytes = header.encode();

        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(SectionHeader::parse(&bytes), Some(header));
    }

    #[test]
    fn test_header_wire_layout_is_little_endian() {
        let header = SectionHeader::new(0x0102, 0x0304, 0x0506_0708);
        assert_eq!(
            header.encode(),
            [0x02, 0x01, 0x04, 0x03, 0x08, 0x07, 0x06, 0x05]
        );

        let mut buf = BytesMut::new();
        header.write_to(&mut buf);
        assert_eq!(&buf[..], &header.encode()[..]);
    }

    #[test]
    fn test_parse_short_input() {
        assert_eq!(SectionHeader::parse(&[]), None);
        assert_eq!(SectionHeader::parse(&[0u8; 7]), None);
    }

    #[test]
    fn test_parse_ignores_trailing_payload() {
        let mut datagram = SectionHeader::new(1, 2, 3).encode().to_vec();
        datagram.extend_from_slice(b"payload");

        let header = SectionHeader::parse(&datagram).unwrap();
        assert_eq!(header, SectionHeader::new(1, 2, 3));
    }

    #[test]
    fn test_seq_diff_algebra() {
        let samples = [0u16, 1, 2, 179, 180, 1000, 32767, 32768, 32769, 65534, 65535];

        for &a in &samples {
            assert_eq!(seq_diff(a, a), 0);
            for &b in &samples {
                // -32768은 자기 자신의 부호 반전이므로 제외
                if seq_diff(a, b) != i16::MIN {
                    assert_eq!(seq_diff(a, b), -seq_diff(b, a), "a={} b={}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_seq_diff_wraparound() {
        assert_eq!(seq_diff(0, 65535), 1);
        assert_eq!(seq_diff(65535, 0), -1);
        assert_eq!(seq_diff(5, 65530), 11);
        assert!(is_after(0, 65535));
        assert!(is_before(65535, 0));
        assert!(!is_after(10, 10));
        assert!(!is_before(10, 10));
    }

    #[test]
    fn test_seq_diff_regression() {
        assert_eq!(seq_diff(800, 1000), -200);
        assert!(seq_diff(800, 1000) < -180);
    }
}
