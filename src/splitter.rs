//! 프레임 분할기 (송신측)
//!
//! 프레임 하나를 `max_payload_size` 단위 섹션으로 잘라
//! 헤더가 붙은 데이터그램으로 만든다.

use bytes::{BufMut, Bytes, BytesMut};
use rand::seq::SliceRandom;

use crate::header::{FrameIndex, SectionHeader, HEADER_LEN};
use crate::{Error, Result};

/// 프레임 분할기
#[derive(Debug, Clone)]
pub struct FrameSplitter {
    max_payload_size: usize,
    max_sections: usize,
}

impl FrameSplitter {
    pub fn new(max_payload_size: usize, max_sections: usize) -> Self {
        Self {
            max_payload_size,
            max_sections,
        }
    }

    /// 프레임에 필요한 섹션 수
    pub fn section_count(&self, frame_len: usize) -> usize {
        (frame_len + self.max_payload_size - 1) / self.max_payload_size
    }

    /// 분할 가능한 최대 프레임 크기
    pub fn max_frame_len(&self) -> usize {
        (self.max_payload_size * self.max_sections).min(u32::MAX as usize)
    }

    /// 프레임을 데이터그램들로 분할
    pub fn split(&self, frame_index: FrameIndex, data: &[u8]) -> Result<Vec<Bytes>> {
        if data.is_empty() || data.len() > self.max_frame_len() {
            return Err(Error::FrameTooLarge {
                len: data.len(),
                max: self.max_frame_len(),
            });
        }

        let frame_length = data.len() as u32;

        Ok(data
            .chunks(self.max_payload_size)
            .enumerate()
            .map(|(idx, section)| {
                let mut buf = BytesMut::with_capacity(HEADER_LEN + section.len());
                SectionHeader::new(frame_index, idx as u16, frame_length).write_to(&mut buf);
                buf.put_slice(section);
                buf.freeze()
            })
            .collect())
    }

    /// 중복 전송용 데이터그램 선택
    ///
    /// 전체 중 `redundancy_ratio` 비율만큼 무작위로 고른다.
    pub fn redundant_sections(&self, datagrams: &[Bytes], redundancy_ratio: f64) -> Vec<Bytes> {
        let mut rng = rand::thread_rng();

        let redundant_count = (datagrams.len() as f64 * redundancy_ratio).ceil() as usize;
        let mut indices: Vec<usize> = (0..datagrams.len()).collect();
        indices.shuffle(&mut rng);

        indices
            .into_iter()
            .take(redundant_count)
            .map(|idx| datagrams[idx].clone())
            .collect()
    }
}
