//! 프레임 버퍼 풀
//!
//! - 고정 개수, 고정 크기 버퍼를 생성 시 한 번만 할당
//! - [`BufferHandle`]이 버퍼를 독점 소유, drop 시 자동 반환
//! - 명시적인 해제 API 없음 (use-after-release 불가)
//!
//! 빈 버퍼 목록은 bounded crossbeam 채널이다. 획득은 `try_recv`라서 절대
//! 블록하지 않고, 반환은 핸들을 마지막으로 가진 스레드(소비자 포함)에서
//! 일어날 수 있다.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::Config;

/// 풀에 속한 버퍼 하나
struct PoolSlot {
    index: u32,
    data: Box<[u8]>,
}

/// 프레임 버퍼 풀
pub struct FramePool {
    free_tx: Sender<PoolSlot>,
    free_rx: Receiver<PoolSlot>,
    pool_size: usize,
    buffer_capacity: usize,
}

impl FramePool {
    /// `pool_size`개의 `buffer_capacity` 크기 버퍼로 풀 생성
    pub fn new(pool_size: usize, buffer_capacity: usize) -> Arc<Self> {
        let (free_tx, free_rx) = crossbeam_channel::bounded(pool_size);

        for index in 0..pool_size {
            let slot = PoolSlot {
                index: index as u32,
                data: vec![0u8; buffer_capacity].into_boxed_slice(),
            };
            // 용량이 pool_size이므로 실패하지 않음
            let _ = free_tx.try_send(slot);
        }

        Arc::new(Self {
            free_tx,
            free_rx,
            pool_size,
            buffer_capacity,
        })
    }

    /// 설정값으로 풀 생성
    pub fn from_config(config: &Config) -> Arc<Self> {
        Self::new(config.pool_size, config.buffer_capacity)
    }

    /// 빈 버퍼 획득 (논블로킹, 할당 없음)
    ///
    /// 빈 버퍼가 없으면 `None`.
    pub fn try_acquire(&self) -> Option<BufferHandle> {
        let slot = self.free_rx.try_recv().ok()?;

        Some(BufferHandle {
            index: slot.index,
            data: slot.data,
            len: 0,
            release: self.free_tx.clone(),
        })
    }

    /// 현재 사용 가능한 버퍼 수
    pub fn free_count(&self) -> usize {
        self.free_rx.len()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("pool_size", &self.pool_size)
            .field("buffer_capacity", &self.buffer_capacity)
            .field("free", &self.free_count())
            .finish()
    }
}

/// 풀 버퍼의 유일한 소유 핸들
///
/// 복제 불가, 이동만 가능. drop되면 버퍼가 풀로 정확히 한 번 돌아간다.
pub struct BufferHandle {
    index: u32,
    data: Box<[u8]>,
    len: u32,
    release: Sender<PoolSlot>,
}

impl BufferHandle {
    /// 풀 내 버퍼 인덱스
    pub fn index(&self) -> u32 {
        self.index
    }

    /// 버퍼 전체 용량
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// 버퍼 전체에 대한 쓰기 뷰
    pub fn write_view(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// 선언된 데이터 길이
    pub fn declared_length(&self) -> u32 {
        self.len
    }

    /// 데이터 길이 설정, 용량을 넘으면 용량으로 잘린다
    pub fn set_length(&mut self, len: u32) {
        self.len = len.min(self.data.len() as u32);
    }

    /// 선언된 길이만큼의 데이터
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        let slot = PoolSlot {
            index: self.index,
            data: std::mem::take(&mut self.data),
        };
        // 풀이 먼저 사라졌어도 채널은 핸들의 Sender로 살아 있음
        let _ = self.release.try_send(slot);
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHandle")
            .field("index", &self.index)
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}
