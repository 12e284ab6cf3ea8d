//! 완성 프레임 소비자 인터페이스
//!
//! 재조립 엔진은 소비자에게서 버퍼를 받고([`FrameSink::acquire_buffer`]),
//! 완성된 버퍼를 소유권째 넘긴다([`FrameSink::push_frame`]).
//! 넘기기는 절대 블록하지 않으며, 거절되면 프레임은 그대로 버려진다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::debug;

use crate::header::FrameIndex;
use crate::pool::{BufferHandle, FramePool};

/// 완성된 프레임 수신 채널 타입
pub type FrameReceiver = Receiver<AssembledFrame>;

/// 소비자에게 넘겨지는 프레임
#[derive(Debug)]
pub struct AssembledFrame {
    /// 프레임 인덱스
    pub frame_index: FrameIndex,

    /// 모든 섹션이 도착했는지 (false면 타임아웃된 미완성 프레임)
    pub complete: bool,

    /// 프레임 데이터를 담은 버퍼
    pub buffer: BufferHandle,
}

impl AssembledFrame {
    /// 프레임 데이터
    pub fn data(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn len(&self) -> usize {
        self.buffer.declared_length() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 프레임 소비자
pub trait FrameSink: Send + Sync {
    /// 새 프레임용 버퍼 획득 (논블로킹)
    fn acquire_buffer(&self) -> Option<BufferHandle>;

    /// 획득 가능한 버퍼 하나의 용량
    fn buffer_capacity(&self) -> usize;

    /// 프레임 전달. 받아들이지 못하면 false (프레임은 drop됨)
    fn push_frame(&self, frame: AssembledFrame) -> bool;
}

/// bounded 채널 기반 소비자
///
/// 채널이 가득 차거나 수신측이 없으면 즉시 거절한다.
pub struct ChannelSink {
    pool: Arc<FramePool>,
    tx: Sender<AssembledFrame>,
    epoch: Instant,
    pushed: AtomicU64,
    rejected: AtomicU64,
    /// epoch 기준 마지막 전달 성공 시각 (마이크로초), 0이면 없음
    last_push_us: AtomicU64,
}

impl ChannelSink {
    /// 새 소비자 생성
    pub fn new(pool: Arc<FramePool>, queue_depth: usize) -> (Arc<Self>, FrameReceiver) {
        let (tx, rx) = crossbeam_channel::bounded(queue_depth);

        let sink = Arc::new(Self {
            pool,
            tx,
            epoch: Instant::now(),
            pushed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            last_push_us: AtomicU64::new(0),
        });

        (sink, rx)
    }

    /// 전달된 프레임 수
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// 거절된 프레임 수
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// 마지막 전달 성공 시각
    pub fn last_push_success(&self) -> Option<Instant> {
        match self.last_push_us.load(Ordering::Acquire) {
            0 => None,
            us => Some(self.epoch + std::time::Duration::from_micros(us - 1)),
        }
    }

    pub fn pool(&self) -> &Arc<FramePool> {
        &self.pool
    }
}

impl FrameSink for ChannelSink {
    fn acquire_buffer(&self) -> Option<BufferHandle> {
        self.pool.try_acquire()
    }

    fn buffer_capacity(&self) -> usize {
        self.pool.buffer_capacity()
    }

    fn push_frame(&self, frame: AssembledFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.pushed.fetch_add(1, Ordering::Relaxed);
                let us = self.epoch.elapsed().as_micros() as u64 + 1;
                self.last_push_us.store(us, Ordering::Release);
                true
            }
            Err(TrySendError::Full(frame)) | Err(TrySendError::Disconnected(frame)) => {
                debug!("프레임 {} 전달 거절: 소비자 큐가 가득 찼거나 닫힘", frame.frame_index);
                self.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}
