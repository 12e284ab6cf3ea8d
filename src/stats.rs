//! 재조립 통계와 세션 상태
//!
//! - `ReassemblyStats`: 수신 루프 안에서만 갱신되는 카운터. 주기적으로
//!   스냅샷이 공유 락으로 게시된다.
//! - `SessionStatus`: 다른 스레드가 락 없이 읽는 생존/동기 상태.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::header::FrameIndex;
use crate::reassembly::DropReason;

/// 재조립 통계
#[derive(Debug, Clone)]
pub struct ReassemblyStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 수신한 데이터그램 수
    pub packets_received: u64,

    /// 수신한 바이트 (헤더 포함)
    pub bytes_received: u64,

    /// 버퍼에 기록된 섹션 수
    pub sections_accepted: u64,

    /// 완성되어 전달된 프레임 수
    pub frames_completed: u64,

    /// 타임아웃 후 미완성으로 전달된 프레임 수
    pub frames_partial: u64,

    /// 소비자가 거절한 프레임 수
    pub frames_rejected: u64,

    /// 다른 프레임을 위해 축출된 슬롯 수
    pub slots_evicted: u64,

    /// 스캔에서 만료된 슬롯 수
    pub slots_expired: u64,

    /// (재)동기화 횟수
    pub resyncs: u64,

    /// 동기 상실 횟수 (타임아웃 + 비정상 과거 프레임)
    pub sync_losses: u64,

    /// 사유별 드롭 수
    drops: [u64; DropReason::COUNT],
}

impl ReassemblyStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            packets_received: 0,
            bytes_received: 0,
            sections_accepted: 0,
            frames_completed: 0,
            frames_partial: 0,
            frames_rejected: 0,
            slots_evicted: 0,
            slots_expired: 0,
            resyncs: 0,
            sync_losses: 0,
            drops: [0; DropReason::COUNT],
        }
    }

    /// 드롭 기록
    pub fn record_drop(&mut self, reason: DropReason) {
        self.drops[reason.index()] += 1;
    }

    /// 특정 사유의 드롭 수
    pub fn drops(&self, reason: DropReason) -> u64 {
        self.drops[reason.index()]
    }

    /// 전체 드롭 수
    pub fn total_drops(&self) -> u64 {
        self.drops.iter().sum()
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 초당 전달 프레임 수 (완성 + 미완성)
    pub fn frame_rate(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        (self.frames_completed + self.frames_partial) as f64 / elapsed
    }

    /// 수신 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_received as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        let mut drops = String::new();
        for reason in DropReason::ALL {
            let count = self.drops(reason);
            if count > 0 {
                if !drops.is_empty() {
                    drops.push_str(", ");
                }
                drops.push_str(&format!("{}={}", reason.as_str(), count));
            }
        }

        format!(
            "Elapsed: {:.2}s | Packets: {} | Frames: {} (+{} partial, {} rejected) | {:.1} fps | {:.2} MB/s | Evicted: {} | Expired: {} | Resyncs: {} | Drops: [{}]",
            self.elapsed().as_secs_f64(),
            self.packets_received,
            self.frames_completed,
            self.frames_partial,
            self.frames_rejected,
            self.frame_rate(),
            self.throughput() / 1_000_000.0,
            self.slots_evicted,
            self.slots_expired,
            self.resyncs,
            drops,
        )
    }
}

impl Default for ReassemblyStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 시각 미기록 표시
const NEVER: u64 = u64::MAX;

/// 스레드 간 공유되는 세션 상태
///
/// 쓰기는 수신 루프(단일 writer)만, 읽기는 어느 스레드에서나 락 없이.
/// 시각은 `epoch` 기준 마이크로초로 저장한다.
#[derive(Debug)]
pub struct SessionStatus {
    epoch: Instant,
    synced: AtomicBool,
    last_synced_us: AtomicU64,
    last_pushed_index: AtomicU16,
    last_receive_us: AtomicU64,
}

impl SessionStatus {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            synced: AtomicBool::new(false),
            last_synced_us: AtomicU64::new(NEVER),
            last_pushed_index: AtomicU16::new(0),
            last_receive_us: AtomicU64::new(NEVER),
        }
    }

    /// 송신측과 동기 상태인지
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// 마지막으로 전달된 프레임 인덱스
    pub fn last_pushed_index(&self) -> FrameIndex {
        self.last_pushed_index.load(Ordering::Acquire)
    }

    /// 동기 상태에서 마지막으로 패킷을 받아들인 시각
    pub fn last_synced_time(&self) -> Option<Instant> {
        self.to_instant(self.last_synced_us.load(Ordering::Acquire))
    }

    /// 마지막 데이터그램 수신 시각. 수신한 적 없으면 `None`
    pub fn last_receive_time(&self) -> Option<Instant> {
        self.to_instant(self.last_receive_us.load(Ordering::Acquire))
    }

    pub(crate) fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Release);
    }

    pub(crate) fn set_last_synced_time(&self, at: Instant) {
        self.last_synced_us
            .store(self.to_micros(at), Ordering::Release);
    }

    pub(crate) fn set_last_pushed_index(&self, index: FrameIndex) {
        self.last_pushed_index.store(index, Ordering::Release);
    }

    pub(crate) fn record_receive(&self, at: Instant) {
        self.last_receive_us
            .store(self.to_micros(at), Ordering::Release);
    }

    fn to_micros(&self, at: Instant) -> u64 {
        // NEVER와 겹치지 않도록 상한
        (at.saturating_duration_since(self.epoch).as_micros() as u64).min(NEVER - 1)
    }

    fn to_instant(&self, us: u64) -> Option<Instant> {
        (us != NEVER).then(|| self.epoch + Duration::from_micros(us))
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}
