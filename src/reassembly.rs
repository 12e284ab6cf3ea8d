//! 섹션 재조립 엔진
//!
//! - 고정 개수 재조립 슬롯, 슬롯당 조립 중인 프레임 하나
//! - 슬롯 부족 시 작은 프레임부터, 그 중 가장 오래된 것을 축출
//! - 프레임 인덱스 순환 비교 기반 동기/비동기 상태 머신
//! - 주기적 스캔으로 오래된 슬롯 만료 (패킷이 없어도 동작)
//!
//! 진입점(`on_packet`, `sweep`)은 `&mut self`를 받는다. 수신 드라이버가
//! 엔진을 소유하면 다른 누구도 동시에 호출할 수 없다.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::header::{is_after, is_before, seq_diff, FrameIndex, SectionHeader, HEADER_LEN};
use crate::pool::BufferHandle;
use crate::sink::{AssembledFrame, FrameSink};
use crate::stats::{ReassemblyStats, SessionStatus};
use crate::Config;

/// 패킷이 버려진 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// 헤더보다 짧은 데이터그램
    TooShort,
    /// 페이로드가 섹션 최대 크기 초과
    Oversized,
    /// 프레임 길이 0
    EmptyFrame,
    /// 프레임 길이가 버퍼 용량 초과
    FrameTooLarge,
    /// 이미 전달된 프레임 (중복, 순서 뒤바뀜)
    Stale,
    /// 재조립 슬롯 없음
    NoSlot,
    /// 빈 버퍼 없음
    PoolExhausted,
    /// 슬롯이 비었거나 이미 완성됨
    SlotUnavailable,
    /// 섹션 인덱스가 범위 밖
    SectionOutOfRange,
    /// 헤더 뒤 페이로드가 비어 있음
    EmptyPayload,
    /// 이미 받은 섹션
    DuplicateSection,
    /// 섹션이 선언된 프레임 길이를 넘어섬
    SectionOverflow,
}

impl DropReason {
    pub const COUNT: usize = 12;

    pub const ALL: [DropReason; Self::COUNT] = [
        DropReason::TooShort,
        DropReason::Oversized,
        DropReason::EmptyFrame,
        DropReason::FrameTooLarge,
        DropReason::Stale,
        DropReason::NoSlot,
        DropReason::PoolExhausted,
        DropReason::SlotUnavailable,
        DropReason::SectionOutOfRange,
        DropReason::EmptyPayload,
        DropReason::DuplicateSection,
        DropReason::SectionOverflow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::TooShort => "too_short",
            DropReason::Oversized => "oversized",
            DropReason::EmptyFrame => "empty_frame",
            DropReason::FrameTooLarge => "frame_too_large",
            DropReason::Stale => "stale",
            DropReason::NoSlot => "no_slot",
            DropReason::PoolExhausted => "pool_exhausted",
            DropReason::SlotUnavailable => "slot_unavailable",
            DropReason::SectionOutOfRange => "section_out_of_range",
            DropReason::EmptyPayload => "empty_payload",
            DropReason::DuplicateSection => "duplicate_section",
            DropReason::SectionOverflow => "section_overflow",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// 패킷 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// 섹션이 기록되었고 프레임은 아직 미완성
    Buffered { frame_index: FrameIndex },
    /// 프레임이 완성되어 소비자에게 전달됨
    Completed { frame_index: FrameIndex },
    /// 프레임이 완성되었지만 소비자가 거절함 (프레임 폐기)
    SinkRejected { frame_index: FrameIndex },
    /// 패킷 폐기
    Dropped(DropReason),
}

/// 스캔 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// 만료되어 정리된 슬롯 수
    pub expired: usize,
    /// 그 중 미완성 프레임으로 전달된 수
    pub partial_pushed: usize,
    /// 미완성 프레임으로 넘겼지만 소비자가 거절한 수
    pub partial_rejected: usize,
}

/// 재조립 슬롯 (조립 중인 프레임 하나)
#[derive(Debug)]
struct ReassemblySlot {
    frame_index: FrameIndex,
    buffer: Option<BufferHandle>,
    received_length: u32,
    /// 섹션 수신 비트맵 (section_index -> 수신 여부)
    received_sections: Vec<bool>,
    assembly_start_time: Instant,
}

impl ReassemblySlot {
    fn new(max_sections: usize, now: Instant) -> Self {
        Self {
            frame_index: 0,
            buffer: None,
            received_length: 0,
            received_sections: vec![false; max_sections],
            assembly_start_time: now,
        }
    }

    fn is_occupied(&self) -> bool {
        self.buffer.is_some()
    }

    fn declared_length(&self) -> u32 {
        self.buffer.as_ref().map_or(0, BufferHandle::declared_length)
    }

    fn is_complete(&self) -> bool {
        self.is_occupied() && self.received_length == self.declared_length()
    }

    fn completion_ratio(&self) -> f64 {
        let declared = self.declared_length();
        if declared == 0 {
            return 0.0;
        }
        self.received_length as f64 / declared as f64
    }

    /// 섹션 페이로드를 버퍼에 기록
    fn fill(
        &mut self,
        header: &SectionHeader,
        payload: &[u8],
        max_payload_size: usize,
    ) -> Result<(), DropReason> {
        if !self.is_occupied() || self.is_complete() {
            return Err(DropReason::SlotUnavailable);
        }

        let section = header.section_index as usize;
        if section >= self.received_sections.len() {
            return Err(DropReason::SectionOutOfRange);
        }
        if payload.is_empty() {
            return Err(DropReason::EmptyPayload);
        }
        if self.received_sections[section] {
            return Err(DropReason::DuplicateSection);
        }

        let offset = section * max_payload_size;
        let end = offset + payload.len();
        if end > self.declared_length() as usize {
            return Err(DropReason::SectionOverflow);
        }

        let buffer = self.buffer.as_mut().ok_or(DropReason::SlotUnavailable)?;
        buffer.write_view()[offset..end].copy_from_slice(payload);

        self.received_sections[section] = true;
        self.received_length += payload.len() as u32;
        Ok(())
    }

    /// 버퍼를 꺼내고 슬롯 정리
    fn take(&mut self) -> Option<BufferHandle> {
        let buffer = self.buffer.take();
        self.clear();
        buffer
    }

    /// 슬롯 정리 (버퍼는 drop되어 풀로 반환)
    fn clear(&mut self) {
        self.buffer = None;
        self.received_length = 0;
        self.received_sections.fill(false);
    }
}

/// 재조립 엔진
pub struct Reassembler {
    config: Config,
    sink: Arc<dyn FrameSink>,
    slots: Vec<ReassemblySlot>,

    synced: bool,
    last_synced_time: Instant,
    last_pushed_index: FrameIndex,

    status: Arc<SessionStatus>,
    stats: ReassemblyStats,
}

impl Reassembler {
    /// 새 엔진 생성
    ///
    /// 슬롯과 섹션 비트맵은 여기서 한 번만 할당된다.
    pub fn new(config: Config, sink: Arc<dyn FrameSink>) -> Self {
        let now = Instant::now();
        let slots = (0..config.slot_count)
            .map(|_| ReassemblySlot::new(config.max_sections, now))
            .collect();

        Self {
            config,
            sink,
            slots,
            synced: false,
            last_synced_time: now,
            last_pushed_index: 0,
            status: Arc::new(SessionStatus::new()),
            stats: ReassemblyStats::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 공유 세션 상태
    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.clone()
    }

    /// 통계
    pub fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn last_pushed_index(&self) -> FrameIndex {
        self.last_pushed_index
    }

    /// 조립 중인 슬롯 수
    pub fn occupied_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_occupied()).count()
    }

    /// 데이터그램 하나 처리
    pub fn on_packet(&mut self, datagram: &[u8]) -> PacketOutcome {
        self.on_packet_at(datagram, Instant::now())
    }

    /// 주어진 시각 기준으로 데이터그램 하나 처리
    pub fn on_packet_at(&mut self, datagram: &[u8], now: Instant) -> PacketOutcome {
        self.stats.packets_received += 1;
        self.stats.bytes_received += datagram.len() as u64;

        match self.process_packet(datagram, now) {
            Ok(outcome) => outcome,
            Err(reason) => {
                self.stats.record_drop(reason);
                PacketOutcome::Dropped(reason)
            }
        }
    }

    fn process_packet(
        &mut self,
        datagram: &[u8],
        now: Instant,
    ) -> Result<PacketOutcome, DropReason> {
        self.check_sync_timeout(now);

        let header = match SectionHeader::parse(datagram) {
            Some(header) => header,
            None => {
                debug!("헤더보다 짧은 패킷: {} bytes", datagram.len());
                return Err(DropReason::TooShort);
            }
        };
        let payload = &datagram[HEADER_LEN..];

        if payload.len() > self.config.max_payload_size {
            debug!(
                "섹션 페이로드 초과: frame={}, sec={}, {} bytes",
                header.frame_index,
                header.section_index,
                payload.len()
            );
            return Err(DropReason::Oversized);
        }
        if header.frame_length == 0 {
            debug!("길이 0 프레임: frame={}", header.frame_index);
            return Err(DropReason::EmptyFrame);
        }
        if header.frame_length as usize > self.sink.buffer_capacity() {
            debug!(
                "프레임 길이 {}가 버퍼 용량 초과: frame={}",
                header.frame_length, header.frame_index
            );
            return Err(DropReason::FrameTooLarge);
        }

        let diff = seq_diff(header.frame_index, self.last_pushed_index);

        if self.synced && diff < self.config.min_frame_index_diff {
            warn!(
                "비정상적으로 오래된 프레임 {} (sec {}), 마지막 전달 {}: 새 세션으로 간주",
                header.frame_index, header.section_index, self.last_pushed_index
            );
            self.set_synced(false);
        }

        if self.synced && diff <= 0 {
            return Err(DropReason::Stale);
        }

        if !self.synced {
            self.resync(&header);
        }
        self.last_synced_time = now;
        self.status.set_last_synced_time(now);

        let slot_idx = self
            .find_or_evict_slot(header.frame_index)
            .ok_or_else(|| {
                warn!("프레임 {}용 재조립 슬롯 없음", header.frame_index);
                DropReason::NoSlot
            })?;

        if !self.slots[slot_idx].is_occupied() {
            let mut buffer = self.sink.acquire_buffer().ok_or_else(|| {
                warn!("빈 프레임 버퍼 없음, 프레임 {} 섹션 폐기", header.frame_index);
                DropReason::PoolExhausted
            })?;
            buffer.set_length(header.frame_length);

            let slot = &mut self.slots[slot_idx];
            slot.buffer = Some(buffer);
            slot.frame_index = header.frame_index;
            slot.assembly_start_time = now;
        }

        let slot = &mut self.slots[slot_idx];
        slot.fill(&header, payload, self.config.max_payload_size)?;
        self.stats.sections_accepted += 1;

        if !slot.is_complete() {
            return Ok(PacketOutcome::Buffered {
                frame_index: header.frame_index,
            });
        }

        let accepted = match slot.take() {
            Some(buffer) => self.push(header.frame_index, buffer, true),
            None => false,
        };

        if self.config.clear_older_on_complete {
            for slot in &mut self.slots {
                if slot.is_occupied() && is_before(slot.frame_index, header.frame_index) {
                    debug!(
                        "완성된 프레임 {} 이전의 프레임 {} 정리",
                        header.frame_index, slot.frame_index
                    );
                    slot.clear();
                }
            }
        }

        Ok(if accepted {
            PacketOutcome::Completed {
                frame_index: header.frame_index,
            }
        } else {
            PacketOutcome::SinkRejected {
                frame_index: header.frame_index,
            }
        })
    }

    /// 프레임 인덱스에 대한 재조립 슬롯 찾기
    ///
    /// 1. 같은 프레임을 조립 중인 슬롯
    /// 2. 첫 번째 빈 슬롯
    /// 3. 가장 오래된 작은 프레임 슬롯을 축출, 없으면 가장 오래된 큰 프레임 슬롯
    pub fn find_or_evict_slot(&mut self, frame_index: FrameIndex) -> Option<usize> {
        let threshold = self.config.large_frame_threshold;

        let mut first_empty = None;
        let mut oldest_small: Option<(usize, Instant)> = None;
        let mut oldest_large: Option<(usize, Instant)> = None;

        for (idx, slot) in self.slots.iter().enumerate() {
            if !slot.is_occupied() {
                if first_empty.is_none() {
                    first_empty = Some(idx);
                }
                continue;
            }

            if slot.frame_index == frame_index {
                return Some(idx);
            }

            let oldest = if slot.declared_length() >= threshold {
                &mut oldest_large
            } else {
                &mut oldest_small
            };
            if oldest.map_or(true, |(_, t)| slot.assembly_start_time < t) {
                *oldest = Some((idx, slot.assembly_start_time));
            }
        }

        if first_empty.is_some() {
            return first_empty;
        }

        let (victim, class) = match (oldest_small, oldest_large) {
            (Some((idx, _)), _) => (idx, "SMALL"),
            (None, Some((idx, _))) => (idx, "LARGE"),
            (None, None) => return None,
        };

        let slot = &mut self.slots[victim];
        warn!(
            "가장 오래된 {} 프레임 {} 축출 ({:.1}% 수신)",
            class,
            slot.frame_index,
            slot.completion_ratio() * 100.0
        );
        slot.clear();
        self.stats.slots_evicted += 1;

        Some(victim)
    }

    /// 오래된 슬롯 정리
    pub fn sweep(&mut self) -> SweepOutcome {
        self.sweep_at(Instant::now())
    }

    /// 주어진 시각 기준으로 오래된 슬롯 정리
    ///
    /// 재조립 타임아웃이 지난 슬롯은 (설정 시) 미완성 프레임으로 전달하거나
    /// 그냥 버린다. 어느 쪽이든 슬롯은 비워진다.
    pub fn sweep_at(&mut self, now: Instant) -> SweepOutcome {
        self.check_sync_timeout(now);

        let timeout = self.config.reassembly_timeout();
        let mut outcome = SweepOutcome::default();

        for idx in 0..self.slots.len() {
            let slot = &self.slots[idx];
            if !slot.is_occupied()
                || now.saturating_duration_since(slot.assembly_start_time) <= timeout
            {
                continue;
            }

            let frame_index = slot.frame_index;
            let deliver = self.config.push_partial_frames
                && slot.completion_ratio() >= self.config.min_partial_ratio
                && is_after(frame_index, self.last_pushed_index);

            debug!(
                "프레임 {} 재조립 타임아웃: {:.1}% 수신",
                frame_index,
                slot.completion_ratio() * 100.0
            );

            let buffer = self.slots[idx].take();
            outcome.expired += 1;
            self.stats.slots_expired += 1;

            if let (true, Some(buffer)) = (deliver, buffer) {
                if self.push(frame_index, buffer, false) {
                    outcome.partial_pushed += 1;
                } else {
                    outcome.partial_rejected += 1;
                }
            }
        }

        outcome
    }

    /// 프레임을 소비자에게 넘기고 마지막 전달 인덱스 갱신
    fn push(&mut self, frame_index: FrameIndex, buffer: BufferHandle, complete: bool) -> bool {
        let accepted = self.sink.push_frame(AssembledFrame {
            frame_index,
            complete,
            buffer,
        });

        match (accepted, complete) {
            (false, _) => self.stats.frames_rejected += 1,
            (true, true) => self.stats.frames_completed += 1,
            (true, false) => self.stats.frames_partial += 1,
        }

        self.last_pushed_index = frame_index;
        self.status.set_last_pushed_index(frame_index);
        accepted
    }

    fn check_sync_timeout(&mut self, now: Instant) {
        if self.synced
            && now.saturating_duration_since(self.last_synced_time) > self.config.sync_timeout()
        {
            warn!("동기 타임아웃: 마지막 동기 이후 {:?}", now - self.last_synced_time);
            self.set_synced(false);
        }
    }

    fn resync(&mut self, header: &SectionHeader) {
        // 현재 프레임 바로 앞으로 설정, 순환은 의도된 동작
        self.last_pushed_index = header.frame_index.wrapping_sub(1);
        self.status.set_last_pushed_index(self.last_pushed_index);
        self.set_synced(true);
        self.stats.resyncs += 1;

        if self.config.clear_slots_on_resync {
            for slot in &mut self.slots {
                slot.clear();
            }
        }

        info!(
            "세션 동기화: frame {}, sec {}",
            header.frame_index, header.section_index
        );
    }

    fn set_synced(&mut self, synced: bool) {
        if self.synced && !synced {
            self.stats.sync_losses += 1;
        }
        self.synced = synced;
        self.status.set_synced(synced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FramePool;
    use crate::sink::{ChannelSink, FrameReceiver};
    use std::time::Duration;

    struct Harness {
        engine: Reassembler,
        pool: Arc<FramePool>,
        frames: FrameReceiver,
        t0: Instant,
    }

    impl Harness {
        fn new(config: Config) -> Self {
            let pool = FramePool::from_config(&config);
            let (sink, frames) = ChannelSink::new(pool.clone(), 16);
            let engine = Reassembler::new(config, sink);
            Self {
                engine,
                pool,
                frames,
                t0: Instant::now(),
            }
        }

        fn at(&self, ms: u64) -> Instant {
            self.t0 + Duration::from_millis(ms)
        }

        fn send(
            &mut self,
            ms: u64,
            frame: u16,
            section: u16,
            frame_len: u32,
            payload: &[u8],
        ) -> PacketOutcome {
            let datagram = packet(frame, section, frame_len, payload);
            let now = self.at(ms);
            self.engine.on_packet_at(&datagram, now)
        }

        fn find_or_evict(&mut self, frame: u16) -> Option<usize> {
            self.engine.find_or_evict_slot(frame)
        }

        fn occupied_frames(&self) -> Vec<u16> {
            self.engine
                .slots
                .iter()
                .filter(|s| s.is_occupied())
                .map(|s| s.frame_index)
                .collect()
        }
    }

    fn packet(frame: u16, section: u16, frame_len: u32, payload: &[u8]) -> Vec<u8> {
        let mut datagram = SectionHeader::new(frame, section, frame_len).encode().to_vec();
        datagram.extend_from_slice(payload);
        datagram
    }

    /// 슬롯 2, 버퍼 2, 섹션당 5바이트
    fn small_config() -> Config {
        Config {
            slot_count: 2,
            pool_size: 2,
            buffer_capacity: 1024,
            max_sections: 32,
            max_payload_size: 5,
            ..Config::default()
        }
    }

    #[test]
    fn test_two_section_frame_completes() {
        let mut h = Harness::new(small_config());

        assert_eq!(
            h.send(0, 1, 0, 10, b"hello"),
            PacketOutcome::Buffered { frame_index: 1 }
        );
        assert_eq!(
            h.send(1, 1, 1, 10, b"world"),
            PacketOutcome::Completed { frame_index: 1 }
        );

        let frame = h.frames.try_recv().unwrap();
        assert_eq!(frame.frame_index, 1);
        assert!(frame.complete);
        assert_eq!(frame.len(), 10);
        assert_eq!(frame.data(), b"helloworld");
        assert_eq!(h.engine.last_pushed_index(), 1);
        assert_eq!(h.engine.occupied_slots(), 0);

        // 소비자가 들고 있는 동안 버퍼 하나 사용 중
        assert_eq!(h.pool.free_count(), 1);
        drop(frame);
        assert_eq!(h.pool.free_count(), 2);
    }

    #[test]
    fn test_out_of_order_sections() {
        let mut h = Harness::new(small_config());

        h.send(0, 3, 2, 12, b"!!");
        h.send(0, 3, 0, 12, b"abcde");
        let outcome = h.send(0, 3, 1, 12, b"fghij");

        assert_eq!(outcome, PacketOutcome::Completed { frame_index: 3 });
        assert_eq!(h.frames.try_recv().unwrap().data(), b"abcdefghij!!");
    }

    #[test]
    fn test_duplicate_section_counted_once() {
        let mut h = Harness::new(small_config());

        h.send(0, 1, 0, 15, b"aaaaa");
        assert_eq!(
            h.send(0, 1, 0, 15, b"aaaaa"),
            PacketOutcome::Dropped(DropReason::DuplicateSection)
        );
        assert_eq!(h.engine.slots[0].received_length, 5);

        h.send(0, 1, 1, 15, b"bbbbb");
        assert!(h.frames.try_recv().is_err());
        assert_eq!(
            h.send(0, 1, 2, 15, b"ccccc"),
            PacketOutcome::Completed { frame_index: 1 }
        );
        assert_eq!(h.engine.stats().drops(DropReason::DuplicateSection), 1);
    }

    #[test]
    fn test_completion_requires_all_sections() {
        let config = Config {
            max_payload_size: 4,
            ..small_config()
        };
        let mut h = Harness::new(config);
        // N=10, P=4 -> ceil(10/4) = 3 섹션
        let data = b"0123456789";

        for (i, chunk) in data.chunks(4).enumerate() {
            let outcome = h.send(0, 1, i as u16, 10, chunk);
            if i < 2 {
                assert_eq!(outcome, PacketOutcome::Buffered { frame_index: 1 });
            } else {
                assert_eq!(outcome, PacketOutcome::Completed { frame_index: 1 });
            }
        }
        assert_eq!(h.frames.try_recv().unwrap().data(), data);
    }

    #[test]
    fn test_malformed_packets_dropped() {
        let mut h = Harness::new(small_config());

        assert_eq!(
            h.engine.on_packet_at(&[1, 2, 3], h.t0),
            PacketOutcome::Dropped(DropReason::TooShort)
        );
        assert_eq!(
            h.send(0, 1, 0, 2048, b"x"),
            PacketOutcome::Dropped(DropReason::FrameTooLarge)
        );
        assert_eq!(
            h.send(0, 1, 0, 0, b"x"),
            PacketOutcome::Dropped(DropReason::EmptyFrame)
        );
        assert_eq!(
            h.send(0, 1, 0, 100, b"toolong"),
            PacketOutcome::Dropped(DropReason::Oversized)
        );
        assert_eq!(h.engine.stats().total_drops(), 4);
        assert!(!h.engine.is_synced());
    }

    #[test]
    fn test_section_validation() {
        let mut h = Harness::new(small_config());

        assert_eq!(
            h.send(0, 1, 32, 100, b"x"),
            PacketOutcome::Dropped(DropReason::SectionOutOfRange)
        );
        assert_eq!(
            h.send(0, 1, 0, 100, b""),
            PacketOutcome::Dropped(DropReason::EmptyPayload)
        );
        // 섹션 2의 오프셋 10 + 5 > 12
        assert_eq!(
            h.send(0, 2, 2, 12, b"abcde"),
            PacketOutcome::Dropped(DropReason::SectionOverflow)
        );
        assert_eq!(h.engine.slots[0].received_length, 0);
        assert_eq!(h.engine.slots[1].received_length, 0);
    }

    #[test]
    fn test_stale_frame_dropped_while_synced() {
        let mut h = Harness::new(small_config());

        h.send(0, 10, 0, 5, b"aaaaa");
        assert_eq!(h.engine.last_pushed_index(), 10);

        assert_eq!(
            h.send(1, 10, 0, 5, b"aaaaa"),
            PacketOutcome::Dropped(DropReason::Stale)
        );
        assert_eq!(
            h.send(1, 9, 0, 5, b"aaaaa"),
            PacketOutcome::Dropped(DropReason::Stale)
        );
        assert!(h.engine.is_synced());
    }

    #[test]
    fn test_first_packet_establishes_baseline() {
        let mut h = Harness::new(small_config());

        h.send(0, 0, 0, 10, b"aaaaa");
        assert!(h.engine.is_synced());
        // 0 - 1 은 65535로 순환
        assert_eq!(h.engine.last_pushed_index(), 65535);
        assert!(h.engine.status().is_synced());
        assert_eq!(h.engine.status().last_pushed_index(), 65535);
    }

    #[test]
    fn test_abnormal_regression_forces_resync() {
        let mut h = Harness::new(small_config());

        h.send(0, 1000, 0, 5, b"aaaaa");
        assert_eq!(h.engine.last_pushed_index(), 1000);
        assert_eq!(h.engine.stats().resyncs, 1);

        // 800 - 1000 = -200 < -180
        let outcome = h.send(1, 800, 0, 10, b"bbbbb");
        assert_eq!(outcome, PacketOutcome::Buffered { frame_index: 800 });
        assert!(h.engine.is_synced());
        assert_eq!(h.engine.last_pushed_index(), 799);
        assert_eq!(h.engine.stats().resyncs, 2);
        assert_eq!(h.engine.stats().sync_losses, 1);
    }

    #[test]
    fn test_small_regression_is_only_stale() {
        let mut h = Harness::new(small_config());

        h.send(0, 1000, 0, 5, b"aaaaa");
        assert_eq!(
            h.send(1, 900, 0, 5, b"aaaaa"),
            PacketOutcome::Dropped(DropReason::Stale)
        );
        assert_eq!(h.engine.last_pushed_index(), 1000);
    }

    #[test]
    fn test_sync_timeout_resyncs_on_next_packet() {
        let mut h = Harness::new(small_config());

        h.send(0, 50, 0, 5, b"aaaaa");
        assert!(h.engine.is_synced());

        // 1000ms 초과 후 이전 프레임도 새 기준으로 받아들임
        let outcome = h.send(1500, 40, 0, 10, b"bbbbb");
        assert_eq!(outcome, PacketOutcome::Buffered { frame_index: 40 });
        assert_eq!(h.engine.last_pushed_index(), 39);
        assert_eq!(h.engine.stats().sync_losses, 1);
    }

    #[test]
    fn test_sweep_detects_sync_timeout() {
        let mut h = Harness::new(small_config());

        h.send(0, 1, 0, 5, b"aaaaa");
        h.engine.sweep_at(h.at(500));
        assert!(h.engine.is_synced());

        h.engine.sweep_at(h.at(1001));
        assert!(!h.engine.is_synced());
        assert!(!h.engine.status().is_synced());
    }

    #[test]
    fn test_resync_clears_slots() {
        let mut h = Harness::new(small_config());

        h.send(0, 100, 0, 10, b"aaaaa");
        assert_eq!(h.engine.occupied_slots(), 1);

        h.send(1500, 5, 0, 10, b"bbbbb");
        // 이전 슬롯은 정리되고 새 프레임만 남음
        assert_eq!(h.engine.occupied_slots(), 1);
        assert_eq!(h.engine.slots[0].frame_index, 5);
        assert_eq!(h.pool.free_count(), 1);
    }

    #[test]
    fn test_resync_keeps_slots_when_disabled() {
        let config = Config {
            clear_slots_on_resync: false,
            ..small_config()
        };
        let mut h = Harness::new(config);

        h.send(0, 100, 0, 10, b"aaaaa");
        h.send(1500, 5, 0, 10, b"bbbbb");

        assert_eq!(h.engine.occupied_slots(), 2);
        assert_eq!(h.pool.free_count(), 0);
    }

    #[test]
    fn test_complete_leaves_older_slots_by_default() {
        let config = Config {
            slot_count: 3,
            pool_size: 3,
            ..small_config()
        };
        let mut h = Harness::new(config);

        h.send(0, 1, 0, 10, b"aaaaa");
        h.send(1, 2, 0, 5, b"bbbbb");

        assert_eq!(h.frames.try_recv().unwrap().frame_index, 2);
        assert_eq!(h.engine.occupied_slots(), 1);

        // 늦게 도착한 프레임 1의 섹션은 이제 stale
        assert_eq!(
            h.send(2, 1, 1, 10, b"ccccc"),
            PacketOutcome::Dropped(DropReason::Stale)
        );
    }

    #[test]
    fn test_complete_clears_older_slots_when_enabled() {
        let config = Config {
            slot_count: 3,
            pool_size: 3,
            clear_older_on_complete: true,
            ..small_config()
        };
        let mut h = Harness::new(config);

        h.send(0, 1, 0, 10, b"aaaaa");
        h.send(0, 3, 0, 10, b"ccccc");
        h.send(1, 2, 0, 5, b"bbbbb");

        // 프레임 1은 정리, 프레임 3은 유지
        assert_eq!(h.engine.occupied_slots(), 1);
        assert_eq!(h.engine.slots.iter().find(|s| s.is_occupied()).unwrap().frame_index, 3);
        drop(h.frames.try_recv().unwrap());
        assert_eq!(h.pool.free_count(), 2);
    }

    #[test]
    fn test_eviction_prefers_small_frames() {
        let config = Config {
            slot_count: 3,
            pool_size: 4,
            large_frame_threshold: 20,
            ..small_config()
        };
        let mut h = Harness::new(config);

        // 가장 오래된 것은 큰 프레임이지만, 작은 프레임이 먼저 축출되어야 함
        h.send(0, 1, 0, 100, b"LLLLL");
        h.send(1, 2, 0, 100, b"LLLLL");
        h.send(2, 3, 0, 10, b"sssss");

        h.send(3, 4, 0, 100, b"NNNNN");

        let frames = h.occupied_frames();
        assert_eq!(frames, vec![1, 2, 4]);
        assert_eq!(h.engine.stats().slots_evicted, 1);
    }

    #[test]
    fn test_eviction_picks_oldest_small() {
        let config = Config {
            slot_count: 3,
            pool_size: 4,
            large_frame_threshold: 20,
            ..small_config()
        };
        let mut h = Harness::new(config);

        h.send(0, 1, 0, 100, b"LLLLL");
        h.send(5, 2, 0, 10, b"sssss");
        h.send(2, 3, 0, 10, b"sssss");

        h.find_or_evict(4);
        let frames = h.occupied_frames();
        assert_eq!(frames, vec![1, 2]);
    }

    #[test]
    fn test_eviction_falls_back_to_oldest_large() {
        let config = Config {
            slot_count: 2,
            pool_size: 3,
            large_frame_threshold: 20,
            ..small_config()
        };
        let mut h = Harness::new(config);

        h.send(3, 1, 0, 100, b"LLLLL");
        h.send(1, 2, 0, 100, b"LLLLL");
        h.send(4, 3, 0, 100, b"NNNNN");

        let frames = h.occupied_frames();
        assert_eq!(frames, vec![1, 3]);
    }

    #[test]
    fn test_find_slot_reuses_existing_frame() {
        let mut h = Harness::new(small_config());

        h.send(0, 7, 0, 10, b"aaaaa");
        assert_eq!(h.find_or_evict(7), Some(0));
        assert_eq!(h.find_or_evict(8), Some(1));
        assert_eq!(h.engine.stats().slots_evicted, 0);
    }

    #[test]
    fn test_pool_exhaustion_drops_packet() {
        let config = Config {
            slot_count: 3,
            pool_size: 1,
            ..small_config()
        };
        let mut h = Harness::new(config);

        h.send(0, 1, 0, 10, b"aaaaa");
        assert_eq!(
            h.send(0, 2, 0, 10, b"bbbbb"),
            PacketOutcome::Dropped(DropReason::PoolExhausted)
        );
        // 기존 프레임은 계속 조립 가능
        assert_eq!(
            h.send(0, 1, 1, 10, b"aaaaa"),
            PacketOutcome::Completed { frame_index: 1 }
        );
    }

    #[test]
    fn test_sweep_expires_stale_slot() {
        let mut h = Harness::new(small_config());

        h.send(0, 1, 0, 10, b"aaaaa");
        assert_eq!(h.pool.free_count(), 1);

        assert_eq!(h.engine.sweep_at(h.at(70)), SweepOutcome::default());
        assert_eq!(h.engine.occupied_slots(), 1);

        let outcome = h.engine.sweep_at(h.at(71));
        assert_eq!(outcome.expired, 1);
        assert_eq!(outcome.partial_pushed, 0);
        assert_eq!(h.engine.occupied_slots(), 0);
        assert_eq!(h.pool.free_count(), 2);
        assert!(h.frames.try_recv().is_err());
    }

    #[test]
    fn test_sweep_pushes_partial_frame() {
        let config = Config {
            push_partial_frames: true,
            min_partial_ratio: 0.6,
            ..small_config()
        };
        let mut h = Harness::new(config);

        h.send(0, 4, 0, 15, b"aaaaa");
        h.send(0, 4, 2, 15, b"ccccc");

        let outcome = h.engine.sweep_at(h.at(100));
        assert_eq!(outcome.partial_pushed, 1);

        let frame = h.frames.try_recv().unwrap();
        assert_eq!(frame.frame_index, 4);
        assert!(!frame.complete);
        assert_eq!(frame.len(), 15);
        assert_eq!(h.engine.last_pushed_index(), 4);
        assert_eq!(h.engine.stats().frames_partial, 1);
    }

    #[test]
    fn test_sweep_skips_partial_below_ratio() {
        let config = Config {
            push_partial_frames: true,
            min_partial_ratio: 0.9,
            ..small_config()
        };
        let mut h = Harness::new(config);

        h.send(0, 4, 0, 15, b"aaaaa");

        let outcome = h.engine.sweep_at(h.at(100));
        assert_eq!(
            outcome,
            SweepOutcome {
                expired: 1,
                partial_pushed: 0,
                partial_rejected: 0,
            }
        );
        assert!(h.frames.try_recv().is_err());
    }

    #[test]
    fn test_sweep_never_pushes_older_partial() {
        let config = Config {
            slot_count: 3,
            pool_size: 3,
            push_partial_frames: true,
            min_partial_ratio: 0.5,
            ..small_config()
        };
        let mut h = Harness::new(config);

        h.send(0, 1, 0, 10, b"aaaaa");
        h.send(0, 2, 0, 5, b"bbbbb");
        drop(h.frames.try_recv().unwrap());

        // 프레임 1은 50%지만 이미 프레임 2가 전달됨
        let outcome = h.engine.sweep_at(h.at(100));
        assert_eq!(
            outcome,
            SweepOutcome {
                expired: 1,
                partial_pushed: 0,
                partial_rejected: 0,
            }
        );
        assert!(h.frames.try_recv().is_err());
        assert_eq!(h.engine.last_pushed_index(), 2);
    }

    #[test]
    fn test_sink_rejection_drops_frame() {
        let config = small_config();
        let pool = FramePool::from_config(&config);
        let (sink, frames) = ChannelSink::new(pool.clone(), 1);
        let mut engine = Reassembler::new(config, sink);
        let now = Instant::now();

        assert_eq!(
            engine.on_packet_at(&packet(1, 0, 5, b"aaaaa"), now),
            PacketOutcome::Completed { frame_index: 1 }
        );
        assert_eq!(
            engine.on_packet_at(&packet(2, 0, 5, b"bbbbb"), now),
            PacketOutcome::SinkRejected { frame_index: 2 }
        );

        // 거절되어도 인덱스는 진행
        assert_eq!(engine.last_pushed_index(), 2);
        assert_eq!(engine.stats().frames_rejected, 1);
        assert_eq!(pool.free_count(), 1);
        drop(frames);
    }

    #[test]
    fn test_sweep_counts_rejected_partial_frame() {
        let config = Config {
            push_partial_frames: true,
            min_partial_ratio: 0.5,
            ..small_config()
        };
        let pool = FramePool::from_config(&config);
        let (sink, frames) = ChannelSink::new(pool.clone(), 1);
        let mut engine = Reassembler::new(config, sink);
        let t0 = Instant::now();

        // 프레임 1이 큐를 채움
        assert_eq!(
            engine.on_packet_at(&packet(1, 0, 5, b"aaaaa"), t0),
            PacketOutcome::Completed { frame_index: 1 }
        );
        // 프레임 2는 절반만 도착
        assert_eq!(
            engine.on_packet_at(&packet(2, 0, 10, b"bbbbb"), t0),
            PacketOutcome::Buffered { frame_index: 2 }
        );

        let outcome = engine.sweep_at(t0 + Duration::from_millis(100));
        assert_eq!(
            outcome,
            SweepOutcome {
                expired: 1,
                partial_pushed: 0,
                partial_rejected: 1,
            }
        );
        assert_eq!(engine.stats().frames_partial, 0);
        assert_eq!(engine.stats().frames_rejected, 1);
        assert_eq!(engine.last_pushed_index(), 2);

        // 거절된 버퍼는 풀로 반환, 큐에 남은 프레임 1만 사용 중
        assert_eq!(pool.free_count(), 1);
        assert_eq!(frames.try_recv().unwrap().frame_index, 1);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_wraparound_sequence() {
        let mut h = Harness::new(small_config());

        for (i, frame) in [65534u16, 65535, 0, 1].into_iter().enumerate() {
            assert_eq!(
                h.send(i as u64, frame, 0, 5, b"zzzzz"),
                PacketOutcome::Completed { frame_index: frame }
            );
            drop(h.frames.try_recv().unwrap());
        }
        assert_eq!(h.engine.last_pushed_index(), 1);
        assert_eq!(h.engine.stats().resyncs, 1);
    }
}
