//! 재조립 설정

use std::time::Duration;

use crate::header::HEADER_LEN;
use crate::{Error, Result, DEFAULT_MAX_PAYLOAD_SIZE};

/// UDP 데이터그램 페이로드 상한 (IPv4)
const MAX_UDP_PAYLOAD: usize = 65_507;

/// framerx 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 동시에 조립 중일 수 있는 프레임 수 (재조립 슬롯 수)
    pub slot_count: usize,

    /// 프레임 버퍼 풀의 버퍼 개수
    pub pool_size: usize,

    /// 버퍼 하나의 크기 (바이트). 이보다 큰 프레임은 받을 수 없다.
    pub buffer_capacity: usize,

    /// 프레임당 최대 섹션 수
    pub max_sections: usize,

    /// 섹션 하나의 최대 페이로드 크기 (헤더 제외)
    /// 섹션 오프셋은 `section_index * max_payload_size`
    pub max_payload_size: usize,

    /// 이 크기 이상이면 "큰" 프레임으로 분류 (축출 우선순위용)
    pub large_frame_threshold: u32,

    /// 동기 상태에서 허용하는 최소 프레임 인덱스 차이.
    /// 이보다 더 과거의 프레임이 오면 송신측 재시작으로 간주한다.
    pub min_frame_index_diff: i16,

    /// 재조립 타임아웃 (밀리초)
    pub reassembly_timeout_ms: u64,

    /// 동기 타임아웃 (밀리초)
    pub sync_timeout_ms: u64,

    /// 슬롯 스캔 주기 (밀리초)
    pub sweep_interval_ms: u64,

    /// 타임아웃된 미완성 프레임 전달 여부
    pub push_partial_frames: bool,

    /// 미완성 프레임 전달 최소 완성률 (0.0 ~ 1.0)
    pub min_partial_ratio: f64,

    /// 재동기화 시 조립 중인 모든 슬롯 정리
    pub clear_slots_on_resync: bool,

    /// 프레임 완성 시 그보다 이전 프레임의 슬롯도 정리
    pub clear_older_on_complete: bool,

    /// 커널 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// 수신 타임아웃 (밀리초)
    pub recv_timeout_ms: u64,

    /// 치명적 에러로 판단하기 전 허용하는 연속 일시적 에러 수
    pub max_transient_errors: u32,

    /// 일시적 에러 백오프 기본값 (밀리초), 연속 횟수만큼 선형 증가
    pub transient_backoff_ms: u64,

    /// ChannelSink 큐 깊이 (프레임 수)
    pub sink_queue_depth: usize,

    /// 송신측 섹션 전송 간격 (마이크로초)
    /// 0이면 최대 속도로 전송
    pub section_interval_us: u64,

    /// 송신측 중복 전송 비율 (0.0 ~ 1.0)
    pub redundancy_ratio: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slot_count: 5,
            pool_size: 10,
            buffer_capacity: 2 * 1024 * 1024, // 2MB
            max_sections: 1536,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            large_frame_threshold: 5000,
            min_frame_index_diff: -180, // 60fps 기준 약 3초
            reassembly_timeout_ms: 70,
            sync_timeout_ms: 1000,
            sweep_interval_ms: 5,
            push_partial_frames: false,
            min_partial_ratio: 0.9,
            clear_slots_on_resync: true,
            clear_older_on_complete: false,
            recv_buffer_size: 4 * 1024 * 1024, // 4MB
            recv_timeout_ms: 100,
            max_transient_errors: 8,
            transient_backoff_ms: 10,
            sink_queue_depth: 8,
            section_interval_us: 0,
            redundancy_ratio: 0.0,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 헤더를 포함한 최대 데이터그램 크기
    pub fn max_datagram_size(&self) -> usize {
        HEADER_LEN + self.max_payload_size
    }

    /// 프레임을 보내는 데 필요한 섹션 수
    pub fn sections_for(&self, frame_len: usize) -> usize {
        (frame_len + self.max_payload_size - 1) / self.max_payload_size
    }

    pub fn reassembly_timeout(&self) -> Duration {
        Duration::from_millis(self.reassembly_timeout_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(Error::InvalidConfig("slot_count는 0보다 커야 함".into()));
        }
        if self.pool_size == 0 {
            return Err(Error::InvalidConfig("pool_size는 0보다 커야 함".into()));
        }
        if self.buffer_capacity == 0 || self.buffer_capacity > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "buffer_capacity 범위 오류: {}",
                self.buffer_capacity
            )));
        }
        if self.max_sections == 0 || self.max_sections > u16::MAX as usize + 1 {
            return Err(Error::InvalidConfig(format!(
                "max_sections 범위 오류: {}",
                self.max_sections
            )));
        }
        if self.max_payload_size == 0 || self.max_datagram_size() > MAX_UDP_PAYLOAD {
            return Err(Error::InvalidConfig(format!(
                "max_payload_size 범위 오류: {}",
                self.max_payload_size
            )));
        }
        if self.min_frame_index_diff >= 0 {
            return Err(Error::InvalidConfig(
                "min_frame_index_diff는 음수여야 함".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_partial_ratio) {
            return Err(Error::InvalidConfig(format!(
                "min_partial_ratio 범위 오류: {}",
                self.min_partial_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.redundancy_ratio) {
            return Err(Error::InvalidConfig(format!(
                "redundancy_ratio 범위 오류: {}",
                self.redundancy_ratio
            )));
        }
        if self.sweep_interval_ms == 0 || self.recv_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "sweep_interval_ms, recv_timeout_ms는 0보다 커야 함".into(),
            ));
        }
        Ok(())
    }

    /// 저사양 기기용 설정
    pub fn low_spec() -> Self {
        Self {
            slot_count: 3,
            pool_size: 4,
            buffer_capacity: 512 * 1024, // 512KB
            max_sections: 512,
            recv_buffer_size: 1024 * 1024,
            sink_queue_depth: 2,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    ///
    /// 조금 더 기다리고, 거의 완성된 프레임은 깨진 채로라도 내보낸다.
    pub fn lossy_network() -> Self {
        Self {
            slot_count: 8,
            pool_size: 16,
            reassembly_timeout_ms: 120,
            push_partial_frames: true,
            min_partial_ratio: 0.85,
            max_transient_errors: 16,
            ..Self::default()
        }
    }
}
