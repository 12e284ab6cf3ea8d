//! # framerx
//!
//! UDP 섹션 기반 프레임 재조립 수신기
//!
//! ## 핵심 특징
//! - **섹션 재조립**: 8바이트 헤더가 붙은 섹션들을 프레임 단위로 조립
//! - **고정 버퍼 풀**: 수신 중 할당 없음, 버퍼는 핸들 Drop 시 자동 반환
//! - **순환 인덱스**: 16비트 프레임 인덱스의 wraparound 비교
//! - **슬롯 축출/만료**: 오래된 미완성 프레임을 자동 정리, 선택적으로 부분 프레임 전달
//! - **동기 추적**: 송신측 재시작/장기 정지를 감지해 재동기화
//! - **수신 드라이버**: tokio 기반 백그라운드 수신 루프, 재바인드 지원

pub mod config;
pub mod error;
pub mod header;
pub mod pool;
pub mod reassembly;
pub mod receiver;
pub mod sender;
pub mod sink;
pub mod splitter;
pub mod stats;

pub use config::Config;
pub use error::{Error, Result};
pub use header::{FrameIndex, SectionHeader, SectionIndex, HEADER_LEN};
pub use pool::{BufferHandle, FramePool};
pub use reassembly::{DropReason, PacketOutcome, Reassembler, SweepOutcome};
pub use receiver::Receiver;
pub use sender::{FrameSender, SenderStats};
pub use sink::{AssembledFrame, ChannelSink, FrameReceiver, FrameSink};
pub use splitter::FrameSplitter;
pub use stats::{ReassemblyStats, SessionStatus};

/// 기본 MTU (바이트)
pub const DEFAULT_MTU: usize = 1400;

/// 기본 섹션 페이로드 최대 크기 (MTU - 헤더)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = DEFAULT_MTU - HEADER_LEN;
