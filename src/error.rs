//! 에러 타입 정의
//!
//! 패킷 단위의 문제(손상, 중복, 자원 부족)는 에러가 아니라
//! [`crate::reassembly::PacketOutcome`]으로 보고된다.
//! 여기의 에러는 설정 오류와 전송 계층 실패만 다룬다.

use thiserror::Error;

/// framerx 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("소켓이 바인드되지 않음")]
    NotBound,

    #[error("재조립 엔진을 사용할 수 없음 (수신 루프가 아직 종료 중이거나 패닉으로 종료됨)")]
    EngineUnavailable,

    #[error("수신 실패: 연속 {consecutive}회 일시적 에러 후 중단")]
    ReceiveFailed {
        consecutive: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("프레임 크기 초과: {len} bytes (최대 {max} bytes)")]
    FrameTooLarge { len: usize, max: usize },

    #[error("수신 태스크 조인 실패: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
