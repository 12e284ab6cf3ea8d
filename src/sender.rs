//! 송신자
//!
//! 수신 엔진 시험과 도구용 최소 송신측.
//! - 프레임 인덱스 자동 증가 (65536에서 순환)
//! - 섹션 간 전송 간격 (pacing)
//! - Forward Redundancy: 일부 섹션을 한 번 더 전송

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::header::FrameIndex;
use crate::splitter::FrameSplitter;
use crate::{Config, Result};

/// 송신 통계
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderStats {
    pub frames_sent: u64,
    pub datagrams_sent: u64,
    pub redundant_datagrams: u64,
    pub bytes_sent: u64,
}

/// 프레임 송신자
pub struct FrameSender {
    config: Config,
    socket: UdpSocket,
    target: SocketAddr,
    splitter: FrameSplitter,
    next_frame_index: FrameIndex,
    stats: SenderStats,
}

impl FrameSender {
    /// 소켓을 바인드하고 송신자 생성
    pub async fn bind(config: Config, bind_addr: SocketAddr, target: SocketAddr) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(bind_addr).await?;

        Ok(Self {
            splitter: FrameSplitter::new(config.max_payload_size, config.max_sections),
            config,
            socket,
            target,
            next_frame_index: 0,
            stats: SenderStats::default(),
        })
    }

    /// 다음에 사용할 프레임 인덱스
    pub fn next_frame_index(&self) -> FrameIndex {
        self.next_frame_index
    }

    /// 프레임 인덱스 재설정 (송신측 세션 재시작)
    pub fn set_next_frame_index(&mut self, index: FrameIndex) {
        self.next_frame_index = index;
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// 프레임 하나 전송, 사용한 프레임 인덱스 반환
    pub async fn send_frame(&mut self, data: &[u8]) -> Result<FrameIndex> {
        let frame_index = self.next_frame_index;
        let datagrams = self.splitter.split(frame_index, data)?;
        let redundant = if self.config.redundancy_ratio > 0.0 {
            self.splitter
                .redundant_sections(&datagrams, self.config.redundancy_ratio)
        } else {
            Vec::new()
        };

        self.transmit(&datagrams).await?;
        self.transmit(&redundant).await?;

        self.next_frame_index = frame_index.wrapping_add(1);
        self.stats.frames_sent += 1;
        self.stats.redundant_datagrams += redundant.len() as u64;

        debug!(
            "프레임 {} 전송: {} bytes, {} 섹션 + {} 중복",
            frame_index,
            data.len(),
            datagrams.len(),
            redundant.len()
        );

        Ok(frame_index)
    }

    async fn transmit(&mut self, datagrams: &[Bytes]) -> Result<()> {
        for datagram in datagrams {
            self.socket.send_to(datagram, self.target).await?;
            self.stats.datagrams_sent += 1;
            self.stats.bytes_sent += datagram.len() as u64;

            if self.config.section_interval_us > 0 {
                tokio::time::sleep(Duration::from_micros(self.config.section_interval_us)).await;
            }
        }
        Ok(())
    }
}
