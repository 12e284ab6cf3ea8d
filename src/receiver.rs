//! 수신자 (수신 드라이버)
//!
//! - UDP 소켓 바인드/재바인드
//! - 백그라운드 수신 루프: 데이터그램을 재조립 엔진으로 전달
//! - 주기적 슬롯 스캔 (패킷이 없어도)
//! - 일시적 소켓 에러는 백오프 후 재시도, 한도 초과 시 치명적 에러로 종료
//!
//! 엔진은 수신 태스크로 이동되어 그 태스크만 `on_packet`/`sweep`을 호출한다.
//! 정지하면 엔진은 다시 `Receiver`로 돌아와 재시작에 쓰인다.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::reassembly::Reassembler;
use crate::stats::{ReassemblyStats, SessionStatus};
use crate::{Config, Error, Result};

/// 수신 버퍼 크기 (잘린 데이터그램을 구분하기 위해 최대 UDP 크기)
const RECV_BUFFER_LEN: usize = 65_536;

/// 수신 루프 종료 시 남기는 값: 돌려줄 엔진과 종료 사유
type LoopExit = (Reassembler, Result<()>);

/// 수신 드라이버
pub struct Receiver {
    config: Config,
    socket: Option<Arc<UdpSocket>>,
    local_addr: Option<SocketAddr>,
    engine: Option<Reassembler>,
    task: Option<JoinHandle<()>>,
    /// 루프가 끝나면 엔진과 결과를 여기에 둔다
    exit: Arc<Mutex<Option<LoopExit>>>,
    running: Arc<AtomicBool>,
    status: Arc<SessionStatus>,
    stats: Arc<RwLock<ReassemblyStats>>,
}

impl Receiver {
    /// 바인드되지 않은 수신자 생성
    ///
    /// 설정은 엔진의 것을 그대로 쓴다.
    pub fn new(engine: Reassembler) -> Self {
        Self {
            config: engine.config().clone(),
            status: engine.status(),
            stats: Arc::new(RwLock::new(engine.stats().clone())),
            socket: None,
            local_addr: None,
            engine: Some(engine),
            task: None,
            exit: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 주소에 바인드
    ///
    /// 수신 루프가 돌고 있으면 먼저 정지한다. 재시작은 [`Receiver::start`]로.
    pub async fn bind(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
        if let Err(e) = self.stop().await {
            warn!("재바인드 전 수신 루프 정지 중 에러: {}", e);
        }

        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_recv_buffer_size(self.config.recv_buffer_size)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        let local_addr = socket.local_addr()?;

        self.socket = Some(Arc::new(socket));
        self.local_addr = Some(local_addr);

        info!("UDP 소켓 바인드: {}", local_addr);
        Ok(local_addr)
    }

    /// 수신 루프 시작
    ///
    /// 이전 루프가 치명적 에러로 끝났으면 그 에러를 기록하고 엔진을 되찾아 재시작한다.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            warn!("수신 루프가 이미 실행 중");
            return Ok(());
        }

        if let Some(Err(e)) = self.reclaim_engine() {
            warn!("이전 수신 루프가 에러로 종료됨: {}, 재시작", e);
        }

        self.config.validate()?;
        let socket = self.socket.clone().ok_or(Error::NotBound)?;
        let engine = self.engine.take().ok_or(Error::EngineUnavailable)?;

        self.running.store(true, Ordering::SeqCst);
        self.task = Some(tokio::spawn(run_loop(
            socket,
            engine,
            self.config.clone(),
            self.running.clone(),
            self.stats.clone(),
            self.exit.clone(),
        )));

        info!("수신 루프 시작: {:?}", self.local_addr);
        Ok(())
    }

    /// 정지 요청 후 수신 루프 종료 대기
    ///
    /// 루프가 치명적 에러로 끝났다면 그 에러를 반환한다.
    pub async fn stop(&mut self) -> Result<()> {
        self.stop_async();

        if let Some(task) = self.task.take() {
            task.await?;
        }

        match self.reclaim_engine() {
            Some(result) => {
                info!("수신 루프 정지");
                result
            }
            None => Ok(()),
        }
    }

    /// 끝난 루프가 남긴 엔진을 되찾고 루프 결과를 반환
    fn reclaim_engine(&mut self) -> Option<Result<()>> {
        let (engine, result) = self.exit.lock().take()?;
        self.engine = Some(engine);
        self.task = None;
        Some(result)
    }

    /// 정지 요청만 보냄 (대기하지 않음)
    pub fn stop_async(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_bound(&self) -> bool {
        self.socket.is_some()
    }

    /// 바인드된 로컬 주소
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 마지막 수신 시각. 수신한 적 없으면 `None`
    pub fn last_receive_time(&self) -> Option<Instant> {
        self.status.last_receive_time()
    }

    /// 공유 세션 상태
    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.clone()
    }

    /// 마지막으로 게시된 통계 스냅샷
    pub fn stats(&self) -> ReassemblyStats {
        self.stats.read().clone()
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop_async();
    }
}

/// 일시적 에러 여부 (커널 버퍼 부족, 시그널 인터럽트, ICMP 도달 불가 통지)
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::OutOfMemory
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
    )
}

/// 수신 에러 처리 결정
#[derive(Debug)]
enum RetryDecision {
    /// 대기 후 재시도
    Retry(Duration),
    /// 루프 종료
    Fatal(Error),
}

/// 연속 일시적 에러 카운터
///
/// 에러마다 `backoff_step * 연속 횟수`만큼 기다리고,
/// `max_consecutive`회를 넘으면 치명적 에러로 바꾼다.
#[derive(Debug)]
struct TransientRetry {
    consecutive: u32,
    max_consecutive: u32,
    backoff_step: Duration,
}

impl TransientRetry {
    fn new(config: &Config) -> Self {
        Self {
            consecutive: 0,
            max_consecutive: config.max_transient_errors,
            backoff_step: Duration::from_millis(config.transient_backoff_ms),
        }
    }

    /// 수신 성공 시 호출
    fn reset(&mut self) {
        self.consecutive = 0;
    }

    fn on_error(&mut self, e: io::Error) -> RetryDecision {
        if !is_transient(&e) {
            error!("수신 에러, 수신 중단: {}", e);
            return RetryDecision::Fatal(Error::Io(e));
        }

        self.consecutive += 1;
        if self.consecutive > self.max_consecutive {
            error!("일시적 수신 에러 {}회 연속, 수신 중단: {}", self.consecutive, e);
            return RetryDecision::Fatal(Error::ReceiveFailed {
                consecutive: self.consecutive,
                source: e,
            });
        }

        let backoff = self.backoff_step * self.consecutive;
        warn!(
            "일시적 수신 에러 ({}회): {}, {:?} 후 재시도",
            self.consecutive, e, backoff
        );
        RetryDecision::Retry(backoff)
    }
}

async fn run_loop(
    socket: Arc<UdpSocket>,
    mut engine: Reassembler,
    config: Config,
    running: Arc<AtomicBool>,
    stats: Arc<RwLock<ReassemblyStats>>,
    exit: Arc<Mutex<Option<LoopExit>>>,
) {
    let status = engine.status();
    let recv_timeout = config.recv_timeout();
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    let mut retry = TransientRetry::new(&config);

    let mut sweep_tick = tokio::time::interval(config.sweep_interval());
    sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let result = loop {
        if !running.load(Ordering::SeqCst) {
            break Ok(());
        }

        tokio::select! {
            _ = sweep_tick.tick() => {
                engine.sweep();
                *stats.write() = engine.stats().clone();
            }
            received = tokio::time::timeout(recv_timeout, socket.recv(&mut buf)) => {
                match received {
                    Ok(Ok(len)) => {
                        retry.reset();
                        let now = Instant::now();
                        status.record_receive(now);
                        engine.on_packet_at(&buf[..len], now);
                    }
                    Ok(Err(e)) => match retry.on_error(e) {
                        RetryDecision::Retry(backoff) => tokio::time::sleep(backoff).await,
                        RetryDecision::Fatal(err) => break Err(err),
                    },
                    Err(_) => {
                        // 타임아웃, 계속
                    }
                }
            }
        }
    };

    *stats.write() = engine.stats().clone();
    debug!("수신 루프 종료: {}", engine.stats().summary());

    // 엔진을 먼저 내려놓아야 running=false를 본 소유자가 바로 재시작할 수 있다
    *exit.lock() = Some((engine, result));
    running.store(false, Ordering::SeqCst);
}
