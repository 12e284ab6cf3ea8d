//! framerx 수신기
//!
//! UDP 섹션을 받아 프레임으로 재조립하고, 완성 프레임의 CRC-32를 기록한다.
//!
//! 사용법:
//!   cargo run --release --bin framerx-recv -- [OPTIONS]
//!
//! 예시:
//!   # 기본 수신
//!   cargo run --release --bin framerx-recv -- --bind 0.0.0.0:7000
//!
//!   # 미완성 프레임도 전달, 파일로 저장
//!   cargo run --release --bin framerx-recv -- --partial --output frames.bin

use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use framerx::{ChannelSink, Config, FramePool, FrameReceiver, Reassembler, Receiver};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 수신기 설정
struct RecvOptions {
    bind_addr: SocketAddr,
    output_path: Option<PathBuf>,
    stats_interval: Duration,
    config: Config,
}

impl Default for RecvOptions {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7000)),
            output_path: None,
            stats_interval: Duration::from_secs(5),
            config: Config::default(),
        }
    }
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, BoxError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} 옵션에 값이 필요합니다", flag).into())
}

fn parse_args() -> Result<RecvOptions, BoxError> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = RecvOptions::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--bind" | "-b" => {
                options.bind_addr = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--output" | "-o" => {
                options.output_path = Some(PathBuf::from(value(&args, i, flag)?));
                i += 1;
            }
            "--stats-interval" => {
                options.stats_interval = Duration::from_secs(value(&args, i, flag)?.parse()?);
                i += 1;
            }
            "--slots" => {
                options.config.slot_count = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--buffers" => {
                options.config.pool_size = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--buffer-capacity" => {
                options.config.buffer_capacity = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--payload-size" => {
                options.config.max_payload_size = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--timeout-ms" => {
                options.config.reassembly_timeout_ms = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--partial" => {
                options.config.push_partial_frames = true;
            }
            "--low-spec" => {
                options.config = Config::low_spec();
            }
            "--lossy" => {
                options.config = Config::lossy_network();
            }
            "--help" | "-h" => {
                println!(
                    r#"framerx-recv - UDP 섹션 프레임 재조립 수신기

사용법:
  cargo run --release --bin framerx-recv -- [OPTIONS]

옵션:
  -b, --bind <ADDR>          바인드 주소 (기본: 0.0.0.0:7000)
  -o, --output <PATH>        완성 프레임을 이어 붙여 저장할 파일
  --stats-interval <SEC>     통계 출력 주기 초 (기본: 5)
  --slots <N>                재조립 슬롯 수 (기본: 5)
  --buffers <N>              프레임 버퍼 수 (기본: 10)
  --buffer-capacity <BYTES>  버퍼 하나의 용량 (기본: 2097152)
  --payload-size <BYTES>     섹션 페이로드 최대 크기 (기본: 1392)
  --timeout-ms <MS>          재조립 타임아웃 (기본: 70)
  --partial                  타임아웃된 미완성 프레임도 전달
  --low-spec                 저사양 프리셋
  --lossy                    손실 많은 네트워크 프리셋
  -h, --help                 이 도움말 출력

환경 변수:
  RUST_LOG                   로그 필터 (기본: info)
"#
                );
                std::process::exit(0);
            }
            other => {
                warn!("알 수 없는 옵션 무시: {}", other);
            }
        }
        i += 1;
    }

    options.config.validate()?;
    Ok(options)
}

/// 완성 프레임 소비 (블로킹 스레드)
fn drain_frames(
    frames: FrameReceiver,
    mut output: Option<File>,
    running: Arc<AtomicBool>,
) -> std::io::Result<u64> {
    let mut written = 0u64;

    while running.load(Ordering::Relaxed) {
        let frame = match frames.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => frame,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        let crc = crc32fast::hash(frame.data());
        debug!(
            "프레임 {}: {} bytes, crc32={:08x}{}",
            frame.frame_index,
            frame.len(),
            crc,
            if frame.complete { "" } else { " (partial)" }
        );

        if let Some(file) = output.as_mut() {
            file.write_all(frame.data())?;
            written += frame.len() as u64;
        }
        // frame drop 시 버퍼는 풀로 반환
    }

    if let Some(file) = output.as_mut() {
        file.flush()?;
    }
    Ok(written)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = parse_args()?;
    let config = options.config.clone();

    info!("framerx receiver starting...");
    info!(
        "Slots: {}, buffers: {} x {} bytes",
        config.slot_count, config.pool_size, config.buffer_capacity
    );
    info!(
        "Max payload: {} bytes, max sections: {}",
        config.max_payload_size, config.max_sections
    );
    info!(
        "Reassembly timeout: {} ms, partial frames: {}",
        config.reassembly_timeout_ms, config.push_partial_frames
    );

    let pool = FramePool::from_config(&config);
    let (sink, frames) = ChannelSink::new(pool.clone(), config.sink_queue_depth);
    let engine = Reassembler::new(config, sink.clone());

    let mut receiver = Receiver::new(engine);
    receiver.bind(options.bind_addr).await?;
    receiver.start()?;

    let output = match &options.output_path {
        Some(path) => {
            info!("Writing frames to {:?}", path);
            Some(File::create(path)?)
        }
        None => None,
    };

    let draining = Arc::new(AtomicBool::new(true));
    let drain_task = {
        let draining = draining.clone();
        tokio::task::spawn_blocking(move || drain_frames(frames, output, draining))
    };

    let mut stats_tick = tokio::time::interval(options.stats_interval);
    stats_tick.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C, stopping...");
                break;
            }
            _ = stats_tick.tick() => {
                if !receiver.is_running() {
                    warn!("수신 루프가 종료됨");
                    break;
                }
                info!("{}", receiver.stats().summary());
                info!(
                    "Synced: {}, last pushed: {}, pool free: {}/{}, sink pushed/rejected: {}/{}",
                    receiver.status().is_synced(),
                    receiver.status().last_pushed_index(),
                    pool.free_count(),
                    pool.pool_size(),
                    sink.pushed(),
                    sink.rejected(),
                );
            }
        }
    }

    let result = receiver.stop().await;
    draining.store(false, Ordering::Relaxed);
    let written = drain_task.await??;

    info!("Final: {}", receiver.stats().summary());
    if options.output_path.is_some() {
        info!("Bytes written: {}", written);
    }

    result?;
    Ok(())
}
