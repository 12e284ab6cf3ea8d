//! framerx 송신기
//!
//! 합성 프레임 또는 파일 내용을 섹션으로 나눠 일정 fps로 전송한다.
//!
//! 사용법:
//!   cargo run --release --bin framerx-send -- [OPTIONS]
//!
//! 예시:
//!   # 30fps, 100KB 합성 프레임
//!   cargo run --release --bin framerx-send -- --target 127.0.0.1:7000 --fps 30 --size 100000
//!
//!   # 파일을 프레임 크기로 잘라 전송 + 10% 중복
//!   cargo run --release --bin framerx-send -- -f video.bin --size 65536 --redundancy 0.1

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::RngCore;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use framerx::{Config, FrameSender};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 송신기 설정
struct SendOptions {
    bind_addr: SocketAddr,
    target: SocketAddr,
    file_path: Option<PathBuf>,
    frame_size: usize,
    fps: u32,
    /// 0이면 무한 (파일 모드에서는 파일 끝까지)
    frame_count: u64,
    config: Config,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            target: SocketAddr::from(([127, 0, 0, 1], 7000)),
            file_path: None,
            frame_size: 64 * 1024,
            fps: 30,
            frame_count: 0,
            config: Config::default(),
        }
    }
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, BoxError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} 옵션에 값이 필요합니다", flag).into())
}

fn parse_args() -> Result<SendOptions, BoxError> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = SendOptions::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--bind" | "-b" => {
                options.bind_addr = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--target" | "-t" => {
                options.target = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--file" | "-f" => {
                options.file_path = Some(PathBuf::from(value(&args, i, flag)?));
                i += 1;
            }
            "--size" | "-s" => {
                options.frame_size = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--fps" => {
                options.fps = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--count" | "-n" => {
                options.frame_count = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--payload-size" => {
                options.config.max_payload_size = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--interval-us" => {
                options.config.section_interval_us = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--redundancy" => {
                options.config.redundancy_ratio = value(&args, i, flag)?.parse()?;
                i += 1;
            }
            "--help" | "-h" => {
                println!(
                    r#"framerx-send - UDP 섹션 프레임 송신기

사용법:
  cargo run --release --bin framerx-send -- [OPTIONS]

옵션:
  -b, --bind <ADDR>        바인드 주소 (기본: 0.0.0.0:0)
  -t, --target <ADDR>      수신기 주소 (기본: 127.0.0.1:7000)
  -f, --file <PATH>        전송할 파일 (없으면 무작위 합성 프레임)
  -s, --size <BYTES>       프레임 크기 (기본: 65536)
  --fps <N>                초당 프레임 수 (기본: 30)
  -n, --count <N>          전송할 프레임 수, 0이면 무한 (기본: 0)
  --payload-size <BYTES>   섹션 페이로드 최대 크기 (기본: 1392)
  --interval-us <US>       섹션 간 전송 간격 (기본: 0)
  --redundancy <RATIO>     중복 전송 비율 0.0~1.0 (기본: 0.0)
  -h, --help               이 도움말 출력
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

    if options.fps == 0 {
        return Err("fps는 0보다 커야 합니다".into());
    }
    options.config.validate()?;
    Ok(options)
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

    let file_data = match &options.file_path {
        Some(path) => {
            info!("Loading file: {:?}", path);
            Some(std::fs::read(path)?)
        }
        None => None,
    };

    let mut sender =
        FrameSender::bind(options.config.clone(), options.bind_addr, options.target).await?;

    info!("framerx sender starting...");
    info!("Local: {}, target: {}", sender.local_addr()?, options.target);
    info!(
        "Frame size: {} bytes @ {} fps, payload: {} bytes, redundancy: {:.1}%",
        options.frame_size,
        options.fps,
        options.config.max_payload_size,
        options.config.redundancy_ratio * 100.0
    );

    let mut tick = tokio::time::interval(Duration::from_secs(1) / options.fps);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut synthetic = vec![0u8; options.frame_size];
    let mut offset = 0usize;
    let mut sent = 0u64;
    let start = Instant::now();

    loop {
        if options.frame_count > 0 && sent >= options.frame_count {
            break;
        }

        let frame: &[u8] = match &file_data {
            Some(data) => {
                if offset >= data.len() {
                    break;
                }
                let end = (offset + options.frame_size).min(data.len());
                let frame = &data[offset..end];
                offset = end;
                frame
            }
            None => {
                rand::thread_rng().fill_bytes(&mut synthetic);
                &synthetic
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C, stopping...");
                break;
            }
            _ = tick.tick() => {}
        }

        let crc = crc32fast::hash(frame);
        let index = sender.send_frame(frame).await?;
        debug!("프레임 {}: {} bytes, crc32={:08x}", index, frame.len(), crc);
        sent += 1;

        if sent % (options.fps as u64 * 5) == 0 {
            let stats = sender.stats();
            info!(
                "Progress: {} frames, {} datagrams ({} redundant), {:.2} MB",
                stats.frames_sent,
                stats.datagrams_sent,
                stats.redundant_datagrams,
                stats.bytes_sent as f64 / 1_000_000.0
            );
        }
    }

    let elapsed = start.elapsed();
    let stats = sender.stats();
    info!("Transfer complete!");
    info!("  Time: {:.2}s", elapsed.as_secs_f64());
    info!("  Frames: {}", stats.frames_sent);
    info!("  Datagrams: {} ({} redundant)", stats.datagrams_sent, stats.redundant_datagrams);
    info!(
        "  Throughput: {:.2} MB/s",
        stats.bytes_sent as f64 / elapsed.as_secs_f64().max(f64::EPSILON) / 1_000_000.0
    );

    Ok(())
}
