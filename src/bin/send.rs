//! DTP 송신기
//!
//! UDP 채널 위로 파일 하나를 보내고 완료까지 대기
//!
//! 사용법:
//!   cargo run --release --bin dtp-send -- --peer 127.0.0.1:9000 --file data.bin
//!
//! 예시:
//!   # 불안정한 네트워크용 설정으로 송신
//!   cargo run --release --bin dtp-send -- -p 10.0.0.2:9000 -f data.bin --preset unstable

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dtp::{Config, Endpoint, OutgoingFile, UdpChannel, PROTOCOL_VERSION};

type BoxError = Box<dyn std::error::Error>;

/// 송신기 설정
struct SendArgs {
    bind_addr: SocketAddr,
    peer_addr: SocketAddr,
    file: Option<PathBuf>,
    config: Config,
}

impl Default for SendArgs {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9001)),
            peer_addr: SocketAddr::from(([127, 0, 0, 1], 9000)),
            file: None,
            config: Config::default(),
        }
    }
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, BoxError> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} 값 필요", flag).into())
}

fn parse_args() -> Result<SendArgs, BoxError> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = SendArgs::default();
    let mut chunk_size = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => parsed.bind_addr = next_value(&args, &mut i, "--bind")?.parse()?,
            "--peer" | "-p" => parsed.peer_addr = next_value(&args, &mut i, "--peer")?.parse()?,
            "--file" | "-f" => {
                parsed.file = Some(PathBuf::from(next_value(&args, &mut i, "--file")?));
            }
            "--chunk-size" | "-c" => {
                chunk_size = Some(next_value(&args, &mut i, "--chunk-size")?.parse()?);
            }
            "--preset" => {
                parsed.config = match next_value(&args, &mut i, "--preset")? {
                    "low" => Config::low_spec(),
                    "high" => Config::high_performance(),
                    "unstable" => Config::unstable_network(),
                    other => return Err(format!("알 수 없는 preset: {}", other).into()),
                };
            }
            "--help" | "-h" => {
                println!(
                    r#"DTP Send - 데이터그램 청크 파일 송신기

사용법:
  cargo run --release --bin dtp-send -- [OPTIONS]

옵션:
  -b, --bind <ADDR>        로컬 바인드 주소 (기본: 0.0.0.0:9001)
  -p, --peer <ADDR>        수신측 주소 (기본: 127.0.0.1:9000)
  -f, --file <PATH>        보낼 파일 (필수)
  -c, --chunk-size <BYTES> 청크 크기 (기본: 16384)
  --preset <NAME>          low | high | unstable
  -h, --help               이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (예: RUST_LOG=dtp=debug)
"#
                );
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {}", other).into()),
        }
        i += 1;
    }

    if let Some(chunk_size) = chunk_size {
        parsed.config.chunk_size = chunk_size;
    }
    parsed.config.validate()?;
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args()?;
    let path = args.file.ok_or("--file 필요")?;

    info!("DTP Send starting (protocol v{})...", PROTOCOL_VERSION);
    info!("Peer address: {}", args.peer_addr);

    let (channel, events) = UdpChannel::connect(args.bind_addr, args.peer_addr).await?;
    info!("Bound to local address: {}", channel.local_addr());

    let (endpoint, _receive_events) = Endpoint::spawn(channel.clone(), events, args.config)?;

    let file = OutgoingFile::from_path(&path).await?;
    let handle = endpoint.send_file(file)?;
    info!("File ID: {}", handle.file_id());

    // 진행 상황 출력
    let mut progress = handle.progress();
    let progress_task = tokio::spawn(async move {
        let mut last_percent = 0;
        while progress.changed().await.is_ok() {
            let p = progress.borrow().clone();
            let percent = (p.ratio() * 100.0) as u32;
            if percent / 10 != last_percent / 10 {
                info!(
                    "진행: {}% ({}/{} 청크, ACK {}, 윈도우 {})",
                    percent, p.sent_chunks, p.total_chunks, p.acked_chunks, p.window
                );
            }
            debug!("state={:?}, window={}", p.state, p.window);
            last_percent = percent;
        }
    });

    let outcome = tokio::select! {
        result = handle.finished() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("중단 요청");
            endpoint.close();
            channel.close();
            return Ok(());
        }
    };
    progress_task.abort();

    let report = outcome?;
    info!(
        "전송 완료: {} ({} bytes, {} 청크) in {:.2?}",
        report.file_name, report.bytes, report.total_chunks, report.elapsed
    );
    if let Some(hash) = report.hash {
        info!("SHA-256: {}", hex::encode(hash));
    }
    info!("{}", report.stats.summary(report.elapsed, report.bytes));

    endpoint.close();
    channel.close();
    Ok(())
}
