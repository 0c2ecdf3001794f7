//! DTP 수신기
//!
//! UDP 채널로 들어오는 파일을 조립해 출력 디렉터리에 저장
//!
//! 사용법:
//!   cargo run --release --bin dtp-recv -- --peer 127.0.0.1:9001 --out received/

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dtp::{Config, Endpoint, ReceiveEvent, ReceivedFile, UdpChannel, PROTOCOL_VERSION};

type BoxError = Box<dyn std::error::Error>;

/// 수신기 설정
struct RecvArgs {
    bind_addr: SocketAddr,
    peer_addr: SocketAddr,
    out_dir: PathBuf,
    once: bool,
}

impl Default for RecvArgs {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            peer_addr: SocketAddr::from(([127, 0, 0, 1], 9001)),
            out_dir: PathBuf::from("."),
            once: false,
        }
    }
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, BoxError> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} 값 필요", flag).into())
}

fn parse_args() -> Result<RecvArgs, BoxError> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = RecvArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => parsed.bind_addr = next_value(&args, &mut i, "--bind")?.parse()?,
            "--peer" | "-p" => parsed.peer_addr = next_value(&args, &mut i, "--peer")?.parse()?,
            "--out" | "-o" => parsed.out_dir = PathBuf::from(next_value(&args, &mut i, "--out")?),
            "--once" => parsed.once = true,
            "--help" | "-h" => {
                println!(
                    r#"DTP Recv - 데이터그램 청크 파일 수신기

사용법:
  cargo run --release --bin dtp-recv -- [OPTIONS]

옵션:
  -b, --bind <ADDR>   로컬 바인드 주소 (기본: 0.0.0.0:9000)
  -p, --peer <ADDR>   송신측 주소 (기본: 127.0.0.1:9001)
  -o, --out <DIR>     저장 디렉터리 (기본: 현재 디렉터리)
  --once              파일 하나를 받으면 종료
  -h, --help          이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {}", other).into()),
        }
        i += 1;
    }

    Ok(parsed)
}

/// 경로 성분을 제거한 마지막 이름 (`..`, 빈 문자열, 루트는 None)
fn sanitize(name: &str) -> Option<OsString> {
    Path::new(name).file_name().map(|n| n.to_os_string())
}

/// 상대가 보낸 이름에서 경로 성분을 제거한 저장 경로
///
/// 파일 이름과 fileId 모두 상대가 보낸 값이므로 둘 다 같은 필터를 거침
fn output_path(out_dir: &Path, file: &ReceivedFile) -> PathBuf {
    let name = sanitize(&file.file_name)
        .or_else(|| sanitize(file.file_id.as_str()))
        .unwrap_or_else(|| OsString::from("received.bin"));
    out_dir.join(name)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args()?;
    tokio::fs::create_dir_all(&args.out_dir).await?;

    info!("DTP Recv starting (protocol v{})...", PROTOCOL_VERSION);
    info!("Output directory: {}", args.out_dir.display());

    let (channel, events) = UdpChannel::connect(args.bind_addr, args.peer_addr).await?;
    info!("Listening on {} (peer {})", channel.local_addr(), channel.peer_addr());

    let (endpoint, mut receive_events) = Endpoint::spawn(channel.clone(), events, Config::default())?;

    loop {
        let event = tokio::select! {
            event = receive_events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                info!("중단 요청");
                break;
            }
        };

        match event {
            Some(ReceiveEvent::Started { file_id, meta }) => {
                info!(
                    "수신 시작: {} ({}, {} bytes, {} 청크)",
                    meta.file_name, file_id, meta.file_size, meta.total_chunks
                );
            }
            Some(ReceiveEvent::Progress {
                file_id,
                received,
                total,
            }) => {
                debug!("{}: {}/{}", file_id, received, total);
            }
            Some(ReceiveEvent::Completed(file)) => {
                let path = output_path(&args.out_dir, &file);
                tokio::fs::write(&path, &file.data).await?;
                info!("저장 완료: {} ({} bytes)", path.display(), file.data.len());
                if args.once {
                    break;
                }
            }
            Some(ReceiveEvent::Failed { file_id, error }) => {
                warn!("수신 실패: {}: {}", file_id, error);
            }
            None => break,
        }
    }

    info!("{}", endpoint.receive_stats().summary());
    endpoint.close();
    channel.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use dtp::FileId;

    fn received(file_id: &str, file_name: &str) -> ReceivedFile {
        ReceivedFile {
            file_id: FileId::new(file_id).unwrap(),
            file_name: file_name.to_string(),
            data: Bytes::new(),
        }
    }

    fn assert_inside(out_dir: &Path, path: &Path) {
        assert_eq!(path.parent(), Some(out_dir), "escaped: {}", path.display());
        assert!(path
            .components()
            .all(|c| !matches!(c, std::path::Component::ParentDir)));
    }

    #[test]
    fn test_output_path_strips_directories() {
        let out = Path::new("/srv/out");

        let path = output_path(out, &received("id-1", "../../etc/passwd"));
        assert_eq!(path, Path::new("/srv/out/passwd"));

        let path = output_path(out, &received("id-2", "/abs/name.bin"));
        assert_eq!(path, Path::new("/srv/out/name.bin"));
    }

    #[test]
    fn test_output_path_fallback_is_sanitized() {
        let out = Path::new("/srv/out");

        for (id, name) in [
            ("../../../tmp/evil", ".."),
            ("../x", ""),
            ("/etc/cron.d/job", "/"),
            ("..", ".."),
            ("ok-id", "."),
        ] {
            let path = output_path(out, &received(id, name));
            assert_inside(out, &path);
        }

        assert_eq!(
            output_path(out, &received("../../../tmp/evil", "..")),
            Path::new("/srv/out/evil")
        );
        assert_eq!(
            output_path(out, &received("..", "..")),
            Path::new("/srv/out/received.bin")
        );
    }
}
