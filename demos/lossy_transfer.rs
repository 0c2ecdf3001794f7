//! 손실 채널 전송 데모
//!
//! 프로세스 내부 메모리 채널에 무작위 손실을 넣고 파일 하나를 주고받음
//!
//! 사용법:
//!   cargo run --release --example lossy_transfer -- [OPTIONS]
//!
//! 옵션:
//!   --size <KB>     전송 데이터 크기 (KB, 기본: 1024)
//!   --loss <PCT>    청크/ACK 손실률 (%, 기본: 5)

use std::time::Instant;

use bytes::Bytes;
use rand::Rng;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dtp::{Config, Endpoint, MemoryChannel, OutgoingFile, ReceiveEvent};

type BoxError = Box<dyn std::error::Error>;

/// 테스트용 텍스트 데이터 생성
fn generate_test_text(size_kb: usize) -> Bytes {
    let target_size = size_kb * 1024;
    let mut data = Vec::with_capacity(target_size);

    let patterns = [
        "The quick brown fox jumps over the lazy dog. ",
        "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 ",
        "가나다라마바사아자차카타파하 ",
        "Hello, World! This is DTP test data. ",
    ];

    let mut line_num = 0usize;
    while data.len() < target_size {
        let line = format!("[{:08}] {}\n", line_num, patterns[line_num % patterns.len()]);
        data.extend_from_slice(line.as_bytes());
        line_num += 1;
    }

    data.truncate(target_size);
    Bytes::from(data)
}

fn parse_args() -> Result<(usize, f64), BoxError> {
    let args: Vec<String> = std::env::args().collect();
    let mut size_kb = 1024;
    let mut loss = 5.0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--size" => {
                i += 1;
                size_kb = args.get(i).ok_or("--size 값 필요")?.parse()?;
            }
            "--loss" => {
                i += 1;
                loss = args.get(i).ok_or("--loss 값 필요")?.parse()?;
            }
            other => return Err(format!("알 수 없는 옵션: {}", other).into()),
        }
        i += 1;
    }

    Ok((size_kb, loss))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let (size_kb, loss_pct) = parse_args()?;
    let loss = (loss_pct / 100.0).clamp(0.0, 1.0);
    let data = generate_test_text(size_kb);

    info!("데이터 {} KB, 손실률 {:.1}%", size_kb, loss_pct);

    let ((a, a_rx), (b, b_rx)) = MemoryChannel::pair();
    a.set_drop_filter(move |_| rand::thread_rng().gen_bool(loss));
    b.set_drop_filter(move |_| rand::thread_rng().gen_bool(loss));

    let config = Config {
        chunk_timeout: std::time::Duration::from_millis(300),
        watchdog_interval: std::time::Duration::from_millis(100),
        max_retries: 20,
        ..Config::unstable_network()
    };

    let (sender, _) = Endpoint::spawn(a.clone(), a_rx, config.clone())?;
    let (receiver, mut events) = Endpoint::spawn(b.clone(), b_rx, config)?;

    let start = Instant::now();
    let handle = sender.send_file(OutgoingFile::new("demo.txt", data.clone()))?;

    while let Some(event) = events.recv().await {
        match event {
            ReceiveEvent::Completed(file) => {
                if file.data == data {
                    info!("검증 성공: {} bytes in {:.2?}", file.data.len(), start.elapsed());
                } else {
                    warn!("검증 실패: 데이터 불일치");
                }
                break;
            }
            ReceiveEvent::Failed { file_id, error } => {
                warn!("수신 실패: {}: {}", file_id, error);
                break;
            }
            _ => {}
        }
    }

    // 마지막 ACK가 손실되면 송신측은 타임아웃 재전송으로 완료를 확인함
    let report = handle.finished().await?;
    info!("송신: {}", report.stats.summary(report.elapsed, report.bytes));
    info!("수신: {}", receiver.receive_stats().summary());

    a.close();
    Ok(())
}
