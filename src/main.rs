use actix::System;
use killfeed::{
    env::{run_mode, Settings},
    profile::now_ms,
    protocol::Inbound,
    registry::messages::{GetProfileCount, RequestReset, SubmitSample},
    AppState, LoggerManager,
};
use prometheus::{Encoder, TextEncoder};
use std::{sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[actix::main]
async fn main() -> std::io::Result<()> {
    // 1. 환경변수 로드
    dotenv::dotenv().ok();

    // 2. 설정 파일 로드
    let settings = Settings::new().expect("Failed to load settings");

    // 3. 로거 초기화
    let logger_manager = Arc::new(LoggerManager::setup(&settings));
    info!("Logger initialized (RUN_MODE: {})", run_mode());

    // 4. Metrics 초기화
    let metrics_registry = prometheus::Registry::new();
    metrics::register_custom_metrics(&metrics_registry)
        .expect("Failed to register custom metrics");
    info!("Metrics initialized and registered");

    // 5. 참조 데이터 로드 및 registry actor 시작
    let app_state = AppState::bootstrap(settings, logger_manager, metrics_registry).await;
    info!("ProfileRegistry is running");

    // 6. 전역 Shutdown Token 생성
    let shutdown_token = CancellationToken::new();

    // 7. stdin 의 JSON lines 를 registry 로 전달
    let reader_state = app_state.clone();
    let reader_token = shutdown_token.clone();
    let mut reader = actix::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = reader_token.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) => dispatch(&reader_state, &line).await,
                Ok(None) => {
                    info!("Input stream closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    });

    // 8. 종료 신호 대기
    tokio::select! {
        _ = &mut reader => {
            // 마지막 trailing broadcast 가 나갈 시간을 준다
            let interval = app_state.settings.broadcast.interval_ms;
            tokio::time::sleep(Duration::from_millis(interval * 2)).await;
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received. Initiating graceful shutdown...");
            shutdown_token.cancel();
        },
    }

    match app_state.registry_addr.send(GetProfileCount).await {
        Ok(count) => info!("Shutting down with {} tracked profiles", count),
        Err(e) => warn!("Registry unavailable at shutdown: {}", e),
    }
    dump_metrics(&app_state.metrics_registry);

    System::current().stop();
    info!("System has shut down gracefully");
    Ok(())
}

async fn dispatch(state: &AppState, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match serde_json::from_str::<Inbound>(line) {
        Ok(Inbound::Sample(sample)) => {
            state.registry_addr.do_send(SubmitSample {
                sample,
                received_at: now_ms(),
            });
        }
        Ok(Inbound::Reset { profile_id, scope }) => {
            match state
                .registry_addr
                .send(RequestReset { profile_id, scope })
                .await
            {
                Ok(true) => {}
                Ok(false) => warn!("Reset ignored for unknown profile"),
                Err(e) => error!("Reset request failed: {}", e),
            }
        }
        Err(e) => {
            warn!("Malformed input line skipped: {}", e);
            metrics::PROCESSING_ERRORS_TOTAL.inc();
        }
    }
}

fn dump_metrics(registry: &prometheus::Registry) {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("Metrics encode error: {}", e);
        return;
    }
    debug!("{}", String::from_utf8_lossy(&buffer));
}
