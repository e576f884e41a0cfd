use actix::{Actor, Addr};
use std::io;
use std::sync::Arc;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    broadcast::{BroadcastSink, JsonLinesSink},
    collaborators::{
        JsonFileStateStore, JsonLinesHistory, KillHistory, KillNotifier, Noop, StateStore,
        TracingNotifier,
    },
    env::Settings,
    monster::{MonsterExpTables, MonsterIndex, MonsterResolver},
    profile::ProfileDeps,
    registry::ProfileRegistry,
};

pub mod broadcast;
pub mod collaborators;
pub mod engine;
pub mod env;
pub mod errors;
pub mod monster;
pub mod profile;
pub mod protocol;
pub mod registry;
pub mod ttk;
pub mod validator;

/// 파일 writer 의 guard 를 쥐고 있다. drop 되면 남은 로그를 flush 한다.
pub struct LoggerManager {
    _file_guard: WorkerGuard,
}

impl LoggerManager {
    /// stderr 콘솔과 일 단위 회전 파일에 같은 필터로 기록한다.
    /// `RUST_LOG` 가 있으면 `server.log_level` 보다 우선한다.
    pub fn setup(settings: &Settings) -> Self {
        let logging = &settings.logging;
        let appender =
            RollingFileAppender::new(Rotation::DAILY, &logging.directory, &logging.filename);
        let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.server.log_level));

        // 콘솔은 한 줄 요약, 모듈 경로로 profile/registry/monster 를 구분한다
        let console_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact();

        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_thread_names(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        tracing::info!(
            "killfeed 로거 준비: stderr + {}/{}",
            logging.directory,
            logging.filename
        );

        Self {
            _file_guard: file_guard,
        }
    }
}

// 프로세스 전체에서 공유하는 상태
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub registry_addr: Addr<ProfileRegistry>,
    pub exp_tables: Arc<MonsterExpTables>,
    pub logger_manager: Arc<LoggerManager>,
    pub metrics_registry: prometheus::Registry,
}

impl AppState {
    /// 참조 데이터를 읽고 collaborator 를 고른 뒤 registry actor 를 띄운다.
    pub async fn bootstrap(
        settings: Settings,
        logger_manager: Arc<LoggerManager>,
        metrics_registry: prometheus::Registry,
    ) -> Self {
        let index = Arc::new(MonsterIndex::load_or_empty(
            &settings.data.monster_reference_path,
        ));
        let exp_tables = Arc::new(MonsterExpTables::new(&settings.data.exp_table_dir));
        let loaded = exp_tables.preload_all().await;
        tracing::info!(
            "{} monsters indexed, {} exp tables preloaded",
            index.len(),
            loaded
        );

        let history: Arc<dyn KillHistory> = match &settings.data.history_path {
            Some(path) => Arc::new(JsonLinesHistory::new(path)),
            None => Arc::new(Noop),
        };
        let store: Arc<dyn StateStore> = match &settings.data.state_dir {
            Some(dir) => Arc::new(JsonFileStateStore::new(dir)),
            None => Arc::new(Noop),
        };
        let notifier: Arc<dyn KillNotifier> = Arc::new(TracingNotifier);
        let sink: Arc<dyn BroadcastSink> = Arc::new(JsonLinesSink);

        let deps = ProfileDeps::new(
            &settings,
            MonsterResolver::new(index),
            exp_tables.clone(),
            history,
            store,
            notifier,
            sink,
        );
        let registry_addr =
            ProfileRegistry::new(deps, settings.server.worker_arbiters).start();

        Self {
            settings,
            registry_addr,
            exp_tables,
            logger_manager,
            metrics_registry,
        }
    }
}
