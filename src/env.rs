use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::{errors::KillfeedResult, monster::MonsterRank};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub server: ServerSettings,
    #[serde(default)]
    pub detection: DetectionSettings,
    #[serde(default)]
    pub ttk: TtkSettings,
    #[serde(default)]
    pub broadcast: BroadcastSettings,
    pub data: DataSettings,
}

/// `RUN_MODE` 가 없으면 development
pub fn run_mode() -> String {
    std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into())
}

impl Settings {
    /// `config/{RUN_MODE}.toml` 위에 `APP__` 환경변수를 덮어쓴다.
    /// stdout 에는 아무것도 쓰지 않는다.
    pub fn new() -> KillfeedResult<Self> {
        let config = Config::builder()
            .add_source(
                File::with_name(&format!("config/{}", run_mode()))
                    .format(FileFormat::Toml)
                    .required(true),
            )
            // 예: APP__DETECTION__EPSILON=0.002
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;
        Self::build(config)
    }

    pub fn build(config: Config) -> KillfeedResult<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 범위를 벗어난 값은 로딩 단계에서 거부한다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate().map_err(ConfigError::Message)?;
        if self.broadcast.interval_ms == 0 {
            return Err(ConfigError::Message(
                "broadcast.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.server.worker_arbiters == 0 {
            return Err(ConfigError::Message(
                "server.worker_arbiters must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub log_level: String,
    /// Profile actor 를 분산할 Arbiter 수
    #[serde(default = "default_worker_arbiters")]
    pub worker_arbiters: usize,
}

fn default_worker_arbiters() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub directory: String,
    pub filename: String,
}

/// Kill detection 관련 임계값
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DetectionSettings {
    /// 이 값 이하의 exp 증가는 노이즈로 본다.
    pub epsilon: f64,
    /// 한 틱에 이 값을 넘는 exp 증가는 OCR 오류로 의심한다.
    pub suspect_threshold: f64,
    /// kill 로 인정하려면 이 시간(ms) 안에 HP bar 가 보였어야 한다.
    pub kill_hp_window_ms: i64,
    pub rolling_window_sec: i64,
    /// killsToLevel 계산 시 사용하는 최소 delta
    pub min_delta: f64,
    /// 이름 신호가 없는 틱에 직전 식별 결과를 재사용하는 시간(ms)
    pub identity_carryover_ms: i64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            epsilon: 0.001,
            suspect_threshold: 40.0,
            kill_hp_window_ms: 1500,
            rolling_window_sec: 300,
            min_delta: 0.01,
            identity_carryover_ms: 2000,
        }
    }
}

impl DetectionSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(200..=5000).contains(&self.kill_hp_window_ms) {
            return Err(format!(
                "Invalid detection.kill_hp_window_ms: {} (must be 200~5000)",
                self.kill_hp_window_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(format!(
                "Invalid detection.epsilon: {} (must be 0~1)",
                self.epsilon
            ));
        }
        if self.rolling_window_sec < 10 {
            return Err(format!(
                "Invalid detection.rolling_window_sec: {} (must be >= 10)",
                self.rolling_window_sec
            ));
        }
        if self.suspect_threshold <= self.epsilon {
            return Err(format!(
                "Invalid detection.suspect_threshold: {} (must be greater than epsilon)",
                self.suspect_threshold
            ));
        }
        Ok(())
    }

    /// HP 없이 kill 을 허용하기 위한 최소 공백 시간
    pub fn no_hp_fallback_gap_ms(&self) -> i64 {
        let scaled = (self.kill_hp_window_ms as f64 * 1.5) as i64;
        scaled.max(2000)
    }

    pub fn rolling_window_ms(&self) -> i64 {
        self.rolling_window_sec * 1000
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TtkSettings {
    pub grace_ms: i64,
    pub boss_ranks: Vec<MonsterRank>,
}

impl Default for TtkSettings {
    fn default() -> Self {
        Self {
            grace_ms: 10_000,
            boss_ranks: vec![MonsterRank::Giant, MonsterRank::Violet, MonsterRank::Boss],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BroadcastSettings {
    pub interval_ms: u64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self { interval_ms: 200 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSettings {
    pub monster_reference_path: String,
    pub exp_table_dir: String,
    pub history_path: Option<String>,
    pub state_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::errors::KillfeedError;

    fn from_toml(raw: &str) -> Config {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
    }

    #[test]
    fn detection_defaults_are_valid() {
        let detection = DetectionSettings::default();
        assert!(detection.validate().is_ok());
        assert_eq!(detection.no_hp_fallback_gap_ms(), 2250);
    }

    #[test]
    fn fallback_gap_never_below_two_seconds() {
        let detection = DetectionSettings {
            kill_hp_window_ms: 500,
            ..DetectionSettings::default()
        };
        assert_eq!(detection.no_hp_fallback_gap_ms(), 2000);
    }

    #[test]
    fn rejects_out_of_range_hp_window() {
        let detection = DetectionSettings {
            kill_hp_window_ms: 100,
            ..DetectionSettings::default()
        };
        assert!(detection.validate().is_err());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let raw = r#"
            [server]
            log_level = "debug"

            [logging]
            directory = "logs"
            filename = "killfeed.log"

            [detection]
            epsilon = 0.002

            [data]
            monster_reference_path = "data/monster_reference.json"
            exp_table_dir = "data/monster_parameter"
        "#;
        let settings = Settings::build(from_toml(raw)).unwrap();

        assert_eq!(settings.detection.epsilon, 0.002);
        assert_eq!(settings.detection.kill_hp_window_ms, 1500);
        assert_eq!(settings.ttk.grace_ms, 10_000);
        assert_eq!(settings.broadcast.interval_ms, 200);
        assert_eq!(settings.server.worker_arbiters, 2);
        assert!(settings.data.history_path.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn invalid_values_surface_as_configuration_errors() {
        let raw = r#"
            [server]
            log_level = "info"

            [logging]
            directory = "logs"
            filename = "killfeed.log"

            [broadcast]
            interval_ms = 0

            [data]
            monster_reference_path = "data/monster_reference.json"
            exp_table_dir = "data/monster_parameter"
        "#;
        assert!(matches!(
            Settings::build(from_toml(raw)),
            Err(KillfeedError::Configuration(_))
        ));

        let missing_data = r#"
            [server]
            log_level = "info"

            [logging]
            directory = "logs"
            filename = "killfeed.log"
        "#;
        assert!(matches!(
            Settings::build(from_toml(missing_data)),
            Err(KillfeedError::Configuration(_))
        ));
    }

    #[test]
    fn bundled_development_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/development.toml");
        let config = Config::builder()
            .add_source(File::from(std::path::Path::new(path)))
            .build()
            .unwrap();
        let settings = Settings::build(config).unwrap();
        assert!(settings.server.worker_arbiters > 0);
        assert!(settings.broadcast.interval_ms > 0);
    }
}
