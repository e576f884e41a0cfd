use lazy_static::lazy_static;
use prometheus::{
    opts, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    // register_... 매크로는 기본 레지스트리에 자동 등록하므로,
    // 여기서는 Opts만 생성하고 register_custom_metrics 에서 수동으로 등록합니다.

    /// Total number of samples handed to a profile actor.
    pub static ref SAMPLES_PROCESSED_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("samples_processed_total", "Total OCR samples processed")).unwrap();

    /// Samples that could not be evaluated for a kill (missing level/exp).
    pub static ref SAMPLES_INCOMPLETE_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("samples_incomplete_total", "Samples missing level or exp")).unwrap();

    /// The total number of kills registered (before validation).
    pub static ref KILLS_REGISTERED_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("kills_registered_total", "Total kills optimistically registered")).unwrap();

    /// Kills reversed by the outlier validator.
    pub static ref KILLS_ROLLED_BACK_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("kills_rolled_back_total", "Total kills rolled back as outliers")).unwrap();

    /// Rollback requests that found no matching undo record.
    pub static ref ROLLBACK_FAILURES_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("rollback_failures_total", "Rollback requests without a matching undo record")).unwrap();

    /// Ticks quarantined as suspect (exp jump above threshold).
    pub static ref SUSPECT_TICKS_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("suspect_ticks_total", "Exp jumps quarantined as suspect")).unwrap();

    /// Identity resolution results by signal ("hp", "level_element", "name", "carryover", "none").
    pub static ref IDENTITY_RESOLUTIONS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("identity_resolutions_total", "Monster identity resolutions by signal"),
            &["signal"],
        )
        .unwrap();

    /// Broadcasts delivered by kind ("leading", "trailing", "forced").
    pub static ref BROADCASTS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("broadcasts_total", "State broadcasts delivered by kind"),
            &["kind"],
        )
        .unwrap();

    /// Errors caught at the profile actor boundary.
    pub static ref PROCESSING_ERRORS_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("processing_errors_total", "Errors caught while processing samples")).unwrap();

    /// Background collaborator failures (history / persistence / notifier).
    pub static ref COLLABORATOR_FAILURES_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("collaborator_failures_total", "Background collaborator failures"),
            &["collaborator"],
        )
        .unwrap();

    /// Currently live profile actors.
    pub static ref ACTIVE_PROFILES: IntGauge =
        IntGauge::with_opts(opts!("active_profiles", "Number of live profile actors")).unwrap();

    /// Completed boss fights (TTK) in seconds.
    pub static ref TTK_SECONDS: Histogram =
        Histogram::with_opts(HistogramOpts::new(
            "ttk_seconds",
            "Time to kill against pinned boss-class targets (seconds)"
        ).buckets(vec![5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0])).unwrap();

    /// Exp tables currently cached in memory.
    pub static ref EXP_TABLES_LOADED: IntGauge =
        IntGauge::with_opts(opts!("exp_tables_loaded", "Monster exp tables cached in memory")).unwrap();
}

/// Registers all custom metrics defined in this crate to the given registry.
///
/// Call once during startup; registering twice into the same registry fails with
/// `AlreadyReg`.
pub fn register_custom_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(SAMPLES_PROCESSED_TOTAL.clone()))?;
    registry.register(Box::new(SAMPLES_INCOMPLETE_TOTAL.clone()))?;
    registry.register(Box::new(KILLS_REGISTERED_TOTAL.clone()))?;
    registry.register(Box::new(KILLS_ROLLED_BACK_TOTAL.clone()))?;
    registry.register(Box::new(ROLLBACK_FAILURES_TOTAL.clone()))?;
    registry.register(Box::new(SUSPECT_TICKS_TOTAL.clone()))?;
    registry.register(Box::new(IDENTITY_RESOLUTIONS_TOTAL.clone()))?;
    registry.register(Box::new(BROADCASTS_TOTAL.clone()))?;
    registry.register(Box::new(PROCESSING_ERRORS_TOTAL.clone()))?;
    registry.register(Box::new(COLLABORATOR_FAILURES_TOTAL.clone()))?;
    registry.register(Box::new(ACTIVE_PROFILES.clone()))?;
    registry.register(Box::new(TTK_SECONDS.clone()))?;
    registry.register(Box::new(EXP_TABLES_LOADED.clone()))?;

    Ok(())
}
