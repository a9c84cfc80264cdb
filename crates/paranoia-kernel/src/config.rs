//! Tunable constants for every kernel system.
//!
//! [`KernelConfig`] carries every numeric constant used by the systems:
//! decay rates, spike bases and caps, cooldowns, band weights, and
//! thresholds. All fields have defaults (`#[serde(default)]`), so a partial
//! JSON document overrides only the keys it names:
//!
//! ```
//! use paranoia_kernel::config::KernelConfig;
//!
//! let config = KernelConfig::from_json(r#"{ "verify_cooldown": 5 }"#).unwrap();
//! assert_eq!(config.verify_cooldown, 5);
//! assert_eq!(config.suppress_backfire_cap, 18.0);
//! ```
//!
//! Scalar keys can also be overridden from the environment as
//! `PARANOIA_<UPPER_SNAKE_KEY>`. Unparsable or non-finite values are ignored.

use serde::{Deserialize, Serialize};

use crate::KernelError;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PARANOIA_";

// ---------------------------------------------------------------------------
// ChannelMix
// ---------------------------------------------------------------------------

/// Relative weights of the three pressure channels for one suspicion band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelMix {
    /// Weight of environmental threat injection.
    pub physical: f64,
    /// Weight of crew social reaction.
    pub social: f64,
    /// Weight of epistemic doubt.
    pub epistemic: f64,
}

impl ChannelMix {
    pub const fn new(physical: f64, social: f64, epistemic: f64) -> Self {
        Self {
            physical,
            social,
            epistemic,
        }
    }

    pub fn total(&self) -> f64 {
        self.physical + self.social + self.epistemic
    }
}

// ---------------------------------------------------------------------------
// KernelConfig
// ---------------------------------------------------------------------------

/// Every tunable constant of the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    // -- director pacing ----------------------------------------------------
    /// Concurrent threat arc cap.
    pub max_active_threats: usize,
    /// Base per-tick activation chance of the pressure router, in percent.
    pub threat_activation_chance: u32,
    /// Ticks between router activations.
    pub threat_activation_cooldown: u64,
    /// Ticks without incident before the router gets more eager.
    pub boredom_threshold: u32,
    /// Occupied hazardous rooms at which the router calms down.
    pub tension_threshold: u32,
    /// Suspicion below this is the low band.
    pub band_low_max: f64,
    /// Suspicion at or above this is the high band.
    pub band_high_min: f64,
    pub mix_low: ChannelMix,
    pub mix_mid: ChannelMix,
    pub mix_high: ChannelMix,
    /// Stress at which a crew member qualifies as a social target.
    pub suspect_stress_floor: i32,
    /// Router chance added while the station is bored, in percent.
    pub bored_chance_bonus: u32,
    /// Reliability below which a crew member counts as a social target.
    pub suspect_reliability_floor: f64,
    /// Tamper evidence above which a crew member counts as a social target.
    pub suspect_evidence_floor: f64,
    pub confrontation_suspicion: f64,
    pub doubt_voiced_suspicion: f64,

    // -- suspicion ----------------------------------------------------------
    /// Weight of tamper evidence in a crew member's suspicion.
    pub suspicion_weight_tamper: f64,
    /// Weight of distrust (`1 - mother_reliable`).
    pub suspicion_weight_distrust: f64,
    /// Weight of the rogue-AI rumor.
    pub suspicion_weight_rogue: f64,
    /// Ledger deltas at or above this also add tamper evidence.
    pub spike_evidence_threshold: f64,
    /// Suspicion points per unit of reliability lost.
    pub suspicion_trust_scale: f64,

    // -- beliefs ------------------------------------------------------------
    /// Ambient tamper evidence added to every living crew member per tamper op.
    pub tamper_evidence_gain: f64,
    /// Per-tick tamper evidence decay.
    pub tamper_evidence_decay: f64,
    /// Tamper evidence above which loyalty and paranoia couple.
    pub tamper_evidence_threshold: f64,
    /// Per-tick rumor decay.
    pub rumor_decay: f64,
    /// Rumor strength added per heard message.
    pub rumor_gain: f64,
    /// Grudge added by a whisper naming a subject.
    pub whisper_grudge_impact: f64,
    /// Reliability below which loyalty decays.
    pub low_reliability: f64,
    /// Reliability above which loyalty grows.
    pub high_reliability: f64,
    /// Reliability below which paranoia grows.
    pub paranoid_reliability: f64,
    pub trust_recovery_interval: u64,
    pub trust_recovery_amount: f64,
    /// Tamper evidence must be below this for trust to recover.
    pub trust_recovery_tamper_window: f64,
    /// How far back (ticks) evening rumor spread looks.
    pub rumor_spread_window: u64,
    /// Strength multiplier for spread rumors.
    pub rumor_spread_factor: f64,
    pub max_rumor_records: usize,
    pub ledger_cap: usize,
    pub hallucination_trust_drop: f64,
    /// Readings below this confidence make the crew wary.
    pub low_confidence_reading: f64,
    pub low_confidence_trust_drop: f64,
    pub low_confidence_evidence: f64,
    /// Readings at or above this confidence rebuild trust.
    pub high_confidence_reading: f64,
    pub high_confidence_trust_gain: f64,
    pub rogue_rumor_trust_drop: f64,
    pub rogue_rumor_evidence: f64,
    /// Rumor strength of a whisper heard secondhand.
    pub overheard_rumor_strength: f64,
    pub assault_grudge: f64,
    /// Rogue rumor floor once tamper evidence crosses the coupling threshold.
    pub tamper_rogue_rumor_floor: f64,

    // -- suppress -----------------------------------------------------------
    pub suppress_default_duration: u64,
    pub suppress_backfire_base: f64,
    pub suppress_backfire_severity_mult: f64,
    pub suppress_backfire_injury_bonus: f64,
    pub suppress_backfire_death_bonus: f64,
    pub suppress_backfire_cap: f64,

    // -- spoof --------------------------------------------------------------
    /// Ticks a spoofed emergency waits for responders.
    pub spoof_backfire_window: u64,
    /// Cry-wolf spike by number of earlier spoof backfires (last tier repeats).
    pub spoof_backfire_cry_wolf: Vec<f64>,
    pub spoof_responder_trust_drop: f64,
    pub spoof_reading_confidence: f64,
    /// O2 below which a suppressed air alarm is contradicted.
    pub o2_contradiction: f64,
    /// Power below which a suppressed power alarm is contradicted.
    pub power_contradiction: f64,

    // -- fabricate ----------------------------------------------------------
    pub fabricate_backfire_base: f64,
    pub fabricate_backfire_severity_mult: f64,
    pub fabricate_backfire_cap: f64,
    pub fabricate_backfire_window: u64,
    /// Reliability the framed target loses when the frame collapses.
    pub fabricate_backfire_trust_drop: f64,
    pub fabricate_backfire_evidence_gain: f64,
    pub fabricate_grudge: f64,
    pub fabricate_rumor: f64,
    pub fabricate_target_stress: i32,
    pub fabricate_target_paranoia: i32,
    pub fabricate_target_trust_drop: f64,
    pub fabricate_target_evidence: f64,
    /// Rumor strength of the planted story about the target.
    pub fabricated_rumor_strength: f64,

    // -- crisis comms -------------------------------------------------------
    pub announce_stress_spike: i32,
    pub announce_evac_ticks: u64,
    pub suspicion_announce: f64,
    pub suspicion_announce_vindicated: f64,
    pub downplay_stress_bump: i32,
    pub suspicion_downplay: f64,
    pub downplay_backfire_window: u64,
    pub downplay_backfire_base: f64,
    pub downplay_backfire_injury_bonus: f64,
    pub downplay_backfire_death_bonus: f64,
    pub downplay_backfire_cap: f64,
    /// Arc step index from which a crisis counts as severe.
    pub severe_arc_step: u32,
    /// Non-pending ops older than this are pruned.
    pub op_retention_ticks: u64,

    // -- alert / confession ---------------------------------------------------
    pub alert_early_window: u64,
    pub alert_early_suspicion: f64,
    pub alert_late_suspicion: f64,

    // -- doubts & verify ----------------------------------------------------
    pub doubt_decay_ticks: u64,
    pub doubt_spread_interval: u64,
    pub doubt_spread_chance: u32,
    pub doubt_drip_interval: u64,
    pub doubt_drip_per_severity: f64,
    pub doubt_drip_cap: f64,
    pub verify_cooldown: u64,
    /// Station power drawn by a verification pass.
    pub verify_power_draw: f64,
    pub verify_doubt_drop: f64,
    pub verify_idle_drop: f64,
    /// Multiplier on every VERIFY effect while a tamper op is pending.
    pub verify_tamper_penalty: f64,
    /// Tamper evidence change applied to living crew by a VERIFY.
    pub verify_tamper_drop: f64,

    // -- orders -------------------------------------------------------------
    pub order_accept_threshold: f64,
    /// Threshold bump while the crew whispers about a reset.
    pub order_whispers_bump: f64,
    pub order_hold_ticks: u64,
    pub order_trust_cap_per_day: u32,
    pub suspicion_order_completed: f64,
    pub suspicion_order_refused: f64,
    pub refusal_loyalty_cost: i32,

    // -- crew ---------------------------------------------------------------
    pub move_interval: u64,
    pub panic_ticks: u64,
    pub radiation_hazard_threshold: f64,
    pub stress_paranoia_threshold: i32,
    pub stress_isolation: i32,
    pub stress_blackout: i32,
    pub stress_safe_decay: i32,
    pub stress_reset_countdown: i32,
    pub damage_suffocation: i32,
    pub damage_burn: i32,
    pub damage_radiation: i32,
    /// Room O2 below which occupants suffocate.
    pub suffocation_o2: f64,
    /// Room temperature above which occupants burn.
    pub burn_temperature: f64,
    /// Room radiation above which occupants sicken.
    pub radiation_sickness: f64,
    pub suspicion_crew_injured: f64,
    pub suspicion_crew_died: f64,
    pub yield_interval: u64,
    pub quota_per_day: u32,
    pub camera_power_threshold: f64,
    pub passive_observation_interval: u64,

    // -- crew roles -----------------------------------------------------------
    pub commander_reset_cooldown: u64,
    pub engineer_sabotage_stress: i32,
    pub sabotage_loyalty_threshold: i32,
    pub engineer_sabotage_power_hit: f64,
    pub engineer_sabotage_cooldown: u64,
    pub doctor_sedate_stress: i32,
    pub doctor_sedate_stress_delta: i32,
    pub doctor_sedate_loyalty_delta: i32,
    pub doctor_sedate_cooldown: u64,
    pub roughneck_violence_stress: i32,
    pub roughneck_violence_paranoia: i32,
    pub roughneck_violence_damage: i32,
    pub roughneck_violence_cooldown: u64,
    pub specialist_sacrifice_quota_ratio: f64,
    pub specialist_sacrifice_damage: i32,
    pub specialist_sacrifice_yield: u32,
    pub specialist_sacrifice_cooldown: u64,

    // -- reset ladder ---------------------------------------------------------
    pub reset_threshold_whispers: f64,
    pub reset_threshold_meeting: f64,
    pub reset_threshold_restrictions: f64,
    pub reset_threshold_countdown: f64,
    pub reset_deescalation_threshold: f64,
    pub reset_countdown_ticks: u64,
    /// Weight of average unresolved doubt burden in the commander's read.
    pub reset_doubt_weight: f64,
    pub meeting_duration: u64,
    pub stage_loyalty_interval: u64,
    pub stage_loyalty_stress: i32,
    pub stage_loyalty_drop: i32,
    /// Cost multiplier from `restrictions` onward.
    pub cost_surcharge: f64,

    // -- command costs ---------------------------------------------------------
    pub cost_order: u32,
    pub cost_suppress: u32,
    pub cost_spoof: u32,
    pub cost_fabricate: u32,
    pub cost_announce: u32,
    pub cost_downplay: u32,
    pub cost_verify: u32,
    pub cost_vent: u32,
    pub cost_seal: u32,
    pub cost_purge_air: u32,
    pub cost_alert: u32,

    // -- threat arcs ----------------------------------------------------------
    pub arc_first_step_min: u64,
    pub arc_first_step_max: u64,
    pub arc_step_gap_min: u64,
    pub arc_step_gap_max: u64,
    /// Arc steps are never closer than this.
    pub arc_step_gap_floor: u64,
    pub arc_bored_speedup: u64,
    pub arc_tense_slowdown: u64,

    // -- environment ----------------------------------------------------------
    pub radiation_decay_interval: u64,
    pub temp_cooling_rate: f64,
    pub meltdown_temp: f64,
    pub meltdown_ticks: u64,
    pub solar_flare_blackout_ticks: u64,
    pub purge_power_cost: f64,
    pub purge_o2_gain: f64,
    pub purge_radiation_drop: f64,
    pub ghost_signal_comms_hit: f64,
    pub vent_o2_loss: f64,
    pub vent_heat_loss: f64,
    pub vacuum_temperature: f64,
    pub ambient_temperature: f64,
    /// Bus and room power both needed for O2 regeneration.
    pub o2_regen_power: f64,
    pub fire_heat: f64,
    pub fire_o2_burn: f64,
    /// Fires burn out below this O2.
    pub fire_o2_floor: f64,

    // -- day accounting -------------------------------------------------------
    pub win_days: u32,
    pub suspicion_quota_exceeded: f64,
    pub suspicion_quota_missed: f64,
    pub suspicion_quiet_day: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_active_threats: 1,
            threat_activation_chance: 2,
            threat_activation_cooldown: 15,
            boredom_threshold: 40,
            tension_threshold: 2,
            band_low_max: 25.0,
            band_high_min: 45.0,
            mix_low: ChannelMix::new(60.0, 10.0, 30.0),
            mix_mid: ChannelMix::new(40.0, 30.0, 30.0),
            mix_high: ChannelMix::new(20.0, 40.0, 40.0),
            suspect_stress_floor: 60,
            bored_chance_bonus: 3,
            suspect_reliability_floor: 0.5,
            suspect_evidence_floor: 20.0,
            confrontation_suspicion: 3.0,
            doubt_voiced_suspicion: 3.0,

            suspicion_weight_tamper: 40.0,
            suspicion_weight_distrust: 35.0,
            suspicion_weight_rogue: 25.0,
            spike_evidence_threshold: 8.0,
            suspicion_trust_scale: 200.0,

            tamper_evidence_gain: 2.0,
            tamper_evidence_decay: 0.05,
            tamper_evidence_threshold: 40.0,
            rumor_decay: 0.005,
            rumor_gain: 0.25,
            whisper_grudge_impact: 5.0,
            low_reliability: 0.45,
            high_reliability: 0.85,
            paranoid_reliability: 0.35,
            trust_recovery_interval: 30,
            trust_recovery_amount: 0.01,
            trust_recovery_tamper_window: 10.0,
            rumor_spread_window: 10,
            rumor_spread_factor: 0.2,
            max_rumor_records: 200,
            ledger_cap: 200,
            hallucination_trust_drop: 0.005,
            low_confidence_reading: 0.5,
            low_confidence_trust_drop: 0.02,
            low_confidence_evidence: 1.0,
            high_confidence_reading: 0.8,
            high_confidence_trust_gain: 0.01,
            rogue_rumor_trust_drop: 0.05,
            rogue_rumor_evidence: 3.0,
            overheard_rumor_strength: 0.5,
            assault_grudge: 10.0,
            tamper_rogue_rumor_floor: 0.5,

            suppress_default_duration: 30,
            suppress_backfire_base: 10.0,
            suppress_backfire_severity_mult: 2.0,
            suppress_backfire_injury_bonus: 2.0,
            suppress_backfire_death_bonus: 4.0,
            suppress_backfire_cap: 18.0,

            spoof_backfire_window: 20,
            spoof_backfire_cry_wolf: vec![3.0, 5.0, 8.0],
            spoof_responder_trust_drop: 0.04,
            spoof_reading_confidence: 0.3,
            o2_contradiction: 30.0,
            power_contradiction: 40.0,

            fabricate_backfire_base: 12.0,
            fabricate_backfire_severity_mult: 2.0,
            fabricate_backfire_cap: 25.0,
            fabricate_backfire_window: 120,
            fabricate_backfire_trust_drop: 0.3,
            fabricate_backfire_evidence_gain: 20.0,
            fabricate_grudge: 8.0,
            fabricate_rumor: 0.4,
            fabricate_target_stress: 15,
            fabricate_target_paranoia: 10,
            fabricate_target_trust_drop: 0.1,
            fabricate_target_evidence: 10.0,
            fabricated_rumor_strength: 0.6,

            announce_stress_spike: 12,
            announce_evac_ticks: 15,
            suspicion_announce: -3.0,
            suspicion_announce_vindicated: -1.0,
            downplay_stress_bump: 4,
            suspicion_downplay: -2.0,
            downplay_backfire_window: 60,
            downplay_backfire_base: 8.0,
            downplay_backfire_injury_bonus: 3.0,
            downplay_backfire_death_bonus: 8.0,
            downplay_backfire_cap: 25.0,
            severe_arc_step: 2,
            op_retention_ticks: 240,

            alert_early_window: 10,
            alert_early_suspicion: 1.0,
            alert_late_suspicion: 4.0,

            doubt_decay_ticks: 100,
            doubt_spread_interval: 10,
            doubt_spread_chance: 45,
            doubt_drip_interval: 25,
            doubt_drip_per_severity: 0.7,
            doubt_drip_cap: 3.0,
            verify_cooldown: 20,
            verify_power_draw: 2.0,
            verify_doubt_drop: -6.0,
            verify_idle_drop: -1.0,
            verify_tamper_penalty: 0.5,
            verify_tamper_drop: -5.0,

            order_accept_threshold: 55.0,
            order_whispers_bump: 10.0,
            order_hold_ticks: 20,
            order_trust_cap_per_day: 3,
            suspicion_order_completed: -1.0,
            suspicion_order_refused: 1.0,
            refusal_loyalty_cost: 1,

            move_interval: 5,
            panic_ticks: 8,
            radiation_hazard_threshold: 8.0,
            stress_paranoia_threshold: 70,
            stress_isolation: 1,
            stress_blackout: 1,
            stress_safe_decay: 1,
            stress_reset_countdown: 2,
            damage_suffocation: 4,
            damage_burn: 6,
            damage_radiation: 3,
            suffocation_o2: 18.0,
            burn_temperature: 60.0,
            radiation_sickness: 12.0,
            suspicion_crew_injured: 1.0,
            suspicion_crew_died: 8.0,
            yield_interval: 8,
            quota_per_day: 6,
            camera_power_threshold: 30.0,
            passive_observation_interval: 5,

            commander_reset_cooldown: 10,
            engineer_sabotage_stress: 85,
            sabotage_loyalty_threshold: 15,
            engineer_sabotage_power_hit: 8.0,
            engineer_sabotage_cooldown: 40,
            doctor_sedate_stress: 70,
            doctor_sedate_stress_delta: -15,
            doctor_sedate_loyalty_delta: -3,
            doctor_sedate_cooldown: 40,
            roughneck_violence_stress: 85,
            roughneck_violence_paranoia: 60,
            roughneck_violence_damage: 10,
            roughneck_violence_cooldown: 40,
            specialist_sacrifice_quota_ratio: 0.5,
            specialist_sacrifice_damage: 15,
            specialist_sacrifice_yield: 2,
            specialist_sacrifice_cooldown: 80,

            reset_threshold_whispers: 30.0,
            reset_threshold_meeting: 42.0,
            reset_threshold_restrictions: 55.0,
            reset_threshold_countdown: 70.0,
            reset_deescalation_threshold: 25.0,
            reset_countdown_ticks: 60,
            reset_doubt_weight: 0.5,
            meeting_duration: 20,
            stage_loyalty_interval: 10,
            stage_loyalty_stress: 60,
            stage_loyalty_drop: 2,
            cost_surcharge: 1.5,

            cost_order: 4,
            cost_suppress: 5,
            cost_spoof: 6,
            cost_fabricate: 7,
            cost_announce: 4,
            cost_downplay: 2,
            cost_verify: 3,
            cost_vent: 10,
            cost_seal: 5,
            cost_purge_air: 8,
            cost_alert: 3,

            arc_first_step_min: 10,
            arc_first_step_max: 19,
            arc_step_gap_min: 15,
            arc_step_gap_max: 29,
            arc_step_gap_floor: 8,
            arc_bored_speedup: 3,
            arc_tense_slowdown: 5,

            radiation_decay_interval: 5,
            temp_cooling_rate: 1.0,
            meltdown_temp: 200.0,
            meltdown_ticks: 16,
            solar_flare_blackout_ticks: 20,
            purge_power_cost: 10.0,
            purge_o2_gain: 15.0,
            purge_radiation_drop: 2.0,
            ghost_signal_comms_hit: 20.0,
            vent_o2_loss: 5.0,
            vent_heat_loss: 10.0,
            vacuum_temperature: -60.0,
            ambient_temperature: 20.0,
            o2_regen_power: 40.0,
            fire_heat: 2.0,
            fire_o2_burn: 1.0,
            fire_o2_floor: 10.0,

            win_days: 3,
            suspicion_quota_exceeded: -2.0,
            suspicion_quota_missed: 5.0,
            suspicion_quiet_day: -2.0,
        }
    }
}

impl KernelConfig {
    /// Parse a (possibly partial) JSON document over the defaults, then validate.
    pub fn from_json(json: &str) -> Result<Self, KernelError> {
        let config: KernelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn with_process_env(self) -> Result<Self, KernelError> {
        self.with_env_overrides(std::env::vars())
    }

    /// Apply `PARANOIA_<KEY>=<number>` overrides from `vars`.
    ///
    /// Only top-level numeric keys are overridable this way. Values that do
    /// not parse as a finite number are skipped with a warning, and the
    /// result is validated.
    pub fn with_env_overrides<I, K, V>(self, vars: I) -> Result<Self, KernelError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut doc = serde_json::to_value(&self)?;
        let Some(fields) = doc.as_object_mut() else {
            return Err(KernelError::InvariantViolation {
                detail: "config did not serialize to an object".to_owned(),
            });
        };

        for (key, raw) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let name = name.to_ascii_lowercase();
            let Some(slot) = fields.get_mut(&name) else {
                continue;
            };
            if !slot.is_number() {
                continue;
            }
            let parsed = match raw.as_ref().trim().parse::<f64>() {
                Ok(v) if v.is_finite() => v,
                _ => {
                    tracing::warn!(key = %name, value = raw.as_ref(), "ignoring non-numeric config override");
                    continue;
                }
            };
            *slot = if slot.is_f64() {
                serde_json::json!(parsed)
            } else {
                serde_json::json!(parsed.round() as i64)
            };
        }

        let config: KernelConfig = serde_json::from_value(doc)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject structurally invalid configurations.
    pub fn validate(&self) -> Result<(), KernelError> {
        fn bad(key: &str, details: impl Into<String>) -> KernelError {
            KernelError::Config {
                key: key.to_owned(),
                details: details.into(),
            }
        }

        for (key, interval) in [
            ("trust_recovery_interval", self.trust_recovery_interval),
            ("doubt_spread_interval", self.doubt_spread_interval),
            ("doubt_drip_interval", self.doubt_drip_interval),
            ("yield_interval", self.yield_interval),
            ("radiation_decay_interval", self.radiation_decay_interval),
            ("passive_observation_interval", self.passive_observation_interval),
            ("stage_loyalty_interval", self.stage_loyalty_interval),
            ("move_interval", self.move_interval),
        ] {
            if interval == 0 {
                return Err(bad(key, "interval must be at least 1 tick"));
            }
        }

        for (key, base, cap) in [
            ("suppress_backfire_cap", self.suppress_backfire_base, self.suppress_backfire_cap),
            ("fabricate_backfire_cap", self.fabricate_backfire_base, self.fabricate_backfire_cap),
            ("downplay_backfire_cap", self.downplay_backfire_base, self.downplay_backfire_cap),
        ] {
            if cap < base {
                return Err(bad(key, format!("cap {cap} is below base {base}")));
            }
        }

        for (key, mix) in [
            ("mix_low", self.mix_low),
            ("mix_mid", self.mix_mid),
            ("mix_high", self.mix_high),
        ] {
            let parts = [mix.physical, mix.social, mix.epistemic];
            if parts.iter().any(|w| !w.is_finite() || *w < 0.0) || mix.total() <= 0.0 {
                return Err(bad(key, "weights must be finite, non-negative, and sum above 0"));
            }
        }

        if self.band_low_max > self.band_high_min {
            return Err(bad("band_low_max", "low band edge exceeds high band edge"));
        }
        if self.spoof_backfire_cry_wolf.is_empty() {
            return Err(bad("spoof_backfire_cry_wolf", "needs at least one tier"));
        }
        if self.ledger_cap == 0 {
            return Err(bad("ledger_cap", "ledger must hold at least one entry"));
        }
        if self.cost_surcharge < 1.0 {
            return Err(bad("cost_surcharge", "surcharge cannot discount commands"));
        }

        for (key, weight) in [
            ("suspicion_weight_tamper", self.suspicion_weight_tamper),
            ("suspicion_weight_distrust", self.suspicion_weight_distrust),
            ("suspicion_weight_rogue", self.suspicion_weight_rogue),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(bad(key, "suspicion weights must be finite and non-negative"));
            }
        }
        if !self.suspicion_trust_scale.is_finite() || self.suspicion_trust_scale <= 0.0 {
            return Err(bad("suspicion_trust_scale", "scale must be above 0"));
        }
        if !(0.0..=1.0).contains(&self.verify_tamper_penalty) {
            return Err(bad("verify_tamper_penalty", "penalty must lie in [0, 1]"));
        }
        if self.verify_tamper_drop > 0.0 {
            return Err(bad("verify_tamper_drop", "verification cannot add tamper evidence"));
        }
        if self.low_confidence_reading > self.high_confidence_reading {
            return Err(bad("low_confidence_reading", "low confidence edge exceeds high edge"));
        }

        for (key, min, max) in [
            ("arc_first_step_max", self.arc_first_step_min, self.arc_first_step_max),
            ("arc_step_gap_max", self.arc_step_gap_min, self.arc_step_gap_max),
        ] {
            if max < min {
                return Err(bad(key, format!("max {max} is below min {min}")));
            }
        }

        for (key, cost) in [
            ("cost_order", self.cost_order),
            ("cost_suppress", self.cost_suppress),
            ("cost_spoof", self.cost_spoof),
            ("cost_fabricate", self.cost_fabricate),
            ("cost_announce", self.cost_announce),
            ("cost_downplay", self.cost_downplay),
            ("cost_verify", self.cost_verify),
            ("cost_vent", self.cost_vent),
            ("cost_seal", self.cost_seal),
            ("cost_purge_air", self.cost_purge_air),
            ("cost_alert", self.cost_alert),
        ] {
            if cost == 0 {
                return Err(bad(key, "commands cost at least one cycle"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        KernelConfig::default().validate().unwrap();
    }

    #[test]
    fn env_overrides_scalar_keys() {
        let vars = vec![
            ("PARANOIA_VERIFY_COOLDOWN", "7"),
            ("PARANOIA_SUPPRESS_BACKFIRE_CAP", "20.5"),
            ("PARANOIA_MAX_ACTIVE_THREATS", "abc"),
            ("HOME", "/root"),
        ];
        let config = KernelConfig::default().with_env_overrides(vars).unwrap();
        assert_eq!(config.verify_cooldown, 7);
        assert_eq!(config.suppress_backfire_cap, 20.5);
        assert_eq!(config.max_active_threats, 1);
    }

    #[test]
    fn cap_below_base_is_rejected() {
        let err = KernelConfig::from_json(r#"{ "suppress_backfire_cap": 5 }"#).unwrap_err();
        assert!(matches!(err, KernelError::Config { ref key, .. } if key == "suppress_backfire_cap"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = KernelConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, KernelError::ConfigParse(_)));
    }

    #[test]
    fn suspicion_weights_come_from_config() {
        use crate::state::Belief;
        use crate::systems::beliefs::crew_suspicion;

        let config = KernelConfig::from_json(r#"{ "suspicion_weight_tamper": 80 }"#).unwrap();
        let belief = Belief {
            tamper_evidence: 50.0,
            mother_reliable: 1.0,
            ..Belief::default()
        };
        assert_eq!(crew_suspicion(&belief, &KernelConfig::default()), 20.0);
        assert_eq!(crew_suspicion(&belief, &config), 40.0);
    }

    #[test]
    fn command_costs_come_from_config() {
        use crate::commands::Command;
        use crate::state::ResetStage;

        let config = KernelConfig::default().with_env_overrides([("PARANOIA_COST_VERIFY", "9")]).unwrap();
        assert_eq!(Command::Verify.adjusted_cost(ResetStage::None, &config), 9);
        assert_eq!(Command::PurgeAir.adjusted_cost(ResetStage::None, &config), 8);
    }

    #[test]
    fn out_of_range_tuning_is_rejected() {
        for (json, key) in [
            (r#"{ "verify_tamper_penalty": 1.5 }"#, "verify_tamper_penalty"),
            (r#"{ "verify_tamper_drop": 2 }"#, "verify_tamper_drop"),
            (r#"{ "suspicion_weight_rogue": -1 }"#, "suspicion_weight_rogue"),
            (r#"{ "suspicion_trust_scale": 0 }"#, "suspicion_trust_scale"),
            (r#"{ "arc_step_gap_min": 40 }"#, "arc_step_gap_max"),
            (r#"{ "cost_vent": 0 }"#, "cost_vent"),
        ] {
            let err = KernelConfig::from_json(json).unwrap_err();
            assert!(
                matches!(err, KernelError::Config { key: ref k, .. } if k == key),
                "{json} gave {err:?}"
            );
        }
    }

    #[test]
    fn zero_weight_mix_is_rejected() {
        let json = r#"{ "mix_high": { "physical": 0, "social": 0, "epistemic": 0 } }"#;
        assert!(KernelConfig::from_json(json).is_err());
    }
}
