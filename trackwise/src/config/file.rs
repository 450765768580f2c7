//! INI mapping for [`EngineConfig`].

use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::EngineConfig;
use crate::error::ConfigError;
use crate::policy::{TierSettings, TierTable};

const SECTIONS: [&str; 4] = ["motion", "policy", "sync", "driving"];

/// Reads typed values from one section, leaving absent keys untouched.
struct SectionReader<'a> {
    name: &'static str,
    props: Option<&'a Properties>,
}

impl<'a> SectionReader<'a> {
    fn new(ini: &'a Ini, name: &'static str) -> Self {
        Self {
            name,
            props: ini.section(Some(name)),
        }
    }

    fn raw(&self, key: &str) -> Option<&'a str> {
        self.props.and_then(|p| p.get(key)).map(str::trim)
    }

    fn parse_error(&self, key: &str, value: &str, reason: impl ToString) -> ConfigError {
        ConfigError::Parse {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn value<T>(&self, key: &str, target: &mut T) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(raw) = self.raw(key) {
            *target = raw
                .parse()
                .map_err(|e: T::Err| self.parse_error(key, raw, e))?;
        }
        Ok(())
    }

    fn flag(&self, key: &str, target: &mut bool) -> Result<(), ConfigError> {
        if let Some(raw) = self.raw(key) {
            *target = match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                _ => return Err(self.parse_error(key, raw, "expected true or false")),
            };
        }
        Ok(())
    }

    fn secs(&self, key: &str, target: &mut Duration) -> Result<(), ConfigError> {
        if let Some(raw) = self.raw(key) {
            let secs: f64 = raw.parse().map_err(|e| self.parse_error(key, raw, e))?;
            *target = Duration::try_from_secs_f64(secs).map_err(|e| self.parse_error(key, raw, e))?;
        }
        Ok(())
    }

    fn warn_unknown(&self, known: &[&str]) {
        let Some(props) = self.props else { return };
        for (key, _) in props.iter() {
            if !known.contains(&key) {
                tracing::warn!(section = self.name, key, "Ignoring unknown configuration key");
            }
        }
    }
}

fn tiers_mut(tiers: &mut TierTable) -> [(&'static str, &mut TierSettings); 5] {
    [
        ("ultra_power_saver", &mut tiers.ultra_power_saver),
        ("power_saver", &mut tiers.power_saver),
        ("balanced", &mut tiers.balanced),
        ("performance", &mut tiers.performance),
        ("high_performance", &mut tiers.high_performance),
    ]
}

const MOTION_KEYS: &[&str] = &[
    "window_size",
    "stationary_max_speed",
    "walking_max_speed",
    "cycling_max_speed",
    "driving_min_speed",
    "driving_min_acceleration",
    "running_min_variance",
    "driving_confirmation_secs",
    "stopped_confirmation_secs",
    "activity_confirmation_secs",
    "max_position_accuracy",
];

const POLICY_KEYS: &[&str] = &[
    "geofence_radius_m",
    "batch_flush_interval_secs",
    "reevaluate_interval_secs",
    "stationary_distance_multiplier",
    "walking_distance_multiplier",
    "running_distance_multiplier",
    "cycling_distance_multiplier",
    "driving_distance_multiplier",
    "unknown_distance_multiplier",
];

const SYNC_KEYS: &[&str] = &[
    "max_batch",
    "max_retries",
    "cooldown_floor_secs",
    "cooldown_ceiling_secs",
    "compression_level",
    "allow_poor_quality",
    "allow_metered",
    "min_bandwidth_kbps",
    "bandwidth_smoothing",
    "flush_interval_secs",
];

const DRIVING_KEYS: &[&str] = &[
    "hard_braking_threshold",
    "rapid_acceleration_threshold",
    "speeding_threshold",
    "turn_rotation_threshold",
    "turn_min_duration_secs",
    "max_route_accuracy",
];

/// Parse INI text over the defaults. Does not validate.
pub(super) fn parse(content: &str) -> Result<EngineConfig, ConfigError> {
    let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Ini(e.to_string()))?;
    let mut config = EngineConfig::default();

    for (section, _) in ini.iter() {
        if let Some(name) = section {
            if !SECTIONS.contains(&name) {
                tracing::warn!(section = name, "Ignoring unknown configuration section");
            }
        }
    }

    let motion = SectionReader::new(&ini, "motion");
    let m = &mut config.motion;
    motion.value("window_size", &mut m.window_size)?;
    motion.value("stationary_max_speed", &mut m.stationary_max_speed)?;
    motion.value("walking_max_speed", &mut m.walking_max_speed)?;
    motion.value("cycling_max_speed", &mut m.cycling_max_speed)?;
    motion.value("driving_min_speed", &mut m.driving_min_speed)?;
    motion.value("driving_min_acceleration", &mut m.driving_min_acceleration)?;
    motion.value("running_min_variance", &mut m.running_min_variance)?;
    motion.secs("driving_confirmation_secs", &mut m.driving_confirmation)?;
    motion.secs("stopped_confirmation_secs", &mut m.stopped_confirmation)?;
    motion.secs("activity_confirmation_secs", &mut m.activity_confirmation)?;
    motion.value("max_position_accuracy", &mut m.max_position_accuracy)?;
    motion.warn_unknown(MOTION_KEYS);

    let policy = SectionReader::new(&ini, "policy");
    let p = &mut config.policy;
    policy.value("geofence_radius_m", &mut p.geofence_radius_m)?;
    policy.secs("batch_flush_interval_secs", &mut p.batch_flush_interval)?;
    policy.secs("reevaluate_interval_secs", &mut p.reevaluate_interval)?;
    let d = &mut p.distance_multipliers;
    policy.value("stationary_distance_multiplier", &mut d.stationary)?;
    policy.value("walking_distance_multiplier", &mut d.walking)?;
    policy.value("running_distance_multiplier", &mut d.running)?;
    policy.value("cycling_distance_multiplier", &mut d.cycling)?;
    policy.value("driving_distance_multiplier", &mut d.driving)?;
    policy.value("unknown_distance_multiplier", &mut d.unknown)?;
    let mut tier_keys = Vec::new();
    for (tier, settings) in tiers_mut(&mut p.tiers) {
        let distance_key = format!("{}_min_distance_m", tier);
        let interval_key = format!("{}_interval_secs", tier);
        policy.value(&distance_key, &mut settings.min_distance_m)?;
        policy.secs(&interval_key, &mut settings.sampling_interval)?;
        tier_keys.push(distance_key);
        tier_keys.push(interval_key);
    }
    let known: Vec<&str> = POLICY_KEYS
        .iter()
        .copied()
        .chain(tier_keys.iter().map(String::as_str))
        .collect();
    policy.warn_unknown(&known);

    let sync = SectionReader::new(&ini, "sync");
    let s = &mut config.sync;
    sync.value("max_batch", &mut s.max_batch)?;
    sync.value("max_retries", &mut s.max_retries)?;
    sync.secs("cooldown_floor_secs", &mut s.cooldown_floor)?;
    sync.secs("cooldown_ceiling_secs", &mut s.cooldown_ceiling)?;
    sync.value("compression_level", &mut s.compression_level)?;
    sync.flag("allow_poor_quality", &mut s.allow_poor_quality)?;
    sync.flag("allow_metered", &mut s.allow_metered)?;
    sync.value("min_bandwidth_kbps", &mut s.min_bandwidth_kbps)?;
    sync.value("bandwidth_smoothing", &mut s.bandwidth_smoothing)?;
    sync.secs("flush_interval_secs", &mut s.flush_interval)?;
    sync.warn_unknown(SYNC_KEYS);

    let driving = SectionReader::new(&ini, "driving");
    let dr = &mut config.driving;
    driving.value("hard_braking_threshold", &mut dr.events.hard_braking)?;
    driving.value("rapid_acceleration_threshold", &mut dr.events.rapid_acceleration)?;
    driving.value("speeding_threshold", &mut dr.events.speeding)?;
    driving.value("turn_rotation_threshold", &mut dr.events.turn_rotation)?;
    driving.secs("turn_min_duration_secs", &mut dr.events.turn_min_duration)?;
    driving.value("max_route_accuracy", &mut dr.max_route_accuracy)?;
    driving.warn_unknown(DRIVING_KEYS);

    Ok(config)
}

fn secs(d: Duration) -> String {
    d.as_secs_f64().to_string()
}

/// Render every key of `config`.
pub(super) fn render(config: &EngineConfig) -> String {
    let mut ini = Ini::new();

    let m = &config.motion;
    ini.with_section(Some("motion"))
        .set("window_size", m.window_size.to_string())
        .set("stationary_max_speed", m.stationary_max_speed.to_string())
        .set("walking_max_speed", m.walking_max_speed.to_string())
        .set("cycling_max_speed", m.cycling_max_speed.to_string())
        .set("driving_min_speed", m.driving_min_speed.to_string())
        .set("driving_min_acceleration", m.driving_min_acceleration.to_string())
        .set("running_min_variance", m.running_min_variance.to_string())
        .set("driving_confirmation_secs", secs(m.driving_confirmation))
        .set("stopped_confirmation_secs", secs(m.stopped_confirmation))
        .set("activity_confirmation_secs", secs(m.activity_confirmation))
        .set("max_position_accuracy", m.max_position_accuracy.to_string());

    let p = &config.policy;
    let d = &p.distance_multipliers;
    ini.with_section(Some("policy"))
        .set("geofence_radius_m", p.geofence_radius_m.to_string())
        .set("batch_flush_interval_secs", secs(p.batch_flush_interval))
        .set("reevaluate_interval_secs", secs(p.reevaluate_interval))
        .set("stationary_distance_multiplier", d.stationary.to_string())
        .set("walking_distance_multiplier", d.walking.to_string())
        .set("running_distance_multiplier", d.running.to_string())
        .set("cycling_distance_multiplier", d.cycling.to_string())
        .set("driving_distance_multiplier", d.driving.to_string())
        .set("unknown_distance_multiplier", d.unknown.to_string());
    let mut tiers = p.tiers;
    for (tier, settings) in tiers_mut(&mut tiers) {
        ini.with_section(Some("policy"))
            .set(format!("{}_min_distance_m", tier), settings.min_distance_m.to_string())
            .set(format!("{}_interval_secs", tier), secs(settings.sampling_interval));
    }

    let s = &config.sync;
    ini.with_section(Some("sync"))
        .set("max_batch", s.max_batch.to_string())
        .set("max_retries", s.max_retries.to_string())
        .set("cooldown_floor_secs", secs(s.cooldown_floor))
        .set("cooldown_ceiling_secs", secs(s.cooldown_ceiling))
        .set("compression_level", s.compression_level.to_string())
        .set("allow_poor_quality", s.allow_poor_quality.to_string())
        .set("allow_metered", s.allow_metered.to_string())
        .set("min_bandwidth_kbps", s.min_bandwidth_kbps.to_string())
        .set("bandwidth_smoothing", s.bandwidth_smoothing.to_string())
        .set("flush_interval_secs", secs(s.flush_interval));

    let dr = &config.driving;
    ini.with_section(Some("driving"))
        .set("hard_braking_threshold", dr.events.hard_braking.to_string())
        .set("rapid_acceleration_threshold", dr.events.rapid_acceleration.to_string())
        .set("speeding_threshold", dr.events.speeding.to_string())
        .set("turn_rotation_threshold", dr.events.turn_rotation.to_string())
        .set("turn_min_duration_secs", secs(dr.events.turn_min_duration))
        .set("max_route_accuracy", dr.max_route_accuracy.to_string());

    let mut out = Vec::new();
    // Writing into a Vec cannot fail
    let _ = ini.write_to(&mut out);
    String::from_utf8_lossy(&out).into_owned()
}
