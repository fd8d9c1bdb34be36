//! Per-variant config validation: ranges, required fields,
//! IANA timezone names, `HH:MM` format, enum values. Every failure raises
//! `InvalidConstraintConfig` naming the offending field.

use crate::error::TminusError;
use crate::model::constraint::{
    BufferConfig, ConstraintKind, MilestoneConfig, NoMeetingsAfterConfig, OverrideConfig, TripConfig,
    WorkingHoursConfig,
};
use chrono_tz::Tz;
use std::str::FromStr;

fn err(field: &str, msg: &str) -> TminusError {
    TminusError::InvalidConstraintConfig(format!("{field}: {msg}"))
}

pub fn valid_timezone(tz: &str) -> Result<(), TminusError> {
    Tz::from_str(tz).map(|_| ()).map_err(|_| err("timezone", &format!("'{tz}' is not a known IANA timezone")))
}

/// Parses `HH:MM` (24-hour), rejecting anything else.
pub fn parse_hhmm(field: &str, s: &str) -> Result<(u32, u32), TminusError> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| err(field, &format!("'{s}' is not HH:MM")))?;
    let hour: u32 = h.parse().map_err(|_| err(field, &format!("'{s}' is not HH:MM")))?;
    let minute: u32 = m.parse().map_err(|_| err(field, &format!("'{s}' is not HH:MM")))?;
    if hour > 23 || minute > 59 {
        return Err(err(field, &format!("'{s}' out of range")));
    }
    Ok((hour, minute))
}

pub fn validate_trip(cfg: &TripConfig) -> Result<(), TminusError> {
    if cfg.name.trim().is_empty() {
        return Err(err("name", "must not be empty"));
    }
    valid_timezone(&cfg.timezone)?;
    let _ = cfg.block_policy;
    Ok(())
}

pub fn validate_working_hours(cfg: &WorkingHoursConfig) -> Result<(), TminusError> {
    if cfg.days.is_empty() {
        return Err(err("days", "must be a non-empty subset of 0-6"));
    }
    if cfg.days.iter().any(|d| *d > 6) {
        return Err(err("days", "values must be 0-6"));
    }
    valid_timezone(&cfg.timezone)?;
    let (sh, sm) = parse_hhmm("start_time", &cfg.start_time)?;
    let (eh, em) = parse_hhmm("end_time", &cfg.end_time)?;
    if (eh, em) <= (sh, sm) {
        return Err(err("end_time", "must be after start_time"));
    }
    Ok(())
}

pub fn validate_buffer(cfg: &BufferConfig) -> Result<(), TminusError> {
    if cfg.minutes == 0 {
        return Err(err("minutes", "must be a positive integer"));
    }
    let _ = (cfg.kind, cfg.applies_to);
    Ok(())
}

pub fn validate_no_meetings_after(cfg: &NoMeetingsAfterConfig) -> Result<(), TminusError> {
    valid_timezone(&cfg.timezone)?;
    parse_hhmm("cutoff_time", &cfg.cutoff_time)?;
    Ok(())
}

pub fn validate_override(cfg: &OverrideConfig) -> Result<(), TminusError> {
    if cfg.reason.trim().is_empty() {
        return Err(err("reason", "must not be empty"));
    }
    Ok(())
}

pub fn validate_milestone(cfg: &MilestoneConfig) -> Result<(), TminusError> {
    if cfg.milestone_id.trim().is_empty() {
        return Err(err("milestone_id", "must not be empty"));
    }
    Ok(())
}

/// Parse and validate `config_json` against `kind`'s variant schema.
pub fn validate_config(kind: ConstraintKind, config_json: &serde_json::Value) -> Result<(), TminusError> {
    match kind {
        ConstraintKind::Trip => {
            let cfg: TripConfig = serde_json::from_value(config_json.clone())
                .map_err(|e| err("config", &e.to_string()))?;
            validate_trip(&cfg)
        }
        ConstraintKind::WorkingHours => {
            let cfg: WorkingHoursConfig = serde_json::from_value(config_json.clone())
                .map_err(|e| err("config", &e.to_string()))?;
            validate_working_hours(&cfg)
        }
        ConstraintKind::Buffer => {
            let cfg: BufferConfig = serde_json::from_value(config_json.clone())
                .map_err(|e| err("config", &e.to_string()))?;
            validate_buffer(&cfg)
        }
        ConstraintKind::NoMeetingsAfter => {
            let cfg: NoMeetingsAfterConfig = serde_json::from_value(config_json.clone())
                .map_err(|e| err("config", &e.to_string()))?;
            validate_no_meetings_after(&cfg)
        }
        ConstraintKind::Override => {
            let cfg: OverrideConfig = serde_json::from_value(config_json.clone())
                .map_err(|e| err("config", &e.to_string()))?;
            validate_override(&cfg)
        }
        ConstraintKind::Milestone => {
            let cfg: MilestoneConfig = serde_json::from_value(config_json.clone())
                .map_err(|e| err("config", &e.to_string()))?;
            validate_milestone(&cfg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn working_hours_rejects_bad_timezone() {
        let result = validate_config(
            ConstraintKind::WorkingHours,
            &json!({"days":[1,2,3,4,5],"start_time":"09:00","end_time":"17:00","timezone":"Mars/Phobos"}),
        );
        assert!(matches!(result, Err(TminusError::InvalidConstraintConfig(_))));
    }

    #[test]
    fn working_hours_rejects_end_before_start() {
        let result = validate_config(
            ConstraintKind::WorkingHours,
            &json!({"days":[1],"start_time":"17:00","end_time":"09:00","timezone":"UTC"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn working_hours_accepts_valid_config() {
        let result = validate_config(
            ConstraintKind::WorkingHours,
            &json!({"days":[1,2,3,4,5],"start_time":"09:00","end_time":"17:00","timezone":"UTC"}),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn buffer_rejects_zero_minutes() {
        let result = validate_config(
            ConstraintKind::Buffer,
            &json!({"type":"travel","minutes":0,"applies_to":"all"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn trip_rejects_empty_name() {
        let result = validate_config(
            ConstraintKind::Trip,
            &json!({"name":"","timezone":"UTC","block_policy":"BUSY"}),
        );
        assert!(result.is_err());
    }
}
