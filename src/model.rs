//! Data model (spec §3): users, jobs, site-specific profiles, and the
//! transient session context used while driving the upstream protocol.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ─── Site ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    Bromo,
    Semeru,
}

impl Site {
    pub fn as_str(&self) -> &'static str {
        match self {
            Site::Bromo => "bromo",
            Site::Semeru => "semeru",
        }
    }

    /// `id_sector` used in the `do_booking` payload.
    pub fn id_sector(&self) -> u32 {
        match self {
            Site::Bromo => 1,
            Site::Semeru => 3,
        }
    }

    /// Booking-page URL slug, e.g. `/booking/site/bromo`.
    pub fn slug(&self) -> &'static str {
        match self {
            Site::Bromo => "bromo",
            Site::Semeru => "semeru",
        }
    }
}

// ─── Cookies ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCookies {
    #[serde(rename = "_ga", default, skip_serializing_if = "Option::is_none")]
    pub ga: Option<String>,
    #[serde(rename = "_ga_session", default, skip_serializing_if = "Option::is_none")]
    pub ga_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_session: Option<String>,
}

impl JobCookies {
    pub fn is_empty(&self) -> bool {
        self.ga.is_none() && self.ga_session.is_none() && self.ci_session.is_none()
    }
}

// ─── Bromo profile ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Bank {
    #[serde(rename = "qris")]
    Qris,
    #[serde(rename = "VA-Mandiri")]
    VaMandiri,
    #[serde(rename = "VA-BNI")]
    VaBni,
}

impl Bank {
    /// The exact token the upstream `do_booking` form expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bank::Qris => "qris",
            Bank::VaMandiri => "VA-Mandiri",
            Bank::VaBni => "VA-BNI",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderIdentity {
    pub name: String,
    pub identity_kind: String,
    pub identity_no: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BromoProfile {
    pub leader: LeaderIdentity,
    /// 1..4
    pub gate: u8,
    /// 1, 2, 3, 4, or 6
    pub vehicle: u8,
    /// 1..20
    pub vehicle_count: u8,
    /// 0..19
    pub male: u8,
    /// 0..19
    pub female: u8,
    pub bank: Bank,
    pub address: String,
    pub province_code: String,
    pub district_code: String,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProfileValidationError {
    #[error("gate must be in 1..=4")]
    GateOutOfRange,
    #[error("vehicle must be one of 1, 2, 3, 4, or 6")]
    VehicleOutOfSet,
    #[error("vehicle_count must be in 1..=20")]
    VehicleCountOutOfRange,
    #[error("male passenger count must be in 0..=19")]
    MaleOutOfRange,
    #[error("female passenger count must be in 0..=19")]
    FemaleOutOfRange,
    #[error("semeru booking requires a leader and at least one member")]
    SemeruMissingMembers,
    #[error("semeru booking supports at most 9 members")]
    SemeruTooManyMembers,
    #[error("reminder_minutes must be in 0..=120")]
    ReminderOutOfRange,
}

/// Vehicle ids the upstream Bromo form accepts (spec.md §3).
const VALID_VEHICLES: [u8; 5] = [1, 2, 3, 4, 6];

impl BromoProfile {
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        if !(1..=4).contains(&self.gate) {
            return Err(ProfileValidationError::GateOutOfRange);
        }
        if !VALID_VEHICLES.contains(&self.vehicle) {
            return Err(ProfileValidationError::VehicleOutOfSet);
        }
        if !(1..=20).contains(&self.vehicle_count) {
            return Err(ProfileValidationError::VehicleCountOutOfRange);
        }
        if self.male > 19 {
            return Err(ProfileValidationError::MaleOutOfRange);
        }
        if self.female > 19 {
            return Err(ProfileValidationError::FemaleOutOfRange);
        }
        Ok(())
    }
}

// ─── Semeru profile ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemeruLeader {
    pub name: String,
    pub identity_kind: String,
    pub identity_no: String,
    pub phone: String,
    /// 0 or 1 — whether the leader brings a "pendamping" (local guide).
    pub pendamping: u8,
    pub organisation: String,
    /// 0 or 1 — leader's consent checkbox ("setuju").
    pub leader_consent: u8,
    pub bank: Bank,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemeruMember {
    pub name: String,
    /// `YYYY-MM-DD`.
    pub birthdate: NaiveDate,
    /// 1 = male, 2 = female.
    pub gender: u8,
    pub address: String,
    pub identity_kind: String,
    pub identity_no: String,
    pub member_phone: String,
    pub family_phone: String,
    pub job_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemeruProfile {
    pub leader: SemeruLeader,
    pub members: Vec<SemeruMember>,
}

impl SemeruProfile {
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        if self.members.is_empty() {
            return Err(ProfileValidationError::SemeruMissingMembers);
        }
        if self.members.len() > 9 {
            return Err(ProfileValidationError::SemeruTooManyMembers);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "site", rename_all = "snake_case")]
pub enum Profile {
    Bromo(BromoProfile),
    Semeru(SemeruProfile),
}

impl Profile {
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        match self {
            Profile::Bromo(p) => p.validate(),
            Profile::Semeru(p) => p.validate(),
        }
    }

    pub fn leader_name(&self) -> &str {
        match self {
            Profile::Bromo(p) => &p.leader.name,
            Profile::Semeru(p) => &p.leader.name,
        }
    }

    pub fn site(&self) -> Site {
        match self {
            Profile::Bromo(_) => Site::Bromo,
            Profile::Semeru(_) => Site::Semeru,
        }
    }
}

// ─── Job ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_name: String,
    pub site: Site,
    pub booking_date: NaiveDate,
    pub exec_at: DateTime<Utc>,
    pub profile: Profile,
    #[serde(default)]
    pub cookies: JobCookies,
    #[serde(default)]
    pub reminder_minutes: Option<u8>,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Profile-level checks plus `reminder_minutes ∈ [0,120]` (spec.md §8).
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        self.profile.validate()?;
        if let Some(minutes) = self.reminder_minutes {
            if minutes > 120 {
                return Err(ProfileValidationError::ReminderOutOfRange);
            }
        }
        Ok(())
    }
}

/// Lowercase, hyphen-safe slug of a leader's name for use in `job_name`.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("anon");
    }
    out
}

/// `"{site}-{uid}-{slug(leader)}-{booking}-{exec_date}-{hhmmss}"` per spec §3.
pub fn derive_job_name(
    site: Site,
    uid: &str,
    leader: &str,
    booking_date: NaiveDate,
    exec_at: DateTime<chrono_tz::Tz>,
) -> String {
    format!(
        "{}-{}-{}-{}-{}-{}",
        site.as_str(),
        uid,
        slugify(leader),
        booking_date.format("%Y-%m-%d"),
        exec_at.date_naive().format("%Y-%m-%d"),
        exec_at.format("%H%M%S"),
    )
}

/// The five components of a `job_name`, recovered by [`parse_job_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNameParts {
    pub site: String,
    pub uid: String,
    pub leader_slug: String,
    pub booking_date: String,
    pub exec_date: String,
    pub exec_time: String,
}

pub fn parse_job_name(name: &str) -> Option<JobNameParts> {
    let parts: Vec<&str> = name.split('-').collect();
    if parts.len() < 6 {
        return None;
    }
    // site-uid-leader_slug-booking_date(YYYY-MM-DD)-exec_date(YYYY-MM-DD)-hhmmss
    // booking_date and exec_date each contribute 3 hyphen-joined fields, so
    // `leader_slug` is whatever sits between index 2 and len-7.
    let site = parts[0].to_string();
    let uid = parts[1].to_string();
    let hhmmss = parts[parts.len() - 1].to_string();
    let exec_date = parts[parts.len() - 4..parts.len() - 1].join("-");
    let booking_date = parts[parts.len() - 7..parts.len() - 4].join("-");
    let leader_slug = parts[2..parts.len() - 7].join("-");
    Some(JobNameParts {
        site,
        uid,
        leader_slug,
        booking_date,
        exec_date,
        exec_time: hhmmss,
    })
}

// ─── UserRecord ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub ci_session: Option<String>,
    #[serde(default)]
    pub jobs: HashMap<String, Job>,
}

// ─── CapacityRow ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRow {
    pub date_label: String,
    pub quota: u32,
    pub available: bool,
}

impl CapacityRow {
    pub fn from_quota(date_label: impl Into<String>, quota: u32) -> Self {
        Self {
            date_label: date_label.into(),
            available: quota > 0,
            quota,
        }
    }
}

// ─── Outcome ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub booking_code: Option<String>,
    pub raw: String,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Budi  Santoso Jr."), "budi-santoso-jr");
    }

    #[test]
    fn slugify_empty_becomes_anon() {
        assert_eq!(slugify("   ...   "), "anon");
    }

    #[test]
    fn job_name_round_trips_parts() {
        use chrono::TimeZone;
        let exec = chrono_tz::Asia::Jakarta
            .with_ymd_and_hms(2025, 9, 30, 7, 0, 0)
            .unwrap();
        let name = derive_job_name(
            Site::Bromo,
            "123",
            "Budi Santoso",
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            exec,
        );
        let parts = parse_job_name(&name).expect("should parse");
        assert_eq!(parts.site, "bromo");
        assert_eq!(parts.uid, "123");
        assert_eq!(parts.leader_slug, "budi-santoso");
        assert_eq!(parts.booking_date, "2025-10-01");
        assert_eq!(parts.exec_date, "2025-09-30");
        assert_eq!(parts.exec_time, "070000");
    }

    #[test]
    fn bromo_validate_rejects_out_of_range_gate() {
        let p = BromoProfile {
            leader: LeaderIdentity {
                name: "A".into(),
                identity_kind: "ktp".into(),
                identity_no: "1".into(),
                phone: "08".into(),
            },
            gate: 5,
            vehicle: 2,
            vehicle_count: 1,
            male: 0,
            female: 0,
            bank: Bank::Qris,
            address: String::new(),
            province_code: String::new(),
            district_code: String::new(),
        };
        assert_eq!(p.validate(), Err(ProfileValidationError::GateOutOfRange));
    }

    #[test]
    fn bromo_validate_rejects_vehicle_out_of_set() {
        let p = BromoProfile {
            leader: LeaderIdentity {
                name: "A".into(),
                identity_kind: "ktp".into(),
                identity_no: "1".into(),
                phone: "08".into(),
            },
            gate: 1,
            vehicle: 5,
            vehicle_count: 1,
            male: 0,
            female: 0,
            bank: Bank::Qris,
            address: String::new(),
            province_code: String::new(),
            district_code: String::new(),
        };
        assert_eq!(p.validate(), Err(ProfileValidationError::VehicleOutOfSet));
    }

    fn sample_bromo_job(reminder_minutes: Option<u8>) -> Job {
        Job {
            job_name: "bromo-1-a-2025-10-01-2025-09-30-070000".to_string(),
            site: Site::Bromo,
            booking_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            exec_at: Utc::now(),
            profile: Profile::Bromo(BromoProfile {
                leader: LeaderIdentity {
                    name: "A".into(),
                    identity_kind: "ktp".into(),
                    identity_no: "1".into(),
                    phone: "08".into(),
                },
                gate: 1,
                vehicle: 2,
                vehicle_count: 1,
                male: 0,
                female: 0,
                bank: Bank::Qris,
                address: String::new(),
                province_code: String::new(),
                district_code: String::new(),
            }),
            cookies: JobCookies::default(),
            reminder_minutes,
            chat_id: "chat-1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn job_validate_accepts_reminder_at_upper_bound() {
        assert!(sample_bromo_job(Some(120)).validate().is_ok());
    }

    #[test]
    fn job_validate_rejects_reminder_just_over_bound() {
        assert_eq!(
            sample_bromo_job(Some(121)).validate(),
            Err(ProfileValidationError::ReminderOutOfRange)
        );
    }

    #[test]
    fn job_validate_rejects_reminder_far_over_bound() {
        assert_eq!(
            sample_bromo_job(Some(200)).validate(),
            Err(ProfileValidationError::ReminderOutOfRange)
        );
    }

    #[test]
    fn semeru_validate_rejects_empty_members() {
        let p = SemeruProfile {
            leader: SemeruLeader {
                name: "A".into(),
                identity_kind: "ktp".into(),
                identity_no: "1".into(),
                phone: "08".into(),
                pendamping: 0,
                organisation: String::new(),
                leader_consent: 1,
                bank: Bank::Qris,
            },
            members: vec![],
        };
        assert_eq!(
            p.validate(),
            Err(ProfileValidationError::SemeruMissingMembers)
        );
    }
}
