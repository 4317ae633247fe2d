//! Semeru submission path (spec §4.E "Semeru path").
//!
//! Per-member roster rows plus three named recovery branches off a single
//! `do_booking` attempt: roster saturation during roster build, the
//! "first member missing" case, and duplicate-identity purge.

use std::time::Duration;

use chrono::{Days, NaiveDate};
use serde_json::Value;

use super::errors::{is_duplicate_identity, is_minimal_members, is_roster_saturation};
use super::token::{fetch_descriptor, prime_session, send_action, send_submission_action};
use super::{outcome_from_response, DEFAULT_COUNTRY_ID};
use crate::error::{AppError, AppResult};
use crate::html::PageDescriptor;
use crate::http::Session;
use crate::lookup::list_roster_rows;
use crate::model::{Outcome, SemeruMember, SemeruProfile, Site};

/// Pause between consecutive `member_update` calls while building the
/// roster, so as not to hammer the endpoint.
const MEMBER_UPDATE_PAUSE: Duration = Duration::from_millis(150);

fn member_update_params(descriptor: &PageDescriptor, member: &SemeruMember) -> Vec<(String, String)> {
    vec![
        ("action".into(), "member_update".into()),
        ("id".into(), String::new()),
        ("secret".into(), descriptor.secret.clone()),
        ("form_hash".into(), descriptor.form_hash.clone()),
        ("name".into(), member.name.clone()),
        ("birthdate".into(), member.birthdate.format("%Y-%m-%d").to_string()),
        ("gender".into(), member.gender.to_string()),
        ("address".into(), member.address.clone()),
        ("identity_kind".into(), member.identity_kind.clone()),
        ("identity_no".into(), member.identity_no.clone()),
        ("member_phone".into(), member.member_phone.clone()),
        ("family_phone".into(), member.family_phone.clone()),
        ("job_code".into(), member.job_code.clone()),
        ("id_country".into(), DEFAULT_COUNTRY_ID.to_string()),
    ]
}

fn as_str_pairs(params: &[(String, String)]) -> Vec<(&str, &str)> {
    params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

async fn add_member(session: &Session, referer: &str, descriptor: &PageDescriptor, member: &SemeruMember) -> AppResult<()> {
    let params = member_update_params(descriptor, member);
    send_action(session, referer, &as_str_pairs(&params)).await.map(|_| ())
}

async fn do_booking_request(
    session: &Session,
    referer: &str,
    id_site: u32,
    date: NaiveDate,
    profile: &SemeruProfile,
    descriptor: &PageDescriptor,
) -> AppResult<Value> {
    send_action(
        session,
        referer,
        &[
            ("action", "validate_booking"),
            ("secret", &descriptor.secret),
            ("form_hash", &descriptor.form_hash),
        ],
    )
    .await?;

    let date_depart = date.format("%Y-%m-%d").to_string();
    let date_arrival = date
        .checked_add_days(Days::new(1))
        .unwrap_or(date)
        .format("%Y-%m-%d")
        .to_string();
    let id_sector = Site::Semeru.id_sector().to_string();
    let id_site_str = id_site.to_string();
    let pendamping = profile.leader.pendamping.to_string();
    let leader_setuju = profile.leader.leader_consent.to_string();

    send_submission_action(
        session,
        referer,
        &[
            ("action", "do_booking"),
            ("site", Site::Semeru.as_str()),
            ("id_sector", &id_sector),
            ("id_site", &id_site_str),
            ("date_depart", &date_depart),
            ("date_arrival", &date_arrival),
            ("name", &profile.leader.name),
            ("identity_kind", &profile.leader.identity_kind),
            ("identity_no", &profile.leader.identity_no),
            ("phone", &profile.leader.phone),
            ("organisation", &profile.leader.organisation),
            ("pendamping", &pendamping),
            ("leader_setuju", &leader_setuju),
            ("bank", profile.leader.bank.as_str()),
            ("termsCheckbox", "on"),
            ("secret", &descriptor.secret),
            ("form_hash", &descriptor.form_hash),
        ],
        session.submission_timeout(),
    )
    .await
}

#[tracing::instrument(name = "protocol.semeru.submit", skip(session, profile, descriptor))]
pub async fn submit(
    session: &Session,
    referer: &str,
    id_site: u32,
    date: NaiveDate,
    profile: &SemeruProfile,
    descriptor: &PageDescriptor,
) -> AppResult<Outcome> {
    let Some(first) = profile.members.first() else {
        return Err(AppError::ValidationServer(
            "semeru booking requires minimum leader + 1".to_string(),
        ));
    };

    let mut descriptor = descriptor.clone();

    match add_member(session, referer, &descriptor, first).await {
        Ok(()) => {}
        Err(AppError::ValidationServer(msg)) if is_roster_saturation(&msg) => {
            descriptor = fetch_descriptor(session, Site::Semeru, date).await?;
            prime_session(session, &descriptor, referer).await?;
            add_member(session, referer, &descriptor, first).await?;
        }
        Err(e) => return Err(e),
    }

    for member in profile.members.iter().skip(1).take(8) {
        tokio::time::sleep(MEMBER_UPDATE_PAUSE).await;
        match add_member(session, referer, &descriptor, member).await {
            Ok(()) => {}
            Err(AppError::ValidationServer(msg)) if is_roster_saturation(&msg) => break,
            Err(e) => return Err(e),
        }
    }

    match do_booking_request(session, referer, id_site, date, profile, &descriptor).await {
        Ok(body) => Ok(outcome_from_response(&body)),
        Err(AppError::ValidationServer(msg)) if is_minimal_members(&msg) => {
            add_member(session, referer, &descriptor, first).await?;
            let retry = do_booking_request(session, referer, id_site, date, profile, &descriptor).await?;
            Ok(outcome_from_response(&retry))
        }
        Err(AppError::ValidationServer(msg)) if is_duplicate_identity(&msg) => {
            let rows = list_roster_rows(session, &descriptor.secret).await?;
            for row in rows {
                let _ = send_action(
                    session,
                    referer,
                    &[
                        ("action", "member_delete"),
                        ("secret", &descriptor.secret),
                        ("form_hash", &descriptor.form_hash),
                        ("id", &row.id),
                    ],
                )
                .await;
            }
            let retry = do_booking_request(session, referer, id_site, date, profile, &descriptor).await?;
            Ok(outcome_from_response(&retry))
        }
        Err(e) => Err(e),
    }
}
