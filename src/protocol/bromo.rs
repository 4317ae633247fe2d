//! Bromo submission path (spec §4.E "Bromo path").

use chrono::NaiveDate;

use super::token::{send_action, send_submission_action};
use super::{outcome_from_response, DEFAULT_COUNTRY_ID};
use crate::error::AppResult;
use crate::html::PageDescriptor;
use crate::http::Session;
use crate::model::{BromoProfile, Outcome, Site};

/// One optional roster update (`anggota_update`) followed by `do_booking`.
/// No recovery branches on this path — any upstream rejection propagates.
#[tracing::instrument(name = "protocol.bromo.submit", skip(session, profile, descriptor))]
pub async fn submit(
    session: &Session,
    referer: &str,
    date: NaiveDate,
    profile: &BromoProfile,
    descriptor: &PageDescriptor,
) -> AppResult<Outcome> {
    if profile.male > 0 || profile.female > 0 {
        let male = profile.male.to_string();
        let female = profile.female.to_string();
        send_action(
            session,
            referer,
            &[
                ("action", "anggota_update"),
                ("male", &male),
                ("female", &female),
                ("id_country", DEFAULT_COUNTRY_ID),
            ],
        )
        .await?;
    }

    let date_str = date.format("%Y-%m-%d").to_string();
    let gate = profile.gate.to_string();
    let vehicle = profile.vehicle.to_string();
    let vehicle_count = profile.vehicle_count.to_string();
    let id_sector = Site::Bromo.id_sector().to_string();

    let body = send_submission_action(
        session,
        referer,
        &[
            ("action", "do_booking"),
            ("site", Site::Bromo.as_str()),
            ("id_sector", &id_sector),
            ("id_gate", &gate),
            ("id_vehicle", &vehicle),
            ("vehicle_count", &vehicle_count),
            ("date_depart", &date_str),
            ("date_arrival", &date_str),
            ("name", &profile.leader.name),
            ("identity_kind", &profile.leader.identity_kind),
            ("identity_no", &profile.leader.identity_no),
            ("phone", &profile.leader.phone),
            ("bank", profile.bank.as_str()),
            ("termsCheckbox", "on"),
            ("secret", &descriptor.secret),
            ("form_hash", &descriptor.form_hash),
        ],
        session.submission_timeout(),
    )
    .await?;

    Ok(outcome_from_response(&body))
}
