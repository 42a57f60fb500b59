//! Warehouse table definitions (§3.1, §4.2). The original `core/database_schema.py`
//! hardcodes one `get_schema_sql()` as the single source of truth for the
//! warehouse; here that source of truth is a typed `SchemaCatalog` built once
//! at startup rather than a SQL string, per §9's canonical-IR design note.

use etl_schema::{CanonicalType as Ty, ColumnSpec as Col, SchemaCatalog, TableSpec};

pub fn default_catalog() -> SchemaCatalog {
    SchemaCatalog::new()
        .with_table(people_table())
        .with_table(employees_table())
        .with_table(cases_table())
        .with_table(referrals_table())
}

fn people_table() -> TableSpec {
    TableSpec::new(
        "people",
        vec![
            Col::new("person_id", Ty::Text),
            Col::new("people_created_by_id", Ty::Text),
            Col::new("people_created_at", Ty::Timestamp),
            Col::new("people_updated_at", Ty::Timestamp),
            Col::new("first_name", Ty::Text),
            Col::new("middle_name", Ty::Text),
            Col::new("last_name", Ty::Text),
            Col::new("title", Ty::Text),
            Col::new("suffix", Ty::Text),
            Col::new("preferred_name", Ty::Text),
            Col::new("person_consent_status", Ty::Text),
            Col::new("date_of_birth", Ty::Date),
            Col::new("gender", Ty::Text),
            Col::new("sexuality", Ty::Text),
            Col::new("sexuality_other", Ty::Text),
            Col::new("race", Ty::Text),
            Col::new("ethnicity", Ty::Text),
            Col::new("citizenship", Ty::Text),
            Col::new("marital_status", Ty::Text),
            Col::new("military_affiliation", Ty::Text),
            Col::new("gross_monthly_income", Ty::Real),
            Col::new("household_size", Ty::Int),
            Col::new("adults_in_household", Ty::Int),
            Col::new("children_in_household", Ty::Int),
            Col::new("languages", Ty::Text),
            Col::new("medicaid_id", Ty::Text),
            Col::new("medicaid_state", Ty::Text),
            Col::new("medicare_id", Ty::Text),
            Col::new("preferred_communication_method", Ty::Text),
            Col::new("preferred_communication_time_of_day", Ty::Text),
            Col::new("person_email_address", Ty::Text),
            Col::new("person_phone_number", Ty::Text),
            Col::new("current_person_address_line1", Ty::Text),
            Col::new("current_person_address_line2", Ty::Text),
            Col::new("current_person_address_city", Ty::Text),
            Col::new("current_person_address_county", Ty::Text),
            Col::new("current_person_address_state", Ty::Text),
            Col::new("current_person_address_postal_code", Ty::Text),
            Col::new("current_person_address_type", Ty::Text),
            Col::new("person_external_id", Ty::Text),
            Col::new("pull_timestamp", Ty::Timestamp),
        ],
        Some("person_id"),
    )
}

fn employees_table() -> TableSpec {
    TableSpec::new(
        "employees",
        vec![
            Col::new("employee_id", Ty::Text),
            Col::new("user_id", Ty::Text),
            Col::new("first_name", Ty::Text),
            Col::new("last_name", Ty::Text),
            Col::new("work_title", Ty::Text),
            Col::new("email_address", Ty::Text),
            Col::new("employee_status", Ty::Text),
            Col::new("network_id", Ty::Text),
            Col::new("network_name", Ty::Text),
            Col::new("provider_id", Ty::Text),
            Col::new("provider_name", Ty::Text),
            Col::new("pull_timestamp", Ty::Timestamp),
        ],
        Some("employee_id"),
    )
}

fn cases_table() -> TableSpec {
    TableSpec::new(
        "cases",
        vec![
            Col::new("case_id", Ty::Text),
            Col::new("person_id", Ty::Text),
            Col::new("case_created_at", Ty::Timestamp),
            Col::new("case_updated_at", Ty::Timestamp),
            Col::new("case_closed_at", Ty::Timestamp),
            Col::new("case_status", Ty::Text),
            Col::new("service_type", Ty::Text),
            Col::new("service_subtype", Ty::Text),
            Col::new("case_description", Ty::Text),
            Col::new("is_sensitive", Ty::Bool),
            Col::new("network_id", Ty::Text),
            Col::new("network_name", Ty::Text),
            Col::new("provider_id", Ty::Text),
            Col::new("provider_name", Ty::Text),
            Col::new("program_id", Ty::Text),
            Col::new("program_name", Ty::Text),
            Col::new("primary_worker_id", Ty::Text),
            Col::new("primary_worker_name", Ty::Text),
            Col::new("outcome_id", Ty::Text),
            Col::new("outcome_description", Ty::Text),
            Col::new("pull_timestamp", Ty::Timestamp),
        ],
        Some("case_id"),
    )
}

fn referrals_table() -> TableSpec {
    TableSpec::new(
        "referrals",
        vec![
            Col::new("referral_id", Ty::Text),
            Col::new("person_id", Ty::Text),
            Col::new("case_id", Ty::Text),
            Col::new("referral_created_at", Ty::Timestamp),
            Col::new("referral_updated_at", Ty::Timestamp),
            Col::new("referral_sent_at", Ty::Timestamp),
            Col::new("referral_status", Ty::Text),
            Col::new("declined_at", Ty::Timestamp),
            Col::new("declined_reason", Ty::Text),
            Col::new("sending_network_id", Ty::Text),
            Col::new("sending_network_name", Ty::Text),
            Col::new("receiving_network_id", Ty::Text),
            Col::new("receiving_network_name", Ty::Text),
            Col::new("service_type", Ty::Text),
            Col::new("service_subtype", Ty::Text),
            Col::new("referral_reason", Ty::Text),
            Col::new("followup_date", Ty::Date),
            Col::new("pull_timestamp", Ty::Timestamp),
        ],
        Some("referral_id"),
    )
}
