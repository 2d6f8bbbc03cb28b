use chrono::Utc;
use tera::Context;

use crate::db::{CaseCategoryRecord, CasePartyRecord, CaseRecord, PartyWithProfiles};

/// A case party link with the party it points at.
pub type LinkedParty = (CasePartyRecord, PartyWithProfiles);

pub fn build_context(
    case: &CaseRecord,
    category: Option<&CaseCategoryRecord>,
    parties: &[LinkedParty],
    extra: Option<&serde_json::Value>,
) -> serde_json::Value {
    let extra = extra.cloned().unwrap_or_else(|| serde_json::json!({}));
    let parties: Vec<serde_json::Value> = parties
        .iter()
        .map(|(link, party)| {
            serde_json::json!({
                "id": party.party.id.to_string(),
                "role": link.role,
                "name": party.display_name(),
                "is_corporation": party.party.is_corporation,
                "individual": party.individual_profile.as_ref().map(|p| &p.fields),
                "corporate": party.corporate_profile.as_ref().map(|p| &p.fields),
            })
        })
        .collect();

    serde_json::json!({
        "generated_at": Utc::now().to_rfc3339(),
        "case": {
            "id": case.id.to_string(),
            "name": case.name,
            "case_number": case.case_number,
            "status": case.status,
            "trial_level": case.trial_level,
            "hourly_rate": case.hourly_rate.map(|rate| rate.to_string()),
            "engagement_date": case.engagement_date.map(|dt| dt.date_naive().to_string()),
            "judgment_date": case.judgment_date.map(|dt| dt.date_naive().to_string()),
            "remarks": case.remarks,
            "custom_properties": case.custom_properties,
        },
        "category": category.map(|c| serde_json::json!({
            "id": c.id.to_string(),
            "name": c.name,
        })),
        "parties": parties,
        "extra": extra,
    })
}

pub fn render_template(body: &str, context: &serde_json::Value) -> Result<String, String> {
    let map = context
        .as_object()
        .ok_or_else(|| "template context must be a JSON object at the root".to_string())?;
    let mut tera_context = Context::new();
    for (key, value) in map {
        tera_context.insert(key, value);
    }

    tera::Tera::one_off(body, &tera_context, false).map_err(|err| {
        // Tera nests the useful cause (e.g. the missing variable) in `source`.
        let mut message = format!("failed to render template: {err}");
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(&format!(": {cause}"));
            source = cause.source();
        }
        message
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{build_context, render_template};
    use crate::db::{
        CasePartyRecord, CaseRecord, CorporateProfileFields, CorporateProfileRecord, PartyRecord,
        PartyWithProfiles,
    };

    fn sample_case() -> CaseRecord {
        let now = Utc::now();
        CaseRecord {
            id: Uuid::new_v4(),
            name: "Acme v. Beta".to_string(),
            case_number: Some("2026-WA-7".to_string()),
            status: Some("active".to_string()),
            trial_level: None,
            hourly_rate: None,
            first_consultation_date: None,
            engagement_date: None,
            case_closed_date: None,
            judgment_date: None,
            has_engagement_letter: true,
            remarks: None,
            custom_properties: serde_json::json!({"docket": "24-cv-100"}),
            category_id: Uuid::new_v4(),
            current_phase_id: None,
            court_division_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_party(case_id: Uuid) -> (CasePartyRecord, PartyWithProfiles) {
        let now = Utc::now();
        let party_id = Uuid::new_v4();
        (
            CasePartyRecord {
                case_id,
                party_id,
                role: "plaintiff".to_string(),
                created_at: now,
            },
            PartyWithProfiles {
                party: PartyRecord {
                    id: party_id,
                    is_corporation: true,
                    is_former_client: false,
                    created_at: now,
                    updated_at: now,
                },
                individual_profile: None,
                corporate_profile: Some(CorporateProfileRecord {
                    party_id,
                    fields: CorporateProfileFields {
                        name: Some("Acme Corp".to_string()),
                        ..Default::default()
                    },
                    created_at: now,
                    updated_at: now,
                }),
            },
        )
    }

    #[test]
    fn render_template_includes_case_and_party_data() {
        let case = sample_case();
        let parties = vec![sample_party(case.id)];
        let context = build_context(
            &case,
            None,
            &parties,
            Some(&serde_json::json!({"request": "summary"})),
        );

        let rendered = render_template(
            "Case {{ case.case_number }} for {{ parties[0].name }} as {{ parties[0].role }} \
             ({{ extra.request }}, docket {{ case.custom_properties.docket }})",
            &context,
        )
        .expect("render should succeed");
        assert!(rendered.contains("Case 2026-WA-7 for Acme Corp as plaintiff"));
        assert!(rendered.contains("(summary, docket 24-cv-100)"));
    }

    #[test]
    fn missing_variable_is_an_error() {
        let context = build_context(&sample_case(), None, &[], None);
        let err = render_template("Hello {{ nobody.name }}", &context).expect_err("must fail");
        assert!(err.contains("failed to render template"));
    }
}
