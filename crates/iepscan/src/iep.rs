//! Structured attributes of an IEP document.
//!
//! Every field is optional: the structured stage fills in what it can find
//! and leaves the rest empty. Array fields default to empty.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IepFields {
    // Student
    pub child_name: Option<String>,
    pub child_dob: Option<String>,
    pub student_id: Option<String>,
    pub grade: Option<String>,
    pub school_name: Option<String>,
    pub school_district: Option<String>,
    pub child_address: Option<String>,
    pub parent_guardian_name: Option<String>,
    pub parent_contact: Option<String>,
    pub case_manager: Option<String>,

    // Eligibility
    pub primary_disability: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub secondary_disabilities: Vec<String>,
    pub evaluation_date: Option<String>,
    pub reevaluation_due: Option<String>,
    pub eligibility_determination: Option<String>,

    // Goals
    #[serde(deserialize_with = "null_as_empty")]
    pub annual_goals: Vec<AnnualGoal>,
    #[serde(deserialize_with = "null_as_empty")]
    pub short_term_objectives: Vec<ShortTermObjective>,

    // Services
    #[serde(deserialize_with = "null_as_empty")]
    pub special_education_services: Vec<SpecialEducationService>,
    #[serde(deserialize_with = "null_as_empty")]
    pub related_services: Vec<RelatedService>,
    pub assistive_technology: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub accommodations: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub modifications: Vec<String>,
    pub behavior_plan: Option<String>,

    // Placement
    pub placement: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub minutes_in_general_ed: Option<u32>,
    pub minutes_in_special_ed: Option<u32>,
    pub extended_school_year: Option<bool>,

    #[serde(deserialize_with = "null_as_empty")]
    pub iep_team: Vec<TeamMember>,

    // Consent and meetings
    pub consent_signed: Option<bool>,
    pub consent_date: Option<String>,
    pub meeting_date: Option<String>,
    pub next_meeting_due: Option<String>,
}

impl IepFields {
    /// True when nothing at all was extracted.
    pub fn is_empty(&self) -> bool {
        *self == IepFields::default()
    }
}

/// Models sometimes emit `null` for an empty list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnualGoal {
    pub goal: Option<String>,
    pub area: Option<String>,
    pub criteria: Option<String>,
    pub progress_method: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShortTermObjective {
    pub objective: Option<String>,
    pub area: Option<String>,
    pub criteria: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpecialEducationService {
    pub service: Option<String>,
    pub frequency: Option<String>,
    pub location: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelatedService {
    pub service: Option<String>,
    pub provider: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamMember {
    pub name: Option<String>,
    pub role: Option<String>,
    pub signature: Option<String>,
    pub date: Option<String>,
}
