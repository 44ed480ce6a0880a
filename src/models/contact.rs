// src/models/contact.rs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::matching::normalize::{normalize, normalize_email, split_position};

/// Minimum number of populated identity fields a record needs before it is compared.
pub const MIN_POPULATED_IDENTITY_FIELDS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    LinkedIn,
    Crm,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::LinkedIn => "linkedin",
            Origin::Crm => "crm",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A person record from either source, reduced to the fields used for matching.
///
/// Values are kept as they arrived; normalization happens at comparison time.
/// `source_index` points back into the slice the caller passed to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub origin: Origin,
    pub source_index: usize,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
}

impl ContactRecord {
    pub fn new(origin: Origin, source_index: usize) -> Self {
        Self {
            origin,
            source_index,
            source_id: None,
            full_name: None,
            given_name: None,
            family_name: None,
            email: None,
            phone: None,
            company: None,
            job_title: None,
            location: None,
            profile_url: None,
        }
    }

    /// Full name if present, otherwise given and family name joined.
    pub fn display_name(&self) -> Option<String> {
        if let Some(full) = non_blank(self.full_name.as_deref()) {
            return Some(full.to_string());
        }
        let parts: Vec<&str> = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .filter_map(non_blank)
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    pub fn normalized_name(&self) -> Option<String> {
        normalize(self.display_name().as_deref())
    }

    pub fn normalized_email(&self) -> Option<String> {
        normalize_email(self.email.as_deref())
    }

    pub fn normalized_company(&self) -> Option<String> {
        normalize(self.company.as_deref())
    }

    pub fn normalized_job_title(&self) -> Option<String> {
        normalize(self.job_title.as_deref())
    }

    /// Count of identity fields that survive normalization.
    ///
    /// The name is a single slot whether it arrived as a full name or as split
    /// given/family columns, so the same person counts the same from either source.
    pub fn populated_identity_fields(&self) -> usize {
        [
            self.normalized_name().is_some(),
            self.normalized_email().is_some(),
            self.normalized_company().is_some(),
            self.normalized_job_title().is_some(),
        ]
        .iter()
        .filter(|populated| **populated)
        .count()
    }

    pub fn is_eligible(&self) -> bool {
        self.populated_identity_fields() >= MIN_POPULATED_IDENTITY_FIELDS
    }

    pub fn label(&self) -> String {
        match &self.source_id {
            Some(id) => format!("{}:{}", self.origin, id),
            None => format!("{}#{}", self.origin, self.source_index),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn owned(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_string)
}

/// Scraped LinkedIn profile, also accepting the column names of the connections export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkedInProfile {
    #[serde(default, alias = "URL", alias = "url")]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default, alias = "First Name")]
    pub first_name: Option<String>,
    #[serde(default, alias = "Last Name")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub current_position: Option<String>,
    #[serde(default, alias = "Position")]
    pub position: Option<String>,
    #[serde(default, alias = "Company")]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, alias = "Email Address")]
    pub email: Option<String>,
    #[serde(default)]
    pub contact_info: Vec<String>,
}

impl LinkedInProfile {
    pub fn into_record(self, source_index: usize) -> ContactRecord {
        let (position_title, position_company) = match non_blank(self.current_position.as_deref()) {
            Some(position) => split_position(position),
            None => (None, None),
        };

        let full_name = owned(self.full_name.as_deref()).or_else(|| {
            let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
                .into_iter()
                .filter_map(non_blank)
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        });

        let email = owned(self.email.as_deref()).or_else(|| {
            self.contact_info
                .iter()
                .find(|entry| entry.contains('@'))
                .map(|entry| entry.trim().to_string())
        });

        let mut record = ContactRecord::new(Origin::LinkedIn, source_index);
        record.source_id = owned(self.profile_url.as_deref());
        record.full_name = full_name;
        record.given_name = owned(self.first_name.as_deref());
        record.family_name = owned(self.last_name.as_deref());
        record.email = email;
        record.company = position_company.or_else(|| owned(self.company.as_deref()));
        record.job_title = position_title
            .or_else(|| owned(self.position.as_deref()))
            .or_else(|| owned(self.headline.as_deref()));
        record.location = owned(self.location.as_deref());
        record.profile_url = owned(self.profile_url.as_deref());
        record
    }
}

/// CRM contact as exported from the Dynamics contacts entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmContact {
    #[serde(default)]
    pub contactid: Option<String>,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub emailaddress1: Option<String>,
    #[serde(default)]
    pub telephone1: Option<String>,
    #[serde(default)]
    pub mobilephone: Option<String>,
    #[serde(default)]
    pub companyname: Option<String>,
    #[serde(default)]
    pub jobtitle: Option<String>,
    #[serde(default)]
    pub address1_line1: Option<String>,
    #[serde(default)]
    pub address1_city: Option<String>,
    #[serde(default)]
    pub address1_country: Option<String>,
}

impl CrmContact {
    pub fn into_record(self, source_index: usize) -> ContactRecord {
        let full_name = owned(self.fullname.as_deref()).or_else(|| {
            let parts: Vec<&str> = [self.firstname.as_deref(), self.lastname.as_deref()]
                .into_iter()
                .filter_map(non_blank)
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        });

        let address: Vec<&str> = [
            self.address1_line1.as_deref(),
            self.address1_city.as_deref(),
            self.address1_country.as_deref(),
        ]
        .into_iter()
        .filter_map(non_blank)
        .collect();

        let mut record = ContactRecord::new(Origin::Crm, source_index);
        record.source_id = owned(self.contactid.as_deref());
        record.full_name = full_name;
        record.given_name = owned(self.firstname.as_deref());
        record.family_name = owned(self.lastname.as_deref());
        record.email = owned(self.emailaddress1.as_deref());
        record.phone = owned(self.telephone1.as_deref()).or_else(|| owned(self.mobilephone.as_deref()));
        record.company = owned(self.companyname.as_deref());
        record.job_title = owned(self.jobtitle.as_deref());
        record.location = (!address.is_empty()).then(|| address.join(", "));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility_requires_two_fields() {
        let mut record = ContactRecord::new(Origin::Crm, 0);
        record.full_name = Some("Anna Schmidt".to_string());
        assert!(!record.is_eligible());

        record.company = Some("Siemens AG".to_string());
        assert!(record.is_eligible());
    }

    #[test]
    fn test_fields_blank_after_normalization_do_not_count() {
        let mut record = ContactRecord::new(Origin::LinkedIn, 0);
        record.full_name = Some("Dr.".to_string());
        record.company = Some("GmbH".to_string());
        record.email = Some("not-an-email".to_string());
        assert_eq!(record.populated_identity_fields(), 0);
        assert!(!record.is_eligible());
    }

    #[test]
    fn test_name_is_one_slot_for_either_source() {
        let linkedin = LinkedInProfile {
            full_name: Some("Jane Doe".to_string()),
            ..Default::default()
        }
        .into_record(0);
        let crm = CrmContact {
            firstname: Some("Jane".to_string()),
            lastname: Some("Doe".to_string()),
            ..Default::default()
        }
        .into_record(0);
        assert_eq!(linkedin.populated_identity_fields(), 1);
        assert_eq!(crm.populated_identity_fields(), 1);
        assert!(!linkedin.is_eligible());
        assert!(!crm.is_eligible());

        let mut split_only = ContactRecord::new(Origin::Crm, 1);
        split_only.given_name = Some("Jane".to_string());
        split_only.family_name = Some("Doe".to_string());
        assert_eq!(split_only.populated_identity_fields(), 1);

        split_only.company = Some("Acme".to_string());
        assert!(split_only.is_eligible());
    }

    #[test]
    fn test_linkedin_profile_conversion() {
        let profile = LinkedInProfile {
            profile_url: Some("https://www.linkedin.com/in/jdoe".to_string()),
            full_name: Some("Jane Doe".to_string()),
            current_position: Some("Head of Sales at Acme Corp".to_string()),
            headline: Some("Sales leader".to_string()),
            contact_info: vec!["+49 30 1234".to_string(), "jane@acme.com".to_string()],
            ..Default::default()
        };
        let record = profile.into_record(3);
        assert_eq!(record.origin, Origin::LinkedIn);
        assert_eq!(record.source_index, 3);
        assert_eq!(record.company.as_deref(), Some("Acme Corp"));
        assert_eq!(record.job_title.as_deref(), Some("Head of Sales"));
        assert_eq!(record.email.as_deref(), Some("jane@acme.com"));
        assert_eq!(record.label(), "linkedin:https://www.linkedin.com/in/jdoe");
    }

    #[test]
    fn test_linkedin_export_columns() {
        let json = r#"{"First Name": "Max", "Last Name": "Muster", "Company": "Beispiel GmbH", "Position": "CTO"}"#;
        let profile: LinkedInProfile = serde_json::from_str(json).unwrap();
        let record = profile.into_record(0);
        assert_eq!(record.full_name.as_deref(), Some("Max Muster"));
        assert_eq!(record.company.as_deref(), Some("Beispiel GmbH"));
        assert_eq!(record.job_title.as_deref(), Some("CTO"));
    }

    #[test]
    fn test_crm_contact_conversion() {
        let contact = CrmContact {
            contactid: Some("c-1".to_string()),
            firstname: Some("Bob".to_string()),
            lastname: Some("Smith".to_string()),
            mobilephone: Some("0170 123".to_string()),
            companyname: Some("Acme Inc".to_string()),
            address1_city: Some("Berlin".to_string()),
            address1_country: Some("Germany".to_string()),
            ..Default::default()
        };
        let record = contact.into_record(7);
        assert_eq!(record.full_name.as_deref(), Some("Bob Smith"));
        assert_eq!(record.phone.as_deref(), Some("0170 123"));
        assert_eq!(record.location.as_deref(), Some("Berlin, Germany"));
        assert_eq!(record.display_name().as_deref(), Some("Bob Smith"));
        assert_eq!(record.label(), "crm:c-1");
    }
}
