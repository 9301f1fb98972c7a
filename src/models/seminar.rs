use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Séminaire : enregistrement plat sous `resources/seminar/{pushKey}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seminar {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub seminar_type: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(rename = "spots", default)]
    pub spot_count: u32,
    #[serde(rename = "link", default)]
    pub registration_link: String,
}

/// Statut dérivé, jamais stocké
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeminarStatus {
    Past,
    Ongoing,
    Upcoming,
}

impl Seminar {
    /// Comparaison au jour près, l'heure est ignorée
    pub fn status_on(&self, today: NaiveDate) -> SeminarStatus {
        match self.date.cmp(&today) {
            std::cmp::Ordering::Less => SeminarStatus::Past,
            std::cmp::Ordering::Equal => SeminarStatus::Ongoing,
            std::cmp::Ordering::Greater => SeminarStatus::Upcoming,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeminarView {
    #[serde(flatten)]
    pub seminar: Seminar,
    pub status: SeminarStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSeminar {
    #[validate(length(min = 1, max = 80, message = "Seminar type is required"))]
    #[serde(rename = "type")]
    pub seminar_type: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub spot_count: u32,
    #[serde(default)]
    pub registration_link: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn seminar_on(date: NaiveDate) -> Seminar {
        Seminar {
            id: "-S1".into(),
            seminar_type: "Conférence".into(),
            description: String::new(),
            date,
            time: "14:00".into(),
            location: "Amphi A".into(),
            spot_count: 40,
            registration_link: String::new(),
        }
    }

    #[test]
    fn test_status_is_derived_at_day_granularity() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

        assert_eq!(seminar_on(today).status_on(today), SeminarStatus::Ongoing);
        assert_eq!(seminar_on(today - Duration::days(1)).status_on(today), SeminarStatus::Past);
        assert_eq!(seminar_on(today + Duration::days(1)).status_on(today), SeminarStatus::Upcoming);
    }

    #[test]
    fn test_stored_field_names() {
        let seminar: Seminar = serde_json::from_value(json!({
            "id": "-S1",
            "type": "Atelier",
            "date": "2026-03-02",
            "spots": 25,
            "link": "https://forms.example/x"
        }))
        .unwrap();

        assert_eq!(seminar.seminar_type, "Atelier");
        assert_eq!(seminar.spot_count, 25);
        assert_eq!(seminar.registration_link, "https://forms.example/x");
        assert_eq!(seminar.time, "");
    }
}
