//! The ten U.S. Department of Health and Human Services regions.

use crate::panel::types::RegionId;

/// Number of HHS regions; identifiers run from 1 through this value.
pub const NUM_REGIONS: RegionId = 10;

/// Postal codes of the states and territories in each HHS region.
pub const HHS_REGIONS: [(RegionId, &[&str]); 10] = [
    (1, &["CT", "ME", "MA", "NH", "RI", "VT"]),
    (2, &["NJ", "NY", "PR", "VI"]),
    (3, &["DE", "DC", "MD", "PA", "VA", "WV"]),
    (4, &["AL", "FL", "GA", "KY", "MS", "NC", "SC", "TN"]),
    (5, &["IL", "IN", "MI", "MN", "OH", "WI"]),
    (6, &["AR", "LA", "NM", "OK", "TX"]),
    (7, &["IA", "KS", "MO", "NE"]),
    (8, &["CO", "MT", "ND", "SD", "UT", "WY"]),
    (9, &["AZ", "CA", "HI", "NV", "AS", "GU", "MP"]),
    (10, &["AK", "ID", "OR", "WA"]),
];

/// Canonical postal code: trimmed, upper-cased, with a Google Trends `US-` prefix removed.
pub fn normalize_state(code: &str) -> String {
    let code = code.trim().to_ascii_uppercase();
    match code.strip_prefix("US-") {
        Some(rest) => rest.to_string(),
        None => code,
    }
}

/// The HHS region containing the state or territory `code` (`"TX"`, `"us-tx"`).
pub fn region_for_state(code: &str) -> Option<RegionId> {
    let code = normalize_state(code);
    HHS_REGIONS
        .iter()
        .find(|(_, states)| states.contains(&code.as_str()))
        .map(|(region, _)| *region)
}

/// Parses a region label as written by surveillance feeds and spreadsheets:
/// `"hhs3"`, `"HHS 3"`, `"Region 3"`, `"3"`, or `"3.0"`.
pub fn parse_region_label(label: &str) -> Option<RegionId> {
    let lower = label.trim().to_ascii_lowercase();
    let digits = lower
        .strip_prefix("hhs")
        .or_else(|| lower.strip_prefix("region"))
        .unwrap_or(&lower)
        .trim();

    let region = match digits.parse::<RegionId>() {
        Ok(region) => region,
        Err(_) => {
            let value = digits.parse::<f64>().ok()?;
            if value.fract() != 0.0 || value < 0.0 {
                return None;
            }
            value as RegionId
        }
    };
    (1..=NUM_REGIONS).contains(&region).then_some(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_state_maps_to_exactly_one_region() {
        let mut seen = std::collections::HashSet::new();
        for (region, states) in HHS_REGIONS {
            for state in states {
                assert!(seen.insert(*state), "{state} listed twice");
                assert_eq!(region_for_state(state), Some(region));
            }
        }
        assert!(seen.len() >= 51);
    }

    #[test]
    fn state_codes_are_normalised() {
        assert_eq!(region_for_state(" tx "), Some(6));
        assert_eq!(region_for_state("US-WA"), Some(10));
        assert_eq!(region_for_state("XX"), None);
        assert_eq!(region_for_state("ne"), Some(7));
    }

    #[test]
    fn region_labels_parse_in_every_common_spelling() {
        assert_eq!(parse_region_label("hhs3"), Some(3));
        assert_eq!(parse_region_label("HHS 10"), Some(10));
        assert_eq!(parse_region_label("Region 4"), Some(4));
        assert_eq!(parse_region_label("7"), Some(7));
        assert_eq!(parse_region_label("2.0"), Some(2));
        assert_eq!(parse_region_label("2.5"), None);
        assert_eq!(parse_region_label("0"), None);
        assert_eq!(parse_region_label("11"), None);
        assert_eq!(parse_region_label("national"), None);
    }
}
