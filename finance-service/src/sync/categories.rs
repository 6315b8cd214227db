//! Mapping from aggregator category labels to personal categories.

use crate::models::FALLBACK_CATEGORY;

/// Primary aggregator label to personal category. Unlisted labels pass through.
const CATEGORY_MAPPING: &[(&str, &str)] = &[
    ("Food and Drink", "Food & Dining"),
    ("Shops", "Shopping"),
    ("Recreation", "Entertainment"),
    ("Transportation", "Transportation"),
    ("Healthcare", "Healthcare"),
    ("Financial", "Financial"),
    ("Travel", "Travel"),
    ("Deposit", "Income"),
    ("Transfer", "Transfer"),
    ("Payment", "Bills & Utilities"),
    ("Service", "Services"),
];

/// Canonical category for an ordered list of raw labels. Only the first
/// label is considered; an empty list or a blank first label yields
/// [`FALLBACK_CATEGORY`].
pub fn normalize_category(labels: &[String]) -> String {
    let Some(primary) = labels.first().map(|l| l.trim()).filter(|l| !l.is_empty()) else {
        return FALLBACK_CATEGORY.to_string();
    };
    CATEGORY_MAPPING
        .iter()
        .find(|(raw, _)| *raw == primary)
        .map(|(_, mapped)| (*mapped).to_string())
        .unwrap_or_else(|| primary.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_labels_fall_back() {
        assert_eq!(normalize_category(&[]), "Other");
    }

    #[test]
    fn first_label_is_mapped() {
        assert_eq!(normalize_category(&labels(&["Shops", "x"])), "Shopping");
        assert_eq!(normalize_category(&labels(&["Payment", "Credit Card"])), "Bills & Utilities");
        assert_eq!(normalize_category(&labels(&["Travel", "Shops"])), "Travel");
    }

    #[test]
    fn unknown_label_passes_through() {
        assert_eq!(normalize_category(&labels(&["Weird"])), "Weird");
    }

    #[test]
    fn blank_first_label_falls_back() {
        assert_eq!(normalize_category(&labels(&[""])), "Other");
        assert_eq!(normalize_category(&labels(&["  "])), "Other");
        assert_eq!(normalize_category(&labels(&["", "Coffee"])), "Other");
    }

    #[test]
    fn output_is_never_empty() {
        for (raw, _) in CATEGORY_MAPPING {
            assert!(!normalize_category(&labels(&[raw])).is_empty());
        }
        for raw in [&[][..], &[""][..], &["  "][..], &["\t", "Shops"][..], &[" Weird "][..]] {
            assert!(!normalize_category(&labels(raw)).is_empty(), "{:?}", raw);
        }
    }
}
