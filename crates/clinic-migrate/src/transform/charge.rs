use std::collections::HashSet;

use tracing::debug;

use super::normalize::{clean_whitespace, money, timestamp_or};
use super::{is_active_status, TransformContext};
use crate::dump::LegacyCharge;
use crate::model::{ServiceCategory, ServiceItem};

/// Case-insensitive substring rules, first match wins.
const CATEGORY_RULES: &[(&str, ServiceCategory)] = &[
    ("pathology", ServiceCategory::Laboratory),
    ("lab", ServiceCategory::Laboratory),
    ("radiology", ServiceCategory::Radiology),
    ("x-ray", ServiceCategory::Radiology),
    ("xray", ServiceCategory::Radiology),
    ("procedure", ServiceCategory::Procedure),
];

pub fn classify_category(raw: Option<&str>) -> ServiceCategory {
    let Some(raw) = raw else {
        return ServiceCategory::Other;
    };
    let lower = raw.to_ascii_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, category)| *category)
        .unwrap_or(ServiceCategory::Other)
}

/// Charge to service item. A charge without a name has nothing to bill and
/// yields `None`.
pub fn transform_charge(row: &LegacyCharge, ctx: &TransformContext) -> Option<ServiceItem> {
    let name = row.name.as_deref().map(clean_whitespace).filter(|n| !n.is_empty())?;
    let created_at = timestamp_or(row.created_at.as_deref(), ctx.migrated_at);
    Some(ServiceItem {
        legacy_id: row.id,
        name,
        category: classify_category(row.category.as_deref()),
        price: money(row.amount),
        is_active: is_active_status(row.status.as_deref()),
        created_at,
        updated_at: created_at,
    })
}

/// Keep the first item per (lowercased name, category).
///
/// Returns the surviving items and the number of duplicates dropped.
pub fn dedupe_service_items(items: Vec<ServiceItem>) -> (Vec<ServiceItem>, usize) {
    let mut seen = HashSet::new();
    let total = items.len();
    let kept: Vec<ServiceItem> = items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert((item.name.to_lowercase(), item.category));
            if !fresh {
                debug!(legacy_id = item.legacy_id, name = %item.name, "Dropping duplicate service item");
            }
            fresh
        })
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_context;

    fn charge(id: i64, name: &str, category: &str) -> LegacyCharge {
        LegacyCharge {
            id,
            name: Some(name.into()),
            category: Some(category.into()),
            amount: Some(250.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_category() {
        assert_eq!(classify_category(Some("Pathology")), ServiceCategory::Laboratory);
        assert_eq!(classify_category(Some("LAB TEST")), ServiceCategory::Laboratory);
        assert_eq!(classify_category(Some("Digital X-Ray")), ServiceCategory::Radiology);
        assert_eq!(classify_category(Some("xray")), ServiceCategory::Radiology);
        assert_eq!(classify_category(Some("Minor procedure")), ServiceCategory::Procedure);
        assert_eq!(classify_category(Some("Consultation")), ServiceCategory::Other);
        assert_eq!(classify_category(None), ServiceCategory::Other);
    }

    #[test]
    fn test_transform_charge() {
        let ctx = test_context();
        let item = transform_charge(&charge(4, "  CBC   Test ", "lab"), &ctx).unwrap();
        assert_eq!(item.legacy_id, 4);
        assert_eq!(item.name, "CBC Test");
        assert_eq!(item.category, ServiceCategory::Laboratory);
        assert_eq!(item.price, 250.0);
        assert!(item.is_active);

        let nameless = LegacyCharge {
            id: 5,
            ..Default::default()
        };
        assert!(transform_charge(&nameless, &ctx).is_none());
    }

    #[test]
    fn test_dedupe_is_case_insensitive() {
        let ctx = test_context();
        let items = vec![
            transform_charge(&charge(1, "CBC", "Pathology"), &ctx).unwrap(),
            transform_charge(&charge(2, "cbc", "lab"), &ctx).unwrap(),
            transform_charge(&charge(3, "CBC", "X-Ray"), &ctx).unwrap(),
        ];
        let (kept, dropped) = dedupe_service_items(items);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].legacy_id, 1);
        assert_eq!(kept[1].category, ServiceCategory::Radiology);
    }
}
