//! Keyword lexicons for categorization and the purchase blacklist.

use serde::{Deserialize, Serialize};

use lineguard_core::text::contains_word;

/// Domain categories used for material/context consistency checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Office,
    Construction,
    Electrical,
    Plumbing,
    Hvac,
    Medical,
    Automotive,
    Catering,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Office,
        Category::Construction,
        Category::Electrical,
        Category::Plumbing,
        Category::Hvac,
        Category::Medical,
        Category::Automotive,
        Category::Catering,
    ];

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Category::Office => &[
                "paper", "printer", "toner", "stapler", "desk", "chair", "folder", "envelope",
                "whiteboard", "office",
            ],
            Category::Construction => &[
                "cement", "concrete", "rebar", "lumber", "drywall", "brick", "scaffold", "gravel",
                "plywood", "mortar",
            ],
            Category::Electrical => &[
                "wire", "cable", "breaker", "conduit", "voltage", "transformer", "socket", "fuse",
                "relay",
            ],
            Category::Plumbing => &[
                "pipe", "valve", "faucet", "drain", "fitting", "coupling", "gasket", "sewer",
            ],
            Category::Hvac => &[
                "hvac", "duct", "compressor", "refrigerant", "thermostat", "condenser",
                "ventilation",
            ],
            Category::Medical => &[
                "syringe", "bandage", "gauze", "scalpel", "defibrillator", "stethoscope",
            ],
            Category::Automotive => &[
                "tire", "brake", "engine", "alternator", "radiator", "clutch", "muffler",
            ],
            Category::Catering => &[
                "food", "coffee", "catering", "utensil", "napkin", "beverage", "snack",
            ],
        }
    }

    /// Categorize free text by keyword membership. A text can belong to
    /// several categories ("pipe fitting for hvac duct").
    pub fn categorize(text: &str) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| c.keywords().iter().any(|k| contains_word(text, k)))
            .collect()
    }
}

/// Category pairs considered strongly opposed; a mismatch between these is
/// more suspicious than a generic category mismatch.
const STRONG_OPPOSITES: &[(Category, Category)] = &[
    (Category::Office, Category::Construction),
    (Category::Office, Category::Automotive),
    (Category::Medical, Category::Construction),
    (Category::Medical, Category::Automotive),
    (Category::Catering, Category::Construction),
    (Category::Catering, Category::Electrical),
    (Category::Catering, Category::Plumbing),
];

/// Whether any pair across the two category sets is a strong opposite.
pub fn has_strong_opposition(a: &[Category], b: &[Category]) -> bool {
    a.iter().any(|ca| {
        b.iter().any(|cb| {
            STRONG_OPPOSITES.contains(&(*ca, *cb)) || STRONG_OPPOSITES.contains(&(*cb, *ca))
        })
    })
}

/// Terms that make a purchase non-allowable regardless of price.
///
/// "labor" is here because labor charges are service fees, not claimable
/// material expenses on this invoice type.
pub const BLACKLISTED_TERMS: &[&str] = &[
    "alcohol",
    "tobacco",
    "gambling",
    "weapon",
    "drug",
    "personal",
    "gift",
    "entertainment",
    "political",
    "religious",
    "labor",
];

/// First blacklisted term found in the text, if any.
pub fn blacklisted_term(text: &str) -> Option<&'static str> {
    BLACKLISTED_TERMS
        .iter()
        .find(|t| contains_word(text, t))
        .copied()
}

/// Construction-material keywords (maintenance visits should not be billing
/// structural material).
pub fn mentions_construction_material(text: &str) -> bool {
    Category::Construction
        .keywords()
        .iter()
        .any(|k| contains_word(text, k))
}

const INDUSTRIAL_KEYWORDS: &[&str] = &[
    "industrial",
    "forklift",
    "crane",
    "hydraulic",
    "jackhammer",
    "excavator",
];

/// Industrial-grade equipment keywords (out of place in an office context).
pub fn mentions_industrial_grade(text: &str) -> bool {
    INDUSTRIAL_KEYWORDS.iter().any(|k| contains_word(text, k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorization_matches_whole_words() {
        assert_eq!(
            Category::categorize("copper pipe 15mm"),
            vec![Category::Plumbing]
        );
        assert!(Category::categorize("miscellaneous supplies").is_empty());
    }

    #[test]
    fn multi_category_text() {
        let cats = Category::categorize("pipe fitting for hvac duct");
        assert!(cats.contains(&Category::Plumbing));
        assert!(cats.contains(&Category::Hvac));
    }

    #[test]
    fn strong_opposition_is_symmetric() {
        assert!(has_strong_opposition(
            &[Category::Construction],
            &[Category::Office]
        ));
        assert!(has_strong_opposition(
            &[Category::Office],
            &[Category::Construction]
        ));
        assert!(!has_strong_opposition(
            &[Category::Plumbing],
            &[Category::Hvac]
        ));
    }

    #[test]
    fn blacklist_detects_labor_and_gifts() {
        assert_eq!(blacklisted_term("technician labor"), Some("labor"));
        assert_eq!(blacklisted_term("client gift basket"), Some("gift"));
        assert_eq!(blacklisted_term("copper pipe"), None);
    }
}
