//! Built-in category catalog for association-seeded batches.

use std::collections::BTreeMap;

/// Industries and the categories worth associating within each.
pub const CATEGORY_CATALOG: &[(&str, &[&str])] = &[
    (
        "power_equipment",
        &[
            "transformer",
            "circuit breaker",
            "disconnect switch",
            "current transformer",
            "voltage transformer",
            "surge arrester",
            "capacitor bank",
            "reactor",
            "busbar",
            "insulator",
            "distribution box",
            "switchgear",
            "power cable",
            "utility pole",
            "transmission tower",
        ],
    ),
    (
        "manufacturing",
        &[
            "cnc machine",
            "industrial robot",
            "conveyor belt",
            "press machine",
            "injection molding machine",
            "welding equipment",
            "cutting machine",
            "grinding machine",
            "lathe",
            "milling machine",
            "3d printer",
            "laser cutter",
            "inspection instrument",
            "packaging machine",
            "palletizer",
        ],
    ),
    (
        "furniture",
        &[
            "chair",
            "table",
            "sofa",
            "bed",
            "cabinet",
            "bookshelf",
            "coffee table",
            "dining table",
            "wardrobe",
            "shoe cabinet",
            "office desk",
            "conference table",
            "bar counter",
            "dressing table",
            "tv stand",
        ],
    ),
    (
        "vehicles",
        &[
            "car",
            "truck",
            "bus",
            "motorcycle",
            "bicycle",
            "train",
            "subway car",
            "airplane",
            "helicopter",
            "ship",
            "forklift",
            "excavator",
            "crane",
            "tractor",
            "electric scooter",
        ],
    ),
    (
        "buildings",
        &[
            "house",
            "office building",
            "factory",
            "warehouse",
            "stadium",
            "bridge",
            "tunnel",
            "water tower",
            "chimney",
            "signal tower",
            "parking garage",
            "gas station",
            "substation",
            "water treatment plant",
            "power plant",
        ],
    ),
    (
        "electronics",
        &[
            "phone",
            "computer",
            "tablet",
            "monitor",
            "keyboard",
            "router",
            "server",
            "server rack",
            "sensor",
            "camera",
            "speaker",
            "headphones",
            "television",
            "projector",
            "printer",
        ],
    ),
    (
        "medical",
        &[
            "ct scanner",
            "mri scanner",
            "x-ray machine",
            "ultrasound scanner",
            "ecg machine",
            "operating table",
            "hospital bed",
            "wheelchair",
            "ventilator",
            "patient monitor",
            "syringe pump",
            "iv stand",
            "sterilizer cabinet",
            "medicine cabinet",
            "crash cart",
        ],
    ),
    (
        "kitchen",
        &[
            "refrigerator",
            "oven",
            "microwave",
            "dishwasher",
            "range hood",
            "gas stove",
            "rice cooker",
            "coffee machine",
            "juicer",
            "blender",
            "utensil rack",
            "vegetable cutter",
            "steam oven",
            "food warmer",
            "ice maker",
        ],
    ),
];

/// Catalog entries, optionally restricted to one industry.
///
/// An unknown industry yields that industry with no categories.
pub fn categories(industry: Option<&str>) -> BTreeMap<String, Vec<String>> {
    let owned = |list: &[&str]| list.iter().map(|c| c.to_string()).collect::<Vec<_>>();

    match industry {
        Some(industry) => {
            let list = CATEGORY_CATALOG
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(industry))
                .map(|(_, list)| owned(list))
                .unwrap_or_default();
            BTreeMap::from([(industry.to_string(), list)])
        }
        None => CATEGORY_CATALOG
            .iter()
            .map(|(name, list)| (name.to_string(), owned(list)))
            .collect(),
    }
}

/// Categories matching `keyword`, sorted and without duplicates.
///
/// A keyword matching an industry name returns all of its categories.
/// Matching is case-insensitive substring search.
pub fn search_categories(keyword: &str) -> Vec<String> {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return Vec::new();
    }

    let needle = keyword.as_str();
    let mut results: Vec<String> = CATEGORY_CATALOG
        .iter()
        .flat_map(|(industry, list)| {
            let whole = industry.contains(needle);
            list.iter()
                .filter(move |c| whole || c.contains(needle))
                .map(|c| c.to_string())
        })
        .collect();
    results.sort();
    results.dedup();
    results
}
