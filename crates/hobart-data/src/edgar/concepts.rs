//! XBRL concepts the feature sets are built from.

use crate::types::Concept;

/// US-GAAP taxonomy name.
pub const US_GAAP: &str = "us-gaap";

/// Current assets
pub const ASSETS_CURRENT: Concept = usd("AssetsCurrent");
/// Basic earnings per share
pub const EARNINGS_PER_SHARE_BASIC: Concept = Concept {
    tag: "EarningsPerShareBasic",
    taxonomy: US_GAAP,
    unit: "USD/shares",
};
/// Net inventory
pub const INVENTORY_NET: Concept = usd("InventoryNet");
/// Current liabilities
pub const LIABILITIES_CURRENT: Concept = usd("LiabilitiesCurrent");
/// Net income (loss)
pub const NET_INCOME_LOSS: Concept = usd("NetIncomeLoss");
/// Operating income (loss)
pub const OPERATING_INCOME_LOSS: Concept = usd("OperatingIncomeLoss");
/// Stockholders' equity
pub const STOCKHOLDERS_EQUITY: Concept = usd("StockholdersEquity");

/// Concepts with high availability across SEC filers.
pub static POPULAR: [Concept; 7] = [
    ASSETS_CURRENT,
    EARNINGS_PER_SHARE_BASIC,
    INVENTORY_NET,
    LIABILITIES_CURRENT,
    NET_INCOME_LOSS,
    OPERATING_INCOME_LOSS,
    STOCKHOLDERS_EQUITY,
];

const fn usd(tag: &'static str) -> Concept {
    Concept {
        tag,
        taxonomy: US_GAAP,
        unit: "USD",
    }
}

/// Look up a popular concept by tag.
pub fn by_tag(tag: &str) -> Option<&'static Concept> {
    POPULAR.iter().find(|c| c.tag == tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popular_concepts() {
        assert_eq!(POPULAR.len(), 7);
        assert!(POPULAR.iter().all(|c| c.taxonomy == US_GAAP));
        assert_eq!(by_tag("EarningsPerShareBasic").unwrap().unit, "USD/shares");
        assert_eq!(by_tag("InventoryNet").unwrap().unit, "USD");
        assert!(by_tag("Revenues").is_none());
    }
}
