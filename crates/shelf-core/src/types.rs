//! # Domain Types
//!
//! Plain data for the two catalogs and for the identity map between them.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Domain Types                                  │
//! │                                                                         │
//! │  POS catalog (offset paged)         Storefront catalog (cursor paged)  │
//! │  ──────────────────────────         ─────────────────────────────────  │
//! │  PosGroup ◄── parent                StorefrontProduct                  │
//! │     ▲                                  │                                │
//! │     │ group_id                         └── StorefrontVariant (barcode) │
//! │  PosProduct (barcode) ◄── base_id                                       │
//! │                                                                         │
//! │                    ┌──────── barcode ────────┐                          │
//! │                    ▼                         ▼                          │
//! │  Identity store:  IdentityRecord 1 ──── * VariantLink                  │
//! │                   (external_id, tags)     (barcode UNIQUE, deleted)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{normalize_barcode, sanitize_tag};

// =============================================================================
// POS Catalog
// =============================================================================

/// Kind of a POS product group, decoded from its numeric type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Plain category; forms the browsable tree.
    Standard,
    /// Group whose products are the variations of one sellable item.
    VariationHolder,
    /// Any other type id. Excluded from the catalog tree.
    Other(i64),
}

impl GroupKind {
    /// Type id the POS uses for standard categories.
    pub const STANDARD_TYPE_ID: i64 = 7;

    /// Type id the POS uses for variation-holder groups.
    pub const VARIATION_HOLDER_TYPE_ID: i64 = 3;

    /// Decodes the POS type id. A missing id counts as "other".
    pub fn from_type_id(type_id: Option<i64>) -> Self {
        match type_id {
            Some(Self::STANDARD_TYPE_ID) => GroupKind::Standard,
            Some(Self::VARIATION_HOLDER_TYPE_ID) => GroupKind::VariationHolder,
            Some(other) => GroupKind::Other(other),
            None => GroupKind::Other(0),
        }
    }

    /// Encodes back into the POS type id.
    pub fn type_id(&self) -> i64 {
        match self {
            GroupKind::Standard => Self::STANDARD_TYPE_ID,
            GroupKind::VariationHolder => Self::VARIATION_HOLDER_TYPE_ID,
            GroupKind::Other(id) => *id,
        }
    }
}

/// A POS product group.
///
/// `id` is `None` until the group has been created remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosGroup {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    /// Parent group; `None` for roots.
    pub parent: Option<i64>,
    pub kind: GroupKind,
}

impl PosGroup {
    /// Creates an unsaved group.
    pub fn new(name: impl Into<String>, parent: Option<i64>, kind: GroupKind) -> Self {
        PosGroup {
            id: None,
            name: name.into(),
            description: None,
            parent,
            kind,
        }
    }

    /// Creates a group as it would come back from a listing.
    pub fn with_id(id: i64, name: impl Into<String>, parent: Option<i64>, kind: GroupKind) -> Self {
        PosGroup {
            id: Some(id),
            ..Self::new(name, parent, kind)
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// One row of the POS product listing.
///
/// Variation rows carry the id of their base product in `base_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosProduct {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub item_number: Option<String>,
    pub barcode: Option<String>,
    /// Decimal price exactly as the POS reports it.
    pub price: String,
    pub group_id: Option<i64>,
    pub base_id: Option<i64>,
}

impl PosProduct {
    /// Creates an unsaved product in the given group.
    pub fn new(name: impl Into<String>, group_id: i64) -> Self {
        PosProduct {
            id: None,
            name: name.into(),
            description: None,
            item_number: None,
            barcode: None,
            price: "0.00".to_string(),
            group_id: Some(group_id),
            base_id: None,
        }
    }

    /// Creates a product as it would come back from a listing.
    pub fn with_id(id: i64, name: impl Into<String>, group_id: i64) -> Self {
        PosProduct {
            id: Some(id),
            ..Self::new(name, group_id)
        }
    }

    /// Sets the barcode.
    pub fn barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    /// Marks this row as a variation of `base_id`.
    pub fn variation_of(mut self, base_id: i64) -> Self {
        self.base_id = Some(base_id);
        self
    }

    pub fn is_variation(&self) -> bool {
        self.base_id.is_some()
    }

    /// Barcode after normalisation; blank barcodes count as absent.
    pub fn normalized_barcode(&self) -> Option<String> {
        normalize_barcode(self.barcode.as_deref())
    }
}

/// A root product row joined with the variation rows that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosProductWithVariations {
    pub product: PosProduct,
    pub variations: Vec<PosProduct>,
}

impl PosProductWithVariations {
    pub fn new(product: PosProduct, variations: Vec<PosProduct>) -> Self {
        PosProductWithVariations { product, variations }
    }

    /// A product without variation rows.
    pub fn single(product: PosProduct) -> Self {
        Self::new(product, Vec::new())
    }
}

// =============================================================================
// Storefront Catalog
// =============================================================================

/// A storefront product with its variants, as assembled by the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorefrontProduct {
    /// Opaque storefront id; `None` until created remotely.
    pub id: Option<String>,
    pub title: String,
    pub vendor: String,
    pub product_type: String,
    pub tags: Vec<String>,
    pub variants: Vec<StorefrontVariant>,
    /// Set when the storefront had more variants than one page could hold
    /// and the overflow policy asked to keep the product anyway.
    #[serde(default)]
    pub variants_truncated: bool,
}

impl StorefrontProduct {
    /// Creates an unsaved product without variants.
    pub fn new(
        title: impl Into<String>,
        vendor: impl Into<String>,
        product_type: impl Into<String>,
    ) -> Self {
        StorefrontProduct {
            id: None,
            title: title.into(),
            vendor: vendor.into(),
            product_type: product_type.into(),
            tags: Vec::new(),
            variants: Vec::new(),
            variants_truncated: false,
        }
    }

    /// Sets the storefront id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Adds a variant.
    pub fn variant(mut self, variant: StorefrontVariant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Normalised barcodes of all variants, in variant order.
    pub fn barcodes(&self) -> Vec<String> {
        self.variants
            .iter()
            .filter_map(StorefrontVariant::normalized_barcode)
            .collect()
    }

    /// Tags to record on a new identity aggregate.
    ///
    /// Vendor and product type are stored as tags by the storefront too;
    /// they are dropped here, the rest is sanitised and de-duplicated.
    pub fn identity_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in &self.tags {
            if tag == &self.vendor || tag == &self.product_type {
                continue;
            }
            let clean = sanitize_tag(tag);
            if !clean.is_empty() && !tags.contains(&clean) {
                tags.push(clean);
            }
        }
        tags
    }
}

/// One storefront variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorefrontVariant {
    pub id: Option<String>,
    pub title: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price: String,
}

impl StorefrontVariant {
    pub fn new(title: impl Into<String>, barcode: Option<&str>) -> Self {
        StorefrontVariant {
            id: None,
            title: title.into(),
            sku: None,
            barcode: barcode.map(str::to_string),
            price: "0.00".to_string(),
        }
    }

    pub fn normalized_barcode(&self) -> Option<String> {
        normalize_barcode(self.barcode.as_deref())
    }
}

// =============================================================================
// Identity Store Records
// =============================================================================

/// The durable aggregate for one storefront product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct IdentityRecord {
    pub id: String,
    /// Storefront id; `None` until first linked.
    pub external_id: Option<String>,
    /// Tags copied from the storefront product when the aggregate was created.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A barcode-keyed pointer from one variant to its owning aggregate.
///
/// `owner_id` is set at construction and never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct VariantLink {
    pub id: String,
    pub owner_id: String,
    pub barcode: String,
    pub deleted: bool,
    /// Set once the barcode has appeared on the owner's storefront product.
    /// Links created from a POS variation start out `false`.
    pub on_storefront: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_kind_from_type_id() {
        assert_eq!(GroupKind::from_type_id(Some(7)), GroupKind::Standard);
        assert_eq!(GroupKind::from_type_id(Some(3)), GroupKind::VariationHolder);
        assert_eq!(GroupKind::from_type_id(Some(12)), GroupKind::Other(12));
        assert_eq!(GroupKind::from_type_id(None), GroupKind::Other(0));
        assert_eq!(GroupKind::VariationHolder.type_id(), 3);
    }

    #[test]
    fn test_identity_tags_drop_vendor_and_type() {
        let product = StorefrontProduct::new("Merino", "Acme Yarns", "Yarn")
            .tag("Acme Yarns")
            .tag("Yarn")
            .tag("wool")
            .tag("wool")
            .tag("soft & warm");

        assert_eq!(product.identity_tags(), vec!["wool", "soft  warm"]);
    }

    #[test]
    fn test_storefront_barcodes_skip_blank() {
        let product = StorefrontProduct::new("Merino", "Acme", "Yarn")
            .variant(StorefrontVariant::new("Red", Some(" B1 ")))
            .variant(StorefrontVariant::new("Blue", Some("")))
            .variant(StorefrontVariant::new("Green", None));

        assert_eq!(product.barcodes(), vec!["B1"]);
    }

    #[test]
    fn test_product_builders() {
        let variation = PosProduct::with_id(11, "Merino Red", 1)
            .barcode("B1")
            .variation_of(10);

        assert!(variation.is_variation());
        assert_eq!(variation.normalized_barcode().as_deref(), Some("B1"));
        assert!(PosGroup::new("Yarn", None, GroupKind::Standard).is_root());
    }

    #[test]
    fn test_storefront_product_serializes() {
        let product = StorefrontProduct::new("Merino", "Acme", "Yarn").id("S1");
        let json = serde_json::to_string(&product).unwrap();
        assert!(json.contains("\"variants_truncated\":false"));
    }
}
