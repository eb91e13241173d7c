//! # Catalog Tree
//!
//! The POS catalog as a forest of categories holding sellable items.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CatalogTree                                    │
//! │                                                                         │
//! │  CatalogGroup "Yarn"            (standard group, parent = none)        │
//! │  ├── CatalogGroup "Yarn/Wool"   (standard group)                       │
//! │  │   ├── GroupedItem "Merino"   (variation-holder group → variations)  │
//! │  │   └── SingleItem  "Needles"  (plain product row)                    │
//! │  └── GroupedItem "Cotton"       (base product + rows with base_id)     │
//! │                                                                         │
//! │  Every node answers the same questions through CatalogNode:            │
//! │  node_id · name · variation_count · barcodes · sync_problems ·          │
//! │  is_sync_eligible                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Node Ids
//! | Node                                | Id              |
//! |-------------------------------------|-----------------|
//! | [`CatalogGroup`]                    | `category:{id}` |
//! | [`GroupedItem`] from a holder group | `group:{id}`    |
//! | [`GroupedItem`] from a base product | `product:{id}`  |
//! | [`SingleItem`]                      | `product:{id}`  |

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::types::{GroupKind, PosGroup, PosProduct, PosProductWithVariations};
use crate::validation::{check_barcodes, SyncProblem};
use crate::PATH_SEPARATOR;

// =============================================================================
// CatalogNode
// =============================================================================

/// Behaviour shared by every node of the catalog tree.
pub trait CatalogNode {
    /// Stable id, unique across node kinds.
    fn node_id(&self) -> String;

    fn name(&self) -> &str;

    /// Number of variations; 0 for items that only have the default one.
    fn variation_count(&self) -> usize;

    /// Normalised barcodes of this node and everything beneath it.
    fn barcodes(&self) -> Vec<String>;

    fn sync_problems(&self) -> Vec<SyncProblem> {
        check_barcodes(&self.barcodes(), self.variation_count())
    }

    fn is_sync_eligible(&self) -> bool {
        !self.sync_problems().iter().any(SyncProblem::is_error)
    }
}

// =============================================================================
// Items
// =============================================================================

/// A product row with no variations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingleItem {
    pub id: i64,
    pub product: PosProduct,
}

impl CatalogNode for SingleItem {
    fn node_id(&self) -> String {
        format!("product:{}", self.id)
    }

    fn name(&self) -> &str {
        &self.product.name
    }

    fn variation_count(&self) -> usize {
        0
    }

    fn barcodes(&self) -> Vec<String> {
        self.product.normalized_barcode().into_iter().collect()
    }
}

/// Where a grouped item's variations come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupedOrigin {
    /// A variation-holder group; its products are the variations.
    VariationGroup(i64),
    /// A base product; rows referencing it by base id are the variations.
    BaseProduct(i64),
}

/// A sellable item made of several variations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedItem {
    pub origin: GroupedOrigin,
    pub name: String,
    pub variations: Vec<PosProduct>,
}

impl CatalogNode for GroupedItem {
    fn node_id(&self) -> String {
        match self.origin {
            GroupedOrigin::VariationGroup(id) => format!("group:{}", id),
            GroupedOrigin::BaseProduct(id) => format!("product:{}", id),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn variation_count(&self) -> usize {
        self.variations.len()
    }

    fn barcodes(&self) -> Vec<String> {
        self.variations
            .iter()
            .filter_map(PosProduct::normalized_barcode)
            .collect()
    }
}

/// The two item shapes of the POS catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum CatalogItem {
    Single(SingleItem),
    Grouped(GroupedItem),
}

impl CatalogItem {
    /// All sellable rows of this item.
    pub fn variations(&self) -> Vec<&PosProduct> {
        match self {
            CatalogItem::Single(item) => vec![&item.product],
            CatalogItem::Grouped(item) => item.variations.iter().collect(),
        }
    }

    pub fn find_variation_by_barcode(&self, barcode: &str) -> Option<&PosProduct> {
        self.variations()
            .into_iter()
            .find(|row| row.normalized_barcode().as_deref() == Some(barcode))
    }

    pub fn has_barcode(&self, barcode: &str) -> bool {
        self.find_variation_by_barcode(barcode).is_some()
    }
}

impl CatalogNode for CatalogItem {
    fn node_id(&self) -> String {
        match self {
            CatalogItem::Single(item) => item.node_id(),
            CatalogItem::Grouped(item) => item.node_id(),
        }
    }

    fn name(&self) -> &str {
        match self {
            CatalogItem::Single(item) => item.name(),
            CatalogItem::Grouped(item) => item.name(),
        }
    }

    fn variation_count(&self) -> usize {
        match self {
            CatalogItem::Single(item) => item.variation_count(),
            CatalogItem::Grouped(item) => item.variation_count(),
        }
    }

    fn barcodes(&self) -> Vec<String> {
        match self {
            CatalogItem::Single(item) => item.barcodes(),
            CatalogItem::Grouped(item) => item.barcodes(),
        }
    }
}

// =============================================================================
// Groups
// =============================================================================

/// A standard POS category with its sub-categories and items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogGroup {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Slash-joined names from the root down to this group.
    pub path: String,
    pub children: Vec<CatalogGroup>,
    pub items: Vec<CatalogItem>,
}

impl CatalogGroup {
    fn find_group(&self, id: i64) -> Option<&CatalogGroup> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_group(id))
    }

    fn collect_items<'a>(&'a self, out: &mut Vec<&'a CatalogItem>) {
        out.extend(self.items.iter());
        for child in &self.children {
            child.collect_items(out);
        }
    }

    fn collect_groups<'a>(&'a self, out: &mut Vec<&'a CatalogGroup>) {
        out.push(self);
        for child in &self.children {
            child.collect_groups(out);
        }
    }

    /// Pushes the chain of groups holding `node_id`, innermost first.
    fn collect_containing<'a>(&'a self, node_id: &str, out: &mut Vec<&'a CatalogGroup>) -> bool {
        let mut found = false;
        for child in &self.children {
            found |= child.collect_containing(node_id, out);
        }
        if found || self.items.iter().any(|item| item.node_id() == node_id) {
            out.push(self);
            return true;
        }
        false
    }
}

impl CatalogNode for CatalogGroup {
    fn node_id(&self) -> String {
        format!("category:{}", self.id)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn variation_count(&self) -> usize {
        0
    }

    fn barcodes(&self) -> Vec<String> {
        let mut items = Vec::new();
        self.collect_items(&mut items);
        items.into_iter().flat_map(|item| item.barcodes()).collect()
    }

    /// Groups are not synced themselves.
    fn sync_problems(&self) -> Vec<SyncProblem> {
        Vec::new()
    }

    /// A group is eligible when anything beneath it is.
    fn is_sync_eligible(&self) -> bool {
        self.items.iter().any(CatalogNode::is_sync_eligible)
            || self.children.iter().any(CatalogNode::is_sync_eligible)
    }
}

// =============================================================================
// Tree
// =============================================================================

/// The POS catalog as a forest rooted at parentless standard groups.
///
/// Groups of any other kind, groups whose parent chain does not reach a root
/// and products outside the tree are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogTree {
    roots: Vec<CatalogGroup>,
}

impl CatalogTree {
    /// Builds the tree from listed groups and joined products.
    ///
    /// ## Errors
    /// [`CoreError::MissingId`] when a group or product has no id.
    pub fn build(groups: Vec<PosGroup>, products: Vec<PosProductWithVariations>) -> CoreResult<Self> {
        let groups = groups
            .into_iter()
            .map(|group| match group.id {
                Some(id) => Ok((id, group)),
                None => Err(CoreError::MissingId {
                    entity: "group",
                    name: group.name,
                }),
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let mut by_group: HashMap<i64, Vec<(i64, PosProductWithVariations)>> = HashMap::new();
        for entry in products {
            let Some(id) = entry.product.id else {
                return Err(CoreError::MissingId {
                    entity: "product",
                    name: entry.product.name,
                });
            };
            if let Some(group_id) = entry.product.group_id {
                by_group.entry(group_id).or_default().push((id, entry));
            }
        }

        let builder = TreeBuilder { groups: &groups, by_group: &by_group };
        let roots = groups
            .iter()
            .filter(|(_, group)| group.is_root() && group.kind == GroupKind::Standard)
            .map(|(id, group)| builder.category(*id, group, None))
            .collect();

        Ok(CatalogTree { roots })
    }

    pub fn root_groups(&self) -> &[CatalogGroup] {
        &self.roots
    }

    pub fn group(&self, id: i64) -> Option<&CatalogGroup> {
        self.roots.iter().find_map(|root| root.find_group(id))
    }

    /// Direct sub-categories; empty for unknown groups.
    pub fn children_of(&self, group_id: i64) -> &[CatalogGroup] {
        self.group(group_id)
            .map(|group| group.children.as_slice())
            .unwrap_or_default()
    }

    /// Items directly inside a group; empty for unknown groups.
    pub fn items_of(&self, group_id: i64) -> &[CatalogItem] {
        self.group(group_id)
            .map(|group| group.items.as_slice())
            .unwrap_or_default()
    }

    /// Looks a group up by its slash-joined path, e.g. `"Yarn/Wool"`.
    pub fn by_path(&self, path: &str) -> Option<&CatalogGroup> {
        let mut segments = path
            .split(PATH_SEPARATOR)
            .map(str::trim)
            .filter(|segment| !segment.is_empty());

        let first = segments.next()?;
        let mut current = self.roots.iter().find(|group| group.name == first)?;
        for segment in segments {
            current = current.children.iter().find(|group| group.name == segment)?;
        }
        Some(current)
    }

    pub fn all_groups(&self) -> Vec<&CatalogGroup> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.collect_groups(&mut out);
        }
        out
    }

    /// Every item of the tree, depth first.
    pub fn all_items(&self) -> Vec<&CatalogItem> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.collect_items(&mut out);
        }
        out
    }

    pub fn find_item(&self, node_id: &str) -> Option<&CatalogItem> {
        self.all_items()
            .into_iter()
            .find(|item| item.node_id() == node_id)
    }

    pub fn find_item_by_barcode(&self, barcode: &str) -> Option<&CatalogItem> {
        self.all_items()
            .into_iter()
            .find(|item| item.has_barcode(barcode))
    }

    /// Groups holding the item, innermost first.
    pub fn groups_containing(&self, node_id: &str) -> Vec<&CatalogGroup> {
        let mut out = Vec::new();
        for root in &self.roots {
            if root.collect_containing(node_id, &mut out) {
                break;
            }
        }
        out
    }
}

struct TreeBuilder<'a> {
    groups: &'a [(i64, PosGroup)],
    by_group: &'a HashMap<i64, Vec<(i64, PosProductWithVariations)>>,
}

impl TreeBuilder<'_> {
    fn category(&self, id: i64, group: &PosGroup, parent_path: Option<&str>) -> CatalogGroup {
        let path = match parent_path {
            Some(parent) => format!("{}{}{}", parent, PATH_SEPARATOR, group.name),
            None => group.name.clone(),
        };

        let children = self
            .children(id, GroupKind::Standard)
            .map(|(child_id, child)| self.category(child_id, child, Some(&path)))
            .collect();

        let holders = self
            .children(id, GroupKind::VariationHolder)
            .map(|(holder_id, holder)| self.holder_item(holder_id, holder));
        let rows = self.products_in(id).map(|(product_id, entry)| {
            if entry.variations.is_empty() {
                CatalogItem::Single(SingleItem {
                    id: product_id,
                    product: entry.product.clone(),
                })
            } else {
                CatalogItem::Grouped(GroupedItem {
                    origin: GroupedOrigin::BaseProduct(product_id),
                    name: entry.product.name.clone(),
                    variations: entry.variations.clone(),
                })
            }
        });
        let items = holders.chain(rows).collect();

        CatalogGroup {
            id,
            name: group.name.clone(),
            description: group.description.clone(),
            path,
            children,
            items,
        }
    }

    fn holder_item(&self, id: i64, group: &PosGroup) -> CatalogItem {
        let variations = self
            .products_in(id)
            .flat_map(|(_, entry)| {
                std::iter::once(entry.product.clone()).chain(entry.variations.iter().cloned())
            })
            .collect();

        CatalogItem::Grouped(GroupedItem {
            origin: GroupedOrigin::VariationGroup(id),
            name: group.name.clone(),
            variations,
        })
    }

    fn children(&self, parent: i64, kind: GroupKind) -> impl Iterator<Item = (i64, &PosGroup)> + '_ {
        self.groups
            .iter()
            .filter(move |(_, group)| group.parent == Some(parent) && group.kind == kind)
            .map(|(id, group)| (*id, group))
    }

    fn products_in(&self, group_id: i64) -> impl Iterator<Item = (i64, &PosProductWithVariations)> + '_ {
        self.by_group
            .get(&group_id)
            .into_iter()
            .flatten()
            .map(|(id, entry)| (*id, entry))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> CatalogTree {
        let groups = vec![
            PosGroup::with_id(1, "Yarn", None, GroupKind::Standard),
            PosGroup::with_id(2, "Wool", Some(1), GroupKind::Standard),
            PosGroup::with_id(3, "Merino", Some(2), GroupKind::VariationHolder),
            PosGroup::with_id(4, "Vouchers", None, GroupKind::Other(12)),
            PosGroup::with_id(5, "Tools", None, GroupKind::Standard),
        ];
        let products = vec![
            PosProductWithVariations::single(PosProduct::with_id(30, "Merino Red", 3).barcode("B1")),
            PosProductWithVariations::single(PosProduct::with_id(31, "Merino Blue", 3).barcode("B2")),
            PosProductWithVariations::single(PosProduct::with_id(20, "Needles", 2)),
            PosProductWithVariations::new(
                PosProduct::with_id(10, "Cotton", 1),
                vec![
                    PosProduct::with_id(11, "Cotton White", 1).barcode("C1").variation_of(10),
                    PosProduct::with_id(12, "Cotton Black", 1).variation_of(10),
                ],
            ),
            PosProductWithVariations::single(PosProduct::with_id(40, "Gift card", 4).barcode("G1")),
        ];
        CatalogTree::build(groups, products).unwrap()
    }

    #[test]
    fn test_roots_exclude_other_kinds() {
        let tree = sample_tree();
        let names: Vec<_> = tree.root_groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Yarn", "Tools"]);
        assert!(tree.find_item_by_barcode("G1").is_none());
    }

    #[test]
    fn test_variation_holder_becomes_grouped_item() {
        let tree = sample_tree();
        let merino = tree.find_item("group:3").unwrap();

        assert_eq!(merino.name(), "Merino");
        assert_eq!(merino.variation_count(), 2);
        assert_eq!(merino.barcodes(), vec!["B1", "B2"]);
        assert!(merino.is_sync_eligible());
        assert!(merino.sync_problems().is_empty());
    }

    #[test]
    fn test_base_product_becomes_grouped_item() {
        let tree = sample_tree();
        let cotton = tree.find_item_by_barcode("C1").unwrap();

        assert_eq!(cotton.node_id(), "product:10");
        assert_eq!(cotton.variation_count(), 2);
        let problems = cotton.sync_problems();
        assert_eq!(problems.len(), 1);
        assert!(!problems[0].is_error());
        assert!(cotton.is_sync_eligible());
    }

    #[test]
    fn test_barcodeless_item_is_not_eligible() {
        let tree = sample_tree();
        let needles = tree.find_item("product:20").unwrap();

        assert!(!needles.is_sync_eligible());
        assert!(needles.sync_problems()[0].is_error());
    }

    #[test]
    fn test_lookups() {
        let tree = sample_tree();

        let wool = tree.by_path("Yarn/Wool").unwrap();
        assert_eq!(wool.id, 2);
        assert_eq!(wool.path, "Yarn/Wool");
        assert!(tree.by_path("Yarn/Silk").is_none());
        assert!(tree.by_path("").is_none());

        assert_eq!(tree.children_of(1).len(), 1);
        assert_eq!(tree.items_of(2).len(), 2);
        assert!(tree.items_of(99).is_empty());
        assert_eq!(tree.all_items().len(), 3);
        assert_eq!(tree.all_groups().len(), 3);

        let chain: Vec<_> = tree.groups_containing("group:3").iter().map(|g| g.id).collect();
        assert_eq!(chain, vec![2, 1]);
    }

    #[test]
    fn test_group_node() {
        let tree = sample_tree();
        let yarn = tree.group(1).unwrap();

        assert_eq!(yarn.node_id(), "category:1");
        assert_eq!(yarn.barcodes().len(), 3);
        assert!(yarn.is_sync_eligible());
        assert!(!tree.group(5).unwrap().is_sync_eligible());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let groups = vec![PosGroup::new("Yarn", None, GroupKind::Standard)];
        let err = CatalogTree::build(groups, Vec::new()).unwrap_err();
        assert!(matches!(err, CoreError::MissingId { entity: "group", .. }));
    }
}
