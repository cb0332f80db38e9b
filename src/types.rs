// Wire types for the shop's JSON API. The upstream omits fields freely, so
// most structs default missing or null fields instead of failing the whole
// decode.

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Response of the mixed search endpoint.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct SearchResponse {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub attributes: SearchAttributes,
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<SearchItem>,
}

impl SearchResponse {
    /// Only the product entries; recipes and other tags are left out.
    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.items.iter().filter_map(|item| match item {
            SearchItem::Product(product) => Some(product),
            SearchItem::Other { .. } => None,
        })
    }
}

/// Pagination metadata of a search.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SearchAttributes {
    /// Total number of hits across all pages.
    #[serde(deserialize_with = "null_as_default")]
    pub items: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub page: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub has_more_items: bool,
}

/// One search hit. The endpoint mixes several entry kinds; only `product`
/// entries carry [`ProductAttributes`].
#[derive(Deserialize, Debug, Clone)]
#[serde(try_from = "RawSearchItem")]
pub enum SearchItem {
    Product(Product),
    /// Any other tag, kept so callers can see what was returned. The id is
    /// left untyped because non-product entries do not share a shape.
    Other { kind: String, id: serde_json::Value },
}

#[derive(Deserialize)]
struct RawSearchItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    attributes: serde_json::Value,
}

impl TryFrom<RawSearchItem> for SearchItem {
    type Error = serde_json::Error;

    fn try_from(raw: RawSearchItem) -> Result<Self, Self::Error> {
        if raw.kind != "product" {
            return Ok(SearchItem::Other {
                kind: raw.kind,
                id: raw.id,
            });
        }
        Ok(SearchItem::Product(Product {
            id: serde_json::from_value(raw.id)?,
            attributes: match raw.attributes {
                serde_json::Value::Null => ProductAttributes::default(),
                attributes => serde_json::from_value(attributes)?,
            },
        }))
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Product {
    pub id: u64,
    pub attributes: ProductAttributes,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ProductAttributes {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub full_name: String,
    pub brand: Option<String>,
    pub name_extra: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub gross_price: String,
    pub gross_unit_price: Option<String>,
    #[serde(rename = "unit_price_quantity_abbreviation")]
    pub unit_price_quantity_abbr: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub availability: Availability,
    #[serde(deserialize_with = "null_as_default")]
    pub images: Vec<ProductImage>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Availability {
    #[serde(deserialize_with = "null_as_default")]
    pub is_available: bool,
    pub description: Option<String>,
    pub code: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ProductImage {
    #[serde(deserialize_with = "null_as_default")]
    pub large: ImageVariant,
    #[serde(deserialize_with = "null_as_default")]
    pub thumbnail: ImageVariant,
    pub variant: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ImageVariant {
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub width: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub height: u32,
}

/// Server snapshot of the shopping cart. Totals and counts come from the
/// server; every mutation returns a fresh `Cart` that replaces the old one.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Cart {
    #[serde(deserialize_with = "null_as_default")]
    pub id: u64,
    pub active_grouping: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub label_text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub product_quantity_count: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub display_price: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_gross_amount: String,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub groups: Vec<CartGroup>,
    #[serde(deserialize_with = "null_as_default")]
    pub summary_lines: Vec<SummaryGroup>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.product_quantity_count == 0
    }

    /// All line items across groups, in server order.
    pub fn items(&self) -> impl Iterator<Item = &CartGroupItem> {
        self.groups.iter().flat_map(|group| group.items.iter())
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CartGroup {
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<CartGroupItem>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CartGroupItem {
    #[serde(deserialize_with = "null_as_default")]
    pub product: CartProduct,
    #[serde(deserialize_with = "null_as_default")]
    pub item_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub quantity: u32,
    #[serde(rename = "display_price_total", deserialize_with = "null_as_default")]
    pub display_price: String,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CartProduct {
    #[serde(deserialize_with = "null_as_default")]
    pub id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub full_name: String,
    pub brand: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    pub name_extra: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub gross_price: String,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    pub absolute_url: Option<String>,
}

/// A block of server-computed totals (subtotal, delivery fee, discounts).
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SummaryGroup {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub lines: Vec<SummaryLine>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SummaryLine {
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub gross_amount: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

/// Item to add to the cart.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartItem {
    pub product_id: u64,
    pub quantity: u32,
}
