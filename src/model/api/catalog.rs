use chrono::{DateTime, Utc};
use rocket::{fs::TempFile, FromForm};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::db::catalog::{CatalogCore, CatalogEntry};

/// Multipart body of catalog create and update requests. On update, absent
/// fields are left alone.
#[derive(Debug, FromForm)]
pub struct CatalogForm<'r> {
    pub name: Option<String>,
    pub stock: Option<String>,
    pub price: Option<String>,
    pub link: Option<String>,
    pub content: Option<String>,
    #[field(name = "productType")]
    pub product_type: Option<String>,
    #[field(name = "isSoldOut")]
    pub is_sold_out: Option<bool>,
    pub attachment: Option<TempFile<'r>>,
}

impl CatalogForm<'_> {
    /// The trimmed name, if one was supplied, rejecting blank names.
    pub fn name(&self) -> Result<Option<&str>> {
        match self.name.as_deref().map(str::trim) {
            Some("") => Err(Error::invalid_input("name must not be empty")),
            name => Ok(name),
        }
    }

    /// Copy every supplied field except the attachment onto `entry`.
    pub fn apply(&self, entry: &mut CatalogCore) -> Result<()> {
        if let Some(name) = self.name()? {
            entry.name = name.to_string();
        }
        if let Some(stock) = parse_amount("stock", self.stock.as_deref())? {
            entry.stock = Some(stock);
        }
        if let Some(price) = parse_amount("price", self.price.as_deref())? {
            entry.price = Some(price);
        }
        if let Some(link) = &self.link {
            entry.link = Some(link.clone());
        }
        if let Some(content) = &self.content {
            entry.content = Some(content.clone());
        }
        if let Some(product_type) = &self.product_type {
            entry.product_type = Some(product_type.clone());
        }
        if let Some(is_sold_out) = self.is_sold_out {
            entry.is_sold_out = is_sold_out;
        }
        Ok(())
    }

    /// Whether the form changes anything at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.stock.is_none()
            && self.price.is_none()
            && self.link.is_none()
            && self.content.is_none()
            && self.product_type.is_none()
            && self.is_sold_out.is_none()
            && self.attachment.is_none()
    }
}

fn parse_amount(field: &str, value: Option<&str>) -> Result<Option<u32>> {
    value
        .map(|value| {
            value.trim().parse::<u32>().map_err(|_| {
                Error::invalid_input(format!(
                    "{field} must be a non-negative whole number, got '{value}'"
                ))
            })
        })
        .transpose()
}

/// Multipart body of image uploads.
#[derive(Debug, FromForm)]
pub struct ImageUpload<'r> {
    pub attachment: TempFile<'r>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDescription {
    pub id: u32,
    pub name: String,
    pub stock: Option<u32>,
    pub price: Option<u32>,
    pub image: Option<String>,
    pub link: Option<String>,
    pub content: Option<String>,
    pub product_type: Option<String>,
    pub is_sold_out: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<K> From<CatalogEntry<K>> for CatalogDescription {
    fn from(entry: CatalogEntry<K>) -> Self {
        let CatalogCore {
            id,
            name,
            stock,
            price,
            image,
            link,
            content,
            product_type,
            is_sold_out,
            is_deleted,
            created_at,
            updated_at,
        } = entry.entry;
        Self {
            id,
            name,
            stock,
            price,
            image,
            link,
            content,
            product_type,
            is_sold_out,
            is_deleted,
            created_at,
            updated_at,
        }
    }
}
