//! Products, items and samples.
//!
//! The three catalog resources share one document shape and one set of
//! handlers, but live in separate collections and upload directories and
//! differ in which fields are mandatory on creation. [`CatalogKind`] carries
//! those differences at the type level.

use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    lifecycle::Lifecycle,
    mongodb::{numeric_id_filter, Coll, Id},
};

/// An optional catalog field that a kind may require on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogField {
    Stock,
    Price,
    Image,
    Link,
    Content,
}

impl Display for CatalogField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stock => "stock",
            Self::Price => "price",
            Self::Image => "attachment",
            Self::Link => "link",
            Self::Content => "content",
        };
        write!(f, "{name}")
    }
}

pub trait CatalogKind: Send + Sync + Unpin + 'static {
    /// Collection the entries are stored in.
    const COLLECTION: &'static str;
    /// Human-readable name, used in messages.
    const LABEL: &'static str;
    /// Sub-directory of the upload directory holding the entries' images.
    const UPLOAD_DIR: &'static str;
    /// Fields that must be supplied on creation, in addition to the name.
    const REQUIRED: &'static [CatalogField];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Product;

impl CatalogKind for Product {
    const COLLECTION: &'static str = "products";
    const LABEL: &'static str = "Product";
    const UPLOAD_DIR: &'static str = "product";
    const REQUIRED: &'static [CatalogField] = &[CatalogField::Stock, CatalogField::Price];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item;

impl CatalogKind for Item {
    const COLLECTION: &'static str = "items";
    const LABEL: &'static str = "Item";
    const UPLOAD_DIR: &'static str = "item";
    const REQUIRED: &'static [CatalogField] =
        &[CatalogField::Image, CatalogField::Link, CatalogField::Content];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample;

impl CatalogKind for Sample {
    const COLLECTION: &'static str = "samples";
    const LABEL: &'static str = "Sample";
    const UPLOAD_DIR: &'static str = "sample";
    const REQUIRED: &'static [CatalogField] =
        &[CatalogField::Image, CatalogField::Link, CatalogField::Content];
}

/// Core catalog entry data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCore {
    /// Auto-increment public identifier, per kind.
    pub id: u32,
    /// Unique among the kind's entries that are not deleted.
    pub name: String,
    #[serde(default)]
    pub stock: Option<u32>,
    #[serde(default)]
    pub price: Option<u32>,
    /// File name of the uploaded image, if any.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub is_sold_out: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl CatalogCore {
    pub fn new(id: u32, name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            stock: None,
            price: None,
            image: None,
            link: None,
            content: None,
            product_type: None,
            is_sold_out: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has(&self, field: CatalogField) -> bool {
        match field {
            CatalogField::Stock => self.stock.is_some(),
            CatalogField::Price => self.price.is_some(),
            CatalogField::Image => self.image.is_some(),
            CatalogField::Link => self.link.is_some(),
            CatalogField::Content => self.content.is_some(),
        }
    }

    /// Check that every field the kind requires is present.
    pub fn check_required<K: CatalogKind>(&self) -> Result<()> {
        match K::REQUIRED.iter().find(|field| !self.has(**field)) {
            Some(field) => Err(Error::invalid_input(format!(
                "{field} must be provided for a new {}",
                K::LABEL.to_lowercase()
            ))),
            None => Ok(()),
        }
    }
}

/// A catalog entry of kind `K` without an object ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct NewCatalogEntry<K> {
    #[serde(flatten)]
    pub entry: CatalogCore,
    #[serde(skip)]
    kind: PhantomData<K>,
}

impl<K> NewCatalogEntry<K> {
    pub fn new(entry: CatalogCore) -> Self {
        Self {
            entry,
            kind: PhantomData,
        }
    }

    /// Attach the object ID the database assigned.
    pub fn with_id(self, object_id: Id) -> CatalogEntry<K> {
        CatalogEntry {
            object_id,
            entry: self.entry,
            kind: PhantomData,
        }
    }
}

/// A catalog entry of kind `K` from the database, with its object ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct CatalogEntry<K> {
    #[serde(rename = "_id")]
    pub object_id: Id,
    #[serde(flatten)]
    pub entry: CatalogCore,
    #[serde(skip)]
    kind: PhantomData<K>,
}

impl<K: CatalogKind> CatalogEntry<K> {
    /// Find the entry with the given public ID in the given state.
    pub async fn find(
        entries: &Coll<CatalogEntry<K>>,
        id: u32,
        state: Lifecycle,
    ) -> Result<Option<CatalogEntry<K>>> {
        let filter = state.restrict(numeric_id_filter(id));
        Ok(entries.find_one(filter, None).await?)
    }

    /// Find the entry with the given public ID, failing unless it is active.
    pub async fn live(entries: &Coll<CatalogEntry<K>>, id: u32) -> Result<CatalogEntry<K>> {
        Self::find(entries, id, Lifecycle::Active)
            .await?
            .ok_or_else(|| Error::not_found(format!("{} {id}", K::LABEL)))
    }

    /// Fail with a conflict if an active entry other than `except` uses `name`.
    pub async fn ensure_name_free(
        entries: &Coll<CatalogEntry<K>>,
        name: &str,
        except: Option<Id>,
    ) -> Result<()> {
        let mut filter = Lifecycle::Active.restrict(doc! { "name": name });
        if let Some(except) = except {
            filter.insert("_id", doc! { "$ne": *except });
        }
        if entries.find_one(filter, None).await?.is_some() {
            return Err(Error::conflict(format!("{} named '{name}'", K::LABEL)));
        }
        Ok(())
    }
}

impl<K> Deref for CatalogEntry<K> {
    type Target = CatalogCore;

    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}

impl<K> DerefMut for CatalogEntry<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entry
    }
}
