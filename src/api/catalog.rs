//! Routes shared by the three catalog resources. The resource is the first
//! path segment; each handler dispatches to a function generic over the
//! [`CatalogKind`]. The routes are ranked below every other route under
//! `/api`, so they only see requests nothing else claims.

use std::fmt::{Display, Formatter};

use chrono::Utc;
use log::info;
use mongodb::{bson::doc, Database};
use rocket::{
    form::Form, fs::NamedFile, request::FromParam, response::status::Created, serde::json::Json,
    Route, State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        catalog::{CatalogDescription, CatalogForm},
        query::ListQuery,
    },
    auth::Viewer,
    db::catalog::{CatalogCore, CatalogEntry, CatalogKind, Item, NewCatalogEntry, Product, Sample},
    lifecycle::{self, Lifecycle, Transition, IS_DELETED},
    mongodb::{inserted_id, numeric_id_filter, Coll, Counter, Id},
    upload,
};

use super::common::{created, list_by_id};

/// Rank of the catalog routes, below the defaults of every static-prefixed route.
const RANK: isize = 2;

pub fn routes() -> Vec<Route> {
    routes![
        create_entry,
        list_entries,
        get_entry,
        get_entry_image,
        update_entry,
        delete_entry,
        recover_entry,
    ]
}

/// The catalog resource named in a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Product,
    Item,
    Sample,
}

impl<'a> FromParam<'a> for Resource {
    type Error = &'a str;

    fn from_param(param: &'a str) -> std::result::Result<Self, Self::Error> {
        match param {
            "product" => Ok(Self::Product),
            "item" => Ok(Self::Item),
            "sample" => Ok(Self::Sample),
            other => Err(other),
        }
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Product => "product",
            Self::Item => "item",
            Self::Sample => "sample",
        };
        write!(f, "{name}")
    }
}

/// Call a function generic over the catalog kind with the kind matching `$resource`.
macro_rules! dispatch {
    ($resource:expr, $handler:ident($($arg:expr),* $(,)?)) => {
        match $resource {
            Resource::Product => $handler::<Product>($($arg),*).await,
            Resource::Item => $handler::<Item>($($arg),*).await,
            Resource::Sample => $handler::<Sample>($($arg),*).await,
        }
    };
}

#[post("/<resource>", data = "<form>", rank = 2)]
async fn create_entry(
    viewer: Viewer,
    config: &State<Config>,
    resource: Resource,
    form: Form<CatalogForm<'_>>,
    db: &State<Database>,
) -> Result<Created<Json<CatalogDescription>>> {
    viewer.require_admin(config)?;
    dispatch!(resource, create(config, resource, form, db))
}

#[get("/<resource>?<query..>", rank = 2)]
async fn list_entries(
    viewer: Viewer,
    config: &State<Config>,
    resource: Resource,
    query: ListQuery,
    db: &State<Database>,
) -> Result<Json<Vec<CatalogDescription>>> {
    if query.is_deleted {
        viewer.require_admin(config)?;
    }
    dispatch!(resource, list(query.state(), db))
}

#[get("/<resource>/<id>", rank = 2)]
async fn get_entry(
    resource: Resource,
    id: u32,
    db: &State<Database>,
) -> Result<Json<CatalogDescription>> {
    dispatch!(resource, detail(id, db))
}

#[get("/<resource>/<id>/image", rank = 2)]
async fn get_entry_image(
    config: &State<Config>,
    resource: Resource,
    id: u32,
    db: &State<Database>,
) -> Result<NamedFile> {
    dispatch!(resource, image(config, id, db))
}

#[put("/<resource>/<id>", data = "<form>", rank = 2)]
async fn update_entry(
    viewer: Viewer,
    config: &State<Config>,
    resource: Resource,
    id: u32,
    form: Form<CatalogForm<'_>>,
    db: &State<Database>,
) -> Result<Json<CatalogDescription>> {
    viewer.require_admin(config)?;
    dispatch!(resource, update(config, id, form, db))
}

#[delete("/<resource>/<id>", rank = 2)]
async fn delete_entry(
    viewer: Viewer,
    config: &State<Config>,
    resource: Resource,
    id: u32,
    db: &State<Database>,
) -> Result<Json<CatalogDescription>> {
    viewer.require_admin(config)?;
    dispatch!(resource, toggle(id, Transition::Delete, db))
}

#[post("/<resource>/<id>/recover", rank = 2)]
async fn recover_entry(
    viewer: Viewer,
    config: &State<Config>,
    resource: Resource,
    id: u32,
    db: &State<Database>,
) -> Result<Json<CatalogDescription>> {
    viewer.require_admin(config)?;
    dispatch!(resource, toggle(id, Transition::Recover, db))
}

async fn create<K: CatalogKind>(
    config: &Config,
    resource: Resource,
    mut form: Form<CatalogForm<'_>>,
    db: &Database,
) -> Result<Created<Json<CatalogDescription>>> {
    let entries = Coll::<CatalogEntry<K>>::from_db(db);
    let name = form
        .name()?
        .ok_or_else(|| Error::invalid_input("name must be provided"))?
        .to_string();
    let mut entry = CatalogCore::new(0, name);
    form.apply(&mut entry)?;
    CatalogEntry::<K>::ensure_name_free(&entries, &entry.name, None).await?;

    if let Some(file) = form.attachment.as_mut() {
        entry.image = Some(upload::store_image(file, config.uploads_dir(), K::UPLOAD_DIR).await?);
    }
    let inserted = insert::<K>(entry.clone(), db).await;
    match inserted {
        Ok(entry) => {
            info!("Created {} {} '{}'", resource, entry.id, entry.name);
            Ok(created(
                format!("/api/{resource}/{}", entry.id),
                entry.into(),
            ))
        }
        Err(e) => {
            if let Some(image) = &entry.image {
                upload::discard(config.uploads_dir(), K::UPLOAD_DIR, image).await;
            }
            Err(e)
        }
    }
}

/// Check the entry is complete, assign it an ID and store it.
async fn insert<K: CatalogKind>(mut entry: CatalogCore, db: &Database) -> Result<CatalogEntry<K>> {
    entry.check_required::<K>()?;
    entry.id = Counter::next(&Coll::from_db(db), K::COLLECTION).await?;
    let entry = NewCatalogEntry::<K>::new(entry);
    let result = Coll::<NewCatalogEntry<K>>::from_db(db)
        .insert_one(&entry, None)
        .await?;
    Ok(entry.with_id(inserted_id(&result)?))
}

async fn list<K: CatalogKind>(state: Lifecycle, db: &Database) -> Result<Json<Vec<CatalogDescription>>> {
    let entries = Coll::<CatalogEntry<K>>::from_db(db);
    let found = list_by_id(&entries, state.filter()).await?;
    Ok(Json(found.into_iter().map(CatalogDescription::from).collect()))
}

async fn detail<K: CatalogKind>(id: u32, db: &Database) -> Result<Json<CatalogDescription>> {
    let entries = Coll::<CatalogEntry<K>>::from_db(db);
    let entry = CatalogEntry::live(&entries, id).await?;
    Ok(Json(entry.into()))
}

async fn image<K: CatalogKind>(config: &Config, id: u32, db: &Database) -> Result<NamedFile> {
    let entries = Coll::<CatalogEntry<K>>::from_db(db);
    let entry = CatalogEntry::live(&entries, id).await?;
    let file_name = entry
        .image
        .as_deref()
        .ok_or_else(|| Error::not_found(format!("Image of {} {id}", K::LABEL)))?;
    upload::open(config.uploads_dir(), K::UPLOAD_DIR, file_name).await
}

async fn update<K: CatalogKind>(
    config: &Config,
    id: u32,
    mut form: Form<CatalogForm<'_>>,
    db: &Database,
) -> Result<Json<CatalogDescription>> {
    if form.is_empty() {
        return Err(Error::invalid_input("nothing to update"));
    }
    let entries = Coll::<CatalogEntry<K>>::from_db(db);
    let existing = CatalogEntry::<K>::live(&entries, id).await?;
    let mut entry = existing.entry.clone();
    form.apply(&mut entry)?;
    if entry.name != existing.name {
        CatalogEntry::<K>::ensure_name_free(&entries, &entry.name, Some(existing.object_id)).await?;
    }

    let stored = match form.attachment.as_mut() {
        Some(file) => Some(upload::store_image(file, config.uploads_dir(), K::UPLOAD_DIR).await?),
        None => None,
    };
    if let Some(image) = &stored {
        entry.image = Some(image.clone());
    }
    entry.updated_at = Utc::now();

    match replace::<K>(existing.object_id, entry, db).await {
        Ok(updated) => {
            if stored.is_some() {
                if let Some(old) = &existing.image {
                    upload::discard(config.uploads_dir(), K::UPLOAD_DIR, old).await;
                }
            }
            info!("Updated {} {id}", K::LABEL);
            Ok(Json(updated.into()))
        }
        Err(e) => {
            if let Some(image) = &stored {
                upload::discard(config.uploads_dir(), K::UPLOAD_DIR, image).await;
            }
            Err(e)
        }
    }
}

/// Overwrite a live entry with new contents.
async fn replace<K: CatalogKind>(object_id: Id, entry: CatalogCore, db: &Database) -> Result<CatalogEntry<K>> {
    let id = entry.id;
    let entry = NewCatalogEntry::<K>::new(entry);
    let filter = doc! { "_id": *object_id, IS_DELETED: false };
    let result = Coll::<NewCatalogEntry<K>>::from_db(db)
        .replace_one(filter, &entry, None)
        .await?;
    if result.matched_count == 0 {
        return Err(Error::not_found(format!("{} {id}", K::LABEL)));
    }
    Ok(entry.with_id(object_id))
}

async fn toggle<K: CatalogKind>(
    id: u32,
    transition: Transition,
    db: &Database,
) -> Result<Json<CatalogDescription>> {
    let entries = Coll::<CatalogEntry<K>>::from_db(db);
    if transition == Transition::Recover {
        let entry = CatalogEntry::<K>::find(&entries, id, Lifecycle::Deleted)
            .await?
            .ok_or_else(|| Error::not_found(format!("Deleted {} {id}", K::LABEL)))?;
        CatalogEntry::<K>::ensure_name_free(&entries, &entry.name, Some(entry.object_id)).await?;
    }
    let entry = lifecycle::apply(
        &entries,
        numeric_id_filter(id),
        transition,
        format!("{} {id}", K::LABEL),
    )
    .await?;
    Ok(Json(entry.into()))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Header, Status},
        local::asynchronous::{Client, LocalResponse},
    };

    use super::*;
    use crate::error::ErrorBody;

    const BOUNDARY: &str = "X-CATALOG-BOUNDARY";

    /// Encode text fields and an optional image as a multipart body.
    fn multipart(fields: &[(&str, &str)], image: Option<(&str, &str)>) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        if let Some((content_type, content)) = image {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"attachment\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn form_type() -> ContentType {
        ContentType::new("multipart", "form-data").with_params(("boundary", BOUNDARY))
    }

    async fn post<'c>(
        client: &'c Client,
        auth: &Header<'static>,
        path: &str,
        body: String,
    ) -> LocalResponse<'c> {
        client
            .post(path.to_string())
            .header(auth.clone())
            .header(form_type())
            .body(body)
            .dispatch()
            .await
    }

    #[backend_test]
    async fn products_need_stock_and_price(client: Client, auth: Header<'static>) {
        let response = post(&client, &auth, "/api/product", multipart(&[("name", "Mug")], None)).await;
        assert_eq!(Status::BadRequest, response.status());
        let body: ErrorBody = response.into_json().await.unwrap();
        assert!(body.error.contains("stock"));

        let body = multipart(&[("name", "Mug"), ("stock", "3"), ("price", "12000")], None);
        let response = post(&client, &auth, "/api/product", body).await;
        assert_eq!(Status::Created, response.status());
        let product: CatalogDescription = response.into_json().await.unwrap();
        assert_eq!(product.id, 1);
        assert_eq!(product.stock, Some(3));
        assert!(!product.is_sold_out);

        let fetched: CatalogDescription = client
            .get("/api/product/1")
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(fetched.name, "Mug");
        assert_eq!(fetched.price, Some(12000));
    }

    #[backend_test]
    async fn items_need_an_image(client: Client, auth: Header<'static>) {
        let fields = [("name", "Poster"), ("link", "https://example.com"), ("content", "A3")];
        let response = post(&client, &auth, "/api/item", multipart(&fields, None)).await;
        assert_eq!(Status::BadRequest, response.status());

        let response = post(
            &client,
            &auth,
            "/api/item",
            multipart(&fields, Some(("application/pdf", "%PDF"))),
        )
        .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = post(
            &client,
            &auth,
            "/api/item",
            multipart(&fields, Some(("image/png", "png bytes"))),
        )
        .await;
        assert_eq!(Status::Created, response.status());
        let item: CatalogDescription = response.into_json().await.unwrap();
        assert!(item.image.unwrap().ends_with(".png"));

        let response = client.get("/api/item/1/image").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(response.into_string().await.unwrap(), "png bytes");

        // Items and products count separately.
        assert_eq!(Status::NotFound, client.get("/api/product/1").dispatch().await.status());
    }

    #[backend_test]
    async fn partial_update_and_soft_delete(client: Client, auth: Header<'static>) {
        let body = multipart(&[("name", "Mug"), ("stock", "3"), ("price", "12000")], None);
        post(&client, &auth, "/api/product", body).await;
        let body = multipart(&[("name", "Cup"), ("stock", "1"), ("price", "9000")], None);
        post(&client, &auth, "/api/product", body).await;

        let update = |body: String| {
            client
                .put("/api/product/1")
                .header(auth.clone())
                .header(form_type())
                .body(body)
                .dispatch()
        };
        assert_eq!(
            Status::Forbidden,
            update(multipart(&[("name", "Cup")], None)).await.status()
        );
        let updated: CatalogDescription = update(multipart(&[("isSoldOut", "true")], None))
            .await
            .into_json()
            .await
            .unwrap();
        assert!(updated.is_sold_out);
        assert_eq!(updated.name, "Mug");
        assert_eq!(updated.price, Some(12000));

        let response = client
            .delete("/api/product/1")
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(Status::NotFound, client.get("/api/product/1").dispatch().await.status());

        let live: Vec<CatalogDescription> = client
            .get("/api/product")
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].name, "Cup");

        let deleted: Vec<CatalogDescription> = client
            .get("/api/product?isDeleted=true")
            .header(auth.clone())
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].name, "Mug");

        let response = client
            .post("/api/product/1/recover")
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let recovered: CatalogDescription = response.into_json().await.unwrap();
        assert!(!recovered.is_deleted);
        assert!(recovered.is_sold_out);
    }

    #[backend_test(user)]
    async fn catalog_changes_need_an_administrator(client: Client, auth: Header<'static>) {
        let body = multipart(&[("name", "Mug"), ("stock", "3"), ("price", "12000")], None);
        let response = post(&client, &auth, "/api/sample", body).await;
        assert_eq!(Status::Forbidden, response.status());

        // Anybody may browse.
        assert_eq!(Status::Ok, client.get("/api/sample").dispatch().await.status());
    }

    #[test]
    fn resource_params() {
        assert_eq!(Resource::from_param("item"), Ok(Resource::Item));
        assert_eq!(Resource::from_param("survey"), Err("survey"));
        assert_eq!(Resource::Sample.to_string(), "sample");
    }
}
