use std::collections::HashMap;
use juniper::graphql_object;
use tokio_postgres::Row;

use crate::{
    api::{Context, err::ApiResult},
    db::types::Key,
    prelude::*,
};
use super::product::{Product, ProductInput};


/// A producer location offering products.
#[derive(Debug)]
pub(crate) struct Farm {
    key: Key,
    farm_name: String,
    owner_name: String,
    address: String,
    latitude: f64,
    longitude: f64,
    pictures: Vec<String>,
    description: Option<String>,
    tags: Option<Vec<String>>,
    rating: Option<f64>,
    products: Vec<Product>,
}

#[graphql_object(Context = Context)]
impl Farm {
    fn id(&self) -> Key {
        self.key
    }

    fn farm_name(&self) -> &str {
        &self.farm_name
    }

    fn owner_name(&self) -> &str {
        &self.owner_name
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn latitude(&self) -> f64 {
        self.latitude
    }

    fn longitude(&self) -> f64 {
        self.longitude
    }

    /// URLs of pictures of this farm, in display order.
    fn pictures(&self) -> &[String] {
        &self.pictures
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn tags(&self) -> Option<&[String]> {
        self.tags.as_deref()
    }

    fn rating(&self) -> Option<f64> {
        self.rating
    }

    /// All products of this farm, ordered by ID.
    fn products(&self) -> &[Product] {
        &self.products
    }
}

/// Data for creating a farm or overwriting an existing one.
#[derive(Debug, juniper::GraphQLInputObject)]
pub(crate) struct FarmInput {
    farm_name: String,
    owner_name: String,
    address: String,
    latitude: f64,
    longitude: f64,
    pictures: Vec<String>,
    description: Option<String>,
    tags: Option<Vec<String>>,
    rating: Option<f64>,
    products: Option<Vec<ProductInput>>,
}

impl Farm {
    pub(crate) async fn load_by_key(key: Key, context: &Context) -> ApiResult<Option<Self>> {
        let farm = context.db
            .query_opt(
                &format!("select {} from farms where id = $1", Self::COL_NAMES),
                &[&key],
            )
            .await?
            .map(Self::from_row);

        let Some(farm) = farm else {
            return Ok(None);
        };
        debug!("Fetched farm: {farm:?}");

        let mut farms = [farm];
        Self::attach_products(&mut farms, context).await?;
        let [farm] = farms;
        Ok(Some(farm))
    }

    pub(crate) async fn load_all(context: &Context) -> ApiResult<Vec<Self>> {
        let mut farms: Vec<Self> = context.db
            .query_raw(
                &format!("select {} from farms order by id", Self::COL_NAMES),
                dbargs![],
            )
            .await?
            .map_ok(Self::from_row)
            .try_collect()
            .await?;

        Self::attach_products(&mut farms, context).await?;
        Ok(farms)
    }

    pub(crate) async fn create(input: FarmInput, context: &Context) -> ApiResult<Self> {
        let row = context.db
            .query_one(
                &format!(
                    "insert into farms (farmname, ownername, address, latitude, longitude,
                            pictures, description, tags, ratings)
                        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                        returning {}",
                    Self::COL_NAMES,
                ),
                &[
                    &input.farm_name,
                    &input.owner_name,
                    &input.address,
                    &input.latitude,
                    &input.longitude,
                    &input.pictures,
                    &input.description,
                    &input.tags,
                    &input.rating,
                ],
            )
            .await?;
        let mut farm = Self::from_row(row);

        for product in input.products.iter().flatten() {
            let product = Product::create(farm.key, product, context).await?;
            farm.products.push(product);
        }

        info!("Created farm {} with {} products", farm.key, farm.products.len());
        Ok(farm)
    }

    /// Overwrites all fields of farm `key` and updates the listed products
    /// that belong to it. Returns `None` if the farm does not exist.
    pub(crate) async fn update(
        key: Key,
        input: FarmInput,
        context: &Context,
    ) -> ApiResult<Option<Self>> {
        let farm = context.db
            .query_opt(
                &format!(
                    "update farms set
                            farmname = $2, ownername = $3, address = $4, latitude = $5,
                            longitude = $6, pictures = $7, description = $8, tags = $9,
                            ratings = $10
                        where id = $1
                        returning {}",
                    Self::COL_NAMES,
                ),
                &[
                    &key,
                    &input.farm_name,
                    &input.owner_name,
                    &input.address,
                    &input.latitude,
                    &input.longitude,
                    &input.pictures,
                    &input.description,
                    &input.tags,
                    &input.rating,
                ],
            )
            .await?
            .map(Self::from_row);

        let Some(farm) = farm else {
            debug!("Farm {key} does not exist: nothing updated");
            return Ok(None);
        };

        for product in input.products.iter().flatten() {
            match product.id {
                Some(id) => { Product::update(key, id, product, context).await?; }
                None => debug!("Skipping product input without ID when updating farm {key}"),
            }
        }

        let mut farms = [farm];
        Self::attach_products(&mut farms, context).await?;
        let [farm] = farms;
        Ok(Some(farm))
    }

    /// Deletes farm `key` and all its products. Deleting a nonexistent farm
    /// is not an error.
    pub(crate) async fn delete(key: Key, context: &Context) -> ApiResult<()> {
        let products = Product::delete_for_farm(key, context).await?;
        let farms = context.db
            .execute("delete from farms where id = $1", &[&key])
            .await?;

        if farms > 0 {
            info!("Deleted farm {key} and its {products} products");
        } else {
            debug!("Farm {key} to delete does not exist");
        }
        Ok(())
    }

    /// Fills the `products` of all `farms` with a single query.
    async fn attach_products(farms: &mut [Self], context: &Context) -> ApiResult<()> {
        if farms.is_empty() {
            return Ok(());
        }

        let keys = farms.iter().map(|f| f.key).collect::<Vec<_>>();
        let mut products = HashMap::<Key, Vec<Product>>::new();
        for product in Product::load_for_farms(&keys, context).await? {
            products.entry(product.farm).or_default().push(product);
        }

        for farm in farms {
            farm.products = products.remove(&farm.key).unwrap_or_default();
        }

        Ok(())
    }

    const COL_NAMES: &'static str = "id, \
        farmname as \"farmName\", \
        ownername as \"ownerName\", \
        address, \
        latitude, \
        longitude, \
        pictures, \
        description, \
        tags, \
        ratings as rating";

    fn from_row(row: Row) -> Self {
        Self {
            key: row.get("id"),
            farm_name: row.get("farmName"),
            owner_name: row.get("ownerName"),
            address: row.get("address"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            pictures: row.get("pictures"),
            description: row.get("description"),
            tags: row.get("tags"),
            rating: row.get("rating"),
            products: Vec::new(),
        }
    }
}
