use juniper::graphql_object;
use tokio_postgres::Row;

use crate::{
    api::{Context, err::ApiResult},
    db::types::Key,
    prelude::*,
};


/// An item offered by exactly one farm.
#[derive(Debug)]
pub(crate) struct Product {
    pub(crate) key: Key,
    pub(crate) farm: Key,
    name: String,
    availability: bool,
    quantity: i32,
    price: f64,
    pictures: Vec<String>,
}

#[graphql_object(Context = Context)]
impl Product {
    fn id(&self) -> Key {
        self.key
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Whether the product can currently be bought.
    fn availability(&self) -> bool {
        self.availability
    }

    fn quantity(&self) -> i32 {
        self.quantity
    }

    fn price(&self) -> f64 {
        self.price
    }

    /// URLs of pictures of this product.
    fn pictures(&self) -> &[String] {
        &self.pictures
    }
}

/// Data for creating or updating a product. `id` is only used when
/// updating, to address an existing product of the farm.
#[derive(Debug, juniper::GraphQLInputObject)]
pub(crate) struct ProductInput {
    pub(crate) id: Option<Key>,
    pub(crate) name: String,
    pub(crate) availability: bool,
    pub(crate) quantity: i32,
    pub(crate) price: f64,
    pub(crate) pictures: Vec<String>,
}

impl Product {
    /// Loads the products of all given farms, ordered by ID.
    pub(crate) async fn load_for_farms(farms: &[Key], context: &Context) -> ApiResult<Vec<Self>> {
        let products = context.db
            .query_raw(
                &format!(
                    "select {} from products
                        where farmid = any($1)
                        order by id",
                    Self::COL_NAMES,
                ),
                dbargs![&farms],
            )
            .await?
            .map_ok(Self::from_row)
            .try_collect()
            .await?;

        Ok(products)
    }

    /// Inserts a new product belonging to `farm`.
    pub(crate) async fn create(
        farm: Key,
        input: &ProductInput,
        context: &Context,
    ) -> ApiResult<Self> {
        if let Some(id) = input.id {
            debug!("Ignoring ID {id} of product input when creating product");
        }

        let row = context.db
            .query_one(
                &format!(
                    "insert into products (farmid, name, availability, quantity, price, pictures)
                        values ($1, $2, $3, $4, $5, $6)
                        returning {}",
                    Self::COL_NAMES,
                ),
                &[
                    &farm,
                    &input.name,
                    &input.availability,
                    &input.quantity,
                    &input.price,
                    &input.pictures,
                ],
            )
            .await?;

        Ok(Self::from_row(row))
    }

    /// Overwrites the product `id` with `input`, but only if it belongs to
    /// `farm`. Returns whether a product was changed.
    pub(crate) async fn update(
        farm: Key,
        id: Key,
        input: &ProductInput,
        context: &Context,
    ) -> ApiResult<bool> {
        let affected = context.db
            .execute(
                "update products
                    set name = $3, availability = $4, quantity = $5, price = $6, pictures = $7
                    where id = $1 and farmid = $2",
                &[
                    &id,
                    &farm,
                    &input.name,
                    &input.availability,
                    &input.quantity,
                    &input.price,
                    &input.pictures,
                ],
            )
            .await?;

        if affected == 0 {
            debug!("Product {id} does not belong to farm {farm}: not updated");
        }

        Ok(affected > 0)
    }

    /// Deletes all products of `farm`.
    pub(crate) async fn delete_for_farm(farm: Key, context: &Context) -> ApiResult<u64> {
        let affected = context.db
            .execute("delete from products where farmid = $1", &[&farm])
            .await?;

        Ok(affected)
    }

    const COL_NAMES: &'static str = "id, farmid, name, availability, quantity, price, pictures";

    fn from_row(row: Row) -> Self {
        Self {
            key: row.get(0),
            farm: row.get(1),
            name: row.get(2),
            availability: row.get(3),
            quantity: row.get(4),
            price: row.get(5),
            pictures: row.get(6),
        }
    }
}
