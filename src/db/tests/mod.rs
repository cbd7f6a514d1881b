use serde_json::json;

use crate::prelude::*;
use self::util::TestDb;

mod util;


const FARM_FIELDS: &str = "id farmName ownerName address latitude longitude pictures
    description tags rating products { id name availability quantity price pictures }";


#[tokio::test(flavor = "multi_thread")]
async fn hello() -> Result<()> {
    let db = TestDb::new().await?;
    assert_eq!(db.gql_ok("{ hello }").await?, json!({ "hello": "Hello, world!" }));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn create_then_get_returns_same_fields() -> Result<()> {
    let db = TestDb::new().await?;

    let created = db.gql_ok(&format!(r#"mutation {{
        createFarm(input: {{
            farmName: "Sunny Side",
            ownerName: "Ada",
            address: "Hill 3, Springfield",
            latitude: 52.52,
            longitude: -13.4,
            pictures: ["a.jpg", "b.jpg"],
            description: "Eggs and more",
            tags: ["eggs", "organic"],
            rating: 4.5,
        }}) {{ {FARM_FIELDS} }}
    }}"#)).await?;
    let created = &created["createFarm"];
    let id = created["id"].as_str().unwrap();

    let fetched = db.gql_ok(&format!(r#"{{ getFarm(id: "{id}") {{ {FARM_FIELDS} }} }}"#)).await?;
    assert_eq!(&fetched["getFarm"], created);
    assert_eq!(fetched["getFarm"], json!({
        "id": id,
        "farmName": "Sunny Side",
        "ownerName": "Ada",
        "address": "Hill 3, Springfield",
        "latitude": 52.52,
        "longitude": -13.4,
        "pictures": ["a.jpg", "b.jpg"],
        "description": "Eggs and more",
        "tags": ["eggs", "organic"],
        "rating": 4.5,
        "products": [],
    }));

    // Optional fields can be omitted.
    let id = db.add_farm("Plain", &[]).await?;
    let fetched = db.gql_ok(&format!(
        r#"{{ getFarm(id: "{id}") {{ description tags rating }} }}"#,
    )).await?;
    assert_eq!(fetched["getFarm"], json!({ "description": null, "tags": null, "rating": null }));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn get_absent_farm_is_not_found() -> Result<()> {
    let db = TestDb::new().await?;
    let existing = db.add_farm("Only Farm", &[]).await?;

    let response = db.gql(r#"{ getFarm(id: "987654") { id } }"#).await?;
    assert_eq!(response["data"], json!({ "getFarm": null }));
    let errors = response["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["extensions"]["kind"], "NOT_FOUND");
    assert_eq!(errors[0]["extensions"]["key"], "farm.not-found");

    let all = db.gql_ok("{ getAllFarms { id } }").await?;
    assert_eq!(all["getAllFarms"], json!([{ "id": existing }]));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn ids_can_be_given_as_int() -> Result<()> {
    let db = TestDb::new().await?;
    let id = db.add_farm("Numbers", &[]).await?;

    let fetched = db.gql_ok(&format!("{{ getFarm(id: {id}) {{ farmName }} }}")).await?;
    assert_eq!(fetched["getFarm"]["farmName"], "Numbers");

    let response = db.gql(r#"{ getFarm(id: "not-a-number") { id } }"#).await?;
    assert!(response.get("errors").is_some());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn green_acres_scenario() -> Result<()> {
    let db = TestDb::new().await?;

    let created = db.gql_ok(r#"mutation {
        createFarm(input: {
            farmName: "Green Acres",
            ownerName: "Oliver",
            address: "Hooterville",
            latitude: 38.0,
            longitude: -90.5,
            pictures: [],
            products: [{
                name: "Corn",
                availability: true,
                quantity: 100,
                price: 0.25,
                pictures: ["corn.png"],
            }],
        }) { id products { id name quantity } }
    }"#).await?;
    let id = created["createFarm"]["id"].as_str().unwrap().to_owned();
    assert_eq!(created["createFarm"]["products"][0]["name"], "Corn");
    assert_eq!(created["createFarm"]["products"][0]["quantity"], 100);

    let all = db.gql_ok("{ getAllFarms { id farmName products { name price pictures } } }").await?;
    assert_eq!(all["getAllFarms"], json!([{
        "id": id,
        "farmName": "Green Acres",
        "products": [{ "name": "Corn", "price": 0.25, "pictures": ["corn.png"] }],
    }]));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn get_all_farms_attaches_products_per_farm() -> Result<()> {
    let db = TestDb::new().await?;
    let a = db.add_farm("A", &[("apples", 1), ("pears", 2)]).await?;
    let b = db.add_farm("B", &[]).await?;
    let c = db.add_farm("C", &[("carrots", 3)]).await?;

    let all = db.gql_ok("{ getAllFarms { id products { name quantity } } }").await?;
    assert_eq!(all["getAllFarms"], json!([
        { "id": a, "products": [
            { "name": "apples", "quantity": 1 },
            { "name": "pears", "quantity": 2 },
        ] },
        { "id": b, "products": [] },
        { "id": c, "products": [{ "name": "carrots", "quantity": 3 }] },
    ]));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_farm_removes_products() -> Result<()> {
    let db = TestDb::new().await?;
    let doomed = db.add_farm("Doomed", &[("a", 1), ("b", 2), ("c", 3)]).await?;
    let _other = db.add_farm("Other", &[("x", 9)]).await?;
    assert_eq!(db.count("products").await?, 4);

    let data = db.gql_ok(&format!(r#"mutation {{ deleteFarm(id: "{doomed}") }}"#)).await?;
    assert_eq!(data, json!({ "deleteFarm": true }));
    assert_eq!(db.count("products").await?, 1);
    assert_eq!(db.count("farms").await?, 1);

    let response = db.gql(&format!(r#"{{ getFarm(id: "{doomed}") {{ id }} }}"#)).await?;
    assert_eq!(response["errors"][0]["extensions"]["kind"], "NOT_FOUND");

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_nonexistent_farm_returns_true() -> Result<()> {
    let db = TestDb::new().await?;
    let data = db.gql_ok(r#"mutation { deleteFarm(id: "424242") }"#).await?;
    assert_eq!(data, json!({ "deleteFarm": true }));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn update_farm_overwrites_fields_and_products() -> Result<()> {
    let db = TestDb::new().await?;
    let id = db.add_farm("Old Name", &[("milk", 5)]).await?;
    let product = db.gql_ok(&format!(r#"{{ getFarm(id: "{id}") {{ products {{ id }} }} }}"#))
        .await?["getFarm"]["products"][0]["id"].clone();

    let data = db.gql_ok(&format!(r#"mutation {{
        updateFarm(id: "{id}", input: {{
            farmName: "New Name",
            ownerName: "New Owner",
            address: "2 Farm Road",
            latitude: 1.0,
            longitude: 2.0,
            pictures: ["new.jpg"],
            tags: ["dairy"],
            products: [
                {{ id: {product}, name: "cheese", availability: false, quantity: 0,
                    price: 9.0, pictures: [] }},
                {{ name: "ignored", availability: true, quantity: 1, price: 1.0, pictures: [] }},
            ],
        }}) {{ id farmName ownerName pictures tags description products {{ name availability }} }}
    }}"#)).await?;

    assert_eq!(data["updateFarm"], json!({
        "id": id,
        "farmName": "New Name",
        "ownerName": "New Owner",
        "pictures": ["new.jpg"],
        "tags": ["dairy"],
        "description": null,
        "products": [{ "name": "cheese", "availability": false }],
    }));
    assert_eq!(db.count("products").await?, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn update_does_not_touch_products_of_other_farms() -> Result<()> {
    let db = TestDb::new().await?;
    let mine = db.add_farm("Mine", &[]).await?;
    let theirs = db.add_farm("Theirs", &[("honey", 7)]).await?;
    let their_product = db.gql_ok(&format!(
        r#"{{ getFarm(id: "{theirs}") {{ products {{ id }} }} }}"#,
    )).await?["getFarm"]["products"][0]["id"].clone();

    db.gql_ok(&format!(r#"mutation {{
        updateFarm(id: "{mine}", input: {{
            farmName: "Mine", ownerName: "Me", address: "Here",
            latitude: 0.0, longitude: 0.0, pictures: [],
            products: [{{ id: {their_product}, name: "stolen", availability: false,
                quantity: 0, price: 0.0, pictures: [] }}],
        }}) {{ id }}
    }}"#)).await?;

    let fetched = db.gql_ok(&format!(
        r#"{{ getFarm(id: "{theirs}") {{ products {{ name quantity }} }} }}"#,
    )).await?;
    assert_eq!(fetched["getFarm"]["products"], json!([{ "name": "honey", "quantity": 7 }]));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn update_missing_farm_returns_null() -> Result<()> {
    let db = TestDb::new().await?;
    let data = db.gql_ok(r#"mutation {
        updateFarm(id: "31337", input: {
            farmName: "Ghost", ownerName: "Nobody", address: "Nowhere",
            latitude: 0.0, longitude: 0.0, pictures: [],
        }) { id }
    }"#).await?;
    assert_eq!(data, json!({ "updateFarm": null }));
    assert_eq!(db.count("farms").await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_create_is_rolled_back() -> Result<()> {
    let db = TestDb::new().await?;

    // PostgreSQL rejects NUL characters in text values, so the second product
    // insert fails after the farm and the first product were inserted.
    let out = db.execute(json!({ "query": r#"mutation {
        createFarm(input: {
            farmName: "Half Done", ownerName: "X", address: "Y",
            latitude: 0.0, longitude: 0.0, pictures: [],
            products: [
                { name: "fine", availability: true, quantity: 1, price: 1.0, pictures: [] },
                { name: "bad\u0000name", availability: true, quantity: 1, price: 1.0, pictures: [] },
            ],
        }) { id }
    }"# })).await?;

    assert!(!out.committed);
    assert_eq!(out.response["errors"][0]["extensions"]["kind"], "INTERNAL_SERVER_ERROR");
    assert_eq!(db.count("farms").await?, 0);
    assert_eq!(db.count("products").await?, 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn not_found_error_is_not_committed() -> Result<()> {
    let db = TestDb::new().await?;

    let out = db.execute(json!({ "query": r#"{ getFarm(id: "999") { id } }"# })).await?;
    assert!(!out.committed);
    assert_eq!(out.response["errors"][0]["extensions"]["kind"], "NOT_FOUND");

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_with_failing_entry_is_rolled_back() -> Result<()> {
    let db = TestDb::new().await?;

    let out = db.execute(json!([
        { "query": r#"mutation {
            createFarm(input: {
                farmName: "Batch Farm", ownerName: "X", address: "Y",
                latitude: 0.0, longitude: 0.0, pictures: [],
                products: [{ name: "a", availability: true, quantity: 1, price: 1.0, pictures: [] }],
            }) { id }
        }"# },
        { "query": r#"{ getFarm(id: "999") { id } }"# },
    ])).await?;

    let responses = out.response.as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert!(responses[0].get("errors").is_none());
    assert!(responses[0]["data"]["createFarm"]["id"].is_string());
    assert_eq!(responses[1]["errors"][0]["extensions"]["kind"], "NOT_FOUND");

    assert!(!out.committed);
    assert_eq!(db.count("farms").await?, 0);
    assert_eq!(db.count("products").await?, 0);
    assert_eq!(db.gql_ok("{ getAllFarms { id } }").await?, json!({ "getAllFarms": [] }));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_batch_is_committed() -> Result<()> {
    let db = TestDb::new().await?;
    let mutation = r#"mutation {
        createFarm(input: {
            farmName: "Twin", ownerName: "X", address: "Y",
            latitude: 0.0, longitude: 0.0, pictures: [],
        }) { id }
    }"#;

    let out = db.execute(json!([{ "query": mutation }, { "query": mutation }])).await?;
    assert!(out.committed);
    assert!(out.num_queries >= 2);
    assert_eq!(db.count("farms").await?, 2);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn hello_does_not_touch_database() -> Result<()> {
    let db = TestDb::new().await?;
    let out = db.execute(json!({ "query": "{ hello }" })).await?;
    assert!(out.committed);
    assert_eq!(out.num_queries, 0);
    Ok(())
}
