use std::path::PathBuf;
use std::sync::Arc;

use tabula_core::{
    DatasetSource, DirectoryLoader, Error, Value, flattened, only_tables, transform, update_rows,
};

const SHOP: &str = r#"[
  {
    "name": "categories",
    "fields": [
      {"name": "id", "base_type": "integer", "special_type": "pk"},
      {"name": "name", "base_type": "text", "special_type": "category"}
    ],
    "rows": [[1, "toys"], [2, "books"]]
  },
  {
    "name": "products",
    "fields": [
      {"name": "id", "base_type": "integer", "special_type": "pk"},
      {"name": "category_id", "base_type": "integer", "fk": "categories"},
      {"name": "title", "base_type": "text"},
      {"name": "price", "base_type": "decimal", "special_type": "currency", "visibility": "normal"}
    ],
    "rows": [[1, 1, "robot", 12.5], [2, 2, "atlas", 30.0]]
  },
  {
    "name": "reviews",
    "fields": [
      {"name": "product_id", "base_type": "integer", "fk": "products"},
      {"name": "posted_on", "base_type": "date"}
    ],
    "rows": [[2, "2014-04-07"], [1, null]]
  }
]"#;

fn dataset_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tabula-core-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create dataset dir");
    std::fs::write(dir.join("shop.json"), SHOP).expect("write dataset");
    dir
}

#[test]
fn file_backed_dataset_resolves_from_directory() {
    let dir = dataset_dir();
    let source = DatasetSource::file_backed("shop", Arc::new(DirectoryLoader::new(&dir)));

    let database = source.resolve().expect("resolve shop");
    assert_eq!(database.name(), "shop");
    assert_eq!(database.tables().len(), 3);
    let reviews = database.require_table("reviews").expect("reviews");
    assert!(matches!(reviews.rows()[0][1], Value::Date(_)));
    assert_eq!(reviews.rows()[1][1], Value::Null);

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn missing_dataset_names_the_resource() {
    let dir = dataset_dir();
    let source = DatasetSource::file_backed("warehouse", Arc::new(DirectoryLoader::new(&dir)));

    let err = source.resolve().unwrap_err();
    assert!(matches!(err, Error::ResourceNotFound { .. }));
    assert!(err.to_string().contains("warehouse"));

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn transformed_and_flattened_pipeline() {
    let dir = dataset_dir();
    let shop = DatasetSource::file_backed("shop", Arc::new(DirectoryLoader::new(&dir)));

    let cheap = transform(
        shop,
        "cheap-shop",
        [
            only_tables(["categories", "products", "reviews"]),
            update_rows("products", |rows| {
                rows.into_iter()
                    .filter(|row| matches!(row[3], Value::Float(price) if price < 20.0))
                    .collect()
            }),
        ],
    );

    let flat = flattened(&cheap, "reviews");
    let database = flat.resolve().expect("flatten reviews");
    assert_eq!(database.name(), "cheap-shop");

    let reviews = &database.tables()[0];
    let names: Vec<&str> = reviews.field_names().collect();
    assert_eq!(
        names,
        vec![
            "product_id",
            "product_category_id",
            "product_category_name",
            "product_title",
            "product_price",
            "posted_on",
        ]
    );
    // Only product 1 survives the price filter, so the review of product 2 dangles.
    assert_eq!(reviews.rows()[0][0], Value::Null);
    assert_eq!(reviews.rows()[1][2], Value::Text("toys".to_string()));

    std::fs::remove_dir_all(dir).ok();
}
