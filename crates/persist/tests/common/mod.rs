//! Shared fixtures for the SQLite integration tests.

#![allow(dead_code)]

use persist::{
    AssociationOptions, Column, ConnectOptions, Connection, ConnectionFactory, Instance, Model,
    ModelDef, Schema, SchemaBuilder, Value,
};
use tracing_subscriber::EnvFilter;

pub struct Fixture {
    pub schema: Schema,
    pub person: Model,
    pub phone: Model,
    pub company: Model,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Person has many Phones; Person and Company are linked through CompanyPerson.
pub fn fixture() -> Fixture {
    let mut b = SchemaBuilder::new();
    let person = b
        .define(
            "Person",
            ModelDef::new()
                .column("name", Column::string())
                .column("age", Column::integer())
                .column("email", Column::string())
                .scope("adults", |q| q.where_sql("age >= ?", persist::params![18])),
        )
        .unwrap();
    let phone = b
        .define("Phone", ModelDef::new().column("number", Column::string()))
        .unwrap();
    let company = b
        .define("Company", ModelDef::new().column("name", Column::string()))
        .unwrap();
    b.has_many(person, phone).unwrap();
    b.has_many_with(person, company, AssociationOptions::new().through("CompanyPerson"))
        .unwrap();
    let schema = b.build();
    Fixture {
        person: schema.get(person),
        phone: schema.get(phone),
        company: schema.get(company),
        schema,
    }
}

/// A fresh in-memory database with every table of `schema` created.
pub async fn connect(schema: &Schema) -> Connection {
    init_tracing();
    let factory = ConnectionFactory::new(ConnectOptions::sqlite_memory()).unwrap();
    let conn = factory.connect().await.unwrap();
    conn.create_tables(schema).await.unwrap();
    conn
}

pub async fn save_person(conn: &Connection, person: &Model, name: &str, age: i64) -> Instance {
    let mut p = person.create(persist::values! { "name" => name, "age" => age });
    p.save(conn).await.unwrap();
    p
}

pub async fn save_phone(conn: &Connection, phone: &Model, owner: &Instance, number: &str) -> Instance {
    let mut p = phone.create(persist::values! { "number" => number });
    p.set_one("person", owner).unwrap();
    p.save(conn).await.unwrap();
    p
}

pub fn names(instances: &[Instance]) -> Vec<String> {
    instances
        .iter()
        .map(|i| i.get_str("name").unwrap_or_default().to_string())
        .collect()
}

pub fn int(value: &Value) -> i64 {
    value.as_i64().unwrap()
}
