//! Query terminals against in-memory SQLite.

mod common;

use common::{connect, fixture, int, names, save_person, save_phone};
use persist::{Assignments, Direction, Value};

async fn seeded() -> (common::Fixture, persist::Connection) {
    let f = fixture();
    let conn = connect(&f.schema).await;
    for (name, age) in [("Ann", 17), ("Bob O'Neill", 21), ("Cid", 35), ("Dee", 52)] {
        save_person(&conn, &f.person, name, age).await;
    }
    (f, conn)
}

#[tokio::test]
async fn where_values_binds_quotes_safely() {
    let (f, conn) = seeded().await;
    let n = f
        .person
        .query()
        .where_values(persist::values! { "name" => "Bob O'Neill", "age" => 21 })
        .count(&conn)
        .await
        .unwrap();
    assert_eq!(n, 1);

    let none = f
        .person
        .query()
        .where_in("name", Vec::<Value>::new())
        .all(&conn)
        .await
        .unwrap();
    assert!(none.is_empty());

    let some = f
        .person
        .query()
        .where_in("age", [17, 52])
        .order_by("age", Direction::Asc)
        .all(&conn)
        .await
        .unwrap();
    assert_eq!(names(&some), vec!["Ann", "Dee"]);
}

#[tokio::test]
async fn aggregates() {
    let (f, conn) = seeded().await;
    assert_eq!(int(&f.person.query().sum(&conn, "age").await.unwrap()), 125);
    assert_eq!(f.person.query().min(&conn, "age").await.unwrap(), Value::Integer(17));
    assert_eq!(f.person.query().max(&conn, "age").await.unwrap(), Value::Integer(52));

    let nobody = f.person.where_sql("age > ?", persist::params![100]);
    assert_eq!(nobody.clone().sum(&conn, "age").await.unwrap(), Value::Integer(0));
    assert!(nobody.clone().min(&conn, "age").await.unwrap().is_null());
    assert!(nobody.clone().max(&conn, "age").await.unwrap().is_null());
    assert_eq!(nobody.count(&conn).await.unwrap(), 0);
}

#[tokio::test]
async fn aggregates_ignore_included_rows() {
    let (f, conn) = seeded().await;
    let cid = f.person.where_eq("name", "Cid").first(&conn).await.unwrap().unwrap();
    for n in ["1", "2", "3"] {
        save_phone(&conn, &f.phone, &cid, n).await;
    }
    let plain = f.person.query().sum(&conn, "age").await.unwrap();
    let included = f.person.include("phones").sum(&conn, "age").await.unwrap();
    assert_eq!(int(&included), int(&plain));

    let owners = f.person.query().join("phones").sum(&conn, "age").await.unwrap();
    assert_eq!(int(&owners), 35);
}

#[tokio::test]
async fn pagination_and_ordering() {
    let (f, conn) = seeded().await;
    let page = f
        .person
        .query()
        .order_by("age", Direction::Desc)
        .limit_offset(2, 1)
        .all(&conn)
        .await
        .unwrap();
    assert_eq!(names(&page), vec!["Cid", "Bob O'Neill"]);

    let tail = f
        .person
        .query()
        .order_by("age", Direction::Asc)
        .offset(3)
        .all(&conn)
        .await
        .unwrap();
    assert_eq!(names(&tail), vec!["Dee"]);
}

#[tokio::test]
async fn include_pages_count_roots() {
    let f = fixture();
    let conn = connect(&f.schema).await;
    let bob = save_person(&conn, &f.person, "Bob", 21).await;
    let john = save_person(&conn, &f.person, "John", 30).await;
    save_person(&conn, &f.person, "Zed", 40).await;
    save_phone(&conn, &f.phone, &bob, "555-0001").await;
    save_phone(&conn, &f.phone, &bob, "555-0002").await;
    save_phone(&conn, &f.phone, &john, "555-0100").await;

    let page = f
        .person
        .include("phones")
        .order_by("name", Direction::Asc)
        .limit(2)
        .all(&conn)
        .await
        .unwrap();
    assert_eq!(names(&page), vec!["Bob", "John"]);
    assert_eq!(page[0].many("phones").len(), 2);
    assert_eq!(page[1].many("phones").len(), 1);

    let rest = f
        .person
        .include("phones")
        .order_by("name", Direction::Asc)
        .offset(1)
        .all(&conn)
        .await
        .unwrap();
    assert_eq!(names(&rest), vec!["John", "Zed"]);
    assert!(rest[1].many("phones").is_empty());

    let first = f
        .person
        .include("phones")
        .order_by("name", Direction::Asc)
        .first(&conn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.many("phones").len(), 2);
    let last = f
        .person
        .include("phones")
        .order_by("name", Direction::Asc)
        .last(&conn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.get_str("name"), Some("Zed"));
}

#[tokio::test]
async fn first_and_last() {
    let (f, conn) = seeded().await;
    let first = f.person.query().first(&conn).await.unwrap().unwrap();
    assert_eq!(first.get_str("name"), Some("Ann"));

    // Unordered last falls back to the highest primary key.
    let last = f.person.query().last(&conn).await.unwrap().unwrap();
    assert_eq!(last.get_str("name"), Some("Dee"));

    let youngest = f
        .person
        .query()
        .order_by("age", Direction::Desc)
        .last(&conn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(youngest.get_str("name"), Some("Ann"));

    let missing = f.person.where_eq("name", "Zed").first(&conn).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn each_streams_instances() {
    let (f, conn) = seeded().await;
    let mut seen = Vec::new();
    f.person
        .query()
        .order_by("name", Direction::Asc)
        .each(&conn, |p| {
            seen.push(p.get_str("name").unwrap_or_default().to_string());
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(seen, vec!["Ann", "Bob O'Neill", "Cid", "Dee"]);

    let err = f
        .person
        .include("phones")
        .each(&conn, |_| Ok(()))
        .await
        .unwrap_err();
    assert!(err.is_mapping());
}

#[tokio::test]
async fn each_stops_on_callback_error() {
    let (f, conn) = seeded().await;
    let mut calls = 0;
    let err = f
        .person
        .query()
        .each(&conn, |_| {
            calls += 1;
            Err(persist::OrmError::Other("stop".into()))
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "stop");
    assert_eq!(calls, 1);
}

#[tokio::test]
async fn scopes_filter() {
    let (f, conn) = seeded().await;
    let adults = f
        .person
        .scope("adults")
        .order_by("name", Direction::Asc)
        .all(&conn)
        .await
        .unwrap();
    assert_eq!(names(&adults), vec!["Bob O'Neill", "Cid", "Dee"]);

    let err = f.person.scope("retired").all(&conn).await.unwrap_err();
    assert!(err.is_mapping());
}

#[tokio::test]
async fn bulk_update_and_delete_respect_filters() {
    let (f, conn) = seeded().await;
    let touched = f
        .person
        .scope("adults")
        .update_all(&conn, Assignments::new().set("email", "adult@example.com"))
        .await
        .unwrap();
    assert_eq!(touched, 3);

    let ann = f.person.where_eq("name", "Ann").first(&conn).await.unwrap().unwrap();
    assert!(ann.get("email").is_none_or(Value::is_null));

    let removed = f
        .person
        .where_sql("age < ?", persist::params![30])
        .delete_all(&conn)
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(f.person.count(&conn).await.unwrap(), 2);

    let err = f
        .person
        .query()
        .update_all(&conn, Assignments::new())
        .await
        .unwrap_err();
    assert!(err.is_mapping());
}

#[tokio::test]
async fn bulk_delete_through_a_join() {
    let (f, conn) = seeded().await;
    let cid = f.person.where_eq("name", "Cid").first(&conn).await.unwrap().unwrap();
    save_phone(&conn, &f.phone, &cid, "555-0100").await;
    save_phone(&conn, &f.phone, &cid, "555-0101").await;

    let removed = f
        .person
        .query()
        .join("phones")
        .where_eq("phones.number", "555-0101")
        .delete_all(&conn)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(f.person.where_eq("name", "Cid").first(&conn).await.unwrap().is_none());
    // Phones are left in place.
    assert_eq!(f.phone.count(&conn).await.unwrap(), 2);
}

#[tokio::test]
async fn count_with_join_counts_roots_once() {
    let (f, conn) = seeded().await;
    let dee = f.person.where_eq("name", "Dee").first(&conn).await.unwrap().unwrap();
    for n in ["1", "2", "3"] {
        save_phone(&conn, &f.phone, &dee, n).await;
    }
    let owners = f.person.query().join("phones").count(&conn).await.unwrap();
    assert_eq!(owners, 1);
    let everyone = f.person.query().left_join("phones").count(&conn).await.unwrap();
    assert_eq!(everyone, 4);
}
