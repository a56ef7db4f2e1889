//! Includes, joins and association accessors against in-memory SQLite.

mod common;

use common::{connect, fixture, names, save_person, save_phone};
use persist::{Direction, Instance, Related};

fn numbers(person: &Instance) -> Vec<&str> {
    person
        .many("phones")
        .iter()
        .filter_map(|p| p.get_str("number"))
        .collect()
}

#[tokio::test]
async fn include_groups_phones_under_people() {
    let f = fixture();
    let conn = connect(&f.schema).await;

    let bob = save_person(&conn, &f.person, "Bob O'Neill", 21).await;
    let john = save_person(&conn, &f.person, "John", 30).await;
    save_phone(&conn, &f.phone, &bob, "555-0002").await;
    save_phone(&conn, &f.phone, &bob, "555-0001").await;
    save_phone(&conn, &f.phone, &john, "555-0100").await;
    save_person(&conn, &f.person, "Zed", 50).await;

    let people = f
        .person
        .include("phones")
        .order_by("name", Direction::Asc)
        .order_by("phones.number", Direction::Asc)
        .all(&conn)
        .await
        .unwrap();

    assert_eq!(names(&people), vec!["Bob O'Neill", "John", "Zed"]);
    assert_eq!(numbers(&people[0]), vec!["555-0001", "555-0002"]);
    assert_eq!(numbers(&people[1]), vec!["555-0100"]);
    assert!(numbers(&people[2]).is_empty());
    assert!(matches!(people[2].related("phones"), Some(Related::Many(_))));
}

#[tokio::test]
async fn include_from_the_owning_side() {
    let f = fixture();
    let conn = connect(&f.schema).await;
    let bob = save_person(&conn, &f.person, "Bob", 21).await;
    save_phone(&conn, &f.phone, &bob, "555-0001").await;

    let phones = f.phone.include("person").all(&conn).await.unwrap();
    assert_eq!(phones.len(), 1);
    let owner = phones[0].one("person").unwrap();
    assert_eq!(owner.get_str("name"), Some("Bob"));
    assert_eq!(owner.id(), bob.id());
}

#[tokio::test]
async fn where_on_joined_association() {
    let f = fixture();
    let conn = connect(&f.schema).await;
    let bob = save_person(&conn, &f.person, "Bob", 21).await;
    let john = save_person(&conn, &f.person, "John", 30).await;
    save_phone(&conn, &f.phone, &bob, "555-0001").await;
    save_phone(&conn, &f.phone, &bob, "555-0002").await;
    save_phone(&conn, &f.phone, &john, "555-0100").await;

    let owners = f
        .person
        .query()
        .join("phones")
        .where_sql("phones.number LIKE ?", persist::params!["555-000%"])
        .count(&conn)
        .await
        .unwrap();
    assert_eq!(owners, 1);

    let found = f
        .person
        .query()
        .join("phones")
        .where_eq("phones.number", "555-0100")
        .all(&conn)
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["John"]);
}

#[tokio::test]
async fn many_to_many_links_are_visible_from_both_sides() {
    let f = fixture();
    let conn = connect(&f.schema).await;
    let bob = save_person(&conn, &f.person, "Bob", 21).await;
    let john = save_person(&conn, &f.person, "John", 30).await;

    let mut acme = f.company.create(persist::values! { "name" => "Acme" });
    acme.set_many("people", vec![bob.clone(), john.clone()]).unwrap();
    acme.save(&conn).await.unwrap();

    let mut initech = f.company.create(persist::values! { "name" => "Initech" });
    initech.save(&conn).await.unwrap();
    let mut bob = f.person.get_by_id(&conn, bob.id().cloned()).await.unwrap().unwrap();
    bob.set_many("companies", vec![acme.clone(), initech.clone()]).unwrap();
    bob.save(&conn).await.unwrap();

    let companies = f
        .person
        .include("companies")
        .where_eq("name", "Bob")
        .order_by("companies.name", Direction::Asc)
        .first(&conn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(names(companies.many("companies")), vec!["Acme", "Initech"]);

    let acme = f
        .company
        .include("people")
        .where_eq("name", "Acme")
        .order_by("people.name", Direction::Asc)
        .first(&conn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(names(acme.many("people")), vec!["Bob", "John"]);

    // Re-saving with a smaller collection rewrites the link rows.
    let mut john = f.person.get_by_id(&conn, john.id().cloned()).await.unwrap().unwrap();
    john.set_many("companies", Vec::new()).unwrap();
    john.save(&conn).await.unwrap();
    let links = conn
        .run_sql("SELECT COUNT(*) AS n FROM CompanyPerson", &[])
        .await
        .unwrap();
    assert_eq!(links[0].get("n").and_then(|v| v.as_i64()), Some(2));
}

#[tokio::test]
async fn unsaved_link_target_fails_the_save() {
    let f = fixture();
    let conn = connect(&f.schema).await;
    let mut bob = f.person.create(persist::values! { "name" => "Bob" });
    let ghost = f.company.create(persist::values! { "name" => "Ghost" });
    bob.set_many("companies", vec![ghost]).unwrap();
    let err = bob.save(&conn).await.unwrap_err();
    assert!(err.is_mapping());
}

#[tokio::test]
async fn accessors_load_lazily() {
    let f = fixture();
    let conn = connect(&f.schema).await;
    let bob = save_person(&conn, &f.person, "Bob", 21).await;
    save_phone(&conn, &f.phone, &bob, "555-0001").await;
    save_phone(&conn, &f.phone, &bob, "555-0002").await;

    let mut acme = f.company.create(persist::values! { "name" => "Acme" });
    acme.set_many("people", vec![bob.clone()]).unwrap();
    acme.save(&conn).await.unwrap();

    let loaded = f.person.get_by_id(&conn, bob.id().cloned()).await.unwrap().unwrap();
    assert!(loaded.has_connection());
    assert!(loaded.has_many("phones").unwrap().items().is_empty());

    let phones = loaded.has_many("phones").unwrap().load().await.unwrap();
    assert_eq!(phones.len(), 2);

    let companies = loaded.has_many("companies").unwrap().load().await.unwrap();
    assert_eq!(names(&companies), vec!["Acme"]);

    let owner = phones[0].has_one("person").unwrap().load().await.unwrap().unwrap();
    assert_eq!(owner.get_str("name"), Some("Bob"));

    // A free-standing instance never queries.
    let stranger = f.person.create(persist::values! { "name" => "Nobody" });
    assert!(stranger.has_many("phones").unwrap().load().await.unwrap().is_empty());
}

#[tokio::test]
async fn first_with_include_keeps_all_related_rows() {
    let f = fixture();
    let conn = connect(&f.schema).await;
    let bob = save_person(&conn, &f.person, "Bob", 21).await;
    for n in ["1", "2", "3"] {
        save_phone(&conn, &f.phone, &bob, n).await;
    }
    let first = f.person.include("phones").first(&conn).await.unwrap().unwrap();
    assert_eq!(first.many("phones").len(), 3);
}
