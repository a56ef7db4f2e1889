use super::*;
use crate::model::{AssociationOptions, Column, ModelDef, Schema, SchemaBuilder};
use crate::query::{Direction, Query};
use crate::sql::{Action, SqlTree};
use pretty_assertions::assert_eq;

fn schema() -> Schema {
    let mut b = SchemaBuilder::new();
    let person = b
        .define(
            "Person",
            ModelDef::new()
                .column("name", Column::string())
                .column("age", Column::integer()),
        )
        .unwrap();
    let phone = b
        .define("Phone", ModelDef::new().column("number", Column::string()))
        .unwrap();
    let company = b
        .define("Company", ModelDef::new().column("name", Column::string()))
        .unwrap();
    b.define(
        "Item",
        ModelDef::new().column("order", Column::integer()),
    )
    .unwrap();
    b.define("Empty", ModelDef::new()).unwrap();
    b.has_many(person, phone).unwrap();
    b.has_many_with(person, company, AssociationOptions::new().through("CompanyPerson"))
        .unwrap();
    b.build()
}

fn model(name: &str) -> Model {
    schema().model(name).unwrap()
}

fn sql(query: Query, dialect: Dialect) -> String {
    query.to_statement(dialect).unwrap().sql
}

fn with_action(query: &Query, action: Action) -> SqlTree {
    let mut tree = query.tree().clone();
    tree.action = action;
    tree
}

const PEOPLE: &str = "SELECT t0.name AS c0, t0.age AS c1, t0.id AS c2";

#[test]
fn select_all_columns() {
    let person = model("Person");
    assert_eq!(
        sql(person.query(), Dialect::Sqlite),
        format!("{PEOPLE} FROM People AS t0")
    );
    assert_eq!(
        sql(person.query(), Dialect::Oracle),
        format!("{PEOPLE} FROM People t0")
    );
}

#[test]
fn raw_predicates_are_rewritten_and_numbered() {
    let person = model("Person");
    let query = || {
        person
            .where_sql("age > ? AND name = ?", crate::params![20, "Bob"])
            .order_by("name", Direction::Asc)
    };

    assert_eq!(
        sql(query(), Dialect::Sqlite),
        format!("{PEOPLE} FROM People AS t0 WHERE (t0.age > ? AND t0.name = ?) ORDER BY c0 ASC")
    );
    let stmt = query().to_statement(Dialect::Postgres).unwrap();
    assert_eq!(
        stmt.sql,
        format!("{PEOPLE} FROM People AS t0 WHERE (t0.age > $1 AND t0.name = $2) ORDER BY c0 ASC")
    );
    assert_eq!(stmt.params, vec![Value::Integer(20), Value::from("Bob")]);
}

#[test]
fn placeholder_count_must_match_params() {
    let person = model("Person");
    let err = person
        .where_sql("age > ? AND age < ?", crate::params![20])
        .to_statement(Dialect::Sqlite)
        .unwrap_err();
    assert!(err.is_mapping());
}

#[test]
fn equality_null_and_in_predicates() {
    let person = model("Person");
    assert_eq!(
        sql(person.where_eq("name", Value::Null), Dialect::Sqlite),
        format!("{PEOPLE} FROM People AS t0 WHERE t0.name IS NULL")
    );
    assert_eq!(
        sql(person.query().where_in("age", [21, 30]), Dialect::Postgres),
        format!("{PEOPLE} FROM People AS t0 WHERE t0.age IN ($1, $2)")
    );
    assert_eq!(
        sql(
            person.query().where_in("age", Vec::<i64>::new()).where_eq("name", "Bob"),
            Dialect::Sqlite
        ),
        format!("{PEOPLE} FROM People AS t0 WHERE 1 = 0 AND t0.name = ?")
    );
}

#[test]
fn pagination_per_dialect() {
    let person = model("Person");
    let page = || person.query().order_by("name", Direction::Asc).limit_offset(10, 5);
    let ordered = format!("{PEOPLE} FROM People AS t0 ORDER BY c0 ASC");

    assert_eq!(sql(page(), Dialect::Sqlite), format!("{ordered} LIMIT 10 OFFSET 5"));
    assert_eq!(sql(page(), Dialect::Mysql), format!("{ordered} LIMIT 10 OFFSET 5"));
    assert_eq!(sql(page(), Dialect::Postgres), format!("{ordered} LIMIT 10 OFFSET 5"));
    assert_eq!(
        sql(page(), Dialect::Oracle),
        format!(
            "SELECT * FROM (SELECT persist_page.*, ROWNUM persist_rnum FROM \
             ({PEOPLE} FROM People t0 ORDER BY c0 ASC) persist_page WHERE ROWNUM <= 15) \
             WHERE persist_rnum > 5"
        )
    );
}

#[test]
fn oracle_row_bound_saturates() {
    let person = model("Person");
    assert_eq!(
        sql(person.query().limit(u64::MAX).offset(1), Dialect::Oracle),
        format!(
            "SELECT * FROM (SELECT persist_page.*, ROWNUM persist_rnum FROM \
             ({PEOPLE} FROM People t0) persist_page WHERE ROWNUM <= {}) \
             WHERE persist_rnum > 1",
            u64::MAX
        )
    );
}

#[test]
fn include_pages_over_root_keys() {
    let person = model("Person");
    let joined = "FROM People AS t0 LEFT JOIN Phones AS t1 ON t1.person_id = t0.id";
    let query = person
        .include("phones")
        .order_by("name", Direction::Asc)
        .limit(2);
    assert_eq!(
        sql(query, Dialect::Sqlite),
        format!(
            "{PEOPLE}, t1.number AS c3, t1.id AS c4, t1.person_id AS c5 {joined} \
             WHERE t0.id IN (SELECT c0 FROM (SELECT t0.id AS c0 {joined} \
             GROUP BY t0.id ORDER BY MIN(t0.name) ASC LIMIT 2) AS persist_page_ids) \
             ORDER BY c0 ASC"
        )
    );

    let filtered = person
        .include("phones")
        .where_eq("age", 21)
        .order_by("phones.number", Direction::Desc)
        .offset(1);
    let statement = filtered.to_statement(Dialect::Postgres).unwrap();
    assert_eq!(
        statement.sql,
        format!(
            "{PEOPLE}, t1.number AS c3, t1.id AS c4, t1.person_id AS c5 {joined} \
             WHERE t0.age = $1 AND t0.id IN (SELECT c0 FROM (SELECT t0.id AS c0 {joined} \
             WHERE t0.age = $2 GROUP BY t0.id ORDER BY MAX(t1.number) DESC OFFSET 1) \
             AS persist_page_ids) ORDER BY c3 DESC"
        )
    );
    assert_eq!(statement.params, vec![Value::Integer(21), Value::Integer(21)]);
}

#[test]
fn root_aggregate_under_join_counts_each_root_once() {
    let person = model("Person");
    let driver = Driver::new(Dialect::Sqlite);
    let query = person.include("phones").where_sql("phones.number = ?", crate::params!["555"]);

    let sum = with_action(&query, Action::Sum("age".into()));
    assert_eq!(
        driver.compile(&sum).unwrap().sql,
        "SELECT SUM(t0.age) AS c0 FROM People AS t0 WHERE t0.id IN (SELECT t0.id \
         FROM People AS t0 LEFT JOIN Phones AS t1 ON t1.person_id = t0.id \
         WHERE (t1.number = ?))"
    );

    let max = with_action(&query, Action::Max("phones.number".into()));
    assert_eq!(
        driver.compile(&max).unwrap().sql,
        "SELECT MAX(t1.number) AS c0 FROM People AS t0 \
         LEFT JOIN Phones AS t1 ON t1.person_id = t0.id WHERE (t1.number = ?)"
    );
}

#[test]
fn offset_without_limit() {
    let person = model("Person");
    let base = format!("{PEOPLE} FROM People AS t0");
    assert_eq!(sql(person.query().offset(3), Dialect::Sqlite), format!("{base} LIMIT -1 OFFSET 3"));
    assert_eq!(
        sql(person.query().offset(3), Dialect::Mysql),
        format!("{base} LIMIT 18446744073709551615 OFFSET 3")
    );
    assert_eq!(sql(person.query().offset(3), Dialect::Postgres), format!("{base} OFFSET 3"));
    assert_eq!(sql(person.query().limit(2), Dialect::Postgres), format!("{base} LIMIT 2"));
}

#[test]
fn include_left_joins_and_projects() {
    let person = model("Person");
    assert_eq!(
        sql(person.include("phones"), Dialect::Sqlite),
        format!(
            "{PEOPLE}, t1.number AS c3, t1.id AS c4, t1.person_id AS c5 \
             FROM People AS t0 LEFT JOIN Phones AS t1 ON t1.person_id = t0.id"
        )
    );
}

#[test]
fn many_to_many_include_goes_through_link_table() {
    let person = model("Person");
    assert_eq!(
        sql(person.include("companies"), Dialect::Postgres),
        format!(
            "{PEOPLE}, t2.name AS c3, t2.id AS c4 FROM People AS t0 \
             LEFT JOIN CompanyPerson AS t1 ON t1.person_id = t0.id \
             LEFT JOIN Companies AS t2 ON t2.id = t1.company_id"
        )
    );
}

#[test]
fn order_by_joined_column_adds_projection() {
    let person = model("Person");
    let query = person
        .query()
        .join("phones")
        .order_by("phones.number", Direction::Desc);
    assert_eq!(
        sql(query, Dialect::Sqlite),
        format!(
            "{PEOPLE}, t1.number AS c3 FROM People AS t0 \
             INNER JOIN Phones AS t1 ON t1.person_id = t0.id ORDER BY c3 DESC"
        )
    );
}

#[test]
fn count_with_join_is_distinct() {
    let person = model("Person");
    let driver = Driver::new(Dialect::Sqlite);

    let plain = with_action(&person.query().limit(3), Action::Count);
    assert_eq!(
        driver.compile(&plain).unwrap().sql,
        "SELECT COUNT(*) AS c0 FROM People AS t0"
    );

    let joined = person
        .query()
        .join("phones")
        .where_sql("phones.number = ?", crate::params!["555"]);
    let tree = with_action(&joined, Action::Count);
    assert_eq!(
        driver.compile(&tree).unwrap().sql,
        "SELECT COUNT(DISTINCT t0.id) AS c0 FROM People AS t0 \
         INNER JOIN Phones AS t1 ON t1.person_id = t0.id WHERE (t1.number = ?)"
    );
}

#[test]
fn aggregates_ignore_order_and_limit() {
    let person = model("Person");
    let query = person.query().order_by("name", Direction::Asc).limit(1);
    let driver = Driver::new(Dialect::Postgres);
    let sum = with_action(&query, Action::Sum("age".into()));
    assert_eq!(
        driver.compile(&sum).unwrap().sql,
        "SELECT SUM(t0.age) AS c0 FROM People AS t0"
    );
    let min = with_action(&query, Action::Min("nickname".into()));
    assert!(driver.compile(&min).unwrap_err().is_mapping());
}

#[test]
fn bulk_delete_uses_key_subquery() {
    let person = model("Person");
    let driver = Driver::new(Dialect::Sqlite);

    let all = with_action(&person.query(), Action::Delete);
    assert_eq!(driver.compile(&all).unwrap().sql, "DELETE FROM People");

    let bobs = with_action(&person.where_eq("name", "Bob"), Action::Delete);
    assert_eq!(
        driver.compile(&bobs).unwrap().sql,
        "DELETE FROM People WHERE id IN (SELECT t0.id AS c0 FROM People AS t0 WHERE t0.name = ?)"
    );
    assert_eq!(
        Driver::new(Dialect::Mysql).compile(&bobs).unwrap().sql,
        "DELETE FROM People WHERE id IN (SELECT c0 FROM \
         (SELECT t0.id AS c0 FROM People AS t0 WHERE t0.name = ?) AS persist_ids)"
    );
}

#[test]
fn bulk_update_binds_assignments_first() {
    let person = model("Person");
    let query = person.where_sql("age < ?", crate::params![21]);
    let tree = with_action(&query, Action::Update(Assignments::new().set("age", 22)));
    let stmt = Driver::new(Dialect::Postgres).compile(&tree).unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE People SET age = $1 WHERE id IN \
         (SELECT t0.id AS c0 FROM People AS t0 WHERE (t0.age < $2))"
    );
    assert_eq!(stmt.params, vec![Value::Integer(22), Value::Integer(21)]);

    let empty = with_action(&query, Action::Update(Assignments::new()));
    assert!(Driver::new(Dialect::Sqlite).compile(&empty).unwrap_err().is_mapping());
}

#[test]
fn insert_reads_back_generated_key() {
    let person = model("Person");
    let bob = person.create(crate::values! { "name" => "Bob", "age" => 21 });

    let sqlite = Driver::new(Dialect::Sqlite).insert(&bob).unwrap();
    assert_eq!(sqlite.sql, "INSERT INTO People (name, age) VALUES (?, ?)");
    assert_eq!(sqlite.id_retrieval, Some(IdRetrieval::LastInsertId));
    assert_eq!(sqlite.params, vec![Value::from("Bob"), Value::Integer(21)]);

    let pg = Driver::new(Dialect::Postgres).insert(&bob).unwrap();
    assert_eq!(pg.sql, "INSERT INTO People (name, age) VALUES ($1, $2) RETURNING id");
    assert_eq!(pg.id_retrieval, Some(IdRetrieval::Returning));

    let oracle = Driver::new(Dialect::Oracle).insert(&bob).unwrap();
    assert_eq!(
        oracle.sql,
        "INSERT INTO People (name, age) VALUES (:1, :2) RETURNING id INTO :3"
    );
    assert_eq!(oracle.id_retrieval, Some(IdRetrieval::OutParam));
}

#[test]
fn insert_with_explicit_key_keeps_it() {
    let person = model("Person");
    let mut bob = person.create(crate::values! { "name" => "Bob" });
    bob.set("id", 9);
    let stmt = Driver::new(Dialect::Postgres).insert(&bob).unwrap();
    assert_eq!(stmt.sql, "INSERT INTO People (name, age, id) VALUES ($1, $2, $3)");
    assert_eq!(stmt.params, vec![Value::from("Bob"), Value::Null, Value::Integer(9)]);
    assert_eq!(stmt.id_retrieval, None);
}

#[test]
fn insert_without_columns() {
    let empty = model("Empty").create(crate::values! {});
    assert_eq!(
        Driver::new(Dialect::Sqlite).insert(&empty).unwrap().sql,
        "INSERT INTO Empties DEFAULT VALUES"
    );
    assert_eq!(
        Driver::new(Dialect::Mysql).insert(&empty).unwrap().sql,
        "INSERT INTO Empties () VALUES ()"
    );
    assert_eq!(
        Driver::new(Dialect::Oracle).insert(&empty).unwrap().sql,
        "INSERT INTO Empties (id) VALUES (DEFAULT) RETURNING id INTO :1"
    );
}

#[test]
fn update_and_delete_by_key() {
    let person = model("Person");
    let mut bob = person.create(crate::values! { "name" => "Bob", "age" => 21 });

    let err = Driver::new(Dialect::Sqlite).update(&bob).unwrap_err();
    assert!(err.is_mapping());

    bob.set("id", 1);
    let update = Driver::new(Dialect::Sqlite).update(&bob).unwrap();
    assert_eq!(update.sql, "UPDATE People SET name = ?, age = ? WHERE id = ?");
    assert_eq!(
        update.params,
        vec![Value::from("Bob"), Value::Integer(21), Value::Integer(1)]
    );

    let delete = Driver::new(Dialect::Postgres).delete(&bob).unwrap();
    assert_eq!(delete.sql, "DELETE FROM People WHERE id = $1");

    let empty = model("Empty");
    let mut e = empty.create(crate::values! {});
    e.set("id", 4);
    assert_eq!(
        Driver::new(Dialect::Sqlite).update(&e).unwrap().sql,
        "UPDATE Empties SET id = id WHERE id = ?"
    );
}

#[test]
fn update_by_id_writes_selected_columns() {
    let person = model("Person");
    let stmt = Driver::new(Dialect::Mysql)
        .update_by_id(&person, Value::Integer(3), &Assignments::new().set("age", 40))
        .unwrap();
    assert_eq!(stmt.sql, "UPDATE People SET age = ? WHERE id = ?");

    let err = Driver::new(Dialect::Mysql)
        .update_by_id(&person, Value::Integer(3), &Assignments::new().set("height", 2))
        .unwrap_err();
    assert!(err.is_mapping());
}

#[test]
fn join_rows() {
    let driver = Driver::new(Dialect::Postgres);
    let insert = driver
        .insert_join_row("CompanyPerson", "person_id", 1.into(), "company_id", 2.into())
        .unwrap();
    assert_eq!(
        insert.sql,
        "INSERT INTO CompanyPerson (person_id, company_id) VALUES ($1, $2)"
    );
    let delete = driver
        .delete_join_rows("CompanyPerson", "person_id", 1.into())
        .unwrap();
    assert_eq!(delete.sql, "DELETE FROM CompanyPerson WHERE person_id = $1");
}

#[test]
fn reserved_names_are_quoted() {
    let item = model("Item");
    let query = || item.where_sql("order > ?", crate::params![1]);
    assert_eq!(
        sql(query(), Dialect::Sqlite),
        "SELECT t0.\"order\" AS c0, t0.id AS c1 FROM Items AS t0 WHERE (t0.\"order\" > ?)"
    );
    assert_eq!(
        sql(query(), Dialect::Mysql),
        "SELECT t0.`order` AS c0, t0.id AS c1 FROM Items AS t0 WHERE (t0.`order` > ?)"
    );
    assert_eq!(
        sql(query(), Dialect::Oracle),
        "SELECT t0.order AS c0, t0.id AS c1 FROM Items t0 WHERE (t0.order > :1)"
    );
}

#[test]
fn escape_rules() {
    assert_eq!(Dialect::Postgres.escape("name"), "name");
    assert_eq!(Dialect::Postgres.escape("user"), "\"user\"");
    assert_eq!(Dialect::Sqlite.escape("odd\"name"), "\"odd\"\"name\"");
    assert_eq!(Dialect::Mysql.escape("select"), "`select`");
    assert_eq!(Dialect::Oracle.escape("select"), "select");
}

#[test]
fn transaction_statements() {
    assert_eq!(Dialect::Sqlite.begin_sql(), Some("BEGIN TRANSACTION"));
    assert_eq!(Dialect::Postgres.begin_sql(), Some("BEGIN"));
    assert_eq!(Dialect::Mysql.begin_sql(), Some("START TRANSACTION"));
    assert_eq!(Dialect::Oracle.begin_sql(), None);
    assert_eq!(Dialect::Sqlite.commit_sql(), "COMMIT TRANSACTION");
    assert_eq!(Dialect::Oracle.rollback_sql(), "ROLLBACK");
}

#[test]
fn caller_placeholders_follow_dialect() {
    let sql = "SELECT * FROM People WHERE name = ? AND note <> 'why?' AND age > ?";
    assert_eq!(Driver::new(Dialect::Sqlite).normalize_placeholders(sql), sql);
    assert_eq!(
        Driver::new(Dialect::Postgres).normalize_placeholders(sql),
        "SELECT * FROM People WHERE name = $1 AND note <> 'why?' AND age > $2"
    );
    assert_eq!(
        Driver::new(Dialect::Oracle).normalize_placeholders(sql),
        "SELECT * FROM People WHERE name = :1 AND note <> 'why?' AND age > :2"
    );
}

#[test]
fn oracle_rows_are_normalized() {
    let columns: Arc<[String]> = ["C0", "C1", "PERSIST_RNUM"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let rows = vec![Row::new(columns, vec![1.into(), "Bob".into(), 1.into()])];
    let rows = Driver::new(Dialect::Oracle).normalize_rows(rows);
    assert_eq!(rows[0].columns(), ["c0".to_string(), "c1".to_string()]);
    assert_eq!(rows[0].values(), [Value::Integer(1), Value::from("Bob")]);
}

#[test]
fn create_table_per_dialect() {
    let schema = schema();
    let person = schema.model("Person").unwrap();
    assert_eq!(
        Driver::new(Dialect::Sqlite).create_table(&person).unwrap().sql,
        "CREATE TABLE IF NOT EXISTS People (name TEXT, age INTEGER, id INTEGER PRIMARY KEY AUTOINCREMENT)"
    );
    assert_eq!(
        Driver::new(Dialect::Postgres).create_table(&person).unwrap().sql,
        "CREATE TABLE IF NOT EXISTS People (name TEXT, age BIGINT, id BIGSERIAL PRIMARY KEY)"
    );
    assert_eq!(
        Driver::new(Dialect::Mysql).create_table(&person).unwrap().sql,
        "CREATE TABLE IF NOT EXISTS People (name TEXT, age BIGINT, id BIGINT AUTO_INCREMENT PRIMARY KEY)"
    );
    assert!(Driver::new(Dialect::Oracle).create_table(&person).is_err());

    let link = &schema.join_tables()[0];
    assert_eq!(
        Driver::new(Dialect::Sqlite).create_join_table(link).unwrap().sql,
        "CREATE TABLE IF NOT EXISTS CompanyPerson (person_id INTEGER, company_id INTEGER)"
    );
}
