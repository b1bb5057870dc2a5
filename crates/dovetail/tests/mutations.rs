use dovetail::testing::{row, ScriptedSession};
use dovetail::{
    ColumnType, Mutator, ObjectTree, PrimaryKeyColumnValues, RowFilter, RowOwnership, Session,
    SqlLiteral, StealPolicy,
};

use pretty_assertions::assert_eq;
use serde_json::json;

fn flat_tree() -> ObjectTree {
    ObjectTree::builder("actorList", "sakila", "actor")
        .caps(true, true, true)
        .col("actorId", ColumnType::Integer, |c| {
            c.column("actor_id").primary_key().auto_increment()
        })
        .col("firstName", ColumnType::String, |c| c.column("first_name"))
        .build()
        .unwrap()
}

fn actor_tree() -> ObjectTree {
    actor_tree_with_caps(true, true, true)
}

/// The actor/film_actor/film shape, with the given capabilities on the
/// junction table. The film table itself stays read-only.
fn actor_tree_with_caps(insert: bool, update: bool, delete: bool) -> ObjectTree {
    ObjectTree::builder("actorInfo", "sakila", "actor")
        .caps(true, true, true)
        .col("actorId", ColumnType::Integer, |c| {
            c.column("actor_id").primary_key().auto_increment()
        })
        .col("firstName", ColumnType::String, |c| c.column("first_name"))
        .col("lastName", ColumnType::String, |c| c.column("last_name"))
        .join("films", "sakila", "film_actor", |j| {
            j.to_many()
                .mapping("actor_id", "actor_id")
                .caps(insert, update, delete)
                .col("filmId", ColumnType::Integer, |c| c.column("film_id").primary_key())
                .join("film", "sakila", "film", |j| {
                    j.unnest()
                        .referenced()
                        .mapping("film_id", "film_id")
                        .col("title", ColumnType::String, |c| c)
                })
        })
        .build()
        .unwrap()
}

fn person_tree() -> ObjectTree {
    ObjectTree::builder("personInfo", "app", "person")
        .caps(true, true, true)
        .col("personId", ColumnType::Integer, |c| {
            c.column("person_id").primary_key().auto_increment()
        })
        .col("name", ColumnType::String, |c| c)
        .join("passport", "app", "passport", |j| {
            j.mapping("person_id", "person_id")
                .caps(true, true, true)
                .col("passportId", ColumnType::Integer, |c| {
                    c.column("passport_id").primary_key()
                })
                .col("code", ColumnType::String, |c| c)
        })
        .build()
        .unwrap()
}

const FLAT_ONE: &str = "SELECT JSON_OBJECT('actorId', t0.`actor_id`, \
    'firstName', t0.`first_name`) AS doc \
    FROM `sakila`.`actor` AS t0 WHERE t0.`actor_id` = 7;";

const ACTOR_ONE: &str = "SELECT JSON_OBJECT('actorId', t0.`actor_id`, \
    'firstName', t0.`first_name`, 'lastName', t0.`last_name`, 'films', \
    (SELECT COALESCE(JSON_ARRAYAGG(t1.doc), JSON_ARRAY()) FROM \
    (SELECT JSON_OBJECT('filmId', t2.`film_id`, 'title', t3.`title`) AS doc \
    FROM `sakila`.`film_actor` AS t2 \
    LEFT JOIN `sakila`.`film` AS t3 ON t3.`film_id` = t2.`film_id` \
    WHERE t2.`actor_id` = t0.`actor_id` ORDER BY t2.`film_id`) AS t1)) AS doc \
    FROM `sakila`.`actor` AS t0 WHERE t0.`actor_id` = 7;";

const PERSON_ONE: &str = "SELECT JSON_OBJECT('personId', t0.`person_id`, \
    'name', t0.`name`, 'passport', \
    (SELECT JSON_OBJECT('passportId', t1.`passport_id`, 'code', t1.`code`) \
    FROM `app`.`passport` AS t1 WHERE t1.`person_id` = t0.`person_id` LIMIT 1)) AS doc \
    FROM `app`.`person` AS t0 WHERE t0.`person_id` = 5;";

// --- inserts ----------------------------------------------------------

#[test]
fn insert_fills_generated_keys() {
    let tree = flat_tree();
    let mut session = ScriptedSession::new().expect_insert(
        "INSERT INTO `sakila`.`actor` (`first_name`) VALUES ('PENELOPE');",
        42,
    );
    let key = Mutator::new(&tree)
        .insert(&mut session, &json!({"firstName": "PENELOPE"}))
        .unwrap();
    assert_eq!(key.get("actor_id").map(SqlLiteral::as_str), Some("42"));
    session.finish();
}

#[test]
fn insert_accepts_explicit_generated_keys() {
    let tree = flat_tree();
    let mut session = ScriptedSession::new().expect_execute(
        "INSERT INTO `sakila`.`actor` (`actor_id`, `first_name`) VALUES (5, 'ED');",
        1,
    );
    let key = Mutator::new(&tree)
        .insert(&mut session, &json!({"actorId": 5, "firstName": "ED"}))
        .unwrap();
    assert_eq!(key.get("actor_id").map(SqlLiteral::as_str), Some("5"));
    session.finish();
}

#[test]
fn insert_walks_children_after_the_parent() {
    let tree = actor_tree();
    let doc = json!({
        "firstName": "PENELOPE",
        "lastName": "GUINESS",
        "films": [{"filmId": 2, "title": "ACADEMY DINOSAUR"}],
    });
    let mut session = ScriptedSession::new()
        .expect_insert(
            "INSERT INTO `sakila`.`actor` (`first_name`, `last_name`) VALUES ('PENELOPE', 'GUINESS');",
            7,
        )
        .expect_query(
            "SELECT `title` FROM `sakila`.`film` WHERE `film_id` = 2;",
            vec![row(["ACADEMY DINOSAUR"])],
        )
        .expect_execute(
            "INSERT INTO `sakila`.`film_actor` (`film_id`, `actor_id`) VALUES (2, 7);",
            1,
        );
    let key = Mutator::new(&tree).insert(&mut session, &doc).unwrap();
    assert_eq!(key.get("actor_id").map(SqlLiteral::as_str), Some("7"));
    session.finish();
}

#[test]
fn insert_rejects_missing_readonly_referenced_rows() {
    let tree = actor_tree();
    let doc = json!({
        "firstName": "PENELOPE",
        "lastName": "GUINESS",
        "films": [{"filmId": 99, "title": "UNRELEASED"}],
    });
    let mut session = ScriptedSession::new()
        .expect_insert(
            "INSERT INTO `sakila`.`actor` (`first_name`, `last_name`) VALUES ('PENELOPE', 'GUINESS');",
            7,
        )
        .expect_query("SELECT `title` FROM `sakila`.`film` WHERE `film_id` = 99;", vec![]);
    let err = Mutator::new(&tree).insert(&mut session, &doc).unwrap_err();
    assert!(err.is_duality_view());
    assert_eq!(err.to_string(), "Table `film` does not allow INSERT");
    session.finish();
}

#[test]
fn insert_rejects_drift_on_readonly_referenced_rows() {
    let tree = actor_tree();
    let doc = json!({
        "firstName": "PENELOPE",
        "lastName": "GUINESS",
        "films": [{"filmId": 2, "title": "RETITLED"}],
    });
    let mut session = ScriptedSession::new()
        .expect_insert(
            "INSERT INTO `sakila`.`actor` (`first_name`, `last_name`) VALUES ('PENELOPE', 'GUINESS');",
            7,
        )
        .expect_query(
            "SELECT `title` FROM `sakila`.`film` WHERE `film_id` = 2;",
            vec![row(["ACADEMY DINOSAUR"])],
        );
    let err = Mutator::new(&tree).insert(&mut session, &doc).unwrap_err();
    assert!(err.is_duality_view());
    assert_eq!(err.to_string(), "Table `film` does not allow UPDATE");
    session.finish();
}

#[test]
fn insert_requires_the_capability() {
    let tree = ObjectTree::builder("actorList", "sakila", "actor")
        .caps(false, true, true)
        .col("actorId", ColumnType::Integer, |c| {
            c.column("actor_id").primary_key().auto_increment()
        })
        .col("firstName", ColumnType::String, |c| c.column("first_name"))
        .build()
        .unwrap();
    let mut session = ScriptedSession::new();
    let err = Mutator::new(&tree)
        .insert(&mut session, &json!({"firstName": "PENELOPE"}))
        .unwrap_err();
    assert!(err.is_duality_view());
    assert_eq!(err.to_string(), "Table `actor` does not allow INSERT");
    session.finish();
}

/// Accepts anything and remembers what ran, for statements that embed
/// generated values.
struct RecordingSession {
    statements: Vec<String>,
}

impl Session for RecordingSession {
    fn execute(&mut self, sql: &str) -> dovetail::Result<u64> {
        self.statements.push(sql.to_string());
        Ok(1)
    }

    fn query(
        &mut self,
        _sql: &str,
        _on_row: &mut dyn FnMut(&[Option<String>]) -> dovetail::Result<()>,
    ) -> dovetail::Result<()> {
        Ok(())
    }

    fn last_insert_id(&mut self) -> dovetail::Result<u64> {
        Ok(0)
    }
}

#[test]
fn binary_keys_generate_reversed_uuids() {
    let tree = ObjectTree::builder("notes", "app", "note")
        .caps(true, true, true)
        .col("noteId", ColumnType::Binary, |c| {
            c.column("note_id").primary_key().rev_uuid()
        })
        .col("body", ColumnType::String, |c| c)
        .build()
        .unwrap();
    let mut session = RecordingSession { statements: vec![] };
    let doc = json!({"body": "first"});

    let key = Mutator::new(&tree).insert(&mut session, &doc).unwrap();
    let rendered = key.get("note_id").unwrap().as_str().to_string();
    // X'..' holding 16 bytes.
    assert!(rendered.starts_with("X'"));
    assert!(rendered.ends_with('\''));
    assert_eq!(rendered.len(), 35);

    let again = Mutator::new(&tree).insert(&mut session, &doc).unwrap();
    assert_ne!(again.get("note_id").unwrap().as_str(), rendered);

    assert_eq!(session.statements.len(), 2);
    assert!(session.statements[0]
        .starts_with("INSERT INTO `app`.`note` (`body`, `note_id`) VALUES ('first', X'"));
}

// --- scalar updates ---------------------------------------------------

#[test]
fn update_changes_only_drifted_scalars() {
    let tree = flat_tree();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let mut session = ScriptedSession::new()
        .expect_query(FLAT_ONE, vec![row([r#"{"actorId": 7, "firstName": "PENELOPE"}"#])])
        .expect_execute(
            "UPDATE `sakila`.`actor` SET `first_name` = 'PEN' WHERE `actor_id` = 7;",
            1,
        );
    let updated = Mutator::new(&tree)
        .update(&mut session, &key, &json!({"actorId": 7, "firstName": "PEN"}))
        .unwrap();
    assert_eq!(
        updated.and_then(|k| k.get("actor_id").map(|v| v.as_str().to_string())),
        Some("7".to_string())
    );
    session.finish();
}

#[test]
fn update_with_no_drift_issues_no_statements() {
    let tree = flat_tree();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let mut session = ScriptedSession::new()
        .expect_query(FLAT_ONE, vec![row([r#"{"actorId": 7, "firstName": "PENELOPE"}"#])]);
    let updated = Mutator::new(&tree)
        .update(&mut session, &key, &json!({"actorId": 7, "firstName": "PENELOPE"}))
        .unwrap();
    assert!(updated.is_some());
    session.finish();
}

#[test]
fn update_misses_as_none() {
    let tree = flat_tree();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let mut session = ScriptedSession::new().expect_query(FLAT_ONE, vec![]);
    let updated = Mutator::new(&tree)
        .update(&mut session, &key, &json!({"actorId": 7, "firstName": "PEN"}))
        .unwrap();
    assert!(updated.is_none());
    session.finish();
}

#[test]
fn update_rejects_key_changes() {
    let tree = flat_tree();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let mut session = ScriptedSession::new();
    let err = Mutator::new(&tree)
        .update(&mut session, &key, &json!({"actorId": 8, "firstName": "PEN"}))
        .unwrap_err();
    assert!(err.is_json_input());
    assert_eq!(err.to_string(), "ID `actor_id` cannot be changed");
    session.finish();
}

#[test]
fn update_requires_the_capability_for_changes() {
    let tree = ObjectTree::builder("actorList", "sakila", "actor")
        .caps(true, false, true)
        .col("actorId", ColumnType::Integer, |c| {
            c.column("actor_id").primary_key().auto_increment()
        })
        .col("firstName", ColumnType::String, |c| c.column("first_name"))
        .build()
        .unwrap();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let mut session = ScriptedSession::new()
        .expect_query(FLAT_ONE, vec![row([r#"{"actorId": 7, "firstName": "PENELOPE"}"#])]);
    let err = Mutator::new(&tree)
        .update(&mut session, &key, &json!({"actorId": 7, "firstName": "PEN"}))
        .unwrap_err();
    assert!(err.is_duality_view());
    assert_eq!(err.to_string(), "Table `actor` does not allow UPDATE");
    session.finish();
}

#[test]
fn readonly_round_trips_are_accepted() {
    let tree = ObjectTree::builder("actorList", "sakila", "actor")
        .caps(true, false, true)
        .col("actorId", ColumnType::Integer, |c| {
            c.column("actor_id").primary_key().auto_increment()
        })
        .col("firstName", ColumnType::String, |c| c.column("first_name"))
        .build()
        .unwrap();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let mut session = ScriptedSession::new()
        .expect_query(FLAT_ONE, vec![row([r#"{"actorId": 7, "firstName": "PENELOPE"}"#])]);
    let updated = Mutator::new(&tree)
        .update(&mut session, &key, &json!({"actorId": 7, "firstName": "PENELOPE"}))
        .unwrap();
    assert!(updated.is_some());
    session.finish();
}

#[test]
fn no_update_fields_reject_changes() {
    let tree = ObjectTree::builder("accounts", "app", "account")
        .caps(true, true, true)
        .col("accountId", ColumnType::Integer, |c| c.column("account_id").primary_key())
        .col("createdAt", ColumnType::String, |c| c.column("created_at").no_update())
        .col("name", ColumnType::String, |c| c)
        .build()
        .unwrap();
    let key = PrimaryKeyColumnValues::single("account_id", SqlLiteral::from(5i64));
    let mut session = ScriptedSession::new().expect_query(
        "SELECT JSON_OBJECT('accountId', t0.`account_id`, 'createdAt', t0.`created_at`, \
         'name', t0.`name`) AS doc FROM `app`.`account` AS t0 WHERE t0.`account_id` = 5;",
        vec![row([r#"{"accountId": 5, "createdAt": "2020-01-01", "name": "ACME"}"#])],
    );
    let doc = json!({"accountId": 5, "createdAt": "2024-06-01", "name": "ACME"});
    let err = Mutator::new(&tree).update(&mut session, &key, &doc).unwrap_err();
    assert!(err.is_duality_view());
    assert_eq!(err.to_string(), "Field `createdAt` in table `account` cannot be updated");
    session.finish();
}

#[test]
fn no_update_fields_accept_round_trips() {
    let tree = ObjectTree::builder("accounts", "app", "account")
        .caps(true, true, true)
        .col("accountId", ColumnType::Integer, |c| c.column("account_id").primary_key())
        .col("createdAt", ColumnType::String, |c| c.column("created_at").no_update())
        .col("name", ColumnType::String, |c| c)
        .build()
        .unwrap();
    let key = PrimaryKeyColumnValues::single("account_id", SqlLiteral::from(5i64));
    let mut session = ScriptedSession::new()
        .expect_query(
            "SELECT JSON_OBJECT('accountId', t0.`account_id`, 'createdAt', t0.`created_at`, \
             'name', t0.`name`) AS doc FROM `app`.`account` AS t0 WHERE t0.`account_id` = 5;",
            vec![row([r#"{"accountId": 5, "createdAt": "2020-01-01", "name": "ACME"}"#])],
        )
        .expect_execute("UPDATE `app`.`account` SET `name` = 'ACME CORP' WHERE `account_id` = 5;", 1);
    let doc = json!({"accountId": 5, "createdAt": "2020-01-01", "name": "ACME CORP"});
    let updated = Mutator::new(&tree).update(&mut session, &key, &doc).unwrap();
    assert!(updated.is_some());
    session.finish();
}

// --- to-many reconciliation -------------------------------------------

#[test]
fn to_many_arrays_reconcile_by_element_key() {
    let tree = actor_tree();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let before = r#"{"actorId": 7, "firstName": "PENELOPE", "lastName": "GUINESS", "films": [{"filmId": 1, "title": "OLD HAT"}, {"filmId": 2, "title": "KEPT REEL"}]}"#;
    let after = json!({
        "actorId": 7,
        "firstName": "PENELOPE",
        "lastName": "GUINESS",
        "films": [
            {"filmId": 2, "title": "KEPT REEL"},
            {"filmId": 3, "title": "NEW BLOOD"},
        ],
    });
    let mut session = ScriptedSession::new()
        .expect_query(ACTOR_ONE, vec![row([before])])
        .expect_query("SELECT `film_id` FROM `sakila`.`film_actor` WHERE `film_id` = 3;", vec![])
        .expect_query(
            "SELECT `title` FROM `sakila`.`film` WHERE `film_id` = 3;",
            vec![row(["NEW BLOOD"])],
        )
        .expect_execute(
            "INSERT INTO `sakila`.`film_actor` (`film_id`, `actor_id`) VALUES (3, 7);",
            1,
        )
        .expect_execute("DELETE FROM `sakila`.`film_actor` WHERE `film_id` = 1;", 1);
    let updated = Mutator::new(&tree).update(&mut session, &key, &after).unwrap();
    assert!(updated.is_some());
    session.finish();
}

#[test]
fn leftover_rows_are_abandoned_without_delete() {
    let tree = actor_tree_with_caps(true, true, false);
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let before = r#"{"actorId": 7, "firstName": "PENELOPE", "lastName": "GUINESS", "films": [{"filmId": 1, "title": "OLD HAT"}]}"#;
    let after = json!({
        "actorId": 7,
        "firstName": "PENELOPE",
        "lastName": "GUINESS",
        "films": [],
    });
    let mut session = ScriptedSession::new()
        .expect_query(ACTOR_ONE, vec![row([before])])
        .expect_execute(
            "UPDATE `sakila`.`film_actor` SET `actor_id` = NULL WHERE `film_id` = 1;",
            1,
        );
    let updated = Mutator::new(&tree).update(&mut session, &key, &after).unwrap();
    assert!(updated.is_some());
    session.finish();
}

#[test]
fn leftover_rows_error_without_delete_or_update() {
    let tree = actor_tree_with_caps(true, false, false);
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let before = r#"{"actorId": 7, "firstName": "PENELOPE", "lastName": "GUINESS", "films": [{"filmId": 1, "title": "OLD HAT"}]}"#;
    let after = json!({
        "actorId": 7,
        "firstName": "PENELOPE",
        "lastName": "GUINESS",
        "films": [],
    });
    let mut session = ScriptedSession::new().expect_query(ACTOR_ONE, vec![row([before])]);
    let err = Mutator::new(&tree).update(&mut session, &key, &after).unwrap_err();
    assert!(err.is_duality_view());
    assert_eq!(err.to_string(), "Table `film_actor` does not allow DELETE");
    session.finish();
}

#[test]
fn adopted_rows_repoint_when_allowed() {
    let tree = actor_tree();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let before = r#"{"actorId": 7, "firstName": "PENELOPE", "lastName": "GUINESS", "films": []}"#;
    let after = json!({
        "actorId": 7,
        "firstName": "PENELOPE",
        "lastName": "GUINESS",
        "films": [{"filmId": 3, "title": "NEW BLOOD"}],
    });
    let mut session = ScriptedSession::new()
        .expect_query(ACTOR_ONE, vec![row([before])])
        .expect_query(
            "SELECT `film_id` FROM `sakila`.`film_actor` WHERE `film_id` = 3;",
            vec![row(["3"])],
        )
        .expect_execute(
            "UPDATE `sakila`.`film_actor` SET `actor_id` = 7 WHERE `film_id` = 3;",
            1,
        );
    let updated = Mutator::new(&tree).update(&mut session, &key, &after).unwrap();
    assert!(updated.is_some());
    session.finish();
}

#[test]
fn adopted_rows_error_when_denied() {
    let tree = actor_tree();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let before = r#"{"actorId": 7, "firstName": "PENELOPE", "lastName": "GUINESS", "films": []}"#;
    let after = json!({
        "actorId": 7,
        "firstName": "PENELOPE",
        "lastName": "GUINESS",
        "films": [{"filmId": 3, "title": "NEW BLOOD"}],
    });
    let mut session = ScriptedSession::new()
        .expect_query(ACTOR_ONE, vec![row([before])])
        .expect_query(
            "SELECT `film_id` FROM `sakila`.`film_actor` WHERE `film_id` = 3;",
            vec![row(["3"])],
        );
    let err = Mutator::new(&tree)
        .steal_policy(StealPolicy::Deny)
        .update(&mut session, &key, &after)
        .unwrap_err();
    assert!(err.is_duality_view());
    assert_eq!(
        err.to_string(),
        "Row `3` of table `film_actor` belongs to another document"
    );
    session.finish();
}

#[test]
fn reduced_arrays_reconcile_as_sets() {
    let tree = ObjectTree::builder("actorFilms", "sakila", "actor")
        .caps(true, true, true)
        .col("actorId", ColumnType::Integer, |c| c.column("actor_id").primary_key())
        .join("filmIds", "sakila", "film_actor", |j| {
            j.to_many()
                .mapping("actor_id", "actor_id")
                .caps(true, false, true)
                .reduce_to("filmId")
                .col("filmId", ColumnType::Integer, |c| c.column("film_id").primary_key())
        })
        .build()
        .unwrap();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let mut session = ScriptedSession::new()
        .expect_query(
            "SELECT JSON_OBJECT('actorId', t0.`actor_id`, 'filmIds', \
             (SELECT COALESCE(JSON_ARRAYAGG(t1.v), JSON_ARRAY()) FROM \
             (SELECT t2.`film_id` AS v FROM `sakila`.`film_actor` AS t2 \
             WHERE t2.`actor_id` = t0.`actor_id` ORDER BY t2.`film_id`) AS t1)) AS doc \
             FROM `sakila`.`actor` AS t0 WHERE t0.`actor_id` = 7;",
            vec![row([r#"{"actorId": 7, "filmIds": [1, 2]}"#])],
        )
        .expect_execute(
            "INSERT INTO `sakila`.`film_actor` (`actor_id`, `film_id`) VALUES (7, 3);",
            1,
        )
        .expect_execute(
            "DELETE FROM `sakila`.`film_actor` WHERE `actor_id` = 7 AND `film_id` = 1;",
            1,
        );
    let updated = Mutator::new(&tree)
        .update(&mut session, &key, &json!({"actorId": 7, "filmIds": [2, 3]}))
        .unwrap();
    assert!(updated.is_some());
    session.finish();
}

// --- owned to-one children --------------------------------------------

#[test]
fn owned_children_update_in_place() {
    let tree = person_tree();
    let key = PrimaryKeyColumnValues::single("person_id", SqlLiteral::from(5i64));
    let before = r#"{"personId": 5, "name": "MARTA", "passport": {"passportId": 10, "code": "P-OLD"}}"#;
    let after = json!({
        "personId": 5,
        "name": "MARTA",
        "passport": {"passportId": 10, "code": "P-NEW"},
    });
    let mut session = ScriptedSession::new()
        .expect_query(PERSON_ONE, vec![row([before])])
        .expect_execute(
            "UPDATE `app`.`passport` SET `code` = 'P-NEW' WHERE `passport_id` = 10;",
            1,
        );
    let updated = Mutator::new(&tree).update(&mut session, &key, &after).unwrap();
    assert!(updated.is_some());
    session.finish();
}

#[test]
fn owned_children_replace_on_key_change() {
    let tree = person_tree();
    let key = PrimaryKeyColumnValues::single("person_id", SqlLiteral::from(5i64));
    let before = r#"{"personId": 5, "name": "MARTA", "passport": {"passportId": 10, "code": "P-OLD"}}"#;
    let after = json!({
        "personId": 5,
        "name": "MARTA",
        "passport": {"passportId": 11, "code": "P-NEW"},
    });
    let mut session = ScriptedSession::new()
        .expect_query(PERSON_ONE, vec![row([before])])
        .expect_execute("DELETE FROM `app`.`passport` WHERE `passport_id` = 10;", 1)
        .expect_execute(
            "INSERT INTO `app`.`passport` (`passport_id`, `code`, `person_id`) VALUES (11, 'P-NEW', 5);",
            1,
        );
    let updated = Mutator::new(&tree).update(&mut session, &key, &after).unwrap();
    assert!(updated.is_some());
    session.finish();
}

#[test]
fn null_clears_an_owned_child() {
    let tree = person_tree();
    let key = PrimaryKeyColumnValues::single("person_id", SqlLiteral::from(5i64));
    let before = r#"{"personId": 5, "name": "MARTA", "passport": {"passportId": 10, "code": "P-OLD"}}"#;
    let after = json!({"personId": 5, "name": "MARTA", "passport": null});
    let mut session = ScriptedSession::new()
        .expect_query(PERSON_ONE, vec![row([before])])
        .expect_execute("DELETE FROM `app`.`passport` WHERE `passport_id` = 10;", 1);
    let updated = Mutator::new(&tree).update(&mut session, &key, &after).unwrap();
    assert!(updated.is_some());
    session.finish();
}

// --- deletes ----------------------------------------------------------

#[test]
fn delete_cascades_through_the_tree() {
    let tree = actor_tree();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let before = r#"{"actorId": 7, "firstName": "PENELOPE", "lastName": "GUINESS", "films": [{"filmId": 1, "title": "OLD HAT"}, {"filmId": 2, "title": "KEPT REEL"}]}"#;
    let mut session = ScriptedSession::new()
        .expect_query(ACTOR_ONE, vec![row([before])])
        .expect_execute("DELETE FROM `sakila`.`film_actor` WHERE `film_id` = 1;", 1)
        .expect_execute("DELETE FROM `sakila`.`film_actor` WHERE `film_id` = 2;", 1)
        .expect_execute("DELETE FROM `sakila`.`actor` WHERE `actor_id` = 7;", 1);
    let removed = Mutator::new(&tree).delete(&mut session, &key).unwrap();
    assert_eq!(removed, 1);
    session.finish();
}

#[test]
fn delete_removes_owned_children_first() {
    let tree = person_tree();
    let key = PrimaryKeyColumnValues::single("person_id", SqlLiteral::from(5i64));
    let before = r#"{"personId": 5, "name": "MARTA", "passport": {"passportId": 10, "code": "P-OLD"}}"#;
    let mut session = ScriptedSession::new()
        .expect_query(PERSON_ONE, vec![row([before])])
        .expect_execute("DELETE FROM `app`.`passport` WHERE `passport_id` = 10;", 1)
        .expect_execute("DELETE FROM `app`.`person` WHERE `person_id` = 5;", 1);
    let removed = Mutator::new(&tree).delete(&mut session, &key).unwrap();
    assert_eq!(removed, 1);
    session.finish();
}

#[test]
fn delete_skips_subtrees_without_the_capability() {
    let tree = actor_tree_with_caps(true, true, false);
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let before = r#"{"actorId": 7, "firstName": "PENELOPE", "lastName": "GUINESS", "films": [{"filmId": 1, "title": "OLD HAT"}]}"#;
    let mut session = ScriptedSession::new()
        .expect_query(ACTOR_ONE, vec![row([before])])
        .expect_execute("DELETE FROM `sakila`.`actor` WHERE `actor_id` = 7;", 1);
    let removed = Mutator::new(&tree).delete(&mut session, &key).unwrap();
    assert_eq!(removed, 1);
    session.finish();
}

#[test]
fn delete_requires_the_root_capability() {
    let tree = ObjectTree::builder("actorList", "sakila", "actor")
        .caps(true, true, false)
        .col("actorId", ColumnType::Integer, |c| {
            c.column("actor_id").primary_key().auto_increment()
        })
        .col("firstName", ColumnType::String, |c| c.column("first_name"))
        .build()
        .unwrap();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let mut session = ScriptedSession::new();
    let err = Mutator::new(&tree).delete(&mut session, &key).unwrap_err();
    assert!(err.is_duality_view());
    assert_eq!(err.to_string(), "Table `actor` does not allow DELETE");
    session.finish();
}

#[test]
fn delete_misses_as_zero() {
    let tree = flat_tree();
    let key = PrimaryKeyColumnValues::single("actor_id", SqlLiteral::from(7i64));
    let mut session = ScriptedSession::new().expect_query(FLAT_ONE, vec![]);
    let removed = Mutator::new(&tree).delete(&mut session, &key).unwrap();
    assert_eq!(removed, 0);
    session.finish();
}

struct PenelopesOnly;

impl RowFilter for PenelopesOnly {
    fn render(&self, root_alias: &str) -> Option<String> {
        Some(format!("{root_alias}.`first_name` = 'PENELOPE'"))
    }
}

#[test]
fn delete_matching_removes_every_hit() {
    let tree = flat_tree();
    let mut session = ScriptedSession::new()
        .expect_query(
            "SELECT JSON_OBJECT('actorId', t0.`actor_id`, 'firstName', t0.`first_name`) AS doc \
             FROM `sakila`.`actor` AS t0 WHERE (t0.`first_name` = 'PENELOPE');",
            vec![
                row([r#"{"actorId": 1, "firstName": "PENELOPE"}"#]),
                row([r#"{"actorId": 9, "firstName": "PENELOPE"}"#]),
            ],
        )
        .expect_execute("DELETE FROM `sakila`.`actor` WHERE `actor_id` = 1;", 1)
        .expect_execute("DELETE FROM `sakila`.`actor` WHERE `actor_id` = 9;", 1);
    let removed = Mutator::new(&tree)
        .delete_matching(&mut session, &PenelopesOnly)
        .unwrap();
    assert_eq!(removed, 2);
    session.finish();
}

// --- row ownership ----------------------------------------------------

#[test]
fn ownership_scopes_every_statement() {
    let tree = ObjectTree::builder("notes", "app", "note")
        .caps(true, true, true)
        .col("noteId", ColumnType::Integer, |c| {
            c.column("note_id").primary_key().auto_increment()
        })
        .col("body", ColumnType::String, |c| c)
        .col("ownerId", ColumnType::Binary, |c| c.column("owner_id").owner().disabled())
        .build()
        .unwrap();
    let ownership = RowOwnership::binary(&[0x11, 0x22]);
    let mutator = Mutator::new(&tree).ownership(Some(&ownership));
    let one = "SELECT JSON_OBJECT('noteId', t0.`note_id`, 'body', t0.`body`) AS doc \
               FROM `app`.`note` AS t0 WHERE t0.`note_id` = 9 AND t0.`owner_id` = X'1122';";

    let mut session = ScriptedSession::new().expect_insert(
        "INSERT INTO `app`.`note` (`body`, `owner_id`) VALUES ('mine', X'1122');",
        9,
    );
    let key = mutator.insert(&mut session, &json!({"body": "mine"})).unwrap();
    assert_eq!(key.get("note_id").map(SqlLiteral::as_str), Some("9"));
    session.finish();

    let mut session = ScriptedSession::new()
        .expect_query(one, vec![row([r#"{"noteId": 9, "body": "mine"}"#])])
        .expect_execute(
            "UPDATE `app`.`note` SET `body` = 'edited' WHERE `note_id` = 9 AND `owner_id` = X'1122';",
            1,
        );
    let updated = mutator
        .update(&mut session, &key, &json!({"noteId": 9, "body": "edited"}))
        .unwrap();
    assert!(updated.is_some());
    session.finish();

    let mut session = ScriptedSession::new()
        .expect_query(one, vec![row([r#"{"noteId": 9, "body": "edited"}"#])])
        .expect_execute(
            "DELETE FROM `app`.`note` WHERE `note_id` = 9 AND `owner_id` = X'1122';",
            1,
        );
    let removed = mutator.delete(&mut session, &key).unwrap();
    assert_eq!(removed, 1);
    session.finish();
}

#[test]
fn insert_discards_client_supplied_owner_values() {
    let tree = ObjectTree::builder("notes", "app", "note")
        .caps(true, true, true)
        .col("noteId", ColumnType::Integer, |c| {
            c.column("note_id").primary_key().auto_increment()
        })
        .col("body", ColumnType::String, |c| c)
        .col("ownerId", ColumnType::Binary, |c| c.column("owner_id").owner())
        .build()
        .unwrap();
    let ownership = RowOwnership::binary(&[0x11, 0x22]);
    let mutator = Mutator::new(&tree).ownership(Some(&ownership));

    let mut session = ScriptedSession::new().expect_insert(
        "INSERT INTO `app`.`note` (`body`, `owner_id`) VALUES ('mine', X'1122');",
        9,
    );
    mutator
        .insert(&mut session, &json!({"body": "mine", "ownerId": "3q2+7w=="}))
        .unwrap();
    session.finish();
}

// --- document checks --------------------------------------------------

#[test]
fn check_accepts_a_complete_document() {
    let tree = actor_tree();
    let doc = json!({
        "firstName": "PENELOPE",
        "lastName": "GUINESS",
        "films": [{"filmId": 2, "title": "ACADEMY DINOSAUR"}],
    });
    Mutator::new(&tree).check(&doc, false).unwrap();
}

#[test]
fn array_elements_must_be_objects() {
    let tree = ObjectTree::builder("cityInfo", "sakila", "city")
        .caps(true, true, true)
        .col("country_id", ColumnType::Integer, |c| c.primary_key())
        .join("nest", "sakila", "city_part", |j| {
            j.to_many()
                .mapping("country_id", "country_id")
                .col("partId", ColumnType::Integer, |c| c.column("part_id").primary_key())
        })
        .build()
        .unwrap();
    let err = Mutator::new(&tree)
        .check(&json!({"country_id": 123, "nest": [1234]}), false)
        .unwrap_err();
    assert!(err.is_json_input());
    assert_eq!(err.to_string(), "Invalid document in JSON input for table `city`");
}

#[test]
fn unknown_fields_are_rejected() {
    let tree = flat_tree();
    let err = Mutator::new(&tree)
        .check(&json!({"firstName": "PENELOPE", "nickname": "PEN"}), false)
        .unwrap_err();
    assert!(err.is_json_input());
    assert_eq!(
        err.to_string(),
        "Unknown field `nickname` in JSON input for table `actor`"
    );
}

#[test]
fn duplicate_element_keys_are_rejected() {
    let tree = actor_tree();
    let doc = json!({
        "firstName": "PENELOPE",
        "lastName": "GUINESS",
        "films": [
            {"filmId": 2, "title": "KEPT REEL"},
            {"filmId": 2, "title": "KEPT REEL"},
        ],
    });
    let err = Mutator::new(&tree).check(&doc, false).unwrap_err();
    assert!(err.is_json_input());
    assert_eq!(err.to_string(), "Duplicate keys `2` for table `film_actor`");
}

#[test]
fn missing_required_fields_fail_inserts() {
    let tree = flat_tree();
    let err = Mutator::new(&tree).check(&json!({}), false).unwrap_err();
    assert!(err.is_json_input());
    assert_eq!(err.to_string(), "Field `firstName` missing");
}

#[test]
fn updates_always_name_the_key() {
    let tree = flat_tree();
    let err = Mutator::new(&tree)
        .check(&json!({"firstName": "PENELOPE"}), true)
        .unwrap_err();
    assert!(err.is_json_input());
    assert_eq!(err.to_string(), "ID `actor_id` missing");
}
