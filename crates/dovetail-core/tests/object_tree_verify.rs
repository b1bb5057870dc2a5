use dovetail_core::{ColumnType, Error, ObjectTree, TreeBuilder};

use pretty_assertions::assert_eq;

fn build_err(builder: TreeBuilder) -> Error {
    let err = builder.build().unwrap_err();
    assert!(err.is_config(), "expected a config error, got: {err}");
    err
}

#[test]
fn object_without_fields() {
    let err = build_err(ObjectTree::builder("v", "s", "t"));
    assert_eq!(err.to_string(), "Object for table `t` has no fields");
}

#[test]
fn duplicate_field_names() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("name", ColumnType::String, |c| c)
            .col("name", ColumnType::String, |c| c.column("other")),
    );
    assert_eq!(err.to_string(), "Duplicate field `name` in table `t`");
}

#[test]
fn primary_key_must_sit_on_the_objects_own_table() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("id", ColumnType::Integer, |c| c.primary_key())
            .join("other", "s", "u", |j| {
                j.unnest()
                    .mapping("t_id", "id")
                    .col("uId", ColumnType::Integer, |c| c.primary_key())
            }),
    );
    assert_eq!(
        err.to_string(),
        "Primary key field `uId` must come from table `t`"
    );
}

#[test]
fn writable_table_needs_a_primary_key() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .caps(true, false, false)
            .col("name", ColumnType::String, |c| c),
    );
    assert_eq!(
        err.to_string(),
        "Table `t` is writable but maps no primary key"
    );
}

#[test]
fn at_most_one_owner_field() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("a", ColumnType::Binary, |c| c.owner())
            .col("b", ColumnType::Binary, |c| c.owner()),
    );
    assert_eq!(err.to_string(), "Table `t` maps more than one owner field");
}

#[test]
fn auto_increment_requires_an_integer_column() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("name", ColumnType::String, |c| c.auto_increment()),
    );
    assert_eq!(
        err.to_string(),
        "Field `name` cannot auto increment: not an integer column"
    );
}

#[test]
fn generated_uuids_require_a_binary_column() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("id", ColumnType::Integer, |c| c.rev_uuid()),
    );
    assert_eq!(
        err.to_string(),
        "Field `id` cannot hold a generated UUID: not a binary column"
    );
}

#[test]
fn joins_need_a_column_mapping() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("id", ColumnType::Integer, |c| c.primary_key())
            .join("other", "s", "u", |j| {
                j.col("name", ColumnType::String, |c| c)
            }),
    );
    assert_eq!(err.to_string(), "Join for table `u` has no column mapping");
}

#[test]
fn reduce_target_must_be_declared() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("id", ColumnType::Integer, |c| c.primary_key())
            .join("tags", "s", "tag", |j| {
                j.to_many()
                    .mapping("t_id", "id")
                    .reduce_to("name")
                    .col("tagId", ColumnType::Integer, |c| c.primary_key())
            }),
    );
    assert_eq!(
        err.to_string(),
        "Reduce target `name` is not a field of table `tag`"
    );
}

#[test]
fn reduce_target_cannot_be_a_nested_field() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("id", ColumnType::Integer, |c| c.primary_key())
            .join("tags", "s", "tag", |j| {
                j.to_many()
                    .mapping("t_id", "id")
                    .reduce_to("meta")
                    .col("tagId", ColumnType::Integer, |c| c.primary_key())
                    .join("meta", "s", "tag_meta", |j| {
                        j.mapping("tag_id", "tag_id")
                            .col("metaId", ColumnType::Integer, |c| c.primary_key())
                    })
            }),
    );
    assert_eq!(
        err.to_string(),
        "Reduce target `meta` is not a field of table `tag`"
    );
}

#[test]
fn to_many_joins_cannot_unnest() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("id", ColumnType::Integer, |c| c.primary_key())
            .join("tags", "s", "tag", |j| {
                j.to_many()
                    .unnest()
                    .mapping("t_id", "id")
                    .col("name", ColumnType::String, |c| c)
            }),
    );
    assert_eq!(
        err.to_string(),
        "Cannot unnest the to-many join for table `tag`"
    );
}

#[test]
fn to_many_joins_cannot_be_referenced() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("id", ColumnType::Integer, |c| c.primary_key())
            .join("tags", "s", "tag", |j| {
                j.to_many()
                    .referenced()
                    .mapping("t_id", "id")
                    .col("name", ColumnType::String, |c| c)
            }),
    );
    assert_eq!(
        err.to_string(),
        "Cannot mark the to-many join for table `tag` as referenced"
    );
}

#[test]
fn joins_cannot_nest_under_an_unnested_table() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("id", ColumnType::Integer, |c| c.primary_key())
            .join("other", "s", "u", |j| {
                j.unnest().mapping("t_id", "id").join("deeper", "s", "w", |j| {
                    j.mapping("u_id", "u_id").col("x", ColumnType::String, |c| c)
                })
            }),
    );
    assert_eq!(
        err.to_string(),
        "Cannot nest a join under the unnested table `u`"
    );
}

#[test]
fn unnest_reduce_declares_exactly_the_reduced_field() {
    let err = build_err(
        ObjectTree::builder("v", "s", "t")
            .col("id", ColumnType::Integer, |c| c.primary_key())
            .join("country", "s", "country", |j| {
                j.unnest()
                    .referenced()
                    .mapping("country_id", "country_id")
                    .reduce_to("name")
                    .col("name", ColumnType::String, |c| c)
                    .col("iso", ColumnType::String, |c| c)
            }),
    );
    assert_eq!(
        err.to_string(),
        "Reduced join for table `country` must declare the reduced field `name` and nothing else"
    );
}
