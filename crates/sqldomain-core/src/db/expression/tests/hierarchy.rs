use crate::{
    db::domain::Operator,
    test_fixtures::{MockOrm, compile_sql, registry},
    value::Value,
};

fn partner_sql(orm: &MockOrm, domain: &str) -> (String, Vec<Value>) {
    compile_sql(&registry(), orm, "res.partner", domain).expect("compile")
}

fn children(orm: MockOrm, model: &str, parents: &[i64], ids: &[i64]) -> MockOrm {
    orm.with_leaf_search(
        model,
        "parent_id",
        Operator::In,
        Value::ids(parents.iter().copied()),
        ids,
    )
}

fn ints(ids: &[i64]) -> Vec<Value> {
    ids.iter().copied().map(Value::Int).collect()
}

#[test]
fn child_of_collects_descendants() {
    let orm = children(MockOrm::new(), "res.partner", &[3], &[4, 5]);
    let orm = children(orm, "res.partner", &[4, 5], &[6]);

    assert_eq!(
        partner_sql(&orm, "id child_of 3"),
        (
            r#"("res_partner"."id" in (?,?,?,?))"#.to_string(),
            ints(&[3, 4, 5, 6])
        )
    );
}

#[test]
fn self_many2one_child_of_matches_on_id() {
    let orm = children(MockOrm::new(), "res.partner", &[3], &[4]);

    assert_eq!(
        partner_sql(&orm, "parent_id child_of 3"),
        (
            r#"("res_partner"."id" in (?,?))"#.to_string(),
            ints(&[3, 4])
        )
    );
}

#[test]
fn negated_child_of_wraps_membership() {
    let orm = children(MockOrm::new(), "res.partner", &[3], &[4]);

    assert_eq!(
        partner_sql(&orm, "not id child_of 3").0,
        r#"(NOT ("res_partner"."id" in (?,?)))"#
    );
}

#[test]
fn parent_of_collects_ancestors() {
    let orm = MockOrm::new()
        .with_parent("res.partner", 5, 3)
        .with_parent("res.partner", 3, 1);

    assert_eq!(
        partner_sql(&orm, "id parent_of 5"),
        (
            r#"("res_partner"."id" in (?,?,?))"#.to_string(),
            ints(&[5, 3, 1])
        )
    );
    assert_eq!(
        orm.calls(),
        vec![
            "read_ids res.partner parent_id [5]".to_string(),
            "read_ids res.partner parent_id [3]".to_string(),
            "read_ids res.partner parent_id [1]".to_string(),
        ]
    );
}

#[test]
fn cyclic_hierarchies_terminate() {
    let orm = MockOrm::new()
        .with_parent("res.partner", 1, 2)
        .with_parent("res.partner", 2, 1);
    assert_eq!(partner_sql(&orm, "id parent_of 1").1, ints(&[1, 2]));

    let orm = children(MockOrm::new(), "res.partner", &[1], &[2]);
    let orm = children(orm, "res.partner", &[2], &[1]);
    assert_eq!(partner_sql(&orm, "id child_of 1").1, ints(&[1, 2]));
}

#[test]
fn child_of_on_other_model_uses_its_hierarchy() {
    let orm = children(MockOrm::new(), "res.company", &[1], &[2]);

    assert_eq!(
        partner_sql(&orm, "company_id child_of 1"),
        (
            r#"("res_partner"."company_id" in (?,?))"#.to_string(),
            ints(&[1, 2])
        )
    );
}

#[test]
fn child_of_on_many2many_selects_through_relation() {
    let orm = children(MockOrm::new(), "res.partner.category", &[7], &[8]);

    assert_eq!(
        partner_sql(&orm, "category_id child_of 7"),
        (
            r#"("res_partner"."id" in (SELECT "partner_id" FROM "res_partner_res_partner_category_rel" WHERE "category_id" IN (?,?)))"#
                .to_string(),
            ints(&[7, 8])
        )
    );
}

#[test]
fn child_of_name_resolves_roots_first() {
    let orm = MockOrm::new().with_names("res.partner", "Acme", &[1]);

    assert_eq!(partner_sql(&orm, "id child_of 'Acme'").1, ints(&[1]));
    assert_eq!(
        orm.calls().first().map(String::as_str),
        Some("name_search res.partner 'Acme' ilike")
    );
}

#[test]
fn child_of_nothing_is_false() {
    assert_eq!(
        partner_sql(&MockOrm::new(), "id child_of []"),
        ("FALSE".to_string(), vec![])
    );
    assert_eq!(
        partner_sql(&MockOrm::new(), "company_id child_of 'missing'").0,
        "FALSE"
    );
}
