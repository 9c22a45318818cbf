use crate::{
    config::{AliasOverflow, CompilerConfig},
    db::{
        dialect::Postgres,
        domain::parse,
        expression::{AliasPolicy, CompileEnv, Context, TableRef, generate_table_alias},
        query::{Connection, Query, QueryError, inherits_join_calc, order_calc, where_calc},
    },
    error::Error,
    model::Registry,
    test_fixtures::{MockOrm, registry},
    value::Value,
};

struct Fixture {
    registry: Registry,
    orm: MockOrm,
    context: Context,
    config: CompilerConfig,
}

impl Fixture {
    fn new() -> Self {
        Self {
            registry: registry(),
            orm: MockOrm::new(),
            context: Context::default(),
            config: CompilerConfig::default(),
        }
    }

    fn without_active_test() -> Self {
        Self {
            context: Context::default().with_active_test(false),
            ..Self::new()
        }
    }

    fn env(&self) -> CompileEnv<'_> {
        CompileEnv::new(
            &self.registry,
            &Postgres,
            &self.orm,
            &self.context,
            &self.config,
        )
    }

    fn query(&self, model: &str, domain: &str) -> Query {
        let model = self.registry.model(model).expect("model");
        let domain = parse(domain).expect("parse");
        where_calc(&self.env(), model, &domain, &[]).expect("where_calc")
    }

    fn order(&self, model: &str, spec: &str) -> Result<(Vec<String>, Query), Error> {
        let mut query = self.query(model, "");
        let model = self.registry.model(model)?;
        let terms = order_calc(&self.env(), model, spec, &mut query)?;

        Ok((terms, query))
    }
}

fn connection<'a>(lhs: &'a str, table: &'a str, link: &'a str) -> Connection<'a> {
    Connection {
        lhs_alias: lhs,
        table,
        lhs_column: link,
        column: "id",
        link,
    }
}

//
// where_calc
//

#[test]
fn active_test_prepends_active_leaf() {
    let fixture = Fixture::new();
    let query = fixture.query("res.partner", "name = 'a'");

    assert_eq!(
        query.where_clause(),
        [r#"(("res_partner"."active" = ?) AND ("res_partner"."name" = ?))"#]
    );
    assert_eq!(query.where_params(), [Value::Bool(true), Value::text("a")]);
    assert_eq!(query.tables(), [TableRef::bare("res_partner")]);
}

#[test]
fn active_test_respects_explicit_active_leaf() {
    let fixture = Fixture::new();
    let query = fixture.query("res.partner", "active = False");

    assert_eq!(
        query.where_clause(),
        [r#"("res_partner"."active" IS NULL OR "res_partner"."active" = false)"#]
    );
}

#[test]
fn active_test_applies_to_empty_domain() {
    let fixture = Fixture::new();

    assert_eq!(
        fixture.query("res.partner", "").where_clause(),
        [r#"("res_partner"."active" = ?)"#]
    );

    let company = fixture.query("res.company", "");
    assert!(company.where_clause().is_empty());
    assert_eq!(company.tables(), [TableRef::bare("res_company")]);
}

#[test]
fn active_test_can_be_disabled() {
    let fixture = Fixture::without_active_test();

    assert_eq!(
        fixture.query("res.partner", "name = 'a'").where_clause(),
        [r#"("res_partner"."name" = ?)"#]
    );

    let fixture = Fixture {
        config: CompilerConfig {
            active_test: false,
            ..CompilerConfig::default()
        },
        ..Fixture::new()
    };
    assert!(fixture.query("res.partner", "").where_clause().is_empty());
}

#[test]
fn where_calc_binds_parameters_before_compiling() {
    let fixture = Fixture::without_active_test();
    let model = fixture.registry.model("res.partner").expect("model");
    let domain = parse("name = ? or id in ?").expect("parse");

    let query = where_calc(
        &fixture.env(),
        model,
        &domain,
        &[Value::text("a"), Value::ids([1, 2])],
    )
    .expect("where_calc");

    assert_eq!(
        query.where_clause(),
        [r#"(("res_partner"."name" = ?) OR ("res_partner"."id" in (?,?)))"#]
    );
    assert_eq!(
        query.where_params(),
        [Value::text("a"), Value::Int(1), Value::Int(2)]
    );
}

#[test]
fn where_calc_keeps_expression_tables() {
    let fixture = Fixture::new();
    let query = fixture.query("res.users", "name = 'bob'");
    let (from, _, _) = query.get_sql(&Postgres);

    assert_eq!(from, r#""res_users", "res_partner" as "res_users__partner_id""#);
}

//
// joins
//

#[test]
fn inherits_join_calc_adds_one_implicit_join() {
    let fixture = Fixture::new();
    let users = fixture.registry.model("res.users").expect("users");
    let mut query = Query::new(vec![TableRef::bare("res_users")], Vec::new(), Vec::new());

    for _ in 0..2 {
        let column = inherits_join_calc(&fixture.env(), "res_users", "name", users, &mut query)
            .expect("join");
        assert_eq!(column, r#""res_users__partner_id"."name""#);
    }
    assert_eq!(
        inherits_join_calc(&fixture.env(), "res_users", "login", users, &mut query)
            .expect("own column"),
        r#""res_users"."login""#
    );

    let (from, where_sql, params) = query.get_sql(&Postgres);
    assert_eq!(from, r#""res_users", "res_partner" as "res_users__partner_id""#);
    assert_eq!(
        where_sql,
        r#"("res_users"."partner_id" = "res_users__partner_id"."id")"#
    );
    assert!(params.is_empty());
}

#[test]
fn explicit_joins_render_depth_first() {
    let policy = AliasPolicy::default();
    let mut query = Query::new(vec![TableRef::bare("a")], Vec::new(), Vec::new());
    query.push_where(r#"("a"."flag" = ?)"#, [Value::Bool(true)]);

    let (alias, _) = query
        .add_join(
            connection("a", "b", "b_id"),
            false,
            true,
            Some(("{rhs}.\"x\" = ?".to_string(), vec![Value::Int(1)])),
            &Postgres,
            &policy,
        )
        .expect("join b");
    assert_eq!(alias, "a__b_id");

    query
        .add_join(
            connection(&alias, "c", "c_id"),
            false,
            false,
            None,
            &Postgres,
            &policy,
        )
        .expect("join c");

    let (from, where_sql, params) = query.get_sql(&Postgres);
    assert_eq!(
        from,
        r#""a" LEFT JOIN "b" as "a__b_id" ON ("a"."b_id" = "a__b_id"."id" AND "a__b_id"."x" = ?) JOIN "c" as "a__b_id__c_id" ON ("a__b_id"."c_id" = "a__b_id__c_id"."id")"#
    );
    assert_eq!(where_sql, r#"("a"."flag" = ?)"#);
    assert_eq!(params, vec![Value::Int(1), Value::Bool(true)]);
}

#[test]
fn nested_joins_hash_the_full_path() {
    let policy = AliasPolicy {
        limit: 16,
        overflow: AliasOverflow::Hash,
    };
    let mut query = Query::new(vec![TableRef::bare("res_partner")], Vec::new(), Vec::new());

    let (company, _) = query
        .add_join(
            connection("res_partner", "res_company", "company_id"),
            false,
            true,
            None,
            &Postgres,
            &policy,
        )
        .expect("join company");
    let (parent, _) = query
        .add_join(
            connection(&company, "res_company", "parent_id"),
            false,
            true,
            None,
            &Postgres,
            &policy,
        )
        .expect("join parent");

    assert_eq!(
        company,
        policy.apply(generate_table_alias("res_partner", &["company_id"]))
    );
    assert_eq!(
        parent,
        policy.apply(generate_table_alias("res_partner", &["company_id", "parent_id"]))
    );
    assert_eq!(query.alias_path(&parent), "res_partner__company_id__parent_id");
    assert!(parent.len() < 16);
}

#[test]
fn where_calc_remembers_unhashed_aliases() {
    let mut fixture = Fixture::without_active_test();
    fixture.config.alias_limit = 16;
    fixture.config.alias_overflow = AliasOverflow::Hash;

    let query = fixture.query("res.partner", "company_id.name = 'a'");
    let joined = &query.tables()[1];

    assert_ne!(joined.alias, "res_partner__company_id");
    assert_eq!(query.alias_path(&joined.alias), "res_partner__company_id");
    assert_eq!(query.alias_path("res_partner"), "res_partner");
}

#[test]
fn explicit_join_needs_known_lhs() {
    let mut query = Query::new(vec![TableRef::bare("a")], Vec::new(), Vec::new());
    let err = query
        .add_join(
            connection("z", "b", "b_id"),
            false,
            false,
            None,
            &Postgres,
            &AliasPolicy::default(),
        )
        .unwrap_err();

    assert_eq!(
        err,
        QueryError::UnknownAlias {
            alias: "z".to_string()
        }
    );
}

//
// order_calc
//

#[test]
fn order_defaults_to_model_order() {
    let (terms, _) = Fixture::new().order("res.partner", "").expect("order");

    assert_eq!(terms, vec![r#""res_partner"."name" ASC"#.to_string()]);
}

#[test]
fn many2one_order_uses_left_join() {
    let (terms, query) = Fixture::new()
        .order("res.partner", "company_id desc, id")
        .expect("order");

    assert_eq!(
        terms,
        vec![
            r#""res_partner__company_id"."id" DESC"#.to_string(),
            r#""res_partner"."id" ASC"#.to_string(),
        ]
    );
    let (from, _, _) = query.get_sql(&Postgres);
    assert_eq!(
        from,
        r#""res_partner" LEFT JOIN "res_company" as "res_partner__company_id" ON ("res_partner"."company_id" = "res_partner__company_id"."id")"#
    );
}

#[test]
fn inherited_order_goes_through_parent() {
    let (terms, _) = Fixture::new()
        .order("res.users", "name DESC")
        .expect("order");
    assert_eq!(terms, vec![r#""res_users__partner_id"."name" DESC"#.to_string()]);

    let (terms, query) = Fixture::new()
        .order("res.users", "company_id")
        .expect("order");
    assert_eq!(
        terms,
        vec![r#""res_users__partner_id__company_id"."id" ASC"#.to_string()]
    );
    let (from, _, _) = query.get_sql(&Postgres);
    assert_eq!(
        from,
        r#""res_users", "res_partner" as "res_users__partner_id" LEFT JOIN "res_company" as "res_users__partner_id__company_id" ON ("res_users__partner_id"."company_id" = "res_users__partner_id__company_id"."id")"#
    );
}

#[test]
fn order_skips_fields_without_columns() {
    let (terms, _) = Fixture::new()
        .order("res.partner", "child_ids, complete_address, name")
        .expect("order");

    assert_eq!(terms, vec![r#""res_partner"."name" ASC"#.to_string()]);
}

#[test]
fn malformed_order_is_rejected() {
    let fixture = Fixture::new();

    assert!(matches!(
        fixture.order("res.partner", "name sideways"),
        Err(Error::Query(QueryError::InvalidOrder { .. }))
    ));
    assert!(matches!(
        fixture.order("res.partner", "name; drop table x"),
        Err(Error::Query(QueryError::InvalidOrder { .. }))
    ));
    assert!(matches!(
        fixture.order("res.partner", "name,,id"),
        Err(Error::Query(QueryError::InvalidOrder { .. }))
    ));
    assert!(matches!(
        fixture.order("res.partner", "nope"),
        Err(Error::Query(QueryError::UnknownOrderField { .. }))
    ));
}

//
// rendering
//

#[test]
fn select_and_count_wrap_the_query() {
    let fixture = Fixture::without_active_test();
    let mut query = fixture.query("res.partner", "name = 'a'");
    let model = fixture.registry.model("res.partner").expect("model");
    let order = order_calc(&fixture.env(), model, "", &mut query).expect("order");

    let (sql, params) = query.select(
        &Postgres,
        &[r#""res_partner"."id""#.to_string()],
        &order,
        Some(10),
        Some(5),
    );
    assert_eq!(
        sql,
        r#"SELECT "res_partner"."id" FROM "res_partner" WHERE ("res_partner"."name" = ?) ORDER BY "res_partner"."name" ASC LIMIT 10 OFFSET 5"#
    );
    assert_eq!(params, vec![Value::text("a")]);

    assert_eq!(
        query.count(&Postgres).0,
        r#"SELECT count(1) AS "count" FROM "res_partner" WHERE ("res_partner"."name" = ?)"#
    );
}
