use crate::{
    config::OrmConfig,
    db::{
        cache::ResultCache,
        dialect::{MySql, Postgres},
        domain::{DomainNode, Operator, parse},
        expression::{CompileError, Context},
        session::{ExecError, Executor, Record, SearchOptions, Session},
    },
    error::Error,
    model::{EntityModel, FieldModel, Registry},
    obs::EventCounters,
    value::Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

///
/// MockExecutor
///
/// Answers a query with the rows of the first canned fragment it contains,
/// and logs every statement it sees.
///

#[derive(Default)]
struct MockExecutor {
    canned: Vec<(&'static str, Vec<Record>)>,
    fail: bool,
    log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MockExecutor {
    fn with_rows(mut self, fragment: &'static str, rows: Vec<Record>) -> Self {
        self.canned.push((fragment, rows));
        self
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(sql, _)| sql.starts_with(prefix))
            .count()
    }
}

impl Executor for MockExecutor {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>, ExecError> {
        self.log.lock().push((sql.to_string(), params.to_vec()));
        if self.fail {
            return Err(ExecError::driver("connection reset"));
        }

        Ok(self
            .canned
            .iter()
            .find(|(fragment, _)| sql.contains(fragment))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecError> {
        self.log.lock().push((sql.to_string(), params.to_vec()));
        if self.fail {
            return Err(ExecError::driver("connection reset"));
        }

        Ok(1)
    }
}

fn registry() -> Arc<Registry> {
    let registry = Registry::builder()
        .model(
            EntityModel::new("res.partner", "res_partner")
                .order("name")
                .field(FieldModel::char("name"))
                .field(FieldModel::boolean("active"))
                .field(FieldModel::many2one("company_id", "res.company"))
                .field(FieldModel::one2many("bank_ids", "res.partner.bank", "partner_id")),
        )
        .and_then(|b| b.model(EntityModel::new("res.company", "res_company").field(FieldModel::char("name"))))
        .and_then(|b| {
            b.model(
                EntityModel::new("res.partner.bank", "res_partner_bank")
                    .field(FieldModel::char("acc_number"))
                    .field(FieldModel::many2one("partner_id", "res.partner")),
            )
        })
        .and_then(|b| {
            b.model(
                EntityModel::new("res.users", "res_users")
                    .inherits("res.partner", "partner_id")
                    .rec_name("login")
                    .order("login")
                    .field(FieldModel::char("login")),
            )
        })
        .and_then(crate::model::RegistryBuilder::build)
        .expect("registry builds");

    Arc::new(registry)
}

fn session(executor: MockExecutor) -> Session<MockExecutor> {
    Session::new(registry(), Arc::new(Postgres), executor, OrmConfig::default())
}

fn row(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

fn ids(values: &[i64]) -> Vec<Record> {
    values.iter().map(|id| row(&[("id", Value::Int(*id))])).collect()
}

fn domain(text: &str) -> DomainNode {
    parse(text).expect("domain parses")
}

fn values(pairs: &[(&str, Value)]) -> Record {
    row(pairs)
}

const COMPANY_IDS: &str = r#"SELECT "res_company"."id" AS "id" FROM "res_company""#;

//
// search
//

#[test]
fn search_selects_ids_in_default_order() {
    let session = session(MockExecutor::default().with_rows("FROM \"res_company\"", ids(&[3, 1])));

    let found = session
        .search("res.company", &DomainNode::new(), &[], &SearchOptions::default(), &Context::default())
        .expect("search");

    assert_eq!(found, vec![3, 1]);
    assert_eq!(
        session.executor().statements(),
        vec![(
            format!(r#"{COMPANY_IDS} ORDER BY "res_company"."id" ASC"#),
            vec![]
        )]
    );
}

#[test]
fn search_options_render_order_limit_and_offset() {
    let session = session(MockExecutor::default());
    let options = SearchOptions::default().order("name desc").limit(5).offset(10);

    session
        .search("res.company", &DomainNode::new(), &[], &options, &Context::default())
        .expect("search");

    let (sql, _) = &session.executor().statements()[0];
    assert_eq!(
        sql,
        &format!(r#"{COMPANY_IDS} ORDER BY "res_company"."name" DESC LIMIT 5 OFFSET 10"#)
    );
}

#[test]
fn search_drops_duplicate_ids_from_one_to_many_joins() {
    let session = session(MockExecutor::default().with_rows("FROM \"res_company\"", ids(&[2, 2, 1, 2])));

    let found = session
        .search("res.company", &DomainNode::new(), &[], &SearchOptions::default(), &Context::default())
        .expect("search");

    assert_eq!(found, vec![2, 1]);
}

#[test]
fn repeated_search_is_served_from_cache_until_a_write() {
    let session = session(MockExecutor::default().with_rows("FROM \"res_partner\"", ids(&[1, 2])));
    let filter = domain("[('name', 'ilike', 'ac')]");
    let search = || {
        session
            .search("res.partner", &filter, &[], &SearchOptions::default(), &Context::default())
            .expect("search")
    };

    assert_eq!(search(), vec![1, 2]);
    assert_eq!(search(), vec![1, 2]);
    assert_eq!(session.executor().count("SELECT"), 1);

    session
        .write("res.partner", &[1], &values(&[("name", Value::text("Acme"))]))
        .expect("write");

    assert_eq!(search(), vec![1, 2]);
    assert_eq!(session.executor().count("SELECT"), 2);
}

#[test]
fn one_to_many_search_is_invalidated_by_a_comodel_write() {
    let session = session(MockExecutor::default().with_rows("FROM \"res_partner\"", ids(&[1])));
    let filter = domain("[('bank_ids', 'in', [7])]");
    let context = Context::default().with_active_test(false);
    let search = || {
        session
            .search("res.partner", &filter, &[], &SearchOptions::default(), &context)
            .expect("search")
    };

    assert_eq!(search(), vec![1]);
    assert_eq!(search(), vec![1]);
    assert_eq!(session.executor().count("SELECT"), 1);

    session
        .write("res.partner.bank", &[7], &values(&[("partner_id", Value::Int(2))]))
        .expect("write");

    search();
    assert_eq!(session.executor().count("SELECT"), 2);
}

#[test]
fn sub_searched_models_invalidate_the_outer_search() {
    let session = session(
        MockExecutor::default()
            .with_rows("FROM \"res_company\"", ids(&[4]))
            .with_rows("FROM \"res_partner\"", ids(&[7])),
    );
    let filter = domain("[('company_id.name', 'ilike', 'Ac')]");
    let context = Context::default().with_active_test(false);
    let search = || {
        session
            .search("res.partner", &filter, &[], &SearchOptions::default(), &context)
            .expect("search")
    };

    search();
    search();
    assert_eq!(session.executor().count("SELECT"), 2);

    session
        .write("res.company", &[4], &values(&[("name", Value::text("Umbrella"))]))
        .expect("write");

    search();
    assert_eq!(session.executor().count("SELECT"), 4);
}

#[test]
fn bound_params_reach_the_executor() {
    let session = session(MockExecutor::default());

    session
        .search(
            "res.company",
            &domain("[('name', '=', ?)]"),
            &[Value::text("Acme")],
            &SearchOptions::default(),
            &Context::default(),
        )
        .expect("search");

    let (_, params) = &session.executor().statements()[0];
    assert_eq!(params, &vec![Value::text("Acme")]);
}

#[test]
fn sub_searches_go_through_the_session() {
    let session = session(
        MockExecutor::default()
            .with_rows("FROM \"res_company\"", ids(&[4]))
            .with_rows("FROM \"res_partner\"", ids(&[7])),
    );

    let found = session
        .search(
            "res.partner",
            &domain("[('company_id.name', 'ilike', 'Ac')]"),
            &[],
            &SearchOptions::default(),
            &Context::default().with_active_test(false),
        )
        .expect("search");

    assert_eq!(found, vec![7]);
    let statements = session.executor().statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].0.contains("FROM \"res_company\""));
    assert!(statements[1].0.contains(r#""res_partner"."company_id""#));
    assert!(statements[1].1.contains(&Value::Int(4)));
}

#[test]
fn search_count_reads_the_count_column() {
    let session = session(
        MockExecutor::default()
            .with_rows("count(1)", vec![row(&[("count", Value::Int(3))])]),
    );

    let count = session
        .search_count("res.company", &DomainNode::new(), &[], &Context::default())
        .expect("count");

    assert_eq!(count, 3);
    assert_eq!(
        session.executor().statements()[0].0,
        r#"SELECT count(1) AS "count" FROM "res_company""#
    );
}

#[test]
fn search_count_labels_the_column_on_mysql() {
    let executor =
        MockExecutor::default().with_rows("count(1)", vec![row(&[("count", Value::Int(2))])]);
    let session = Session::new(registry(), Arc::new(MySql), executor, OrmConfig::default());

    let count = session
        .search_count("res.company", &DomainNode::new(), &[], &Context::default())
        .expect("count");

    assert_eq!(count, 2);
    assert_eq!(
        session.executor().statements()[0].0,
        "SELECT count(1) AS `count` FROM `res_company`"
    );
}

#[test]
fn search_count_without_rows_is_an_error() {
    let session = session(MockExecutor::default());

    let err = session
        .search_count("res.company", &DomainNode::new(), &[], &Context::default())
        .expect_err("no count row");

    assert!(matches!(
        err,
        Error::Exec(ExecError::MissingColumn { ref column }) if column == "count"
    ));
}

#[test]
fn name_search_matches_on_rec_name() {
    let session = session(MockExecutor::default());

    session
        .name_search("res.users", &Value::text("an"), Operator::Ilike, Some(3), &Context::default())
        .expect("name_search");

    let (sql, params) = &session.executor().statements()[0];
    assert!(sql.contains(r#""res_users"."login""#));
    assert!(sql.ends_with("LIMIT 3"));
    assert!(params.contains(&Value::text("%an%")));
}

#[test]
fn blank_name_search_matches_everything() {
    let session = session(MockExecutor::default());

    session
        .name_search("res.company", &Value::text(""), Operator::Ilike, None, &Context::default())
        .expect("name_search");

    assert_eq!(
        session.executor().statements()[0].0,
        format!(r#"{COMPANY_IDS} ORDER BY "res_company"."id" ASC"#)
    );
}

#[test]
fn driver_errors_propagate() {
    let session = session(MockExecutor::failing());

    let err = session
        .search("res.company", &DomainNode::new(), &[], &SearchOptions::default(), &Context::default())
        .expect_err("driver fails");

    assert!(matches!(err, Error::Exec(ExecError::Driver { .. })));
}

//
// read
//

fn user_row() -> Record {
    row(&[
        ("id", Value::Int(5)),
        ("login", Value::text("ann")),
        ("partner_id", Value::Int(9)),
        ("name", Value::text("Ann")),
        ("active", Value::Bool(true)),
        ("company_id", Value::Null),
    ])
}

#[test]
fn read_joins_inherited_columns() {
    let session = session(MockExecutor::default().with_rows("FROM \"res_users\"", vec![user_row()]));

    let rows = session
        .read("res.users", &[5], &["login", "name"], &Context::default())
        .expect("read");

    assert_eq!(
        rows,
        vec![row(&[
            ("id", Value::Int(5)),
            ("login", Value::text("ann")),
            ("name", Value::text("Ann")),
        ])]
    );

    let (sql, params) = &session.executor().statements()[0];
    assert_eq!(
        sql,
        concat!(
            r#"SELECT "res_users"."id" AS "id", "res_users"."login" AS "login", "#,
            r#""res_users"."partner_id" AS "partner_id", "#,
            r#""res_users__partner_id"."name" AS "name", "#,
            r#""res_users__partner_id"."active" AS "active", "#,
            r#""res_users__partner_id"."company_id" AS "company_id" "#,
            r#"FROM "res_users", "res_partner" as "res_users__partner_id" "#,
            r#"WHERE ("res_users"."partner_id" = "res_users__partner_id"."id") "#,
            r#"AND "res_users"."id" IN (?)"#,
        )
    );
    assert_eq!(params, &vec![Value::Int(5)]);
}

#[test]
fn read_uses_the_row_cache_until_a_parent_table_changes() {
    let session = session(MockExecutor::default().with_rows("FROM \"res_users\"", vec![user_row()]));
    let read = || {
        session
            .read("res.users", &[5], &[], &Context::default())
            .expect("read")
    };

    assert_eq!(read(), vec![user_row()]);
    assert_eq!(read(), vec![user_row()]);
    assert_eq!(session.executor().count("SELECT"), 1);

    session
        .write("res.partner", &[9], &values(&[("name", Value::text("Anne"))]))
        .expect("write");

    read();
    assert_eq!(session.executor().count("SELECT"), 2);
}

#[test]
fn read_keeps_the_requested_id_order() {
    let session = session(MockExecutor::default().with_rows("FROM \"res_company\"", ids(&[1, 2])));

    let rows = session
        .read("res.company", &[2, 1, 3], &[], &Context::default())
        .expect("read");

    let order: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(order, vec![Value::Int(2), Value::Int(1)]);
}

#[test]
fn read_rejects_unknown_fields() {
    let session = session(MockExecutor::default());

    let err = session
        .read("res.company", &[1], &["nope"], &Context::default())
        .expect_err("unknown field");

    assert!(matches!(err, Error::Compile(CompileError::InvalidField { .. })));
    assert!(session.executor().statements().is_empty());
}

#[test]
fn empty_reads_and_writes_issue_nothing() {
    let session = session(MockExecutor::default());

    assert!(session.read("res.company", &[], &[], &Context::default()).expect("read").is_empty());
    assert_eq!(
        session
            .write("res.company", &[], &values(&[("name", Value::text("x"))]))
            .expect("write"),
        0
    );
    assert_eq!(session.unlink("res.company", &[]).expect("unlink"), 0);
    assert!(session.executor().statements().is_empty());
}

//
// write
//

#[test]
fn write_splits_inherited_columns_onto_the_parent() {
    let session = session(
        MockExecutor::default()
            .with_rows(r#"SELECT "partner_id""#, vec![row(&[("partner_id", Value::Int(9))])]),
    );

    let affected = session
        .write(
            "res.users",
            &[5],
            &values(&[("login", Value::text("ann")), ("name", Value::text("Ann"))]),
        )
        .expect("write");

    assert_eq!(affected, 2);
    assert_eq!(
        session.executor().statements(),
        vec![
            (
                r#"UPDATE "res_users" SET "login" = ? WHERE "id" IN (?)"#.to_string(),
                vec![Value::text("ann"), Value::Int(5)],
            ),
            (
                r#"SELECT "partner_id" FROM "res_users" WHERE "id" IN (?)"#.to_string(),
                vec![Value::Int(5)],
            ),
            (
                r#"UPDATE "res_partner" SET "name" = ? WHERE "id" IN (?)"#.to_string(),
                vec![Value::text("Ann"), Value::Int(9)],
            ),
        ]
    );
}

#[test]
fn write_rejects_fields_without_a_column() {
    let session = session(MockExecutor::default());

    for field in ["id", "bank_ids"] {
        let err = session
            .write("res.partner", &[1], &values(&[(field, Value::Int(1))]))
            .expect_err("read-only");
        assert!(matches!(err, Error::Exec(ExecError::ReadOnlyField { .. })));
    }
    let err = session
        .write("res.partner", &[1], &values(&[("nope", Value::Int(1))]))
        .expect_err("unknown");
    assert!(matches!(err, Error::Compile(CompileError::InvalidField { .. })));

    assert!(session.executor().statements().is_empty());
}

#[test]
fn unlink_deletes_and_invalidates() {
    let session = session(MockExecutor::default().with_rows("FROM \"res_company\"", ids(&[1])));
    session
        .read("res.company", &[1], &[], &Context::default())
        .expect("read");

    session.unlink("res.company", &[1, 2]).expect("unlink");

    let statements = session.executor().statements();
    assert_eq!(
        statements[1],
        (
            r#"DELETE FROM "res_company" WHERE "id" IN (?,?)"#.to_string(),
            vec![Value::Int(1), Value::Int(2)],
        )
    );
    assert_eq!(session.cache().get_by_ids("res_company", &[1]).1, vec![1]);
}

//
// shared state
//

#[test]
fn writes_through_one_session_invalidate_another() {
    let cache = Arc::new(ResultCache::new(&OrmConfig::default().cache));
    let reader = session(MockExecutor::default().with_rows("FROM \"res_company\"", ids(&[1])))
        .with_cache(Arc::clone(&cache));
    let writer = session(MockExecutor::default()).with_cache(cache);
    let search = || {
        reader
            .search("res.company", &DomainNode::new(), &[], &SearchOptions::default(), &Context::default())
            .expect("search")
    };

    search();
    search();
    assert_eq!(reader.executor().count("SELECT"), 1);

    writer
        .write("res.company", &[1], &values(&[("name", Value::text("x"))]))
        .expect("write");
    search();
    assert_eq!(reader.executor().count("SELECT"), 2);
}

#[test]
fn statements_and_cache_events_reach_the_sink() {
    let counters = Arc::new(EventCounters::new());
    let session = session(MockExecutor::default().with_rows("FROM \"res_company\"", ids(&[1])))
        .with_sink(counters.clone());

    for _ in 0..2 {
        session
            .search("res.company", &DomainNode::new(), &[], &SearchOptions::default(), &Context::default())
            .expect("search");
    }

    let report = counters.report();
    assert_eq!(report.ops.statements, 1);
    assert_eq!(report.ops.rows_fetched, 1);
    assert_eq!(report.ops.result_hits, 1);
    assert_eq!(report.ops.result_puts, 1);
}
