use std::fmt::Debug;

///
/// Dialect
///
/// The few places where emitted SQL differs between backends.
///

pub trait Dialect: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, alias or column).
    fn quote(&self, ident: &str) -> String;

    /// Cast a column expression to text for pattern matching.
    fn text_cast(&self, expr: &str) -> String;

    /// Spelling of a pattern operator (`like`, `not ilike`, ...).
    fn like_operator(&self, op: &'static str) -> &'static str {
        op
    }

    /// `"alias"."column"`
    fn column(&self, alias: &str, column: &str) -> String {
        format!("{}.{}", self.quote(alias), self.quote(column))
    }
}

///
/// Postgres
///

#[derive(Clone, Copy, Debug, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn text_cast(&self, expr: &str) -> String {
        format!("{expr}::text")
    }
}

///
/// MySql
/// No `ilike`; the default collations already compare case-insensitively.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn text_cast(&self, expr: &str) -> String {
        format!("CAST({expr} AS CHAR)")
    }

    fn like_operator(&self, op: &'static str) -> &'static str {
        match op {
            "ilike" => "like",
            "not ilike" => "not like",
            other => other,
        }
    }
}
