//! SQL text analysis for the MySQL matcher: DML classification and
//! AST-kind signatures, parsed with the MySQL dialect and cached process-wide
//! by query text.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use sqlparser::ast::{
    Expr, Query, Select, SelectItem, SetExpr, Statement, TableFactor, Value,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

/// Outcome of parsing one SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// True when the statement modifies data or schema (INSERT/UPDATE/DELETE,
    /// CREATE/ALTER/DROP/TRUNCATE). SELECT and other pure queries are false.
    pub is_dml: bool,

    /// Ordered traversal of the AST node kinds, `Kind1->Kind2->...`. Two
    /// statements with the same shape produce the same signature regardless
    /// of identifiers, literals, and column data types.
    pub signature: String,
}

static PARSE_CACHE: Lazy<RwLock<HashMap<String, Option<Arc<ParsedQuery>>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Parse `text`, consulting and filling the cache. `None` means the text does
/// not parse as MySQL; callers fall back to plain text equality.
pub fn parse(text: &str) -> Option<Arc<ParsedQuery>> {
    if let Some(cached) = PARSE_CACHE.read().get(text) {
        return cached.clone();
    }

    let parsed = Parser::parse_sql(&MySqlDialect {}, text)
        .ok()
        .filter(|stmts| !stmts.is_empty())
        .map(|stmts| {
            Arc::new(ParsedQuery {
                is_dml: stmts.iter().any(is_dml_statement),
                signature: signature_of(&stmts),
            })
        });

    PARSE_CACHE
        .write()
        .insert(text.to_owned(), parsed.clone());

    parsed
}

/// DML classification of one text; `None` when the text does not parse.
pub fn is_dml(text: &str) -> Option<bool> {
    parse(text).map(|parsed| parsed.is_dml)
}

fn is_dml_statement(stmt: &Statement) -> bool {
    matches!(
        stmt,
        Statement::Insert { .. }
            | Statement::Update { .. }
            | Statement::Delete { .. }
            | Statement::CreateTable { .. }
            | Statement::CreateIndex { .. }
            | Statement::CreateView { .. }
            | Statement::CreateDatabase { .. }
            | Statement::AlterTable { .. }
            | Statement::Drop { .. }
            | Statement::Truncate { .. }
    )
}

fn signature_of(stmts: &[Statement]) -> String {
    let mut tags = Vec::new();

    for stmt in stmts {
        walk_statement(stmt, &mut tags);
    }

    tags.join("->")
}

fn walk_statement(stmt: &Statement, tags: &mut Vec<&'static str>) {
    match stmt {
        Statement::Query(query) => {
            tags.push("Query");
            walk_query(query, tags);
        }

        Statement::Insert { .. } => tags.push("Insert"),

        Statement::Update {
            assignments,
            selection,
            ..
        } => {
            tags.push("Update");
            for _ in assignments {
                tags.push("Assignment");
            }
            if let Some(selection) = selection {
                walk_expr(selection, tags);
            }
        }

        Statement::Delete { selection, .. } => {
            tags.push("Delete");
            if let Some(selection) = selection {
                walk_expr(selection, tags);
            }
        }

        Statement::CreateTable { columns, .. } => {
            tags.push("CreateTable");
            for _ in columns {
                tags.push("ColumnDef");
            }
        }

        Statement::CreateIndex { .. } => tags.push("CreateIndex"),
        Statement::CreateView { .. } => tags.push("CreateView"),
        Statement::CreateDatabase { .. } => tags.push("CreateDatabase"),
        Statement::AlterTable { .. } => tags.push("AlterTable"),

        Statement::Drop { names, .. } => {
            tags.push("Drop");
            for _ in names {
                tags.push("ObjectName");
            }
        }

        Statement::Truncate { .. } => tags.push("Truncate"),
        Statement::StartTransaction { .. } => tags.push("StartTransaction"),
        Statement::Commit { .. } => tags.push("Commit"),
        Statement::Rollback { .. } => tags.push("Rollback"),

        _ => tags.push("Statement"),
    }
}

fn walk_query(query: &Query, tags: &mut Vec<&'static str>) {
    if let Some(with) = &query.with {
        for _ in &with.cte_tables {
            tags.push("Cte");
        }
    }

    walk_set_expr(&query.body, tags);

    for _ in &query.order_by {
        tags.push("OrderBy");
    }
}

fn walk_set_expr(body: &SetExpr, tags: &mut Vec<&'static str>) {
    match body {
        SetExpr::Select(select) => walk_select(select, tags),

        SetExpr::Query(query) => {
            tags.push("Subquery");
            walk_query(query, tags);
        }

        SetExpr::SetOperation { left, right, .. } => {
            tags.push("SetOperation");
            walk_set_expr(left, tags);
            walk_set_expr(right, tags);
        }

        SetExpr::Values(values) => {
            tags.push("Values");
            for row in &values.rows {
                for expr in row {
                    walk_expr(expr, tags);
                }
            }
        }

        _ => tags.push("SetExpr"),
    }
}

fn walk_select(select: &Select, tags: &mut Vec<&'static str>) {
    tags.push("Select");

    for item in &select.projection {
        match item {
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => tags.push("Wildcard"),
            SelectItem::UnnamedExpr(expr) => walk_expr(expr, tags),
            SelectItem::ExprWithAlias { expr, .. } => walk_expr(expr, tags),
        }
    }

    for table in &select.from {
        walk_table_factor(&table.relation, tags);
        for join in &table.joins {
            tags.push("Join");
            walk_table_factor(&join.relation, tags);
        }
    }

    if let Some(selection) = &select.selection {
        walk_expr(selection, tags);
    }
}

fn walk_table_factor(relation: &TableFactor, tags: &mut Vec<&'static str>) {
    match relation {
        TableFactor::Table { .. } => tags.push("Table"),

        TableFactor::Derived { subquery, .. } => {
            tags.push("Derived");
            walk_query(subquery, tags);
        }

        _ => tags.push("TableFactor"),
    }
}

fn walk_expr(expr: &Expr, tags: &mut Vec<&'static str>) {
    match expr {
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) => tags.push("Identifier"),

        Expr::Value(value) => tags.push(match value {
            Value::Number(_, _) => "Number",
            Value::SingleQuotedString(_) | Value::DoubleQuotedString(_) => "String",
            Value::Boolean(_) => "Bool",
            Value::Null => "Null",
            Value::Placeholder(_) => "Placeholder",
            _ => "Value",
        }),

        Expr::BinaryOp { left, right, .. } => {
            tags.push("BinaryOp");
            walk_expr(left, tags);
            walk_expr(right, tags);
        }

        Expr::UnaryOp { expr, .. } => {
            tags.push("UnaryOp");
            walk_expr(expr, tags);
        }

        Expr::Nested(inner) => walk_expr(inner, tags),

        Expr::Function(_) => tags.push("Function"),

        Expr::InList { expr, list, .. } => {
            tags.push("InList");
            walk_expr(expr, tags);
            for item in list {
                walk_expr(item, tags);
            }
        }

        Expr::InSubquery { expr, subquery, .. } => {
            tags.push("InSubquery");
            walk_expr(expr, tags);
            walk_query(subquery, tags);
        }

        Expr::Between {
            expr, low, high, ..
        } => {
            tags.push("Between");
            walk_expr(expr, tags);
            walk_expr(low, tags);
            walk_expr(high, tags);
        }

        Expr::Like { expr, pattern, .. } => {
            tags.push("Like");
            walk_expr(expr, tags);
            walk_expr(pattern, tags);
        }

        Expr::IsNull(inner) => {
            tags.push("IsNull");
            walk_expr(inner, tags);
        }

        Expr::IsNotNull(inner) => {
            tags.push("IsNotNull");
            walk_expr(inner, tags);
        }

        Expr::Subquery(query) => {
            tags.push("Subquery");
            walk_query(query, tags);
        }

        Expr::Exists { subquery, .. } => {
            tags.push("Exists");
            walk_query(subquery, tags);
        }

        Expr::Case { .. } => tags.push("Case"),

        Expr::Cast { expr, .. } => {
            tags.push("Cast");
            walk_expr(expr, tags);
        }

        _ => tags.push("Expr"),
    }
}
