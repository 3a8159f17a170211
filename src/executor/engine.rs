//! Statement execution against the mock store and domain
//!
//! Statements run to completion under short lock scopes. The catalog lock is
//! never held while waiting for the store lock; code that holds the store
//! lock may take the catalog lock (expression evaluation reads variables).

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info};

use super::datum::{CoerceError, Datum};
use super::error::{codes, states, EngineError, EngineResult};
use super::eval::{Evaluator, RowContext};
use super::session::Session;
use super::time::TimeZoneSpec;
use super::variables::{self, VarScope};
use super::Row;
use crate::catalog::{
    check_privilege, ColumnDef, DataType, GrantEntry, HostPattern, Privilege, PrivilegeObject,
    RequiredPrivilege, TableDef, UniqueKey, UserDef,
};
use crate::protocol::auth::{compute_password_hash, verify_native_password_hash};
use crate::sql::{
    Assignment, ColumnSpec, Expr, GrantObject, Literal, SelectItem, SelectStatement, Statement,
    TableConstraint, TableName, UserSpec, VariableScope,
};
use crate::storage::{Domain, MockStore, TableData};

/// Static facts the engine reports about its server
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub server_version: String,
    pub socket: String,
}

/// Result-set column description
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    /// Source table, empty for computed columns
    pub table: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// Outcome of one statement
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows {
        columns: Vec<OutputColumn>,
        rows: Vec<Row>,
    },
    Affected {
        affected_rows: u64,
        last_insert_id: u64,
    },
}

impl QueryResult {
    fn ok() -> Self {
        Self::affected(0)
    }

    fn affected(affected_rows: u64) -> Self {
        QueryResult::Affected {
            affected_rows,
            last_insert_id: 0,
        }
    }
}

/// Projection of one output column
enum Projection<'a> {
    Column(usize),
    Expr(&'a Expr),
}

pub struct Engine {
    store: Arc<MockStore>,
    domain: Arc<Domain>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(store: Arc<MockStore>, domain: Arc<Domain>, options: EngineOptions) -> Self {
        Engine {
            store,
            domain,
            options,
        }
    }

    pub fn server_version(&self) -> &str {
        &self.options.server_version
    }

    pub fn store(&self) -> &Arc<MockStore> {
        &self.store
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    pub fn global_time_zone(&self) -> TimeZoneSpec {
        self.domain
            .catalog()
            .global("time_zone")
            .and_then(TimeZoneSpec::parse)
            .unwrap_or(TimeZoneSpec::System)
    }

    /// Whether the session may send several statements in one query
    pub fn multi_statement_enabled(&self, session: &Session) -> bool {
        let mode = match session.variables.get("multi_statement_mode") {
            Some(v) => v.clone(),
            None => self
                .domain
                .catalog()
                .global("multi_statement_mode")
                .unwrap_or("OFF")
                .to_string(),
        };
        mode != "OFF"
    }

    // ============ Connection-level operations ============

    /// Verify a mysql_native_password login and bind the session to the account
    pub fn authenticate(
        &self,
        session: &mut Session,
        user: &str,
        scramble: &[u8],
        auth_response: &[u8],
    ) -> EngineResult<()> {
        let denied = || EngineError::access_denied(user, &session.host, !auth_response.is_empty());

        let (account_host, hash) = {
            let catalog = self.domain.catalog();
            match catalog.match_user(user, &session.host) {
                Some(account) => (
                    account.host.as_str().to_string(),
                    account.password_hash.clone(),
                ),
                None => return Err(denied()),
            }
        };

        if !verify_native_password_hash(scramble, &hash, auth_response) {
            return Err(denied());
        }

        session.user = user.to_string();
        session.account_host = account_host;
        session.time_zone = self.global_time_zone();
        Ok(())
    }

    pub fn use_database(&self, session: &mut Session, name: &str) -> EngineResult<()> {
        self.store.ensure_open()?;
        if !self.domain.catalog().database_exists(name) {
            return Err(EngineError::unknown_database(name));
        }
        session.set_database(Some(name.to_string()));
        Ok(())
    }

    pub fn reset_session(&self, session: &mut Session) {
        session.reset(self.global_time_zone());
    }

    // ============ Statements ============

    pub fn execute(&self, session: &mut Session, stmt: Statement) -> EngineResult<QueryResult> {
        self.store.ensure_open()?;

        match stmt {
            Statement::Select(select) => self.select(session, &select),
            Statement::Insert {
                table,
                columns,
                rows,
            } => self.insert(session, &table, &columns, &rows),
            Statement::Update {
                table,
                assignments,
                filter,
            } => self.update(session, &table, &assignments, filter.as_ref()),
            Statement::Delete { table, filter } => self.delete(session, &table, filter.as_ref()),
            Statement::CreateDatabase {
                name,
                if_not_exists,
            } => self.create_database(session, &name, if_not_exists),
            Statement::DropDatabase { name, if_exists } => {
                self.drop_database(session, &name, if_exists)
            }
            Statement::Use(name) => {
                self.use_database(session, &name)?;
                Ok(QueryResult::ok())
            }
            Statement::CreateTable {
                table,
                columns,
                constraints,
                if_not_exists,
            } => self.create_table(session, &table, columns, &constraints, if_not_exists),
            Statement::DropTable { tables, if_exists } => {
                self.drop_tables(session, &tables, if_exists)
            }
            Statement::Truncate(table) => self.truncate(session, &table),
            Statement::ShowTables => self.show_tables(session),
            Statement::ShowDatabases => self.show_databases(),
            Statement::Set(assignments) => self.set(session, assignments),
            Statement::SetNames { charset, collation } => {
                self.set_names(session, &charset, collation)
            }
            Statement::CreateUser {
                user,
                password,
                if_not_exists,
            } => self.create_user(session, &user, &password, if_not_exists),
            Statement::DropUser { user, if_exists } => self.drop_user(session, &user, if_exists),
            Statement::Grant {
                privileges,
                object,
                users,
            } => self.grant(session, &privileges, &object, &users),
        }
    }

    // ============ Name resolution and privileges ============

    fn resolve_database(&self, session: &Session, name: &TableName) -> EngineResult<String> {
        match &name.database {
            Some(db) => Ok(db.clone()),
            None => session.database.clone().ok_or_else(EngineError::no_database),
        }
    }

    fn table_def(&self, database: &str, name: &str) -> EngineResult<TableDef> {
        self.domain
            .catalog()
            .table(database, name)
            .cloned()
            .ok_or_else(|| EngineError::no_such_table(database, name))
    }

    fn grants(&self, session: &Session) -> Vec<GrantEntry> {
        self.domain
            .catalog()
            .user(&session.user, &session.account_host)
            .map(|u| u.grants.clone())
            .unwrap_or_default()
    }

    fn has_privilege(&self, session: &Session, required: &RequiredPrivilege) -> bool {
        check_privilege(&self.grants(session), required)
    }

    fn require_table(
        &self,
        session: &Session,
        privilege: Privilege,
        database: &str,
        table: &str,
    ) -> EngineResult<()> {
        if self.has_privilege(
            session,
            &RequiredPrivilege::on_table(privilege, database, table),
        ) {
            Ok(())
        } else {
            Err(EngineError::table_access_denied(
                privilege.to_str(),
                &session.user,
                &session.host,
                table,
            ))
        }
    }

    fn require_database(
        &self,
        session: &Session,
        privilege: Privilege,
        database: &str,
    ) -> EngineResult<()> {
        if self.has_privilege(session, &RequiredPrivilege::on_database(privilege, database)) {
            Ok(())
        } else {
            Err(EngineError::database_access_denied(
                &session.user,
                &session.host,
                database,
            ))
        }
    }

    fn require_super(&self, session: &Session, what: &str) -> EngineResult<()> {
        if self.has_privilege(session, &RequiredPrivilege::global(Privilege::Super)) {
            Ok(())
        } else {
            Err(EngineError::specific_access_denied(what))
        }
    }

    // ============ Queries ============

    fn select(&self, session: &Session, select: &SelectStatement) -> EngineResult<QueryResult> {
        let Some(from) = &select.from else {
            return self.select_without_table(session, select);
        };

        let database = self.resolve_database(session, from)?;
        self.require_table(session, Privilege::Select, &database, &from.name)?;
        let table = self.table_def(&database, &from.name)?;

        let tz = session.time_zone;
        let rows = self.store.read(table.id, |data| {
            data.rows
                .iter()
                .map(|row| to_session_time(&table, row, tz))
                .collect::<Vec<_>>()
        })?;

        let mut matched = Vec::with_capacity(rows.len());
        let eval = Evaluator::new(self, session, "where clause");
        for row in rows {
            if let Some(filter) = &select.filter {
                let ctx = RowContext {
                    table: &table,
                    values: &row,
                };
                if !eval.matches(filter, &ctx)? {
                    continue;
                }
            }
            matched.push(row);
        }

        if select
            .columns
            .iter()
            .any(|c| matches!(c, SelectItem::Expr { expr, .. } if expr.is_aggregate()))
        {
            return self.aggregate(session, select, &table, &matched);
        }

        if !select.order_by.is_empty() {
            matched = self.sort_rows(session, select, &table, matched)?;
        }

        let offset = select.offset.unwrap_or(0) as usize;
        let limit = select.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let page: Vec<Row> = matched.into_iter().skip(offset).take(limit).collect();

        self.project(session, select, &table, page)
    }

    fn select_without_table(
        &self,
        session: &Session,
        select: &SelectStatement,
    ) -> EngineResult<QueryResult> {
        let eval = Evaluator::new(self, session, "field list");
        let mut columns = Vec::with_capacity(select.columns.len());
        let mut values = Vec::with_capacity(select.columns.len());

        for item in &select.columns {
            let SelectItem::Expr { expr, alias } = item else {
                return Err(EngineError::new(
                    1096,
                    states::GENERAL_ERROR,
                    "No tables used",
                ));
            };
            let value = eval.eval(expr, None)?;
            columns.push(OutputColumn {
                name: alias.clone().unwrap_or_else(|| expr.to_string()),
                table: String::new(),
                data_type: value.inferred_type(),
                nullable: true,
            });
            values.push(value);
        }

        let rows = match &select.filter {
            Some(filter) if !eval.eval(filter, None)?.truthy().unwrap_or(false) => Vec::new(),
            _ if select.limit == Some(0) => Vec::new(),
            _ => vec![values],
        };
        Ok(QueryResult::Rows { columns, rows })
    }

    /// COUNT(*) / COUNT(expr) over the filtered rows
    fn aggregate(
        &self,
        session: &Session,
        select: &SelectStatement,
        table: &TableDef,
        rows: &[Row],
    ) -> EngineResult<QueryResult> {
        let eval = Evaluator::new(self, session, "field list");
        let mut columns = Vec::new();
        let mut values = Vec::new();

        for item in &select.columns {
            let (expr, alias) = match item {
                SelectItem::Expr { expr, alias } if expr.is_aggregate() => (expr, alias),
                _ => {
                    return Err(EngineError::new(
                        1140,
                        states::SYNTAX_ERROR,
                        "In aggregated query without GROUP BY, SELECT list contains nonaggregated column; this is incompatible with sql_mode=only_full_group_by",
                    ))
                }
            };

            let count = match expr {
                Expr::Function { args, .. } if args.len() == 1 => {
                    let mut n = 0i64;
                    for row in rows {
                        let ctx = RowContext { table, values: row };
                        if !eval.eval(&args[0], Some(&ctx))?.is_null() {
                            n += 1;
                        }
                    }
                    n
                }
                Expr::CountStar => rows.len() as i64,
                _ => {
                    return Err(EngineError::new(
                        1582,
                        states::SYNTAX_ERROR,
                        "Incorrect parameter count in the call to native function 'COUNT'",
                    ))
                }
            };

            columns.push(OutputColumn {
                name: alias.clone().unwrap_or_else(|| expr.to_string()),
                table: String::new(),
                data_type: DataType::BigInt,
                nullable: false,
            });
            values.push(Datum::Int(count));
        }

        let rows = if select.limit == Some(0) || select.offset.unwrap_or(0) > 0 {
            Vec::new()
        } else {
            vec![values]
        };
        Ok(QueryResult::Rows { columns, rows })
    }

    fn sort_rows(
        &self,
        session: &Session,
        select: &SelectStatement,
        table: &TableDef,
        rows: Vec<Row>,
    ) -> EngineResult<Vec<Row>> {
        let eval = Evaluator::new(self, session, "order clause");

        // ORDER BY may name a select-list position or alias
        let key_exprs: Vec<&Expr> = select
            .order_by
            .iter()
            .map(|item| match &item.expr {
                Expr::Literal(Literal::Integer(n)) => match select.columns.get((*n as usize).wrapping_sub(1)) {
                    Some(SelectItem::Expr { expr, .. }) => Ok(expr),
                    _ => Err(EngineError::unknown_column(&n.to_string(), "order clause")),
                },
                Expr::Column { table: None, name } => Ok(select
                    .columns
                    .iter()
                    .find_map(|c| match c {
                        SelectItem::Expr {
                            expr,
                            alias: Some(alias),
                        } if alias.eq_ignore_ascii_case(name) => Some(expr),
                        _ => None,
                    })
                    .unwrap_or(&item.expr)),
                other => Ok(other),
            })
            .collect::<EngineResult<_>>()?;

        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let ctx = RowContext {
                table,
                values: &row,
            };
            let keys = key_exprs
                .iter()
                .map(|e| eval.eval(e, Some(&ctx)))
                .collect::<EngineResult<Vec<_>>>()?;
            keyed.push((keys, row));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for (i, item) in select.order_by.iter().enumerate() {
                let ord = a[i].sort_cmp(&b[i]);
                let ord = if item.ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }

    fn project(
        &self,
        session: &Session,
        select: &SelectStatement,
        table: &TableDef,
        rows: Vec<Row>,
    ) -> EngineResult<QueryResult> {
        let mut columns = Vec::new();
        let mut projections = Vec::new();

        for item in &select.columns {
            match item {
                SelectItem::Wildcard => {
                    for (idx, col) in table.columns.iter().enumerate() {
                        columns.push(OutputColumn {
                            name: col.name.clone(),
                            table: table.name.clone(),
                            data_type: col.data_type.clone(),
                            nullable: col.nullable,
                        });
                        projections.push(Projection::Column(idx));
                    }
                }
                SelectItem::Expr {
                    expr: Expr::Column { table: qualifier, name },
                    alias,
                } if qualifier.as_ref().map_or(true, |q| *q == table.name) => {
                    let idx = table.column_index(name).ok_or_else(|| {
                        EngineError::unknown_column(name, "field list")
                    })?;
                    let col = &table.columns[idx];
                    columns.push(OutputColumn {
                        name: alias.clone().unwrap_or_else(|| col.name.clone()),
                        table: table.name.clone(),
                        data_type: col.data_type.clone(),
                        nullable: col.nullable,
                    });
                    projections.push(Projection::Column(idx));
                }
                SelectItem::Expr { expr, alias } => {
                    columns.push(OutputColumn {
                        name: alias.clone().unwrap_or_else(|| expr.to_string()),
                        table: String::new(),
                        data_type: DataType::Varchar(255),
                        nullable: true,
                    });
                    projections.push(Projection::Expr(expr));
                }
            }
        }

        let eval = Evaluator::new(self, session, "field list");
        let mut output = Vec::with_capacity(rows.len());
        for row in &rows {
            let ctx = RowContext { table, values: row };
            let mut values = Vec::with_capacity(projections.len());
            for projection in &projections {
                values.push(match projection {
                    Projection::Column(idx) => row.get(*idx).cloned().unwrap_or_default(),
                    Projection::Expr(expr) => eval.eval(expr, Some(&ctx))?,
                });
            }
            output.push(values);
        }

        // Computed columns take the type of their first value
        for (i, projection) in projections.iter().enumerate() {
            if let (Projection::Expr(_), Some(first)) = (projection, output.first()) {
                columns[i].data_type = first[i].inferred_type();
            }
        }

        Ok(QueryResult::Rows {
            columns,
            rows: output,
        })
    }

    // ============ DML ============

    fn insert(
        &self,
        session: &mut Session,
        name: &TableName,
        columns: &[String],
        rows: &[Vec<Expr>],
    ) -> EngineResult<QueryResult> {
        let database = self.resolve_database(session, name)?;
        self.require_table(session, Privilege::Insert, &database, &name.name)?;
        let table = self.table_def(&database, &name.name)?;

        let targets: Vec<usize> = if columns.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            columns
                .iter()
                .map(|c| {
                    table
                        .column_index(c)
                        .ok_or_else(|| EngineError::unknown_column(c, "field list"))
                })
                .collect::<EngineResult<_>>()?
        };
        for (i, idx) in targets.iter().enumerate() {
            if targets[..i].contains(idx) {
                return Err(EngineError::new(
                    1110,
                    states::SYNTAX_ERROR,
                    format!("Column '{}' specified twice", table.columns[*idx].name),
                ));
            }
        }

        // Evaluate values and defaults before touching the store
        let mut prepared: Vec<Vec<Option<Datum>>> = Vec::with_capacity(rows.len());
        {
            let eval = Evaluator::new(self, session, "field list");
            for (row_no, exprs) in rows.iter().enumerate() {
                if exprs.len() != targets.len() {
                    return Err(EngineError::new(
                        codes::ER_WRONG_VALUE_COUNT_ON_ROW,
                        "21S01",
                        format!("Column count doesn't match value count at row {}", row_no + 1),
                    ));
                }
                let mut values = vec![None; table.columns.len()];
                for (expr, idx) in exprs.iter().zip(&targets) {
                    values[*idx] = Some(eval.eval(expr, None)?);
                }
                for (idx, col) in table.columns.iter().enumerate() {
                    if values[idx].is_some() || col.auto_increment {
                        continue;
                    }
                    values[idx] = match &col.default {
                        Some(default) => Some(eval.eval(default, None)?),
                        None if col.nullable => Some(Datum::Null),
                        None => {
                            return Err(EngineError::new(
                                codes::ER_NO_DEFAULT_FOR_FIELD,
                                states::GENERAL_ERROR,
                                format!("Field '{}' doesn't have a default value", col.name),
                            ))
                        }
                    };
                }
                prepared.push(values);
            }
        }

        let tz = session.time_zone;
        let (inserted, first_id) = self.store.write(table.id, |data: &mut TableData| -> EngineResult<(u64, Option<i64>)> {
            let mut counter = data.auto_increment;
            let mut first_generated = None;
            let mut new_rows: Vec<Row> = Vec::with_capacity(prepared.len());

            for (row_no, values) in prepared.into_iter().enumerate() {
                let mut row = Vec::with_capacity(values.len());
                for (col, value) in table.columns.iter().zip(values) {
                    let value = value.unwrap_or_default();
                    let generate = col.auto_increment
                        && (value.is_null() || value.as_i64() == Some(0));
                    if generate {
                        counter = counter
                            .checked_add(1)
                            .ok_or_else(EngineError::autoinc_exhausted)?;
                        first_generated.get_or_insert(counter);
                        row.push(Datum::Int(counter));
                        continue;
                    }
                    let stored = store_value(col, value, tz, row_no + 1)?;
                    if col.auto_increment {
                        if let Some(v) = stored.as_i64() {
                            counter = counter.max(v);
                        }
                    }
                    row.push(stored);
                }
                check_unique(&table, &data.rows, &new_rows, &row, None)?;
                new_rows.push(row);
            }

            data.auto_increment = counter;
            let inserted = new_rows.len() as u64;
            data.rows.extend(new_rows);
            Ok((inserted, first_generated))
        })??;

        if let Some(id) = first_id {
            session.last_insert_id = id as u64;
        }
        Ok(QueryResult::Affected {
            affected_rows: inserted,
            last_insert_id: first_id.unwrap_or(0) as u64,
        })
    }

    fn update(
        &self,
        session: &Session,
        name: &TableName,
        assignments: &[(String, Expr)],
        filter: Option<&Expr>,
    ) -> EngineResult<QueryResult> {
        let database = self.resolve_database(session, name)?;
        self.require_table(session, Privilege::Update, &database, &name.name)?;
        let table = self.table_def(&database, &name.name)?;

        let targets: Vec<(usize, &Expr)> = assignments
            .iter()
            .map(|(column, expr)| {
                table
                    .column_index(column)
                    .map(|idx| (idx, expr))
                    .ok_or_else(|| EngineError::unknown_column(column, "field list"))
            })
            .collect::<EngineResult<_>>()?;

        let tz = session.time_zone;
        let eval = Evaluator::new(self, session, "where clause");
        let (matched, changed) = self.store.write(table.id, |data: &mut TableData| -> EngineResult<(u64, u64)> {
            let mut updated: Vec<(usize, Row)> = Vec::new();
            for (i, stored) in data.rows.iter().enumerate() {
                let local = to_session_time(&table, stored, tz);
                let ctx = RowContext {
                    table: &table,
                    values: &local,
                };
                if let Some(filter) = filter {
                    if !eval.matches(filter, &ctx)? {
                        continue;
                    }
                }
                let mut new_row = stored.clone();
                for (idx, expr) in &targets {
                    let value = eval.eval(expr, Some(&ctx))?;
                    new_row[*idx] = store_value(&table.columns[*idx], value, tz, i + 1)?;
                }
                updated.push((i, new_row));
            }

            let mut next = data.rows.clone();
            for (i, row) in &updated {
                next[*i] = row.clone();
            }
            for (i, row) in &updated {
                check_unique(&table, &next, &[], row, Some(*i))?;
            }

            let matched = updated.len() as u64;
            let changed = updated
                .iter()
                .filter(|(i, row)| data.rows[*i] != *row)
                .count() as u64;
            data.rows = next;
            Ok((matched, changed))
        })??;

        Ok(QueryResult::affected(if session.found_rows {
            matched
        } else {
            changed
        }))
    }

    fn delete(
        &self,
        session: &Session,
        name: &TableName,
        filter: Option<&Expr>,
    ) -> EngineResult<QueryResult> {
        let database = self.resolve_database(session, name)?;
        self.require_table(session, Privilege::Delete, &database, &name.name)?;
        let table = self.table_def(&database, &name.name)?;

        let tz = session.time_zone;
        let eval = Evaluator::new(self, session, "where clause");
        let removed = self.store.write(table.id, |data: &mut TableData| -> EngineResult<u64> {
            let Some(filter) = filter else {
                let n = data.rows.len();
                data.rows.clear();
                return Ok(n as u64);
            };

            let mut doomed = Vec::with_capacity(data.rows.len());
            for row in &data.rows {
                let local = to_session_time(&table, row, tz);
                let ctx = RowContext {
                    table: &table,
                    values: &local,
                };
                doomed.push(eval.matches(filter, &ctx)?);
            }
            let before = data.rows.len();
            let mut flags = doomed.into_iter();
            data.rows.retain(|_| !flags.next().unwrap_or(false));
            Ok((before - data.rows.len()) as u64)
        })??;

        Ok(QueryResult::affected(removed))
    }

    // ============ DDL ============

    fn create_database(
        &self,
        session: &Session,
        name: &str,
        if_not_exists: bool,
    ) -> EngineResult<QueryResult> {
        self.require_database(session, Privilege::Create, name)?;
        let created = self.domain.catalog_mut().create_database(name);
        if !created {
            if if_not_exists {
                return Ok(QueryResult::ok());
            }
            return Err(EngineError::new(
                codes::ER_DB_CREATE_EXISTS,
                states::GENERAL_ERROR,
                format!("Can't create database '{}'; database exists", name),
            ));
        }
        self.domain.bump_schema_version();
        debug!(database = name, "database created");
        Ok(QueryResult::affected(1))
    }

    fn drop_database(
        &self,
        session: &mut Session,
        name: &str,
        if_exists: bool,
    ) -> EngineResult<QueryResult> {
        self.require_database(session, Privilege::Drop, name)?;
        let dropped = self.domain.catalog_mut().drop_database(name);
        let Some(dropped) = dropped else {
            if if_exists {
                return Ok(QueryResult::ok());
            }
            return Err(EngineError::new(
                codes::ER_DB_DROP_EXISTS,
                states::GENERAL_ERROR,
                format!("Can't drop database '{}'; database doesn't exist", name),
            ));
        };

        for table in &dropped.tables {
            self.store.drop_table(table.id)?;
        }
        if session.database.as_deref() == Some(name) {
            session.set_database(None);
        }
        self.domain.bump_schema_version();
        debug!(database = name, tables = dropped.tables.len(), "database dropped");
        Ok(QueryResult::affected(dropped.tables.len() as u64))
    }

    fn create_table(
        &self,
        session: &Session,
        name: &TableName,
        specs: Vec<ColumnSpec>,
        constraints: &[TableConstraint],
        if_not_exists: bool,
    ) -> EngineResult<QueryResult> {
        let database = self.resolve_database(session, name)?;
        self.require_table(session, Privilege::Create, &database, &name.name)?;

        {
            let catalog = self.domain.catalog();
            if !catalog.database_exists(&database) {
                return Err(EngineError::unknown_database(&database));
            }
            if catalog.table(&database, &name.name).is_some() {
                if if_not_exists {
                    return Ok(QueryResult::ok());
                }
                return Err(EngineError::table_exists(&name.name));
            }
        }

        let table = build_table_def(
            self.domain.allocate_table_id(),
            &name.name,
            specs,
            constraints,
        )?;
        // Literal defaults must fit their column
        for col in &table.columns {
            if let Some(Expr::Literal(lit)) = &col.default {
                let value = Datum::from_literal(lit);
                if value.is_null() && !col.nullable {
                    return Err(invalid_default(&col.name));
                }
                value
                    .coerce(&col.data_type)
                    .map_err(|_| invalid_default(&col.name))?;
            }
        }

        self.store.create_table(table.id)?;
        let id = table.id;
        let added = {
            let mut catalog = self.domain.catalog_mut();
            catalog.table(&database, &name.name).is_none() && catalog.add_table(&database, table)
        };
        if !added {
            self.store.drop_table(id)?;
            if if_not_exists {
                return Ok(QueryResult::ok());
            }
            return Err(EngineError::table_exists(&name.name));
        }

        let version = self.domain.bump_schema_version();
        debug!(database = %database, table = %name.name, schema_version = version, "table created");
        Ok(QueryResult::ok())
    }

    fn drop_tables(
        &self,
        session: &Session,
        tables: &[TableName],
        if_exists: bool,
    ) -> EngineResult<QueryResult> {
        let mut resolved = Vec::with_capacity(tables.len());
        for name in tables {
            let database = self.resolve_database(session, name)?;
            self.require_table(session, Privilege::Drop, &database, &name.name)?;
            resolved.push((database, name.name.clone()));
        }

        let removed: Vec<TableDef> = {
            let mut catalog = self.domain.catalog_mut();
            let missing: Vec<String> = resolved
                .iter()
                .filter(|(db, t)| catalog.table(db, t).is_none())
                .map(|(db, t)| format!("{}.{}", db, t))
                .collect();
            if !missing.is_empty() && !if_exists {
                return Err(EngineError::new(
                    codes::ER_BAD_TABLE_ERROR,
                    states::NO_SUCH_TABLE,
                    format!("Unknown table '{}'", missing.join(",")),
                ));
            }
            resolved
                .iter()
                .filter_map(|(db, t)| catalog.remove_table(db, t))
                .collect()
        };

        for table in &removed {
            self.store.drop_table(table.id)?;
        }
        if !removed.is_empty() {
            self.domain.bump_schema_version();
        }
        debug!(count = removed.len(), "tables dropped");
        Ok(QueryResult::ok())
    }

    fn truncate(&self, session: &Session, name: &TableName) -> EngineResult<QueryResult> {
        let database = self.resolve_database(session, name)?;
        self.require_table(session, Privilege::Drop, &database, &name.name)?;
        let table = self.table_def(&database, &name.name)?;
        self.store.truncate(table.id)?;
        Ok(QueryResult::ok())
    }

    // ============ SHOW ============

    fn show_tables(&self, session: &Session) -> EngineResult<QueryResult> {
        let database = session.database.clone().ok_or_else(EngineError::no_database)?;
        let catalog = self.domain.catalog();
        let db = catalog
            .database(&database)
            .ok_or_else(|| EngineError::unknown_database(&database))?;

        Ok(QueryResult::Rows {
            columns: vec![OutputColumn {
                name: format!("Tables_in_{}", database),
                table: String::new(),
                data_type: DataType::Varchar(64),
                nullable: false,
            }],
            rows: db
                .tables
                .iter()
                .map(|t| vec![Datum::String(t.name.clone())])
                .collect(),
        })
    }

    fn show_databases(&self) -> EngineResult<QueryResult> {
        let catalog = self.domain.catalog();
        Ok(QueryResult::Rows {
            columns: vec![OutputColumn {
                name: "Database".to_string(),
                table: String::new(),
                data_type: DataType::Varchar(64),
                nullable: false,
            }],
            rows: catalog
                .databases()
                .iter()
                .map(|d| vec![Datum::String(d.name.clone())])
                .collect(),
        })
    }

    // ============ Variables ============

    /// Read a system variable as seen by the session
    pub fn system_variable(
        &self,
        session: &Session,
        scope: VariableScope,
        name: &str,
    ) -> EngineResult<Datum> {
        let var = variables::lookup(name).ok_or_else(|| EngineError::unknown_variable(name))?;

        let value = match var.name {
            "version" => self.options.server_version.clone(),
            "version_comment" => "memdb embedded test server".to_string(),
            "socket" => self.options.socket.clone(),
            "port" | "lower_case_table_names" => "0".to_string(),
            "schema_lease" => format!("{}ms", self.domain.schema_lease().as_millis()),
            "schema_version" => self.domain.schema_version().to_string(),
            "stats_collection" => {
                if self.domain.stats_enabled() { "ON" } else { "OFF" }.to_string()
            }
            "time_zone" if scope != VariableScope::Global => session.time_zone.name(),
            _ => {
                let session_value = match scope {
                    VariableScope::Global => None,
                    _ => session.variables.get(var.name).cloned(),
                };
                match session_value {
                    Some(v) => v,
                    None => {
                        if scope == VariableScope::Session && var.scope == VarScope::GlobalOnly {
                            return Err(global_only(var.name));
                        }
                        self.domain
                            .catalog()
                            .global(var.name)
                            .unwrap_or(var.default)
                            .to_string()
                    }
                }
            }
        };

        if var.is_numeric() {
            if let Ok(n) = value.parse::<i64>() {
                return Ok(Datum::Int(n));
            }
        }
        Ok(Datum::String(value))
    }

    fn set(
        &self,
        session: &mut Session,
        assignments: Vec<Assignment>,
    ) -> EngineResult<QueryResult> {
        for assignment in assignments {
            match assignment {
                Assignment::User { name, value } => {
                    let value = Evaluator::new(self, session, "field list").eval(&value, None)?;
                    session.user_variables.insert(name.to_lowercase(), value);
                }
                Assignment::System { scope, name, value } => {
                    self.set_system_variable(session, scope, &name, &value)?;
                }
            }
        }
        Ok(QueryResult::ok())
    }

    fn set_system_variable(
        &self,
        session: &mut Session,
        scope: VariableScope,
        name: &str,
        value: &Expr,
    ) -> EngineResult<()> {
        let var = variables::lookup(name).ok_or_else(|| EngineError::unknown_variable(name))?;
        if var.read_only {
            return Err(EngineError::new(
                codes::ER_INCORRECT_GLOBAL_LOCAL_VAR,
                states::GENERAL_ERROR,
                format!("Variable '{}' is a read only variable", var.name),
            ));
        }

        let raw = Evaluator::new(self, session, "field list")
            .eval(value, None)?
            .display();
        let is_default = raw.eq_ignore_ascii_case("DEFAULT");
        let normalized = if is_default {
            var.default.to_string()
        } else {
            var.normalize(&raw).ok_or_else(|| {
                if var.name == "time_zone" {
                    EngineError::new(
                        codes::ER_UNKNOWN_TIME_ZONE,
                        states::GENERAL_ERROR,
                        format!("Unknown or incorrect time zone: '{}'", raw),
                    )
                } else {
                    EngineError::wrong_value_for_var(var.name, &raw)
                }
            })?
        };

        if scope == VariableScope::Global {
            self.require_super(session, "SUPER or SYSTEM_VARIABLES_ADMIN")?;
            self.domain.catalog_mut().set_global(var.name, normalized.clone());
            info!(variable = var.name, value = %normalized, "global variable set");
            return Ok(());
        }

        if var.scope == VarScope::GlobalOnly {
            return Err(global_only(var.name));
        }
        if var.name == "time_zone" {
            session.time_zone = TimeZoneSpec::parse(&normalized).unwrap_or(TimeZoneSpec::System);
        }
        if is_default {
            session.variables.remove(var.name);
        } else {
            session.variables.insert(var.name.to_string(), normalized);
        }
        Ok(())
    }

    fn set_names(
        &self,
        session: &mut Session,
        charset: &str,
        collation: Option<String>,
    ) -> EngineResult<QueryResult> {
        let charset = charset.to_lowercase();
        if !matches!(
            charset.as_str(),
            "utf8" | "utf8mb3" | "utf8mb4" | "latin1" | "ascii" | "binary"
        ) {
            return Err(EngineError::new(
                1115,
                states::SYNTAX_ERROR,
                format!("Unknown character set: '{}'", charset),
            ));
        }
        let collation = collation.unwrap_or_else(|| format!("{}_bin", charset));
        for name in [
            "character_set_client",
            "character_set_connection",
            "character_set_results",
        ] {
            session.variables.insert(name.to_string(), charset.clone());
        }
        session
            .variables
            .insert("collation_connection".to_string(), collation);
        Ok(QueryResult::ok())
    }

    // ============ Accounts ============

    fn create_user(
        &self,
        session: &Session,
        user: &UserSpec,
        password: &str,
        if_not_exists: bool,
    ) -> EngineResult<QueryResult> {
        self.require_super(session, "CREATE USER")?;
        let added = self.domain.catalog_mut().add_user(UserDef {
            name: user.name.clone(),
            host: HostPattern::new(user.host.clone()),
            password_hash: compute_password_hash(password),
            grants: Vec::new(),
        });
        if !added {
            if if_not_exists {
                return Ok(QueryResult::ok());
            }
            return Err(EngineError::cannot_user("CREATE USER", &user.to_string()));
        }
        info!(account = %user, "user created");
        Ok(QueryResult::ok())
    }

    fn drop_user(
        &self,
        session: &Session,
        user: &UserSpec,
        if_exists: bool,
    ) -> EngineResult<QueryResult> {
        self.require_super(session, "CREATE USER")?;
        let removed = self.domain.catalog_mut().remove_user(&user.name, &user.host);
        if removed.is_none() && !if_exists {
            return Err(EngineError::cannot_user("DROP USER", &user.to_string()));
        }
        Ok(QueryResult::ok())
    }

    fn grant(
        &self,
        session: &Session,
        privileges: &[Privilege],
        object: &GrantObject,
        users: &[UserSpec],
    ) -> EngineResult<QueryResult> {
        self.require_super(session, "GRANT OPTION")?;

        let current_db = || session.database.clone().ok_or_else(EngineError::no_database);
        let object = match object {
            GrantObject::Global => PrivilegeObject::Global,
            GrantObject::Database(Some(db)) => PrivilegeObject::Database(db.clone()),
            GrantObject::Database(None) => PrivilegeObject::Database(current_db()?),
            GrantObject::Table { database, table } => PrivilegeObject::Table {
                database: match database {
                    Some(db) => db.clone(),
                    None => current_db()?,
                },
                table: table.clone(),
            },
        };

        let mut catalog = self.domain.catalog_mut();
        for user in users {
            let account = catalog.user_mut(&user.name, &user.host).ok_or_else(|| {
                EngineError::new(
                    codes::ER_CANT_CREATE_USER_WITH_GRANT,
                    states::SYNTAX_ERROR,
                    "You are not allowed to create a user with GRANT",
                )
            })?;
            for privilege in privileges {
                let entry = GrantEntry::new(*privilege, object.clone());
                if !account.grants.contains(&entry) {
                    account.grants.push(entry);
                }
            }
            info!(account = %user, ?privileges, ?object, "privileges granted");
        }
        Ok(QueryResult::ok())
    }
}

// ============ Row helpers ============

/// Build a table definition from parsed column specs and constraints
fn build_table_def(
    id: u64,
    name: &str,
    specs: Vec<ColumnSpec>,
    constraints: &[TableConstraint],
) -> EngineResult<TableDef> {
    let mut columns: Vec<ColumnDef> = Vec::with_capacity(specs.len());
    let mut primary: Option<Vec<usize>> = None;
    let mut keys: Vec<UniqueKey> = Vec::new();
    let multiple_primary = || {
        EngineError::new(1068, states::SYNTAX_ERROR, "Multiple primary key defined")
    };

    for (idx, spec) in specs.into_iter().enumerate() {
        if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&spec.name)) {
            return Err(EngineError::new(
                codes::ER_DUP_FIELDNAME,
                states::SYNTAX_ERROR,
                format!("Duplicate column name '{}'", spec.name),
            ));
        }
        if spec.primary_key {
            if primary.is_some() {
                return Err(multiple_primary());
            }
            primary = Some(vec![idx]);
        }
        if spec.unique {
            keys.push(UniqueKey {
                name: spec.name.clone(),
                columns: vec![idx],
            });
        }
        columns.push(ColumnDef {
            name: spec.name,
            data_type: spec.data_type,
            nullable: spec.nullable.unwrap_or(true),
            default: spec.default,
            auto_increment: spec.auto_increment,
        });
    }

    let resolve = |names: &[String]| -> EngineResult<Vec<usize>> {
        names
            .iter()
            .map(|n| {
                columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(n))
                    .ok_or_else(|| {
                        EngineError::new(
                            codes::ER_KEY_COLUMN_DOES_NOT_EXIST,
                            states::SYNTAX_ERROR,
                            format!("Key column '{}' doesn't exist in table", n),
                        )
                    })
            })
            .collect()
    };

    for constraint in constraints {
        match constraint {
            TableConstraint::PrimaryKey(names) => {
                if primary.is_some() {
                    return Err(multiple_primary());
                }
                primary = Some(resolve(names)?);
            }
            TableConstraint::Unique { name, columns: names } => {
                let cols = resolve(names)?;
                let key_name = name.clone().unwrap_or_else(|| names[0].clone());
                keys.push(UniqueKey {
                    name: key_name,
                    columns: cols,
                });
            }
        }
    }

    if let Some(pk) = primary {
        for idx in &pk {
            columns[*idx].nullable = false;
        }
        keys.insert(
            0,
            UniqueKey {
                name: "PRIMARY".to_string(),
                columns: pk,
            },
        );
    }

    let auto: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.auto_increment)
        .map(|(i, _)| i)
        .collect();
    let auto_is_keyed = auto
        .first()
        .map_or(true, |idx| keys.iter().any(|k| k.columns.first() == Some(idx)));
    if auto.len() > 1 || !auto_is_keyed {
        return Err(EngineError::new(
            1075,
            states::SYNTAX_ERROR,
            "Incorrect table definition; there can be only one auto column and it must be defined as a key",
        ));
    }

    Ok(TableDef {
        id,
        name: name.to_string(),
        columns,
        keys,
    })
}

/// Copy of a stored row with TIMESTAMP values shifted into session time
fn to_session_time(table: &TableDef, row: &Row, tz: TimeZoneSpec) -> Row {
    row.iter()
        .zip(&table.columns)
        .map(|(value, col)| match (value, &col.data_type) {
            (Datum::DateTime(dt), DataType::Timestamp) => Datum::DateTime(tz.from_utc(*dt)),
            (value, _) => value.clone(),
        })
        .collect()
}

/// Validate and convert a value for storage in `col`
fn store_value(col: &ColumnDef, value: Datum, tz: TimeZoneSpec, row_no: usize) -> EngineResult<Datum> {
    if value.is_null() {
        if !col.nullable {
            return Err(EngineError::bad_null(&col.name));
        }
        return Ok(Datum::Null);
    }

    let coerced = value.coerce(&col.data_type).map_err(|e| match e {
        CoerceError::TooLong => EngineError::new(
            codes::ER_DATA_TOO_LONG,
            states::DATA,
            format!("Data too long for column '{}' at row {}", col.name, row_no),
        ),
        CoerceError::Incorrect { type_name, value } if col.data_type.is_temporal() => {
            EngineError::new(
                codes::ER_TRUNCATED_WRONG_VALUE,
                states::DATETIME,
                format!(
                    "Incorrect {} value: '{}' for column '{}' at row {}",
                    type_name, value, col.name, row_no
                ),
            )
        }
        CoerceError::Incorrect { type_name, value } => EngineError::new(
            codes::ER_TRUNCATED_WRONG_VALUE_FOR_FIELD,
            states::GENERAL_ERROR,
            format!(
                "Incorrect {} value: '{}' for column '{}' at row {}",
                type_name, value, col.name, row_no
            ),
        ),
    })?;

    Ok(match (&col.data_type, coerced) {
        (DataType::Timestamp, Datum::DateTime(dt)) => Datum::DateTime(tz.to_utc(dt)),
        (_, value) => value,
    })
}

/// Reject `row` if it collides with another row on any unique key.
/// `skip` is the row's own position in `existing` during UPDATE.
fn check_unique(
    table: &TableDef,
    existing: &[Row],
    pending: &[Row],
    row: &Row,
    skip: Option<usize>,
) -> EngineResult<()> {
    for key in &table.keys {
        if key.columns.iter().any(|&i| row[i].is_null()) {
            continue;
        }
        let same_key = |other: &Row| {
            key.columns
                .iter()
                .all(|&i| row[i].sql_cmp(&other[i]) == Some(Ordering::Equal))
        };
        let clash = existing
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .any(|(_, other)| same_key(other))
            || pending.iter().any(same_key);
        if clash {
            let shown: Vec<String> = key.columns.iter().map(|&i| row[i].display()).collect();
            return Err(EngineError::duplicate_entry(
                &shown.join("-"),
                &table.name,
                &key.name,
            ));
        }
    }
    Ok(())
}

fn invalid_default(column: &str) -> EngineError {
    EngineError::new(
        1067,
        states::SYNTAX_ERROR,
        format!("Invalid default value for '{}'", column),
    )
}

fn global_only(name: &str) -> EngineError {
    EngineError::new(
        1229,
        states::GENERAL_ERROR,
        format!(
            "Variable '{}' is a GLOBAL variable and should be set with SET GLOBAL",
            name
        ),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::StoreOptions;
    use crate::sql::Parser;
    use crate::storage::create_mock_store_and_domain;

    fn engine() -> Engine {
        let (store, domain) =
            create_mock_store_and_domain(&StoreOptions::ephemeral(), Duration::from_millis(500))
                .unwrap();
        Engine::new(
            store,
            domain,
            EngineOptions {
                server_version: "8.0.11-memdb".to_string(),
                socket: "/tmp/engine-test.sock".to_string(),
            },
        )
    }

    fn root_session(engine: &Engine) -> Session {
        let mut session = Session::new(1);
        engine.authenticate(&mut session, "root", &[0u8; 20], &[]).unwrap();
        engine.use_database(&mut session, "test").unwrap();
        session
    }

    fn run(engine: &Engine, session: &mut Session, sql: &str) -> EngineResult<QueryResult> {
        let mut last = QueryResult::ok();
        for stmt in Parser::parse_script(sql)? {
            last = engine.execute(session, stmt)?;
        }
        Ok(last)
    }

    fn rows(result: QueryResult) -> Vec<Vec<String>> {
        match result {
            QueryResult::Rows { rows, .. } => rows
                .iter()
                .map(|r| r.iter().map(Datum::display).collect())
                .collect(),
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_and_select() {
        let engine = engine();
        let mut s = root_session(&engine);
        run(
            &engine,
            &mut s,
            "CREATE TABLE students (id VARCHAR(20) PRIMARY KEY, name VARCHAR(50) NOT NULL)",
        )
        .unwrap();
        let result = run(
            &engine,
            &mut s,
            "INSERT INTO students VALUES ('10086', 'ZhangSan'), ('10087', 'LiSi')",
        )
        .unwrap();
        assert_eq!(
            result,
            QueryResult::Affected {
                affected_rows: 2,
                last_insert_id: 0
            }
        );

        let got = rows(
            run(&engine, &mut s, "SELECT name FROM students WHERE id = '10086'").unwrap(),
        );
        assert_eq!(got, vec![vec!["ZhangSan".to_string()]]);

        let got = rows(run(&engine, &mut s, "SELECT COUNT(*) FROM students").unwrap());
        assert_eq!(got, vec![vec!["2".to_string()]]);
    }

    #[test]
    fn test_duplicate_entry_is_atomic() {
        let engine = engine();
        let mut s = root_session(&engine);
        run(&engine, &mut s, "CREATE TABLE t (id INT PRIMARY KEY)").unwrap();
        run(&engine, &mut s, "INSERT INTO t VALUES (1)").unwrap();

        let err = run(&engine, &mut s, "INSERT INTO t VALUES (2), (1)").unwrap_err();
        assert_eq!(err.code, codes::ER_DUP_ENTRY);
        assert_eq!(err.message, "Duplicate entry '1' for key 't.PRIMARY'");

        // Row 2 from the failed statement must not be visible
        let got = rows(run(&engine, &mut s, "SELECT COUNT(*) FROM t").unwrap());
        assert_eq!(got, vec![vec!["1".to_string()]]);

        run(&engine, &mut s, "TRUNCATE TABLE t").unwrap();
        run(&engine, &mut s, "INSERT INTO t VALUES (1)").unwrap();
    }

    #[test]
    fn test_auto_increment_and_last_insert_id() {
        let engine = engine();
        let mut s = root_session(&engine);
        run(
            &engine,
            &mut s,
            "CREATE TABLE t (id BIGINT AUTO_INCREMENT PRIMARY KEY, v TEXT)",
        )
        .unwrap();
        run(&engine, &mut s, "INSERT INTO t (v) VALUES ('a'), ('b')").unwrap();
        assert_eq!(s.last_insert_id, 1);
        run(&engine, &mut s, "INSERT INTO t (v) VALUES ('c')").unwrap();
        assert_eq!(s.last_insert_id, 3);

        run(&engine, &mut s, "TRUNCATE TABLE t").unwrap();
        run(&engine, &mut s, "INSERT INTO t (v) VALUES ('d')").unwrap();
        assert_eq!(s.last_insert_id, 1);
    }

    #[test]
    fn test_auto_increment_exhausted() {
        let engine = engine();
        let mut s = root_session(&engine);
        run(
            &engine,
            &mut s,
            "CREATE TABLE t (id BIGINT AUTO_INCREMENT PRIMARY KEY, v INT)",
        )
        .unwrap();
        run(&engine, &mut s, "INSERT INTO t (id, v) VALUES (9223372036854775807, 1)").unwrap();

        let err = run(&engine, &mut s, "INSERT INTO t (v) VALUES (2)").unwrap_err();
        assert_eq!(err.code, codes::ER_AUTOINC_READ_FAILED);

        // the session keeps working and the failed row was not stored
        let got = rows(run(&engine, &mut s, "SELECT COUNT(*) FROM t").unwrap());
        assert_eq!(got, vec![vec!["1".to_string()]]);
    }

    #[test]
    fn test_integer_overflow_in_select() {
        let engine = engine();
        let mut s = root_session(&engine);
        let err = run(&engine, &mut s, "SELECT 9223372036854775807 + 1").unwrap_err();
        assert_eq!(err.code, codes::ER_DATA_OUT_OF_RANGE);
        assert_eq!(err.state, "22003");
    }

    #[test]
    fn test_update_counts_changed_rows() {
        let engine = engine();
        let mut s = root_session(&engine);
        run(&engine, &mut s, "CREATE TABLE t (id INT PRIMARY KEY, v INT)").unwrap();
        run(&engine, &mut s, "INSERT INTO t VALUES (1, 1), (2, 2)").unwrap();

        let result = run(&engine, &mut s, "UPDATE t SET v = 2").unwrap();
        assert_eq!(result, QueryResult::affected(1));

        s.found_rows = true;
        let result = run(&engine, &mut s, "UPDATE t SET v = 2").unwrap();
        assert_eq!(result, QueryResult::affected(2));

        let err = run(&engine, &mut s, "UPDATE t SET id = 1 WHERE id = 2").unwrap_err();
        assert_eq!(err.code, codes::ER_DUP_ENTRY);
    }

    #[test]
    fn test_delete_with_filter() {
        let engine = engine();
        let mut s = root_session(&engine);
        run(&engine, &mut s, "CREATE TABLE t (id INT)").unwrap();
        run(&engine, &mut s, "INSERT INTO t VALUES (1), (2), (3)").unwrap();
        let result = run(&engine, &mut s, "DELETE FROM t WHERE id >= 2").unwrap();
        assert_eq!(result, QueryResult::affected(2));
        let got = rows(run(&engine, &mut s, "SELECT * FROM t").unwrap());
        assert_eq!(got, vec![vec!["1".to_string()]]);
    }

    #[test]
    fn test_order_by_and_limit() {
        let engine = engine();
        let mut s = root_session(&engine);
        run(&engine, &mut s, "CREATE TABLE t (id INT, name VARCHAR(10))").unwrap();
        run(
            &engine,
            &mut s,
            "INSERT INTO t VALUES (3, 'c'), (1, 'a'), (2, 'b')",
        )
        .unwrap();
        let got = rows(
            run(
                &engine,
                &mut s,
                "SELECT name AS n FROM t ORDER BY id DESC LIMIT 2",
            )
            .unwrap(),
        );
        assert_eq!(got, vec![vec!["c".to_string()], vec!["b".to_string()]]);
    }

    #[test]
    fn test_readonly_user_cannot_write() {
        let engine = engine();
        let mut root = root_session(&engine);
        run(&engine, &mut root, "CREATE TABLE t (id INT)").unwrap();
        run(
            &engine,
            &mut root,
            "CREATE USER 'readonly'@'%' IDENTIFIED BY 'readonly'; GRANT SELECT ON *.* TO 'readonly'@'%'",
        )
        .unwrap();

        let mut ro = Session::new(2);
        let hash = crate::protocol::auth::compute_password_hash("readonly");
        let scramble = [7u8; 20];
        let response = crate::protocol::auth::scramble_password(&scramble, "readonly");
        assert!(!hash.is_empty());
        engine
            .authenticate(&mut ro, "readonly", &scramble, &response)
            .unwrap();
        engine.use_database(&mut ro, "test").unwrap();

        run(&engine, &mut ro, "SELECT * FROM t").unwrap();
        let err = run(&engine, &mut ro, "INSERT INTO t VALUES (1)").unwrap_err();
        assert_eq!(err.code, codes::ER_TABLEACCESS_DENIED);
        assert_eq!(
            err.message,
            "INSERT command denied to user 'readonly'@'localhost' for table 't'"
        );

        let err = run(&engine, &mut ro, "SET GLOBAL time_zone = 'UTC'").unwrap_err();
        assert_eq!(err.code, codes::ER_SPECIFIC_ACCESS_DENIED);
    }

    #[test]
    fn test_wrong_password_denied() {
        let engine = engine();
        let mut s = Session::new(1);
        let err = engine
            .authenticate(&mut s, "root", &[1u8; 20], &[1u8; 20])
            .unwrap_err();
        assert_eq!(err.code, codes::ER_ACCESS_DENIED);
        let err = engine.authenticate(&mut s, "nobody", &[1u8; 20], &[]).unwrap_err();
        assert_eq!(err.code, codes::ER_ACCESS_DENIED);
    }

    #[test]
    fn test_timestamp_follows_session_zone() {
        let engine = engine();
        let mut s = root_session(&engine);
        run(&engine, &mut s, "CREATE TABLE t (ts TIMESTAMP, dt DATETIME)").unwrap();
        run(&engine, &mut s, "SET time_zone = '+08:00'").unwrap();
        run(
            &engine,
            &mut s,
            "INSERT INTO t VALUES ('2024-01-01 08:00:00', '2024-01-01 08:00:00')",
        )
        .unwrap();
        run(&engine, &mut s, "SET time_zone = 'UTC'").unwrap();
        let got = rows(run(&engine, &mut s, "SELECT ts, dt FROM t").unwrap());
        assert_eq!(
            got,
            vec![vec![
                "2024-01-01 00:00:00".to_string(),
                "2024-01-01 08:00:00".to_string()
            ]]
        );
    }

    #[test]
    fn test_system_variables() {
        let engine = engine();
        let mut s = root_session(&engine);
        run(&engine, &mut s, "SET GLOBAL time_zone = 'UTC'").unwrap();
        assert_eq!(
            engine
                .system_variable(&s, VariableScope::Global, "time_zone")
                .unwrap(),
            Datum::String("UTC".to_string())
        );

        let err = run(&engine, &mut s, "SET time_zone = 'Mars/Olympus'").unwrap_err();
        assert_eq!(err.code, codes::ER_UNKNOWN_TIME_ZONE);
        let err = run(&engine, &mut s, "SET no_such_var = 1").unwrap_err();
        assert_eq!(err.code, codes::ER_UNKNOWN_SYSTEM_VARIABLE);
        let err = run(&engine, &mut s, "SET version = 'x'").unwrap_err();
        assert_eq!(err.code, codes::ER_INCORRECT_GLOBAL_LOCAL_VAR);

        assert!(!engine.multi_statement_enabled(&s));
        run(&engine, &mut s, "SET GLOBAL multi_statement_mode = 'ON'").unwrap();
        assert!(engine.multi_statement_enabled(&s));
    }

    #[test]
    fn test_schema_version_follows_ddl() {
        let engine = engine();
        let mut s = root_session(&engine);
        let version = |s: &mut Session| {
            rows(run(&engine, s, "SELECT @@global.schema_version").unwrap())[0][0]
                .parse::<u64>()
                .unwrap()
        };

        let before = version(&mut s);
        run(&engine, &mut s, "CREATE TABLE t (id INT)").unwrap();
        let created = version(&mut s);
        assert!(created > before);

        // data changes leave the schema alone
        run(&engine, &mut s, "INSERT INTO t VALUES (1)").unwrap();
        assert_eq!(version(&mut s), created);

        run(&engine, &mut s, "DROP TABLE t").unwrap();
        assert!(version(&mut s) > created);

        let err = run(&engine, &mut s, "SET GLOBAL schema_version = 1").unwrap_err();
        assert_eq!(err.code, codes::ER_INCORRECT_GLOBAL_LOCAL_VAR);
    }

    #[test]
    fn test_ddl_errors() {
        let engine = engine();
        let mut s = root_session(&engine);
        run(&engine, &mut s, "CREATE TABLE t (id INT)").unwrap();
        let err = run(&engine, &mut s, "CREATE TABLE t (id INT)").unwrap_err();
        assert_eq!(err.code, codes::ER_TABLE_EXISTS_ERROR);
        run(&engine, &mut s, "CREATE TABLE IF NOT EXISTS t (id INT)").unwrap();

        let err = run(&engine, &mut s, "DROP TABLE missing").unwrap_err();
        assert_eq!(err.code, codes::ER_BAD_TABLE_ERROR);
        run(&engine, &mut s, "DROP TABLE IF EXISTS missing").unwrap();

        let err = run(&engine, &mut s, "CREATE TABLE d (a INT, a INT)").unwrap_err();
        assert_eq!(err.code, codes::ER_DUP_FIELDNAME);
        let err = run(&engine, &mut s, "CREATE TABLE k (a INT, PRIMARY KEY (b))").unwrap_err();
        assert_eq!(err.code, codes::ER_KEY_COLUMN_DOES_NOT_EXIST);

        let err = run(&engine, &mut s, "SELECT * FROM missing").unwrap_err();
        assert_eq!(err.code, codes::ER_NO_SUCH_TABLE);

        let got = rows(run(&engine, &mut s, "SHOW TABLES").unwrap());
        assert_eq!(got, vec![vec!["t".to_string()]]);
    }

    #[test]
    fn test_closed_store_rejects_statements() {
        let engine = engine();
        let mut s = root_session(&engine);
        engine.store().close().unwrap();
        let err = run(&engine, &mut s, "SELECT 1").unwrap_err();
        assert_eq!(err.code, codes::ER_UNKNOWN_ERROR);
    }
}
