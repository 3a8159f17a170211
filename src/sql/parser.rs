//! Recursive-descent parser for the supported MySQL subset

use crate::catalog::{DataType, Privilege};
use crate::sql::ast::*;
use crate::sql::error::{SqlError, SqlResult};
use crate::sql::lexer::{tokenize, Token};

/// SQL parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Parse a `;`-separated script; empty statements are skipped
    pub fn parse_script(sql: &str) -> SqlResult<Vec<Statement>> {
        let mut parser = Parser {
            tokens: tokenize(sql)?,
            pos: 0,
        };

        let mut statements = Vec::new();
        loop {
            while parser.eat_punct(";") {}
            if parser.peek().is_none() {
                break;
            }
            statements.push(parser.parse_statement()?);
            if parser.peek().is_some() && !parser.eat_punct(";") {
                return Err(parser.unexpected());
            }
        }
        Ok(statements)
    }

    /// Parse exactly one statement
    pub fn parse_one(sql: &str) -> SqlResult<Statement> {
        let mut statements = Self::parse_script(sql)?;
        match statements.len() {
            0 => Err(SqlError::Parse("Empty SQL statement".to_string())),
            1 => Ok(statements.remove(0)),
            _ => Err(SqlError::Parse(
                "Multiple statements not supported".to_string(),
            )),
        }
    }

    // ============ Token helpers ============

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let matches = keywords
            .iter()
            .enumerate()
            .all(|(i, kw)| self.peek_nth(i).is_some_and(|t| t.is_keyword(kw)));
        if matches {
            self.pos += keywords.len();
        }
        matches
    }

    fn expect_keyword(&mut self, keyword: &str) -> SqlResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_punct(p)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> SqlResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Error describing the current position, MySQL style
    fn unexpected(&self) -> SqlError {
        let near: Vec<String> = self.tokens[self.pos.min(self.tokens.len())..]
            .iter()
            .take(8)
            .map(|t| t.to_string())
            .collect();
        SqlError::Parse(format!("near '{}'", near.join(" ")))
    }

    fn parse_identifier(&mut self) -> SqlResult<String> {
        match self.next() {
            Some(Token::Word { value, .. }) => Ok(value),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }

    fn parse_string(&mut self) -> SqlResult<String> {
        match self.next() {
            Some(Token::String(s)) => Ok(s),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }

    fn parse_u64(&mut self) -> SqlResult<u64> {
        match self.next() {
            Some(Token::Number(n)) => n
                .parse()
                .map_err(|_| SqlError::Parse(format!("invalid number '{}'", n))),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }

    /// Identifier or string; used for charsets and account parts
    fn parse_name(&mut self) -> SqlResult<String> {
        match self.peek() {
            Some(Token::String(_)) => self.parse_string(),
            _ => self.parse_identifier(),
        }
    }

    fn parse_table_name(&mut self) -> SqlResult<TableName> {
        let first = self.parse_identifier()?;
        if self.eat_punct(".") {
            let name = self.parse_identifier()?;
            Ok(TableName {
                database: Some(first),
                name,
            })
        } else {
            Ok(TableName::new(first))
        }
    }

    fn parse_identifier_list(&mut self) -> SqlResult<Vec<String>> {
        self.expect_punct("(")?;
        let mut names = Vec::new();
        loop {
            names.push(self.parse_identifier()?);
            // Index prefix length: col(10)
            if self.eat_punct("(") {
                self.parse_u64()?;
                self.expect_punct(")")?;
            }
            self.eat_keyword("ASC");
            self.eat_keyword("DESC");
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(names)
    }

    // ============ Statements ============

    fn parse_statement(&mut self) -> SqlResult<Statement> {
        let keyword = match self.peek() {
            Some(Token::Word {
                value,
                quoted: false,
            }) => value.to_uppercase(),
            _ => return Err(self.unexpected()),
        };

        match keyword.as_str() {
            "SELECT" => Ok(Statement::Select(self.parse_select()?)),
            "INSERT" => self.parse_insert(),
            "UPDATE" => self.parse_update(),
            "DELETE" => self.parse_delete(),
            "CREATE" => self.parse_create(),
            "DROP" => self.parse_drop(),
            "TRUNCATE" => {
                self.pos += 1;
                self.eat_keyword("TABLE");
                Ok(Statement::Truncate(self.parse_table_name()?))
            }
            "USE" => {
                self.pos += 1;
                Ok(Statement::Use(self.parse_identifier()?))
            }
            "SHOW" => self.parse_show(),
            "SET" => self.parse_set(),
            "GRANT" => self.parse_grant(),
            "BEGIN" | "START" | "COMMIT" | "ROLLBACK" | "ALTER" | "REPLACE" => {
                Err(SqlError::Unsupported(format!("{} statements", keyword)))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_select(&mut self) -> SqlResult<SelectStatement> {
        self.expect_keyword("SELECT")?;

        let mut columns = Vec::new();
        loop {
            if self.eat_punct("*") {
                columns.push(SelectItem::Wildcard);
            } else {
                let expr = self.parse_expr()?;
                let alias = self.parse_alias()?;
                columns.push(SelectItem::Expr { expr, alias });
            }
            if !self.eat_punct(",") {
                break;
            }
        }

        let from = if self.eat_keyword("FROM") {
            let table = self.parse_table_name()?;
            // Table alias is accepted but columns must use the table name
            if self.eat_keyword("AS") {
                self.parse_identifier()?;
            }
            Some(table)
        } else {
            None
        };

        let filter = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.eat_keywords(&["ORDER", "BY"]) {
            loop {
                let expr = self.parse_expr()?;
                let ascending = if self.eat_keyword("DESC") {
                    false
                } else {
                    self.eat_keyword("ASC");
                    true
                };
                order_by.push(OrderByItem { expr, ascending });
                if !self.eat_punct(",") {
                    break;
                }
            }
        }

        let mut limit = None;
        let mut offset = None;
        if self.eat_keyword("LIMIT") {
            let first = self.parse_u64()?;
            if self.eat_punct(",") {
                offset = Some(first);
                limit = Some(self.parse_u64()?);
            } else {
                limit = Some(first);
                if self.eat_keyword("OFFSET") {
                    offset = Some(self.parse_u64()?);
                }
            }
        }

        Ok(SelectStatement {
            columns,
            from,
            filter,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_alias(&mut self) -> SqlResult<Option<String>> {
        if self.eat_keyword("AS") {
            return self.parse_name().map(Some);
        }
        match self.peek() {
            Some(Token::Word { value, quoted }) if *quoted || !is_reserved(value) => {
                let alias = value.clone();
                self.pos += 1;
                Ok(Some(alias))
            }
            _ => Ok(None),
        }
    }

    fn parse_insert(&mut self) -> SqlResult<Statement> {
        self.expect_keyword("INSERT")?;
        self.eat_keyword("INTO");
        let table = self.parse_table_name()?;

        let columns = if self.peek().is_some_and(|t| t.is_punct("(")) {
            self.parse_identifier_list()?
        } else {
            Vec::new()
        };

        if !self.eat_keyword("VALUES") && !self.eat_keyword("VALUE") {
            return Err(self.unexpected());
        }

        let mut rows = Vec::new();
        loop {
            self.expect_punct("(")?;
            let mut row = Vec::new();
            if !self.eat_punct(")") {
                loop {
                    row.push(self.parse_expr()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")")?;
            }
            rows.push(row);
            if !self.eat_punct(",") {
                break;
            }
        }

        Ok(Statement::Insert {
            table,
            columns,
            rows,
        })
    }

    fn parse_update(&mut self) -> SqlResult<Statement> {
        self.expect_keyword("UPDATE")?;
        let table = self.parse_table_name()?;
        self.expect_keyword("SET")?;

        let mut assignments = Vec::new();
        loop {
            let mut column = self.parse_identifier()?;
            if self.eat_punct(".") {
                column = self.parse_identifier()?;
            }
            self.expect_punct("=")?;
            assignments.push((column, self.parse_expr()?));
            if !self.eat_punct(",") {
                break;
            }
        }

        let filter = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Statement::Update {
            table,
            assignments,
            filter,
        })
    }

    fn parse_delete(&mut self) -> SqlResult<Statement> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table = self.parse_table_name()?;
        let filter = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete { table, filter })
    }

    fn parse_create(&mut self) -> SqlResult<Statement> {
        self.expect_keyword("CREATE")?;

        if self.eat_keyword("DATABASE") || self.eat_keyword("SCHEMA") {
            let if_not_exists = self.eat_keywords(&["IF", "NOT", "EXISTS"]);
            let name = self.parse_identifier()?;
            self.skip_options();
            return Ok(Statement::CreateDatabase {
                name,
                if_not_exists,
            });
        }

        if self.eat_keyword("USER") {
            let if_not_exists = self.eat_keywords(&["IF", "NOT", "EXISTS"]);
            let user = self.parse_user()?;
            let password = if self.eat_keywords(&["IDENTIFIED", "BY"]) {
                self.parse_string()?
            } else {
                String::new()
            };
            return Ok(Statement::CreateUser {
                user,
                password,
                if_not_exists,
            });
        }

        self.eat_keyword("TEMPORARY");
        if !self.eat_keyword("TABLE") {
            return Err(SqlError::Unsupported(format!(
                "CREATE {}",
                self.peek().map(|t| t.to_string()).unwrap_or_default()
            )));
        }
        self.parse_create_table()
    }

    fn parse_create_table(&mut self) -> SqlResult<Statement> {
        let if_not_exists = self.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let table = self.parse_table_name()?;
        self.expect_punct("(")?;

        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        loop {
            if self.eat_keyword("CONSTRAINT") {
                // Optional constraint name
                if !self.peek_keyword("PRIMARY") && !self.peek_keyword("UNIQUE") {
                    self.parse_identifier()?;
                }
            }

            if self.eat_keywords(&["PRIMARY", "KEY"]) {
                constraints.push(TableConstraint::PrimaryKey(self.parse_identifier_list()?));
            } else if self.eat_keyword("UNIQUE") {
                let _ = self.eat_keyword("KEY") || self.eat_keyword("INDEX");
                let name = if self.peek().is_some_and(|t| t.is_punct("(")) {
                    None
                } else {
                    Some(self.parse_identifier()?)
                };
                let columns = self.parse_identifier_list()?;
                constraints.push(TableConstraint::Unique { name, columns });
            } else if self.peek_keyword("KEY") || self.peek_keyword("INDEX") {
                // Secondary indexes carry no semantics here
                self.pos += 1;
                if !self.peek().is_some_and(|t| t.is_punct("(")) {
                    self.parse_identifier()?;
                }
                self.parse_identifier_list()?;
            } else if self.peek_keyword("FOREIGN") || self.peek_keyword("CHECK") {
                return Err(SqlError::Unsupported("FOREIGN KEY / CHECK constraints".to_string()));
            } else {
                columns.push(self.parse_column_spec()?);
            }

            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        self.skip_options();

        Ok(Statement::CreateTable {
            table,
            columns,
            constraints,
            if_not_exists,
        })
    }

    fn parse_column_spec(&mut self) -> SqlResult<ColumnSpec> {
        let name = self.parse_identifier()?;
        let data_type = self.parse_data_type()?;

        let mut spec = ColumnSpec {
            name,
            data_type,
            nullable: None,
            default: None,
            auto_increment: false,
            primary_key: false,
            unique: false,
        };

        loop {
            if self.eat_keywords(&["NOT", "NULL"]) {
                spec.nullable = Some(false);
            } else if self.eat_keyword("NULL") {
                spec.nullable = Some(true);
            } else if self.eat_keyword("DEFAULT") {
                spec.default = Some(self.parse_primary()?);
            } else if self.eat_keyword("AUTO_INCREMENT") {
                spec.auto_increment = true;
            } else if self.eat_keywords(&["PRIMARY", "KEY"]) {
                spec.primary_key = true;
            } else if self.eat_keyword("UNIQUE") {
                self.eat_keyword("KEY");
                spec.unique = true;
            } else if self.eat_keyword("KEY") {
                spec.primary_key = true;
            } else if self.eat_keyword("COMMENT") {
                self.parse_string()?;
            } else if self.eat_keywords(&["ON", "UPDATE"]) {
                self.parse_primary()?;
            } else if self.eat_keyword("COLLATE") {
                self.parse_name()?;
            } else if self.eat_keywords(&["CHARACTER", "SET"]) || self.eat_keyword("CHARSET") {
                self.parse_name()?;
            } else {
                break;
            }
        }

        Ok(spec)
    }

    fn parse_data_type(&mut self) -> SqlResult<DataType> {
        let name = self.parse_identifier()?.to_uppercase();

        let mut length = None;
        if self.eat_punct("(") {
            length = Some(self.parse_u64()?);
            while self.eat_punct(",") {
                self.parse_u64()?;
            }
            self.expect_punct(")")?;
        }
        self.eat_keyword("UNSIGNED");
        self.eat_keyword("SIGNED");
        self.eat_keyword("ZEROFILL");

        let data_type = match name.as_str() {
            "BOOL" | "BOOLEAN" => DataType::Boolean,
            "TINYINT" if length == Some(1) => DataType::Boolean,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" => DataType::Int,
            "BIGINT" => DataType::BigInt,
            "FLOAT" | "DOUBLE" | "REAL" | "DECIMAL" | "NUMERIC" => DataType::Double,
            "VARCHAR" | "CHAR" => {
                let len = length.unwrap_or(1);
                DataType::Varchar(u32::try_from(len).unwrap_or(u32::MAX))
            }
            "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "JSON" => DataType::Text,
            "DATE" => DataType::Date,
            "DATETIME" => DataType::Datetime,
            "TIMESTAMP" => DataType::Timestamp,
            other => return Err(SqlError::Unsupported(format!("data type {}", other))),
        };
        Ok(data_type)
    }

    /// Skip trailing table/database options (ENGINE=..., CHARSET=...)
    fn skip_options(&mut self) {
        while self.peek().is_some_and(|t| !t.is_punct(";")) {
            self.pos += 1;
        }
    }

    fn parse_drop(&mut self) -> SqlResult<Statement> {
        self.expect_keyword("DROP")?;

        if self.eat_keyword("DATABASE") || self.eat_keyword("SCHEMA") {
            let if_exists = self.eat_keywords(&["IF", "EXISTS"]);
            let name = self.parse_identifier()?;
            return Ok(Statement::DropDatabase { name, if_exists });
        }

        if self.eat_keyword("USER") {
            let if_exists = self.eat_keywords(&["IF", "EXISTS"]);
            let user = self.parse_user()?;
            return Ok(Statement::DropUser { user, if_exists });
        }

        self.eat_keyword("TEMPORARY");
        self.expect_keyword("TABLE")?;
        let if_exists = self.eat_keywords(&["IF", "EXISTS"]);
        let mut tables = Vec::new();
        loop {
            tables.push(self.parse_table_name()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        let _ = self.eat_keyword("RESTRICT") || self.eat_keyword("CASCADE");
        Ok(Statement::DropTable { tables, if_exists })
    }

    fn parse_show(&mut self) -> SqlResult<Statement> {
        self.expect_keyword("SHOW")?;
        self.eat_keyword("FULL");
        if self.eat_keyword("TABLES") {
            Ok(Statement::ShowTables)
        } else if self.eat_keyword("DATABASES") || self.eat_keyword("SCHEMAS") {
            Ok(Statement::ShowDatabases)
        } else {
            Err(SqlError::Unsupported(format!(
                "SHOW {}",
                self.peek().map(|t| t.to_string()).unwrap_or_default()
            )))
        }
    }

    fn parse_set(&mut self) -> SqlResult<Statement> {
        self.expect_keyword("SET")?;

        if self.eat_keyword("NAMES") {
            let charset = self.parse_name()?;
            let collation = if self.eat_keyword("COLLATE") {
                Some(self.parse_name()?)
            } else {
                None
            };
            return Ok(Statement::SetNames { charset, collation });
        }

        let mut assignments = Vec::new();
        loop {
            assignments.push(self.parse_assignment()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Statement::Set(assignments))
    }

    fn parse_assignment(&mut self) -> SqlResult<Assignment> {
        if let Some(Token::Variable {
            system: false,
            name,
        }) = self.peek().cloned()
        {
            self.pos += 1;
            self.expect_assign()?;
            let value = self.parse_expr()?;
            return Ok(Assignment::User { name, value });
        }

        let (scope, name) = if let Some(Token::Variable { system: true, .. }) = self.peek() {
            match self.parse_system_variable()? {
                Expr::SystemVariable { scope, name } => (scope, name),
                _ => return Err(self.unexpected()),
            }
        } else if self.eat_keyword("GLOBAL") {
            (VariableScope::Global, self.parse_identifier()?)
        } else if self.eat_keyword("SESSION") || self.eat_keyword("LOCAL") {
            (VariableScope::Session, self.parse_identifier()?)
        } else {
            (VariableScope::Default, self.parse_identifier()?)
        };

        self.expect_assign()?;

        // Bare words such as ON / OFF are values, not column references
        let value = match self.peek() {
            Some(Token::Word {
                value,
                quoted: false,
            }) if !self.peek_nth(1).is_some_and(|t| t.is_punct("(")) => {
                let word = value.clone();
                self.pos += 1;
                Expr::Literal(Literal::String(word))
            }
            _ => self.parse_expr()?,
        };

        Ok(Assignment::System {
            scope,
            name: name.to_lowercase(),
            value,
        })
    }

    fn expect_assign(&mut self) -> SqlResult<()> {
        if self.eat_punct("=") || self.eat_punct(":=") {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn parse_user(&mut self) -> SqlResult<UserSpec> {
        let name = self.parse_name()?;
        let host = if self.eat_punct("@") {
            self.parse_name()?
        } else {
            "%".to_string()
        };
        Ok(UserSpec { name, host })
    }

    fn parse_grant(&mut self) -> SqlResult<Statement> {
        self.expect_keyword("GRANT")?;

        let mut privileges = Vec::new();
        loop {
            let word = self.parse_identifier()?;
            let privilege = if word.eq_ignore_ascii_case("ALL") {
                self.eat_keyword("PRIVILEGES");
                Privilege::All
            } else {
                Privilege::parse(&word)
                    .ok_or_else(|| SqlError::Unsupported(format!("privilege {}", word)))?
            };
            privileges.push(privilege);
            if !self.eat_punct(",") {
                break;
            }
        }

        self.expect_keyword("ON")?;
        self.eat_keyword("TABLE");
        let object = self.parse_grant_object()?;

        self.expect_keyword("TO")?;
        let mut users = Vec::new();
        loop {
            users.push(self.parse_user()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        if self.eat_keyword("WITH") {
            self.expect_keyword("GRANT")?;
            self.expect_keyword("OPTION")?;
        }

        Ok(Statement::Grant {
            privileges,
            object,
            users,
        })
    }

    fn parse_grant_object(&mut self) -> SqlResult<GrantObject> {
        if self.eat_punct("*") {
            if self.eat_punct(".") {
                self.expect_punct("*")?;
                return Ok(GrantObject::Global);
            }
            return Ok(GrantObject::Database(None));
        }

        let first = self.parse_identifier()?;
        if !self.eat_punct(".") {
            return Ok(GrantObject::Table {
                database: None,
                table: first,
            });
        }
        if self.eat_punct("*") {
            return Ok(GrantObject::Database(Some(first)));
        }
        Ok(GrantObject::Table {
            database: Some(first),
            table: self.parse_identifier()?,
        })
    }

    // ============ Expressions ============

    pub fn parse_expr(&mut self) -> SqlResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> SqlResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") || self.eat_punct("||") {
            let right = self.parse_and()?;
            left = binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> SqlResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("AND") || self.eat_punct("&&") {
            let right = self.parse_not()?;
            left = binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> SqlResult<Expr> {
        if self.eat_keyword("NOT") {
            let expr = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> SqlResult<Expr> {
        let left = self.parse_additive()?;

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let negated = self.peek_keyword("NOT")
            && self.peek_nth(1).is_some_and(|t| {
                t.is_keyword("IN") || t.is_keyword("LIKE") || t.is_keyword("BETWEEN")
            });
        if negated {
            self.pos += 1;
        }

        if self.eat_keyword("IN") {
            self.expect_punct("(")?;
            let mut list = Vec::new();
            loop {
                list.push(self.parse_expr()?);
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct(")")?;
            return Ok(Expr::InList {
                expr: Box::new(left),
                list,
                negated,
            });
        }

        if self.eat_keyword("LIKE") {
            let right = self.parse_additive()?;
            let op = if negated {
                BinaryOp::NotLike
            } else {
                BinaryOp::Like
            };
            return Ok(binary(left, op, right));
        }

        if self.eat_keyword("BETWEEN") {
            let low = self.parse_additive()?;
            self.expect_keyword("AND")?;
            let high = self.parse_additive()?;
            return Ok(Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            });
        }

        let op = match self.peek() {
            Some(Token::Punct(p)) => match p.as_str() {
                "=" | "==" => Some(BinaryOp::Eq),
                "<>" | "!=" => Some(BinaryOp::NotEq),
                "<" => Some(BinaryOp::Lt),
                "<=" => Some(BinaryOp::LtEq),
                ">" => Some(BinaryOp::Gt),
                ">=" => Some(BinaryOp::GtEq),
                _ => None,
            },
            _ => None,
        };

        match op {
            Some(op) => {
                self.pos += 1;
                let right = self.parse_additive()?;
                Ok(binary(left, op, right))
            }
            None => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> SqlResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_punct("+") {
                BinaryOp::Add
            } else if self.eat_punct("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> SqlResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_punct("*") {
                BinaryOp::Mul
            } else if self.eat_punct("/") || self.eat_keyword("DIV") {
                BinaryOp::Div
            } else if self.eat_punct("%") || self.eat_keyword("MOD") {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> SqlResult<Expr> {
        if self.eat_punct("-") {
            let expr = self.parse_unary()?;
            return Ok(match expr {
                Expr::Literal(Literal::Integer(i)) => Expr::Literal(Literal::Integer(-i)),
                Expr::Literal(Literal::Float(f)) => Expr::Literal(Literal::Float(-f)),
                other => Expr::UnaryOp {
                    op: UnaryOp::Neg,
                    expr: Box::new(other),
                },
            });
        }
        if self.eat_punct("+") {
            return self.parse_unary();
        }
        if self.eat_punct("!") {
            let expr = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> SqlResult<Expr> {
        let tok = match self.next() {
            Some(tok) => tok,
            None => return Err(SqlError::Parse("unexpected end of statement".to_string())),
        };

        match tok {
            Token::Number(n) => Ok(Expr::Literal(parse_number(&n)?)),
            Token::String(s) => Ok(Expr::Literal(Literal::String(s))),
            Token::Variable { system: false, name } => Ok(Expr::UserVariable(name)),
            Token::Variable { system: true, .. } => {
                self.pos -= 1;
                self.parse_system_variable()
            }
            Token::Punct(p) if p == "(" => {
                let expr = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Word {
                value,
                quoted: false,
            } if !self.peek().is_some_and(|t| t.is_punct("(") || t.is_punct(".")) => {
                match value.to_uppercase().as_str() {
                    "NULL" => Ok(Expr::Literal(Literal::Null)),
                    "TRUE" => Ok(Expr::Literal(Literal::Boolean(true))),
                    "FALSE" => Ok(Expr::Literal(Literal::Boolean(false))),
                    "CURRENT_TIMESTAMP" | "LOCALTIMESTAMP" | "NOW" => Ok(Expr::Function {
                        name: "NOW".to_string(),
                        args: Vec::new(),
                    }),
                    "CURRENT_DATE" => Ok(Expr::Function {
                        name: "CURDATE".to_string(),
                        args: Vec::new(),
                    }),
                    "CURRENT_USER" => Ok(Expr::Function {
                        name: "CURRENT_USER".to_string(),
                        args: Vec::new(),
                    }),
                    _ if is_reserved(&value) => {
                        self.pos -= 1;
                        Err(self.unexpected())
                    }
                    _ => Ok(Expr::column(value)),
                }
            }
            Token::Word { value, quoted } => {
                if self.eat_punct(".") {
                    let name = self.parse_identifier()?;
                    return Ok(Expr::Column {
                        table: Some(value),
                        name,
                    });
                }
                if quoted {
                    return Ok(Expr::column(value));
                }
                self.parse_function(value.to_uppercase())
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn parse_function(&mut self, name: String) -> SqlResult<Expr> {
        self.expect_punct("(")?;
        if name == "COUNT" && self.eat_punct("*") {
            self.expect_punct(")")?;
            return Ok(Expr::CountStar);
        }
        let mut args = Vec::new();
        if !self.eat_punct(")") {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct(")")?;
        }
        Ok(Expr::Function { name, args })
    }

    /// `@@name`, `@@global.name`, `@@session.name`
    fn parse_system_variable(&mut self) -> SqlResult<Expr> {
        let first = match self.next() {
            Some(Token::Variable { system: true, name }) => name,
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.unexpected());
            }
        };

        let scope = match first.to_lowercase().as_str() {
            "global" => Some(VariableScope::Global),
            "session" | "local" => Some(VariableScope::Session),
            _ => None,
        };

        match scope {
            Some(scope) if self.eat_punct(".") => Ok(Expr::SystemVariable {
                scope,
                name: self.parse_identifier()?.to_lowercase(),
            }),
            _ => Ok(Expr::SystemVariable {
                scope: VariableScope::Default,
                name: first.to_lowercase(),
            }),
        }
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn parse_number(text: &str) -> SqlResult<Literal> {
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Literal::Integer(i));
        }
    }
    text.parse::<f64>()
        .map(Literal::Float)
        .map_err(|_| SqlError::Parse(format!("invalid number '{}'", text)))
}

/// Words that cannot be used as bare aliases or column names
fn is_reserved(word: &str) -> bool {
    const RESERVED: &[&str] = &[
        "FROM", "WHERE", "ORDER", "BY", "LIMIT", "OFFSET", "AND", "OR", "NOT", "IS", "IN",
        "LIKE", "BETWEEN", "AS", "ASC", "DESC", "SELECT", "INSERT", "UPDATE", "DELETE", "SET",
        "VALUES", "GROUP", "HAVING", "UNION", "JOIN", "ON", "INTO", "DIV", "MOD",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select() {
        let stmt = Parser::parse_one(
            "SELECT id, name AS n FROM school.students WHERE id = 1 ORDER BY name DESC LIMIT 5",
        )
        .unwrap();
        let Statement::Select(select) = stmt else {
            panic!("expected SELECT");
        };
        assert_eq!(select.columns.len(), 2);
        assert_eq!(
            select.from,
            Some(TableName {
                database: Some("school".to_string()),
                name: "students".to_string()
            })
        );
        assert!(select.filter.is_some());
        assert!(!select.order_by[0].ascending);
        assert_eq!(select.limit, Some(5));
    }

    #[test]
    fn test_parse_insert_multi_row() {
        let stmt = Parser::parse_one(
            "INSERT INTO students (student_number, name) VALUES ('10086', 'ZhangSan'), ('10087', NULL)",
        )
        .unwrap();
        let Statement::Insert { columns, rows, .. } = stmt else {
            panic!("expected INSERT");
        };
        assert_eq!(columns, vec!["student_number", "name"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], Expr::Literal(Literal::Null));
    }

    #[test]
    fn test_parse_create_table() {
        let stmt = Parser::parse_one(
            "CREATE TABLE IF NOT EXISTS `students` (
                id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
                student_number VARCHAR(32) NOT NULL COMMENT 'school id',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                PRIMARY KEY (id),
                UNIQUE KEY uk_number (student_number),
                KEY idx_created (created_at)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        )
        .unwrap();
        let Statement::CreateTable {
            columns,
            constraints,
            if_not_exists,
            ..
        } = stmt
        else {
            panic!("expected CREATE TABLE");
        };
        assert!(if_not_exists);
        assert_eq!(columns.len(), 3);
        assert!(columns[0].auto_increment);
        assert_eq!(columns[1].data_type, DataType::Varchar(32));
        assert_eq!(columns[2].data_type, DataType::Timestamp);
        assert!(columns[2].default.is_some());
        assert_eq!(constraints.len(), 2);
    }

    #[test]
    fn test_parse_account_statements() {
        let stmt =
            Parser::parse_one("CREATE USER 'readonly'@'%' IDENTIFIED BY 'readonly'").unwrap();
        assert_eq!(
            stmt,
            Statement::CreateUser {
                user: UserSpec {
                    name: "readonly".to_string(),
                    host: "%".to_string()
                },
                password: "readonly".to_string(),
                if_not_exists: false,
            }
        );

        let stmt = Parser::parse_one("GRANT SELECT ON *.* TO 'readonly'@'%'").unwrap();
        let Statement::Grant {
            privileges, object, ..
        } = stmt
        else {
            panic!("expected GRANT");
        };
        assert_eq!(privileges, vec![Privilege::Select]);
        assert_eq!(object, GrantObject::Global);
    }

    #[test]
    fn test_parse_set() {
        let stmt = Parser::parse_one("SET GLOBAL time_zone = 'UTC'").unwrap();
        assert_eq!(
            stmt,
            Statement::Set(vec![Assignment::System {
                scope: VariableScope::Global,
                name: "time_zone".to_string(),
                value: Expr::Literal(Literal::String("UTC".to_string())),
            }])
        );

        let stmt = Parser::parse_one("SET @@global.multi_statement_mode = ON").unwrap();
        assert_eq!(
            stmt,
            Statement::Set(vec![Assignment::System {
                scope: VariableScope::Global,
                name: "multi_statement_mode".to_string(),
                value: Expr::Literal(Literal::String("ON".to_string())),
            }])
        );

        let stmt = Parser::parse_one("SET NAMES utf8mb4").unwrap();
        assert!(matches!(stmt, Statement::SetNames { .. }));
    }

    #[test]
    fn test_parse_script() {
        let statements = Parser::parse_script(
            "CREATE DATABASE school; USE school;; DROP TABLE IF EXISTS a, b;",
        )
        .unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[1], Statement::Use("school".to_string()));
        assert!(Parser::parse_script("  ;  ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Parser::parse_one("SELEC 1"),
            Err(SqlError::Parse(_))
        ));
        assert!(matches!(
            Parser::parse_one("SELECT 1 2"),
            Err(SqlError::Parse(_))
        ));
        assert!(matches!(
            Parser::parse_one("BEGIN"),
            Err(SqlError::Unsupported(_))
        ));
        assert!(Parser::parse_one("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn test_expression_precedence() {
        let stmt = Parser::parse_one("SELECT 1 + 2 * 3 = 7 AND NOT a IS NULL").unwrap();
        let Statement::Select(select) = stmt else {
            panic!("expected SELECT");
        };
        let SelectItem::Expr { expr, .. } = &select.columns[0] else {
            panic!("expected expression");
        };
        assert!(matches!(
            expr,
            Expr::BinaryOp {
                op: BinaryOp::And,
                ..
            }
        ));
    }
}
